//! 搜索词列表加载
use std::path::Path;

use crate::error::{Result, ScanError};
use crate::types::SearchTerm;

/// 从文本解析搜索词：按行读取，去掉首尾空白，跳过空行与 `#` 注释行，最多 `max_terms` 条。
/// 重复词不去重，每行都是独立的搜索词。
pub fn parse_terms(text: &str, max_terms: usize) -> Vec<SearchTerm> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .take(max_terms)
        .map(SearchTerm::new)
        .collect()
}

pub fn load_terms(path: &Path, max_terms: usize) -> Result<Vec<SearchTerm>> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| ScanError::TermList { path: path.to_path_buf(), source })?;
    Ok(parse_terms(&text, max_terms))
}
