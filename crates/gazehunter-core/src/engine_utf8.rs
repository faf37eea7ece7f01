//! 归一化文本扫描引擎
//!
//! 对归一化后的 ASCII 文本做不区分大小写的子串检查，命中时按行收集示例并分类。
use crate::categorize::Categorizer;
use crate::types::{SearchTerm, TermHit};

/// 默认每词每文件最多收集的示例行数
pub const DEFAULT_MAX_EXAMPLES: usize = 25;

/// 返回包含 `term_lower` 的前 `limit` 行（文件顺序）
fn matching_lines(text: &str, term_lower: &str, limit: usize) -> Vec<String> {
    text.lines()
        .filter(|line| line.to_lowercase().contains(term_lower))
        .take(limit)
        .map(str::to_string)
        .collect()
}

/// 命中结果按搜索词顺序输出；未出现的词不产生记录
pub fn collect_evidence(text: &str, terms: &[SearchTerm], categorizer: &Categorizer, max_examples: usize) -> Vec<TermHit> {
    let lower_text = text.to_lowercase();
    let mut hits = Vec::new();

    for term in terms {
        if term.lowered().is_empty() || !lower_text.contains(term.lowered()) {
            continue;
        }
        let examples = matching_lines(text, term.lowered(), max_examples);
        let class = categorizer.categorize(term.as_str());
        hits.push(TermHit {
            term: term.as_str().to_string(),
            category: class.category,
            confidence: class.confidence,
            examples,
        });
    }

    hits
}
