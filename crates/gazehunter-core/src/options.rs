//! 扫描选项与统计信息（模块）
use crate::engine_bytes::DEFAULT_MAX_HITS_PER_TERM;
use crate::engine_utf8::DEFAULT_MAX_EXAMPLES;
use crate::strings::DEFAULT_MIN_LEN;

/// 默认最多加载的搜索词数量
pub const DEFAULT_MAX_TERMS: usize = 500;

/// 扫描选项（构建后不可变，显式传入各阶段）
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// 抽取串的最小长度
    pub min_string_len: usize,
    /// 原始字节搜索：每根针每文件的命中上限
    pub max_hits_per_term: usize,
    /// 归一化文本搜索：每词每文件的示例行上限
    pub max_examples_per_term: usize,
    /// 二进制文件扩展名（不区分大小写，不含点）
    pub extensions: Vec<String>,
    /// 每个应用最多处理的文件数（排序后截断）；None 表示不限
    pub max_files_per_app: Option<usize>,
    /// 线程数：None 表示自动（等于 CPU 核数）；Some(1) 走串行
    pub threads: Option<usize>,
    /// JSON 记录是否写入 timestamp_utc
    pub timestamps: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            min_string_len: DEFAULT_MIN_LEN,
            max_hits_per_term: DEFAULT_MAX_HITS_PER_TERM,
            max_examples_per_term: DEFAULT_MAX_EXAMPLES,
            extensions: vec!["so".to_string()],
            max_files_per_app: None,
            threads: None,
            timestamps: true,
        }
    }
}

impl ScanOptions {
    pub(crate) fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// 扫描统计信息（便于 CLI 打印）
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    pub apps: usize,
    pub artifacts: usize,
    pub artifacts_with_hits: usize,
    pub hits: usize,
    pub errors: usize,
}

impl ScanStats {
    pub(crate) fn absorb(&mut self, other: &ScanStats) {
        self.apps += other.apps;
        self.artifacts += other.artifacts;
        self.artifacts_with_hits += other.artifacts_with_hits;
        self.hits += other.hits;
        self.errors += other.errors;
    }
}
