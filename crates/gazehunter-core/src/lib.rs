//! 核心扫描库
//!
//! 设计要点：
//! - 二进制先做 ASCII 串抽取（归一化），再在归一化文本上按词收集证据并分类；
//! - 另一路直接在原始字节上搜索 UTF-8 / UTF-16LE 编码，覆盖 ASCII 抽取看不到的宽字符串；
//! - 分类规则有序，先命中者胜出，结果只取决于词本身；
//! - 应用与文件按不区分大小写的字典序处理，相同输入的报告逐字节可复现。

mod categorize;
mod engine_bytes;
mod engine_utf8;
mod error;
mod findings;
mod options;
mod prefilter;
mod report;
mod rules;
mod scan;
mod store;
mod strings;
mod terms;
mod types;

pub use categorize::Categorizer;
pub use engine_bytes::{search_bytes, ByteSearcher, DEFAULT_MAX_HITS_PER_TERM};
pub use engine_utf8::{collect_evidence, DEFAULT_MAX_EXAMPLES};
pub use error::{ArtifactError, Result, ScanError};
pub use findings::{RawHit, RawMatches, TextHits};
pub use options::{ScanOptions, ScanStats, DEFAULT_MAX_TERMS};
pub use report::{group_by_category, AppScanResult, CrossAppReport, LongRow, TextSummary, LONG_CSV_HEADER, MASTER_HEADER};
pub use rules::{load_rule_table, CategoryRule, Heuristic, RuleTable};
pub use scan::{
    categorize_apps, normalize_apps, rel_key, report_stats, require_dir, run_pipeline, scan_app_text, search_apps,
    write_reports, NormalizeSummary, NormalizedFile, RawSummary, RunSummary, ENABLEMENT_LIST, EXPORT_LONG_CSV,
    EXPORT_TXT, EXPORT_WIDE_CSV, MASTER_REPORT, NORMALIZED_SUBDIR, NORMALIZE_META, RAW_MATCHES, SCAN_MATCHES,
    SUMMARY_CSV,
};
pub use store::{
    cmp_case_insensitive, sort_case_insensitive, ArtifactSource, FsSink, FsSource, MemorySink, MemorySource, OutputSink,
};
pub use strings::{extract_strings, is_printable, render_normalized, AsciiRuns, DEFAULT_MIN_LEN};
pub use terms::{load_terms, parse_terms};
pub use types::{ArtifactRecord, Classification, Confidence, Encoding, ExtractedString, SearchTerm, TermHit};
