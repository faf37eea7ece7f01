//! 错误类型
//!
//! - `ScanError`：致命错误（前置条件缺失、规则文件非法、输出写入失败），直接中止本次运行。
//! - `ArtifactError`：单个文件的读取失败，作为记录挂在该文件上，扫描继续。
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("input directory not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("failed to read term list {}: {source}", path.display())]
    TermList {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read rule table {}: {source}", path.display())]
    RuleFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid rule table: {0}")]
    RuleParse(#[from] toml::de::Error),

    #[error("invalid rule table: {0}")]
    RuleInvalid(String),

    #[error("failed to build search automaton: {0}")]
    Automaton(#[from] aho_corasick::BuildError),

    #[error("failed to list artifacts for {app}: {source}")]
    Listing {
        app: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// 单文件错误记录（写入 JSON 的 `error` 字段）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactError {
    pub kind: String,
    pub message: String,
}

impl ArtifactError {
    pub fn from_io(err: &io::Error) -> Self {
        Self { kind: format!("{:?}", err.kind()), message: err.to_string() }
    }
}

impl std::fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
