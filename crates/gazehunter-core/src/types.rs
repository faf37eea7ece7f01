//! 公共类型（对外暴露）
use serde::Serialize;

use crate::error::ArtifactError;

/// 从二进制中抽取出的可打印字符串
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedString {
    pub offset: usize,
    pub text: String,
}

/// 搜索词：保留原始大小写用于报告，小写形式用于匹配
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm {
    original: String,
    lowered: String,
}

impl SearchTerm {
    pub fn new(text: &str) -> Self {
        Self { original: text.to_string(), lowered: text.to_lowercase() }
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    pub fn lowered(&self) -> &str {
        &self.lowered
    }
}

/// 分类置信度：high=精确匹配，medium=子串匹配，low=启发式/兜底
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: String,
    pub confidence: Confidence,
}

/// 原始字节搜索使用的编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Encoding {
    #[serde(rename = "utf8")]
    Utf8,
    #[serde(rename = "utf16le")]
    Utf16Le,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf8",
            Encoding::Utf16Le => "utf16le",
        }
    }

    /// 将（已小写的）搜索词编码为字节针
    pub fn encode(self, term: &str) -> Vec<u8> {
        match self {
            Encoding::Utf8 => term.as_bytes().to_vec(),
            Encoding::Utf16Le => term.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        }
    }
}

/// 归一化文本中的一次命中（按搜索词聚合）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermHit {
    pub term: String,
    pub category: String,
    #[serde(rename = "category_confidence")]
    pub confidence: Confidence,
    pub examples: Vec<String>,
}

/// 单文件处理结果：成功 或 结构化错误，调用方必须显式处理两种情况
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactRecord<T> {
    Scanned {
        artifact: String,
        #[serde(flatten)]
        data: T,
    },
    Error {
        artifact: String,
        error: ArtifactError,
    },
}

impl<T> ArtifactRecord<T> {
    pub fn artifact(&self) -> &str {
        match self {
            ArtifactRecord::Scanned { artifact, .. } | ArtifactRecord::Error { artifact, .. } => artifact,
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            ArtifactRecord::Scanned { data, .. } => Some(data),
            ArtifactRecord::Error { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ArtifactRecord::Error { .. })
    }
}
