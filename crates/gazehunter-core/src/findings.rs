//! 原始字节命中项
use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::types::{Encoding, TermHit};

/// 原始字节搜索的单次命中
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHit {
    /// 原始大小写的搜索词
    pub term: String,
    pub encoding: Encoding,
    pub offset: usize,
}

impl RawHit {
    pub fn offset_hex(&self) -> String {
        format!("{:08x}", self.offset)
    }
}

impl Serialize for RawHit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("RawHit", 4)?;
        st.serialize_field("term", &self.term)?;
        st.serialize_field("encoding", &self.encoding)?;
        st.serialize_field("offset", &self.offset)?;
        st.serialize_field("offset_hex", &self.offset_hex())?;
        st.end()
    }
}

/// 单文件的原始字节命中集合
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RawMatches {
    pub findings: Vec<RawHit>,
}

/// 单文件的归一化文本命中集合（按搜索词发现顺序）
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct TextHits {
    pub hits: Vec<TermHit>,
}
