//! 搜索针计划（Aho-Corasick）
//!
//! 每个搜索词取原文与小写形式两个变体（仅 ASCII 大小写不同时合并为一个），
//! 每个变体派生 UTF-8 与 UTF-16LE 两根字节针，去重后构建一个全局重叠匹配自动机。
//! 自动机按 ASCII 大小写不敏感匹配：UTF-8 多字节序列不含 ASCII 字节，折叠安全；
//! UTF-16LE 的高字节可能落在 ASCII 字母区间，命中后需按码元复核（见 `NeedlePlan::confirm`）。
use std::collections::HashMap;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

use crate::error::Result;
use crate::types::{Encoding, SearchTerm};

/// 每个搜索词尝试的编码（顺序即输出顺序）
pub(crate) const ENCODINGS: [Encoding; 2] = [Encoding::Utf8, Encoding::Utf16Le];

pub(crate) struct TermNeedles {
    pub(crate) term: String,
    /// 与 ENCODINGS 一一对应；每种编码可能有多根针（原文 / 小写变体）
    pub(crate) needle_ids: [Vec<usize>; 2],
}

pub(crate) struct NeedlePlan {
    /// 所有针均为空时为 None
    pub(crate) ac: Option<AhoCorasick>,
    /// 与针 id 对应；UTF-16LE 针保存码元用于复核，UTF-8 针为 None
    wide_units: Vec<Option<Vec<u16>>>,
    pub(crate) terms: Vec<TermNeedles>,
}

impl NeedlePlan {
    pub(crate) fn needle_count(&self) -> usize {
        self.wide_units.len()
    }

    /// 复核一次自动机命中：UTF-16LE 针只允许码元高字节为 0 的位置做 ASCII 大小写折叠
    pub(crate) fn confirm(&self, id: usize, matched: &[u8]) -> bool {
        let Some(units) = &self.wide_units[id] else { return true };
        matched.len() == units.len() * 2
            && matched.chunks_exact(2).zip(units).all(|(pair, &want)| {
                let got = u16::from_le_bytes([pair[0], pair[1]]);
                match (u8::try_from(got), u8::try_from(want)) {
                    (Ok(g), Ok(w)) => g.eq_ignore_ascii_case(&w),
                    _ => got == want,
                }
            })
    }
}

/// 原文与小写形式；只差 ASCII 大小写时只保留原文
fn variants(term: &SearchTerm) -> Vec<&str> {
    let mut out = vec![term.as_str()];
    if !term.lowered().eq_ignore_ascii_case(term.as_str()) {
        out.push(term.lowered());
    }
    out
}

pub(crate) fn build_needle_plan(terms: &[SearchTerm]) -> Result<NeedlePlan> {
    let mut needles: Vec<Vec<u8>> = Vec::new();
    let mut wide_units: Vec<Option<Vec<u16>>> = Vec::new();
    // 在 ASCII 折叠匹配下等价的针共享同一 id
    let mut index: HashMap<(Encoding, String), usize> = HashMap::new();
    let mut per_term = Vec::with_capacity(terms.len());

    for term in terms {
        let mut needle_ids = [Vec::new(), Vec::new()];
        for variant in variants(term) {
            if variant.is_empty() {
                continue;
            }
            for (slot, enc) in ENCODINGS.iter().enumerate() {
                let id = *index.entry((*enc, variant.to_ascii_lowercase())).or_insert_with(|| {
                    needles.push(enc.encode(variant));
                    wide_units.push(match enc {
                        Encoding::Utf8 => None,
                        Encoding::Utf16Le => Some(variant.encode_utf16().collect()),
                    });
                    needles.len() - 1
                });
                if !needle_ids[slot].contains(&id) {
                    needle_ids[slot].push(id);
                }
            }
        }
        per_term.push(TermNeedles { term: term.as_str().to_string(), needle_ids });
    }

    let ac = if needles.is_empty() {
        None
    } else {
        // 重叠匹配要求 Standard 语义
        Some(
            AhoCorasickBuilder::new()
                .match_kind(MatchKind::Standard)
                .ascii_case_insensitive(true)
                .build(&needles)?,
        )
    };

    Ok(NeedlePlan { ac, wide_units, terms: per_term })
}
