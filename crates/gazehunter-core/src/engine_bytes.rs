//! 字节级多编码搜索引擎
//!
//! 直接在原始字节上查找搜索词的 UTF-8 / UTF-16LE 编码，独立于 ASCII 串抽取
//! （UTF-16LE 串在 ASCII 抽取结果中不可见）。
//! - 重叠匹配：在偏移 o 命中后，下一次从 o+1 继续；
//! - 每根针最多记录 `max_hits_per_term` 次，命中数只是下界。
use crate::error::Result;
use crate::findings::RawHit;
use crate::prefilter::{build_needle_plan, NeedlePlan, ENCODINGS};
use crate::types::SearchTerm;

/// 默认每词每文件的命中上限
pub const DEFAULT_MAX_HITS_PER_TERM: usize = 50;

pub struct ByteSearcher {
    plan: NeedlePlan,
    max_hits_per_term: usize,
}

impl ByteSearcher {
    pub fn new(terms: &[SearchTerm], max_hits_per_term: usize) -> Result<Self> {
        Ok(Self { plan: build_needle_plan(terms)?, max_hits_per_term })
    }

    /// 输出顺序：搜索词顺序 → 编码（utf8, utf16le）→ 偏移升序
    pub fn search(&self, buf: &[u8]) -> Vec<RawHit> {
        let offsets = self.needle_offsets(buf);
        let mut hits = Vec::new();
        for t in &self.plan.terms {
            for (slot, enc) in ENCODINGS.iter().enumerate() {
                for offset in self.merged(&offsets, &t.needle_ids[slot]) {
                    hits.push(RawHit { term: t.term.clone(), encoding: *enc, offset });
                }
            }
        }
        hits
    }

    /// 同一编码下多根变体针的偏移合并：各针的前 N 个命中取并集后仍取前 N 个
    fn merged(&self, offsets: &[Vec<usize>], ids: &[usize]) -> Vec<usize> {
        match ids {
            [] => Vec::new(),
            [id] => offsets[*id].clone(),
            _ => {
                let mut all: Vec<usize> = ids.iter().flat_map(|&id| offsets[id].iter().copied()).collect();
                all.sort_unstable();
                all.dedup();
                all.truncate(self.max_hits_per_term);
                all
            }
        }
    }

    fn needle_offsets(&self, buf: &[u8]) -> Vec<Vec<usize>> {
        let needle_count = self.plan.needle_count();
        let mut offsets: Vec<Vec<usize>> = vec![Vec::new(); needle_count];
        let Some(ac) = self.plan.ac.as_ref() else { return offsets };
        if self.max_hits_per_term == 0 {
            return offsets;
        }

        let mut saturated = 0usize;
        // 重叠迭代按结束位置输出；同一根针长度固定，因此起始偏移同样递增
        for m in ac.find_overlapping_iter(buf) {
            let id = m.pattern().as_usize();
            if offsets[id].len() >= self.max_hits_per_term || !self.plan.confirm(id, &buf[m.range()]) {
                continue;
            }
            offsets[id].push(m.start());
            if offsets[id].len() == self.max_hits_per_term {
                saturated += 1;
                if saturated == needle_count {
                    break;
                }
            }
        }
        offsets
    }
}

/// 便捷入口：一次性构建并搜索
pub fn search_bytes(buf: &[u8], terms: &[SearchTerm], max_hits_per_term: usize) -> Result<Vec<RawHit>> {
    Ok(ByteSearcher::new(terms, max_hits_per_term)?.search(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Encoding;
    use proptest::prelude::*;

    fn terms(list: &[&str]) -> Vec<SearchTerm> {
        list.iter().map(|t| SearchTerm::new(t)).collect()
    }

    fn offsets(hits: &[RawHit], enc: Encoding) -> Vec<usize> {
        hits.iter().filter(|h| h.encoding == enc).map(|h| h.offset).collect()
    }

    #[test]
    fn finds_overlapping_occurrences() {
        let hits = search_bytes(b"aaaa", &terms(&["aa"]), 3).unwrap();
        assert_eq!(offsets(&hits, Encoding::Utf8), vec![0, 1, 2]);
    }

    #[test]
    fn cap_limits_hits_per_needle() {
        let hits = search_bytes(b"aaaaaa", &terms(&["aa"]), 2).unwrap();
        assert_eq!(offsets(&hits, Encoding::Utf8), vec![0, 1]);
        assert!(search_bytes(b"aaaa", &terms(&["aa"]), 0).unwrap().is_empty());
    }

    #[test]
    fn finds_utf16le_only_occurrence() {
        let mut buf = b"\x00\x01header".to_vec();
        buf.extend("Gaze".encode_utf16().flat_map(u16::to_le_bytes));
        buf.extend_from_slice(b"\x00\x00");
        let hits = search_bytes(&buf, &terms(&["Gaze"]), 50).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].encoding, Encoding::Utf16Le);
        assert_eq!(hits[0].offset, 8);
        assert_eq!(hits[0].term, "Gaze");
    }

    #[test]
    fn matching_ignores_ascii_case() {
        let hits = search_bytes(b"..EYETRACKED..", &terms(&["EyeTracked"]), 50).unwrap();
        assert_eq!(offsets(&hits, Encoding::Utf8), vec![2]);
        assert_eq!(hits[0].term, "EyeTracked");
    }

    #[test]
    fn empty_term_yields_nothing() {
        assert!(search_bytes(b"anything", &terms(&[""]), 50).unwrap().is_empty());
    }

    #[test]
    fn output_follows_term_then_encoding_order() {
        let mut buf = b"blink gaze ".to_vec();
        buf.extend("blink".encode_utf16().flat_map(u16::to_le_bytes));
        let hits = search_bytes(&buf, &terms(&["gaze", "blink"]), 50).unwrap();
        let got: Vec<_> = hits.iter().map(|h| (h.term.as_str(), h.encoding, h.offset)).collect();
        assert_eq!(
            got,
            vec![("gaze", Encoding::Utf8, 6), ("blink", Encoding::Utf8, 0), ("blink", Encoding::Utf16Le, 11)]
        );
    }

    #[test]
    fn duplicate_terms_report_independently() {
        let hits = search_bytes(b"gaze", &terms(&["gaze", "GAZE"]), 50).unwrap();
        let got: Vec<_> = hits.iter().map(|h| h.term.as_str()).collect();
        assert_eq!(got, vec!["gaze", "GAZE"]);
    }

    fn utf16le(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn non_ascii_term_matches_as_written() {
        let hits = search_bytes("..ÉCRAN..".as_bytes(), &terms(&["ÉCRAN"]), 50).unwrap();
        assert_eq!(offsets(&hits, Encoding::Utf8), vec![2]);

        let hits = search_bytes(&utf16le("xÉcran"), &terms(&["ÉCRAN"]), 50).unwrap();
        assert_eq!(offsets(&hits, Encoding::Utf16Le), vec![2]);
    }

    #[test]
    fn lowercase_form_of_non_ascii_term_also_matches() {
        let hits = search_bytes("écran ÉCRAN".as_bytes(), &terms(&["ÉCRAN"]), 50).unwrap();
        assert_eq!(offsets(&hits, Encoding::Utf8), vec![0, 7]);
    }

    #[test]
    fn wide_search_does_not_fold_high_bytes() {
        // ł = 42 01，Ţ = 62 01：低字节只差 ASCII 大小写
        assert!(search_bytes(&utf16le("Ţ"), &terms(&["ł"]), 50).unwrap().is_empty());
        let hits = search_bytes(&utf16le("ł"), &terms(&["ł"]), 50).unwrap();
        assert_eq!(offsets(&hits, Encoding::Utf16Le), vec![0]);
    }

    #[test]
    fn wide_search_still_ignores_ascii_case() {
        let hits = search_bytes(&utf16le("GAZEprovider"), &terms(&["GazeProvider"]), 50).unwrap();
        assert_eq!(offsets(&hits, Encoding::Utf16Le), vec![0]);
    }

    fn naive(buf: &[u8], needle: &[u8], cap: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut start = 0;
        while out.len() < cap && start + needle.len() <= buf.len() {
            match buf[start..].windows(needle.len()).position(|w| w == needle) {
                Some(i) => {
                    out.push(start + i);
                    start += i + 1;
                }
                None => break,
            }
        }
        out
    }

    proptest! {
        #[test]
        fn agrees_with_forward_scan(buf in proptest::collection::vec(prop_oneof![Just(b'a'), Just(b'b'), Just(0u8)], 0..200),
                                    needle in "[ab]{1,4}", cap in 1usize..10) {
            let hits = search_bytes(&buf, &terms(&[needle.as_str()]), cap).unwrap();
            prop_assert_eq!(offsets(&hits, Encoding::Utf8), naive(&buf, needle.as_bytes(), cap));
            let wide: Vec<u8> = needle.encode_utf16().flat_map(u16::to_le_bytes).collect();
            prop_assert_eq!(offsets(&hits, Encoding::Utf16Le), naive(&buf, &wide, cap));
        }
    }
}
