//! 可打印 ASCII 串抽取（类似 `strings` 工具）
//!
//! 可打印字节：tab(9) 或 [32,126]。连续可打印字节构成一段，遇到不可打印字节或缓冲区结尾时闭合；
//! 长度不足 `min_len` 的段直接丢弃。输出按偏移严格递增。
use std::fmt::Write as _;

use crate::types::ExtractedString;

/// 默认最小串长度
pub const DEFAULT_MIN_LEN: usize = 4;

#[inline]
pub fn is_printable(b: u8) -> bool {
    b == b'\t' || (32..=126).contains(&b)
}

/// 惰性抽取器：只向前推进，重新调用 `extract_strings` 即可从头开始
pub struct AsciiRuns<'a> {
    buf: &'a [u8],
    pos: usize,
    min_len: usize,
}

pub fn extract_strings(buf: &[u8], min_len: usize) -> AsciiRuns<'_> {
    AsciiRuns { buf, pos: 0, min_len }
}

impl Iterator for AsciiRuns<'_> {
    type Item = ExtractedString;

    fn next(&mut self) -> Option<ExtractedString> {
        let n = self.buf.len();
        while self.pos < n {
            if !is_printable(self.buf[self.pos]) {
                self.pos += 1;
                continue;
            }
            let start = self.pos;
            while self.pos < n && is_printable(self.buf[self.pos]) {
                self.pos += 1;
            }
            let run = &self.buf[start..self.pos];
            if run.len() >= self.min_len {
                // 段内全部为 ASCII，逐字节转换不会失败
                let text: String = run.iter().map(|&b| b as char).collect();
                return Some(ExtractedString { offset: start, text });
            }
        }
        None
    }
}

/// 渲染为归一化文本：每行 `8 位十六进制偏移 + 空格 + 文本`
pub fn render_normalized<I>(strings: I) -> String
where
    I: IntoIterator<Item = ExtractedString>,
{
    let mut out = String::new();
    for s in strings {
        let _ = writeln!(out, "{:08x} {}", s.offset, s.text);
    }
    out
}
