//! 跨应用聚合与报告渲染
//!
//! 排序约定（保证相同输入逐字节可复现）：
//! - 应用、文件：不区分大小写的字典序；
//! - 分类：字典序升序，兜底分类固定排在最后；
//! - 同一分类内的搜索词：保持发现顺序。
use serde::Serialize;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt::Write as _;

use crate::findings::TextHits;
use crate::store::cmp_case_insensitive;
use crate::types::{ArtifactRecord, TermHit};

pub const MASTER_HEADER: [&str; 3] = [
    "# master-results.txt",
    "# Categorized matches from normalized ASCII strings",
    "# Grouped by APP -> FILE -> CATEGORY -> TERM",
];

pub const LONG_CSV_HEADER: &str = "app,artifact,category,category_confidence,term,example_count";

/// 单个应用的归一化文本扫描结果
#[derive(Debug, Clone, PartialEq)]
pub struct AppScanResult {
    pub app: String,
    pub location: String,
    pub artifacts: Vec<ArtifactRecord<TextHits>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TextSummary {
    pub artifacts_scanned: usize,
    pub files_with_hits: usize,
    pub total_term_hits: usize,
    pub errors: usize,
}

impl AppScanResult {
    pub fn hits(&self) -> impl Iterator<Item = &TermHit> {
        self.artifacts.iter().filter_map(ArtifactRecord::data).flat_map(|d| d.hits.iter())
    }

    pub fn summary(&self) -> TextSummary {
        TextSummary {
            artifacts_scanned: self.artifacts.len(),
            files_with_hits: self.artifacts.iter().filter_map(ArtifactRecord::data).filter(|d| !d.hits.is_empty()).count(),
            total_term_hits: self.hits().count(),
            errors: self.artifacts.iter().filter(|r| r.is_error()).count(),
        }
    }

    /// 至少一个命中，且所有命中都属于基线分类
    pub fn is_enablement_only(&self, baseline: &str) -> bool {
        let mut any = false;
        for h in self.hits() {
            if h.category != baseline {
                return false;
            }
            any = true;
        }
        any
    }
}

/// 长表导出的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongRow<'a> {
    pub app: &'a str,
    pub artifact: &'a str,
    pub category: &'a str,
    pub hit: &'a TermHit,
}

fn cmp_category(a: &str, b: &str, fallback: &str) -> Ordering {
    (a == fallback).cmp(&(b == fallback)).then_with(|| a.cmp(b))
}

/// 按分类分组（分类有序，组内保持发现顺序）
pub fn group_by_category<'a>(hits: &'a [TermHit], fallback: &str) -> Vec<(&'a str, Vec<&'a TermHit>)> {
    let mut groups: Vec<(&str, Vec<&TermHit>)> = Vec::new();
    for h in hits {
        match groups.iter_mut().find(|(c, _)| *c == h.category) {
            Some((_, v)) => v.push(h),
            None => groups.push((h.category.as_str(), vec![h])),
        }
    }
    // 稳定排序，组内顺序不变
    groups.sort_by(|a, b| cmp_category(a.0, b.0, fallback));
    groups
}

fn csv_field(s: &str) -> Cow<'_, str> {
    if s.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}

fn csv_line(out: &mut String, fields: &[&str]) {
    let row: Vec<Cow<'_, str>> = fields.iter().map(|f| csv_field(f)).collect();
    out.push_str(&row.join(","));
    out.push('\n');
}

/// 跨应用报告（主报告、CSV 导出、enablement-only 列表）
#[derive(Debug, Clone)]
pub struct CrossAppReport {
    apps: Vec<AppScanResult>,
    baseline: String,
    fallback: String,
}

impl CrossAppReport {
    pub fn new(mut apps: Vec<AppScanResult>, baseline: &str, fallback: &str) -> Self {
        apps.sort_by(|a, b| cmp_case_insensitive(&a.app, &b.app));
        for app in &mut apps {
            app.artifacts.sort_by(|a, b| cmp_case_insensitive(a.artifact(), b.artifact()));
        }
        Self { apps, baseline: baseline.to_string(), fallback: fallback.to_string() }
    }

    pub fn apps(&self) -> &[AppScanResult] {
        &self.apps
    }

    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    pub fn enablement_only(&self) -> Vec<&str> {
        self.apps.iter().filter(|a| a.is_enablement_only(&self.baseline)).map(|a| a.app.as_str()).collect()
    }

    /// 每个有命中的文件：(文件键, 分组)
    fn files_with_hits<'a>(&'a self, app: &'a AppScanResult) -> impl Iterator<Item = (&'a str, Vec<(&'a str, Vec<&'a TermHit>)>)> + 'a {
        app.artifacts.iter().filter_map(move |rec| match rec {
            ArtifactRecord::Scanned { artifact, data } if !data.hits.is_empty() => {
                Some((artifact.as_str(), group_by_category(&data.hits, &self.fallback)))
            }
            _ => None,
        })
    }

    pub fn master_text(&self) -> String {
        let mut lines: Vec<String> = MASTER_HEADER.iter().map(|s| s.to_string()).collect();
        lines.push(String::new());
        lines.push(String::new());

        for app in &self.apps {
            let mut block = Vec::new();
            for (artifact, groups) in self.files_with_hits(app) {
                block.push(format!("File: {artifact}"));
                for (category, hits) in groups {
                    block.push(format!("  [CATEGORY] {category}"));
                    for h in hits {
                        block.push(format!("    TERM: {} (confidence={})", h.term, h.confidence));
                        block.extend(h.examples.iter().map(|ex| format!("      {ex}")));
                        block.push(String::new());
                    }
                }
                block.push(String::new());
            }
            if block.is_empty() {
                continue;
            }
            lines.push(format!("===== APP: {} =====", app.app));
            lines.push(String::new());
            lines.extend(block);
            lines.push(String::new());
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    pub fn long_rows(&self) -> Vec<LongRow<'_>> {
        let mut rows = Vec::new();
        for app in &self.apps {
            for (artifact, groups) in self.files_with_hits(app) {
                for (category, hits) in groups {
                    rows.extend(hits.into_iter().map(|hit| LongRow { app: &app.app, artifact, category, hit }));
                }
            }
        }
        rows
    }

    pub fn long_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(LONG_CSV_HEADER);
        out.push('\n');
        for r in self.long_rows() {
            let count = r.hit.examples.len().to_string();
            csv_line(&mut out, &[r.app, r.artifact, r.category, r.hit.confidence.as_str(), r.hit.term.as_str(), count.as_str()]);
        }
        out
    }

    /// 每个有命中的应用：跨文件去重后的分类列表
    pub fn app_categories(&self) -> Vec<(&str, Vec<&str>)> {
        let mut out = Vec::new();
        for app in &self.apps {
            let mut cats: Vec<&str> = Vec::new();
            for h in app.hits() {
                if !cats.contains(&h.category.as_str()) {
                    cats.push(&h.category);
                }
            }
            if cats.is_empty() {
                continue;
            }
            cats.sort_by(|a, b| cmp_category(a, b, &self.fallback));
            out.push((app.app.as_str(), cats));
        }
        out
    }

    /// 每行一个 (应用, 分类)
    pub fn collapsed_csv(&self) -> String {
        let mut out = String::from("app_id,functionality\n");
        for (app, cats) in self.app_categories() {
            for cat in cats {
                csv_line(&mut out, &[app, cat]);
            }
        }
        out
    }

    /// 每行一个应用，分类以 "; " 连接
    pub fn wide_csv(&self) -> String {
        let mut out = String::from("app_id,detected_functionality\n");
        for (app, cats) in self.app_categories() {
            let joined = cats.join("; ");
            csv_line(&mut out, &[app, joined.as_str()]);
        }
        out
    }

    pub fn functionality_text(&self) -> String {
        let mut out = String::new();
        for (app, cats) in self.app_categories() {
            let _ = writeln!(out, "{app}:");
            for cat in cats {
                let _ = writeln!(out, "  - {cat}");
            }
            out.push('\n');
        }
        out
    }

    pub fn enablement_text(&self) -> String {
        let mut out = String::new();
        for app in self.enablement_only() {
            out.push_str(app);
            out.push('\n');
        }
        out
    }
}
