//! 扫描主流程与并行调度
//!
//! 三个阶段，各自独立写出结果：
//! 1. normalize：二进制 → 归一化 ASCII 文本（`<app>/normalized/ascii/<rel_key>.txt`）+ `normalize_meta.json`
//! 2. search：二进制 → 多编码原始字节命中（`matches.json`）
//! 3. categorize：归一化文本 → 分类命中（`scan_matches.json`）+ 主报告 / CSV / enablement-only 列表
//!
//! 稳定性保证：应用与文件均按不区分大小写的字典序处理；并行时按输入顺序收集结果后再写出，
//! 输出与线程数无关。
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::categorize::Categorizer;
use crate::engine_bytes::ByteSearcher;
use crate::engine_utf8::collect_evidence;
use crate::error::{ArtifactError, Result, ScanError};
use crate::findings::{RawMatches, TextHits};
use crate::options::{ScanOptions, ScanStats};
use crate::report::{AppScanResult, CrossAppReport};
use crate::store::{sort_case_insensitive, ArtifactSource, FsSink, FsSource, OutputSink};
use crate::strings::{extract_strings, render_normalized};
use crate::types::{ArtifactRecord, SearchTerm};

pub const NORMALIZED_SUBDIR: &str = "normalized/ascii";
pub const NORMALIZE_META: &str = "normalize_meta.json";
pub const RAW_MATCHES: &str = "matches.json";
pub const SCAN_MATCHES: &str = "scan_matches.json";
pub const MASTER_REPORT: &str = "master-results.txt";
pub const SUMMARY_CSV: &str = "scan_summary.csv";
pub const ENABLEMENT_LIST: &str = "enablement_only_apps.txt";
pub const EXPORT_LONG_CSV: &str = "exports/app_functionality_long.csv";
pub const EXPORT_WIDE_CSV: &str = "exports/app_functionality.csv";
pub const EXPORT_TXT: &str = "exports/app_functionality.txt";

/// 文件键 → 归一化输出文件名键（路径分隔符替换为 `__`）
///
/// 映射不是单射：`lib/a__b.so` 与 `lib__a/b.so` 得到相同的键。
/// `normalize_apps` 按排序后的顺序保留第一个，之后撞键的文件记为错误（kind `RelKeyCollision`）。
pub fn rel_key(artifact: &str) -> String {
    artifact.replace('/', "__")
}

/// 前置条件：目录必须存在，否则在写出任何结果之前失败
pub fn require_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ScanError::MissingInput(path.to_path_buf()))
    }
}

/// 单文件任务执行器：线程数为 1 时串行，否则使用 Rayon 线程池；结果始终按输入顺序返回
struct Workers {
    pool: Option<ThreadPool>,
}

impl Workers {
    fn new(opts: &ScanOptions) -> Result<Self> {
        let threads = opts.thread_count();
        if threads <= 1 {
            return Ok(Self { pool: None });
        }
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        Ok(Self { pool: Some(pool) })
    }

    fn map<T, F>(&self, keys: &[String], f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(&str) -> T + Sync + Send,
    {
        match &self.pool {
            None => keys.iter().map(|k| f(k.as_str())).collect(),
            Some(pool) => pool.install(|| keys.par_iter().map(|k| f(k.as_str())).collect()),
        }
    }
}

#[derive(Serialize)]
struct AppDocument<'a, S, T> {
    app: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp_utc: Option<String>,
    source_path: String,
    summary: S,
    files: Vec<&'a ArtifactRecord<T>>,
}

fn timestamp(opts: &ScanOptions) -> Option<String> {
    opts.timestamps.then(|| chrono::Utc::now().to_rfc3339())
}

fn emit(sink: &mut dyn OutputSink, path: &str, contents: &[u8]) -> Result<()> {
    sink.write(path, contents).map_err(|source| ScanError::Write { path: path.to_string(), source })
}

fn emit_json<S: Serialize>(sink: &mut dyn OutputSink, path: &str, doc: &S) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(doc)?;
    emit(sink, path, &bytes)
}

fn list_apps<S: ArtifactSource + ?Sized>(src: &S) -> Result<Vec<String>> {
    let mut apps = src.apps().map_err(|source| ScanError::Listing { app: "*".into(), source })?;
    sort_case_insensitive(&mut apps);
    Ok(apps)
}

fn list_artifacts<S: ArtifactSource + ?Sized>(src: &S, app: &str, opts: &ScanOptions) -> Result<Vec<String>> {
    let mut keys = src.artifacts(app).map_err(|source| ScanError::Listing { app: app.to_string(), source })?;
    sort_case_insensitive(&mut keys);
    if let Some(max) = opts.max_files_per_app {
        keys.truncate(max);
    }
    Ok(keys)
}

fn read_error(app: &str, artifact: &str, err: &std::io::Error) -> ArtifactError {
    warn!(app, artifact, error = %err, "failed to read artifact");
    ArtifactError::from_io(err)
}

// ---------------------------------------------------------------------------
// 阶段 1：归一化
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedFile {
    pub rel_key: String,
    pub output: String,
    pub strings: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeSummary {
    pub artifact_count: usize,
    pub normalized_count: usize,
    pub errors: usize,
}

pub fn normalize_apps<S>(src: &S, sink: &mut dyn OutputSink, opts: &ScanOptions) -> Result<ScanStats>
where
    S: ArtifactSource + ?Sized,
{
    let workers = Workers::new(opts)?;
    let mut stats = ScanStats::default();

    for app in list_apps(src)? {
        let keys = list_artifacts(src, &app, opts)?;
        info!(app = %app, artifacts = keys.len(), "normalizing");

        let rendered = workers.map(&keys, |key| {
            src.read(&app, key)
                .map(|bytes| {
                    let strings: Vec<_> = extract_strings(&bytes, opts.min_string_len).collect();
                    (strings.len(), render_normalized(strings))
                })
                .map_err(|e| read_error(&app, key, &e))
        });

        // 每次运行从头重建该应用的归一化目录
        let dir = format!("{app}/{NORMALIZED_SUBDIR}");
        sink.clear(&dir).map_err(|source| ScanError::Write { path: dir.clone(), source })?;

        let mut files = Vec::with_capacity(keys.len());
        let mut written: HashSet<String> = HashSet::with_capacity(keys.len());
        let mut summary = NormalizeSummary { artifact_count: keys.len(), ..Default::default() };
        for (key, res) in keys.iter().zip(rendered) {
            let rk = rel_key(key);
            let res = res.and_then(|ok| {
                if written.contains(&rk) {
                    warn!(app = %app, artifact = %key, rel_key = %rk, "normalized file name already taken");
                    Err(ArtifactError {
                        kind: "RelKeyCollision".to_string(),
                        message: format!("normalized name {rk}.txt is already used by another artifact"),
                    })
                } else {
                    Ok(ok)
                }
            });
            match res {
                Ok((count, text)) => {
                    written.insert(rk.clone());
                    let output = format!("{app}/{NORMALIZED_SUBDIR}/{rk}.txt");
                    emit(sink, &output, text.as_bytes())?;
                    debug!(app = %app, artifact = %key, strings = count, "normalized");
                    summary.normalized_count += 1;
                    files.push(ArtifactRecord::Scanned {
                        artifact: key.clone(),
                        data: NormalizedFile { rel_key: rk, output, strings: count },
                    });
                }
                Err(error) => {
                    summary.errors += 1;
                    files.push(ArtifactRecord::Error { artifact: key.clone(), error });
                }
            }
        }

        let doc = AppDocument {
            app: &app,
            timestamp_utc: timestamp(opts),
            source_path: src.location(&app),
            summary: summary.clone(),
            files: files.iter().collect(),
        };
        emit_json(sink, &format!("{app}/{NORMALIZE_META}"), &doc)?;
        info!(app = %app, normalized = summary.normalized_count, errors = summary.errors, "normalize finished");

        stats.absorb(&ScanStats {
            apps: 1,
            artifacts: summary.artifact_count,
            artifacts_with_hits: 0,
            hits: 0,
            errors: summary.errors,
        });
    }

    Ok(stats)
}

// ---------------------------------------------------------------------------
// 阶段 2：原始字节多编码搜索
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawSummary {
    pub artifact_count: usize,
    pub files_with_hits: usize,
    pub total_hits: usize,
    pub errors: usize,
}

pub fn search_apps<S>(src: &S, sink: &mut dyn OutputSink, terms: &[SearchTerm], opts: &ScanOptions) -> Result<ScanStats>
where
    S: ArtifactSource + ?Sized,
{
    let workers = Workers::new(opts)?;
    let searcher = ByteSearcher::new(terms, opts.max_hits_per_term)?;
    let mut stats = ScanStats::default();

    for app in list_apps(src)? {
        let keys = list_artifacts(src, &app, opts)?;
        info!(app = %app, artifacts = keys.len(), terms = terms.len(), "searching raw bytes");

        let results = workers.map(&keys, |key| {
            src.read(&app, key).map(|bytes| searcher.search(&bytes)).map_err(|e| read_error(&app, key, &e))
        });

        let mut summary = RawSummary { artifact_count: keys.len(), ..Default::default() };
        let mut files = Vec::new();
        for (key, res) in keys.iter().zip(results) {
            match res {
                Ok(findings) if findings.is_empty() => {}
                Ok(findings) => {
                    summary.files_with_hits += 1;
                    summary.total_hits += findings.len();
                    files.push(ArtifactRecord::Scanned { artifact: key.clone(), data: RawMatches { findings } });
                }
                Err(error) => {
                    summary.errors += 1;
                    files.push(ArtifactRecord::Error { artifact: key.clone(), error });
                }
            }
        }

        let doc = AppDocument {
            app: &app,
            timestamp_utc: timestamp(opts),
            source_path: src.location(&app),
            summary: summary.clone(),
            files: files.iter().collect(),
        };
        emit_json(sink, &format!("{app}/{RAW_MATCHES}"), &doc)?;
        info!(
            app = %app,
            files_with_hits = summary.files_with_hits,
            total_hits = summary.total_hits,
            errors = summary.errors,
            "raw search finished"
        );

        stats.absorb(&ScanStats {
            apps: 1,
            artifacts: summary.artifact_count,
            artifacts_with_hits: summary.files_with_hits,
            hits: summary.total_hits,
            errors: summary.errors,
        });
    }

    Ok(stats)
}

// ---------------------------------------------------------------------------
// 阶段 3：归一化文本分类 + 跨应用报告
// ---------------------------------------------------------------------------

/// 扫描单个应用的归一化文本
pub fn scan_app_text<S>(
    src: &S,
    app: &str,
    terms: &[SearchTerm],
    categorizer: &Categorizer,
    opts: &ScanOptions,
) -> Result<AppScanResult>
where
    S: ArtifactSource + ?Sized,
{
    scan_app_text_with(src, app, terms, categorizer, opts, &Workers::new(opts)?)
}

fn scan_app_text_with<S>(
    src: &S,
    app: &str,
    terms: &[SearchTerm],
    categorizer: &Categorizer,
    opts: &ScanOptions,
    workers: &Workers,
) -> Result<AppScanResult>
where
    S: ArtifactSource + ?Sized,
{
    let keys = list_artifacts(src, app, opts)?;
    let results = workers.map(&keys, |key| {
        src.read(app, key)
            .map(|bytes| {
                let text = String::from_utf8_lossy(&bytes);
                collect_evidence(&text, terms, categorizer, opts.max_examples_per_term)
            })
            .map_err(|e| read_error(app, key, &e))
    });

    let artifacts = keys
        .into_iter()
        .zip(results)
        .map(|(artifact, res)| match res {
            Ok(hits) => ArtifactRecord::Scanned { artifact, data: TextHits { hits } },
            Err(error) => ArtifactRecord::Error { artifact, error },
        })
        .collect();

    Ok(AppScanResult { app: app.to_string(), location: src.location(app), artifacts })
}

pub fn categorize_apps<S>(
    src: &S,
    sink: &mut dyn OutputSink,
    terms: &[SearchTerm],
    categorizer: &Categorizer,
    opts: &ScanOptions,
) -> Result<CrossAppReport>
where
    S: ArtifactSource + ?Sized,
{
    let workers = Workers::new(opts)?;
    let mut apps = Vec::new();

    for app in list_apps(src)? {
        let result = scan_app_text_with(src, &app, terms, categorizer, opts, &workers)?;
        let summary = result.summary();

        // JSON 仅保留有命中或出错的文件
        let files = result
            .artifacts
            .iter()
            .filter(|r| r.data().map_or(true, |d| !d.hits.is_empty()))
            .collect();
        let doc = AppDocument {
            app: &app,
            timestamp_utc: timestamp(opts),
            source_path: result.location.clone(),
            summary: summary.clone(),
            files,
        };
        emit_json(sink, &format!("{app}/{SCAN_MATCHES}"), &doc)?;
        info!(
            app = %app,
            files_with_hits = summary.files_with_hits,
            total_term_hits = summary.total_term_hits,
            errors = summary.errors,
            "categorize finished"
        );
        apps.push(result);
    }

    let report = CrossAppReport::new(apps, categorizer.baseline(), categorizer.fallback());
    write_reports(&report, sink)?;
    Ok(report)
}

/// 写出跨应用报告：每次运行都从头重建
pub fn write_reports(report: &CrossAppReport, sink: &mut dyn OutputSink) -> Result<()> {
    emit(sink, MASTER_REPORT, report.master_text().as_bytes())?;
    emit(sink, SUMMARY_CSV, report.long_csv().as_bytes())?;
    emit(sink, ENABLEMENT_LIST, report.enablement_text().as_bytes())?;
    emit(sink, EXPORT_LONG_CSV, report.collapsed_csv().as_bytes())?;
    emit(sink, EXPORT_WIDE_CSV, report.wide_csv().as_bytes())?;
    emit(sink, EXPORT_TXT, report.functionality_text().as_bytes())?;
    Ok(())
}

pub fn report_stats(report: &CrossAppReport) -> ScanStats {
    let mut stats = ScanStats::default();
    for app in report.apps() {
        let s = app.summary();
        stats.absorb(&ScanStats {
            apps: 1,
            artifacts: s.artifacts_scanned,
            artifacts_with_hits: s.files_with_hits,
            hits: s.total_term_hits,
            errors: s.errors,
        });
    }
    stats
}

/// 完整流水线的汇总
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub normalize: ScanStats,
    pub search: ScanStats,
    pub categorize: ScanStats,
    pub enablement_only: Vec<String>,
}

/// 在文件系统上依次执行三个阶段
pub fn run_pipeline(
    input: &Path,
    output: &Path,
    terms: &[SearchTerm],
    categorizer: &Categorizer,
    opts: &ScanOptions,
) -> Result<RunSummary> {
    require_dir(input)?;
    let binaries = FsSource::new(input, &opts.extensions);
    let mut sink = FsSink::new(output);

    let normalize = normalize_apps(&binaries, &mut sink, opts)?;
    let search = search_apps(&binaries, &mut sink, terms, opts)?;

    // 只分类本次输入中存在的应用，输出目录里残留的旧应用不参与
    let texts = FsSource::new(output, &["txt".to_string()])
        .with_subdir(NORMALIZED_SUBDIR)
        .with_apps(list_apps(&binaries)?);
    let report = categorize_apps(&texts, &mut sink, terms, categorizer, opts)?;

    Ok(RunSummary {
        normalize,
        search,
        categorize: report_stats(&report),
        enablement_only: report.enablement_only().into_iter().map(str::to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleTable;
    use crate::store::{MemorySink, MemorySource};

    fn opts() -> ScanOptions {
        ScanOptions { threads: Some(1), timestamps: false, ..ScanOptions::default() }
    }

    #[test]
    fn rel_key_flattens_path() {
        assert_eq!(rel_key("lib/arm64-v8a/libgaze.so"), "lib__arm64-v8a__libgaze.so");
    }

    #[test]
    fn require_dir_rejects_missing_path() {
        assert!(matches!(require_dir(Path::new("/no/such/dir")), Err(ScanError::MissingInput(_))));
    }

    #[test]
    fn normalize_records_errors_and_continues() {
        let mut src = MemorySource::new();
        src.insert("app", "lib/a.so", b"\x00\x00GazeProvider\x00".to_vec())
            .insert_unreadable("app", "lib/b.so", std::io::ErrorKind::PermissionDenied);
        let mut sink = MemorySink::new();

        let stats = normalize_apps(&src, &mut sink, &opts()).unwrap();
        assert_eq!(stats.artifacts, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(sink.text("app/normalized/ascii/lib__a.so.txt").unwrap(), "00000002 GazeProvider\n");

        let meta: serde_json::Value = serde_json::from_slice(sink.get("app/normalize_meta.json").unwrap()).unwrap();
        assert_eq!(meta["summary"]["normalized_count"], 1);
        assert_eq!(meta["summary"]["errors"], 1);
        assert_eq!(meta["files"][1]["status"], "error");
        assert_eq!(meta["files"][1]["error"]["kind"], "PermissionDenied");
        assert!(meta.get("timestamp_utc").is_none());
    }

    #[test]
    fn colliding_rel_keys_keep_first_and_record_error() {
        let mut src = MemorySource::new();
        src.insert("app", "lib__a/b.so", b"\x00SecondOne\x00".to_vec()).insert("app", "lib/a__b.so", b"\x00FirstOne\x00".to_vec());
        let mut sink = MemorySink::new();

        let stats = normalize_apps(&src, &mut sink, &opts()).unwrap();
        assert_eq!(stats.errors, 1);
        assert_eq!(sink.text("app/normalized/ascii/lib__a__b.so.txt").unwrap(), "00000001 FirstOne\n");

        let meta: serde_json::Value = serde_json::from_slice(sink.get("app/normalize_meta.json").unwrap()).unwrap();
        assert_eq!(meta["summary"]["normalized_count"], 1);
        assert_eq!(meta["files"][0]["artifact"], "lib/a__b.so");
        assert_eq!(meta["files"][1]["artifact"], "lib__a/b.so");
        assert_eq!(meta["files"][1]["error"]["kind"], "RelKeyCollision");
    }

    #[test]
    fn normalize_drops_stale_outputs_from_earlier_runs() {
        let mut sink = MemorySink::new();
        sink.write("app/normalized/ascii/lib__gone.so.txt", b"00000000 PupilDilation\n").unwrap();
        sink.write("other/normalized/ascii/lib__x.so.txt", b"00000000 Blink\n").unwrap();

        let mut src = MemorySource::new();
        src.insert("app", "lib/a.so", b"EyeTracked".to_vec());
        normalize_apps(&src, &mut sink, &opts()).unwrap();

        let normalized: Vec<_> = sink.paths().filter(|p| p.starts_with("app/normalized/")).collect();
        assert_eq!(normalized, vec!["app/normalized/ascii/lib__a.so.txt"]);
        // 不在本次输入中的应用不受影响
        assert!(sink.get("other/normalized/ascii/lib__x.so.txt").is_some());
    }

    #[test]
    fn max_files_per_app_applies_after_sorting() {
        let mut src = MemorySource::new();
        src.insert("app", "b.so", b"bbbb".to_vec()).insert("app", "A.so", b"aaaa".to_vec());
        let mut sink = MemorySink::new();
        let o = ScanOptions { max_files_per_app: Some(1), ..opts() };
        normalize_apps(&src, &mut sink, &o).unwrap();
        assert!(sink.get("app/normalized/ascii/A.so.txt").is_some());
        assert!(sink.get("app/normalized/ascii/b.so.txt").is_none());
    }

    #[test]
    fn search_writes_only_hit_and_error_files() {
        let mut src = MemorySource::new();
        let mut wide = b"\x00\x00".to_vec();
        wide.extend("Gaze".encode_utf16().flat_map(u16::to_le_bytes));
        src.insert("app", "hit.so", wide).insert("app", "miss.so", b"nothing".to_vec());
        let mut sink = MemorySink::new();

        let stats = search_apps(&src, &mut sink, &[SearchTerm::new("Gaze")], &opts()).unwrap();
        assert_eq!(stats.hits, 1);
        let doc: serde_json::Value = serde_json::from_slice(sink.get("app/matches.json").unwrap()).unwrap();
        assert_eq!(doc["summary"]["artifact_count"], 2);
        assert_eq!(doc["summary"]["files_with_hits"], 1);
        let files = doc["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["artifact"], "hit.so");
        assert_eq!(files[0]["findings"][0]["encoding"], "utf16le");
        assert_eq!(files[0]["findings"][0]["offset_hex"], "00000002");
    }

    #[test]
    fn parallel_and_serial_outputs_match() {
        let mut src = MemorySource::new();
        for i in 0..16 {
            src.insert("app", &format!("lib{i:02}.txt"), format!("00000000 EyeTracked {i}\n00000010 Blink\n").into_bytes());
        }
        let cat = Categorizer::new(&RuleTable::builtin().unwrap(), false);
        let terms = vec![SearchTerm::new("EyeTracked"), SearchTerm::new("Blink")];

        let mut serial = MemorySink::new();
        categorize_apps(&src, &mut serial, &terms, &cat, &opts()).unwrap();
        let mut parallel = MemorySink::new();
        categorize_apps(&src, &mut parallel, &terms, &cat, &ScanOptions { threads: Some(4), ..opts() }).unwrap();

        for path in [MASTER_REPORT, SUMMARY_CSV, "app/scan_matches.json"] {
            assert_eq!(serial.get(path), parallel.get(path), "{path}");
        }
    }
}
