//! 存储抽象：列举应用与文件、读取字节、写出结果
//!
//! 扫描核心只依赖这两个 trait，文件系统实现基于 walkdir，内存实现用于测试与嵌入调用。
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

/// 输入侧：应用目录树
pub trait ArtifactSource: Sync {
    /// 应用标识列表（顺序不保证，由调用方排序）
    fn apps(&self) -> io::Result<Vec<String>>;
    /// 某应用下的文件键（`/` 分隔的相对路径）
    fn artifacts(&self, app: &str) -> io::Result<Vec<String>>;
    fn read(&self, app: &str, artifact: &str) -> io::Result<Vec<u8>>;
    /// 写入元数据的来源位置描述
    fn location(&self, app: &str) -> String;
}

/// 输出侧：以 `/` 分隔的相对路径写出完整内容
pub trait OutputSink {
    fn write(&mut self, path: &str, contents: &[u8]) -> io::Result<()>;
    /// 删除某目录下之前写出的全部内容（目录不存在时视为成功）
    fn clear(&mut self, dir: &str) -> io::Result<()>;
}

/// 不区分大小写的字典序；忽略大小写后相同时按原始字节序决胜，保证全序
pub fn cmp_case_insensitive(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

pub fn sort_case_insensitive(keys: &mut [String]) {
    keys.sort_by(|a, b| cmp_case_insensitive(a, b));
}

fn join_key(root: &Path, key: &str) -> PathBuf {
    let mut p = root.to_path_buf();
    p.extend(key.split('/').filter(|s| !s.is_empty()));
    p
}

/// 文件系统来源：`root/<app>[/<subdir>]/**/*.<ext>`
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
    subdir: Option<PathBuf>,
    extensions: Vec<String>,
    only_apps: Option<BTreeSet<String>>,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            root: root.into(),
            subdir: None,
            only_apps: None,
            extensions: extensions.iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect(),
        }
    }

    /// 只在每个应用目录下的固定子目录中查找（例如 `normalized/ascii`）
    pub fn with_subdir(mut self, subdir: impl Into<PathBuf>) -> Self {
        self.subdir = Some(subdir.into());
        self
    }

    /// 只列出给定的应用（其余目录视为不存在）
    pub fn with_apps(mut self, apps: impl IntoIterator<Item = String>) -> Self {
        self.only_apps = Some(apps.into_iter().collect());
        self
    }

    fn app_base(&self, app: &str) -> PathBuf {
        let base = self.root.join(app);
        match &self.subdir {
            Some(sub) => base.join(sub),
            None => base,
        }
    }

    fn wanted(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|want| want.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

impl ArtifactSource for FsSource {
    fn apps(&self) -> io::Result<Vec<String>> {
        let mut apps = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.only_apps.as_ref().is_some_and(|only| !only.contains(&name)) {
                continue;
            }
            // 指定子目录时，缺少该子目录的应用直接跳过
            if self.subdir.is_some() && !self.app_base(&name).is_dir() {
                continue;
            }
            apps.push(name);
        }
        Ok(apps)
    }

    fn artifacts(&self, app: &str) -> io::Result<Vec<String>> {
        let base = self.app_base(app);
        let mut keys = Vec::new();
        for entry in WalkDir::new(&base).min_depth(1) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    warn!(app, error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.wanted(entry.path()) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&base) else { continue };
            let key: Vec<String> = rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
            keys.push(key.join("/"));
        }
        Ok(keys)
    }

    fn read(&self, app: &str, artifact: &str) -> io::Result<Vec<u8>> {
        std::fs::read(join_key(&self.app_base(app), artifact))
    }

    fn location(&self, app: &str) -> String {
        let base = self.app_base(app);
        std::fs::canonicalize(&base).unwrap_or(base).display().to_string()
    }
}

/// 文件系统输出：按需创建父目录
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl OutputSink for FsSink {
    fn write(&mut self, path: &str, contents: &[u8]) -> io::Result<()> {
        let full = join_key(&self.root, path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, contents)
    }

    fn clear(&mut self, dir: &str) -> io::Result<()> {
        match std::fs::remove_dir_all(join_key(&self.root, dir)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
enum MemoryEntry {
    Bytes(Vec<u8>),
    Unreadable(io::ErrorKind),
}

/// 内存来源：不做扩展名过滤，插入什么就扫描什么
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    apps: BTreeMap<String, BTreeMap<String, MemoryEntry>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, app: &str, artifact: &str, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.apps.entry(app.to_string()).or_default().insert(artifact.to_string(), MemoryEntry::Bytes(bytes.into()));
        self
    }

    /// 插入一个读取必然失败的文件
    pub fn insert_unreadable(&mut self, app: &str, artifact: &str, kind: io::ErrorKind) -> &mut Self {
        self.apps.entry(app.to_string()).or_default().insert(artifact.to_string(), MemoryEntry::Unreadable(kind));
        self
    }

    /// 以 `<app>/<subdir>/<rest>` 形式的输出构建新的来源（用于串联各阶段）
    pub fn from_outputs(sink: &MemorySink, subdir: &str) -> Self {
        let mut src = Self::new();
        let marker = format!("/{}/", subdir.trim_matches('/'));
        for (path, bytes) in &sink.files {
            if let Some(idx) = path.find(&marker) {
                let app = &path[..idx];
                let rest = &path[idx + marker.len()..];
                if !app.contains('/') && !rest.is_empty() {
                    src.insert(app, rest, bytes.clone());
                }
            }
        }
        src
    }
}

impl ArtifactSource for MemorySource {
    fn apps(&self) -> io::Result<Vec<String>> {
        Ok(self.apps.keys().cloned().collect())
    }

    fn artifacts(&self, app: &str) -> io::Result<Vec<String>> {
        self.apps
            .get(app)
            .map(|files| files.keys().cloned().collect())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown app {app}")))
    }

    fn read(&self, app: &str, artifact: &str) -> io::Result<Vec<u8>> {
        match self.apps.get(app).and_then(|files| files.get(artifact)) {
            Some(MemoryEntry::Bytes(b)) => Ok(b.clone()),
            Some(MemoryEntry::Unreadable(kind)) => Err(io::Error::new(*kind, format!("cannot read {artifact}"))),
            None => Err(io::Error::new(io::ErrorKind::NotFound, format!("{app}/{artifact} not found"))),
        }
    }

    fn location(&self, app: &str) -> String {
        format!("memory://{app}")
    }
}

/// 内存输出
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn text(&self, path: &str) -> Option<String> {
        self.get(path).map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

impl OutputSink for MemorySink {
    fn write(&mut self, path: &str, contents: &[u8]) -> io::Result<()> {
        self.files.insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    fn clear(&mut self, dir: &str) -> io::Result<()> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.files.retain(|path, _| !path.starts_with(&prefix));
        Ok(())
    }
}
