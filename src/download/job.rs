//! Per-request file namespace
//!
//! Every intermediate file of one pipeline invocation carries the request's
//! unique id (`raw_<id>.*`, `final_<id>.*`), so concurrent requests never
//! collide in the shared download directory. [`JobFiles`] removes everything
//! bearing its id when dropped, unless the final file was handed over.

use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Length of the hex id embedded in filenames
const JOB_ID_LEN: usize = 16;

/// Unique request identifier derived from the URL, the clock, and a random salt
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new(url: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let salt: u64 = rand::thread_rng().gen();

        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update(nanos.to_le_bytes());
        hasher.update(salt.to_le_bytes());
        let digest = hex::encode(hasher.finalize());
        JobId(digest[..JOB_ID_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Suffixes of files the extractor is still writing
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp", ".tmp"];

/// Filesystem namespace and cleanup guard for one request
#[derive(Debug)]
pub struct JobFiles {
    id: JobId,
    dir: PathBuf,
    keep: Option<PathBuf>,
}

impl JobFiles {
    pub fn new(dir: impl Into<PathBuf>, url: &str) -> Self {
        Self {
            id: JobId::new(url),
            dir: dir.into(),
            keep: None,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn raw_prefix(&self) -> String {
        format!("raw_{}", self.id)
    }

    pub fn final_prefix(&self) -> String {
        format!("final_{}", self.id)
    }

    /// yt-dlp output template (`raw_<id>.%(ext)s`)
    pub fn raw_template(&self) -> PathBuf {
        self.dir.join(format!("{}.%(ext)s", self.raw_prefix()))
    }

    pub fn raw_path(&self, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.raw_prefix(), ext))
    }

    pub fn final_path(&self, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.final_prefix(), ext))
    }

    /// Whether `name` belongs to this request
    pub fn owns(&self, name: &str) -> bool {
        owned_by(name, &self.raw_prefix()) || owned_by(name, &self.final_prefix())
    }

    /// Finished raw file for this request, if any landed on disk.
    ///
    /// Partial downloads are skipped; the first match in name order wins.
    pub fn find_raw_file(&self) -> Option<PathBuf> {
        let prefix = self.raw_prefix();
        let mut candidates: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .ok()?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                let complete = owned_by(&name, &prefix) && !PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s));
                complete.then(|| entry.path())
            })
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }

    /// Every file in the directory bearing this request's id
    pub fn list_owned(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .filter(|entry| self.owns(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path())
            .collect()
    }

    /// Hand `path` over to the caller; it survives cleanup.
    pub fn keep(&mut self, path: impl Into<PathBuf>) {
        self.keep = Some(path.into());
    }

    /// Removes every file of this request except the kept one.
    pub fn cleanup(&self) {
        for path in self.list_owned() {
            if self.keep.as_deref() == Some(path.as_path()) {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => log::debug!("[{}] removed {}", self.id, path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("[{}] failed to remove {}: {}", self.id, path.display(), e),
            }
        }
    }
}

impl Drop for JobFiles {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// `raw_<id>` matches `raw_<id>.mp4`, `raw_<id>.f137.mp4.part`, but not `raw_<id>x`
fn owned_by(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix).is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

/// Removes a file if present, logging anything other than "not found".
pub fn remove_file_quiet(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
