use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const READ_BUF_SIZE: usize = 1024 * 1024; // 1 MiB

/// Hash a file's full contents (BLAKE3, hex-encoded).
///
/// Reads in fixed-size chunks so memory use is independent of file size.
/// An unreadable file is an error for the caller to handle, never a panic.
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut r = BufReader::with_capacity(READ_BUF_SIZE, file);

    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = r
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize().as_bytes()))
}

/// Memoizes content hashes per path.
///
/// A path is hashed at most once until its entry is invalidated (the file
/// was deleted, or its size changed on a rescan). Only successful hashes
/// are cached.
#[derive(Debug, Clone, Default)]
pub struct HashCache {
    entries: HashMap<String, String>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &HashMap<String, String> {
        &self.entries
    }

    pub fn get(&self, path: &str) -> Option<&String> {
        self.entries.get(path)
    }

    /// Memoized content hash for `path`.
    pub fn hash(&mut self, path: &str) -> Result<String> {
        if let Some(h) = self.entries.get(path) {
            return Ok(h.clone());
        }
        let h = hash_file(Path::new(path))?;
        self.entries.insert(path.to_string(), h.clone());
        Ok(h)
    }

    /// Drop the entry for `path` so a stale hash is never reused.
    pub fn invalidate(&mut self, path: &str) {
        self.entries.remove(path);
    }

    /// Drop every entry not accepted by `keep`.
    pub fn retain_paths(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|p, _| keep(p));
    }
}
