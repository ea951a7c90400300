use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

pub const INDEX_FILE: &str = "index.json";
pub const GROUPS_FILE: &str = "groups.json";
pub const HASHES_FILE: &str = "hashes.json";
pub const META_FILE: &str = "meta.toml";
pub const LOCK_FILE: &str = "LOCK";

fn is_name_only(s: &str) -> bool {
    !s.contains('/') && !s.contains('\\')
}

pub fn default_cache_base_dir() -> Result<PathBuf> {
    let proj = ProjectDirs::from("dev", "neardupes", "neardupes")
        .ok_or_else(|| anyhow!("Unable to determine platform data directory"))?;
    Ok(proj.data_dir().to_path_buf())
}

pub fn resolve_cache_dir(cache: &str) -> Result<PathBuf> {
    if is_name_only(cache) {
        Ok(default_cache_base_dir()?.join(cache))
    } else {
        Ok(PathBuf::from(cache))
    }
}

/// Ensure the cache directory exists and is ours.
/// If it is missing or empty, we treat it as a new cache and allow init.
/// If it exists and is non-empty but carries no marker file, abort.
pub fn ensure_cache_dir_is_valid_or_empty(dir: &Path) -> Result<CacheDirState> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(anyhow!("Cache path exists but is not a directory"));
        }

        let entries: Vec<_> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to iterate directory {}", dir.display()))?;

        if entries.is_empty() {
            return Ok(CacheDirState::Empty);
        }

        if dir.join(META_FILE).is_file() {
            Ok(CacheDirState::LooksValid)
        } else {
            Err(anyhow!(
                "Directory exists but does not look like a neardupes cache (expected {})",
                META_FILE
            ))
        }
    } else {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(CacheDirState::Empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDirState {
    /// Directory exists but is empty, or it was created just now.
    Empty,
    /// Directory carries the meta.toml marker.
    LooksValid,
}
