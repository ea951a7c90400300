use crate::cachedir::{self, CacheDirState};
use crate::grouper::DuplicateGroup;
use crate::index::{FileIndex, FileRecord};
use crate::normalize;
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Snapshot store for the persisted engine state: file index, last
/// computed duplicate groups and the hash cache, each a whole-file JSON
/// document replaced atomically (write-to-temp, then rename).
pub struct CacheStore {
    pub dir: PathBuf,
    // Keep the lock file open for the lifetime of CacheStore, so the lock is held.
    _lock_file: File,
}

/// Why a cache file could not be loaded. Both cases are recoverable — the
/// caller falls back to an empty cache — but they warrant different logs.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk record shape. Tolerates caches written before `sorted_size`
/// and `hash` existed; the upgrade fills the gaps.
#[derive(Debug, Deserialize)]
struct RawRecord {
    size: u64,
    name: String,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    sorted_size: Option<u64>,
}

fn upgrade_record(raw: RawRecord) -> FileRecord {
    FileRecord {
        size: raw.size,
        normalized_name: raw.name,
        content_hash: raw.hash.filter(|h| !h.is_empty()),
        sorted_key: raw.sorted_size.unwrap_or(raw.size),
    }
}

/// Open a neardupes cache directory:
/// - validates the directory (empty, fresh, or carrying our marker)
/// - acquires an exclusive lock
/// - writes the meta marker on first use
pub fn open(dir: &Path) -> Result<CacheStore> {
    let state = cachedir::ensure_cache_dir_is_valid_or_empty(dir)?;

    // Acquire the lock first (prevents two processes initializing concurrently).
    let lock_file = open_and_lock(dir)?;

    if state == CacheDirState::Empty {
        write_meta(&dir.join(cachedir::META_FILE))
            .with_context(|| format!("Failed to initialize cache in {}", dir.display()))?;
    }

    Ok(CacheStore {
        dir: dir.to_path_buf(),
        _lock_file: lock_file,
    })
}

impl CacheStore {
    fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// A missing index file is simply an empty index. Path keys are NFC
    /// normalized on the way in, like everything else that gets compared.
    pub fn load_index(&self) -> Result<FileIndex, LoadError> {
        let path = self.file(cachedir::INDEX_FILE);
        let Some(text) = read_if_exists(&path)? else {
            return Ok(FileIndex::new());
        };
        let raw: HashMap<String, RawRecord> =
            serde_json::from_str(&text).map_err(|source| LoadError::Corrupt {
                path: path.clone(),
                source,
            })?;
        Ok(raw
            .into_iter()
            .map(|(p, r)| (normalize::nfc(&p), upgrade_record(r)))
            .collect())
    }

    pub fn save_index(&self, index: &FileIndex) -> Result<()> {
        let json = serde_json::to_string(index).context("serialize file index")?;
        write_atomic(&self.file(cachedir::INDEX_FILE), json.as_bytes())
    }

    pub fn load_groups(&self) -> Result<Vec<DuplicateGroup>, LoadError> {
        let path = self.file(cachedir::GROUPS_FILE);
        let Some(text) = read_if_exists(&path)? else {
            return Ok(Vec::new());
        };
        // serde_json's Map keeps insertion order (preserve_order), so the
        // cached group_N sequence survives the round trip.
        let map: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&text).map_err(|source| LoadError::Corrupt {
                path: path.clone(),
                source,
            })?;

        let mut groups = Vec::new();
        for (id, value) in map {
            let paths: Vec<String> = serde_json::from_value(value)
                .map_err(|source| LoadError::Corrupt {
                    path: path.clone(),
                    source,
                })?;
            groups.push(DuplicateGroup { id, paths });
        }
        Ok(groups)
    }

    pub fn save_groups(&self, groups: &[DuplicateGroup]) -> Result<()> {
        let json = render_groups(groups)?;
        write_atomic(&self.file(cachedir::GROUPS_FILE), json.as_bytes())
    }

    pub fn load_hashes(&self) -> Result<HashMap<String, String>, LoadError> {
        let path = self.file(cachedir::HASHES_FILE);
        let Some(text) = read_if_exists(&path)? else {
            return Ok(HashMap::new());
        };
        serde_json::from_str(&text).map_err(|source| LoadError::Corrupt { path, source })
    }

    pub fn save_hashes(&self, entries: &HashMap<String, String>) -> Result<()> {
        let json = serde_json::to_string(entries).context("serialize hash cache")?;
        write_atomic(&self.file(cachedir::HASHES_FILE), json.as_bytes())
    }
}

/// Render groups to the export form: a `group_N` -> paths mapping, pretty
/// printed with stable 2-space indentation and non-ASCII names unescaped.
fn render_groups(groups: &[DuplicateGroup]) -> Result<String> {
    let mut map = serde_json::Map::new();
    for g in groups {
        map.insert(g.id.clone(), serde_json::Value::from(g.paths.clone()));
    }
    serde_json::to_string_pretty(&map).context("serialize duplicate groups")
}

/// Write the current groups to a user-chosen destination, same format as
/// the cache copy.
pub fn export_groups(path: &Path, groups: &[DuplicateGroup]) -> Result<()> {
    let json = render_groups(groups)?;
    write_atomic(path, json.as_bytes())
}

fn read_if_exists(path: &Path) -> Result<Option<String>, LoadError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LoadError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Whole-file overwrite through a temp file, so a crash mid-write can
/// never corrupt the previous snapshot.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut f = File::create(&tmp)
            .with_context(|| format!("create {}", tmp.display()))?;
        f.write_all(bytes)
            .with_context(|| format!("write {}", tmp.display()))?;
        f.sync_all()
            .with_context(|| format!("sync {}", tmp.display()))?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} over {}", tmp.display(), path.display()))
}

fn open_and_lock(dir: &Path) -> Result<File> {
    let lock_path = dir.join(cachedir::LOCK_FILE);
    let f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

    // Exclusive lock: one writer process at a time.
    f.try_lock_exclusive()
        .with_context(|| format!("Cache is locked (in use?): {}", dir.display()))?;

    Ok(f)
}

fn write_meta(meta_path: &Path) -> Result<()> {
    let mut f = File::create(meta_path)
        .with_context(|| format!("Failed to create {}", meta_path.display()))?;

    let contents = r#"# neardupes cache metadata
format = 1
app = "neardupes"
store_kind = "json"
hash = "blake3"
"#;

    f.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to write {}", meta_path.display()))?;

    f.sync_all()
        .with_context(|| format!("Failed to sync {}", meta_path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn index_round_trips() {
        let dir = tempdir().unwrap();
        let store = open(dir.path()).unwrap();

        let mut index = FileIndex::new();
        let mut rec = FileRecord::new(100, "report".into());
        rec.content_hash = Some("abcd".into());
        index.insert("/a/report.txt".into(), rec);

        store.save_index(&index).unwrap();
        assert_eq!(store.load_index().unwrap(), index);
    }

    #[test]
    fn missing_caches_load_empty() {
        let dir = tempdir().unwrap();
        let store = open(dir.path()).unwrap();
        assert!(store.load_index().unwrap().is_empty());
        assert!(store.load_groups().unwrap().is_empty());
        assert!(store.load_hashes().unwrap().is_empty());
    }

    #[test]
    fn old_schema_records_are_upgraded() {
        let dir = tempdir().unwrap();
        let store = open(dir.path()).unwrap();

        // Pre-sorted_size cache with the historical empty-string hash.
        let legacy = r#"{"/a/report.txt": {"size": 100, "name": "report", "hash": ""}}"#;
        fs::write(dir.path().join(cachedir::INDEX_FILE), legacy).unwrap();

        let index = store.load_index().unwrap();
        let rec = index.get("/a/report.txt").unwrap();
        assert_eq!(rec.size, 100);
        assert_eq!(rec.sorted_key, 100);
        assert_eq!(rec.content_hash, None);
    }

    #[test]
    fn corrupt_cache_reports_corrupt_not_io() {
        let dir = tempdir().unwrap();
        let store = open(dir.path()).unwrap();
        fs::write(dir.path().join(cachedir::INDEX_FILE), b"{not json").unwrap();
        assert!(matches!(
            store.load_index(),
            Err(LoadError::Corrupt { .. })
        ));
    }

    #[test]
    fn groups_keep_their_order_and_unicode() {
        let dir = tempdir().unwrap();
        let store = open(dir.path()).unwrap();

        let groups = vec![
            DuplicateGroup {
                id: "group_1".into(),
                paths: vec!["/a/доклад.txt".into(), "/b/доклад (копия).txt".into()],
            },
            DuplicateGroup {
                id: "group_2".into(),
                paths: vec!["/c/x.bin".into(), "/d/x.bin".into()],
            },
        ];
        store.save_groups(&groups).unwrap();
        assert_eq!(store.load_groups().unwrap(), groups);

        // Exported text is human-readable: indented, not ASCII-escaped.
        let text = fs::read_to_string(dir.path().join(cachedir::GROUPS_FILE)).unwrap();
        assert!(text.contains("доклад"));
        assert!(text.contains("  \"group_1\""));
    }

    #[test]
    fn second_open_of_a_locked_cache_fails() {
        let dir = tempdir().unwrap();
        let _store = open(dir.path()).unwrap();
        assert!(open(dir.path()).is_err());
    }

    #[test]
    fn meta_marker_is_written_on_init() {
        let dir = tempdir().unwrap();
        let _store = open(dir.path()).unwrap();
        let meta = fs::read_to_string(dir.path().join(cachedir::META_FILE)).unwrap();
        assert!(meta.contains("format = 1"));
    }
}
