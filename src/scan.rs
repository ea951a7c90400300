use crate::cancel::StopToken;
use crate::filter::ScanFilter;
use crate::hashing::HashCache;
use crate::index::{FileIndex, FileRecord};
use crate::normalize;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

/// Walk `roots` once and build a fresh index (full-rebuild semantics).
///
/// Records from `prior` whose on-disk size is unchanged are reused as-is,
/// so their cached hashes stay valid; a changed size drops the stale hash
/// cache entry. The stop token is observed before each directory and each
/// file: on stop, the in-flight directory's records are discarded while
/// completed directories keep theirs.
pub fn scan_roots(
    roots: &[PathBuf],
    filter: &ScanFilter,
    prior: &FileIndex,
    hashes: &mut HashCache,
    token: &StopToken,
) -> Result<FileIndex> {
    let mut next = FileIndex::new();
    let progress = scan_progress();

    'roots: for root in roots {
        if token.is_stopped() {
            break;
        }
        let walker = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| keep_entry(e, filter));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("walk error under {}: {e}", root.display());
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if token.is_stopped() {
                tracing::info!("scan stopped before {}", entry.path().display());
                break 'roots;
            }
            scan_dir(entry.path(), filter, prior, hashes, token, &mut next, &progress);
            if token.is_stopped() {
                break 'roots;
            }
        }
    }

    progress.finish_and_clear();
    tracing::info!(indexed = next.len(), "scan finished");
    Ok(next)
}

/// One directory's files as a batch: nothing is committed unless the
/// directory completes, so cancellation never leaves it half-indexed.
fn scan_dir(
    dir: &Path,
    filter: &ScanFilter,
    prior: &FileIndex,
    hashes: &mut HashCache,
    token: &StopToken,
    out: &mut FileIndex,
    progress: &ProgressBar,
) {
    let rd = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            tracing::warn!("read_dir {}: {e}", dir.display());
            return;
        }
    };

    let mut batch: Vec<(String, FileRecord)> = Vec::new();
    let mut stale_hashes: Vec<String> = Vec::new();

    for entry in rd.flatten() {
        if token.is_stopped() {
            return; // in-flight directory: batch dropped
        }

        match entry.file_type() {
            Ok(ft) if ft.is_file() => {}
            _ => continue,
        }

        let raw_name = entry.file_name();
        let Some(raw_name) = raw_name.to_str() else {
            tracing::warn!("skipping non-unicode file name in {}", dir.display());
            continue;
        };
        let file_name = normalize::nfc(raw_name);

        if !filter.accepts(&file_name) {
            continue;
        }

        let key = match normalize::path_key(&entry.path()) {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!("cannot normalize {}: {e}", entry.path().display());
                continue;
            }
        };
        let size = match entry.metadata() {
            Ok(md) => md.len(),
            Err(e) => {
                tracing::warn!("stat {}: {e}", entry.path().display());
                continue;
            }
        };

        progress.inc(1);

        if let Some(prev) = prior.get(&key) {
            if prev.size == size {
                // Unchanged: reuse the record, cached hash stays valid.
                batch.push((key, prev.clone()));
                continue;
            }
            stale_hashes.push(key.clone());
        }

        batch.push((key, FileRecord::new(size, normalize::normalized_name(&file_name))));
    }

    // Directory completed: commit its records and hash invalidations.
    for p in stale_hashes {
        hashes.invalidate(&p);
    }
    for (key, record) in batch {
        out.insert(key, record);
    }
}

fn keep_entry(entry: &walkdir::DirEntry, filter: &ScanFilter) -> bool {
    if !entry.file_type().is_dir() {
        return true;
    }
    match normalize::path_key(entry.path()) {
        Ok(key) => !filter.skips_dir(&key),
        Err(_) => true,
    }
}

fn scan_progress() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} indexing {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, contents: &[u8]) {
        File::create(dir.join(name)).unwrap().write_all(contents).unwrap();
    }

    fn scan_plain(roots: &[PathBuf], prior: &FileIndex) -> FileIndex {
        let mut hashes = HashCache::new();
        scan_roots(roots, &ScanFilter::default(), prior, &mut hashes, &StopToken::new()).unwrap()
    }

    #[test]
    fn indexes_files_recursively() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.txt", b"aaa");
        fs::create_dir(dir.path().join("sub")).unwrap();
        write_file(&dir.path().join("sub"), "b.txt", b"bbbb");

        let index = scan_plain(&[dir.path().to_path_buf()], &FileIndex::new());
        assert_eq!(index.len(), 2);
        let sizes: Vec<u64> = index.values().map(|r| r.size).collect();
        assert!(sizes.contains(&3) && sizes.contains(&4));
    }

    #[test]
    fn excluded_dirs_are_not_descended() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "keep.txt", b"x");
        let skipped = dir.path().join("skipped");
        fs::create_dir(&skipped).unwrap();
        write_file(&skipped, "drop.txt", b"y");

        let filter = ScanFilter::new(&[], &[], &[], &[], &[skipped.clone()]).unwrap();
        let mut hashes = HashCache::new();
        let index = scan_roots(
            &[dir.path().to_path_buf()],
            &filter,
            &FileIndex::new(),
            &mut hashes,
            &StopToken::new(),
        )
        .unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.keys().all(|k| k.contains("keep")));
    }

    #[test]
    fn unchanged_records_are_reused_not_recomputed() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.txt", b"stable");
        write_file(dir.path(), "b.txt", b"will change");

        let roots = [dir.path().to_path_buf()];
        let mut index = scan_plain(&roots, &FileIndex::new());

        // Mark both records; the marker survives only where the record is
        // reused rather than rebuilt.
        for rec in index.values_mut() {
            rec.content_hash = Some("marker".into());
        }

        write_file(dir.path(), "b.txt", b"changed size here");
        let rescanned = scan_plain(&roots, &index);

        let a = rescanned.iter().find(|(k, _)| k.contains("a.txt")).unwrap().1;
        let b = rescanned.iter().find(|(k, _)| k.contains("b.txt")).unwrap().1;
        assert_eq!(a.content_hash.as_deref(), Some("marker"));
        assert_eq!(b.content_hash, None);
    }

    #[test]
    fn size_change_invalidates_the_hash_cache() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.txt", b"v1");
        let roots = [dir.path().to_path_buf()];

        let mut hashes = HashCache::new();
        let index = scan_roots(
            &roots,
            &ScanFilter::default(),
            &FileIndex::new(),
            &mut hashes,
            &StopToken::new(),
        )
        .unwrap();
        let key = index.keys().next().unwrap().clone();
        hashes.hash(&key).unwrap();
        assert!(hashes.get(&key).is_some());

        write_file(dir.path(), "a.txt", b"longer contents");
        scan_roots(&roots, &ScanFilter::default(), &index, &mut hashes, &StopToken::new())
            .unwrap();
        assert!(hashes.get(&key).is_none());
    }

    #[test]
    fn full_rebuild_drops_paths_outside_the_filters() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.txt", b"x");
        write_file(dir.path(), "b.md", b"y");

        let roots = [dir.path().to_path_buf()];
        let prior = scan_plain(&roots, &FileIndex::new());
        assert_eq!(prior.len(), 2);

        let txt_only =
            ScanFilter::new(&["txt".into()], &[], &[], &[], &[]).unwrap();
        let mut hashes = HashCache::new();
        let index =
            scan_roots(&roots, &txt_only, &prior, &mut hashes, &StopToken::new()).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.keys().all(|k| k.ends_with("a.txt")));
    }

    #[test]
    fn stop_before_a_later_root_keeps_completed_roots() {
        let root1 = tempdir().unwrap();
        let root2 = tempdir().unwrap();
        write_file(root1.path(), "first.txt", b"x");
        write_file(root2.path(), "second.txt", b"y");

        let token = StopToken::new();
        let mut hashes = HashCache::new();
        let first = scan_roots(
            &[root1.path().to_path_buf()],
            &ScanFilter::default(),
            &FileIndex::new(),
            &mut hashes,
            &token,
        )
        .unwrap();
        assert_eq!(first.len(), 1);

        // Signal arrives after the first root completed: a walk over the
        // remaining roots contributes nothing.
        token.request_stop();
        let rest = scan_roots(
            &[root2.path().to_path_buf()],
            &ScanFilter::default(),
            &first,
            &mut hashes,
            &token,
        )
        .unwrap();
        assert!(rest.is_empty());
    }
}
