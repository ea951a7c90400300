use crate::hashing::HashCache;
use crate::index::{FileIndex, FileRecord};
use crate::matcher;
use std::collections::HashSet;

/// An ordered set of paths judged mutually similar (and, with hash
/// confirmation, content-identical). Always holds at least two paths;
/// ids are stable only within one grouping run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub id: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct GroupOptions {
    /// Minimum name similarity for two files to be considered duplicates.
    pub threshold: f64,
    /// Symmetric size window around each candidate, as a fraction of its
    /// size. The default of 0.0 admits only exactly-equal sizes, since
    /// duplicates are expected to be byte-identical.
    pub size_tolerance: f64,
    /// Require identical content hashes within every emitted group.
    pub hash_check: bool,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            threshold: 0.9,
            size_tolerance: 0.0,
            hash_check: false,
        }
    }
}

/// Partition the index into duplicate groups.
///
/// Records are visited in ascending `sorted_key` order; for each unvisited
/// record a binary search bounds the size window, and candidates inside it
/// join the group when their name similarity reaches the threshold. A
/// record joins at most one group per run. Singleton groups are never
/// emitted.
///
/// With `hash_check`, members whose size or content hash disagree with the
/// group (or that cannot be read) are pruned and unmarked, so they can
/// still surface in a later run; groups left with fewer than two members
/// are dropped.
pub fn group(index: &FileIndex, opts: &GroupOptions, hashes: &mut HashCache) -> Vec<DuplicateGroup> {
    // BTreeMap iteration is path-ordered, so the stable sort resolves
    // equal sizes deterministically.
    let mut files: Vec<(&String, &FileRecord)> = index.iter().collect();
    files.sort_by_key(|(_, r)| r.sorted_key);
    let sizes: Vec<u64> = files.iter().map(|(_, r)| r.sorted_key).collect();

    let mut seen: HashSet<usize> = HashSet::new();
    let mut groups: Vec<DuplicateGroup> = Vec::new();

    for i in 0..files.len() {
        if seen.contains(&i) {
            continue;
        }
        let (_, rec) = files[i];

        let (lower, upper) = size_window(rec.sorted_key, opts.size_tolerance);
        let lo = sizes.partition_point(|&s| s < lower);
        let hi = sizes.partition_point(|&s| s <= upper);

        let mut members: Vec<usize> = vec![i];
        for j in lo..hi {
            if j == i || seen.contains(&j) {
                continue;
            }
            let (_, other) = files[j];
            if matcher::similarity(&rec.normalized_name, &other.normalized_name)
                >= opts.threshold
            {
                members.push(j);
                seen.insert(j);
            }
        }

        if members.len() < 2 {
            continue;
        }

        if opts.hash_check {
            members = confirm_by_hash(&files, members, hashes, &mut seen);
            if members.len() < 2 {
                continue;
            }
        }

        // The anchor is spoken for too; no later window may claim it.
        seen.insert(i);

        groups.push(DuplicateGroup {
            id: format!("group_{}", groups.len() + 1),
            paths: members.iter().map(|&j| files[j].0.clone()).collect(),
        });
    }

    tracing::debug!(groups = groups.len(), "grouping finished");
    groups
}

fn size_window(size: u64, tolerance: f64) -> (u64, u64) {
    if tolerance <= 0.0 {
        return (size, size);
    }
    let lower = (size as f64 * (1.0 - tolerance)).floor() as u64;
    let upper = (size as f64 * (1.0 + tolerance)).ceil() as u64;
    (lower, upper)
}

/// Keep only members whose recorded size matches the group's first member
/// and whose content hash matches the first member that hashes cleanly.
/// Pruned members leave `seen` so a later run may still group them.
fn confirm_by_hash(
    files: &[(&String, &FileRecord)],
    members: Vec<usize>,
    hashes: &mut HashCache,
    seen: &mut HashSet<usize>,
) -> Vec<usize> {
    let group_size = files[members[0]].1.size;
    let mut reference: Option<String> = None;
    let mut confirmed = Vec::new();

    for j in members {
        let (path, rec) = files[j];

        if rec.size != group_size {
            seen.remove(&j);
            tracing::debug!(path = %path, "size mismatch, dropped from group");
            continue;
        }

        match hashes.hash(path) {
            Ok(h) => match &reference {
                None => {
                    reference = Some(h);
                    confirmed.push(j);
                }
                Some(r) if *r == h => confirmed.push(j),
                Some(_) => {
                    seen.remove(&j);
                    tracing::debug!(path = %path, "hash mismatch, dropped from group");
                }
            },
            Err(e) => {
                seen.remove(&j);
                tracing::warn!("cannot verify {path}: {e:#}");
            }
        }
    }

    confirmed
}
