use crate::cancel::StopToken;
use crate::delete;
use crate::filter::ScanFilter;
use crate::grouper::{self, DuplicateGroup, GroupOptions};
use crate::hashing::HashCache;
use crate::index::FileIndex;
use crate::link::LinkService;
use crate::scan;
use crate::store::{self, CacheStore};
use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// One deduplication session.
///
/// Owns the file index, hash cache, last computed groups, the backing
/// store and the stop token; every operation goes through a handle to this
/// struct rather than ambient state. Each mutating operation ends by
/// flushing the state it touched, so the persisted snapshots always match
/// the filesystem as last observed.
pub struct Deduper {
    store: CacheStore,
    token: StopToken,
    opts: GroupOptions,
    index: FileIndex,
    groups: Vec<DuplicateGroup>,
    hashes: HashCache,
}

impl Deduper {
    /// Load persisted state from `store`. An unreadable or corrupt cache
    /// is logged and treated as empty; it is never fatal.
    pub fn open(store: CacheStore, token: StopToken, opts: GroupOptions) -> Self {
        let index = store.load_index().unwrap_or_else(|e| {
            tracing::warn!("file index cache unusable, starting empty: {e}");
            FileIndex::new()
        });
        let groups = store.load_groups().unwrap_or_else(|e| {
            tracing::warn!("duplicate group cache unusable, starting empty: {e}");
            Vec::new()
        });
        let hashes = HashCache::from_entries(store.load_hashes().unwrap_or_else(|e| {
            tracing::warn!("hash cache unusable, starting empty: {e}");
            Default::default()
        }));

        Self {
            store,
            token,
            opts,
            index,
            groups,
            hashes,
        }
    }

    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    pub fn groups(&self) -> &[DuplicateGroup] {
        &self.groups
    }

    /// Rebuild the index from `roots` (reusing unchanged records), then
    /// persist it and flush the hash cache.
    pub fn scan(&mut self, roots: &[PathBuf], filter: &ScanFilter) -> Result<()> {
        self.index = scan::scan_roots(roots, filter, &self.index, &mut self.hashes, &self.token)?;

        // The hash cache never references paths outside the index view.
        let keep = &self.index;
        self.hashes.retain_paths(|p| keep.contains_key(p));

        self.store.save_index(&self.index).context("persist file index")?;
        self.flush_hashes();
        Ok(())
    }

    /// Recompute duplicate groups from the current index and persist them
    /// as the "last computed" cache.
    pub fn find_duplicates(&mut self) -> Result<&[DuplicateGroup]> {
        self.groups = grouper::group(&self.index, &self.opts, &mut self.hashes);
        self.sync_record_hashes();

        self.store.save_groups(&self.groups).context("persist duplicate groups")?;
        if self.opts.hash_check {
            // Hash confirmation computed new hashes; keep both snapshots current.
            self.store.save_index(&self.index).context("persist file index")?;
            self.flush_hashes();
        }
        Ok(&self.groups)
    }

    /// Write the current groups to `path`, same pruned content as the
    /// cache copy.
    pub fn export(&self, path: &Path) -> Result<()> {
        store::export_groups(path, &self.groups)
            .with_context(|| format!("export duplicate groups to {}", path.display()))
    }

    /// Delete redundant group members, then persist the index and hash
    /// cache and recompute + persist the groups, so the duplicate cache
    /// never references a deleted path. Runs after an early quit too.
    pub fn delete_duplicates(
        &mut self,
        interactive: bool,
        link: Option<&dyn LinkService>,
        input: &mut dyn BufRead,
    ) -> Result<Vec<String>> {
        let groups = std::mem::take(&mut self.groups);
        let deleted = delete::run_delete(
            &groups,
            &mut self.index,
            &mut self.hashes,
            interactive,
            link,
            input,
            &self.token,
        );

        self.store.save_index(&self.index).context("persist file index")?;
        self.flush_hashes();

        self.groups = grouper::group(&self.index, &self.opts, &mut self.hashes);
        self.sync_record_hashes();
        self.store.save_groups(&self.groups).context("persist duplicate groups")?;

        Ok(deleted)
    }

    /// Copy freshly computed hashes into their records so the persisted
    /// index carries them.
    fn sync_record_hashes(&mut self) {
        for (path, rec) in self.index.iter_mut() {
            if rec.content_hash.is_none() {
                if let Some(h) = self.hashes.get(path) {
                    rec.content_hash = Some(h.clone());
                }
            }
        }
    }

    // Best-effort: losing the hash cache only costs re-hashing later.
    fn flush_hashes(&self) {
        if let Err(e) = self.store.save_hashes(self.hashes.entries()) {
            tracing::warn!("could not save hash cache: {e:#}");
        }
    }
}
