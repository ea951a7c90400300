use anyhow::{Context, Result};
use std::path::Path;

/// Leaves a pointer from a removed duplicate's old location to the copy
/// that was kept. Failures surface as errors the deletion path logs and
/// ignores; nothing here may abort a deletion run.
pub trait LinkService {
    fn preserve(&self, kept: &Path, at: &Path) -> Result<()>;
}

/// Symlink-based implementation. The link takes the deleted file's former
/// path, so it is requested only after the removal succeeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymlinkService;

impl LinkService for SymlinkService {
    #[cfg(unix)]
    fn preserve(&self, kept: &Path, at: &Path) -> Result<()> {
        std::os::unix::fs::symlink(kept, at)
            .with_context(|| format!("symlink {} -> {}", at.display(), kept.display()))
    }

    #[cfg(windows)]
    fn preserve(&self, kept: &Path, at: &Path) -> Result<()> {
        std::os::windows::fs::symlink_file(kept, at)
            .with_context(|| format!("symlink {} -> {}", at.display(), kept.display()))
    }
}
