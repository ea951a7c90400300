use crate::cancel::StopToken;
use crate::grouper::DuplicateGroup;
use crate::hashing::HashCache;
use crate::index::FileIndex;
use crate::link::LinkService;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Duration;

const MAX_REMOVE_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// What the user chose to keep for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepChoice {
    /// Keep only the first member.
    First,
    /// Keep everything; the group is skipped.
    All,
    /// Keep exactly these members (0-based, validated).
    Indices(BTreeSet<usize>),
    /// Stop processing all remaining groups.
    Quit,
}

/// Parse one interactive answer. `None` means the input was unusable; the
/// caller warns and falls back to keeping only the first member.
pub fn parse_choice(input: &str, group_len: usize) -> Option<KeepChoice> {
    let choice = input.trim().to_lowercase();
    match choice.as_str() {
        "q" => return Some(KeepChoice::Quit),
        "y" => return Some(KeepChoice::First),
        "n" => return Some(KeepChoice::All),
        _ => {}
    }

    let mut indices = BTreeSet::new();
    for part in choice.split(',') {
        match part.trim().parse::<usize>() {
            Ok(n) if (1..=group_len).contains(&n) => {
                indices.insert(n - 1);
            }
            // Out-of-range indices are dropped; if nothing valid remains
            // the whole answer counts as invalid.
            Ok(_) => {}
            Err(_) => return None,
        }
    }

    if indices.is_empty() {
        None
    } else {
        Some(KeepChoice::Indices(indices))
    }
}

/// Remove every group member outside its keep-set.
///
/// Non-interactive runs always keep the first member. Interactive runs
/// read one answer per group from `input` (stdin in the CLI); `q` or EOF
/// stops immediately, leaving already-deleted files deleted. Exactly one
/// outcome per path: either it lands in the returned list (and leaves the
/// index and hash cache), or the failure is logged and it stays indexed.
/// The stop token is honored between groups, never mid-group.
pub fn run_delete(
    groups: &[DuplicateGroup],
    index: &mut FileIndex,
    hashes: &mut HashCache,
    interactive: bool,
    link: Option<&dyn LinkService>,
    input: &mut dyn BufRead,
    token: &StopToken,
) -> Vec<String> {
    let mut deleted = Vec::new();

    for group in groups {
        if token.is_stopped() {
            tracing::info!("deletion stopped before {}", group.id);
            break;
        }
        if group.paths.len() < 2 {
            continue;
        }

        let choice = if interactive {
            prompt_choice(group, input)
        } else {
            KeepChoice::First
        };

        let keep_set: BTreeSet<usize> = match choice {
            KeepChoice::Quit => {
                token.request_stop();
                break;
            }
            KeepChoice::All => continue,
            KeepChoice::First => BTreeSet::from([0]),
            KeepChoice::Indices(set) => set,
        };

        // Link target: the first kept member.
        let kept_first = keep_set
            .iter()
            .next()
            .map(|&i| group.paths[i].clone());

        for (idx, path) in group.paths.iter().enumerate() {
            if keep_set.contains(&idx) {
                continue;
            }
            match remove_one(path) {
                Ok(()) => {
                    deleted.push(path.clone());
                    index.remove(path);
                    hashes.invalidate(path);

                    if let (Some(link), Some(kept)) = (link, kept_first.as_deref()) {
                        if Path::new(kept).exists() {
                            if let Err(e) = link.preserve(Path::new(kept), Path::new(path)) {
                                tracing::warn!("link at {path} failed: {e:#}");
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("failed to delete {path}: {e:#}"),
            }
        }
    }

    deleted
}

fn prompt_choice(group: &DuplicateGroup, input: &mut dyn BufRead) -> KeepChoice {
    println!("\nDuplicate group {} ({} files):", group.id, group.paths.len());
    for (i, path) in group.paths.iter().enumerate() {
        println!("  [{}] {}", i + 1, path);
    }
    print!("Keep: [y] first / [n] all / 1,2,.. listed / [q] quit: ");
    let _ = std::io::stdout().flush();

    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) => KeepChoice::Quit, // EOF: nothing more to ask
        Ok(_) => parse_choice(&line, group.paths.len()).unwrap_or_else(|| {
            println!("Invalid selection, keeping the first file.");
            KeepChoice::First
        }),
        Err(e) => {
            tracing::warn!("could not read selection: {e}");
            KeepChoice::Quit
        }
    }
}

/// One deletion attempt cycle for a single path: read-only attribute
/// cleared first, transient permission failures retried with a pause.
fn remove_one(path: &str) -> Result<()> {
    let p = Path::new(path);
    clear_readonly(p);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match std::fs::remove_file(p) {
            Ok(()) => return Ok(()),
            Err(e)
                if e.kind() == std::io::ErrorKind::PermissionDenied
                    && attempt < MAX_REMOVE_ATTEMPTS =>
            {
                tracing::debug!("remove {path} attempt {attempt}: {e}, retrying");
                std::thread::sleep(RETRY_DELAY);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("remove_file failed for {path}"));
            }
        }
    }
}

// A read-only attribute would fail remove_file on some platforms.
fn clear_readonly(p: &Path) {
    if let Ok(md) = std::fs::metadata(p) {
        let mut perms = md.permissions();
        if perms.readonly() {
            perms.set_readonly(false);
            let _ = std::fs::set_permissions(p, perms);
        }
    }
}
