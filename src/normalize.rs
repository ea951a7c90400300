use std::path::{Component, Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Canonical Unicode form used everywhere names or paths are compared.
/// NFC, so visually identical names with different code-point sequences
/// compare equal.
pub fn nfc(s: &str) -> String {
    s.nfc().collect()
}

/// Split a file name into its normalized stem and extension.
///
/// The stem has the final extension stripped, is lower-cased and NFC
/// normalized; the extension is lower-cased without the leading dot.
pub fn split_name(file_name: &str) -> (String, String) {
    let p = Path::new(file_name);
    let stem = p
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let ext = p.extension().and_then(|s| s.to_str()).unwrap_or("");
    (nfc(&stem.to_lowercase()), ext.to_lowercase())
}

pub fn normalized_name(file_name: &str) -> String {
    split_name(file_name).0
}

/// Normalize a path:
/// - make absolute (relative to current working directory)
/// - remove `.` and `..` components
/// - do NOT resolve symlinks
pub fn normalize_path(p: &Path) -> std::io::Result<PathBuf> {
    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    Ok(lexical_normalize(&abs))
}

/// Index key form of a path: normalized path rendered as an NFC string.
pub fn path_key(p: &Path) -> std::io::Result<String> {
    let norm = normalize_path(p)?;
    Ok(nfc(&norm.to_string_lossy()))
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }

    out
}
