use crate::normalize;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// File and directory selection rules for a scan.
///
/// Inclusion rules are applied first: when present, a file must match one
/// include extension and contain one include keyword. Exclusion rules then
/// drop anything matching an excluded extension or keyword. Directories
/// under an excluded directory are never descended into.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    include_exts: Vec<String>,
    include_keywords: Vec<String>,
    exclude_exts: Vec<String>,
    exclude_keywords: Vec<String>,
    exclude_dirs: Vec<String>,
}

impl ScanFilter {
    pub fn new(
        include_exts: &[String],
        include_keywords: &[String],
        exclude_exts: &[String],
        exclude_keywords: &[String],
        exclude_dirs: &[PathBuf],
    ) -> Result<Self> {
        let mut dirs = Vec::new();
        for d in exclude_dirs {
            let mut s = normalize::path_key(d)
                .with_context(|| format!("Failed to normalize excluded dir: {}", d.display()))?;
            if s.ends_with('/') {
                s.pop();
            }
            dirs.push(s);
        }

        Ok(Self {
            include_exts: include_exts.iter().map(|e| canonical_ext(e)).collect(),
            include_keywords: include_keywords.iter().map(|k| canonical_keyword(k)).collect(),
            exclude_exts: exclude_exts.iter().map(|e| canonical_ext(e)).collect(),
            exclude_keywords: exclude_keywords.iter().map(|k| canonical_keyword(k)).collect(),
            exclude_dirs: dirs,
        })
    }

    /// Decide whether a file (by name only) enters the index.
    pub fn accepts(&self, file_name: &str) -> bool {
        let (name, ext) = normalize::split_name(file_name);

        if !self.include_exts.is_empty() && !self.include_exts.iter().any(|e| *e == ext) {
            return false;
        }
        if !self.include_keywords.is_empty()
            && !self.include_keywords.iter().any(|k| name.contains(k.as_str()))
        {
            return false;
        }

        if self.exclude_exts.iter().any(|e| *e == ext) {
            return false;
        }
        if self.exclude_keywords.iter().any(|k| name.contains(k.as_str())) {
            return false;
        }

        true
    }

    /// True if `dir` (normalized string form) lies at or under an excluded
    /// directory; such directories are skipped without descent.
    pub fn skips_dir(&self, dir: &str) -> bool {
        self.exclude_dirs.iter().any(|p| starts_with_path_prefix(dir, p))
    }
}

fn canonical_ext(ext: &str) -> String {
    ext.to_lowercase().trim_start_matches('.').to_string()
}

fn canonical_keyword(kw: &str) -> String {
    normalize::nfc(&kw.to_lowercase())
}

/// "/home/a" matches "/home/a/file" but not "/home/ab/file".
fn starts_with_path_prefix(path: &str, prefix: &str) -> bool {
    if path == prefix {
        return true;
    }
    if !path.starts_with(prefix) {
        return false;
    }

    // boundary check: next char must be a path separator
    matches!(path.as_bytes().get(prefix.len()), Some(b'/') | Some(b'\\'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(
        inc_ext: &[&str],
        inc_kw: &[&str],
        exc_ext: &[&str],
        exc_kw: &[&str],
    ) -> ScanFilter {
        let v = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        ScanFilter::new(&v(inc_ext), &v(inc_kw), &v(exc_ext), &v(exc_kw), &[]).unwrap()
    }

    #[test]
    fn empty_filter_accepts_everything() {
        let f = ScanFilter::default();
        assert!(f.accepts("anything.bin"));
        assert!(!f.skips_dir("/anywhere"));
    }

    #[test]
    fn include_extensions_are_case_and_dot_insensitive() {
        let f = filter(&[".TXT", "md"], &[], &[], &[]);
        assert!(f.accepts("notes.txt"));
        assert!(f.accepts("README.MD"));
        assert!(!f.accepts("image.png"));
    }

    #[test]
    fn include_keywords_match_normalized_substrings() {
        let f = filter(&[], &["Report"], &[], &[]);
        assert!(f.accepts("Quarterly-REPORT-final.doc"));
        assert!(!f.accepts("summary.doc"));
    }

    #[test]
    fn exclusion_wins_after_inclusion() {
        let f = filter(&["txt"], &[], &[], &["draft"]);
        assert!(f.accepts("final.txt"));
        assert!(!f.accepts("draft-final.txt"));
        assert!(!f.accepts("final.md"));
    }

    #[test]
    fn excluded_extension_drops_file() {
        let f = filter(&[], &[], &["tmp"], &[]);
        assert!(!f.accepts("scratch.TMP"));
        assert!(f.accepts("scratch.txt"));
    }

    #[test]
    fn dir_exclusion_is_boundary_aware() {
        let f = ScanFilter::new(&[], &[], &[], &[], &[PathBuf::from("/home/a")]).unwrap();
        assert!(f.skips_dir("/home/a"));
        assert!(f.skips_dir("/home/a/sub"));
        assert!(!f.skips_dir("/home/ab"));
    }
}
