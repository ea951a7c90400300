use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata for one indexed file.
///
/// `normalized_name` and `sorted_key` are derived at scan time; both are
/// recomputed when the on-disk size no longer matches `size`. `sorted_key`
/// is kept separate from the raw size so the bucket ordering strategy can
/// change without touching `size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub size: u64,
    #[serde(rename = "name")]
    pub normalized_name: String,
    #[serde(rename = "hash", skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(rename = "sorted_size")]
    pub sorted_key: u64,
}

impl FileRecord {
    pub fn new(size: u64, normalized_name: String) -> Self {
        Self {
            size,
            normalized_name,
            content_hash: None,
            sorted_key: size,
        }
    }
}

/// Normalized path -> record. A BTreeMap keeps iteration deterministic,
/// which in turn makes grouping and persistence output stable.
pub type FileIndex = BTreeMap<String, FileRecord>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_key_starts_as_the_size() {
        let r = FileRecord::new(42, "report".into());
        assert_eq!(r.sorted_key, 42);
        assert_eq!(r.content_hash, None);
    }
}
