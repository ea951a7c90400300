use crate::normalize;

/// Similarity ratio in [0, 1] between two file names.
///
/// Both names are normalized first (extension stripped, lower-cased, NFC),
/// then scored as `1 - levenshtein / max_len`. Two empty normalized names
/// count as identical. Symmetric by construction.
///
/// This is the sole "same logical file, different name" signal; content is
/// only consulted by the optional hash confirmation stage.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(
        &normalize::normalized_name(a),
        &normalize::normalized_name(b),
    )
}
