//! Database models mapping to the metadata schema.

use std::collections::BTreeMap;

/// Names mapped to content hashes for one namespace.
pub type FileMap = BTreeMap<String, String>;

/// Treat an empty submission id as the development namespace.
pub fn submission_scope(submission_id: Option<&str>) -> Option<&str> {
    submission_id.filter(|s| !s.is_empty())
}

/// SQL LIKE patterns matching asset names.
pub fn asset_patterns() -> Vec<String> {
    bundler_core::ASSET_EXTENSIONS
        .iter()
        .map(|ext| format!("%{ext}"))
        .collect()
}

/// Rows fetched as `(name, hash)` pairs into a map.
pub(crate) fn into_file_map(rows: Vec<(String, String)>) -> FileMap {
    rows.into_iter().collect()
}
