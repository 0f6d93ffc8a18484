//! Assertions on the files a run leaves behind

use serde_json::Value;
use std::path::Path;

/// Names of item-shaped files left in `dir`
pub fn staged_leftovers(dir: &Path, extension: &str) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(extension))
        .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect()
}

/// Assert no item-shaped file remains in `dir`
pub fn assert_staging_clean(dir: &Path) {
    let leftovers = staged_leftovers(dir, "webm");
    assert!(
        leftovers.is_empty(),
        "staging directory still holds {leftovers:?}"
    );
}

/// Raw JSON of the ledger file
pub fn read_ledger_json(path: &Path) -> Value {
    let raw = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&raw).unwrap()
}

/// Sorted keys of the ledger file
pub fn ledger_keys(path: &Path) -> Vec<String> {
    let mut keys: Vec<String> = read_ledger_json(path)
        .as_object()
        .unwrap()
        .keys()
        .cloned()
        .collect();
    keys.sort();
    keys
}
