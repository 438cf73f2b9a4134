use std::fs;
use std::path::Path;

/// Counts finished table files in a data directory.
pub fn count_sst_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext == "sst")
                .unwrap_or(false)
        })
        .count()
}

/// A value long enough that a handful of entries crosses small
/// memtable thresholds.
pub fn padded_value(i: usize) -> Vec<u8> {
    format!("value_{:05}_padding_to_make_it_bigger..", i).into_bytes()
}
