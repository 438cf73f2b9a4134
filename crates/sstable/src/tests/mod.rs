
use crate::TableWriter;
use std::path::Path;

/// Writes a table from `(key, value, deleted)` triples, already sorted.
pub(crate) fn write_table(path: &Path, bits_per_key: usize, entries: &[(&[u8], &[u8], bool)]) {
    let mut writer = TableWriter::create(path, bits_per_key).unwrap();
    for (key, value, deleted) in entries {
        writer.add(key, value, *deleted).unwrap();
    }
    writer.finish().unwrap();
}

/// A sorted entry set spanning several 4 KiB blocks.
pub(crate) fn multi_block_entries(n: usize) -> Vec<(Vec<u8>, Vec<u8>, bool)> {
    (0..n)
        .map(|i| {
            let key = format!("key_{:05}", i).into_bytes();
            let value = vec![b'v'; 200];
            let deleted = i % 17 == 0;
            (key, value, deleted)
        })
        .collect()
}
