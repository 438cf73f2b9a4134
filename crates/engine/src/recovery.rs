//! Cold-start helpers: tmp-file cleanup and table discovery.

use anyhow::Result;
use sstable::TableReader;
use std::path::Path;

/// Deletes every `*.tmp` file in the data directory. These are orphans
/// from flushes that crashed between temp-write and rename.
pub(crate) fn remove_tmp_files(dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_tmp = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == "tmp")
            .unwrap_or(false);
        if is_tmp {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove orphaned tmp file");
            }
        }
    }
}

/// Loads every `sst_NNNNNN.sst` in `dir`, newest id first.
///
/// Tables that fail to open are skipped with a warn line — their data is
/// unreachable until the file is repaired or removed, but one bad file
/// must not keep the store from opening. Returns the readers and the id
/// to assign to the next flush (max seen id + 1, counting skipped files
/// so their names are never reused).
pub(crate) fn load_tables(dir: &Path) -> Result<(Vec<TableReader>, u64)> {
    let mut discovered: Vec<(u64, std::path::PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if let Some(id) = parse_table_id(&path) {
            discovered.push((id, path));
        }
    }

    // Newest first: higher ids shadow lower ones on the read path.
    discovered.sort_by(|a, b| b.0.cmp(&a.0));
    let next_id = discovered.first().map(|(id, _)| id + 1).unwrap_or(1);

    let mut tables = Vec::with_capacity(discovered.len());
    for (_, path) in &discovered {
        match TableReader::open(path) {
            Ok(reader) => tables.push(reader),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable table");
            }
        }
    }

    Ok((tables, next_id))
}

/// Parses the id from a `sst_NNNNNN.sst` filename; `None` for any other
/// name.
pub(crate) fn parse_table_id(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let id = name.strip_prefix("sst_")?.strip_suffix(".sst")?;
    id.parse().ok()
}

/// Formats the filename for table `id`: zero-padded to six digits.
pub(crate) fn table_filename(id: u64) -> String {
    format!("sst_{:06}.sst", id)
}
