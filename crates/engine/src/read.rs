//! Read path: `get()` and `stats()`.
//!
//! Lookups consult the layers newest-first — active memtable, immutable
//! memtable, then each table — and the first layer that knows the key
//! wins. A tombstone in a newer layer hides any older value beneath it.

use anyhow::Result;

use crate::{Db, Stats};

impl Db {
    /// Looks up `key`, returning `Ok(None)` when the key is absent or was
    /// most recently deleted.
    ///
    /// # Errors
    ///
    /// Only I/O failures surface here. A table block that fails its
    /// checksum reads as absent (older layers may still answer) and is
    /// reported with a warn line by the table reader.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        let inner = self.inner.read();

        if let Some((value, deleted)) = inner.memtable.get(key) {
            return Ok(if deleted { None } else { Some(value) });
        }

        if let Some(immutable) = &inner.immutable {
            if let Some((value, deleted)) = immutable.get(key) {
                return Ok(if deleted { None } else { Some(value) });
            }
        }

        for table in &inner.tables {
            if let Some((value, deleted)) = table.get(key)? {
                return Ok(if deleted { None } else { Some(value) });
            }
        }

        Ok(None)
    }

    /// Returns point-in-time statistics. Sizes of table files that
    /// cannot be stat'ed are simply not counted.
    pub fn stats(&self) -> Stats {
        let inner = self.inner.read();

        let mut stats = Stats {
            memtable_bytes: inner.memtable.size(),
            immutable_bytes: inner
                .immutable
                .as_ref()
                .map(|memtable| memtable.size())
                .unwrap_or(0),
            table_count: inner.tables.len(),
            total_disk_bytes: 0,
        };

        for table in &inner.tables {
            if let Ok(meta) = std::fs::metadata(table.path()) {
                stats.total_disk_bytes += meta.len();
            }
        }

        stats
    }
}
