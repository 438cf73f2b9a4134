//! Write path: `put()`, `delete()`, and the flush protocol.
//!
//! Every mutation is appended to the WAL first; a WAL failure aborts the
//! operation with the memtable untouched. When the memtable reaches its
//! threshold the flush runs synchronously, still under the write lock.

use anyhow::{Context, Result};
use memtable::Memtable;
use sstable::TableWriter;
use std::path::{Path, PathBuf};
use wal::{WalRecord, WalWriter};

use crate::{Db, DbInner, WAL_FILENAME};

impl Db {
    /// Stores `key` → `value`.
    ///
    /// The record is made durable (per the sync policy) before the
    /// memtable is touched. If the memtable is full afterwards, the flush
    /// runs before this call returns.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_open()?;
        let mut inner = self.inner.write();

        inner
            .wal
            .append(&WalRecord::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            })
            .context("WAL append")?;

        inner.memtable.put(key.to_vec(), value.to_vec())?;

        if inner.memtable.is_full() {
            self.flush(&mut inner)?;
        }
        Ok(())
    }

    /// Deletes `key` by writing a tombstone.
    ///
    /// The tombstone shadows any older value in lower layers; the key
    /// reads as absent from then on.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.check_open()?;
        let mut inner = self.inner.write();

        inner
            .wal
            .append(&WalRecord::Delete { key: key.to_vec() })
            .context("WAL append")?;

        inner.memtable.delete(key.to_vec())?;

        if inner.memtable.is_full() {
            self.flush(&mut inner)?;
        }
        Ok(())
    }

    /// Moves the active memtable to disk.
    ///
    /// # Protocol
    ///
    /// 1. Complete any leftover immutable memtable first (a previous
    ///    flush failed; retry it before freezing more data).
    /// 2. Freeze the active memtable, move it to the immutable slot, and
    ///    install a fresh active memtable.
    /// 3. Write the frozen memtable to `sst_<id>.sst` (via a temp file
    ///    and atomic rename), open a reader on it, and prepend it to the
    ///    tables list.
    /// 4. Close and delete the old WAL, then open a fresh one. A failed
    ///    delete is only a warn: replay is idempotent, and the recovered
    ///    memtable would simply be flushed again.
    pub(crate) fn flush(&self, inner: &mut DbInner) -> Result<()> {
        if inner.immutable.is_some() {
            self.write_immutable(inner)?;
        }

        inner.memtable.set_immutable();
        let frozen = std::mem::replace(
            &mut inner.memtable,
            Memtable::new(self.opts.memtable_size),
        );
        inner.immutable = Some(frozen);

        self.write_immutable(inner)?;

        // The flushed data is safely in a table; retire the WAL.
        let wal_path = self.opts.dir.join(WAL_FILENAME);
        if let Err(e) = inner.wal.close() {
            tracing::warn!(error = %e, "closing retired WAL failed");
        }
        if let Err(e) = std::fs::remove_file(&wal_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    error = %e,
                    "failed to remove retired WAL; next open replays it, which is idempotent"
                );
            }
        }
        inner.wal = WalWriter::open(&wal_path, self.opts.sync_writes).context("open fresh WAL")?;

        Ok(())
    }

    /// Writes the immutable memtable to a new table and clears the slot.
    ///
    /// On failure the temp file is removed and the immutable memtable
    /// stays put; the next flush (or close) retries it.
    pub(crate) fn write_immutable(&self, inner: &mut DbInner) -> Result<()> {
        let immutable = match inner.immutable.take() {
            Some(memtable) => memtable,
            None => return Ok(()),
        };

        let id = inner.next_table_id;
        inner.next_table_id += 1;
        let path = self.opts.dir.join(crate::recovery::table_filename(id));

        if let Err(e) = write_table(&path, &immutable, self.opts.filter_bits_per_key) {
            // Best effort: the open-time sweep also removes orphans.
            let _ = std::fs::remove_file(tmp_path(&path));
            inner.immutable = Some(immutable);
            return Err(e.context("flush memtable to table"));
        }

        let reader = match sstable::TableReader::open(&path) {
            Ok(reader) => reader,
            Err(e) => {
                // The table is on disk but unusable to us; keep the
                // memtable so a retry re-flushes under a fresh id.
                inner.immutable = Some(immutable);
                return Err(anyhow::Error::new(e).context("open flushed table"));
            }
        };
        inner.tables.insert(0, reader);
        Ok(())
    }
}

/// Streams a memtable into a table file at `path`, tombstones included.
fn write_table(path: &Path, memtable: &Memtable, bits_per_key: usize) -> Result<()> {
    let mut writer = TableWriter::create(path, bits_per_key)?;

    let mut iter = memtable.iter();
    iter.seek_to_first();
    while iter.valid() {
        if let Some(entry) = iter.entry() {
            writer.add(&entry.key, &entry.value, entry.deleted)?;
        }
        iter.next();
    }
    drop(iter);

    writer.finish()?;
    Ok(())
}

/// The temp path a [`TableWriter`] uses for `path`.
fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}
