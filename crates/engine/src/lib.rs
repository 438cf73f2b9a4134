//! # Engine — the SiltKV storage engine
//!
//! The central orchestrator tying the [`memtable`], [`wal`], and
//! [`sstable`] crates into a complete LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                     Db                        │
//! │                                               │
//! │ write.rs → WAL append → memtable insert       │
//! │              |                                │
//! │              |  (threshold exceeded?)         │
//! │              |            yes                 │
//! │              v                                │
//! │           flush() → new sorted table          │
//! │                                               │
//! │ read.rs → memtable → immutable memtable       │
//! │              → tables newest-first            │
//! │            (first match wins)                 │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module       | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | `lib.rs`     | `Db` struct, `Options`, `Stats`, open, close, `Drop` |
//! | `recovery`   | WAL replay, table loading, tmp-file cleanup          |
//! | `write.rs`   | `put()`, `delete()`, the flush protocol              |
//! | `read.rs`    | `get()`, `stats()`                                   |
//!
//! ## Crash safety
//!
//! Every write is appended to the WAL **before** the memtable update.
//! The WAL is only replaced **after** a successful flush. Tables are
//! written to a temp file and renamed atomically, and orphaned `*.tmp`
//! files are deleted on open — so a table either appears complete under
//! its final name or not at all.
//!
//! ## Concurrency
//!
//! One reader/writer lock guards the engine state: `put`, `delete`,
//! `close`, and flushes hold the write half; `get` and `stats` hold the
//! read half. Flushes run synchronously on the writing thread, stalling
//! other callers for their duration. A store handle is `Send + Sync`;
//! share it behind an `Arc`.

mod read;
mod recovery;
mod write;

use anyhow::{Context, Result};
use memtable::Memtable;
use parking_lot::RwLock;
use sstable::TableReader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use wal::WalWriter;

/// Name of the live write-ahead log inside the data directory.
pub const WAL_FILENAME: &str = "wal.log";

/// Default memtable flush threshold: 4 MiB.
pub const DEFAULT_MEMTABLE_SIZE: u64 = 4 * 1024 * 1024;

/// Default bloom-filter budget: 10 bits per key (~1% false positives).
pub const DEFAULT_FILTER_BITS_PER_KEY: usize = 10;

/// Engine configuration, consumed by [`Db::open`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Directory holding the WAL and all tables; created if missing.
    pub dir: PathBuf,
    /// Memtable byte size that triggers a flush.
    pub memtable_size: u64,
    /// If `true`, fsync after every WAL append; a returned success is
    /// then durable. Otherwise records become durable on sync or close.
    pub sync_writes: bool,
    /// Bloom filter bits per key for flushed tables; 0 disables filters.
    pub filter_bits_per_key: usize,
}

impl Options {
    /// Options with the default thresholds, rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            memtable_size: DEFAULT_MEMTABLE_SIZE,
            sync_writes: false,
            filter_bits_per_key: DEFAULT_FILTER_BITS_PER_KEY,
        }
    }
}

/// Point-in-time engine statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Byte size of the active memtable.
    pub memtable_bytes: u64,
    /// Byte size of the immutable memtable, 0 when none exists.
    pub immutable_bytes: u64,
    /// Number of live tables.
    pub table_count: usize,
    /// Total size of all table files on disk.
    pub total_disk_bytes: u64,
}

pub(crate) struct DbInner {
    /// Active memtable; all writes land here.
    pub(crate) memtable: Memtable,
    /// Memtable frozen for flushing; `Some` only while a flush is due or
    /// a previous flush failed and will be retried.
    pub(crate) immutable: Option<Memtable>,
    /// WAL for the active memtable.
    pub(crate) wal: WalWriter,
    /// Tables on disk, newest first; earlier entries shadow later ones.
    pub(crate) tables: Vec<TableReader>,
    /// Id assigned to the next flushed table.
    pub(crate) next_table_id: u64,
}

/// An embedded, ordered, crash-safe key-value store.
pub struct Db {
    pub(crate) inner: RwLock<DbInner>,
    pub(crate) closed: AtomicBool,
    pub(crate) opts: Options,
}

impl Db {
    /// Opens (or creates) a store in `opts.dir`.
    ///
    /// # Recovery steps
    ///
    /// 1. Create the data directory if absent.
    /// 2. Delete orphaned `*.tmp` files from interrupted flushes.
    /// 3. Load `sst_NNNNNN.sst` files newest-first, skipping (with a
    ///    warn line) any that fail to open.
    /// 4. Replay `wal.log` into a fresh memtable.
    /// 5. Open a new WAL appender.
    pub fn open(opts: Options) -> Result<Db> {
        std::fs::create_dir_all(&opts.dir)
            .with_context(|| format!("create data directory {}", opts.dir.display()))?;

        recovery::remove_tmp_files(&opts.dir);
        let (tables, next_table_id) = recovery::load_tables(&opts.dir)?;

        let wal_path = opts.dir.join(WAL_FILENAME);
        let (memtable, replay) = wal::recover_memtable(&wal_path, opts.memtable_size)
            .context("replay WAL")?;
        if replay.applied > 0 || replay.corrupted > 0 {
            tracing::debug!(
                applied = replay.applied,
                corrupted = replay.corrupted,
                "WAL replay complete"
            );
        }

        let wal = WalWriter::open(&wal_path, opts.sync_writes).context("open WAL")?;

        Ok(Db {
            inner: RwLock::new(DbInner {
                memtable,
                immutable: None,
                wal,
                tables,
                next_table_id,
            }),
            closed: AtomicBool::new(false),
            opts,
        })
    }

    /// Closes the store. Idempotent.
    ///
    /// Flushes a leftover immutable memtable (from a failed flush), syncs
    /// and closes the WAL, and drops every table reader. All steps are
    /// attempted; the first error observed is returned. The active
    /// memtable is *not* flushed — its contents live in the WAL and are
    /// replayed on the next open.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut inner = self.inner.write();
        let mut first_err: Option<anyhow::Error> = None;

        if inner.immutable.is_some() {
            if let Err(e) = self.write_immutable(&mut inner) {
                first_err = Some(e);
            }
        }

        if let Err(e) = inner.wal.close() {
            first_err.get_or_insert_with(|| anyhow::Error::new(e).context("close WAL"));
        }

        inner.tables.clear();

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Returns an error if [`close`](Db::close) has been called.
    pub(crate) fn check_open(&self) -> Result<()> {
        anyhow::ensure!(!self.closed.load(Ordering::Acquire), "store is closed");
        Ok(())
    }
}

/// Best-effort close on drop; errors are discarded because `Drop` cannot
/// propagate them. Data is safe either way: everything unflushed is in
/// the WAL.
impl Drop for Db {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests;
