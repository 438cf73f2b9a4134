//! # Memtable — the in-memory write buffer
//!
//! Every mutation lands here first (after the WAL). The memtable maps
//! each key to its latest [`Entry`] — last writer wins — and tracks an
//! aggregate byte size so the engine knows when to flush.
//!
//! A memtable is a small state machine: it starts **active**, accepting
//! writes, and is frozen to **immutable** the instant a flush begins.
//! The transition is one-way; a frozen memtable only serves reads and
//! the flush iterator until it is dropped.
//!
//! The sorted structure underneath is a concurrent [`SkipList`]; see its
//! documentation for the locking contract.

mod comparator;
mod skiplist;

pub use comparator::{BytewiseComparator, Comparator};
pub use skiplist::{SkipIter, SkipList};

use std::sync::atomic::{AtomicU8, Ordering as AtomicOrdering};

use parking_lot::Mutex;
use thiserror::Error;

const STATE_ACTIVE: u8 = 0;
const STATE_IMMUTABLE: u8 = 1;

/// The atomic unit of storage: a key, a value, a tombstone flag, and a
/// reserved version timestamp (always 0 until multi-version reads are
/// specified).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// `true` marks a deletion; the value is retained but ignored.
    pub deleted: bool,
    pub timestamp: u64,
}

impl Entry {
    /// Creates a live entry.
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            key,
            value,
            deleted: false,
            timestamp: 0,
        }
    }

    /// Creates a deletion marker for `key`.
    pub fn tombstone(key: Vec<u8>) -> Self {
        Self {
            key,
            value: Vec::new(),
            deleted: true,
            timestamp: 0,
        }
    }

    /// Accounted byte size: key + value + tombstone flag + timestamp.
    pub fn size(&self) -> u64 {
        (self.key.len() + self.value.len() + 1 + 8) as u64
    }
}

/// Errors from memtable mutations.
#[derive(Debug, Error)]
pub enum MemtableError {
    /// The memtable has been frozen for flushing; no further writes.
    #[error("memtable is immutable")]
    Immutable,
}

/// The in-memory sorted write buffer.
pub struct Memtable {
    data: SkipList,
    /// [`STATE_ACTIVE`] or [`STATE_IMMUTABLE`]; readable without the mutex.
    state: AtomicU8,
    /// Flush threshold in bytes.
    max_size: u64,
    /// Serialises writes against the active→immutable transition.
    mu: Mutex<()>,
}

impl Memtable {
    /// Creates an active memtable that reports full at `max_size` bytes.
    pub fn new(max_size: u64) -> Self {
        Self {
            data: SkipList::new(),
            state: AtomicU8::new(STATE_ACTIVE),
            max_size,
            mu: Mutex::new(()),
        }
    }

    /// Inserts or overwrites a live entry.
    ///
    /// Fails with [`MemtableError::Immutable`] once the memtable has been
    /// frozen.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), MemtableError> {
        let _guard = self.mu.lock();
        if self.state.load(AtomicOrdering::Acquire) != STATE_ACTIVE {
            return Err(MemtableError::Immutable);
        }
        self.data.put(key, value);
        Ok(())
    }

    /// Inserts a tombstone for `key`.
    ///
    /// Fails with [`MemtableError::Immutable`] once the memtable has been
    /// frozen.
    pub fn delete(&self, key: Vec<u8>) -> Result<(), MemtableError> {
        let _guard = self.mu.lock();
        if self.state.load(AtomicOrdering::Acquire) != STATE_ACTIVE {
            return Err(MemtableError::Immutable);
        }
        self.data.delete(key);
        Ok(())
    }

    /// Looks up `key`, returning `(value, is_tombstone)` when present.
    /// Allowed in both states.
    pub fn get(&self, key: &[u8]) -> Option<(Vec<u8>, bool)> {
        self.data.get(key)
    }

    /// Returns the aggregate byte size of all entries.
    pub fn size(&self) -> u64 {
        self.data.size()
    }

    /// Returns the number of distinct keys (tombstones included).
    pub fn count(&self) -> usize {
        self.data.count()
    }

    /// Returns `true` once the memtable has reached its flush threshold.
    pub fn is_full(&self) -> bool {
        self.data.size() >= self.max_size
    }

    /// Freezes the memtable. Idempotent; there is no way back.
    ///
    /// After this returns, every `put`/`delete` fails and the underlying
    /// skip list is stable for the flush iterator.
    pub fn set_immutable(&self) {
        let _guard = self.mu.lock();
        self.state.store(STATE_IMMUTABLE, AtomicOrdering::Release);
    }

    /// Returns `true` once frozen.
    pub fn is_immutable(&self) -> bool {
        self.state.load(AtomicOrdering::Acquire) == STATE_IMMUTABLE
    }

    /// Creates a sorted forward iterator over the entries.
    ///
    /// The iterator holds the skip list's read lock until dropped; see
    /// [`SkipList::iter`].
    pub fn iter(&self) -> SkipIter<'_> {
        self.data.iter()
    }
}

#[cfg(test)]
mod tests;
