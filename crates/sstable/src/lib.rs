//! # SSTable — Sorted String Table
//!
//! Immutable, on-disk storage files for the SiltKV storage engine.
//!
//! When the in-memory [`memtable::Memtable`] exceeds its size threshold
//! the engine flushes it to disk as an SSTable. SSTables are *write-once,
//! read-many* — once renamed into place they are never modified.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA BLOCKS (≈4 KiB each, sorted entries)                     │
//! │                                                               │
//! │ entry:  key_len (u32) | value_len (u32) | deleted (u8)        │
//! │         key | value                                           │
//! │ block:  entries ... | crc32 (u32)                             │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INDEX (first key + byte extent of every block)                │
//! │                                                               │
//! │ num_entries (u32)                                             │
//! │ key_len (u32) | key | offset (u64) | size (u64)  ... repeated │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FILTER (serialized bloom filter; absent when disabled)        │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 40 bytes)                                 │
//! │                                                               │
//! │ index_offset (u64) | index_size (u64)                         │
//! │ filter_offset (u64) | filter_size (u64)                       │
//! │ magic (u64) = 0x53535461626C6521 "SSTable!"                   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The reader also accepts the legacy
//! 24-byte footer `[index_offset][index_size][magic]` written before the
//! filter section existed; such files simply have no filter.
//!
//! Blocks carry their own CRC-32 and are scanned linearly — at 4 KiB a
//! linear decode is competitive with any in-block index, and the format
//! stays trivial.

mod format;
mod iterator;
mod reader;
mod writer;

pub use format::{
    BlockHandle, IndexEntry, BLOCK_SIZE, FOOTER_BYTES, LEGACY_FOOTER_BYTES, TABLE_MAGIC,
};
pub use iterator::TableIter;
pub use reader::TableReader;
pub use writer::TableWriter;

use std::io;
use thiserror::Error;

/// Errors from sorted-table operations.
#[derive(Debug, Error)]
pub enum TableError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The file failed structural validation (footer, index, filter).
    #[error("corrupt table: {0}")]
    Corrupt(&'static str),
}

#[cfg(test)]
mod tests;
