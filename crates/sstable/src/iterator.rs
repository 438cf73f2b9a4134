//! Forward iteration over every entry of a table.

use crate::format::decode_block_entry;
use crate::reader::TableReader;

/// Forward-only iterator over a [`TableReader`].
///
/// Loads one block at a time, verifying each block's CRC as it goes. Any
/// corrupt block — or an I/O failure — invalidates the iterator; `valid`
/// then stays `false`.
pub struct TableIter<'a> {
    reader: &'a TableReader,
    /// Index of the next block to load.
    next_block: usize,
    /// Entry bytes of the current block (CRC stripped).
    block: Vec<u8>,
    /// Decode cursor within `block`.
    pos: usize,
    key: Vec<u8>,
    value: Vec<u8>,
    deleted: bool,
    valid: bool,
}

impl<'a> TableIter<'a> {
    pub(crate) fn new(reader: &'a TableReader) -> Self {
        Self {
            reader,
            next_block: 0,
            block: Vec::new(),
            pos: 0,
            key: Vec::new(),
            value: Vec::new(),
            deleted: false,
            valid: false,
        }
    }

    /// Positions at the first entry of the table.
    pub fn seek_to_first(&mut self) {
        self.next_block = 0;
        self.block.clear();
        self.pos = 0;
        self.valid = false;
        self.next();
    }

    /// Advances to the next entry, loading the next block when the
    /// current one is exhausted.
    pub fn next(&mut self) {
        loop {
            if self.pos < self.block.len() {
                let mut pos = self.pos;
                match decode_block_entry(&self.block, &mut pos) {
                    Some((key, value, deleted)) => {
                        self.key.clear();
                        self.key.extend_from_slice(key);
                        self.value.clear();
                        self.value.extend_from_slice(value);
                        self.deleted = deleted;
                        self.pos = pos;
                        self.valid = true;
                        return;
                    }
                    None => {
                        // trailing garbage in a checksummed block
                        self.valid = false;
                        return;
                    }
                }
            }

            // Current block exhausted; load the next one.
            if self.next_block >= self.reader.block_count() {
                self.valid = false;
                return;
            }
            match self.reader.read_block(self.next_block) {
                Ok(Some(data)) => {
                    self.block = data;
                    self.pos = 0;
                    self.next_block += 1;
                }
                Ok(None) | Err(_) => {
                    // corrupt block or I/O failure: stop iterating
                    self.valid = false;
                    return;
                }
            }
        }
    }

    /// Returns `true` while positioned at an entry.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Returns the current key. Meaningful only while [`valid`](Self::valid).
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Returns the current value. Meaningful only while [`valid`](Self::valid).
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Returns `true` if the current entry is a tombstone.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}
