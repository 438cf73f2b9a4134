//! Point-lookup reader over a finished table file.

use bloom::BloomFilter;
use crc32fast::Hasher as Crc32;
use memtable::{BytewiseComparator, Comparator};
use std::cmp::Ordering;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::format::{
    decode_block_entry, decode_index, Footer, IndexEntry, FOOTER_BYTES, LEGACY_FOOTER_BYTES,
};
use crate::iterator::TableIter;
use crate::TableError;

/// Reads a sorted table for point lookups.
///
/// `open` parses the footer and pulls the whole index (and the filter,
/// when present) into memory; lookups then cost one positional block read
/// plus a linear in-block scan. The reader never seeks its file handle —
/// all reads go through [`read_exact_at`] — so any number of threads may
/// look up and iterate concurrently over one shared reader.
///
/// Corruption found *inside* a block is degraded to "not found": the
/// engine's layered read path lets older tables still answer, and the
/// event is reported with a warn line.
pub struct TableReader {
    file: File,
    /// Total file size, captured at open.
    size: u64,
    index: Vec<IndexEntry>,
    filter: Option<BloomFilter>,
    comparator: Arc<dyn Comparator + Send + Sync>,
    path: PathBuf,
}

impl TableReader {
    /// Opens a table with the bytewise comparator.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        Self::with_comparator(path, Arc::new(BytewiseComparator))
    }

    /// Opens a table with an explicit comparator; it must match the
    /// comparator the table was written under.
    ///
    /// # Errors
    ///
    /// Fails with [`TableError::Corrupt`] when neither footer shape
    /// validates, or when the index or filter cannot be decoded.
    pub fn with_comparator<P: AsRef<Path>>(
        path: P,
        comparator: Arc<dyn Comparator + Send + Sync>,
    ) -> Result<Self, TableError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();

        let footer = read_footer(&file, size)?;

        if footer.index_offset + footer.index_size > size {
            return Err(TableError::Corrupt("index extent past end of file"));
        }

        let filter = if footer.filter_size > 0 {
            if footer.filter_offset + footer.filter_size > size {
                return Err(TableError::Corrupt("filter extent past end of file"));
            }
            let mut buf = vec![0u8; footer.filter_size as usize];
            read_exact_at(&file, &mut buf, footer.filter_offset)?;
            let filter = BloomFilter::read_from(&mut &buf[..])
                .map_err(|_| TableError::Corrupt("bad filter encoding"))?;
            Some(filter)
        } else {
            None
        };

        let mut index_buf = vec![0u8; footer.index_size as usize];
        read_exact_at(&file, &mut index_buf, footer.index_offset)?;
        let index = decode_index(&index_buf)?;

        Ok(Self {
            file,
            size,
            index,
            filter,
            comparator,
            path,
        })
    }

    /// Returns `true` if the key might be in this table; `false` means it
    /// definitely is not. Without a filter this is always `true`.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        match &self.filter {
            Some(filter) => filter.may_contain(key),
            None => true,
        }
    }

    /// Looks up `key`, returning `(value, is_tombstone)` when the table
    /// holds it.
    ///
    /// A block whose CRC fails is reported with a warn line and treated
    /// as not holding the key. I/O errors propagate.
    pub fn get(&self, key: &[u8]) -> Result<Option<(Vec<u8>, bool)>, TableError> {
        if !self.may_contain(key) {
            return Ok(None);
        }

        let block_idx = match self.find_block(key) {
            Some(idx) => idx,
            None => return Ok(None),
        };

        let data = match self.read_block(block_idx)? {
            Some(data) => data,
            None => return Ok(None), // corrupt block, already reported
        };

        let mut pos = 0usize;
        while let Some((entry_key, entry_value, deleted)) = decode_block_entry(&data, &mut pos) {
            match self.comparator.compare(entry_key, key) {
                Ordering::Equal => return Ok(Some((entry_value.to_vec(), deleted))),
                Ordering::Greater => break, // sorted: the key cannot follow
                Ordering::Less => {}
            }
        }
        Ok(None)
    }

    /// Creates a forward iterator over every entry in the table.
    pub fn iter(&self) -> TableIter<'_> {
        TableIter::new(self)
    }

    /// Returns the number of data blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` when the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the path this table was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Binary-searches the index for the last block whose first key is
    /// ≤ `key`. `None` when the key sorts before every block.
    fn find_block(&self, key: &[u8]) -> Option<usize> {
        let cmp = self.comparator.as_ref();
        // Number of blocks whose first_key <= key.
        let idx = self
            .index
            .partition_point(|entry| cmp.compare(&entry.first_key, key) != Ordering::Greater);
        idx.checked_sub(1)
    }

    /// Reads block `idx` and verifies its CRC, returning the entry bytes
    /// without the checksum. `Ok(None)` on a corrupt block.
    pub(crate) fn read_block(&self, idx: usize) -> Result<Option<Vec<u8>>, TableError> {
        let handle = self.index[idx].handle;

        if handle.size < 4 || handle.offset + handle.size > self.size {
            tracing::warn!(
                path = %self.path.display(),
                block = idx,
                "block extent out of bounds, treating as corrupt"
            );
            return Ok(None);
        }

        let mut buf = vec![0u8; handle.size as usize];
        read_exact_at(&self.file, &mut buf, handle.offset)?;

        let crc_start = buf.len() - 4;
        let mut stored = [0u8; 4];
        stored.copy_from_slice(&buf[crc_start..]);
        let stored_crc = u32::from_le_bytes(stored);

        let mut hasher = Crc32::new();
        hasher.update(&buf[..crc_start]);
        if hasher.finalize() != stored_crc {
            tracing::warn!(
                path = %self.path.display(),
                block = idx,
                "block checksum mismatch, treating as corrupt"
            );
            return Ok(None);
        }

        buf.truncate(crc_start);
        Ok(Some(buf))
    }
}

/// Reads and validates the footer, trying the 40-byte shape first and
/// falling back to the legacy 24-byte shape.
fn read_footer(file: &File, size: u64) -> Result<Footer, TableError> {
    if size >= FOOTER_BYTES {
        let mut buf = [0u8; FOOTER_BYTES as usize];
        read_exact_at(file, &mut buf, size - FOOTER_BYTES)?;
        if let Some(footer) = Footer::decode(&buf) {
            return Ok(footer);
        }
    }

    if size < LEGACY_FOOTER_BYTES {
        return Err(TableError::Corrupt("table too small for a footer"));
    }
    let mut buf = [0u8; LEGACY_FOOTER_BYTES as usize];
    read_exact_at(file, &mut buf, size - LEGACY_FOOTER_BYTES)?;
    Footer::decode_legacy(&buf)
}

/// Positional read: fills `buf` from `offset` without touching any shared
/// cursor, so concurrent lookups never interleave seeks.
#[cfg(unix)]
pub(crate) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
pub(crate) fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
