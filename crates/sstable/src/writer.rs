//! Streaming sorted-table writer.

use bloom::BloomFilter;
use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use memtable::{BytewiseComparator, Comparator};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::format::{encode_block_entry, BlockHandle, Footer, IndexEntry, BLOCK_SIZE};
use crate::TableError;

/// Initial filter sizing before the true key count is known; the filter
/// keeps its per-key bit budget as it grows.
const FILTER_ESTIMATED_KEYS: usize = 1000;

/// Serialises a sorted entry stream into a block-indexed table file.
///
/// Entries **must** arrive in non-decreasing key order; the writer trusts
/// its caller (the engine feeds it straight from a sorted memtable
/// iterator). Entries accumulate in an in-memory block buffer that is cut
/// to disk with a trailing CRC-32 whenever it reaches [`BLOCK_SIZE`].
///
/// The file is written to `<path>.tmp` and renamed onto `<path>` by
/// [`finish`](TableWriter::finish), so a crash mid-write can never leave
/// a half-built table under its final name.
pub struct TableWriter {
    file: BufWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    /// Current write position (bytes already cut to the file).
    offset: u64,
    /// Pending entries of the current block.
    block_buf: Vec<u8>,
    /// First key of the current block, captured on its first entry.
    first_key: Option<Vec<u8>>,
    index: Vec<IndexEntry>,
    filter: Option<BloomFilter>,
    bits_per_key: usize,
    comparator: Arc<dyn Comparator + Send + Sync>,
    /// Previous key added, kept to assert the input stays sorted.
    last_key: Option<Vec<u8>>,
}

impl TableWriter {
    /// Creates a writer targeting `path`, with the bytewise comparator.
    ///
    /// `bits_per_key` sizes the bloom filter; 0 disables it.
    pub fn create<P: AsRef<Path>>(path: P, bits_per_key: usize) -> Result<Self, TableError> {
        Self::with_comparator(path, bits_per_key, Arc::new(BytewiseComparator))
    }

    /// Creates a writer with an explicit comparator. The comparator must
    /// match the order of the incoming entry stream.
    pub fn with_comparator<P: AsRef<Path>>(
        path: P,
        bits_per_key: usize,
        comparator: Arc<dyn Comparator + Send + Sync>,
    ) -> Result<Self, TableError> {
        let final_path = path.as_ref().to_path_buf();
        let mut tmp_path = final_path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        Ok(Self {
            file: BufWriter::new(file),
            tmp_path,
            final_path,
            offset: 0,
            block_buf: Vec::with_capacity(BLOCK_SIZE + 256),
            first_key: None,
            index: Vec::new(),
            filter: None,
            bits_per_key,
            comparator,
            last_key: None,
        })
    }

    /// Appends one entry. Keys must be fed in non-decreasing order.
    pub fn add(&mut self, key: &[u8], value: &[u8], deleted: bool) -> Result<(), TableError> {
        if let Some(last) = &self.last_key {
            debug_assert!(
                self.comparator.compare(last, key) != std::cmp::Ordering::Greater,
                "keys fed out of order"
            );
        }
        self.last_key = Some(key.to_vec());

        if self.bits_per_key > 0 {
            let filter = self
                .filter
                .get_or_insert_with(|| BloomFilter::new(FILTER_ESTIMATED_KEYS, self.bits_per_key));
            filter.insert(key);
        }

        if self.first_key.is_none() {
            self.first_key = Some(key.to_vec());
        }

        encode_block_entry(&mut self.block_buf, key, value, deleted);

        if self.block_buf.len() >= BLOCK_SIZE {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Cuts the pending block to the file: entries, then their CRC-32,
    /// then an index entry recording the block's first key and extent.
    fn flush_block(&mut self) -> Result<(), TableError> {
        let first_key = match self.first_key.take() {
            Some(key) => key,
            None => return Ok(()), // nothing buffered
        };

        let mut hasher = Crc32::new();
        hasher.update(&self.block_buf);
        let crc = hasher.finalize();

        let block_size = self.block_buf.len() as u64 + 4;
        self.index.push(IndexEntry {
            first_key,
            handle: BlockHandle {
                offset: self.offset,
                size: block_size,
            },
        });

        self.file.write_all(&self.block_buf)?;
        self.file.write_u32::<LittleEndian>(crc)?;
        self.offset += block_size;

        self.block_buf.clear();
        Ok(())
    }

    /// Completes the table: flushes the pending block, writes the index,
    /// the filter, and the footer, fsyncs, and atomically renames the
    /// temp file onto its final path.
    pub fn finish(mut self) -> Result<(), TableError> {
        self.flush_block()?;

        // Index: [num_entries:4] then [key_len:4][key][offset:8][size:8].
        let index_offset = self.offset;
        self.file.write_u32::<LittleEndian>(self.index.len() as u32)?;
        self.offset += 4;
        for entry in &self.index {
            self.file
                .write_u32::<LittleEndian>(entry.first_key.len() as u32)?;
            self.file.write_all(&entry.first_key)?;
            self.file.write_u64::<LittleEndian>(entry.handle.offset)?;
            self.file.write_u64::<LittleEndian>(entry.handle.size)?;
            self.offset += 4 + entry.first_key.len() as u64 + 8 + 8;
        }
        let index_size = self.offset - index_offset;

        // Filter, when enabled and at least one key was added.
        let filter_offset = self.offset;
        let mut filter_size = 0u64;
        if let Some(filter) = self.filter.take() {
            filter.write_to(&mut self.file)?;
            filter_size = filter.encoded_size() as u64;
            self.offset += filter_size;
        }

        let footer = Footer {
            index_offset,
            index_size,
            filter_offset,
            filter_size,
        };
        footer.encode(&mut self.file)?;

        self.file.flush()?;
        self.file.get_ref().sync_all()?;

        // Release the handle before the rename.
        let TableWriter {
            file,
            tmp_path,
            final_path,
            ..
        } = self;
        drop(file);

        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    /// Abandons the table, removing the temp file. Used on flush failure.
    pub fn abandon(self) -> Result<(), TableError> {
        let TableWriter { file, tmp_path, .. } = self;
        drop(file);
        match fs::remove_file(&tmp_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TableError::Io(e)),
        }
    }
}
