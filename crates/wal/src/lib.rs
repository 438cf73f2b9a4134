//! # WAL — Write-Ahead Log
//!
//! Crash-safe durability for the SiltKV storage engine.
//!
//! Every mutation (`PUT` or `DELETE`) is serialized into a binary record
//! and appended to the WAL **before** the corresponding memtable update.
//! On restart the WAL is replayed to rebuild the memtable, so no
//! acknowledged write is lost.
//!
//! ## Binary record format
//!
//! ```text
//! [magic: DE AD BE EF][record_len: u32 LE][type: u8]
//! [key_len: u32 LE][value_len: u32 LE][key][value][crc32: u32 LE]
//! ```
//!
//! `record_len` counts everything after itself, CRC included. `type` is
//! 1 for Put, 2 for Delete. The CRC-32 (IEEE) covers
//! `type ‖ key_len ‖ value_len ‖ key ‖ value`.
//!
//! The leading magic is what makes recovery *record-granular*: when a
//! record fails its checks, the reader scans forward for the next magic
//! sequence and resumes there, losing only the damaged record.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{WalReader, WalRecord, WalWriter};
//!
//! let mut w = WalWriter::open("wal.log", true).unwrap();
//! w.append(&WalRecord::Put {
//!     key: b"hello".to_vec(),
//!     value: b"world".to_vec(),
//! }).unwrap();
//! drop(w);
//!
//! let mut r = WalReader::open("wal.log").unwrap();
//! while let Some(rec) = r.read_record().unwrap() {
//!     println!("{:?}", rec);
//! }
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use memtable::Memtable;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use thiserror::Error;

/// Marks the start of every record; recovery scans for this sequence.
pub const WAL_MAGIC: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

/// Record type byte for a Put.
pub const RECORD_PUT: u8 = 1;
/// Record type byte for a Delete.
pub const RECORD_DELETE: u8 = 2;

/// Sanity bound on `record_len`; larger values are treated as corruption.
const MAX_RECORD_BYTES: u32 = 100 * 1024 * 1024;

/// A single WAL record: one user-level mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// A key-value insertion.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// A key deletion (becomes a tombstone in the memtable).
    Delete { key: Vec<u8> },
}

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record failed framing, length, or CRC validation.
    #[error("corrupt WAL record: {0}")]
    Corrupt(&'static str),
}

/// Counters reported by [`recover_memtable`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Records successfully applied to the memtable.
    pub applied: usize,
    /// Records skipped after failing validation.
    pub corrupted: usize,
}

/// Append-only WAL writer.
///
/// Each record is framed into a reusable scratch buffer and handed to the
/// OS in a single `write_all`, so a crash can only ever truncate the tail
/// record, never interleave two. With `sync` enabled, every append is
/// followed by `sync_all()` (fsync) before returning; without it, records
/// are durable only after [`sync`](WalWriter::sync) or
/// [`close`](WalWriter::close).
pub struct WalWriter {
    file: File,
    sync: bool,
    /// Reusable scratch buffer; cleared per append, allocation kept.
    buf: Vec<u8>,
}

impl WalWriter {
    /// Opens (or creates) a WAL file in append mode.
    pub fn open<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        Ok(Self {
            file,
            sync,
            buf: Vec::with_capacity(256),
        })
    }

    /// Serializes `record` and appends it to the WAL.
    pub fn append(&mut self, record: &WalRecord) -> Result<(), WalError> {
        let (rtype, key, value): (u8, &[u8], &[u8]) = match record {
            WalRecord::Put { key, value } => (RECORD_PUT, key, value),
            WalRecord::Delete { key } => (RECORD_DELETE, key, &[]),
        };

        // record_len counts type + key_len + value_len + key + value + crc
        let record_len = 1u64 + 4 + 4 + key.len() as u64 + value.len() as u64 + 4;
        if record_len > u32::MAX as u64 {
            return Err(WalError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "WAL record exceeds u32::MAX bytes",
            )));
        }

        self.buf.clear();
        self.buf.extend_from_slice(&WAL_MAGIC);
        self.buf.write_u32::<LittleEndian>(record_len as u32)?;
        self.buf.write_u8(rtype)?;
        self.buf.write_u32::<LittleEndian>(key.len() as u32)?;
        self.buf.write_u32::<LittleEndian>(value.len() as u32)?;
        self.buf.extend_from_slice(key);
        self.buf.extend_from_slice(value);

        // CRC covers type..value, i.e. everything after record_len so far.
        let mut hasher = Crc32::new();
        hasher.update(&self.buf[8..]);
        let crc = hasher.finalize();
        self.buf.extend_from_slice(&crc.to_le_bytes());

        // One write call for the whole frame.
        self.file.write_all(&self.buf)?;
        self.file.flush()?;

        if self.sync {
            self.file.sync_all()?;
        }

        Ok(())
    }

    /// Forces everything written so far onto stable storage.
    pub fn sync(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Syncs and closes the WAL. The file handle is released on drop.
    pub fn close(&mut self) -> Result<(), WalError> {
        self.sync()
    }
}

/// Sequential WAL reader with record-granularity corruption recovery.
///
/// Generic over any `Read` implementor so tests can replay from in-memory
/// buffers; [`WalReader::open`] provides the file-backed form.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
    /// Set by [`scan_to_next_record`] when the magic sequence has already
    /// been consumed; the next [`read_record`] then skips the magic check.
    ///
    /// [`scan_to_next_record`]: WalReader::scan_to_next_record
    /// [`read_record`]: WalReader::read_record
    magic_pending: bool,
}

impl WalReader<File> {
    /// Opens an existing WAL file for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
            magic_pending: false,
        })
    }
}

impl<R: Read> WalReader<R> {
    /// Constructs a reader from any `Read` implementor.
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
            magic_pending: false,
        }
    }

    /// Reads the next record.
    ///
    /// Returns `Ok(None)` at a clean end of file (no bytes past the last
    /// record). Every other failure mode — bad magic, oversized or
    /// inconsistent lengths, CRC mismatch, truncated tail — is
    /// [`WalError::Corrupt`]; the caller may then call
    /// [`scan_to_next_record`](WalReader::scan_to_next_record) to skip
    /// the damage.
    pub fn read_record(&mut self) -> Result<Option<WalRecord>, WalError> {
        if self.magic_pending {
            self.magic_pending = false;
        } else {
            let mut magic = [0u8; 4];
            match read_full(&mut self.rdr, &mut magic)? {
                ReadFull::Eof => return Ok(None),
                ReadFull::Partial => return Err(WalError::Corrupt("truncated magic")),
                ReadFull::Complete => {}
            }
            if magic != WAL_MAGIC {
                return Err(WalError::Corrupt("bad magic"));
            }
        }

        let record_len = self
            .rdr
            .read_u32::<LittleEndian>()
            .map_err(eof_to_corrupt)?;
        if record_len > MAX_RECORD_BYTES {
            return Err(WalError::Corrupt("record too large"));
        }
        // type + key_len + value_len + crc is the smallest possible body
        if record_len < 1 + 4 + 4 + 4 {
            return Err(WalError::Corrupt("record too short"));
        }

        let mut body = vec![0u8; record_len as usize];
        self.rdr.read_exact(&mut body).map_err(eof_to_corrupt)?;

        let mut br = &body[..];
        let rtype = br.read_u8().map_err(eof_to_corrupt)?;
        let key_len = br.read_u32::<LittleEndian>().map_err(eof_to_corrupt)?;
        let value_len = br.read_u32::<LittleEndian>().map_err(eof_to_corrupt)?;

        let expected = 1u64 + 4 + 4 + key_len as u64 + value_len as u64 + 4;
        if record_len as u64 != expected {
            return Err(WalError::Corrupt("record length mismatch"));
        }

        let mut key = vec![0u8; key_len as usize];
        br.read_exact(&mut key).map_err(eof_to_corrupt)?;
        let mut value = vec![0u8; value_len as usize];
        br.read_exact(&mut value).map_err(eof_to_corrupt)?;
        let stored_crc = br.read_u32::<LittleEndian>().map_err(eof_to_corrupt)?;

        // Recompute the CRC over type..value (body minus the trailing CRC).
        let mut hasher = Crc32::new();
        hasher.update(&body[..body.len() - 4]);
        if hasher.finalize() != stored_crc {
            return Err(WalError::Corrupt("crc mismatch"));
        }

        match rtype {
            RECORD_PUT => Ok(Some(WalRecord::Put { key, value })),
            RECORD_DELETE => Ok(Some(WalRecord::Delete { key })),
            _ => Err(WalError::Corrupt("unknown record type")),
        }
    }

    /// Scans forward for the next magic sequence after a corrupt record.
    ///
    /// Uses a 4-state matcher: a mismatched byte resets the match, except
    /// that a byte equal to `magic[0]` restarts it at state 1. On success
    /// the magic has been consumed and the next
    /// [`read_record`](WalReader::read_record) resumes right after it.
    /// Returns `false` when the end of the stream is reached first.
    pub fn scan_to_next_record(&mut self) -> Result<bool, WalError> {
        let mut matched = 0usize;
        loop {
            let b = match self.rdr.read_u8() {
                Ok(b) => b,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
                Err(e) => return Err(WalError::Io(e)),
            };

            if b == WAL_MAGIC[matched] {
                matched += 1;
                if matched == WAL_MAGIC.len() {
                    self.magic_pending = true;
                    return Ok(true);
                }
            } else if b == WAL_MAGIC[0] {
                matched = 1;
            } else {
                matched = 0;
            }
        }
    }
}

/// Rebuilds a memtable by replaying the WAL at `path`.
///
/// Corrupt records are counted and skipped via
/// [`WalReader::scan_to_next_record`]; they never fail the recovery. A
/// missing WAL file yields an empty memtable (fresh start). The returned
/// memtable may exceed `max_size` — the first write after recovery will
/// trigger a flush.
pub fn recover_memtable<P: AsRef<Path>>(
    path: P,
    max_size: u64,
) -> Result<(Memtable, RecoveryStats), WalError> {
    let mem = Memtable::new(max_size);
    let mut stats = RecoveryStats::default();

    let mut reader = match WalReader::open(path.as_ref()) {
        Ok(r) => r,
        Err(WalError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            return Ok((mem, stats));
        }
        Err(e) => return Err(e),
    };

    loop {
        match reader.read_record() {
            Ok(Some(record)) => {
                // The memtable is freshly created and still active, so
                // the immutability check cannot fail.
                let _ = match record {
                    WalRecord::Put { key, value } => mem.put(key, value),
                    WalRecord::Delete { key } => mem.delete(key),
                };
                stats.applied += 1;
            }
            Ok(None) => break,
            Err(WalError::Corrupt(_)) => {
                stats.corrupted += 1;
                if !reader.scan_to_next_record()? {
                    break;
                }
            }
            Err(e) => return Err(e),
        }
    }

    if stats.corrupted > 0 {
        tracing::warn!(
            applied = stats.applied,
            corrupted = stats.corrupted,
            path = %path.as_ref().display(),
            "WAL recovery skipped corrupt records"
        );
    }

    Ok((mem, stats))
}

enum ReadFull {
    Complete,
    Partial,
    Eof,
}

/// Fills `buf`, distinguishing a clean EOF (no bytes read) from a
/// truncated read (some bytes, then EOF).
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<ReadFull, WalError> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => {
                return Ok(if filled == 0 {
                    ReadFull::Eof
                } else {
                    ReadFull::Partial
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(WalError::Io(e)),
        }
    }
    Ok(ReadFull::Complete)
}

/// Maps an unexpected-EOF mid-record to a corruption error; a crashed
/// writer leaves exactly this shape behind.
fn eof_to_corrupt(e: io::Error) -> WalError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        WalError::Corrupt("truncated record")
    } else {
        WalError::Io(e)
    }
}
