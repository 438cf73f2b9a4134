//! On-disk format constants and encode/decode helpers.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Write};

use crate::TableError;

/// Identifies a SiltKV sorted table; "SSTable!" as a little-endian u64.
pub const TABLE_MAGIC: u64 = 0x5353_5461_626C_6521;

/// Target uncompressed size of a data block. Blocks grow slightly past
/// this: an entry is never split across blocks.
pub const BLOCK_SIZE: usize = 4 * 1024;

/// Size of the current footer: index extent + filter extent + magic.
pub const FOOTER_BYTES: u64 = 40;

/// Size of the legacy footer: index extent + magic, no filter.
pub const LEGACY_FOOTER_BYTES: u64 = 24;

/// Byte extent of a block within the file. `size` includes the trailing
/// CRC-32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

/// One index record: the first key of a block and where to find it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub first_key: Vec<u8>,
    pub handle: BlockHandle,
}

/// Locations of the index and filter sections, parsed from the footer.
/// `filter_size == 0` means no filter (disabled, or a legacy file).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Footer {
    pub index_offset: u64,
    pub index_size: u64,
    pub filter_offset: u64,
    pub filter_size: u64,
}

impl Footer {
    /// Writes the 40-byte footer, magic last.
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(self.index_offset)?;
        w.write_u64::<LittleEndian>(self.index_size)?;
        w.write_u64::<LittleEndian>(self.filter_offset)?;
        w.write_u64::<LittleEndian>(self.filter_size)?;
        w.write_u64::<LittleEndian>(TABLE_MAGIC)?;
        Ok(())
    }

    /// Parses a 40-byte footer; `None` if the trailing magic is absent
    /// (the caller then tries the legacy shape).
    pub fn decode(buf: &[u8; 40]) -> Option<Self> {
        if le_u64(&buf[32..]) != TABLE_MAGIC {
            return None;
        }
        Some(Self {
            index_offset: le_u64(&buf[0..]),
            index_size: le_u64(&buf[8..]),
            filter_offset: le_u64(&buf[16..]),
            filter_size: le_u64(&buf[24..]),
        })
    }

    /// Parses the legacy 24-byte footer shape (no filter section).
    pub fn decode_legacy(buf: &[u8; 24]) -> Result<Self, TableError> {
        if le_u64(&buf[16..]) != TABLE_MAGIC {
            return Err(TableError::Corrupt("bad footer magic"));
        }
        Ok(Self {
            index_offset: le_u64(&buf[0..]),
            index_size: le_u64(&buf[8..]),
            filter_offset: 0,
            filter_size: 0,
        })
    }
}

/// Reads a little-endian u64 from the first 8 bytes of `buf`.
fn le_u64(buf: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&buf[..8]);
    u64::from_le_bytes(arr)
}

/// Appends one entry to a block buffer:
/// `[key_len:4][value_len:4][deleted:1][key][value]`.
pub(crate) fn encode_block_entry(buf: &mut Vec<u8>, key: &[u8], value: &[u8], deleted: bool) {
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.push(u8::from(deleted));
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
}

/// Decodes the entry starting at `*pos`, advancing `*pos` past it.
///
/// Returns `None` at the end of the block or when the remaining bytes
/// cannot hold a whole entry (possible only if the block passed its CRC
/// yet is malformed — the caller treats that as corruption).
pub(crate) fn decode_block_entry<'a>(
    data: &'a [u8],
    pos: &mut usize,
) -> Option<(&'a [u8], &'a [u8], bool)> {
    if *pos == data.len() {
        return None;
    }
    let rest = &data[*pos..];
    if rest.len() < 9 {
        return None;
    }
    let key_len = u32::from_le_bytes(rest[0..4].try_into().ok()?) as usize;
    let value_len = u32::from_le_bytes(rest[4..8].try_into().ok()?) as usize;
    let deleted = rest[8] != 0;

    let key_start = 9;
    let value_start = key_start + key_len;
    let end = value_start + value_len;
    if rest.len() < end {
        return None;
    }

    *pos += end;
    Some((&rest[key_start..value_start], &rest[value_start..end], deleted))
}

/// Parses an index section: `[num_entries:4]` then per entry
/// `[key_len:4][key][offset:8][size:8]`.
pub(crate) fn decode_index(data: &[u8]) -> Result<Vec<IndexEntry>, TableError> {
    let mut cursor = data;
    let num_entries = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| TableError::Corrupt("truncated index"))?;

    let mut index = Vec::with_capacity(num_entries as usize);
    for _ in 0..num_entries {
        let key_len = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| TableError::Corrupt("truncated index"))? as usize;
        if cursor.len() < key_len + 16 {
            return Err(TableError::Corrupt("truncated index"));
        }
        let first_key = cursor[..key_len].to_vec();
        cursor = &cursor[key_len..];
        let offset = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| TableError::Corrupt("truncated index"))?;
        let size = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| TableError::Corrupt("truncated index"))?;
        index.push(IndexEntry {
            first_key,
            handle: BlockHandle { offset, size },
        });
    }
    Ok(index)
}
