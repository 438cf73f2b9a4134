//! # Bloom Filter
//!
//! A space-efficient probabilistic set used to skip sorted tables that
//! definitely do not contain a key.
//!
//! A bloom filter can say with certainty that a key is **not** in the set
//! (no false negatives), but may occasionally report that a key **is** in
//! the set when it isn't (false positives). The false-positive rate is
//! controlled by the bits-per-key parameter used at construction.
//!
//! ## Usage in SiltKV
//!
//! Each sorted table embeds a filter built from every key it holds. Point
//! lookups consult the filter before touching the index or the data
//! blocks; a negative answer skips the table entirely.
//!
//! ## Example
//!
//! ```rust
//! use bloom::BloomFilter;
//!
//! let mut bf = BloomFilter::new(1000, 10);
//! bf.insert(b"hello");
//! assert!(bf.may_contain(b"hello"));
//! ```

use std::io::{self, Read, Write};

/// Hash functions are clamped to this upper bound.
const MAX_HASHES: u32 = 30;

/// Serialized filters larger than this are rejected on decode.
const MAX_FILTER_BYTES: usize = 128 * 1024 * 1024;

/// A bloom filter backed by a byte-addressed bit vector with `k`
/// double-hashed probe positions per key.
///
/// Probe positions are `(h1 + i * h2) mod num_bits` for `i in 0..k`,
/// where `h1` is FNV-1a and `h2` is FNV-1 forced odd.
pub struct BloomFilter {
    /// The bit vector storing the filter state.
    bits: Vec<u8>,
    /// Number of bits in the filter (always a multiple of 8).
    num_bits: u64,
    /// Number of probe positions per key (k).
    num_hashes: u32,
    /// Number of keys inserted so far.
    num_items: u64,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_items` keys at `bits_per_key`
    /// bits each.
    ///
    /// Out-of-range arguments are clamped rather than rejected:
    /// `expected_items` floors at 1, `bits_per_key` defaults to 10 when
    /// zero, the bit count floors at 64 and rounds up to a byte multiple,
    /// and the hash count is clamped to `1..=30`.
    pub fn new(expected_items: usize, bits_per_key: usize) -> Self {
        let expected_items = expected_items.max(1);
        let bits_per_key = if bits_per_key == 0 { 10 } else { bits_per_key };

        let mut num_bits = (expected_items * bits_per_key) as u64;
        if num_bits < 64 {
            num_bits = 64;
        }

        // Round up to a whole number of bytes.
        let num_bytes = (num_bits + 7) / 8;
        let num_bits = num_bytes * 8;

        // Optimal probe count for the given density: k = bits_per_key * ln 2.
        let num_hashes = (bits_per_key as f64 * std::f64::consts::LN_2).round() as u32;
        let num_hashes = num_hashes.clamp(1, MAX_HASHES);

        Self {
            bits: vec![0u8; num_bytes as usize],
            num_bits,
            num_hashes,
            num_items: 0,
        }
    }

    /// Inserts a key into the filter.
    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let idx = probe(h1, h2, i, self.num_bits);
            self.set_bit(idx);
        }
        self.num_items += 1;
    }

    /// Returns `true` if the key **might** be in the set, `false` if it is
    /// **definitely not** in the set.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let idx = probe(h1, h2, i, self.num_bits);
            if !self.get_bit(idx) {
                return false;
            }
        }
        true
    }

    /// Returns the number of bits in the filter.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Returns the number of probe positions per key.
    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Returns the number of keys inserted so far.
    #[must_use]
    pub fn num_items(&self) -> u64 {
        self.num_items
    }

    /// Returns the estimated false-positive rate for the current load.
    #[must_use]
    pub fn false_positive_rate(&self) -> f64 {
        if self.num_items == 0 {
            return 0.0;
        }
        // p = (1 - e^(-k*n/m))^k
        let k = self.num_hashes as f64;
        let n = self.num_items as f64;
        let m = self.num_bits as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }

    /// Returns the size of the serialized filter in bytes.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        8 + 4 + 8 + self.bits.len()
    }

    /// Serializes the filter.
    ///
    /// Wire format (all little-endian):
    /// ```text
    /// [num_bits: u64][num_hashes: u32][num_items: u64][bits: bytes]
    /// ```
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.num_bits.to_le_bytes())?;
        w.write_all(&self.num_hashes.to_le_bytes())?;
        w.write_all(&self.num_items.to_le_bytes())?;
        w.write_all(&self.bits)?;
        Ok(())
    }

    /// Deserializes a filter previously written by [`write_to`].
    ///
    /// Returns `InvalidData` if the declared bit count implies a filter
    /// larger than the 128 MiB safety cap.
    ///
    /// [`write_to`]: BloomFilter::write_to
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf8 = [0u8; 8];
        let mut buf4 = [0u8; 4];

        r.read_exact(&mut buf8)?;
        let num_bits = u64::from_le_bytes(buf8);

        r.read_exact(&mut buf4)?;
        let num_hashes = u32::from_le_bytes(buf4);

        r.read_exact(&mut buf8)?;
        let num_items = u64::from_le_bytes(buf8);

        let num_bytes = ((num_bits + 7) / 8) as usize;
        if num_bytes > MAX_FILTER_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bloom filter too large: {} bytes", num_bytes),
            ));
        }

        let mut bits = vec![0u8; num_bytes];
        r.read_exact(&mut bits)?;

        Ok(Self {
            bits,
            num_bits,
            num_hashes,
            num_items,
        })
    }

    // ---- Internal helpers ----

    fn set_bit(&mut self, idx: u64) {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        self.bits[byte_idx] |= 1 << bit_offset;
    }

    fn get_bit(&self, idx: u64) -> bool {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        (self.bits[byte_idx] >> bit_offset) & 1 == 1
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("num_items", &self.num_items)
            .finish()
    }
}

/// Computes the two 32-bit probe hashes for a key.
///
/// `h1` is FNV-1a, `h2` is FNV-1 forced odd so the probe stride stays
/// coprime with even bit counts.
fn hash_pair(key: &[u8]) -> (u32, u32) {
    let h1 = fnv1a_32(key);
    let mut h2 = fnv1_32(key);
    if h2 % 2 == 0 {
        h2 = h2.wrapping_add(1);
    }
    (h1, h2)
}

/// Double hashing: probe(i) = (h1 + i * h2) mod num_bits.
fn probe(h1: u32, h2: u32, i: u32, num_bits: u64) -> u64 {
    (h1 as u64).wrapping_add((i as u64).wrapping_mul(h2 as u64)) % num_bits
}

const FNV_OFFSET_32: u32 = 0x811c9dc5;
const FNV_PRIME_32: u32 = 0x01000193;

/// FNV-1a: xor then multiply.
fn fnv1a_32(data: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_32;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME_32);
    }
    hash
}

/// FNV-1: multiply then xor.
fn fnv1_32(data: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_32;
    for &byte in data {
        hash = hash.wrapping_mul(FNV_PRIME_32);
        hash ^= byte as u32;
    }
    hash
}

#[cfg(test)]
mod tests;
