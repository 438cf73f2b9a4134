use super::*;
use std::io::Cursor;

// -------------------- Construction --------------------

#[test]
fn new_creates_valid_filter() {
    let bf = BloomFilter::new(100, 10);
    assert!(bf.num_bits() >= 100 * 10);
    assert_eq!(bf.num_bits() % 8, 0);
    assert!(bf.num_hashes() >= 1);
    assert_eq!(bf.num_items(), 0);
}

#[test]
fn zero_items_floors_at_one() {
    let bf = BloomFilter::new(0, 10);
    assert!(bf.num_bits() >= 64);
}

#[test]
fn zero_bits_per_key_falls_back_to_default() {
    let bf = BloomFilter::new(100, 0);
    // default of 10 bits/key
    assert!(bf.num_bits() >= 1000);
}

#[test]
fn tiny_filter_floors_at_64_bits() {
    let bf = BloomFilter::new(1, 1);
    assert_eq!(bf.num_bits(), 64);
}

#[test]
fn hash_count_tracks_bits_per_key() {
    // k = round(bits_per_key * ln 2); 10 bits/key -> 7 hashes
    let bf = BloomFilter::new(100, 10);
    assert_eq!(bf.num_hashes(), 7);

    // clamp at 30 for absurd densities
    let bf = BloomFilter::new(100, 100);
    assert_eq!(bf.num_hashes(), 30);

    // clamp at 1 for very sparse filters
    let bf = BloomFilter::new(100, 1);
    assert_eq!(bf.num_hashes(), 1);
}

// -------------------- Insert / Contains --------------------

#[test]
fn inserted_key_is_found() {
    let mut bf = BloomFilter::new(100, 10);
    bf.insert(b"hello");
    assert!(bf.may_contain(b"hello"));
    assert_eq!(bf.num_items(), 1);
}

#[test]
fn missing_key_is_not_found_in_empty_filter() {
    let bf = BloomFilter::new(100, 10);
    assert!(!bf.may_contain(b"hello"));
}

#[test]
fn no_false_negatives_over_ten_thousand_keys() {
    let n = 10_000usize;
    let mut bf = BloomFilter::new(n, 10);
    for i in 0..n as u64 {
        bf.insert(format!("key_{:05}", i).as_bytes());
    }
    for i in 0..n as u64 {
        assert!(
            bf.may_contain(format!("key_{:05}", i).as_bytes()),
            "key {} should be found",
            i
        );
    }
}

#[test]
fn false_positive_rate_at_ten_bits_per_key() {
    let n = 10_000usize;
    let mut bf = BloomFilter::new(n, 10);
    for i in 0..n as u64 {
        bf.insert(format!("member_{:05}", i).as_bytes());
    }

    // Probe keys that were never inserted.
    let mut false_positives = 0usize;
    let probes = 10_000usize;
    for i in 0..probes as u64 {
        if bf.may_contain(format!("absent_{:05}", i).as_bytes()) {
            false_positives += 1;
        }
    }

    let rate = false_positives as f64 / probes as f64;
    // ~1% theoretical at 10 bits/key; 3% leaves room for variance
    assert!(rate <= 0.03, "FP rate too high: {:.4}", rate);
}

#[test]
fn empty_key() {
    let mut bf = BloomFilter::new(10, 10);
    bf.insert(b"");
    assert!(bf.may_contain(b""));
}

#[test]
fn binary_key() {
    let mut bf = BloomFilter::new(10, 10);
    let key = vec![0u8, 1, 2, 255, 254, 253];
    bf.insert(&key);
    assert!(bf.may_contain(&key));
}

#[test]
fn estimated_fpr_is_zero_when_empty() {
    let bf = BloomFilter::new(100, 10);
    assert_eq!(bf.false_positive_rate(), 0.0);
}

#[test]
fn estimated_fpr_grows_with_load() {
    let mut bf = BloomFilter::new(100, 10);
    for i in 0..100u64 {
        bf.insert(&i.to_le_bytes());
    }
    let at_capacity = bf.false_positive_rate();
    assert!(at_capacity > 0.0 && at_capacity < 0.1);

    for i in 100..1000u64 {
        bf.insert(&i.to_le_bytes());
    }
    assert!(bf.false_positive_rate() > at_capacity);
}

// -------------------- Serialization --------------------

#[test]
fn roundtrip_encode_decode() {
    let mut bf = BloomFilter::new(500, 10);
    for i in 0..500u64 {
        bf.insert(&i.to_le_bytes());
    }

    let mut buf = Vec::new();
    bf.write_to(&mut buf).unwrap();
    assert_eq!(buf.len(), bf.encoded_size());

    let mut cursor = Cursor::new(&buf);
    let bf2 = BloomFilter::read_from(&mut cursor).unwrap();

    assert_eq!(bf2.num_bits(), bf.num_bits());
    assert_eq!(bf2.num_hashes(), bf.num_hashes());
    assert_eq!(bf2.num_items(), bf.num_items());

    for i in 0..500u64 {
        assert!(
            bf2.may_contain(&i.to_le_bytes()),
            "key {} missing after roundtrip",
            i
        );
    }
}

#[test]
fn encoded_size_matches_layout() {
    let bf = BloomFilter::new(100, 10);
    // 8 (num_bits) + 4 (num_hashes) + 8 (num_items) + bits
    assert_eq!(bf.encoded_size(), 20 + (bf.num_bits() / 8) as usize);
}

#[test]
fn decode_rejects_oversized_filter() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(2_000_000_000u64 * 8).to_le_bytes()); // num_bits ~ 2 GB
    buf.extend_from_slice(&7u32.to_le_bytes());
    buf.extend_from_slice(&0u64.to_le_bytes());

    let mut cursor = Cursor::new(&buf);
    let result = BloomFilter::read_from(&mut cursor);
    assert!(result.is_err());
}

#[test]
fn decode_rejects_truncated_input() {
    let bf = BloomFilter::new(100, 10);
    let mut buf = Vec::new();
    bf.write_to(&mut buf).unwrap();
    buf.truncate(buf.len() - 5);

    let mut cursor = Cursor::new(&buf);
    assert!(BloomFilter::read_from(&mut cursor).is_err());
}

// -------------------- Debug --------------------

#[test]
fn debug_impl_reports_parameters() {
    let bf = BloomFilter::new(100, 10);
    let debug = format!("{:?}", bf);
    assert!(debug.contains("BloomFilter"));
    assert!(debug.contains("num_bits"));
    assert!(debug.contains("num_hashes"));
}
