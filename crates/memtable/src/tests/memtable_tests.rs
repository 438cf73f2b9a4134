use crate::{Memtable, MemtableError};

// -------------------- Put / Get / Delete --------------------

#[test]
fn put_get_delete() {
    let mem = Memtable::new(1 << 20);
    mem.put(b"k1".to_vec(), b"v1".to_vec()).unwrap();

    let (value, deleted) = mem.get(b"k1").unwrap();
    assert_eq!(value, b"v1");
    assert!(!deleted);

    mem.delete(b"k1".to_vec()).unwrap();
    let (_, deleted) = mem.get(b"k1").unwrap();
    assert!(deleted);
}

#[test]
fn overwrite_returns_latest_value() {
    let mem = Memtable::new(1 << 20);
    mem.put(b"k".to_vec(), b"v1".to_vec()).unwrap();
    mem.put(b"k".to_vec(), b"v2".to_vec()).unwrap();

    assert_eq!(mem.get(b"k").unwrap().0, b"v2");
    assert_eq!(mem.count(), 1);
}

#[test]
fn get_missing_key() {
    let mem = Memtable::new(1 << 20);
    assert!(mem.get(b"nope").is_none());
}

// -------------------- Freeze semantics --------------------

#[test]
fn writes_fail_after_freeze() {
    let mem = Memtable::new(1 << 20);
    mem.put(b"before".to_vec(), b"v".to_vec()).unwrap();

    mem.set_immutable();
    assert!(mem.is_immutable());

    assert!(matches!(
        mem.put(b"after".to_vec(), b"v".to_vec()),
        Err(MemtableError::Immutable)
    ));
    assert!(matches!(
        mem.delete(b"before".to_vec()),
        Err(MemtableError::Immutable)
    ));
}

#[test]
fn reads_allowed_after_freeze() {
    let mem = Memtable::new(1 << 20);
    mem.put(b"k".to_vec(), b"v".to_vec()).unwrap();
    mem.set_immutable();

    assert_eq!(mem.get(b"k").unwrap().0, b"v");
}

#[test]
fn freeze_is_idempotent() {
    let mem = Memtable::new(1 << 20);
    mem.set_immutable();
    mem.set_immutable();
    assert!(mem.is_immutable());
}

#[test]
fn new_memtable_starts_active() {
    let mem = Memtable::new(1 << 20);
    assert!(!mem.is_immutable());
}

// -------------------- Size / IsFull --------------------

#[test]
fn is_full_at_threshold() {
    // each entry: 1 + 4 + 1 + 8 = 14 bytes
    let mem = Memtable::new(28);
    mem.put(b"a".to_vec(), b"xxxx".to_vec()).unwrap();
    assert!(!mem.is_full());

    mem.put(b"b".to_vec(), b"xxxx".to_vec()).unwrap();
    assert!(mem.is_full());
}

#[test]
fn size_is_monotone_under_inserts() {
    let mem = Memtable::new(1 << 20);
    let mut last = 0;
    for i in 0..50u32 {
        mem.put(format!("key_{:03}", i).into_bytes(), b"value".to_vec())
            .unwrap();
        let now = mem.size();
        assert!(now > last);
        last = now;
    }
}

// -------------------- Flush iterator --------------------

#[test]
fn iterator_over_frozen_memtable_sees_all_entries() {
    let mem = Memtable::new(1 << 20);
    mem.put(b"b".to_vec(), b"2".to_vec()).unwrap();
    mem.put(b"a".to_vec(), b"1".to_vec()).unwrap();
    mem.delete(b"c".to_vec()).unwrap();
    mem.set_immutable();

    let mut iter = mem.iter();
    iter.seek_to_first();

    let mut seen = Vec::new();
    while iter.valid() {
        seen.push((iter.key().unwrap().to_vec(), iter.is_deleted()));
        iter.next();
    }

    assert_eq!(
        seen,
        vec![
            (b"a".to_vec(), false),
            (b"b".to_vec(), false),
            (b"c".to_vec(), true),
        ]
    );
}
