use super::helpers::{count_sst_files, padded_value};
use crate::{Db, Options};
use anyhow::Result;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

// -------------------- Basic writes --------------------

#[test]
fn put_then_get() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open(Options::new(dir.path()))?;

    db.put(b"hello", b"world")?;
    assert_eq!(db.get(b"hello")?, Some(b"world".to_vec()));
    assert_eq!(db.get(b"nope")?, None);
    Ok(())
}

#[test]
fn overwrite_returns_latest_value() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open(Options::new(dir.path()))?;

    db.put(b"k", b"v1")?;
    db.put(b"k", b"v2")?;
    assert_eq!(db.get(b"k")?, Some(b"v2".to_vec()));
    Ok(())
}

#[test]
fn delete_then_get_is_absent() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open(Options::new(dir.path()))?;

    db.put(b"k", b"v")?;
    db.delete(b"k")?;
    assert_eq!(db.get(b"k")?, None);
    Ok(())
}

#[test]
fn delete_of_missing_key_succeeds() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open(Options::new(dir.path()))?;

    db.delete(b"never_existed")?;
    assert_eq!(db.get(b"never_existed")?, None);
    Ok(())
}

#[test]
fn empty_key_and_empty_value_are_accepted() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open(Options::new(dir.path()))?;

    db.put(b"", b"empty key")?;
    db.put(b"empty value", b"")?;
    assert_eq!(db.get(b"")?, Some(b"empty key".to_vec()));
    assert_eq!(db.get(b"empty value")?, Some(Vec::new()));
    Ok(())
}

// -------------------- Flush behaviour --------------------

#[test]
fn small_threshold_flushes_to_tables() -> Result<()> {
    let dir = tempdir()?;
    let mut opts = Options::new(dir.path());
    opts.memtable_size = 1024;
    let db = Db::open(opts)?;

    for i in 0..100usize {
        db.put(format!("key_{:05}", i).as_bytes(), &padded_value(i))?;
    }

    let stats = db.stats();
    assert!(stats.table_count >= 1, "expected at least one flush");
    assert_eq!(count_sst_files(dir.path()), stats.table_count);

    for i in 0..100usize {
        assert_eq!(
            db.get(format!("key_{:05}", i).as_bytes())?,
            Some(padded_value(i)),
            "key_{:05} must survive the flushes",
            i
        );
    }
    Ok(())
}

#[test]
fn newer_write_shadows_flushed_value() -> Result<()> {
    let dir = tempdir()?;
    let mut opts = Options::new(dir.path());
    opts.memtable_size = 256;
    let db = Db::open(opts)?;

    db.put(b"overwrite_key", b"old_value")?;

    // Push the old value out to a table.
    for i in 0..20usize {
        db.put(format!("filler_{:02}", i).as_bytes(), &padded_value(i))?;
    }
    assert!(count_sst_files(dir.path()) >= 1);

    db.put(b"overwrite_key", b"new_value")?;
    assert_eq!(db.get(b"overwrite_key")?, Some(b"new_value".to_vec()));
    Ok(())
}

#[test]
fn tombstone_shadows_flushed_value() -> Result<()> {
    let dir = tempdir()?;
    let mut opts = Options::new(dir.path());
    opts.memtable_size = 256;
    let db = Db::open(opts)?;

    db.put(b"delete_key", b"doomed")?;
    for i in 0..20usize {
        db.put(format!("filler_{:02}", i).as_bytes(), &padded_value(i))?;
    }
    assert!(count_sst_files(dir.path()) >= 1);

    db.delete(b"delete_key")?;
    assert_eq!(db.get(b"delete_key")?, None);
    Ok(())
}

#[test]
fn filter_setting_reaches_flushed_tables() -> Result<()> {
    let filtered_dir = tempdir()?;
    let unfiltered_dir = tempdir()?;

    let write_all = |dir: &std::path::Path, bits: usize| -> Result<Db> {
        let mut opts = Options::new(dir);
        opts.memtable_size = 1024;
        opts.filter_bits_per_key = bits;
        let db = Db::open(opts)?;
        for i in 0..50usize {
            db.put(format!("key_{:03}", i).as_bytes(), &padded_value(i))?;
        }
        Ok(db)
    };

    let filtered = write_all(filtered_dir.path(), 10)?;
    let unfiltered = write_all(unfiltered_dir.path(), 0)?;

    // Identical data and threshold, so the flush boundaries match and the
    // only on-disk difference is the filter sections.
    assert!(filtered.stats().table_count >= 1);
    assert_eq!(filtered.stats().table_count, unfiltered.stats().table_count);
    assert!(
        filtered.stats().total_disk_bytes > unfiltered.stats().total_disk_bytes,
        "filtered tables must carry filter bytes"
    );

    // Both configurations answer hits and misses correctly.
    for db in [&filtered, &unfiltered] {
        for i in 0..50usize {
            assert_eq!(
                db.get(format!("key_{:03}", i).as_bytes())?,
                Some(padded_value(i))
            );
        }
        assert_eq!(db.get(b"absent")?, None);
    }
    Ok(())
}

#[test]
fn table_ids_are_monotonic_and_zero_padded() -> Result<()> {
    let dir = tempdir()?;
    let mut opts = Options::new(dir.path());
    opts.memtable_size = 64;
    let db = Db::open(opts)?;

    for i in 0..30usize {
        db.put(format!("key_{:03}", i).as_bytes(), &padded_value(i))?;
    }

    let mut names: Vec<String> = std::fs::read_dir(dir.path())?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("sst_"))
        .collect();
    names.sort();

    assert!(!names.is_empty());
    assert_eq!(names[0], "sst_000001.sst");
    for name in &names {
        assert_eq!(name.len(), "sst_000001.sst".len(), "bad name {}", name);
    }
    Ok(())
}

// -------------------- Concurrent writers --------------------

#[test]
fn concurrent_writers_all_land() -> Result<()> {
    let dir = tempdir()?;
    let mut opts = Options::new(dir.path());
    // small enough that flushes happen while writers contend
    opts.memtable_size = 4096;
    let db = Arc::new(Db::open(opts)?);

    let mut handles = Vec::new();
    for t in 0..5usize {
        let db = Arc::clone(&db);
        handles.push(thread::spawn(move || {
            for i in 0..50usize {
                db.put(
                    format!("t{}_key_{:02}", t, i).as_bytes(),
                    format!("t{}_value_{:02}", t, i).as_bytes(),
                )
                .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Every write from every thread must be present.
    for t in 0..5usize {
        for i in 0..50usize {
            assert_eq!(
                db.get(format!("t{}_key_{:02}", t, i).as_bytes())?,
                Some(format!("t{}_value_{:02}", t, i).into_bytes()),
                "t{}_key_{:02} lost under concurrent writes",
                t,
                i
            );
        }
    }
    Ok(())
}

#[test]
fn concurrent_puts_and_deletes_settle_correctly() -> Result<()> {
    let dir = tempdir()?;
    let mut opts = Options::new(dir.path());
    opts.memtable_size = 4096;
    let db = Arc::new(Db::open(opts)?);

    let mut handles = Vec::new();
    for t in 0..4usize {
        let db = Arc::clone(&db);
        handles.push(thread::spawn(move || {
            // each thread owns its key range: put everything, then
            // delete the odd keys
            for i in 0..40usize {
                db.put(
                    format!("t{}_key_{:02}", t, i).as_bytes(),
                    &padded_value(i),
                )
                .unwrap();
            }
            for i in (1..40usize).step_by(2) {
                db.delete(format!("t{}_key_{:02}", t, i).as_bytes()).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for t in 0..4usize {
        for i in 0..40usize {
            let got = db.get(format!("t{}_key_{:02}", t, i).as_bytes())?;
            if i % 2 == 0 {
                assert_eq!(got, Some(padded_value(i)), "t{}_key_{:02} missing", t, i);
            } else {
                assert_eq!(got, None, "t{}_key_{:02} must stay deleted", t, i);
            }
        }
    }
    Ok(())
}

// -------------------- Stats --------------------

#[test]
fn stats_track_memtable_and_disk() -> Result<()> {
    let dir = tempdir()?;
    let mut opts = Options::new(dir.path());
    opts.memtable_size = 512;
    let db = Db::open(opts)?;

    let empty = db.stats();
    assert_eq!(empty.memtable_bytes, 0);
    assert_eq!(empty.table_count, 0);
    assert_eq!(empty.total_disk_bytes, 0);

    db.put(b"a", b"1")?;
    let one = db.stats();
    assert!(one.memtable_bytes > 0);

    for i in 0..40usize {
        db.put(format!("key_{:03}", i).as_bytes(), &padded_value(i))?;
    }
    let flushed = db.stats();
    assert!(flushed.table_count >= 1);
    assert!(flushed.total_disk_bytes > 0);
    assert_eq!(flushed.immutable_bytes, 0, "no flush may be left pending");
    Ok(())
}

// -------------------- Close --------------------

#[test]
fn close_is_idempotent() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open(Options::new(dir.path()))?;
    db.put(b"k", b"v")?;

    db.close()?;
    db.close()?;
    Ok(())
}

#[test]
fn operations_fail_after_close() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::open(Options::new(dir.path()))?;
    db.put(b"k", b"v")?;
    db.close()?;

    assert!(db.put(b"k2", b"v2").is_err());
    assert!(db.delete(b"k").is_err());
    assert!(db.get(b"k").is_err());
    Ok(())
}
