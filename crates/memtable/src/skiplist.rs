//! Concurrent skip list keyed by bytes.
//!
//! The list keeps one [`Entry`] per distinct key, sorted by the injected
//! [`Comparator`]. A single reader/writer lock protects the whole
//! structure: `put`/`delete` take the write half, `get` and iterator
//! movement take the read half. The coarse lock is deliberate — a
//! memtable's skip list lives only until the next flush, so contention is
//! bounded by memtable lifetime, not store lifetime.
//!
//! Nodes live in an arena (`Vec`) and link forward through `u32` indices,
//! so the tower mesh needs no raw pointers and the whole list drops in
//! one deallocation sweep.

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

use crate::comparator::{BytewiseComparator, Comparator};
use crate::Entry;

/// Tallest tower a node can have.
const MAX_LEVEL: usize = 12;

/// Inverse promotion probability: a node reaches level `n+1` with
/// probability 1/4 per level.
const PROBABILITY: u32 = 4;

/// Null link in the arena.
const NIL: u32 = u32::MAX;

/// Arena index of the head sentinel.
const HEAD: u32 = 0;

/// LCG seed shared by every list; makes level draws reproducible.
const RAND_SEED: u32 = 0xDEAD_BEEF;

struct Node {
    entry: Entry,
    /// Forward links, one per level; `forward.len()` is the node's height.
    forward: Vec<u32>,
}

struct Inner {
    nodes: Vec<Node>,
    /// Highest level currently in use (≥ 1).
    level: usize,
    /// Running byte total of all entries.
    size: u64,
    /// Number of distinct keys.
    count: usize,
    rand_seed: u32,
}

impl Inner {
    fn new() -> Self {
        let head = Node {
            entry: Entry::new(Vec::new(), Vec::new()),
            forward: vec![NIL; MAX_LEVEL],
        };
        Self {
            nodes: vec![head],
            level: 1,
            size: 0,
            count: 0,
            rand_seed: RAND_SEED,
        }
    }

    /// Draws a tower height from the geometric distribution using a
    /// 32-bit LCG (step `s' = s * 1664525 + 1013904223`).
    fn random_level(&mut self) -> usize {
        let mut level = 1;
        self.rand_seed = self
            .rand_seed
            .wrapping_mul(1_664_525)
            .wrapping_add(1_013_904_223);
        let mut r = self.rand_seed;
        while level < MAX_LEVEL && r % PROBABILITY == 0 {
            level += 1;
            r /= PROBABILITY;
        }
        level
    }

    fn node(&self, idx: u32) -> &Node {
        &self.nodes[idx as usize]
    }
}

/// A concurrent sorted in-memory map from keys to [`Entry`] values.
pub struct SkipList {
    inner: RwLock<Inner>,
    comparator: Arc<dyn Comparator + Send + Sync>,
}

impl SkipList {
    /// Creates a list ordered by the bytewise comparator.
    pub fn new() -> Self {
        Self::with_comparator(Arc::new(BytewiseComparator))
    }

    /// Creates a list ordered by `comparator`.
    pub fn with_comparator(comparator: Arc<dyn Comparator + Send + Sync>) -> Self {
        Self {
            inner: RwLock::new(Inner::new()),
            comparator,
        }
    }

    /// Inserts or updates a live entry.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        self.put_entry(Entry::new(key, value));
    }

    /// Inserts a tombstone for `key`.
    pub fn delete(&self, key: Vec<u8>) {
        self.put_entry(Entry::tombstone(key));
    }

    /// Inserts `entry`, updating in place when the key already exists.
    ///
    /// An in-place update adjusts the running byte size by the delta of
    /// the old and new entry sizes; a fresh key links a new node at a
    /// height drawn from [`Inner::random_level`].
    pub fn put_entry(&self, entry: Entry) {
        let mut inner = self.inner.write();

        // Find the splice point, remembering the predecessor per level.
        let mut update = [HEAD; MAX_LEVEL];
        let mut current = HEAD;
        for i in (0..inner.level).rev() {
            loop {
                let next = inner.node(current).forward[i];
                if next != NIL
                    && self
                        .comparator
                        .compare(&inner.node(next).entry.key, &entry.key)
                        == Ordering::Less
                {
                    current = next;
                } else {
                    break;
                }
            }
            update[i] = current;
        }

        let next = inner.node(current).forward[0];
        if next != NIL
            && self
                .comparator
                .compare(&inner.node(next).entry.key, &entry.key)
                == Ordering::Equal
        {
            // Key exists: overwrite value, tombstone flag and timestamp.
            let node = &mut inner.nodes[next as usize];
            let old_size = node.entry.size();
            node.entry.value = entry.value;
            node.entry.deleted = entry.deleted;
            node.entry.timestamp = entry.timestamp;
            let new_size = node.entry.size();
            inner.size = inner.size - old_size + new_size;
            return;
        }

        let new_level = inner.random_level();
        if new_level > inner.level {
            // Predecessors above the old level are the head tower, which
            // `update` already holds from its initialisation.
            inner.level = new_level;
        }

        let idx = inner.nodes.len() as u32;
        let mut forward = vec![NIL; new_level];
        for (i, link) in forward.iter_mut().enumerate() {
            *link = inner.node(update[i]).forward[i];
        }

        inner.size += entry.size();
        inner.count += 1;
        inner.nodes.push(Node { entry, forward });
        for i in 0..new_level {
            inner.nodes[update[i] as usize].forward[i] = idx;
        }
    }

    /// Looks up `key`, returning `(value, is_tombstone)` when present.
    pub fn get(&self, key: &[u8]) -> Option<(Vec<u8>, bool)> {
        let inner = self.inner.read();

        let mut current = HEAD;
        for i in (0..inner.level).rev() {
            loop {
                let next = inner.node(current).forward[i];
                if next != NIL
                    && self.comparator.compare(&inner.node(next).entry.key, key)
                        == Ordering::Less
                {
                    current = next;
                } else {
                    break;
                }
            }
        }

        let next = inner.node(current).forward[0];
        if next != NIL
            && self.comparator.compare(&inner.node(next).entry.key, key) == Ordering::Equal
        {
            let entry = &inner.node(next).entry;
            return Some((entry.value.clone(), entry.deleted));
        }
        None
    }

    /// Returns the running byte total of all entries.
    pub fn size(&self) -> u64 {
        self.inner.read().size
    }

    /// Returns the number of distinct keys (tombstones included).
    pub fn count(&self) -> usize {
        self.inner.read().count
    }

    /// Creates an iterator positioned before the first entry.
    ///
    /// The iterator holds the list's read lock for its whole lifetime;
    /// writers block until it is dropped. Keep iterator scopes short.
    pub fn iter(&self) -> SkipIter<'_> {
        SkipIter {
            guard: self.inner.read(),
            comparator: self.comparator.as_ref(),
            current: NIL,
        }
    }
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward iterator over a [`SkipList`].
///
/// Holds a read guard on the list; dropping the iterator releases it.
pub struct SkipIter<'a> {
    guard: RwLockReadGuard<'a, Inner>,
    comparator: &'a (dyn Comparator + Send + Sync),
    /// Arena index of the current node; `NIL` when not positioned.
    current: u32,
}

impl SkipIter<'_> {
    /// Positions at the first entry.
    pub fn seek_to_first(&mut self) {
        self.current = self.guard.node(HEAD).forward[0];
    }

    /// Positions at the first entry with key ≥ `target`.
    pub fn seek(&mut self, target: &[u8]) {
        let mut current = HEAD;
        for i in (0..self.guard.level).rev() {
            loop {
                let next = self.guard.node(current).forward[i];
                if next != NIL
                    && self
                        .comparator
                        .compare(&self.guard.node(next).entry.key, target)
                        == Ordering::Less
                {
                    current = next;
                } else {
                    break;
                }
            }
        }
        self.current = self.guard.node(current).forward[0];
    }

    /// Advances to the next entry; a no-op when already exhausted.
    pub fn next(&mut self) {
        if self.current != NIL {
            self.current = self.guard.node(self.current).forward[0];
        }
    }

    /// Returns `true` while positioned at an entry.
    pub fn valid(&self) -> bool {
        self.current != NIL
    }

    /// Returns the current entry, or `None` when exhausted.
    pub fn entry(&self) -> Option<&Entry> {
        if self.current == NIL {
            return None;
        }
        Some(&self.guard.node(self.current).entry)
    }

    /// Returns the current key, or `None` when exhausted.
    pub fn key(&self) -> Option<&[u8]> {
        self.entry().map(|e| e.key.as_slice())
    }

    /// Returns the current value, or `None` when exhausted.
    pub fn value(&self) -> Option<&[u8]> {
        self.entry().map(|e| e.value.as_slice())
    }

    /// Returns `true` if the current entry is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.entry().map(|e| e.deleted).unwrap_or(false)
    }
}
