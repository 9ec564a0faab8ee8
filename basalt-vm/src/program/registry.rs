//! Name registries: fully-qualified name to arena pointer.
//!
//! A chaining hash table of groups of 16 entries. Each group keeps a
//! parallel byte array of hash fingerprints (high bit set marks an occupied
//! entry, low 7 bits come from the name hash) beside its entry array, so a
//! lookup compares 16 fingerprint bytes per chunk before it ever touches a
//! name. Group selection uses the high hash bits modulo the group count;
//! groups double and every entry rehashes when the 0.8 load factor is
//! exceeded.
//!
//! Registries are single-writer: inserts happen during program compilation
//! behind `&mut`, after which the program is read-only and lookups may run
//! from any thread.

use core::ptr::NonNull;

use crate::hash::{bytes_hash, GroupBitmask, PairBitmask};
use crate::program::arena::Arena;

/// Entries per fingerprint chunk.
const GROUP_WIDTH: usize = 16;

/// Load factor numerator/denominator (0.8).
const LOAD_NUM: usize = 4;
const LOAD_DEN: usize = 5;

struct Entry<T> {
    hash: u64,
    /// Key bytes, arena-owned.
    name: *const str,
    object: NonNull<T>,
}

impl<T> Entry<T> {
    fn name(&self) -> &str {
        unsafe { &*self.name }
    }
}

// Entries point into the arena and at arena-owned objects; both outlive the
// registry.
unsafe impl<T> Send for Entry<T> {}
unsafe impl<T> Sync for Entry<T> {}

struct Group<T> {
    /// One byte per capacity slot; zero means empty. Length is a multiple
    /// of [`GROUP_WIDTH`].
    fingerprints: Vec<u8>,
    entries: Vec<Option<Entry<T>>>,
    len: usize,
}

impl<T> Group<T> {
    fn new() -> Self {
        Self {
            fingerprints: vec![0; GROUP_WIDTH],
            entries: (0..GROUP_WIDTH).map(|_| None).collect(),
            len: 0,
        }
    }

    fn find(&self, name: &str, pair: PairBitmask) -> Option<usize> {
        for (chunk_index, chunk) in self.fingerprints.chunks_exact(GROUP_WIDTH).enumerate() {
            for (lane, &fingerprint) in chunk.iter().enumerate() {
                if fingerprint != pair.0 {
                    continue;
                }
                let index = chunk_index * GROUP_WIDTH + lane;
                if let Some(entry) = &self.entries[index] {
                    if entry.name() == name {
                        return Some(index);
                    }
                }
            }
        }
        None
    }

    fn grow_for(&mut self, min_capacity: usize) {
        if min_capacity <= self.entries.len() {
            return;
        }
        let new_capacity = min_capacity.div_ceil(GROUP_WIDTH) * GROUP_WIDTH;
        self.fingerprints.resize(new_capacity, 0);
        self.entries.resize_with(new_capacity, || None);
    }

    /// The entry must not already be present.
    fn insert(&mut self, entry: Entry<T>, pair: PairBitmask) {
        self.grow_for(self.len + 1);
        let slot = self
            .fingerprints
            .iter()
            .position(|&fp| fp == 0)
            .expect("group capacity was just ensured");
        self.fingerprints[slot] = pair.0;
        self.entries[slot] = Some(entry);
        self.len += 1;
    }

    fn drain_entries(&mut self) -> impl Iterator<Item = Entry<T>> + '_ {
        self.len = 0;
        self.fingerprints.iter_mut().for_each(|fp| *fp = 0);
        self.entries.iter_mut().filter_map(|slot| slot.take())
    }
}

/// A name-keyed pointer registry.
pub(crate) struct Registry<T> {
    groups: Vec<Group<T>>,
    count: usize,
    /// Insertions left before the group count doubles.
    available: usize,
}

impl<T> Registry<T> {
    pub(crate) fn new() -> Self {
        Self {
            groups: Vec::new(),
            count: 0,
            available: 0,
        }
    }

    /// Number of registered names.
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    fn group_index(&self, hash: u64) -> usize {
        (GroupBitmask::new(hash).0 % self.groups.len() as u64) as usize
    }

    /// Look a name up; returns the pointer that was inserted.
    pub(crate) fn find(&self, name: &str) -> Option<NonNull<T>> {
        if self.count == 0 {
            return None;
        }
        let hash = bytes_hash(name.as_bytes());
        let group = &self.groups[self.group_index(hash)];
        let index = group.find(name, PairBitmask::new(hash))?;
        group.entries[index].as_ref().map(|entry| entry.object)
    }

    fn rehash_into(&mut self, new_group_count: usize) {
        let mut new_groups: Vec<Group<T>> = (0..new_group_count).map(|_| Group::new()).collect();
        for group in &mut self.groups {
            for entry in group.drain_entries() {
                let pair = PairBitmask::new(entry.hash);
                let index = (GroupBitmask::new(entry.hash).0 % new_group_count as u64) as usize;
                new_groups[index].insert(entry, pair);
            }
        }
        self.groups = new_groups;
        self.available = (GROUP_WIDTH * new_group_count) * LOAD_NUM / LOAD_DEN - self.count;
    }

    /// Register `object` under `name`, copying the key into the arena.
    /// Panics on a duplicate name: registration happens once, during
    /// compilation.
    pub(crate) fn insert(&mut self, arena: &Arena, name: &str, object: NonNull<T>) {
        if self.groups.is_empty() {
            self.rehash_into(1);
        } else if self.available == 0 {
            self.rehash_into(self.groups.len() * 2);
        }

        let hash = bytes_hash(name.as_bytes());
        let pair = PairBitmask::new(hash);
        let index = self.group_index(hash);
        let group = &mut self.groups[index];
        assert!(
            group.find(name, pair).is_none(),
            "duplicate registration of {name:?}"
        );

        let key: *const str = arena.alloc_str(name);
        group.insert(
            Entry {
                hash,
                name: key,
                object,
            },
            pair,
        );
        self.count += 1;
        self.available -= 1;
    }
}

impl<T> core::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("count", &self.count)
            .field("groups", &self.groups.len())
            .finish()
    }
}
