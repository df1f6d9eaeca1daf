// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! String interner for irep ids and keys.
//!
//! Irep trees repeat a small vocabulary (operator names, `type`, `#location`,
//! identifiers) an enormous number of times. Each distinct byte string is
//! stored once and referred to by a [StringHandle], so ids compare as integers.
//!
//! Unlike a global interner, one [StringInterner] lives inside each
//! [super::IrepContainer] and is dropped with it. Handles are dense and assigned
//! in first-seen order, which is exactly the numbering the binary string table
//! uses.

use crate::{IrepError, Result};
use hashbrown::HashTable;
use std::fmt;

const INITIAL_CAPACITY: usize = 16;

/// Handle of an interned string. Only meaningful for the interner that issued it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringHandle(u32);

impl StringHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        StringHandle(index as u32)
    }
}

impl fmt::Debug for StringHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

pub struct StringInterner {
    /// Owned copies, indexed by handle.
    entries: Vec<Box<[u8]>>,
    /// Hash index over `entries`; stores handles, not copies.
    lookup: HashTable<StringHandle>,
}

impl StringInterner {
    /// Creates an empty interner with room for a handful of strings.
    pub fn new() -> Result<Self> {
        let mut entries = Vec::new();
        entries.try_reserve_exact(INITIAL_CAPACITY)?;
        let mut lookup = HashTable::new();
        lookup.try_reserve(INITIAL_CAPACITY, |_: &StringHandle| 0)?;
        Ok(StringInterner { entries, lookup })
    }

    /// Returns the handle of `key`, interning a copy of it first if it was never seen.
    pub fn intern(&mut self, key: impl AsRef<[u8]>) -> Result<StringHandle> {
        let key = key.as_ref();
        let hash = hash_bytes(key);
        if let Some(handle) = self.find(hash, key) {
            return Ok(handle);
        }

        if self.entries.len() >= u32::MAX as usize {
            return Err(IrepError::Allocation);
        }
        if self.entries.len() == self.entries.capacity() {
            // double, the same way the table grows
            let additional = self.entries.capacity().max(INITIAL_CAPACITY);
            self.entries.try_reserve_exact(additional)?;
        }
        let entries = &self.entries;
        self.lookup.try_reserve(1, |handle| hash_bytes(&entries[handle.index()]))?;

        let mut owned = Vec::new();
        owned.try_reserve_exact(key.len())?;
        owned.extend_from_slice(key);

        let handle = StringHandle::from_index(self.entries.len());
        self.entries.push(owned.into_boxed_slice());
        let entries = &self.entries;
        self.lookup.insert_unique(hash, handle, |handle| hash_bytes(&entries[handle.index()]));
        Ok(handle)
    }

    /// Returns the handle of `key` without interning it.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<StringHandle> {
        let key = key.as_ref();
        self.find(hash_bytes(key), key)
    }

    pub fn resolve(&self, handle: StringHandle) -> Option<&[u8]> {
        self.entries.get(handle.index()).map(|entry| &**entry)
    }

    /// Like [StringInterner::resolve], for strings that are valid UTF-8.
    pub fn resolve_str(&self, handle: StringHandle) -> Option<&str> {
        self.resolve(handle).and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Iterates over all strings in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (StringHandle, &[u8])> {
        self.entries.iter().enumerate().map(|(i, entry)| (StringHandle::from_index(i), &**entry))
    }

    fn find(&self, hash: u64, key: &[u8]) -> Option<StringHandle> {
        self.lookup.find(hash, |handle| &*self.entries[handle.index()] == key).copied()
    }
}

impl fmt::Debug for StringInterner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| String::from_utf8_lossy(entry)))
            .finish()
    }
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    fxhash::hash64(bytes)
}
