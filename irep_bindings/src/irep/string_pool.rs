// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A bump-style pool of fixed width, NUL-terminated strings.
//!
//! Front ends produce huge numbers of short strings. The pool takes a single
//! allocation up front and carves it into [MAX_STRING_WIDTH] byte slots, so
//! adding a string never allocates. In exchange nothing is deduplicated and
//! longer strings are truncated.
//!
//! Running out of slots or reading a slot that was never written are caller
//! bugs and panic.

use crate::Result;
use std::ffi::CStr;

/// Width of a slot, terminator included.
pub const MAX_STRING_WIDTH: usize = 128;

/// Default pool size: 4 MiB of slots.
pub const DEFAULT_POOL_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug)]
pub struct StringPool {
    strings: Vec<u8>,
    reserved: u32,
    length: u32,
}

impl StringPool {
    pub fn new() -> Result<Self> {
        Self::with_capacity(DEFAULT_POOL_BYTES)
    }

    /// Allocates room for `capacity_bytes / MAX_STRING_WIDTH` strings.
    pub fn with_capacity(capacity_bytes: usize) -> Result<Self> {
        let reserved = u32::try_from(capacity_bytes / MAX_STRING_WIDTH).unwrap_or(u32::MAX);
        let mut strings = Vec::new();
        strings.try_reserve_exact(reserved as usize * MAX_STRING_WIDTH)?;
        strings.resize(reserved as usize * MAX_STRING_WIDTH, 0);
        Ok(StringPool { strings, reserved, length: 0 })
    }

    /// Copies `s` into the next free slot and returns its index.
    /// Copying stops at the first NUL byte or after `MAX_STRING_WIDTH - 1` bytes.
    pub fn add(&mut self, s: impl AsRef<[u8]>) -> u32 {
        assert!(
            self.length < self.reserved,
            "string pool is full ({} strings reserved)",
            self.reserved
        );
        let s = s.as_ref();
        let len = s.iter().position(|&b| b == 0).unwrap_or(s.len()).min(MAX_STRING_WIDTH - 1);

        let start = self.length as usize * MAX_STRING_WIDTH;
        let slot = &mut self.strings[start..start + MAX_STRING_WIDTH];
        slot[..len].copy_from_slice(&s[..len]);
        slot[len..].fill(0);

        let index = self.length;
        self.length += 1;
        index
    }

    /// Returns the string stored at `index`, without its terminator.
    pub fn get(&self, index: u32) -> &[u8] {
        let slot = self.slot(index);
        let len = slot.iter().position(|&b| b == 0).unwrap_or(MAX_STRING_WIDTH - 1);
        &slot[..len]
    }

    pub fn get_cstr(&self, index: u32) -> &CStr {
        // every slot holds at least one NUL: `add` never fills the last byte
        CStr::from_bytes_until_nul(self.slot(index)).expect("string pool slot without terminator")
    }

    /// Releases the backing block. The pool holds no strings afterwards and cannot
    /// accept new ones.
    pub fn free(&mut self) {
        self.strings = Vec::new();
        self.reserved = 0;
        self.length = 0;
    }

    pub fn len(&self) -> u32 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    pub fn is_full(&self) -> bool {
        self.length == self.reserved
    }

    fn slot(&self, index: u32) -> &[u8] {
        assert!(index < self.length, "string pool index {index} out of bounds (len {})", self.length);
        let start = index as usize * MAX_STRING_WIDTH;
        &self.strings[start..start + MAX_STRING_WIDTH]
    }
}
