// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! This crate contains an arena-backed representation of CBMC/ESBMC style ireps
//! together with the binary codecs used to store them on disk.
//!
//! The pieces, from the leaves up:
//! 1. [irep::StringInterner] deduplicates byte strings and hands out dense
//!    [irep::StringHandle]s, so comparing two ids is comparing two integers.
//! 2. [irep::IrepContainer] owns every node of one parsed unit. A node is an
//!    id plus an ordered list of tagged children: unnamed operands (`sub`),
//!    keyed attributes (`named_sub`) and keyed comments (`comment`). Every
//!    child is a [irep::NodeIndex] into the same container, which is how
//!    repeated sub-trees are shared.
//! 3. [irep::binary_serde] reads and writes the native binary format, which
//!    writes each shared node once and refers back to it afterwards.
//! 4. [irep::esbmc_binary] reads the reference-encoded irep stream found in
//!    ESBMC goto binaries.
//!
//! For example, for a binary operation [a + b], the id of the root node is
//! ["+"], its two `sub` children are the operands and its `named_sub` holds
//! the type of the expression. If `a` and `b` are the same symbol, both `sub`
//! entries hold the same [irep::NodeIndex].
//!
//! [irep::StringPool] is an unrelated bulk allocator for short strings that
//! trades deduplication for a single up-front allocation.

mod error;
pub mod irep;

pub use error::{IrepError, Result};
pub use irep::serialize;
