// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Ireps, the strings they are made of, and their on-disk formats.

pub mod binary_serde;
mod container;
pub mod esbmc_binary;
mod interner;
#[allow(clippy::module_inception)]
mod irep;
pub mod serialize;
mod string_pool;

pub use container::{IrepContainer, IrepRef};
pub use interner::{StringHandle, StringInterner};
pub use irep::{Child, ChildKind, Irep, NodeIndex};
pub use string_pool::{DEFAULT_POOL_BYTES, MAX_STRING_WIDTH, StringPool};
