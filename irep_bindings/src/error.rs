// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::irep::ChildKind;
use std::collections::TryReserveError;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IrepError>;

/// Errors produced while building, reading or writing ireps.
#[derive(Debug, Error)]
pub enum IrepError {
    /// Backing storage could not be obtained.
    #[error("could not allocate irep storage")]
    Allocation,

    /// The byte stream is not a valid irep stream.
    #[error("malformed irep stream: {0}")]
    Malformed(String),

    /// A node was inserted into a container that is already full.
    #[error("irep container is full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    /// A node index that does not name an already allocated node.
    #[error("node index {index} does not refer to one of the {len} allocated nodes")]
    DanglingReference { index: usize, len: usize },

    /// A string handle that was not handed out by the container's interner.
    #[error("string handle {index} is not one of the {len} interned strings")]
    UnknownString { index: usize, len: usize },

    /// A key set twice among the named subs, or among the comments, of one node.
    #[error("{kind:?} key {key} appears more than once in the same node")]
    DuplicateKey { kind: ChildKind, key: usize },

    #[error(transparent)]
    Io(io::Error),
}

impl IrepError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        IrepError::Malformed(msg.into())
    }
}

impl From<TryReserveError> for IrepError {
    fn from(_: TryReserveError) -> Self {
        IrepError::Allocation
    }
}

impl From<hashbrown::TryReserveError> for IrepError {
    fn from(_: hashbrown::TryReserveError) -> Self {
        IrepError::Allocation
    }
}

/// A truncated stream is an input problem, not an I/O one.
impl From<io::Error> for IrepError {
    fn from(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            IrepError::Malformed("unexpected end of input".to_string())
        } else {
            IrepError::Io(error)
        }
    }
}
