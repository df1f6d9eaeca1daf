// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Reader for the reference-encoded irep stream of ESBMC goto binaries.
//!
//! The file starts with `GBF` and a big-endian version word. Ireps and strings
//! are written by reference: a big-endian word numbering the object, followed by
//! its contents only the first time that number appears.
//! ```text
//! string_ref   number [bytes... 0]            `\` escapes the next byte
//! irep_ref     number [string_ref
//!                      ('S' irep_ref)*
//!                      ('N' string_ref irep_ref)*
//!                      ('C' string_ref irep_ref)*
//!                      0]
//! ```
//! Children are complete before their parent, so they always land at a lower
//! index in the [IrepContainer].
use super::binary_serde::DecodedIreps;
use crate::irep::{Irep, IrepContainer, NodeIndex, StringHandle};
use crate::{IrepError, Result};
use fxhash::FxBuildHasher;
use hashbrown::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

pub const ESBMC_HEADER: [u8; 3] = *b"GBF";
pub const ESBMC_VERSION: u32 = 1;

/// Smallest first occurrence of an irep: number, string number, terminator.
const MIN_IREP_SIZE: usize = 9;

/// Reads a whole ESBMC irep stream from `filename`. See [EsbmcBinaryReader::read_all].
pub fn read_esbmc_file(filename: &Path) -> Result<DecodedIreps> {
    let bytes = std::fs::read(filename)?;
    EsbmcBinaryReader::new(&bytes)?.read_all()
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
enum Section {
    Sub,
    Named,
    Comment,
}

/// An irep whose children are still being read.
struct Frame {
    number: u32,
    irep: Irep,
    section: Section,
    /// Where the child currently being read goes.
    pending: Option<(Section, Option<StringHandle>)>,
}

impl Frame {
    fn attach(&mut self, node: NodeIndex) {
        let id = self.irep.id;
        let irep = std::mem::replace(&mut self.irep, Irep::just_id(id));
        self.irep = match self.pending.take() {
            Some((Section::Named, Some(key))) => irep.with_named_sub(key, node),
            Some((Section::Comment, Some(key))) => irep.with_comment(key, node),
            _ => irep.with_sub(node),
        };
    }
}

pub struct EsbmcBinaryReader<'a> {
    bytes: &'a [u8],
    pointer: usize,
    container: IrepContainer,

    /// Maps irep numbers used in the stream to container nodes.
    irep_map: HashMap<u32, NodeIndex, FxBuildHasher>,

    /// Maps string numbers used in the stream to interned strings.
    string_map: HashMap<u32, StringHandle, FxBuildHasher>,

    /// Numbers of the ireps whose children are still being read.
    open: HashSet<u32, FxBuildHasher>,
}

impl<'a> EsbmcBinaryReader<'a> {
    /// The container is bounded by the input: it cannot describe more ireps than
    /// it has room for first occurrences. Nodes are allocated as they are read.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        Ok(EsbmcBinaryReader {
            bytes,
            pointer: 0,
            container: IrepContainer::with_max_len(bytes.len() / MIN_IREP_SIZE)?,
            irep_map: HashMap::default(),
            string_map: HashMap::default(),
            open: HashSet::default(),
        })
    }

    pub fn container(&self) -> &IrepContainer {
        &self.container
    }

    pub fn into_container(self) -> IrepContainer {
        self.container
    }

    pub fn is_at_end(&self) -> bool {
        self.pointer >= self.bytes.len()
    }

    fn peek(&self) -> Result<u8> {
        self.bytes.get(self.pointer).copied().ok_or_else(unexpected_end)
    }

    fn read_u8(&mut self) -> Result<u8> {
        let value = self.peek()?;
        self.pointer += 1;
        Ok(value)
    }

    /// Reads a big-endian word.
    pub fn read_word(&mut self) -> Result<u32> {
        let end = self.pointer + 4;
        let raw = self.bytes.get(self.pointer..end).ok_or_else(unexpected_end)?;
        self.pointer = end;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub fn check_header(&mut self) -> Result<()> {
        let header = self.bytes.get(..ESBMC_HEADER.len()).ok_or_else(unexpected_end)?;
        if header != ESBMC_HEADER {
            return Err(IrepError::malformed(format!(
                "invalid ESBMC header, found {:?}",
                String::from_utf8_lossy(header)
            )));
        }
        self.pointer = ESBMC_HEADER.len();
        Ok(())
    }

    pub fn check_version(&mut self) -> Result<()> {
        let version = self.read_word()?;
        if version != ESBMC_VERSION {
            return Err(IrepError::malformed(format!("invalid ESBMC version, found {version}")));
        }
        Ok(())
    }

    /// Reads a NUL-terminated, backslash-escaped string.
    fn read_string(&mut self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        loop {
            match self.read_u8()? {
                0 => return Ok(bytes),
                b'\\' => bytes.push(self.read_u8()?),
                c => bytes.push(c),
            }
        }
    }

    pub fn read_string_ref(&mut self) -> Result<StringHandle> {
        let number = self.read_word()?;
        if let Some(handle) = self.string_map.get(&number) {
            return Ok(*handle);
        }
        let value = self.read_string()?;
        let handle = self.container.intern(&value)?;
        self.string_map.insert(number, handle);
        Ok(handle)
    }

    /// Reads an irep reference. Returns the node right away for a number seen
    /// before, otherwise opens a new frame on `stack`.
    fn begin_irep(&mut self, stack: &mut Vec<Frame>) -> Result<Option<NodeIndex>> {
        let number = self.read_word()?;
        if let Some(node) = self.irep_map.get(&number) {
            return Ok(Some(*node));
        }
        if !self.open.insert(number) {
            return Err(IrepError::malformed(format!("irep {number} contains itself")));
        }
        let id = self.read_string_ref()?;
        stack.push(Frame { number, irep: Irep::just_id(id), section: Section::Sub, pending: None });
        Ok(None)
    }

    /// Reads one irep reference, and everything it contains on first occurrence.
    pub fn read_irep(&mut self) -> Result<NodeIndex> {
        let mut stack: Vec<Frame> = Vec::new();
        self.open.clear();
        let mut finished = self.begin_irep(&mut stack)?;
        loop {
            if let Some(node) = finished.take() {
                match stack.last_mut() {
                    Some(parent) => parent.attach(node),
                    None => return Ok(node),
                }
            }

            let tag = self.read_u8()?;
            let section = match tag {
                b'S' => Section::Sub,
                b'N' => Section::Named,
                b'C' => Section::Comment,
                0 => {
                    let Some(frame) = stack.pop() else { return Err(unexpected_end()) };
                    self.open.remove(&frame.number);
                    let node = self.container.insert(frame.irep).map_err(|error| match error {
                        IrepError::CapacityExceeded { .. } => {
                            IrepError::malformed("more ireps than the input can hold")
                        }
                        other => other,
                    })?;
                    self.irep_map.insert(frame.number, node);
                    finished = Some(node);
                    continue;
                }
                other => {
                    return Err(IrepError::malformed(format!(
                        "unexpected character in input stream {:?} at offset {}",
                        other as char,
                        self.pointer - 1
                    )));
                }
            };

            let key = match section {
                Section::Sub => None,
                Section::Named | Section::Comment => Some(self.read_string_ref()?),
            };
            let Some(frame) = stack.last_mut() else { return Err(unexpected_end()) };
            if section < frame.section {
                return Err(IrepError::malformed(format!(
                    "{section:?} child after {:?} children in irep {}",
                    frame.section, frame.number
                )));
            }
            frame.section = section;
            frame.pending = Some((section, key));
            finished = self.begin_irep(&mut stack)?;
        }
    }

    /// Reads the header, the version, then ireps until the end of the input.
    /// Every top-level irep becomes a root.
    pub fn read_all(mut self) -> Result<DecodedIreps> {
        self.check_header()?;
        self.check_version()?;
        let mut roots = Vec::new();
        while !self.is_at_end() {
            roots.push(self.read_irep()?);
        }
        debug!(
            roots = roots.len(),
            nodes = self.container.len(),
            strings = self.container.strings().len(),
            "read_esbmc_file"
        );
        Ok(DecodedIreps { container: self.container, roots })
    }
}

fn unexpected_end() -> IrepError {
    IrepError::malformed("unexpected end of input")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irep::binary_serde::{read_irep_slice, write_irep_vec};

    /// Writes the pieces of an ESBMC stream by hand.
    #[derive(Default)]
    struct Stream {
        bytes: Vec<u8>,
    }

    impl Stream {
        fn prelude() -> Self {
            let mut stream = Stream::default();
            stream.bytes.extend_from_slice(b"GBF");
            stream.word(1)
        }

        fn word(mut self, w: u32) -> Self {
            self.bytes.extend_from_slice(&w.to_be_bytes());
            self
        }

        fn byte(mut self, b: u8) -> Self {
            self.bytes.push(b);
            self
        }

        fn string(mut self, number: u32, s: &[u8]) -> Self {
            self = self.word(number);
            for &c in s {
                if c == 0 || c == b'\\' {
                    self.bytes.push(b'\\');
                }
                self.bytes.push(c);
            }
            self.byte(0)
        }
    }

    #[test]
    fn test_read_word_big_endian() {
        let bytes = [0x12, 0x34, 0x56, 0x78, 0, 0, 0, 1];
        let mut reader = EsbmcBinaryReader::new(&bytes).unwrap();
        assert_eq!(reader.read_word().unwrap(), 0x12345678);
        assert_eq!(reader.read_word().unwrap(), 1);
        assert!(reader.is_at_end());
        assert!(matches!(reader.read_word(), Err(IrepError::Malformed(_))));
    }

    #[test]
    fn test_check_header_valid() {
        let stream = Stream::prelude();
        let mut reader = EsbmcBinaryReader::new(&stream.bytes).unwrap();
        reader.check_header().unwrap();
        reader.check_version().unwrap();
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_check_header_invalid() {
        for bad in [b"XBF", b"GXF", b"GBX"] {
            let mut bytes = bad.to_vec();
            bytes.extend_from_slice(&[0, 0, 0, 1]);
            let mut reader = EsbmcBinaryReader::new(&bytes).unwrap();
            assert!(reader.check_header().is_err());
        }
    }

    #[test]
    fn test_check_version_invalid() {
        for version in [0, 2] {
            let stream = Stream::default().word(version);
            let mut reader = EsbmcBinaryReader::new(&stream.bytes).unwrap();
            let err = reader.check_version().unwrap_err();
            assert!(err.to_string().contains("invalid ESBMC version"));
        }
    }

    #[test]
    fn test_read_escaped_string() {
        let stream = Stream::default().string(0, b"a\\b\0c").word(0);
        let mut reader = EsbmcBinaryReader::new(&stream.bytes).unwrap();
        let first = reader.read_string_ref().unwrap();
        let again = reader.read_string_ref().unwrap();
        assert_eq!(first, again);
        assert_eq!(reader.container().strings().resolve(first), Some(&b"a\\b\0c"[..]));
    }

    #[test]
    fn test_read_shared_irep() {
        // irep 0 = "+" with subs irep 1 = "x" and a back reference to irep 1,
        // plus a named "type" and a "#location" comment
        let stream = Stream::prelude()
            .word(0)
            .string(0, b"+")
            .byte(b'S')
            .word(1)
            .string(1, b"x")
            .byte(0)
            .byte(b'S')
            .word(1)
            .byte(b'N')
            .string(2, b"type")
            .word(2)
            .string(3, b"signedbv")
            .byte(0)
            .byte(b'C')
            .string(4, b"#location")
            .word(3)
            .word(1)
            .byte(0)
            .byte(0);
        let decoded = EsbmcBinaryReader::new(&stream.bytes).unwrap().read_all().unwrap();
        assert_eq!(decoded.roots.len(), 1);
        let container = &decoded.container;
        assert_eq!(container.len(), 4);

        let root = container.node(decoded.root().unwrap()).unwrap();
        assert_eq!(root.id_str(), Some("+"));
        let subs: Vec<_> = root.sub().collect();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0], subs[1]);
        assert_eq!(root.lookup_node("type").unwrap().id_str(), Some("signedbv"));
        // the comment reuses string 1 ("x") as its id
        assert_eq!(root.lookup_node("#location").unwrap().id_str(), Some("x"));
        assert_eq!(root.nof_comments(), 1);
    }

    #[test]
    fn test_top_level_back_reference() {
        let stream = Stream::prelude().word(7).string(0, b"nil").byte(0).word(7);
        let reader = EsbmcBinaryReader::new(&stream.bytes).unwrap();
        assert_eq!(reader.container().capacity(), stream.bytes.len() / MIN_IREP_SIZE);
        let decoded = reader.read_all().unwrap();
        assert_eq!(decoded.roots.len(), 2);
        assert_eq!(decoded.roots[0], decoded.roots[1]);
        assert_eq!(decoded.container.len(), 1);

        // the repeated root survives the native format
        let bytes = write_irep_vec(&decoded.container, &decoded.roots).unwrap();
        let again = read_irep_slice(&bytes).unwrap();
        assert_eq!(again.roots, vec![again.roots[0]; 2]);
        assert!(decoded.container.isomorphic_to(&decoded.roots, &again.container, &again.roots));
    }

    #[test]
    fn test_missing_terminator() {
        let stream = Stream::prelude().word(0).string(0, b"+");
        let err = EsbmcBinaryReader::new(&stream.bytes).unwrap().read_all().unwrap_err();
        assert!(err.to_string().contains("unexpected end of input"));
    }

    #[test]
    fn test_sub_after_named_is_rejected() {
        let stream = Stream::prelude()
            .word(0)
            .string(0, b"+")
            .byte(b'N')
            .string(1, b"type")
            .word(1)
            .word(0)
            .byte(0)
            .byte(b'S')
            .word(1)
            .byte(0);
        let err = EsbmcBinaryReader::new(&stream.bytes).unwrap().read_all().unwrap_err();
        assert!(err.to_string().contains("Sub child after Named"));
    }

    #[test]
    fn test_unknown_tag() {
        let stream = Stream::prelude().word(0).string(0, b"+").byte(b'Q');
        let err = EsbmcBinaryReader::new(&stream.bytes).unwrap().read_all().unwrap_err();
        assert!(err.to_string().contains("unexpected character"));
    }

    #[test]
    fn test_self_containing_irep() {
        let stream = Stream::prelude().word(0).string(0, b"+").byte(b'S').word(0).byte(0);
        let err = EsbmcBinaryReader::new(&stream.bytes).unwrap().read_all().unwrap_err();
        assert!(err.to_string().contains("contains itself"));
    }

    #[test]
    fn test_deep_nesting_does_not_recurse() {
        let depth = 10_000;
        let mut stream = Stream::prelude();
        for level in 0..depth {
            stream = stream.word(level).string(level, format!("l{level}").as_bytes()).byte(b'S');
        }
        stream = stream.word(depth).string(depth, b"leaf").byte(0);
        for _ in 0..depth {
            stream = stream.byte(0);
        }
        let decoded = EsbmcBinaryReader::new(&stream.bytes).unwrap().read_all().unwrap();
        assert_eq!(decoded.container.len(), depth as usize + 1);
        let root = decoded.container.node(decoded.root().unwrap()).unwrap();
        assert_eq!(root.id_str(), Some("l0"));
    }
}
