// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Native irep binary format, version 1.
//!
//! All integers are little-endian `u32`:
//! ```text
//! magic        0x7f 'I' 'R' 'B'
//! version      1
//! header       node_count, string_count, root_count
//! roots        node_ref[root_count]
//! strings      (length, bytes[length])[string_count]
//! nodes        (id_ref,
//!               sub_count,     node_ref[sub_count],
//!               named_count,   (key_ref, node_ref)[named_count],
//!               comment_count, (key_ref, node_ref)[comment_count])[node_count]
//! ```
//! A `node_ref` in the node stream is the position of an earlier node, so a node
//! shared by several parents is written once and referred back to afterwards.
//! `id_ref` and `key_ref` are positions in the string table. The designated
//! root is the first entry of `roots`. Nothing may follow the last node.
use crate::irep::{Irep, IrepContainer, NodeIndex, StringHandle};
use crate::{IrepError, Result};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, trace};

pub const MAGIC: [u8; 4] = [0x7f, b'I', b'R', b'B'];
pub const VERSION: u32 = 1;

const HEADER_SIZE: u64 = 20;
/// Smallest encodings: a root ref, an empty string, a node without children.
const MIN_ROOT_SIZE: u64 = 4;
const MIN_STRING_SIZE: u64 = 4;
const MIN_NODE_SIZE: u64 = 16;

/// Writes the nodes reachable from `roots` to `filename` in binary format version 1.
pub fn write_irep_file(
    filename: &Path,
    container: &IrepContainer,
    roots: &[NodeIndex],
) -> Result<()> {
    let out_file = File::create(filename)?;
    let mut writer = BufWriter::new(out_file);
    IrepBinarySerializer::new(&mut writer).write_file(container, roots)?;
    writer.flush()?;
    Ok(())
}

/// Same as [write_irep_file], into memory.
pub fn write_irep_vec(container: &IrepContainer, roots: &[NodeIndex]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    IrepBinarySerializer::new(&mut out).write_file(container, roots)?;
    Ok(out)
}

/// Reads a file expected to be in binary format version 1.
pub fn read_irep_file(filename: &Path) -> Result<DecodedIreps> {
    let file = File::open(filename)?;
    let input_len = file.metadata()?.len();
    IrepBinaryDeserializer::new(BufReader::new(file)).with_input_len(input_len).read_file()
}

pub fn read_irep_slice(bytes: &[u8]) -> Result<DecodedIreps> {
    IrepBinaryDeserializer::new(bytes).with_input_len(bytes.len() as u64).read_file()
}

/// The result of a successful read: the container and the roots listed in the stream.
#[derive(Debug)]
pub struct DecodedIreps {
    pub container: IrepContainer,
    pub roots: Vec<NodeIndex>,
}

impl DecodedIreps {
    /// The designated root, i.e. the first one written.
    pub fn root(&self) -> Option<NodeIndex> {
        self.roots.first().copied()
    }
}

/// Upper bounds checked against the header before anything is allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeLimits {
    pub max_nodes: u32,
    pub max_strings: u32,
    pub max_string_len: u32,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        DecodeLimits { max_nodes: 1 << 26, max_strings: 1 << 24, max_string_len: 1 << 20 }
    }
}

#[derive(Clone, Copy, Debug)]
struct Header {
    node_count: u32,
    string_count: u32,
    root_count: u32,
}

/// Binary serializer. Numbers the reachable nodes and strings, then writes
/// each of them exactly once.
pub struct IrepBinarySerializer<'a, W>
where
    W: Write,
{
    writer: &'a mut W,

    /// In-memory temporary buffer, contents get flushed after each object
    buf: Vec<u8>,

    /// Stream position of each container node, if reachable.
    node_numbers: Vec<Option<u32>>,

    /// Stream position of each interned string, if used.
    string_numbers: Vec<Option<u32>>,
}

impl<'a, W> IrepBinarySerializer<'a, W>
where
    W: Write,
{
    pub fn new(writer: &'a mut W) -> Self {
        IrepBinarySerializer {
            writer,
            buf: Vec::new(),
            node_numbers: Vec::new(),
            string_numbers: Vec::new(),
        }
    }

    /// Flushes the temporary buffer to the external writer and clears it.
    fn flush(&mut self) -> io::Result<()> {
        self.writer.write_all(&self.buf)?;
        self.buf.clear();
        Ok(())
    }

    fn write_u32(&mut self, u: u32) {
        self.buf.extend_from_slice(&u.to_le_bytes());
    }

    fn write_count(&mut self, n: usize) {
        // a container never holds more than u32::MAX of anything
        self.write_u32(n as u32);
    }

    fn node_ref(&self, node: NodeIndex) -> u32 {
        self.node_numbers[node.index()].expect("child written before its parent")
    }

    fn string_ref(&self, string: StringHandle) -> u32 {
        self.string_numbers[string.index()].expect("string numbered before use")
    }

    /// Assigns stream positions. Nodes are numbered children first, strings in
    /// order of first use by the numbered nodes.
    fn number(&mut self, container: &IrepContainer, order: &[NodeIndex]) -> Vec<StringHandle> {
        self.node_numbers = vec![None; container.len()];
        self.string_numbers = vec![None; container.strings().len()];
        let mut strings = Vec::new();
        for (position, &index) in order.iter().enumerate() {
            self.node_numbers[index.index()] = Some(position as u32);
            let Some(node) = container.node(index) else { continue };
            let keys = node.children().iter().filter_map(|child| child.key);
            for string in std::iter::once(node.id()).chain(keys) {
                let slot = &mut self.string_numbers[string.index()];
                if slot.is_none() {
                    *slot = Some(strings.len() as u32);
                    strings.push(string);
                }
            }
        }
        strings
    }

    fn write_header(&mut self, nodes: usize, strings: usize, roots: usize) -> io::Result<()> {
        self.buf.extend_from_slice(&MAGIC);
        self.write_u32(VERSION);
        self.write_count(nodes);
        self.write_count(strings);
        self.write_count(roots);
        self.flush()
    }

    fn write_string(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_count(bytes.len());
        self.buf.extend_from_slice(bytes);
        self.flush()
    }

    fn write_node(&mut self, container: &IrepContainer, index: NodeIndex) -> io::Result<()> {
        let Some(node) = container.node(index) else { return Ok(()) };
        self.write_u32(self.string_ref(node.id()));

        self.write_count(node.nof_sub());
        for sub in node.sub() {
            self.write_u32(self.node_ref(sub));
        }

        self.write_count(node.nof_named_sub());
        for (key, value) in node.named_sub() {
            self.write_u32(self.string_ref(key));
            self.write_u32(self.node_ref(value));
        }

        self.write_count(node.nof_comments());
        for (key, value) in node.comments() {
            self.write_u32(self.string_ref(key));
            self.write_u32(self.node_ref(value));
        }
        self.flush()
    }

    /// Writes every node reachable from `roots`, and the strings they use.
    pub fn write_file(&mut self, container: &IrepContainer, roots: &[NodeIndex]) -> Result<()> {
        let order = container.reachable_from(roots)?;
        let strings = self.number(container, &order);
        debug!(nodes = order.len(), strings = strings.len(), roots = roots.len(), "write_irep_file");

        self.write_header(order.len(), strings.len(), roots.len())?;
        for &root in roots {
            self.write_u32(self.node_ref(root));
        }
        self.flush()?;
        for string in strings {
            let bytes = container.strings().resolve(string).unwrap_or_default();
            self.write_string(bytes)?;
        }
        for index in order {
            self.write_node(container, index)?;
        }
        Ok(())
    }
}

/// Binary deserializer. Reads a whole stream into a fresh [IrepContainer].
pub struct IrepBinaryDeserializer<R>
where
    R: Read,
{
    reader: R,
    limits: DecodeLimits,
    /// Length of the input when known, used to reject headers that cannot fit in it.
    input_len: Option<u64>,
}

impl<R> IrepBinaryDeserializer<R>
where
    R: Read,
{
    /// Constructor. The reader is moved into this object and cannot be used
    /// afterwards.
    pub fn new(reader: R) -> Self {
        IrepBinaryDeserializer { reader, limits: DecodeLimits::default(), input_len: None }
    }

    pub fn with_limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_input_len(mut self, input_len: u64) -> Self {
        self.input_len = Some(input_len);
        self
    }

    /// Returns Err if the found value is not the expected value.
    fn expect<T: Eq + std::fmt::Display>(found: T, expected: T, what: &str) -> Result<T> {
        if found != expected {
            return Err(IrepError::malformed(format!(
                "expected {what} {expected} in byte stream, found {found} instead"
            )));
        }
        Ok(found)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.reader.read_exact(&mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    fn read_header(&mut self) -> Result<Header> {
        let mut magic = [0u8; 4];
        self.reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(IrepError::malformed(format!("invalid magic number {magic:02x?}")));
        }
        let version = self.read_u32()?;
        Self::expect(version, VERSION, "format version")?;

        let header = Header {
            node_count: self.read_u32()?,
            string_count: self.read_u32()?,
            root_count: self.read_u32()?,
        };
        debug!(?header, "read_irep_file");
        self.check_plausible(&header)?;
        Ok(header)
    }

    /// Rejects headers announcing more than the limits allow, or more records than
    /// the input could possibly contain.
    fn check_plausible(&self, header: &Header) -> Result<()> {
        if header.node_count > self.limits.max_nodes {
            return Err(IrepError::malformed(format!(
                "header declares {} nodes, limit is {}",
                header.node_count, self.limits.max_nodes
            )));
        }
        if header.string_count > self.limits.max_strings {
            return Err(IrepError::malformed(format!(
                "header declares {} strings, limit is {}",
                header.string_count, self.limits.max_strings
            )));
        }
        if let Some(input_len) = self.input_len {
            let needed = HEADER_SIZE
                + u64::from(header.root_count) * MIN_ROOT_SIZE
                + u64::from(header.string_count) * MIN_STRING_SIZE
                + u64::from(header.node_count) * MIN_NODE_SIZE;
            if needed > input_len {
                return Err(IrepError::malformed(format!(
                    "header needs at least {needed} bytes, input has {input_len}"
                )));
            }
        }
        Ok(())
    }

    fn read_roots(&mut self, header: &Header) -> Result<Vec<NodeIndex>> {
        // Roots may repeat, so their count is only bounded by the input length.
        let mut roots = Vec::new();
        roots.try_reserve_exact(header.root_count.min(header.node_count) as usize)?;
        for _ in 0..header.root_count {
            let root = self.read_u32()?;
            if root >= header.node_count {
                return Err(IrepError::malformed(format!(
                    "root {root} is out of range ({} nodes)",
                    header.node_count
                )));
            }
            roots.push(NodeIndex::from_index(root as usize));
        }
        Ok(roots)
    }

    fn read_string(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()?;
        if len > self.limits.max_string_len {
            return Err(IrepError::malformed(format!(
                "string of {len} bytes exceeds limit {}",
                self.limits.max_string_len
            )));
        }
        let mut bytes = Vec::new();
        (&mut self.reader).take(u64::from(len)).read_to_end(&mut bytes)?;
        if bytes.len() != len as usize {
            return Err(IrepError::malformed("unexpected end of input inside a string"));
        }
        Ok(bytes)
    }

    /// Interns the string table. Positions in the table must equal interner handles,
    /// so a table listing the same string twice is rejected.
    fn read_string_table(&mut self, header: &Header, container: &mut IrepContainer) -> Result<()> {
        for position in 0..header.string_count as usize {
            let bytes = self.read_string()?;
            let handle = container.intern(&bytes)?;
            if handle.index() != position {
                return Err(IrepError::malformed(format!(
                    "string table entry {position} repeats entry {}",
                    handle.index()
                )));
            }
        }
        Ok(())
    }

    fn read_string_ref(&mut self, header: &Header) -> Result<StringHandle> {
        let string = self.read_u32()?;
        if string >= header.string_count {
            return Err(IrepError::malformed(format!(
                "string reference {string} is out of range ({} strings)",
                header.string_count
            )));
        }
        Ok(StringHandle::from_index(string as usize))
    }

    /// Reads a child reference of the node about to be stored at `position`.
    fn read_node_ref(&mut self, position: usize) -> Result<NodeIndex> {
        let node = self.read_u32()? as usize;
        if node >= position {
            return Err(IrepError::malformed(format!(
                "node {position} refers to node {node}, which is not written before it"
            )));
        }
        Ok(NodeIndex::from_index(node))
    }

    fn read_count(&mut self, what: &str) -> Result<u32> {
        let count = self.read_u32()?;
        // every entry takes at least four bytes
        if let Some(input_len) = self.input_len {
            if u64::from(count) * 4 > input_len {
                return Err(IrepError::malformed(format!("implausible {what} count {count}")));
            }
        }
        Ok(count)
    }

    fn read_node(&mut self, header: &Header, container: &mut IrepContainer) -> Result<NodeIndex> {
        let position = container.len();
        let id = self.read_string_ref(header)?;
        let mut irep = Irep::just_id(id);

        for _ in 0..self.read_count("sub")? {
            irep.sub.push(self.read_node_ref(position)?);
        }

        for _ in 0..self.read_count("named sub")? {
            let key = self.read_string_ref(header)?;
            let value = self.read_node_ref(position)?;
            if irep.named_sub.iter().any(|(k, _)| *k == key) {
                return Err(IrepError::malformed(format!("node {position} repeats a named sub key")));
            }
            irep.named_sub.push((key, value));
        }

        for _ in 0..self.read_count("comment")? {
            let key = self.read_string_ref(header)?;
            let value = self.read_node_ref(position)?;
            if irep.comments.iter().any(|(k, _)| *k == key) {
                return Err(IrepError::malformed(format!("node {position} repeats a comment key")));
            }
            irep.comments.push((key, value));
        }

        trace!(position, ?irep, "read_node");
        container.insert(irep)
    }

    /// Succeeds only at end of input.
    fn read_end(&mut self, header: &Header) -> Result<()> {
        let mut byte = [0u8; 1];
        match self.reader.read(&mut byte)? {
            0 => Ok(()),
            _ => Err(IrepError::malformed(format!(
                "trailing data after the {} declared nodes",
                header.node_count
            ))),
        }
    }

    /// Reads the whole stream. On error nothing read so far is kept.
    pub fn read_file(mut self) -> Result<DecodedIreps> {
        let header = self.read_header()?;
        let roots = self.read_roots(&header)?;
        let mut container = IrepContainer::with_capacity(header.node_count as usize)?;
        self.read_string_table(&header, &mut container)?;
        for _ in 0..header.node_count {
            self.read_node(&header, &mut container)?;
        }
        self.read_end(&header)?;
        debug!(nodes = container.len(), strings = container.strings().len(), "read_irep_file done");
        Ok(DecodedIreps { container, roots })
    }
}
