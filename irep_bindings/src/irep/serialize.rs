// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! This module implements irep serialization using serde Serializer.
//! The output has the shape of CBMC's JSON ireps; shared nodes are written out
//! once per use.
use super::binary_serde::DecodedIreps;
use super::{IrepContainer, IrepRef, NodeIndex, StringHandle};
use serde::Serialize;
use serde::ser::{Error, SerializeMap, SerializeSeq, Serializer};

/// A node of a container, viewed as a JSON tree.
#[derive(Clone, Copy, Debug)]
pub struct IrepJson<'a> {
    pub container: &'a IrepContainer,
    pub index: NodeIndex,
}

impl<'a> IrepRef<'a> {
    pub fn json(&self) -> IrepJson<'a> {
        IrepJson { container: self.container(), index: self.index() }
    }
}

/// Deepest node nesting [IrepJson] writes out. Serialization recurses once per
/// level, so deeper DAGs are reported as an error instead.
pub const MAX_JSON_DEPTH: usize = 256;

impl Serialize for IrepJson<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Nested { container: self.container, index: self.index, depth: 0 }.serialize(serializer)
    }
}

/// A node `depth` levels below the node being serialized.
struct Nested<'a> {
    container: &'a IrepContainer,
    index: NodeIndex,
    depth: usize,
}

impl Serialize for Nested<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.depth > MAX_JSON_DEPTH {
            return Err(S::Error::custom(format!(
                "irep nesting too deep, more than {MAX_JSON_DEPTH} levels"
            )));
        }
        let node = self
            .container
            .node(self.index)
            .ok_or_else(|| S::Error::custom(format!("no node {}", self.index)))?;
        let depth = self.depth + 1;
        let mut obj = serializer.serialize_map(None)?;
        obj.serialize_entry("id", &String::from_utf8_lossy(node.id_bytes()))?;
        if node.nof_sub() > 0 {
            obj.serialize_entry("sub", &Subs { node, depth })?;
        }
        if node.nof_named_sub() > 0 {
            obj.serialize_entry("namedSub", &Keyed { node, depth, entries: node.named_sub() })?;
        }
        if node.nof_comments() > 0 {
            obj.serialize_entry("comment", &Keyed { node, depth, entries: node.comments() })?;
        }
        obj.end()
    }
}

struct Subs<'a> {
    node: IrepRef<'a>,
    depth: usize,
}

impl Serialize for Subs<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let container = self.node.container();
        let mut seq = serializer.serialize_seq(Some(self.node.nof_sub()))?;
        for index in self.node.sub() {
            seq.serialize_element(&Nested { container, index, depth: self.depth })?;
        }
        seq.end()
    }
}

/// Named subs or comments. The iterator is cloned because `serialize` only
/// gets `&self`.
struct Keyed<'a, I> {
    node: IrepRef<'a>,
    depth: usize,
    entries: I,
}

impl<I> Serialize for Keyed<'_, I>
where
    I: Iterator<Item = (StringHandle, NodeIndex)> + Clone,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let container = self.node.container();
        let mut obj = serializer.serialize_map(None)?;
        for (key, index) in self.entries.clone() {
            let key = container.strings().resolve(key).unwrap_or_default();
            let value = Nested { container, index, depth: self.depth };
            obj.serialize_entry(&String::from_utf8_lossy(key), &value)?;
        }
        obj.end()
    }
}

impl Serialize for DecodedIreps {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let roots: Vec<IrepJson> =
            self.roots.iter().map(|&index| IrepJson { container: &self.container, index }).collect();
        let mut obj = serializer.serialize_map(None)?;
        obj.serialize_entry("roots", &roots)?;
        obj.end()
    }
}
