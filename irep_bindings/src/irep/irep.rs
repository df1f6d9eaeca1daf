// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The `Irep` node shape, and the fluent builder used to add nodes to a container.

use super::StringHandle;
use std::fmt;

/// Index of a node inside an [super::IrepContainer].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(u32);

impl NodeIndex {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        NodeIndex(index as u32)
    }
}

impl fmt::Debug for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three kinds of children an irep has.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildKind {
    /// Unnamed, positional operand.
    Sub,
    /// Keyed attribute such as `type`.
    Named,
    /// Keyed annotation such as `#source_location`. Ignored by semantic equality.
    Comment,
}

/// One tagged edge of the irep DAG. `key` is `None` exactly for [ChildKind::Sub].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Child {
    pub kind: ChildKind,
    pub key: Option<StringHandle>,
    pub node: NodeIndex,
}

/// A node that is about to be added to a container.
///
/// ```ignore
/// let plus = container.intern("+")?;
/// let ty = container.intern("type")?;
/// let node = Irep::just_id(plus).with_sub(a).with_sub(b).with_named_sub(ty, int_type);
/// let index = container.insert(node)?;
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Irep {
    pub id: StringHandle,
    pub sub: Vec<NodeIndex>,
    pub named_sub: Vec<(StringHandle, NodeIndex)>,
    pub comments: Vec<(StringHandle, NodeIndex)>,
}

/// Constructors
impl Irep {
    pub fn just_id(id: StringHandle) -> Irep {
        Irep { id, sub: Vec::new(), named_sub: Vec::new(), comments: Vec::new() }
    }

    pub fn just_sub(id: StringHandle, sub: impl IntoIterator<Item = NodeIndex>) -> Irep {
        Irep::just_id(id).with_subs(sub)
    }
}

/// Fluent Builders
impl Irep {
    pub fn with_sub(mut self, node: NodeIndex) -> Self {
        self.sub.push(node);
        self
    }

    pub fn with_subs(mut self, nodes: impl IntoIterator<Item = NodeIndex>) -> Self {
        self.sub.extend(nodes);
        self
    }

    /// Sets the named sub `key`. An existing entry for `key` keeps its position
    /// and gets the new value.
    pub fn with_named_sub(mut self, key: StringHandle, value: NodeIndex) -> Self {
        upsert(&mut self.named_sub, key, value);
        self
    }

    pub fn with_named_sub_option(self, key: StringHandle, value: Option<NodeIndex>) -> Self {
        match value {
            Some(value) => self.with_named_sub(key, value),
            None => self,
        }
    }

    /// Sets the comment `key`, with the same replacement rule as named subs.
    pub fn with_comment(mut self, key: StringHandle, value: NodeIndex) -> Self {
        upsert(&mut self.comments, key, value);
        self
    }
}

/// Predicates
impl Irep {
    pub fn is_just_id(&self) -> bool {
        self.sub.is_empty() && self.named_sub.is_empty() && self.comments.is_empty()
    }

    pub(crate) fn child_count(&self) -> usize {
        self.sub.len() + self.named_sub.len() + self.comments.len()
    }

    /// All children, grouped and ordered the way the container stores them.
    pub(crate) fn children(&self) -> impl Iterator<Item = Child> + '_ {
        let sub = self.sub.iter().map(|&node| Child { kind: ChildKind::Sub, key: None, node });
        let named = self
            .named_sub
            .iter()
            .map(|&(key, node)| Child { kind: ChildKind::Named, key: Some(key), node });
        let comments = self
            .comments
            .iter()
            .map(|&(key, node)| Child { kind: ChildKind::Comment, key: Some(key), node });
        sub.chain(named).chain(comments)
    }
}

fn upsert(entries: &mut Vec<(StringHandle, NodeIndex)>, key: StringHandle, value: NodeIndex) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}
