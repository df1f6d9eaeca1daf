// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The arena owning every irep of one parsed unit.
//!
//! Nodes are appended to a node array whose size is fixed when the container is
//! created. All children of all nodes live in one flat array; a node only stores
//! where its children start and how many of each kind it has. Children must
//! already be in the container when their parent is inserted, so node indices
//! are a topological order of the DAG and there are no dangling references.

use super::irep::{Child, ChildKind, Irep, NodeIndex};
use super::{StringHandle, StringInterner};
use crate::{IrepError, Result};
use fxhash::FxBuildHasher;
use hashbrown::{HashMap, HashSet};
use std::fmt;
use tracing::trace;

#[derive(Clone, Copy, Debug)]
struct NodeRecord {
    id: StringHandle,
    children_start: u32,
    nof_sub: u32,
    nof_named_sub: u32,
    nof_comments: u32,
}

impl NodeRecord {
    fn nof_children(&self) -> usize {
        (self.nof_sub + self.nof_named_sub + self.nof_comments) as usize
    }
}

/// A key representing a node as the vector of numbers describing its contents:
/// ```text
/// id, #sub, sub[0] .. sub[#sub-1],
/// #named_sub, key[0], value[0] .. ,
/// #comments, key[0], value[0] ..
/// ```
/// Two nodes with the same key are structurally identical.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
struct IrepKey {
    numbers: Vec<u32>,
}

impl IrepKey {
    fn new(id: StringHandle, children: &[Child]) -> Self {
        let mut numbers = Vec::with_capacity(4 + 2 * children.len());
        numbers.push(id.index() as u32);
        for kind in [ChildKind::Sub, ChildKind::Named, ChildKind::Comment] {
            let group = children.iter().filter(|c| c.kind == kind);
            numbers.push(group.clone().count() as u32);
            for child in group {
                if let Some(key) = child.key {
                    numbers.push(key.index() as u32);
                }
                numbers.push(child.node.index() as u32);
            }
        }
        IrepKey { numbers }
    }
}

pub struct IrepContainer {
    capacity: usize,
    nodes: Vec<NodeRecord>,
    children: Vec<Child>,
    strings: StringInterner,
    /// Hash-consing index, only built once [IrepContainer::insert_shared] is used.
    shared: Option<HashMap<IrepKey, NodeIndex, FxBuildHasher>>,
}

impl IrepContainer {
    /// Creates a container that holds at most `length` nodes. The node array is
    /// allocated up front.
    pub fn with_capacity(length: usize) -> Result<Self> {
        let mut container = IrepContainer::with_max_len(length)?;
        container.nodes.try_reserve_exact(length)?;
        Ok(container)
    }

    /// Creates a container that holds at most `length` nodes, growing the node
    /// array as nodes arrive. For readers whose bound is far above the usual count.
    pub(crate) fn with_max_len(length: usize) -> Result<Self> {
        if length > u32::MAX as usize {
            return Err(IrepError::Allocation);
        }
        Ok(IrepContainer {
            capacity: length,
            nodes: Vec::new(),
            children: Vec::new(),
            strings: StringInterner::new()?,
            shared: None,
        })
    }

    pub fn intern(&mut self, s: impl AsRef<[u8]>) -> Result<StringHandle> {
        self.strings.intern(s)
    }

    pub fn strings(&self) -> &StringInterner {
        &self.strings
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.nodes.len() == self.capacity
    }

    /// Appends `irep` and returns its index. Every child must already be in the container.
    pub fn insert(&mut self, irep: Irep) -> Result<NodeIndex> {
        if self.is_full() {
            return Err(IrepError::CapacityExceeded { capacity: self.capacity });
        }
        self.check_string(irep.id)?;
        let len = self.nodes.len();
        for child in irep.children() {
            if child.node.index() >= len {
                return Err(IrepError::DanglingReference { index: child.node.index(), len });
            }
            if let Some(key) = child.key {
                self.check_string(key)?;
            }
        }
        check_unique_keys(ChildKind::Named, &irep.named_sub)?;
        check_unique_keys(ChildKind::Comment, &irep.comments)?;

        let start = self.children.len();
        if start + irep.child_count() > u32::MAX as usize {
            return Err(IrepError::Allocation);
        }
        self.nodes.try_reserve(1)?;
        self.children.try_reserve(irep.child_count())?;
        self.children.extend(irep.children());

        let index = NodeIndex::from_index(len);
        self.nodes.push(NodeRecord {
            id: irep.id,
            children_start: start as u32,
            nof_sub: irep.sub.len() as u32,
            nof_named_sub: irep.named_sub.len() as u32,
            nof_comments: irep.comments.len() as u32,
        });
        if let Some(shared) = &mut self.shared {
            let key = IrepKey::new(irep.id, &self.children[start..]);
            shared.entry(key).or_insert(index);
        }
        Ok(index)
    }

    /// Like [IrepContainer::insert], but returns the existing node if a structurally
    /// identical one is already in the container.
    pub fn insert_shared(&mut self, irep: Irep) -> Result<NodeIndex> {
        if self.shared.is_none() {
            self.build_shared_index()?;
        }
        let children: Vec<Child> = irep.children().collect();
        let key = IrepKey::new(irep.id, &children);
        if let Some(existing) = self.shared.as_ref().and_then(|shared| shared.get(&key)) {
            trace!(?existing, "insert_shared hit");
            return Ok(*existing);
        }
        self.insert(irep)
    }

    fn build_shared_index(&mut self) -> Result<()> {
        let mut shared = HashMap::with_hasher(FxBuildHasher::default());
        shared.try_reserve(self.nodes.len())?;
        for (i, record) in self.nodes.iter().enumerate() {
            let key = IrepKey::new(record.id, self.children_of(record));
            shared.entry(key).or_insert(NodeIndex::from_index(i));
        }
        self.shared = Some(shared);
        Ok(())
    }

    pub fn node(&self, index: NodeIndex) -> Option<IrepRef<'_>> {
        self.nodes.get(index.index()).map(|record| IrepRef { container: self, index, record })
    }

    /// Iterates over all nodes in index order.
    pub fn iter(&self) -> impl Iterator<Item = IrepRef<'_>> {
        (0..self.nodes.len()).map(move |i| IrepRef {
            container: self,
            index: NodeIndex::from_index(i),
            record: &self.nodes[i],
        })
    }

    /// True iff `a` and `b` have the same id and the same children, compared by index.
    pub fn structurally_identical(&self, a: NodeIndex, b: NodeIndex) -> bool {
        match (self.node(a), self.node(b)) {
            (Some(a), Some(b)) => a.id() == b.id() && a.children() == b.children(),
            _ => false,
        }
    }

    /// True iff the trees rooted at `a` and `b` are equal once comments are ignored.
    /// Named subs are compared as maps, subs positionally.
    pub fn semantic_eq(&self, a: NodeIndex, b: NodeIndex) -> bool {
        let mut seen: HashSet<(NodeIndex, NodeIndex), FxBuildHasher> = HashSet::default();
        let mut todo = vec![(a, b)];
        while let Some((a, b)) = todo.pop() {
            if a == b && a.index() < self.len() {
                continue;
            }
            if !seen.insert((a, b)) {
                continue;
            }
            let (Some(a), Some(b)) = (self.node(a), self.node(b)) else {
                return false;
            };
            if a.id() != b.id()
                || a.record.nof_sub != b.record.nof_sub
                || a.record.nof_named_sub != b.record.nof_named_sub
            {
                return false;
            }
            todo.extend(a.sub().zip(b.sub()));
            for (key, value) in a.named_sub() {
                match b.named_sub().find(|(k, _)| *k == key) {
                    Some((_, other)) => todo.push((value, other)),
                    None => return false,
                }
            }
        }
        true
    }

    /// Returns every node reachable from `roots`, each exactly once, children before
    /// their parents (depth-first post-order, children visited in stored order).
    pub fn reachable_from(&self, roots: &[NodeIndex]) -> Result<Vec<NodeIndex>> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut stack: Vec<(NodeIndex, usize)> = Vec::new();
        for &root in roots {
            self.check_node(root)?;
            if visited[root.index()] {
                continue;
            }
            visited[root.index()] = true;
            stack.push((root, 0));
            while let Some((node, next_child)) = stack.pop() {
                let children = self.children_of(&self.nodes[node.index()]);
                match children.get(next_child) {
                    Some(child) => {
                        stack.push((node, next_child + 1));
                        if !visited[child.node.index()] {
                            visited[child.node.index()] = true;
                            stack.push((child.node, 0));
                        }
                    }
                    None => order.push(node),
                }
            }
        }
        Ok(order)
    }

    /// True iff the DAG below `roots` in `self` and the one below `other_roots` in
    /// `other` have the same shape: equal id and key bytes, the same children in the
    /// same order, and the same sharing. Node and string numbering may differ.
    pub fn isomorphic_to(
        &self,
        roots: &[NodeIndex],
        other: &IrepContainer,
        other_roots: &[NodeIndex],
    ) -> bool {
        if roots.len() != other_roots.len() {
            return false;
        }
        let mut forward: Vec<Option<NodeIndex>> = vec![None; self.len()];
        let mut backward: Vec<Option<NodeIndex>> = vec![None; other.len()];
        let mut todo: Vec<(NodeIndex, NodeIndex)> =
            roots.iter().copied().zip(other_roots.iter().copied()).collect();
        while let Some((a, b)) = todo.pop() {
            let (Some(x), Some(y)) = (self.node(a), other.node(b)) else {
                return false;
            };
            match (forward[a.index()], backward[b.index()]) {
                (Some(mapped_a), Some(mapped_b)) if mapped_a == b && mapped_b == a => continue,
                (None, None) => {
                    forward[a.index()] = Some(b);
                    backward[b.index()] = Some(a);
                }
                _ => return false,
            }
            if x.id_bytes() != y.id_bytes() || x.children().len() != y.children().len() {
                return false;
            }
            for (cx, cy) in x.children().iter().zip(y.children()) {
                if cx.kind != cy.kind || self.key_bytes(cx.key) != other.key_bytes(cy.key) {
                    return false;
                }
                todo.push((cx.node, cy.node));
            }
        }
        true
    }

    pub(crate) fn check_node(&self, index: NodeIndex) -> Result<()> {
        if index.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(IrepError::DanglingReference { index: index.index(), len: self.nodes.len() })
        }
    }

    fn check_string(&self, handle: StringHandle) -> Result<()> {
        if handle.index() < self.strings.len() {
            Ok(())
        } else {
            Err(IrepError::UnknownString { index: handle.index(), len: self.strings.len() })
        }
    }

    fn key_bytes(&self, key: Option<StringHandle>) -> Option<&[u8]> {
        key.map(|key| self.strings.resolve(key).unwrap_or_default())
    }

    fn children_of(&self, record: &NodeRecord) -> &[Child] {
        let start = record.children_start as usize;
        &self.children[start..start + record.nof_children()]
    }
}

impl fmt::Debug for IrepContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrepContainer")
            .field("capacity", &self.capacity)
            .field("len", &self.nodes.len())
            .field("strings", &self.strings.len())
            .finish()
    }
}

/// A borrowed view of one node.
#[derive(Clone, Copy)]
pub struct IrepRef<'a> {
    container: &'a IrepContainer,
    index: NodeIndex,
    record: &'a NodeRecord,
}

/// Getters
impl<'a> IrepRef<'a> {
    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn container(&self) -> &'a IrepContainer {
        self.container
    }

    pub fn id(&self) -> StringHandle {
        self.record.id
    }

    pub fn id_bytes(&self) -> &'a [u8] {
        self.container.strings.resolve(self.record.id).unwrap_or_default()
    }

    pub fn id_str(&self) -> Option<&'a str> {
        self.container.strings.resolve_str(self.record.id)
    }

    /// All children: subs, then named subs, then comments.
    pub fn children(&self) -> &'a [Child] {
        self.container.children_of(self.record)
    }

    pub fn sub(&self) -> impl ExactSizeIterator<Item = NodeIndex> + Clone + 'a {
        self.children()[..self.record.nof_sub as usize].iter().map(|c| c.node)
    }

    pub fn named_sub(&self) -> impl Iterator<Item = (StringHandle, NodeIndex)> + Clone + 'a {
        let start = self.record.nof_sub as usize;
        let end = start + self.record.nof_named_sub as usize;
        self.children()[start..end].iter().filter_map(keyed)
    }

    pub fn comments(&self) -> impl Iterator<Item = (StringHandle, NodeIndex)> + Clone + 'a {
        let start = (self.record.nof_sub + self.record.nof_named_sub) as usize;
        self.children()[start..].iter().filter_map(keyed)
    }

    /// Looks `key` up among the named subs, then among the comments.
    pub fn lookup(&self, key: impl AsRef<[u8]>) -> Option<NodeIndex> {
        let key = self.container.strings.get(key)?;
        self.named_sub().chain(self.comments()).find(|(k, _)| *k == key).map(|(_, node)| node)
    }

    pub fn lookup_node(&self, key: impl AsRef<[u8]>) -> Option<IrepRef<'a>> {
        self.lookup(key).and_then(|index| self.container.node(index))
    }

    pub fn nof_sub(&self) -> usize {
        self.record.nof_sub as usize
    }

    pub fn nof_named_sub(&self) -> usize {
        self.record.nof_named_sub as usize
    }

    pub fn nof_comments(&self) -> usize {
        self.record.nof_comments as usize
    }
}

/// Predicates
impl IrepRef<'_> {
    pub fn is_just_id(&self) -> bool {
        self.record.nof_children() == 0
    }
}

fn keyed(child: &Child) -> Option<(StringHandle, NodeIndex)> {
    child.key.map(|key| (key, child.node))
}

impl fmt::Debug for IrepRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrepRef")
            .field("index", &self.index)
            .field("id", &String::from_utf8_lossy(self.id_bytes()))
            .field("children", &self.children())
            .finish()
    }
}

/// Indented rendering in the spirit of CBMC's `irept::pretty`.
impl fmt::Display for IrepRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        pretty(f, *self, 0)
    }
}

fn pretty(f: &mut fmt::Formatter<'_>, root: IrepRef<'_>, indent: usize) -> fmt::Result {
    let container = root.container;
    let name = |handle: StringHandle| {
        String::from_utf8_lossy(container.strings.resolve(handle).unwrap_or_default())
    };
    write!(f, "{}", String::from_utf8_lossy(root.id_bytes()))?;
    // (node, next child to print, indentation of the node)
    let mut stack = vec![(root, 0, indent)];
    while let Some((node, next, indent)) = stack.pop() {
        let Some(child) = node.children().get(next) else { continue };
        stack.push((node, next + 1, indent));
        writeln!(f)?;
        write!(f, "{:width$}", "", width = indent + 2)?;
        match (child.kind, child.key) {
            (ChildKind::Sub, _) | (_, None) => write!(f, "{}: ", child.node)?,
            (_, Some(key)) => write!(f, "* {}: ", name(key))?,
        }
        if let Some(sub) = container.node(child.node) {
            write!(f, "{}", String::from_utf8_lossy(sub.id_bytes()))?;
            stack.push((sub, 0, indent + 4));
        }
    }
    Ok(())
}

fn check_unique_keys(kind: ChildKind, entries: &[(StringHandle, NodeIndex)]) -> Result<()> {
    for (i, (key, _)) in entries.iter().enumerate() {
        if entries[..i].iter().any(|(k, _)| k == key) {
            return Err(IrepError::DuplicateKey { kind, key: key.index() });
        }
    }
    Ok(())
}
