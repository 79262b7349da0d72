// CMCVAR - CMC III variable hierarchy engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Variable hierarchy
//!
//! A [`Tree`] is rebuilt from scratch every poll cycle by folding
//! `(dotted name, index)` records into a single rooted hierarchy. Shared
//! prefixes become shared interior nodes; the last segment of every name
//! becomes a leaf carrying the backend index and the full dotted name.
//!
//! ```text
//! ""                      (root)
//! └── A
//!     └── B
//!         └── Sockets
//!             └── 01
//!                 ├── Temperature   index=idx1
//!                 └── Power         index=idx2
//! ```
//!
//! Children keep first-seen order. Every node also keeps a key → position
//! table so sibling lookup during the build does not scan, and the tree keeps
//! an index → path table so joins resolve an index without a full search.

use crate::error::{Error, Result};
use crate::name;
use serde::Serialize;
use std::collections::HashMap;

/// Key of the root node
pub const ROOT_KEY: &str = "";

/// Anything exposing a dotted name and a backend index
pub trait VarRecord {
    /// Full dotted variable name
    fn name(&self) -> &str;
    /// Opaque backend index of the variable
    fn index(&self) -> &str;
}

impl<A: AsRef<str>, B: AsRef<str>> VarRecord for (A, B) {
    fn name(&self) -> &str {
        self.0.as_ref()
    }

    fn index(&self) -> &str {
        self.1.as_ref()
    }
}

impl<T: VarRecord + ?Sized> VarRecord for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn index(&self) -> &str {
        (**self).index()
    }
}

/// One segment of the dotted hierarchy.
///
/// Structural attributes (`key`, `long_key`, `index`, children) are owned
/// by the [`Tree`] and read through accessors. The enrichment attributes
/// filled by the join and binding passes are public.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Node {
    key: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    long_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<String>,

    /// Measurement joined from the value query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    /// Unit joined from the unit query, absent for unitless variables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Machine this subtree is bound to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    children: Vec<Node>,

    #[serde(skip)]
    slots: HashMap<String, usize>,
}

impl Node {
    /// Create a detached node with no attributes
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// Segment this node stands for
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Full dotted name, set on leaves only
    pub fn long_key(&self) -> Option<&str> {
        self.long_key.as_deref()
    }

    /// Backend index, set on leaves only
    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// Children in first-seen order
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Direct child with the given key
    pub fn child(&self, key: &str) -> Option<&Node> {
        self.slots.get(key).map(|&position| &self.children[position])
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of childless nodes under (and including) this one
    pub fn leaf_count(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            self.children.iter().map(Node::leaf_count).sum()
        }
    }

    /// Pre-order search for the first node with `key`, this node included.
    pub fn find_by_key(&self, key: &str) -> Option<&Node> {
        if self.key == key {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_by_key(key))
    }

    /// Mutable variant of [`Node::find_by_key`].
    pub fn find_by_key_mut(&mut self, key: &str) -> Option<&mut Node> {
        if self.key == key {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_by_key_mut(key))
    }

    pub(crate) fn children_mut(&mut self) -> &mut [Node] {
        &mut self.children
    }

    /// Position of the child named `key`, appending it if absent.
    fn child_position_or_insert(&mut self, key: &str) -> usize {
        if let Some(&position) = self.slots.get(key) {
            return position;
        }
        let position = self.children.len();
        self.children.push(Node::new(key));
        self.slots.insert(key.to_string(), position);
        position
    }
}

/// A record [`Tree::build_lenient`] left out
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub name: String,
    pub index: String,
    pub error: Error,
}

/// Outcome of [`Tree::build_lenient`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    /// Records accepted, including same-path overwrites
    pub inserted: usize,
    pub rejected: Vec<Rejected>,
}

impl BuildReport {
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Rooted variable hierarchy for one poll cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    root: Node,
    /// index -> child positions from the root down to the leaf
    leaves: HashMap<String, Vec<usize>>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Create an empty tree holding only the root
    pub fn new() -> Self {
        Self {
            root: Node::new(ROOT_KEY),
            leaves: HashMap::new(),
        }
    }

    /// Fold records into a fresh tree.
    ///
    /// Fails on the first malformed name or structural conflict; see
    /// [`Tree::insert`].
    pub fn build<I>(records: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: VarRecord,
    {
        let mut tree = Self::new();
        for record in records {
            tree.insert(record.name(), record.index())?;
        }
        Ok(tree)
    }

    /// Fold records into a fresh tree, leaving out the ones that fail.
    ///
    /// A rejected record never touches the tree, so the result is the tree
    /// the remaining records would have built on their own.
    pub fn build_lenient<I>(records: I) -> (Self, BuildReport)
    where
        I: IntoIterator,
        I::Item: VarRecord,
    {
        let mut tree = Self::new();
        let mut report = BuildReport::default();
        for record in records {
            match tree.insert(record.name(), record.index()) {
                Ok(()) => report.inserted += 1,
                Err(error) => report.rejected.push(Rejected {
                    name: record.name().to_string(),
                    index: record.index().to_string(),
                    error,
                }),
            }
        }
        (tree, report)
    }

    /// Insert one variable.
    ///
    /// Reinserting an existing full name overwrites its index (last write
    /// wins). An index already held by a different name is rejected, as is
    /// a name that would hang children below a leaf or end on an interior
    /// node. Rejected records leave the tree untouched.
    pub fn insert(&mut self, name: &str, index: &str) -> Result<()> {
        let segments = name::parse(name)?;

        if let Some(existing) = self.find_by_index(index) {
            if existing.long_key() != Some(name) {
                return Err(Error::DuplicateIndex {
                    index: index.to_string(),
                    first: existing.long_key().unwrap_or_default().to_string(),
                    second: name.to_string(),
                });
            }
        }

        self.check_shape(name, &segments)?;

        let mut path = Vec::with_capacity(segments.len());
        let mut current = &mut self.root;
        for segment in &segments {
            let position = current.child_position_or_insert(segment);
            path.push(position);
            current = &mut current.children[position];
        }

        if let Some(previous) = current.index.replace(index.to_string()) {
            if previous != index {
                self.leaves.remove(&previous);
            }
        }
        current.long_key = Some(name.to_string());
        self.leaves.insert(index.to_string(), path);
        Ok(())
    }

    fn check_shape(&self, name: &str, segments: &[&str]) -> Result<()> {
        let mut current = &self.root;
        for (depth, segment) in segments.iter().enumerate() {
            let Some(child) = current.child(segment) else {
                return Ok(());
            };
            let last = depth + 1 == segments.len();
            if !last && child.index.is_some() {
                return Err(Error::ShapeConflict {
                    name: name.to_string(),
                    reason: "path passes through an existing leaf",
                });
            }
            if last && !child.is_leaf() {
                return Err(Error::ShapeConflict {
                    name: name.to_string(),
                    reason: "name ends on an interior node",
                });
            }
            current = child;
        }
        Ok(())
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    /// Number of indexed leaves
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Leaf carrying `index`, if any
    pub fn find_by_index(&self, index: &str) -> Option<&Node> {
        let path = self.leaves.get(index)?;
        path.iter()
            .try_fold(&self.root, |node, &position| node.children.get(position))
    }

    /// Mutable variant of [`Tree::find_by_index`].
    pub fn find_by_index_mut(&mut self, index: &str) -> Option<&mut Node> {
        let path = self.leaves.get(index)?;
        let mut node = &mut self.root;
        for &position in path {
            node = node.children.get_mut(position)?;
        }
        Some(node)
    }

    /// First node named `key` in pre-order, root included
    pub fn find_by_key(&self, key: &str) -> Option<&Node> {
        self.root.find_by_key(key)
    }

    pub fn find_by_key_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.root.find_by_key_mut(key)
    }

    /// Pretty JSON rendering of the whole tree.
    ///
    /// Unset attributes are omitted; `children` is always present.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.root)
    }
}
