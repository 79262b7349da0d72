// CMCVAR - CMC III variable hierarchy engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Leaf flattening
//!
//! Expands a bound slot into the list of its leaves. The slot's entity is
//! handed down the walk as a parameter, so every record comes out labeled
//! with it whatever the leaf node itself holds, and the tree is left as is.

use crate::tree::Node;
use serde::Serialize;

/// Owned snapshot of one leaf, ready for export
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeafRecord {
    pub key: String,
    pub long_key: Option<String>,
    pub index: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub entity: Option<String>,
}

impl LeafRecord {
    fn from_node(node: &Node, entity: Option<&str>) -> Self {
        Self {
            key: node.key().to_string(),
            long_key: node.long_key().map(str::to_string),
            index: node.index().map(str::to_string),
            value: node.value,
            unit: node.unit.clone(),
            entity: entity.map(str::to_string),
        }
    }
}

/// Leaves under `root` in tree order, labeled with `root`'s entity.
///
/// A childless `root` yields itself.
pub fn flatten(root: &Node) -> Vec<LeafRecord> {
    let mut leaves = Vec::with_capacity(root.leaf_count());
    walk(root, root.entity.as_deref(), &mut leaves);
    leaves
}

/// [`flatten`] every slot, concatenated in slot order
pub fn flatten_all<'a, I>(slots: I) -> Vec<LeafRecord>
where
    I: IntoIterator<Item = &'a Node>,
{
    slots.into_iter().flat_map(flatten).collect()
}

fn walk(node: &Node, entity: Option<&str>, leaves: &mut Vec<LeafRecord>) {
    if node.is_leaf() {
        leaves.push(LeafRecord::from_node(node, entity));
        return;
    }
    for child in node.children() {
        walk(child, entity, leaves);
    }
}
