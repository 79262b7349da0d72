// CMCVAR - CMC III variable hierarchy engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Socket-to-machine bindings
//!
//! Each binding names a socket number and the machine plugged into it. A
//! slot node under the sockets section is bound when the socket number,
//! zero-padded to two digits, occurs anywhere in its key. Matching is by
//! substring so `01`, `Socket 01` and `Outlet01` all bind socket 1; it also
//! means socket 1 binds a slot keyed `101`. Two digits is the upstream
//! naming contract.

use crate::error::{Error, Result};
use crate::tree::Node;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Width the socket number is padded to before matching
pub const SLOT_TAG_WIDTH: usize = 2;

/// One configured socket binding
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Binding {
    /// Socket number as printed on the PDU
    pub socket: u32,
    /// Machine plugged into that socket
    pub node: String,
}

impl Binding {
    pub fn new(socket: u32, node: impl Into<String>) -> Self {
        Self {
            socket,
            node: node.into(),
        }
    }

    /// Zero-padded socket number searched for in slot keys
    pub fn slot_tag(&self) -> String {
        format!("{:0width$}", self.socket, width = SLOT_TAG_WIDTH)
    }
}

/// Bindings configuration file
///
/// ```json
/// {"bindings": [{"socket": 1, "node": "rack-a"}]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BindingsFile {
    pub bindings: Vec<Binding>,
}

impl BindingsFile {
    /// Read and parse a bindings file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text).map_err(|e| match e {
            Error::Config(reason) => Error::Config(format!("{}: {}", path.display(), reason)),
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
}

/// A slot matched by more than one binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub key: String,
    /// Entity set by the earlier binding
    pub replaced: String,
    /// Entity the slot ends up with
    pub entity: String,
}

/// Result of [`bind`]
#[derive(Debug)]
pub struct BindOutcome<'a> {
    /// Bound slots in first-match order, each carrying its entity
    pub slots: Vec<&'a Node>,
    pub collisions: Vec<Collision>,
}

/// Bind the section's immediate children to machines.
///
/// Bindings are applied in order, candidates in tree order. A slot matched
/// by several bindings keeps the last one and is listed once, at the
/// position of its first match.
pub fn bind<'a>(section: &'a mut Node, bindings: &[Binding]) -> BindOutcome<'a> {
    let mut order: Vec<usize> = Vec::new();
    let mut collisions = Vec::new();

    for binding in bindings {
        let tag = binding.slot_tag();
        for (position, slot) in section.children_mut().iter_mut().enumerate() {
            if !slot.key().contains(&tag) {
                continue;
            }
            if order.contains(&position) {
                if let Some(replaced) = slot.entity.as_deref().filter(|e| *e != binding.node) {
                    collisions.push(Collision {
                        key: slot.key().to_string(),
                        replaced: replaced.to_string(),
                        entity: binding.node.clone(),
                    });
                }
            } else {
                order.push(position);
            }
            slot.entity = Some(binding.node.clone());
        }
    }

    let section: &'a Node = section;
    BindOutcome {
        slots: order.into_iter().map(|p| &section.children()[p]).collect(),
        collisions,
    }
}
