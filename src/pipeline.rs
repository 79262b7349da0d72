// CMCVAR - CMC III variable hierarchy engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! One poll cycle, without I/O
//!
//! `assemble` takes the three fetched datasets and the bindings and runs
//! build → join values → join units → section lookup → bind → flatten.
//! Either every step succeeds and the caller gets the full set of leaves,
//! or nothing is returned to export. Under [`JoinPolicy::SkipMissing`] a
//! series record that does not fit the tree is left out and reported
//! instead of failing the build.

use crate::binding::{bind, Binding, Collision};
use crate::error::{Error, Result};
use crate::flatten::{flatten_all, LeafRecord};
use crate::join::{join_units, join_values, JoinPolicy, JoinReport};
use crate::record::{SeriesRecord, UnitSample, ValueSample};
use crate::tree::{BuildReport, Tree};

/// Top-level key of the section holding the socket slots
pub const DEFAULT_SECTION: &str = "Sockets";

/// Tuning for [`assemble`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Key of the section whose children are the bindable slots
    pub section_key: String,
    /// Handling of series records and samples that do not fit
    pub join_policy: JoinPolicy,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            section_key: DEFAULT_SECTION.to_string(),
            join_policy: JoinPolicy::SkipMissing,
        }
    }
}

/// Everything fetched for one cycle
#[derive(Debug, Clone, Default)]
pub struct CycleInput {
    pub series: Vec<SeriesRecord>,
    pub values: Vec<ValueSample>,
    pub units: Vec<UnitSample>,
    pub bindings: Vec<Binding>,
}

/// Result of a successful cycle
#[derive(Debug)]
pub struct Assembly {
    /// Enriched tree, kept for inspection
    pub tree: Tree,
    /// Series records left out of the tree
    pub build: BuildReport,
    /// Leaves of every bound slot, in slot order
    pub leaves: Vec<LeafRecord>,
    pub values: JoinReport,
    pub units: JoinReport,
    /// Keys of the bound slots, in slot order
    pub slots: Vec<String>,
    pub collisions: Vec<Collision>,
}

/// Run one cycle over already-fetched data.
pub fn assemble(input: &CycleInput, options: &AssembleOptions) -> Result<Assembly> {
    let (mut tree, build) = match options.join_policy {
        JoinPolicy::FailFast => {
            let tree = Tree::build(&input.series)?;
            let report = BuildReport {
                inserted: input.series.len(),
                rejected: Vec::new(),
            };
            (tree, report)
        }
        JoinPolicy::SkipMissing => Tree::build_lenient(&input.series),
    };

    let values = join_values(&mut tree, &input.values, options.join_policy)?;
    let units = join_units(&mut tree, &input.units, options.join_policy)?;

    let section = tree
        .find_by_key_mut(&options.section_key)
        .ok_or_else(|| Error::SectionNotFound(options.section_key.clone()))?;
    let outcome = bind(section, &input.bindings);

    let slots = outcome.slots.iter().map(|n| n.key().to_string()).collect();
    let leaves = flatten_all(outcome.slots.iter().copied());
    let collisions = outcome.collisions;

    Ok(Assembly {
        tree,
        build,
        leaves,
        values,
        units,
        slots,
        collisions,
    })
}
