// CMCVAR - CMC III variable hierarchy engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Attribute joins
//!
//! Values and units arrive from separate queries keyed by the backend index.
//! Each join resolves every sample's index to its leaf and sets one attribute
//! in place. Joins are order-independent: every index touches exactly one
//! leaf.

use crate::error::{Attribute, Error, Result};
use crate::record::{UnitSample, ValueSample};
use crate::tree::Tree;

/// What to do with a sample that cannot be joined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinPolicy {
    /// Abort on the first unknown index or unreadable value
    FailFast,
    /// Skip the sample, record it in the report and keep going
    #[default]
    SkipMissing,
}

/// Outcome of one join pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinReport {
    pub attribute: Attribute,
    /// Samples written to a leaf
    pub applied: usize,
    /// Indices with no matching leaf
    pub missing: Vec<String>,
    /// Indices whose value could not be parsed
    pub invalid: Vec<String>,
}

impl JoinReport {
    fn new(attribute: Attribute) -> Self {
        Self {
            attribute,
            applied: 0,
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }

    /// Number of samples that were dropped
    pub fn skipped(&self) -> usize {
        self.missing.len() + self.invalid.len()
    }

    pub fn is_complete(&self) -> bool {
        self.skipped() == 0
    }
}

/// Set `value` on every leaf named by a value sample.
pub fn join_values(tree: &mut Tree, samples: &[ValueSample], policy: JoinPolicy) -> Result<JoinReport> {
    let mut report = JoinReport::new(Attribute::Value);

    for sample in samples {
        let Some(value) = sample.parse() else {
            if policy == JoinPolicy::FailFast {
                return Err(Error::InvalidValue {
                    index: sample.index().to_string(),
                    raw: sample.raw().to_string(),
                });
            }
            report.invalid.push(sample.index().to_string());
            continue;
        };

        match tree.find_by_index_mut(sample.index()) {
            Some(node) => {
                node.value = Some(value);
                report.applied += 1;
            }
            None => missing(&mut report, sample.index(), policy)?,
        }
    }

    Ok(report)
}

/// Set `unit` on every leaf named by a unit sample that carries one.
///
/// Samples without a unit label are ignored; most variables are unitless.
pub fn join_units(tree: &mut Tree, samples: &[UnitSample], policy: JoinPolicy) -> Result<JoinReport> {
    let mut report = JoinReport::new(Attribute::Unit);

    for sample in samples {
        let Some(unit) = sample.unit() else {
            continue;
        };

        match tree.find_by_index_mut(sample.index()) {
            Some(node) => {
                node.unit = Some(unit.to_string());
                report.applied += 1;
            }
            None => missing(&mut report, sample.index(), policy)?,
        }
    }

    Ok(report)
}

fn missing(report: &mut JoinReport, index: &str, policy: JoinPolicy) -> Result<()> {
    match policy {
        JoinPolicy::FailFast => Err(Error::JoinNotFound {
            attribute: report.attribute,
            index: index.to_string(),
        }),
        JoinPolicy::SkipMissing => {
            report.missing.push(index.to_string());
            Ok(())
        }
    }
}
