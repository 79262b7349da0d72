// CMCVAR - CMC III variable hierarchy engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for CMCVAR
//!
//! This module defines all error types used throughout the library.

use std::fmt;
use thiserror::Error;

/// Result type alias for CMCVAR operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which joined attribute an error or report refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Numeric measurement from the value query
    Value,
    /// Unit label from the unit query
    Unit,
}

impl Attribute {
    /// Label value used in logs and exporter metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Value => "value",
            Attribute::Unit => "unit",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for CMCVAR operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed dotted variable name
    #[error("Invalid variable name: {0}")]
    Name(#[from] NameError),

    /// Two different paths claim the same backend index
    #[error("Index {index} is used by both {first} and {second}")]
    DuplicateIndex {
        index: String,
        first: String,
        second: String,
    },

    /// A record would turn a leaf into an interior node or the reverse
    #[error("Shape conflict at {name}: {reason}")]
    ShapeConflict { name: String, reason: &'static str },

    /// A joined record points at an index no leaf carries
    #[error("No node carries index {index} (joining {attribute})")]
    JoinNotFound { attribute: Attribute, index: String },

    /// A value sample could not be read as a number
    #[error("Invalid value {raw:?} for index {index}")]
    InvalidValue { index: String, raw: String },

    /// The configured top-level section is absent from the tree
    #[error("Section not found: {0}")]
    SectionNotFound(String),

    /// Bindings configuration missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors while splitting a dotted variable name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// Nothing to split
    #[error("empty name")]
    Empty,

    /// Leading, trailing or doubled dot
    #[error("empty segment at position {position} in {name:?}")]
    EmptySegment { name: String, position: usize },
}
