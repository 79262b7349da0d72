// CMCVAR - CMC III variable hierarchy engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # CMCVAR - CMC III variable hierarchy engine
//!
//! Rebuilds the dotted variable hierarchy of a Rittal CMC III device from
//! Prometheus series, attaches values and units, binds socket slots to the
//! machines plugged into them and flattens each bound slot into labeled leaf
//! records ready to be re-exported.
//!
//! ## Quick Start
//!
//! ```rust
//! use cmcvar::{assemble, AssembleOptions, Binding, CycleInput, SeriesRecord, UnitSample, ValueSample};
//!
//! let input = CycleInput {
//!     series: vec![
//!         SeriesRecord::new("A.B.Sockets.01.Temperature", "idx1"),
//!         SeriesRecord::new("A.B.Sockets.01.Power", "idx2"),
//!     ],
//!     values: vec![ValueSample::new("idx1", "42"), ValueSample::new("idx2", "7")],
//!     units: vec![UnitSample::new("idx2", Some("W"))],
//!     bindings: vec![Binding::new(1, "n1")],
//! };
//!
//! let assembly = assemble(&input, &AssembleOptions::default()).unwrap();
//! assert_eq!(assembly.leaves.len(), 2);
//! assert_eq!(assembly.leaves[1].unit.as_deref(), Some("W"));
//! assert_eq!(assembly.leaves[1].entity.as_deref(), Some("n1"));
//! ```
//!
//! ## Modules
//!
//! - [`name`]: Dotted name parsing
//! - [`tree`]: Hierarchy nodes and builder
//! - [`join`]: Value and unit joins by backend index
//! - [`binding`]: Socket-to-machine bindings
//! - [`flatten`]: Leaf expansion with entity propagation
//! - [`record`]: Prometheus API response shapes
//! - [`pipeline`]: One full cycle over fetched data

// Modules
pub mod binding;
pub mod error;
pub mod flatten;
pub mod join;
pub mod name;
pub mod pipeline;
pub mod record;
pub mod tree;

// Re-exports for convenient access
pub use binding::{bind, BindOutcome, Binding, BindingsFile, Collision};
pub use error::{Attribute, Error, NameError, Result};
pub use flatten::{flatten, flatten_all, LeafRecord};
pub use join::{join_units, join_values, JoinPolicy, JoinReport};
pub use pipeline::{assemble, AssembleOptions, Assembly, CycleInput, DEFAULT_SECTION};
pub use record::{Envelope, QueryData, SeriesRecord, UnitSample, ValueSample};
pub use tree::{BuildReport, Node, Rejected, Tree, VarRecord, ROOT_KEY};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
