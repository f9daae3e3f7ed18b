//! Lattice common types, errors, and configuration.
//!
//! This crate provides shared definitions used by the Lattice index crates.

pub mod config;
pub mod error;
pub mod policy;
pub mod types;

pub use config::{ColumnConfig, IndexConfig, NullOrder, SortDirection};
pub use error::{LatticeError, Result};
pub use policy::{DuplicatePolicy, InsertOutcome, Rejection};
pub use types::{RowId, TypeId, Value};
