//! Multi-column index trees for Lattice.
//!
//! This crate provides:
//! - A persistent weighted AVL map used for every level of an index
//! - Column domains: ordering, null placement and key generation per column
//! - `MTree`, the immutable composite-key index with duplicate policies
//! - Cursors with seek, tie-group and rank support for merge joins
//! - `IndexHandle`, a lock-protected pointer to the current index version

mod domain;
mod dupset;
mod handle;
mod mtree;
mod ordmap;

pub use domain::{ColumnDomain, ColumnSchema};
pub use dupset::{DupPosition, DuplicateSet};
pub use handle::IndexHandle;
pub use mtree::{Branch, MTree, MTreeCursor, MTreeIter};
pub use ordmap::{Bookmark, Iter, KeyOrder, Natural, PersistentMap, Weighted};

pub use lattice_common::{
    DuplicatePolicy, IndexConfig, InsertOutcome, LatticeError, Rejection, Result, RowId, TypeId,
    Value,
};
