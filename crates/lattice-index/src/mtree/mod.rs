//! Persistent composite-key index tree.
//!
//! One [`MTree`] node indexes one key column. Its branches are kept in a
//! [`PersistentMap`] ordered by that column's [`ColumnDomain`]; each branch
//! either nests the tree for the next column or, at the last column, holds
//! the row ids for the full key.
//!
//! ```text
//!   level 0 (customer)      level 1 (date)          payload
//!   ┌──────────────┐
//!   │ 17 ──────────┼──────► ┌──────────────┐
//!   │              │        │ 2024-01-03 ──┼──────► {r4, r9}   Duplicates
//!   │              │        │ 2024-02-11 ──┼──────► {r2}
//!   │ 42 ──────────┼──────► └──────────────┘
//!   └──────────────┘        ...
//! ```
//!
//! Trees are immutable values. Every mutation returns a new root that shares
//! all untouched subtrees with the old one, so readers holding an old root
//! (or a cursor into it) are never disturbed.

pub mod cursor;

pub use cursor::{MTreeCursor, MTreeIter};

use crate::domain::{ColumnDomain, ColumnSchema};
use crate::dupset::DuplicateSet;
use crate::ordmap::{PersistentMap, Weighted};
use lattice_common::{
    DuplicatePolicy, IndexConfig, InsertOutcome, LatticeError, Rejection, Result, RowId,
    SortDirection, Value,
};
use std::sync::Arc;
use tracing::trace;

/// What a key value at one level leads to.
#[derive(Clone)]
pub enum Branch {
    /// Tree for the next column.
    Nested(Arc<MTree>),
    /// Rows sharing a full key, under `DuplicatePolicy::Allow`.
    Duplicates(DuplicateSet),
    /// The single row of a full key.
    Singleton(RowId),
}

impl Weighted for Branch {
    #[inline]
    fn weight(&self) -> u64 {
        match self {
            Branch::Nested(child) => child.count(),
            Branch::Duplicates(rows) => rows.len(),
            Branch::Singleton(_) => 1,
        }
    }
}

impl std::fmt::Debug for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Branch::Nested(child) => child.branches.fmt(f),
            Branch::Duplicates(rows) => rows.fmt(f),
            Branch::Singleton(row) => write!(f, "{}", row),
        }
    }
}

type Branches = PersistentMap<Value, Branch, ColumnDomain>;

/// One level of a composite-key index.
#[derive(Clone)]
pub struct MTree {
    schema: Arc<ColumnSchema>,
    policy: DuplicatePolicy,
    level: usize,
    branches: Branches,
}

impl MTree {
    /// Creates an empty index over `schema`.
    pub fn new(schema: Arc<ColumnSchema>, policy: DuplicatePolicy) -> Self {
        Self::at_level(schema, policy, 0)
    }

    /// Creates an empty index from a validated configuration.
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        let schema = ColumnSchema::from_config(config)?;
        Ok(Self::new(Arc::new(schema), config.policy))
    }

    fn at_level(schema: Arc<ColumnSchema>, policy: DuplicatePolicy, level: usize) -> Self {
        let domain = schema.column(level);
        Self {
            schema,
            policy,
            level,
            branches: PersistentMap::new(domain),
        }
    }

    fn empty_child(&self) -> Self {
        Self::at_level(Arc::clone(&self.schema), self.policy, self.level + 1)
    }

    fn cleared(&self) -> Self {
        Self::at_level(Arc::clone(&self.schema), self.policy, self.level)
    }

    fn with_branches(&self, branches: Branches) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            policy: self.policy,
            level: self.level,
            branches,
        }
    }

    /// Number of associations below this node.
    #[inline]
    pub fn count(&self) -> u64 {
        self.branches.weight()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Number of key columns of the index.
    #[inline]
    pub fn arity(&self) -> usize {
        self.schema.arity()
    }

    /// Column indexed by this node.
    #[inline]
    pub fn level(&self) -> usize {
        self.level
    }

    #[inline]
    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    pub fn schema(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    /// Domain of the column indexed by this node.
    #[inline]
    pub fn domain(&self) -> ColumnDomain {
        *self.branches.order()
    }

    /// Number of distinct values at this level.
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub(crate) fn branches(&self) -> &Branches {
        &self.branches
    }

    #[inline]
    fn is_terminal(&self) -> bool {
        self.level + 1 == self.schema.arity()
    }

    /// Returns true if `other` is this very version of the tree.
    pub fn ptr_eq(&self, other: &MTree) -> bool {
        Arc::ptr_eq(&self.schema, &other.schema)
            && self.level == other.level
            && self.branches.ptr_eq(&other.branches)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Returns true if the (possibly partial) key is present.
    ///
    /// A set of alternatives at a level requires every alternative to be
    /// present. An empty set is trivially satisfied.
    pub fn contains(&self, key: &[Value]) -> bool {
        match key.get(self.level) {
            None => !self.is_empty(),
            Some(Value::Set(alternatives)) => alternatives
                .iter()
                .all(|head| self.contains_under(head, key)),
            Some(head) => self.contains_under(head, key),
        }
    }

    fn contains_under(&self, head: &Value, key: &[Value]) -> bool {
        match self.branches.get(head) {
            None => false,
            Some(Branch::Nested(child)) => child.contains(key),
            Some(_) => true,
        }
    }

    /// Returns true if the full `key` is associated with `row`.
    pub fn contains_row(&self, key: &[Value], row: RowId) -> bool {
        let Some(head) = key.get(self.level) else {
            return false;
        };
        match self.branches.get(head) {
            None => false,
            Some(Branch::Nested(child)) => child.contains_row(key, row),
            Some(Branch::Duplicates(rows)) => rows.contains(row),
            Some(Branch::Singleton(r)) => *r == row,
        }
    }

    /// Returns a row under `key`.
    ///
    /// For duplicates this is the smallest row id. A partial key yields the
    /// first row of its subtree in iteration order.
    pub fn get(&self, key: &[Value]) -> Option<RowId> {
        match key.get(self.level) {
            None => self.first().map(|c| c.value()),
            Some(Value::Set(alternatives)) => alternatives
                .iter()
                .find_map(|head| self.get_under(head, key)),
            Some(head) => self.get_under(head, key),
        }
    }

    fn get_under(&self, head: &Value, key: &[Value]) -> Option<RowId> {
        match self.branches.get(head)? {
            Branch::Nested(child) => child.get(key),
            Branch::Duplicates(rows) => rows.first(),
            Branch::Singleton(row) => Some(*row),
        }
    }

    /// Number of associations matching `filter`.
    ///
    /// Nulls in the filter are wildcards; `None` matches everything. A set of
    /// alternatives sums the matches of each alternative.
    pub fn cardinality(&self, filter: Option<&[Value]>) -> u64 {
        let Some(filter) = filter else {
            return self.count();
        };
        if self.policy == DuplicatePolicy::Disallow && self.is_point_probe(filter) {
            // Keys are unique
            return u64::from(self.contains(filter));
        }
        self.filtered_count(filter)
    }

    fn is_point_probe(&self, filter: &[Value]) -> bool {
        filter.len() == self.arity()
            && filter
                .iter()
                .all(|v| !v.is_null() && !matches!(v, Value::Set(_)))
    }

    fn filtered_count(&self, filter: &[Value]) -> u64 {
        let rest = filter.get(self.level..).unwrap_or(&[]);
        if rest.iter().all(Value::is_null) {
            return self.count();
        }
        match &rest[0] {
            Value::Null => self
                .branches
                .iter()
                .map(|(_, branch)| contribution(branch, filter))
                .sum(),
            Value::Set(alternatives) => alternatives
                .iter()
                .map(|head| self.bound_count(head, filter))
                .sum(),
            head => self.bound_count(head, filter),
        }
    }

    fn bound_count(&self, head: &Value, filter: &[Value]) -> u64 {
        self.branches
            .get(head)
            .map_or(0, |branch| contribution(branch, filter))
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Offers (key, row) to the index.
    ///
    /// Returns the new tree and what happened. Unless the outcome is
    /// `Inserted` the returned tree is this one.
    pub fn insert(&self, key: &[Value], row: RowId) -> (MTree, InsertOutcome) {
        if let Err(rejection) = self.check_key(key) {
            trace!(%rejection, row = row.as_u64(), "insert rejected");
            return (self.clone(), InsertOutcome::Rejected(rejection));
        }
        let (tree, outcome) = self.insert_checked(key, row);
        match outcome {
            InsertOutcome::Inserted => {}
            InsertOutcome::Ignored => trace!(row = row.as_u64(), "insert ignored"),
            InsertOutcome::Rejected(rejection) => {
                trace!(%rejection, row = row.as_u64(), "insert rejected")
            }
        }
        (tree, outcome)
    }

    /// Like [`insert`](Self::insert), but a rejection is an error.
    /// An ignored duplicate is not.
    pub fn add(&self, key: &[Value], row: RowId) -> Result<MTree> {
        match self.insert(key, row) {
            (_, InsertOutcome::Rejected(rejection)) => Err(rejection.into()),
            (tree, _) => Ok(tree),
        }
    }

    fn check_key(&self, key: &[Value]) -> std::result::Result<(), Rejection> {
        let arity = self.arity();
        if key.len() != arity {
            return Err(Rejection::KeyArity {
                expected: arity,
                actual: key.len(),
            });
        }
        for (column, (value, domain)) in key.iter().zip(self.schema.columns()).enumerate() {
            match value {
                Value::Set(_) => return Err(Rejection::SetValue { column }),
                Value::Null if !self.policy.admits_nulls() => {
                    return Err(Rejection::NullKey { column });
                }
                v if !domain.admits(v) => {
                    return Err(Rejection::TypeMismatch {
                        column,
                        expected: domain.type_id,
                        actual: v.type_id(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn insert_checked(&self, key: &[Value], row: RowId) -> (MTree, InsertOutcome) {
        let head = &key[self.level];
        let branch = match self.branches.get(head) {
            Some(Branch::Nested(child)) => {
                let (child, outcome) = child.insert_checked(key, row);
                if !outcome.is_inserted() {
                    return (self.clone(), outcome);
                }
                Branch::Nested(Arc::new(child))
            }
            Some(Branch::Duplicates(rows)) => {
                if rows.contains(row) {
                    return (self.clone(), InsertOutcome::Ignored);
                }
                Branch::Duplicates(rows.insert(row))
            }
            Some(Branch::Singleton(_)) => {
                let outcome = match self.policy {
                    DuplicatePolicy::Ignore => InsertOutcome::Ignored,
                    _ => InsertOutcome::Rejected(Rejection::DuplicateKey),
                };
                return (self.clone(), outcome);
            }
            None => self.fresh_branch(key, row),
        };
        let branches = self.branches.insert(head.clone(), branch);
        (self.with_branches(branches), InsertOutcome::Inserted)
    }

    /// Builds the chain of branches for the columns below this level.
    fn fresh_branch(&self, key: &[Value], row: RowId) -> Branch {
        if self.is_terminal() {
            if self.policy.allows_duplicates() {
                Branch::Duplicates(DuplicateSet::single(row))
            } else {
                Branch::Singleton(row)
            }
        } else {
            let (child, _) = self.empty_child().insert_checked(key, row);
            Branch::Nested(Arc::new(child))
        }
    }

    /// Replaces the row stored under a full key.
    ///
    /// Fails with `KeyNotFound` if the key is absent and with
    /// `AmbiguousUpdate` if it holds more than one row.
    pub fn update(&self, key: &[Value], row: RowId) -> Result<MTree> {
        let arity = self.arity();
        if key.len() != arity {
            return Err(LatticeError::KeyArity {
                expected: arity,
                actual: key.len(),
            });
        }
        self.update_checked(key, row)
    }

    fn update_checked(&self, key: &[Value], row: RowId) -> Result<MTree> {
        let head = &key[self.level];
        let branch = match self.branches.get(head) {
            None => return Err(LatticeError::KeyNotFound),
            Some(Branch::Nested(child)) => {
                Branch::Nested(Arc::new(child.update_checked(key, row)?))
            }
            Some(Branch::Singleton(_)) => Branch::Singleton(row),
            Some(Branch::Duplicates(rows)) if rows.len() == 1 => {
                Branch::Duplicates(DuplicateSet::single(row))
            }
            Some(Branch::Duplicates(rows)) => {
                return Err(LatticeError::AmbiguousUpdate { rows: rows.len() });
            }
        };
        Ok(self.with_branches(self.branches.insert(head.clone(), branch)))
    }

    /// Moves one association of `key` from row `old` to row `new`.
    pub fn replace_row(&self, key: &[Value], old: RowId, new: RowId) -> Result<MTree> {
        if !self.contains_row(key, old) {
            return Err(LatticeError::KeyNotFound);
        }
        if old == new {
            return Ok(self.clone());
        }
        if self.contains_row(key, new) {
            return Err(LatticeError::DuplicateKey);
        }
        self.remove_row(key, old).add(key, new)
    }

    /// Removes every association under `key`.
    ///
    /// A partial key removes its whole subtree. Absent keys are a no-op.
    pub fn remove(&self, key: &[Value]) -> MTree {
        let Some(head) = key.get(self.level) else {
            return self.cleared();
        };
        let branches = match self.branches.get(head) {
            None => return self.clone(),
            Some(Branch::Nested(child)) => {
                let reduced = child.remove(key);
                if reduced.count() == child.count() {
                    return self.clone();
                }
                self.splice(head, reduced)
            }
            Some(_) => self.branches.remove(head),
        };
        self.with_branches(branches)
    }

    /// Removes the single association (key, row), if present.
    pub fn remove_row(&self, key: &[Value], row: RowId) -> MTree {
        let Some(head) = key.get(self.level) else {
            return self.clone();
        };
        let branches = match self.branches.get(head) {
            None => return self.clone(),
            Some(Branch::Nested(child)) => {
                let reduced = child.remove_row(key, row);
                if reduced.count() == child.count() {
                    return self.clone();
                }
                self.splice(head, reduced)
            }
            Some(Branch::Duplicates(rows)) => {
                if !rows.contains(row) {
                    return self.clone();
                }
                let rows = rows.remove(row);
                if rows.is_empty() {
                    self.branches.remove(head)
                } else {
                    self.branches.insert(head.clone(), Branch::Duplicates(rows))
                }
            }
            Some(Branch::Singleton(r)) if *r == row => self.branches.remove(head),
            Some(Branch::Singleton(_)) => return self.clone(),
        };
        self.with_branches(branches)
    }

    /// Branch map with `child` under `head`; empty children are dropped.
    fn splice(&self, head: &Value, child: MTree) -> Branches {
        if child.is_empty() {
            self.branches.remove(head)
        } else {
            self.branches
                .insert(head.clone(), Branch::Nested(Arc::new(child)))
        }
    }

    // =========================================================================
    // Key generation
    // =========================================================================

    /// Generates a value for column `target` that is greater than every value
    /// stored there under the prefix `key[..target]`.
    ///
    /// Used to fill in a null key component with a fresh surrogate.
    pub fn next_key(&self, key: &[Value], target: usize) -> Result<Value> {
        if target < self.level || target >= self.arity() {
            return Err(LatticeError::InvalidParameter {
                name: "target".to_string(),
                value: target.to_string(),
            });
        }
        let value = self.next_key_at(key, target)?;
        trace!(column = target, %value, "generated key");
        Ok(value)
    }

    fn next_key_at(&self, key: &[Value], target: usize) -> Result<Value> {
        if self.level < target {
            let head = key.get(self.level).ok_or(LatticeError::KeyArity {
                expected: target,
                actual: key.len(),
            })?;
            return match self.branches.get(head) {
                Some(Branch::Nested(child)) => child.next_key_at(key, target),
                Some(_) => panic!("terminal branch above column {}", target),
                None => self.empty_child().next_key_at(key, target),
            };
        }
        let domain = self.domain();
        match self.natural_max() {
            Some(max) => domain.successor(&max),
            None => domain.seed(),
        }
    }

    /// Largest non-null key at this level in natural value order.
    fn natural_max(&self) -> Option<Value> {
        let descending = self.domain().direction == SortDirection::Descending;
        let mut bookmark = if descending {
            self.branches.first()
        } else {
            self.branches.last()
        };
        while let Some(b) = bookmark {
            if !b.key().is_null() {
                return Some(b.key().clone());
            }
            bookmark = if descending { b.next() } else { b.prev() };
        }
        None
    }

    // =========================================================================
    // Cursors
    // =========================================================================

    /// Cursor at the first association in iteration order.
    pub fn first(&self) -> Option<MTreeCursor> {
        MTreeCursor::first(self)
    }

    /// Cursor at the last association in iteration order.
    pub fn last(&self) -> Option<MTreeCursor> {
        MTreeCursor::last(self)
    }

    /// Cursor at the first association at or after `key`.
    ///
    /// Null components are wildcards. See [`MTreeCursor`] for how deeper
    /// components constrain the scan.
    pub fn position_at(&self, key: &[Value]) -> Option<MTreeCursor> {
        MTreeCursor::position_at(self, key)
    }

    /// Iterates all (key, row) associations in order.
    pub fn iter(&self) -> MTreeIter {
        MTreeIter::new(self.first())
    }
}

fn contribution(branch: &Branch, filter: &[Value]) -> u64 {
    match branch {
        Branch::Nested(child) => child.filtered_count(filter),
        Branch::Duplicates(rows) => rows.len(),
        Branch::Singleton(_) => 1,
    }
}

impl std::fmt::Debug for MTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MTree")
            .field("level", &self.level)
            .field("policy", &self.policy)
            .field("count", &self.count())
            .field("branches", &self.branches)
            .finish()
    }
}
