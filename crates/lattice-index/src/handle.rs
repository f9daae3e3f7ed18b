//! Shared, mutable handle to the current version of an index.

use crate::mtree::MTree;
use lattice_common::{IndexConfig, InsertOutcome, Result, RowId, Value};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Publishes successive [`MTree`] versions to concurrent readers.
///
/// Readers take a [`snapshot`](Self::snapshot) and work on it without
/// holding any lock. Writers are serialized by the write lock; each write
/// computes a new tree from the current one and installs it.
pub struct IndexHandle {
    name: String,
    root: RwLock<MTree>,
    /// Number of versions published so far.
    generation: AtomicU64,
}

impl IndexHandle {
    pub fn new(name: impl Into<String>, tree: MTree) -> Self {
        Self {
            name: name.into(),
            root: RwLock::new(tree),
            generation: AtomicU64::new(0),
        }
    }

    /// Creates a handle to an empty index described by `config`.
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        Ok(Self::new(config.name.clone(), MTree::from_config(config)?))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of versions published since creation.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns the current version.
    pub fn snapshot(&self) -> MTree {
        self.root.read().clone()
    }

    pub fn count(&self) -> u64 {
        self.root.read().count()
    }

    fn publish(&self, root: &mut MTree, tree: MTree) {
        *root = tree;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(
            index = %self.name,
            generation,
            count = root.count(),
            "published index version"
        );
    }

    /// Offers (key, row); publishes a new version if it was inserted.
    pub fn insert(&self, key: &[Value], row: RowId) -> InsertOutcome {
        let mut root = self.root.write();
        let (tree, outcome) = root.insert(key, row);
        if outcome.is_inserted() {
            self.publish(&mut root, tree);
        }
        outcome
    }

    /// Applies `f` to the current version and publishes its result.
    ///
    /// Nothing is published if `f` fails.
    pub fn apply<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&MTree) -> Result<MTree>,
    {
        let mut root = self.root.write();
        let tree = f(&root)?;
        if !tree.ptr_eq(&root) {
            self.publish(&mut root, tree);
        }
        Ok(())
    }

    pub fn add(&self, key: &[Value], row: RowId) -> Result<()> {
        self.apply(|tree| tree.add(key, row))
    }

    pub fn update(&self, key: &[Value], row: RowId) -> Result<()> {
        self.apply(|tree| tree.update(key, row))
    }

    pub fn replace_row(&self, key: &[Value], old: RowId, new: RowId) -> Result<()> {
        self.apply(|tree| tree.replace_row(key, old, new))
    }

    /// Removes every association under `key`. Returns how many were removed.
    pub fn remove(&self, key: &[Value]) -> u64 {
        let mut root = self.root.write();
        let tree = root.remove(key);
        let removed = root.count() - tree.count();
        if removed > 0 {
            self.publish(&mut root, tree);
        }
        removed
    }

    /// Removes (key, row). Returns true if it was present.
    pub fn remove_row(&self, key: &[Value], row: RowId) -> bool {
        let mut root = self.root.write();
        let tree = root.remove_row(key, row);
        let removed = tree.count() < root.count();
        if removed {
            self.publish(&mut root, tree);
        }
        removed
    }

    /// Installs `tree` only if the current version is still `expected`.
    ///
    /// For writers that built `tree` from a snapshot outside the lock.
    /// Returns false, publishing nothing, if another version was published
    /// in the meantime.
    pub fn publish_if(&self, expected: &MTree, tree: MTree) -> bool {
        let mut root = self.root.write();
        if !root.ptr_eq(expected) {
            debug!(index = %self.name, "stale publish rejected");
            return false;
        }
        self.publish(&mut root, tree);
        true
    }
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("name", &self.name)
            .field("generation", &self.generation())
            .field("count", &self.count())
            .finish()
    }
}
