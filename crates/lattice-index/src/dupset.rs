//! Row sets held at a fully specified key when duplicates are allowed.

use crate::ordmap::{Bookmark, Natural, PersistentMap};
use lattice_common::RowId;

/// Persistent set of row ids, iterated in ascending row order.
#[derive(Clone)]
pub struct DuplicateSet {
    rows: PersistentMap<RowId, (), Natural>,
}

impl DuplicateSet {
    pub fn new() -> Self {
        Self {
            rows: PersistentMap::new(Natural),
        }
    }

    /// A set holding one row.
    pub fn single(row: RowId) -> Self {
        Self::new().insert(row)
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.rows.weight()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, row: RowId) -> bool {
        self.rows.contains_key(&row)
    }

    pub fn insert(&self, row: RowId) -> Self {
        Self {
            rows: self.rows.insert(row, ()),
        }
    }

    pub fn remove(&self, row: RowId) -> Self {
        Self {
            rows: self.rows.remove(&row),
        }
    }

    /// Smallest row id.
    pub fn first(&self) -> Option<RowId> {
        self.rows.first().map(|b| *b.key())
    }

    pub fn iter(&self) -> impl Iterator<Item = RowId> + '_ {
        self.rows.iter().map(|(row, _)| *row)
    }

    pub fn first_position(&self) -> Option<DupPosition> {
        self.rows.first().map(DupPosition)
    }

    pub fn last_position(&self) -> Option<DupPosition> {
        self.rows.last().map(DupPosition)
    }
}

impl Default for DuplicateSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DuplicateSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// A position inside a [`DuplicateSet`].
#[derive(Clone)]
pub struct DupPosition(Bookmark<RowId, ()>);

impl DupPosition {
    #[inline]
    pub fn row(&self) -> RowId {
        *self.0.key()
    }

    /// Number of rows before this one.
    #[inline]
    pub fn rank(&self) -> u64 {
        self.0.offset()
    }

    pub fn next(&self) -> Option<Self> {
        self.0.next().map(DupPosition)
    }

    pub fn prev(&self) -> Option<Self> {
        self.0.prev().map(DupPosition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(rows: &[u64]) -> DuplicateSet {
        rows.iter()
            .fold(DuplicateSet::new(), |s, r| s.insert(RowId(*r)))
    }

    #[test]
    fn test_insert_is_idempotent() {
        let set = set_of(&[3, 1, 3]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(RowId(1)));
        assert!(!set.contains(RowId(2)));
    }

    #[test]
    fn test_rows_iterate_ascending() {
        let set = set_of(&[30, 10, 20]);
        let rows: Vec<u64> = set.iter().map(|r| r.as_u64()).collect();
        assert_eq!(rows, vec![10, 20, 30]);
        assert_eq!(set.first(), Some(RowId(10)));
    }

    #[test]
    fn test_remove_keeps_old_version() {
        let full = set_of(&[1, 2]);
        let less = full.remove(RowId(1));
        assert_eq!(full.len(), 2);
        assert_eq!(less.len(), 1);
        assert!(less.remove(RowId(2)).is_empty());
    }

    #[test]
    fn test_positions() {
        let set = set_of(&[5, 6, 7]);
        let first = set.first_position().unwrap();
        assert_eq!(first.row(), RowId(5));
        assert_eq!(first.rank(), 0);
        assert!(first.prev().is_none());

        let second = first.next().unwrap();
        assert_eq!(second.row(), RowId(6));
        assert_eq!(second.rank(), 1);

        let last = set.last_position().unwrap();
        assert_eq!(last.row(), RowId(7));
        assert_eq!(last.rank(), 2);
        assert!(last.next().is_none());
        assert_eq!(last.prev().map(|p| p.row()), Some(RowId(6)));
    }

    #[test]
    fn test_empty_set() {
        let set = DuplicateSet::default();
        assert!(set.is_empty());
        assert!(set.first().is_none());
        assert!(set.first_position().is_none());
    }
}
