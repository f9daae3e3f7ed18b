//! Cursors over an [`MTree`] version.
//!
//! A cursor is a chain with one link per key column. Each link holds a
//! bookmark into the branch map of its level plus, depending on the branch,
//! the cursor for the next column or a position in a duplicate set.
//!
//! Cursors are immutable: `next`/`prev` return a new cursor. They hold the
//! tree version they were created on, so later mutations never affect them.
//!
//! # Seek keys
//!
//! A cursor created by [`MTree::position_at`] remembers its seek key:
//! - A bound (non-null) component positions its level at the first branch
//!   at or after the value, and `prev` never steps that level below it.
//! - Deeper components constrain only the branch equal to the bound value.
//!   Past it the scan continues unconstrained, as a range scan would.
//! - A null (or set) component is a wildcard. Every branch of that level is
//!   visited and the deeper components are re-applied beneath each one.

use super::{Branch, MTree};
use crate::dupset::DupPosition;
use crate::ordmap::Bookmark;
use lattice_common::{RowId, Value};
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

#[derive(Clone)]
enum Inner {
    Nested(Box<MTreeCursor>),
    Duplicates(DupPosition),
    Singleton(RowId),
}

/// Position of one association in an [`MTree`].
#[derive(Clone)]
pub struct MTreeCursor {
    tree: MTree,
    outer: Bookmark<Value, Branch>,
    inner: Inner,
    seek_key: Option<Arc<[Value]>>,
    /// Set when the step producing this cursor moved `outer`.
    changed: bool,
}

/// Seek value for `level`, if that component is bound.
fn bound_head(seek_key: Option<&Arc<[Value]>>, level: usize) -> Option<&Value> {
    seek_key
        .and_then(|key| key.get(level))
        .filter(|v| !v.is_null() && !matches!(v, Value::Set(_)))
}

fn advance(
    bookmark: &Bookmark<Value, Branch>,
    direction: Direction,
) -> Option<Bookmark<Value, Branch>> {
    match direction {
        Direction::Forward => bookmark.next(),
        Direction::Backward => bookmark.prev(),
    }
}

impl MTreeCursor {
    pub(crate) fn first(tree: &MTree) -> Option<Self> {
        Self::seek(tree, None, Direction::Forward)
    }

    pub(crate) fn last(tree: &MTree) -> Option<Self> {
        Self::seek(tree, None, Direction::Backward)
    }

    pub(crate) fn position_at(tree: &MTree, key: &[Value]) -> Option<Self> {
        let seek_key: Arc<[Value]> = Arc::from(key);
        Self::seek(tree, Some(&seek_key), Direction::Forward)
    }

    /// First (or last) association of `tree` permitted by `seek_key`.
    fn seek(tree: &MTree, seek_key: Option<&Arc<[Value]>>, direction: Direction) -> Option<Self> {
        let head = bound_head(seek_key, tree.level());
        let mut outer = match (direction, head) {
            (Direction::Forward, Some(h)) => tree.branches().seek(h),
            (Direction::Forward, None) => tree.branches().first(),
            (Direction::Backward, _) => tree.branches().last(),
        };
        while let Some(bookmark) = outer {
            if Self::below_bound(tree, head, &bookmark, direction) {
                return None;
            }
            if let Some(cursor) = Self::enter(tree, &bookmark, seek_key, direction, false) {
                return Some(cursor);
            }
            outer = advance(&bookmark, direction);
        }
        None
    }

    /// True once a backward scan has passed the bound value of its level.
    fn below_bound(
        tree: &MTree,
        head: Option<&Value>,
        bookmark: &Bookmark<Value, Branch>,
        direction: Direction,
    ) -> bool {
        direction == Direction::Backward
            && head.is_some_and(|h| tree.domain().compare(bookmark.key(), h) == Ordering::Less)
    }

    /// Builds a cursor at the first (or last) permitted association of the
    /// branch under `bookmark`.
    fn enter(
        tree: &MTree,
        bookmark: &Bookmark<Value, Branch>,
        seek_key: Option<&Arc<[Value]>>,
        direction: Direction,
        changed: bool,
    ) -> Option<Self> {
        let inner = match bookmark.value() {
            Branch::Nested(child) => {
                let inner_seek = match bound_head(seek_key, tree.level()) {
                    Some(h) if tree.domain().compare(bookmark.key(), h) != Ordering::Equal => None,
                    _ => seek_key,
                };
                Inner::Nested(Box::new(Self::seek(child, inner_seek, direction)?))
            }
            Branch::Duplicates(rows) => Inner::Duplicates(match direction {
                Direction::Forward => rows.first_position()?,
                Direction::Backward => rows.last_position()?,
            }),
            Branch::Singleton(row) => Inner::Singleton(*row),
        };
        Some(Self {
            tree: tree.clone(),
            outer: bookmark.clone(),
            inner,
            seek_key: seek_key.cloned(),
            changed,
        })
    }

    /// Key of the current association, from this cursor's column down.
    pub fn key(&self) -> Vec<Value> {
        let mut key = Vec::with_capacity(self.tree.arity() - self.tree.level());
        self.collect_key(&mut key);
        key
    }

    fn collect_key(&self, out: &mut Vec<Value>) {
        out.push(self.outer.key().clone());
        if let Inner::Nested(inner) = &self.inner {
            inner.collect_key(out);
        }
    }

    /// Row of the current association.
    pub fn value(&self) -> RowId {
        match &self.inner {
            Inner::Nested(inner) => inner.value(),
            Inner::Duplicates(rows) => rows.row(),
            Inner::Singleton(row) => *row,
        }
    }

    /// Zero-based rank of the current association in the tree.
    pub fn position(&self) -> u64 {
        let below = match &self.inner {
            Inner::Nested(inner) => inner.position(),
            Inner::Duplicates(rows) => rows.rank(),
            Inner::Singleton(_) => 0,
        };
        self.outer.offset() + below
    }

    /// The key this cursor was positioned with, if any.
    pub fn seek_key(&self) -> Option<&[Value]> {
        self.seek_key.as_deref()
    }

    pub fn next(&self) -> Option<Self> {
        self.step(Direction::Forward)
    }

    pub fn prev(&self) -> Option<Self> {
        self.step(Direction::Backward)
    }

    fn step(&self, direction: Direction) -> Option<Self> {
        let inner = match &self.inner {
            Inner::Nested(cursor) => cursor.step(direction).map(|c| Inner::Nested(Box::new(c))),
            Inner::Duplicates(rows) => {
                let moved = match direction {
                    Direction::Forward => rows.next(),
                    Direction::Backward => rows.prev(),
                };
                moved.map(Inner::Duplicates)
            }
            Inner::Singleton(_) => None,
        };
        if let Some(inner) = inner {
            return Some(Self {
                tree: self.tree.clone(),
                outer: self.outer.clone(),
                inner,
                seek_key: self.seek_key.clone(),
                changed: false,
            });
        }

        let seek_key = self.seek_key.as_ref();
        let head = bound_head(seek_key, self.tree.level());
        let mut outer = advance(&self.outer, direction);
        while let Some(bookmark) = outer {
            if Self::below_bound(&self.tree, head, &bookmark, direction) {
                return None;
            }
            if let Some(cursor) = Self::enter(&self.tree, &bookmark, seek_key, direction, true) {
                return Some(cursor);
            }
            outer = advance(&bookmark, direction);
        }
        None
    }

    /// Cursor at the first association sharing the first `depth` key
    /// columns with this one. `depth == 0` restarts the scan.
    pub fn reset_to_ties_start(&self, depth: usize) -> Self {
        if depth == 0 {
            return Self::seek(&self.tree, self.seek_key.as_ref(), Direction::Forward)
                .unwrap_or_else(|| self.clone());
        }
        let inner = match &self.inner {
            Inner::Nested(inner) => Inner::Nested(Box::new(inner.reset_to_ties_start(depth - 1))),
            Inner::Duplicates(rows) => match self.outer.value() {
                Branch::Duplicates(set) => set
                    .first_position()
                    .map_or_else(|| Inner::Duplicates(rows.clone()), Inner::Duplicates),
                _ => Inner::Duplicates(rows.clone()),
            },
            Inner::Singleton(row) => Inner::Singleton(*row),
        };
        Self {
            tree: self.tree.clone(),
            outer: self.outer.clone(),
            inner,
            seek_key: self.seek_key.clone(),
            changed: false,
        }
    }

    /// True if `next` stays within the tie group of the first `depth`
    /// columns.
    pub fn has_more(&self, depth: usize) -> bool {
        if depth == 0 {
            return self.next().is_some();
        }
        match &self.inner {
            Inner::Nested(inner) if depth > 1 => inner.has_more(depth - 1),
            Inner::Nested(inner) => inner.next().is_some(),
            Inner::Duplicates(rows) => rows.next().is_some(),
            Inner::Singleton(_) => false,
        }
    }

    /// True if the step producing this cursor crossed a branch boundary in
    /// one of the first `depth` columns.
    pub fn changed(&self, depth: usize) -> bool {
        if depth == 0 {
            return false;
        }
        if self.changed {
            return true;
        }
        match &self.inner {
            Inner::Nested(inner) if depth > 1 => inner.changed(depth - 1),
            _ => false,
        }
    }
}

impl std::fmt::Debug for MTreeCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MTreeCursor")
            .field("key", &self.key())
            .field("value", &self.value())
            .field("position", &self.position())
            .finish()
    }
}

/// Iterator over the (key, row) associations of a tree.
pub struct MTreeIter {
    cursor: Option<MTreeCursor>,
}

impl MTreeIter {
    pub(crate) fn new(cursor: Option<MTreeCursor>) -> Self {
        Self { cursor }
    }
}

impl Iterator for MTreeIter {
    type Item = (Vec<Value>, RowId);

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.take()?;
        let item = (cursor.key(), cursor.value());
        self.cursor = cursor.next();
        Some(item)
    }
}
