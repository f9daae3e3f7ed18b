//! Persistent ordered map used for every level of an index tree.
//!
//! An AVL tree whose nodes are shared through `Arc`. An update copies only
//! the nodes on the path to the changed key; every other subtree is shared
//! between the old and the new version, so earlier versions stay valid.
//!
//! Each node also records the total *weight* of its subtree. A weight is the
//! number of index associations an entry stands for, which lets a
//! [`Bookmark`] report how many associations precede it without a scan.
//!
//! ```text
//!            (k4, w=9)             weight = own weight + left + right
//!           /         \
//!     (k2, w=4)     (k6, w=4)
//!     /      \       /     \
//!   (k1)    (k3)  (k5)    (k7)
//! ```

use std::cmp::Ordering;
use std::sync::Arc;

/// Comparison of map keys.
pub trait KeyOrder<K> {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Orders keys by their `Ord` implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Natural;

impl<K: Ord> KeyOrder<K> for Natural {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Number of associations a map value stands for.
pub trait Weighted {
    fn weight(&self) -> u64;
}

impl Weighted for () {
    #[inline]
    fn weight(&self) -> u64 {
        1
    }
}

struct Node<K, V> {
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
    height: u8,
    len: usize,
    weight: u64,
}

type Link<K, V> = Option<Arc<Node<K, V>>>;

#[inline]
fn height<K, V>(link: &Link<K, V>) -> u8 {
    link.as_ref().map_or(0, |n| n.height)
}

#[inline]
fn len<K, V>(link: &Link<K, V>) -> usize {
    link.as_ref().map_or(0, |n| n.len)
}

#[inline]
fn weight<K, V>(link: &Link<K, V>) -> u64 {
    link.as_ref().map_or(0, |n| n.weight)
}

fn make<K, V: Weighted>(
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
) -> Arc<Node<K, V>> {
    let height = 1 + height(&left).max(height(&right));
    let len = 1 + len(&left) + len(&right);
    let weight = value.weight() + weight(&left) + weight(&right);
    Arc::new(Node {
        key,
        value,
        left,
        right,
        height,
        len,
        weight,
    })
}

/// Rebuilds a node from parts, rotating when the subtree heights differ by 2.
fn balance<K: Clone, V: Clone + Weighted>(
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
) -> Arc<Node<K, V>> {
    let hl = height(&left);
    let hr = height(&right);

    if hl > hr + 1 {
        if let Some(l) = &left {
            if height(&l.left) >= height(&l.right) {
                // Single right rotation
                let new_right = make(key, value, l.right.clone(), right);
                return make(l.key.clone(), l.value.clone(), l.left.clone(), Some(new_right));
            }
            if let Some(lr) = &l.right {
                // Left-right double rotation
                let new_left = make(
                    l.key.clone(),
                    l.value.clone(),
                    l.left.clone(),
                    lr.left.clone(),
                );
                let new_right = make(key, value, lr.right.clone(), right);
                return make(lr.key.clone(), lr.value.clone(), Some(new_left), Some(new_right));
            }
        }
    } else if hr > hl + 1 {
        if let Some(r) = &right {
            if height(&r.right) >= height(&r.left) {
                // Single left rotation
                let new_left = make(key, value, left, r.left.clone());
                return make(r.key.clone(), r.value.clone(), Some(new_left), r.right.clone());
            }
            if let Some(rl) = &r.left {
                // Right-left double rotation
                let new_left = make(key, value, left, rl.left.clone());
                let new_right = make(
                    r.key.clone(),
                    r.value.clone(),
                    rl.right.clone(),
                    r.right.clone(),
                );
                return make(rl.key.clone(), rl.value.clone(), Some(new_left), Some(new_right));
            }
        }
    }

    make(key, value, left, right)
}

fn insert_node<K, V, O>(link: &Link<K, V>, key: K, value: V, order: &O) -> Arc<Node<K, V>>
where
    K: Clone,
    V: Clone + Weighted,
    O: KeyOrder<K>,
{
    let Some(node) = link else {
        return make(key, value, None, None);
    };
    match order.compare(&key, &node.key) {
        Ordering::Less => {
            let left = insert_node(&node.left, key, value, order);
            balance(node.key.clone(), node.value.clone(), Some(left), node.right.clone())
        }
        Ordering::Greater => {
            let right = insert_node(&node.right, key, value, order);
            balance(node.key.clone(), node.value.clone(), node.left.clone(), Some(right))
        }
        Ordering::Equal => make(node.key.clone(), value, node.left.clone(), node.right.clone()),
    }
}

/// Returns the rebuilt subtree, or None if the key is absent.
fn remove_node<K, V, O>(link: &Link<K, V>, key: &K, order: &O) -> Option<Link<K, V>>
where
    K: Clone,
    V: Clone + Weighted,
    O: KeyOrder<K>,
{
    let node = link.as_ref()?;
    match order.compare(key, &node.key) {
        Ordering::Less => {
            let left = remove_node(&node.left, key, order)?;
            Some(Some(balance(
                node.key.clone(),
                node.value.clone(),
                left,
                node.right.clone(),
            )))
        }
        Ordering::Greater => {
            let right = remove_node(&node.right, key, order)?;
            Some(Some(balance(
                node.key.clone(),
                node.value.clone(),
                node.left.clone(),
                right,
            )))
        }
        Ordering::Equal => Some(match (&node.left, &node.right) {
            (None, right) => right.clone(),
            (left, None) => left.clone(),
            (left, Some(right)) => {
                let (k, v, rest) = remove_min(right);
                Some(balance(k, v, left.clone(), rest))
            }
        }),
    }
}

fn remove_min<K: Clone, V: Clone + Weighted>(node: &Arc<Node<K, V>>) -> (K, V, Link<K, V>) {
    match &node.left {
        None => (node.key.clone(), node.value.clone(), node.right.clone()),
        Some(left) => {
            let (k, v, rest) = remove_min(left);
            let rebuilt = balance(node.key.clone(), node.value.clone(), rest, node.right.clone());
            (k, v, Some(rebuilt))
        }
    }
}

fn descend_left<K, V>(
    ancestors: &mut Vec<Arc<Node<K, V>>>,
    mut node: Arc<Node<K, V>>,
) -> Arc<Node<K, V>> {
    while let Some(left) = node.left.clone() {
        ancestors.push(node);
        node = left;
    }
    node
}

fn descend_right<K, V>(
    ancestors: &mut Vec<Arc<Node<K, V>>>,
    mut node: Arc<Node<K, V>>,
) -> Arc<Node<K, V>> {
    while let Some(right) = node.right.clone() {
        ancestors.push(node);
        node = right;
    }
    node
}

/// Persistent ordered map. Cloning is O(1).
pub struct PersistentMap<K, V, O> {
    root: Link<K, V>,
    order: O,
}

impl<K, V, O: Clone> Clone for PersistentMap<K, V, O> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            order: self.order.clone(),
        }
    }
}

impl<K, V, O> PersistentMap<K, V, O>
where
    K: Clone,
    V: Clone + Weighted,
    O: KeyOrder<K> + Clone,
{
    /// Creates an empty map ordered by `order`.
    pub fn new(order: O) -> Self {
        Self { root: None, order }
    }

    /// Returns the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        len(&self.root)
    }

    /// Returns true if the map has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the sum of the weights of all values.
    #[inline]
    pub fn weight(&self) -> u64 {
        weight(&self.root)
    }

    /// Returns the key order.
    pub fn order(&self) -> &O {
        &self.order
    }

    /// Returns true if both maps are the same version.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let mut link = self.root.as_deref();
        while let Some(node) = link {
            link = match self.order.compare(key, &node.key) {
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
                Ordering::Equal => return Some(&node.value),
            };
        }
        None
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns a new map with `key` bound to `value`, replacing any
    /// previous binding.
    pub fn insert(&self, key: K, value: V) -> Self {
        Self {
            root: Some(insert_node(&self.root, key, value, &self.order)),
            order: self.order.clone(),
        }
    }

    /// Returns a new map without `key`. Returns a clone if it is absent.
    pub fn remove(&self, key: &K) -> Self {
        match remove_node(&self.root, key, &self.order) {
            Some(root) => Self {
                root,
                order: self.order.clone(),
            },
            None => self.clone(),
        }
    }

    /// Bookmark at the first entry.
    pub fn first(&self) -> Option<Bookmark<K, V>> {
        let root = self.root.clone()?;
        let mut ancestors = Vec::with_capacity(root.height as usize);
        let current = descend_left(&mut ancestors, root);
        Some(Bookmark {
            ancestors,
            current,
            offset: 0,
        })
    }

    /// Bookmark at the last entry.
    pub fn last(&self) -> Option<Bookmark<K, V>> {
        let root = self.root.clone()?;
        let mut ancestors = Vec::with_capacity(root.height as usize);
        let current = descend_right(&mut ancestors, root);
        let offset = self.weight() - current.value.weight();
        Some(Bookmark {
            ancestors,
            current,
            offset,
        })
    }

    /// Bookmark at the first entry whose key is at or after `key`.
    pub fn seek(&self, key: &K) -> Option<Bookmark<K, V>> {
        let mut path: Vec<Arc<Node<K, V>>> = Vec::new();
        let mut before = 0u64;
        // (path length, offset) of the best candidate so far
        let mut best: Option<(usize, u64)> = None;
        let mut link = self.root.clone();

        while let Some(node) = link {
            let left_weight = weight(&node.left);
            let ord = self.order.compare(key, &node.key);
            path.push(Arc::clone(&node));
            match ord {
                Ordering::Less => {
                    best = Some((path.len(), before + left_weight));
                    link = node.left.clone();
                }
                Ordering::Greater => {
                    before += left_weight + node.value.weight();
                    link = node.right.clone();
                }
                Ordering::Equal => {
                    best = Some((path.len(), before + left_weight));
                    break;
                }
            }
        }

        let (depth, offset) = best?;
        path.truncate(depth);
        let current = path.pop()?;
        Some(Bookmark {
            ancestors: path,
            current,
            offset,
        })
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut iter = Iter {
            stack: Vec::new(),
            remaining: self.len(),
        };
        iter.push_left(self.root.as_deref());
        iter
    }
}

impl<K, V, O> std::fmt::Debug for PersistentMap<K, V, O>
where
    K: Clone + std::fmt::Debug,
    V: Clone + Weighted + std::fmt::Debug,
    O: KeyOrder<K> + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// In-order iterator over map entries.
pub struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn push_left(&mut self, mut link: Option<&'a Node<K, V>>) {
        while let Some(node) = link {
            self.stack.push(node);
            link = node.left.as_deref();
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(node.right.as_deref());
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// A position in one version of a [`PersistentMap`].
///
/// Holds the root-to-entry path by `Arc`, so it stays valid after the map
/// it came from has been superseded.
pub struct Bookmark<K, V> {
    ancestors: Vec<Arc<Node<K, V>>>,
    current: Arc<Node<K, V>>,
    /// Total weight of the entries before this one.
    offset: u64,
}

impl<K, V> Clone for Bookmark<K, V> {
    fn clone(&self) -> Self {
        Self {
            ancestors: self.ancestors.clone(),
            current: Arc::clone(&self.current),
            offset: self.offset,
        }
    }
}

impl<K, V: Weighted> Bookmark<K, V> {
    #[inline]
    pub fn key(&self) -> &K {
        &self.current.key
    }

    #[inline]
    pub fn value(&self) -> &V {
        &self.current.value
    }

    /// Total weight of all entries before this one.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bookmark at the following entry.
    pub fn next(&self) -> Option<Self> {
        let offset = self.offset + self.current.value.weight();
        let mut ancestors = self.ancestors.clone();

        if let Some(right) = &self.current.right {
            ancestors.push(Arc::clone(&self.current));
            let current = descend_left(&mut ancestors, Arc::clone(right));
            return Some(Self {
                ancestors,
                current,
                offset,
            });
        }

        // Climb until we leave a left subtree
        let mut child = Arc::clone(&self.current);
        while let Some(parent) = ancestors.pop() {
            if parent.left.as_ref().is_some_and(|l| Arc::ptr_eq(l, &child)) {
                return Some(Self {
                    ancestors,
                    current: parent,
                    offset,
                });
            }
            child = parent;
        }
        None
    }

    /// Bookmark at the preceding entry.
    pub fn prev(&self) -> Option<Self> {
        let mut ancestors = self.ancestors.clone();

        if let Some(left) = &self.current.left {
            ancestors.push(Arc::clone(&self.current));
            let current = descend_right(&mut ancestors, Arc::clone(left));
            let offset = self.offset - current.value.weight();
            return Some(Self {
                ancestors,
                current,
                offset,
            });
        }

        // Climb until we leave a right subtree
        let mut child = Arc::clone(&self.current);
        while let Some(parent) = ancestors.pop() {
            if parent.right.as_ref().is_some_and(|r| Arc::ptr_eq(r, &child)) {
                let offset = self.offset - parent.value.weight();
                return Some(Self {
                    ancestors,
                    current: parent,
                    offset,
                });
            }
            child = parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq)]
    struct W(u64);

    impl Weighted for W {
        fn weight(&self) -> u64 {
            self.0
        }
    }

    fn map_of(keys: &[i64]) -> PersistentMap<i64, (), Natural> {
        keys.iter()
            .fold(PersistentMap::new(Natural), |m, k| m.insert(*k, ()))
    }

    /// Checks AVL balance, cached heights, lengths and weights. Returns height.
    fn check_node<K: Ord, V: Weighted>(link: &Link<K, V>) -> u8 {
        match link {
            None => 0,
            Some(n) => {
                let hl = check_node(&n.left);
                let hr = check_node(&n.right);
                assert!(hl.abs_diff(hr) <= 1, "unbalanced node");
                assert_eq!(n.height, 1 + hl.max(hr));
                assert_eq!(n.len, 1 + len(&n.left) + len(&n.right));
                assert_eq!(n.weight, n.value.weight() + weight(&n.left) + weight(&n.right));
                if let Some(l) = &n.left {
                    assert!(l.key < n.key);
                }
                if let Some(r) = &n.right {
                    assert!(r.key > n.key);
                }
                n.height
            }
        }
    }

    fn keys_of<V: Clone + Weighted>(map: &PersistentMap<i64, V, Natural>) -> Vec<i64> {
        map.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn test_empty_map() {
        let map: PersistentMap<i64, (), Natural> = PersistentMap::new(Natural);
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
        assert_eq!(map.weight(), 0);
        assert!(map.first().is_none());
        assert!(map.last().is_none());
        assert!(map.seek(&1).is_none());
        assert!(map.get(&1).is_none());
    }

    #[test]
    fn test_insert_and_get() {
        let map = map_of(&[5, 3, 8, 1, 4]);
        assert_eq!(map.len(), 5);
        assert!(map.contains_key(&4));
        assert!(!map.contains_key(&6));
        assert_eq!(keys_of(&map), vec![1, 3, 4, 5, 8]);
        check_node(&map.root);
    }

    #[test]
    fn test_insert_replaces_value() {
        let map = PersistentMap::new(Natural).insert(1, W(2)).insert(1, W(7));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Some(&W(7)));
        assert_eq!(map.weight(), 7);
    }

    #[test]
    fn test_versions_are_independent() {
        let v1 = map_of(&[1, 2, 3]);
        let v2 = v1.insert(4, ());
        let v3 = v2.remove(&1);

        assert_eq!(keys_of(&v1), vec![1, 2, 3]);
        assert_eq!(keys_of(&v2), vec![1, 2, 3, 4]);
        assert_eq!(keys_of(&v3), vec![2, 3, 4]);
        assert!(!v1.ptr_eq(&v2));
        assert!(v1.ptr_eq(&v1.clone()));
    }

    #[test]
    fn test_remove_absent_key_keeps_version() {
        let map = map_of(&[1, 2, 3]);
        let same = map.remove(&9);
        assert!(map.ptr_eq(&same));
    }

    #[test]
    fn test_remove_to_empty() {
        let map = map_of(&[2, 1]).remove(&1).remove(&2);
        assert!(map.is_empty());
        assert!(map.first().is_none());
    }

    #[test]
    fn test_sequential_inserts_stay_balanced() {
        let map = map_of(&(0..1000).collect::<Vec<_>>());
        let h = check_node(&map.root);
        // AVL height bound: 1.44 * log2(n + 2)
        assert!(h <= 15, "height {} too large", h);
        let map = (0..1000).step_by(2).fold(map, |m, k| m.remove(&k));
        check_node(&map.root);
        assert_eq!(map.len(), 500);
    }

    #[test]
    fn test_bookmark_forward_and_backward() {
        let map = map_of(&[10, 20, 30, 40]);
        let mut forward = Vec::new();
        let mut b = map.first();
        while let Some(bm) = b {
            forward.push(*bm.key());
            b = bm.next();
        }
        assert_eq!(forward, vec![10, 20, 30, 40]);

        let mut backward = Vec::new();
        let mut b = map.last();
        while let Some(bm) = b {
            backward.push(*bm.key());
            b = bm.prev();
        }
        assert_eq!(backward, vec![40, 30, 20, 10]);
    }

    #[test]
    fn test_seek_lower_bound() {
        let map = map_of(&[10, 20, 30]);
        assert_eq!(map.seek(&20).map(|b| *b.key()), Some(20));
        assert_eq!(map.seek(&21).map(|b| *b.key()), Some(30));
        assert_eq!(map.seek(&5).map(|b| *b.key()), Some(10));
        assert!(map.seek(&31).is_none());

        // A sought bookmark walks both ways
        let b = map.seek(&15).unwrap();
        assert_eq!(b.prev().map(|p| *p.key()), Some(10));
        assert_eq!(b.next().map(|n| *n.key()), Some(30));
    }

    #[test]
    fn test_offsets_follow_weights() {
        let map = PersistentMap::new(Natural)
            .insert(1, W(3))
            .insert(2, W(1))
            .insert(3, W(5))
            .insert(4, W(2));
        assert_eq!(map.weight(), 11);

        let offsets: Vec<u64> = {
            let mut out = Vec::new();
            let mut b = map.first();
            while let Some(bm) = b {
                out.push(bm.offset());
                b = bm.next();
            }
            out
        };
        assert_eq!(offsets, vec![0, 3, 4, 9]);

        assert_eq!(map.last().unwrap().offset(), 9);
        assert_eq!(map.seek(&3).unwrap().offset(), 4);
        assert_eq!(map.seek(&3).unwrap().prev().unwrap().offset(), 3);
    }

    #[test]
    fn test_random_operations_match_btreemap() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut model = BTreeMap::new();
        let mut map = PersistentMap::new(Natural);

        for _ in 0..4000 {
            let key: i64 = rng.gen_range(0..300);
            if rng.gen_bool(0.6) {
                let w = rng.gen_range(1..5u64);
                model.insert(key, w);
                map = map.insert(key, W(w));
            } else {
                model.remove(&key);
                map = map.remove(&key);
            }
        }

        check_node(&map.root);
        assert_eq!(map.len(), model.len());
        assert_eq!(map.weight(), model.values().sum::<u64>());
        assert_eq!(keys_of(&map), model.keys().copied().collect::<Vec<_>>());

        for probe in [-1i64, 0, 17, 150, 299, 300] {
            let expected = model.range(probe..).next().map(|(k, _)| *k);
            assert_eq!(map.seek(&probe).map(|b| *b.key()), expected);
            if let Some(b) = map.seek(&probe) {
                let before: u64 = model.range(..*b.key()).map(|(_, w)| *w).sum();
                assert_eq!(b.offset(), before);
            }
        }
    }

    #[test]
    fn test_custom_order() {
        #[derive(Clone)]
        struct Reverse;
        impl KeyOrder<i64> for Reverse {
            fn compare(&self, a: &i64, b: &i64) -> Ordering {
                b.cmp(a)
            }
        }

        let map = [1i64, 3, 2]
            .iter()
            .fold(PersistentMap::new(Reverse), |m, k| m.insert(*k, ()));
        let keys: Vec<i64> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![3, 2, 1]);
        assert_eq!(map.seek(&2).map(|b| *b.key()), Some(2));
    }

    #[test]
    fn test_iter_size_hint() {
        let map = map_of(&[1, 2, 3]);
        let mut iter = map.iter();
        assert_eq!(iter.len(), 3);
        iter.next();
        assert_eq!(iter.len(), 2);
    }
}
