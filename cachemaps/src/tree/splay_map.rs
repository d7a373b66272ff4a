use std::cmp::Ordering;
use std::fmt;
use std::mem;

use log::{debug, trace};

use super::Comparator;
use crate::arena::{SlotArena, SlotId};
use crate::error::{Error, Result};

struct Node<K, V> {
    key: K,
    value: V,
    left: Option<SlotId>,
    right: Option<SlotId>,
    parent: Option<SlotId>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Towards smaller keys.
    Below,
    /// Towards larger keys.
    Above,
}

/// An ordered map backed by a splay tree.
///
/// `get`, `get_mut`, `put` and `remove` splay the node they touch to the
/// root, which keeps recently used keys cheap to reach and gives amortised
/// logarithmic cost without any balance bookkeeping. Navigation (`first_*`,
/// `lower_*` and friends) and `contains_key` leave the shape alone.
///
/// Every operation that compares keys returns a [`Result`]: a comparator
/// that cannot order two keys fails the call with
/// [`Error::TypeMismatch`] before anything is changed.
///
/// Under natural ordering the comparator binds on the first insertion, see
/// [`comparator`](Self::comparator).
pub struct SplayMap<K, V> {
    nodes: SlotArena<Node<K, V>>,
    root: Option<SlotId>,
    comparator: Comparator<K>,
    bound: bool,
    mod_count: usize,
}

impl<K: PartialOrd, V> SplayMap<K, V> {
    /// Creates an empty map ordered by the keys' `PartialOrd`.
    pub fn new() -> Self {
        debug!("splay map: natural ordering, unbound");
        SplayMap {
            nodes: SlotArena::new(),
            root: None,
            comparator: Comparator::natural(),
            bound: false,
            mod_count: 0,
        }
    }
}

impl<K: PartialOrd, V> Default for SplayMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> SplayMap<K, V> {
    pub fn with_comparator(comparator: Comparator<K>) -> Self {
        debug!("splay map: custom comparator");
        SplayMap {
            nodes: SlotArena::new(),
            root: None,
            comparator,
            bound: true,
            mod_count: 0,
        }
    }

    /// The comparator in use, or `None` while a naturally ordered map has
    /// not accepted its first key yet.
    pub fn comparator(&self) -> Option<&Comparator<K>> {
        self.bound.then_some(&self.comparator)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Maps `key` to `value` and splays its node to the root. Returns the
    /// value it replaced.
    pub fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        let Some(mut cur) = self.root else {
            // checks that keys of this type can be ordered at all
            self.comparator.compare(&key, &key)?;
            if !self.bound {
                trace!("splay map: binding natural ordering");
                self.bound = true;
            }
            let id = self.nodes.insert(Node {
                key,
                value,
                left: None,
                right: None,
                parent: None,
            });
            self.root = Some(id);
            self.mod_count += 1;
            return Ok(None);
        };

        let went_left = loop {
            let node = &self.nodes[cur];
            let (next, left) = match self.comparator.compare(&key, &node.key)? {
                Ordering::Less => (node.left, true),
                Ordering::Greater => (node.right, false),
                Ordering::Equal => {
                    let old = mem::replace(&mut self.nodes[cur].value, value);
                    self.splay(cur);
                    return Ok(Some(old));
                }
            };
            match next {
                Some(next) => cur = next,
                None => break left,
            }
        };

        let id = self.nodes.insert(Node {
            key,
            value,
            left: None,
            right: None,
            parent: Some(cur),
        });
        if went_left {
            self.nodes[cur].left = Some(id);
        } else {
            self.nodes[cur].right = Some(id);
        }
        self.mod_count += 1;
        self.splay(id);
        Ok(None)
    }

    /// Puts every pair in order. Stops at the first key that cannot be
    /// compared; pairs before it stay in the map.
    pub fn put_all<I>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in pairs {
            self.put(key, value)?;
        }
        Ok(())
    }

    /// Looks `key` up and splays its node to the root.
    pub fn get(&mut self, key: &K) -> Result<Option<&V>> {
        Ok(self.access(key)?.map(|id| &self.nodes[id].value))
    }

    pub fn get_mut(&mut self, key: &K) -> Result<Option<&mut V>> {
        match self.access(key)? {
            Some(id) => Ok(Some(&mut self.nodes[id].value)),
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get) without splaying.
    pub fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.find(key)?.is_some())
    }

    /// Linear scan in key order.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.values().any(|v| v == value)
    }

    pub fn remove(&mut self, key: &K) -> Result<Option<V>> {
        Ok(self
            .find(key)?
            .and_then(|id| self.remove_node(id))
            .map(|(_, value)| value))
    }

    pub fn clear(&mut self) {
        if self.is_empty() {
            return;
        }
        self.nodes.clear();
        self.root = None;
        self.mod_count += 1;
    }

    pub fn first_entry(&self) -> Option<(&K, &V)> {
        self.root.map(|root| self.entry(self.subtree_min(root)))
    }

    pub fn last_entry(&self) -> Option<(&K, &V)> {
        self.root.map(|root| self.entry(self.subtree_max(root)))
    }

    pub fn first_key(&self) -> Option<&K> {
        self.first_entry().map(|(key, _)| key)
    }

    pub fn last_key(&self) -> Option<&K> {
        self.last_entry().map(|(key, _)| key)
    }

    pub fn poll_first_entry(&mut self) -> Option<(K, V)> {
        let first = self.subtree_min(self.root?);
        self.remove_node(first)
    }

    pub fn poll_last_entry(&mut self) -> Option<(K, V)> {
        let last = self.subtree_max(self.root?);
        self.remove_node(last)
    }

    /// Greatest entry strictly below `key`.
    pub fn lower_entry(&self, key: &K) -> Result<Option<(&K, &V)>> {
        self.nearest_entry(key, Direction::Below, false)
    }

    /// Greatest entry at or below `key`.
    pub fn floor_entry(&self, key: &K) -> Result<Option<(&K, &V)>> {
        self.nearest_entry(key, Direction::Below, true)
    }

    /// Least entry at or above `key`.
    pub fn ceiling_entry(&self, key: &K) -> Result<Option<(&K, &V)>> {
        self.nearest_entry(key, Direction::Above, true)
    }

    /// Least entry strictly above `key`.
    pub fn higher_entry(&self, key: &K) -> Result<Option<(&K, &V)>> {
        self.nearest_entry(key, Direction::Above, false)
    }

    pub fn lower_key(&self, key: &K) -> Result<Option<&K>> {
        Ok(self.lower_entry(key)?.map(|(key, _)| key))
    }

    pub fn floor_key(&self, key: &K) -> Result<Option<&K>> {
        Ok(self.floor_entry(key)?.map(|(key, _)| key))
    }

    pub fn ceiling_key(&self, key: &K) -> Result<Option<&K>> {
        Ok(self.ceiling_entry(key)?.map(|(key, _)| key))
    }

    pub fn higher_key(&self, key: &K) -> Result<Option<&K>> {
        Ok(self.higher_entry(key)?.map(|(key, _)| key))
    }

    /// Entries in key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            nodes: &self.nodes,
            next: self.root.map(|root| self.subtree_min(root)),
            remaining: self.len(),
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        let order: Vec<SlotId> = self.ids().collect();
        IterMut {
            inner: self.nodes.ordered_mut(&order).into_iter(),
        }
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }

    /// Live view over the keys.
    pub fn key_set(&mut self) -> KeySet<'_, K, V> {
        KeySet { map: self }
    }

    /// Live view over the values.
    pub fn values_view(&mut self) -> ValueCollection<'_, K, V> {
        ValueCollection { map: self }
    }

    /// Live view over the entries.
    pub fn entry_set(&mut self) -> EntrySet<'_, K, V> {
        EntrySet { map: self }
    }

    /// Starts a detached, fail-fast cursor over the entries in key order.
    ///
    /// Splaying does not disturb a cursor. Inserting or removing a key
    /// other than through [`Cursor::remove`] makes its next step fail with
    /// [`Error::StaleIterator`]. This is a best-effort check against
    /// mistakes by the caller, not a guard against concurrent use.
    pub fn cursor(&self) -> Cursor {
        Cursor {
            next: self.root.map(|root| self.subtree_min(root)),
            last_returned: None,
            expected_mod_count: self.mod_count,
        }
    }

    fn entry(&self, id: SlotId) -> (&K, &V) {
        let node = &self.nodes[id];
        (&node.key, &node.value)
    }

    fn ids(&self) -> impl Iterator<Item = SlotId> + '_ {
        let mut next = self.root.map(|root| self.subtree_min(root));
        std::iter::from_fn(move || {
            let id = next?;
            next = successor(&self.nodes, id);
            Some(id)
        })
    }

    fn find(&self, key: &K) -> Result<Option<SlotId>> {
        let mut cur = self.root;
        while let Some(id) = cur {
            let node = &self.nodes[id];
            cur = match self.comparator.compare(key, &node.key)? {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return Ok(Some(id)),
            };
        }
        Ok(None)
    }

    fn access(&mut self, key: &K) -> Result<Option<SlotId>> {
        let found = self.find(key)?;
        if let Some(id) = found {
            self.splay(id);
        }
        Ok(found)
    }

    /// Single descent towards `key`, backing up through parents when the
    /// path runs out on the wrong side.
    fn nearest_entry(
        &self,
        key: &K,
        direction: Direction,
        inclusive: bool,
    ) -> Result<Option<(&K, &V)>> {
        let Some(mut cur) = self.root else {
            return Ok(None);
        };
        loop {
            let node = &self.nodes[cur];
            let ord = self.comparator.compare(key, &node.key)?;
            if ord == Ordering::Equal && inclusive {
                return Ok(Some(self.entry(cur)));
            }
            let candidate = match direction {
                Direction::Below => ord == Ordering::Greater,
                Direction::Above => ord == Ordering::Less,
            };
            // a candidate may still have a closer neighbour towards `key`
            let towards_key = match (direction, candidate) {
                (Direction::Below, true) | (Direction::Above, false) => node.right,
                (Direction::Below, false) | (Direction::Above, true) => node.left,
            };
            match towards_key {
                Some(next) => cur = next,
                None if candidate => return Ok(Some(self.entry(cur))),
                None => return Ok(self.backtrack(cur, direction).map(|id| self.entry(id))),
            }
        }
    }

    /// Closest ancestor of `child` lying in `direction` from it.
    fn backtrack(&self, mut child: SlotId, direction: Direction) -> Option<SlotId> {
        let mut parent = self.nodes[child].parent;
        while let Some(p) = parent {
            let node = &self.nodes[p];
            let came_from = match direction {
                Direction::Below => node.left,
                Direction::Above => node.right,
            };
            if came_from != Some(child) {
                break;
            }
            child = p;
            parent = node.parent;
        }
        parent
    }

    fn subtree_min(&self, mut id: SlotId) -> SlotId {
        while let Some(left) = self.nodes[id].left {
            id = left;
        }
        id
    }

    fn subtree_max(&self, mut id: SlotId) -> SlotId {
        while let Some(right) = self.nodes[id].right {
            id = right;
        }
        id
    }

    /// Lifts `x` over its parent, keeping both directions of every link
    /// in step.
    fn rotate(&mut self, x: SlotId) {
        let Some(p) = self.nodes[x].parent else {
            return;
        };
        let grandparent = self.nodes[p].parent;
        if self.nodes[p].left == Some(x) {
            let inner = self.nodes[x].right;
            self.nodes[p].left = inner;
            if let Some(inner) = inner {
                self.nodes[inner].parent = Some(p);
            }
            self.nodes[x].right = Some(p);
        } else {
            let inner = self.nodes[x].left;
            self.nodes[p].right = inner;
            if let Some(inner) = inner {
                self.nodes[inner].parent = Some(p);
            }
            self.nodes[x].left = Some(p);
        }
        self.nodes[p].parent = Some(x);
        self.nodes[x].parent = grandparent;
        match grandparent {
            Some(g) if self.nodes[g].left == Some(p) => self.nodes[g].left = Some(x),
            Some(g) => self.nodes[g].right = Some(x),
            None => self.root = Some(x),
        }
    }

    fn splay(&mut self, x: SlotId) {
        while let Some(p) = self.nodes[x].parent {
            match self.nodes[p].parent {
                // zig
                None => self.rotate(x),
                Some(g) => {
                    let x_is_left = self.nodes[p].left == Some(x);
                    let p_is_left = self.nodes[g].left == Some(p);
                    if x_is_left == p_is_left {
                        // zig-zig
                        self.rotate(p);
                        self.rotate(x);
                    } else {
                        // zig-zag
                        self.rotate(x);
                        self.rotate(x);
                    }
                }
            }
        }
    }

    /// Splays `id` to the root, then joins its two subtrees: the maximum of
    /// the left subtree is splayed to the top of it and adopts the right
    /// subtree.
    fn remove_node(&mut self, id: SlotId) -> Option<(K, V)> {
        self.nodes.get(id)?;
        self.splay(id);
        let left = self.nodes[id].left.take();
        let right = self.nodes[id].right.take();
        match left {
            None => {
                if let Some(right) = right {
                    self.nodes[right].parent = None;
                }
                self.root = right;
            }
            Some(left) => {
                self.nodes[left].parent = None;
                self.root = Some(left);
                let max = self.subtree_max(left);
                self.splay(max);
                self.nodes[max].right = right;
                if let Some(right) = right {
                    self.nodes[right].parent = Some(max);
                }
            }
        }
        self.mod_count += 1;
        self.nodes.remove(id).map(|node| (node.key, node.value))
    }
}

/// In-order successor of `id`.
fn successor<K, V>(nodes: &SlotArena<Node<K, V>>, id: SlotId) -> Option<SlotId> {
    if let Some(mut next) = nodes[id].right {
        while let Some(left) = nodes[next].left {
            next = left;
        }
        return Some(next);
    }
    let mut child = id;
    let mut parent = nodes[id].parent;
    while let Some(p) = parent {
        if nodes[p].left == Some(child) {
            break;
        }
        child = p;
        parent = nodes[p].parent;
    }
    parent
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for SplayMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V> IntoIterator for &'a SplayMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Live view over the keys of a [`SplayMap`].
pub struct KeySet<'a, K, V> {
    map: &'a mut SplayMap<K, V>,
}

impl<'a, K, V> KeySet<'a, K, V> {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, key: &K) -> Result<bool> {
        self.map.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Result<bool> {
        Ok(self.map.remove(key)?.is_some())
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn iter(&self) -> Keys<'_, K, V> {
        self.map.keys()
    }
}

/// Live view over the values of a [`SplayMap`], in key order.
pub struct ValueCollection<'a, K, V> {
    map: &'a mut SplayMap<K, V>,
}

impl<'a, K, V> ValueCollection<'a, K, V> {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn iter(&self) -> Values<'_, K, V> {
        self.map.values()
    }
}

impl<'a, K, V: PartialEq> ValueCollection<'a, K, V> {
    pub fn contains(&self, value: &V) -> bool {
        self.map.contains_value(value)
    }

    /// Removes the entry with the smallest key holding `value`.
    pub fn remove(&mut self, value: &V) -> bool {
        let found = self.map.ids().find(|&id| self.map.nodes[id].value == *value);
        found.and_then(|id| self.map.remove_node(id)).is_some()
    }
}

/// Live view over the entries of a [`SplayMap`].
pub struct EntrySet<'a, K, V> {
    map: &'a mut SplayMap<K, V>,
}

impl<'a, K, V> EntrySet<'a, K, V> {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        self.map.iter()
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        self.map.iter_mut()
    }

    pub fn cursor(&self) -> Cursor {
        self.map.cursor()
    }
}

impl<'a, K, V: PartialEq> EntrySet<'a, K, V> {
    /// Whether `key` is present and maps to `value`. Does not splay.
    pub fn contains(&self, key: &K, value: &V) -> Result<bool> {
        Ok(self
            .map
            .find(key)?
            .is_some_and(|id| self.map.nodes[id].value == *value))
    }

    /// Removes `key` only if it maps to `value`.
    pub fn remove(&mut self, key: &K, value: &V) -> Result<bool> {
        match self.map.find(key)? {
            Some(id) if self.map.nodes[id].value == *value => {
                Ok(self.map.remove_node(id).is_some())
            }
            _ => Ok(false),
        }
    }
}

/// Detached fail-fast cursor over a [`SplayMap`], see
/// [`SplayMap::cursor`].
///
/// A cursor must only be used with the map that created it.
#[derive(Debug, Clone)]
pub struct Cursor {
    next: Option<SlotId>,
    last_returned: Option<SlotId>,
    expected_mod_count: usize,
}

impl Cursor {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Advances to the next entry in key order.
    pub fn next<'m, K, V>(&mut self, map: &'m SplayMap<K, V>) -> Result<(&'m K, &'m V)> {
        let id = self.next.ok_or(Error::NoSuchElement)?;
        if map.mod_count != self.expected_mod_count {
            return Err(Error::StaleIterator);
        }
        let node = map.nodes.get(id).ok_or(Error::StaleIterator)?;
        self.next = successor(&map.nodes, id);
        self.last_returned = Some(id);
        Ok((&node.key, &node.value))
    }

    /// Removes the entry last returned by [`next`](Self::next). The cursor
    /// stays valid.
    pub fn remove<K, V>(&mut self, map: &mut SplayMap<K, V>) -> Result<(K, V)> {
        let id = self
            .last_returned
            .ok_or(Error::IllegalState("remove without a preceding next"))?;
        if map.mod_count != self.expected_mod_count {
            return Err(Error::StaleIterator);
        }
        let removed = map.remove_node(id).ok_or(Error::StaleIterator)?;
        self.expected_mod_count = map.mod_count;
        self.last_returned = None;
        Ok(removed)
    }
}

/// Iterator over the entries of a [`SplayMap`] in key order.
pub struct Iter<'a, K, V> {
    nodes: &'a SlotArena<Node<K, V>>,
    next: Option<SlotId>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let node = &self.nodes[id];
        self.next = successor(self.nodes, id);
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

pub struct IterMut<'a, K, V> {
    inner: std::vec::IntoIter<&'a mut Node<K, V>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|node| (&node.key, &mut node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, _)| key)
    }
}

pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, value)| value)
    }
}

pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::collections::BTreeMap;
    use std::ops::Bound::{Excluded, Unbounded};

    fn root_key<K, V>(map: &SplayMap<K, V>) -> Option<&K> {
        map.root.map(|id| &map.nodes[id].key)
    }

    /// Parent links agree with child links, and in-order keys ascend.
    fn assert_well_formed<K: Ord + fmt::Debug, V>(map: &SplayMap<K, V>) {
        if let Some(root) = map.root {
            assert_eq!(map.nodes[root].parent, None);
        }
        let mut count = 0;
        for id in map.ids() {
            let node = &map.nodes[id];
            for child in [node.left, node.right].into_iter().flatten() {
                assert_eq!(map.nodes[child].parent, Some(id));
            }
            count += 1;
        }
        assert_eq!(count, map.len());
        let keys: Vec<_> = map.keys().collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "{keys:?}");
    }

    fn map_of(keys: &[i32]) -> SplayMap<i32, i32> {
        let mut map = SplayMap::new();
        for &k in keys {
            map.put(k, k * 10).unwrap();
        }
        map
    }

    #[test]
    fn put_get_remove() {
        let mut map = SplayMap::new();
        assert_eq!(map.put(2, "b"), Ok(None));
        assert_eq!(map.put(1, "a"), Ok(None));
        assert_eq!(map.put(3, "c"), Ok(None));
        assert_eq!(map.put(3, "C"), Ok(Some("c")));
        assert_eq!(map.len(), 3);

        assert_eq!(map.get(&1), Ok(Some(&"a")));
        assert_eq!(map.get(&4), Ok(None));
        assert_eq!(map.remove(&3), Ok(Some("C")));
        assert_eq!(map.remove(&3), Ok(None));
        assert_eq!(map.len(), 2);
        assert_well_formed(&map);
    }

    #[test]
    fn accessed_node_becomes_root() {
        let mut map = map_of(&[5, 3, 8, 1, 4, 7, 9, 2, 6]);
        assert_eq!(root_key(&map), Some(&6));
        for k in [1, 9, 4, 7, 2] {
            map.get(&k).unwrap();
            assert_eq!(root_key(&map), Some(&k));
            assert_well_formed(&map);
        }
        *map.get_mut(&3).unwrap().unwrap() = 33;
        assert_eq!(root_key(&map), Some(&3));
        map.put(8, 88).unwrap();
        assert_eq!(root_key(&map), Some(&8));

        // misses and navigation keep the shape
        map.get(&100).unwrap();
        map.contains_key(&1).unwrap();
        map.floor_entry(&5).unwrap();
        assert_eq!(root_key(&map), Some(&8));
    }

    #[test]
    fn removing_root_merges_subtrees() {
        let mut map = map_of(&[2, 1, 3]);
        map.get(&2).unwrap();
        assert_eq!(root_key(&map), Some(&2));
        assert_eq!(map.remove(&2), Ok(Some(20)));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&1), Ok(Some(&10)));
        assert_eq!(map.get(&3), Ok(Some(&30)));
        assert_eq!(map.get(&2), Ok(None));
        assert_well_formed(&map);

        assert_eq!(map.remove(&42), Ok(None));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn remove_down_to_empty() {
        let mut map = map_of(&[4, 2, 6, 1, 3, 5, 7]);
        for k in [4, 1, 7, 3, 5, 2, 6] {
            assert_eq!(map.remove(&k), Ok(Some(k * 10)));
            assert_well_formed(&map);
        }
        assert!(map.is_empty());
        assert_eq!(map.first_entry(), None);
    }

    #[test]
    fn navigation() {
        let map = map_of(&[10, 20, 30, 40]);
        assert_eq!(map.first_entry(), Some((&10, &100)));
        assert_eq!(map.last_key(), Some(&40));

        assert_eq!(map.lower_key(&10), Ok(None));
        assert_eq!(map.lower_key(&25), Ok(Some(&20)));
        assert_eq!(map.lower_key(&30), Ok(Some(&20)));
        assert_eq!(map.floor_key(&30), Ok(Some(&30)));
        assert_eq!(map.floor_key(&5), Ok(None));
        assert_eq!(map.ceiling_key(&30), Ok(Some(&30)));
        assert_eq!(map.ceiling_key(&31), Ok(Some(&40)));
        assert_eq!(map.ceiling_key(&41), Ok(None));
        assert_eq!(map.higher_key(&30), Ok(Some(&40)));
        assert_eq!(map.higher_entry(&40), Ok(None));
        assert_eq!(map.higher_entry(&0), Ok(Some((&10, &100))));
    }

    #[test]
    fn poll_first_and_last() {
        let mut map = map_of(&[3, 1, 2]);
        assert_eq!(map.poll_first_entry(), Some((1, 10)));
        assert_eq!(map.poll_last_entry(), Some((3, 30)));
        assert_eq!(map.poll_last_entry(), Some((2, 20)));
        assert_eq!(map.poll_first_entry(), None);
        assert!(map.is_empty());
    }

    #[test]
    fn comparator_binds_on_first_put() {
        let mut map = SplayMap::new();
        assert!(map.comparator().is_none());
        assert_eq!(map.put(f64::NAN, 0), Err(Error::TypeMismatch));
        assert!(map.comparator().is_none());
        assert!(map.is_empty());

        map.put(1.0, 1).unwrap();
        assert!(map.comparator().is_some());
        assert_eq!(map.put(f64::NAN, 2), Err(Error::TypeMismatch));
        assert_eq!(map.get(&f64::NAN), Err(Error::TypeMismatch));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1.0), Ok(Some(&1)));

        // empty lookups never compare
        let mut empty: SplayMap<f64, ()> = SplayMap::new();
        assert_eq!(empty.get(&f64::NAN), Ok(None));
    }

    #[test]
    fn custom_comparator() {
        let mut map = SplayMap::with_comparator(Comparator::natural().reversed());
        assert!(map.comparator().is_some());
        map.put_all([(1, "one"), (3, "three"), (2, "two")]).unwrap();
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![3, 2, 1]);
        assert_eq!(map.first_key(), Some(&3));
        assert_eq!(map.higher_key(&2), Ok(Some(&1)));

        // `None` sorts first and is accepted like any other key
        let mut map =
            SplayMap::with_comparator(Comparator::from_fn(|a: &Option<i32>, b: &Option<i32>| {
                a.cmp(b)
            }));
        map.put(Some(2), 2).unwrap();
        map.put(None, 0).unwrap();
        map.put(Some(1), 1).unwrap();
        assert_eq!(map.first_entry(), Some((&None, &0)));
        assert_eq!(map.get(&None), Ok(Some(&0)));
    }

    #[test]
    fn cursor_is_fail_fast() {
        let mut map = map_of(&[1, 2, 3]);
        let mut cursor = map.cursor();
        assert_eq!(cursor.next(&map), Ok((&1, &10)));
        map.put(4, 40).unwrap();
        assert_eq!(cursor.next(&map), Err(Error::StaleIterator));

        // splaying and value updates do not invalidate
        let mut cursor = map.cursor();
        assert_eq!(cursor.next(&map), Ok((&1, &10)));
        map.get(&4).unwrap();
        map.put(3, 33).unwrap();
        assert_eq!(cursor.next(&map), Ok((&2, &20)));

        map.remove(&4).unwrap();
        assert_eq!(cursor.next(&map), Err(Error::StaleIterator));
    }

    #[test]
    fn cursor_remove() {
        let mut map = map_of(&[1, 2, 3, 4]);
        let mut cursor = map.cursor();
        assert_eq!(
            cursor.remove(&mut map),
            Err(Error::IllegalState("remove without a preceding next"))
        );
        while cursor.has_next() {
            let (k, _) = cursor.next(&map).unwrap();
            if k % 2 == 0 {
                cursor.remove(&mut map).unwrap();
                assert!(matches!(cursor.remove(&mut map), Err(Error::IllegalState(_))));
            }
        }
        assert_eq!(cursor.next(&map), Err(Error::NoSuchElement));
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_well_formed(&map);
    }

    #[test]
    fn views_write_through() {
        let mut map = map_of(&[1, 2, 3, 4]);
        {
            let mut keys = map.key_set();
            assert_eq!(keys.contains(&2), Ok(true));
            assert_eq!(keys.remove(&2), Ok(true));
            assert_eq!(keys.remove(&2), Ok(false));
            assert_eq!(keys.len(), 3);
        }
        {
            let mut values = map.values_view();
            assert!(values.contains(&30));
            assert!(values.remove(&30));
            assert!(!values.contains(&30));
            assert_eq!(values.iter().copied().collect::<Vec<_>>(), vec![10, 40]);
        }
        {
            let mut entries = map.entry_set();
            assert_eq!(entries.contains(&1, &10), Ok(true));
            assert_eq!(entries.contains(&1, &11), Ok(false));
            assert_eq!(entries.remove(&1, &11), Ok(false));
            assert_eq!(entries.remove(&1, &10), Ok(true));
            for (_, v) in entries.iter_mut() {
                *v += 1;
            }
        }
        assert_eq!(map.get(&4), Ok(Some(&41)));
        assert!(map.contains_value(&41));

        map.values_view().clear();
        assert!(map.is_empty());
        assert!(map.key_set().is_empty());
    }

    #[test]
    fn debug_lists_entries_in_order() {
        let map = map_of(&[2, 1]);
        assert_eq!(format!("{map:?}"), "{1: 10, 2: 20}");
    }

    #[quickcheck]
    fn in_order_keys_ascend(keys: Vec<i32>) -> bool {
        let mut map = SplayMap::new();
        for &k in &keys {
            map.put(k, ()).unwrap();
        }
        let mut expected = keys;
        expected.sort_unstable();
        expected.dedup();
        map.keys().copied().collect::<Vec<_>>() == expected
    }

    #[quickcheck]
    fn behaves_like_btree_map(ops: Vec<(u8, i8, u16)>) -> bool {
        let mut map = SplayMap::new();
        let mut model = BTreeMap::new();
        for (op, key, value) in ops {
            let agrees = match op % 8 {
                0 | 1 => map.put(key, value) == Ok(model.insert(key, value)),
                2 => map.get(&key) == Ok(model.get(&key)),
                3 => map.remove(&key) == Ok(model.remove(&key)),
                4 => {
                    map.lower_key(&key) == Ok(model.range(..key).next_back().map(|(k, _)| k))
                        && map.floor_key(&key) == Ok(model.range(..=key).next_back().map(|(k, _)| k))
                }
                5 => {
                    map.ceiling_key(&key) == Ok(model.range(key..).next().map(|(k, _)| k))
                        && map.higher_key(&key)
                            == Ok(model.range((Excluded(key), Unbounded)).next().map(|(k, _)| k))
                }
                6 => map.poll_first_entry() == model.pop_first(),
                _ => map.poll_last_entry() == model.pop_last(),
            };
            if !agrees || map.len() != model.len() {
                return false;
            }
        }
        map.iter().eq(model.iter())
    }
}
