use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::mem;

use log::{debug, trace};

use super::{bucket_index, hash_key, table_len};
use crate::arena::{SlotArena, SlotId};
use crate::error::{Error, Result};

struct HashEntry<K, V> {
    hash: u32,
    key: K,
    value: V,
    /// Next entry in the same bucket.
    next: Option<SlotId>,
    /// Neighbour used more recently.
    before: Option<SlotId>,
    /// Neighbour used less recently.
    after: Option<SlotId>,
}

/// A single-threaded hash map holding at most `max_size` entries.
///
/// Every entry sits in a bucket chain and in a recency list at the same
/// time. `put` and `get` move the touched entry to the head of the recency
/// list; an insertion that pushes the map over its capacity evicts from the
/// tail, so the least recently used entry goes first.
///
/// Iteration visits entries in bucket order, not recency order.
pub struct LruHashMap<K, V, S = RandomState> {
    table: Box<[Option<SlotId>]>,
    entries: SlotArena<HashEntry<K, V>>,
    /// Most recently used entry.
    root: Option<SlotId>,
    /// Least recently used entry, the next eviction candidate.
    last: Option<SlotId>,
    max_size: usize,
    mod_count: usize,
    state: S,
}

impl<K, V> LruHashMap<K, V, RandomState>
where
    K: Hash + Eq,
{
    /// Creates a map bounded to `max_size` entries.
    ///
    /// # Panics
    ///
    /// Panics if `max_size` needs a bucket table larger than the maximum
    /// table length. Use [`LruHashMap::try_with_capacity`] to handle that
    /// case.
    pub fn new(max_size: usize) -> Self {
        Self::with_hasher(max_size, RandomState::new())
    }

    pub fn try_with_capacity(max_size: usize) -> Result<Self> {
        Self::try_with_capacity_and_hasher(max_size, RandomState::new())
    }
}

impl<K, V, S> LruHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    pub fn with_hasher(max_size: usize, hasher: S) -> Self {
        match Self::try_with_capacity_and_hasher(max_size, hasher) {
            Ok(map) => map,
            Err(e) => panic!("{}", e),
        }
    }

    pub fn try_with_capacity_and_hasher(max_size: usize, hasher: S) -> Result<Self> {
        let len = table_len(max_size)?;
        debug!("lru map: max_size={max_size}, buckets={len}");
        Ok(LruHashMap {
            table: vec![None; len].into_boxed_slice(),
            entries: SlotArena::new(),
            root: None,
            last: None,
            max_size,
            mod_count: 0,
            state: hasher,
        })
    }

    /// Inserts `value` under `key` and marks the entry most recently used.
    ///
    /// Returns the replaced value if the key was present. A new key that
    /// takes the map over capacity evicts the least recently used entry,
    /// which may be the one just inserted when the capacity is zero.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        let hash = hash_key(&self.state, &key);
        let bucket = bucket_index(self.table.len(), hash);

        let mut tail = None;
        let mut cur = self.table[bucket];
        while let Some(id) = cur {
            let entry = &mut self.entries[id];
            if entry.hash == hash && entry.key == key {
                let old = mem::replace(&mut entry.value, value);
                self.touch(id);
                return Some(old);
            }
            tail = Some(id);
            cur = entry.next;
        }

        let id = self.entries.insert(HashEntry {
            hash,
            key,
            value,
            next: None,
            before: None,
            after: None,
        });
        match tail {
            Some(tail) => self.entries[tail].next = Some(id),
            None => self.table[bucket] = Some(id),
        }
        self.link_head(id);
        self.mod_count += 1;
        self.evict_overflow();
        None
    }

    /// Returns the value under `key` and marks the entry most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let id = self.find(key)?;
        self.touch(id);
        Some(&self.entries[id].value)
    }

    /// Like [`get`](Self::get), but hands out a mutable reference.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let id = self.find(key)?;
        self.touch(id);
        Some(&mut self.entries[id].value)
    }

    /// Checks for `key` without changing its recency.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).is_some()
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let id = self.find(key)?;
        self.unlink(id).map(|(_, value)| value)
    }

    fn find<Q>(&self, key: &Q) -> Option<SlotId>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = hash_key(&self.state, key);
        let mut cur = self.table[bucket_index(self.table.len(), hash)];
        while let Some(id) = cur {
            let entry = &self.entries[id];
            if entry.hash == hash && entry.key.borrow() == key {
                return Some(id);
            }
            cur = entry.next;
        }
        None
    }
}

impl<K, V, S> LruHashMap<K, V, S> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries the map retains.
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn clear(&mut self) {
        if self.is_empty() {
            return;
        }
        self.table.iter_mut().for_each(|bucket| *bucket = None);
        self.entries.clear();
        self.root = None;
        self.last = None;
        self.mod_count += 1;
    }

    /// Entries in bucket order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            table: &self.table,
            entries: &self.entries,
            next: first_occupied(&self.table, 0),
            remaining: self.len(),
        }
    }

    /// Entries in bucket order, with mutable values. Writing a value does not
    /// change recency.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        let order: Vec<SlotId> = self.ids().collect();
        IterMut {
            inner: self.entries.ordered_mut(&order).into_iter(),
        }
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Live view over the entries of this map.
    pub fn entry_set(&mut self) -> EntrySet<'_, K, V, S> {
        EntrySet { map: self }
    }

    /// Starts a detached, fail-fast cursor over the entries in bucket order.
    ///
    /// The cursor holds no borrow of the map, so the map stays usable while
    /// the cursor is alive. Any structural change not made through the
    /// cursor makes its next step fail with [`Error::StaleIterator`]. The
    /// check is cooperative: it catches modifications made by the same
    /// caller, it does not make concurrent use safe.
    pub fn cursor(&self) -> Cursor {
        Cursor {
            next: first_occupied(&self.table, 0),
            last_returned: None,
            expected_mod_count: self.mod_count,
        }
    }

    fn ids(&self) -> impl Iterator<Item = SlotId> + '_ {
        let mut next = first_occupied(&self.table, 0);
        std::iter::from_fn(move || {
            let id = next?;
            next = successor(&self.table, &self.entries, id);
            Some(id)
        })
    }

    /// Moves `id` to the head of the recency list.
    fn touch(&mut self, id: SlotId) {
        if self.root == Some(id) {
            return;
        }
        self.unlink_recency(id);
        self.link_head(id);
    }

    fn link_head(&mut self, id: SlotId) {
        let old_root = self.root;
        let entry = &mut self.entries[id];
        entry.before = None;
        entry.after = old_root;
        if let Some(root) = old_root {
            self.entries[root].before = Some(id);
        }
        if self.last.is_none() {
            self.last = Some(id);
        }
        self.root = Some(id);
    }

    fn unlink_recency(&mut self, id: SlotId) {
        let entry = &mut self.entries[id];
        let before = entry.before.take();
        let after = entry.after.take();
        match before {
            Some(before_id) => self.entries[before_id].after = after,
            None => self.root = after,
        }
        match after {
            Some(after_id) => self.entries[after_id].before = before,
            None => self.last = before,
        }
    }

    /// Splices `id` out of its bucket chain and the recency list.
    fn unlink(&mut self, id: SlotId) -> Option<(K, V)> {
        let (hash, next) = {
            let entry = self.entries.get(id)?;
            (entry.hash, entry.next)
        };
        let bucket = bucket_index(self.table.len(), hash);
        if self.table[bucket] == Some(id) {
            self.table[bucket] = next;
        } else {
            let mut prev = self.table[bucket];
            while let Some(prev_id) = prev {
                let prev_entry = &mut self.entries[prev_id];
                if prev_entry.next == Some(id) {
                    prev_entry.next = next;
                    break;
                }
                prev = prev_entry.next;
            }
        }
        self.unlink_recency(id);
        self.mod_count += 1;
        self.entries
            .remove(id)
            .map(|entry| (entry.key, entry.value))
    }

    fn evict_overflow(&mut self) {
        while self.len() > self.max_size {
            let Some(victim) = self.last else {
                break;
            };
            trace!("lru map: evicting least recently used entry");
            self.unlink(victim);
        }
    }
}

/// First non-empty bucket at or after `from`.
fn first_occupied(table: &[Option<SlotId>], from: usize) -> Option<SlotId> {
    table.iter().skip(from).find_map(|bucket| *bucket)
}

/// Entry following `id` in bucket order.
fn successor<K, V>(
    table: &[Option<SlotId>],
    entries: &SlotArena<HashEntry<K, V>>,
    id: SlotId,
) -> Option<SlotId> {
    let entry = &entries[id];
    entry
        .next
        .or_else(|| first_occupied(table, bucket_index(table.len(), entry.hash) + 1))
}

impl<K, V, S> Extend<(K, V)> for LruHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (key, value) in iter {
            self.put(key, value);
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for LruHashMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V, S> IntoIterator for &'a LruHashMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Live view over the entries of an [`LruHashMap`].
pub struct EntrySet<'a, K, V, S> {
    map: &'a mut LruHashMap<K, V, S>,
}

impl<'a, K, V, S> EntrySet<'a, K, V, S> {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
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

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl<'a, K, V, S> EntrySet<'a, K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    /// Whether the map holds `key` mapped to `value`. Recency is untouched.
    pub fn contains(&self, key: &K, value: &V) -> bool {
        self.map
            .find(key)
            .is_some_and(|id| self.map.entries[id].value == *value)
    }

    /// Removes `key` if it is mapped to `value`.
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        match self.map.find(key) {
            Some(id) if self.map.entries[id].value == *value => {
                self.map.unlink(id);
                true
            }
            _ => false,
        }
    }
}

/// Detached fail-fast cursor over an [`LruHashMap`], see
/// [`LruHashMap::cursor`].
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

    /// Advances to the next entry.
    ///
    /// Fails with [`Error::NoSuchElement`] past the end and with
    /// [`Error::StaleIterator`] if the map changed behind the cursor.
    pub fn next<'m, K, V, S>(&mut self, map: &'m LruHashMap<K, V, S>) -> Result<(&'m K, &'m V)> {
        let id = self.next.ok_or(Error::NoSuchElement)?;
        if map.mod_count != self.expected_mod_count {
            return Err(Error::StaleIterator);
        }
        let entry = map.entries.get(id).ok_or(Error::StaleIterator)?;
        self.next = successor(&map.table, &map.entries, id);
        self.last_returned = Some(id);
        Ok((&entry.key, &entry.value))
    }

    /// Removes the entry last returned by [`next`](Self::next) and keeps the
    /// cursor valid.
    pub fn remove<K, V, S>(&mut self, map: &mut LruHashMap<K, V, S>) -> Result<(K, V)> {
        let id = self
            .last_returned
            .ok_or(Error::IllegalState("remove without a preceding next"))?;
        if map.mod_count != self.expected_mod_count {
            return Err(Error::StaleIterator);
        }
        let removed = map.unlink(id).ok_or(Error::StaleIterator)?;
        self.expected_mod_count = map.mod_count;
        self.last_returned = None;
        Ok(removed)
    }
}

/// Iterator over the entries of an [`LruHashMap`] in bucket order.
pub struct Iter<'a, K, V> {
    table: &'a [Option<SlotId>],
    entries: &'a SlotArena<HashEntry<K, V>>,
    next: Option<SlotId>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let entry = &self.entries[id];
        self.next = successor(self.table, self.entries, id);
        self.remaining -= 1;
        Some((&entry.key, &entry.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

pub struct IterMut<'a, K, V> {
    inner: std::vec::IntoIter<&'a mut HashEntry<K, V>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|entry| (&entry.key, &mut entry.value))
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
