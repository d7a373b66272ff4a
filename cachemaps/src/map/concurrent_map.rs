use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};
use crossbeam::utils::CachePadded;
use log::{debug, trace};
use parking_lot::Mutex;

use super::{bucket_index, hash_key, table_len, Map};
use crate::error::{Error, Result};

struct Node<K, V> {
    hash: u32,
    key: K,
    value: Atomic<V>,
    next: Atomic<Node<K, V>>,
}

impl<K, V> Drop for Node<K, V> {
    fn drop(&mut self) {
        // SAFETY: a node is dropped either before it was ever shared, or
        // through deferred destruction once no pinned thread can reach it.
        // Either way nobody else can load its value any more.
        let guard = unsafe { epoch::unprotected() };
        let value = self.value.swap(Shared::null(), Ordering::Relaxed, guard);
        if !value.is_null() {
            drop(unsafe { value.into_owned() });
        }
    }
}

struct Bucket<K, V> {
    head: Atomic<Node<K, V>>,
    /// Serialises appends at the tail and unlinks. Never held across more
    /// than one CAS and its re-validation.
    lock: Mutex<()>,
}

/// Reference to a value inside a [`ConcurrentBoundedMap`].
///
/// Keeps the current thread pinned to its epoch, so the value stays
/// readable even if another thread replaces or removes it meanwhile. Drop
/// it promptly: a pinned thread holds back reclamation for the whole map.
pub struct ValueRef<'a, V> {
    _guard: Guard,
    value: *const V,
    _marker: PhantomData<&'a V>,
}

impl<'a, V> ValueRef<'a, V> {
    fn new(guard: Guard, value: *const V) -> Self {
        ValueRef {
            _guard: guard,
            value,
            _marker: PhantomData,
        }
    }
}

impl<'a, V> Deref for ValueRef<'a, V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        // SAFETY: `value` was loaded non-null while `_guard` was pinned.
        // Values are destroyed through the epoch collector only, which
        // waits for every guard pinned before the value became unreachable.
        unsafe { &*self.value }
    }
}

/// A hash map safe for unsynchronised use from many threads.
///
/// Every bucket is an atomic pointer to a singly linked chain. Reads walk
/// the chain without locking. Writers use compare-and-swap on the bucket
/// head or on a `next` pointer, falling back to a short per-bucket lock to
/// serialise tail appends and unlinks. A writer that loses a race throws
/// its local state away and starts again from the bucket head; there is no
/// retry limit.
///
/// The capacity given at construction only sizes the bucket table. The map
/// does not evict and never resizes.
///
/// `len` is updated after a structural change commits, so under concurrent
/// writes it may briefly lag behind what readers can see in the chains.
pub struct ConcurrentBoundedMap<K, V, S = RandomState> {
    table: Box<[Bucket<K, V>]>,
    capacity: usize,
    size: CachePadded<AtomicUsize>,
    mod_count: CachePadded<AtomicUsize>,
    state: S,
}

impl<K, V> ConcurrentBoundedMap<K, V, RandomState>
where
    K: Hash + Eq,
{
    /// Creates a map whose bucket table is sized for `capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` needs a bucket table larger than the maximum
    /// table length.
    pub fn new(capacity: usize) -> Self {
        Self::with_hasher(capacity, RandomState::new())
    }

    pub fn try_with_capacity(capacity: usize) -> Result<Self> {
        Self::try_with_capacity_and_hasher(capacity, RandomState::new())
    }
}

impl<K, V, S> ConcurrentBoundedMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    pub fn with_hasher(capacity: usize, hasher: S) -> Self {
        match Self::try_with_capacity_and_hasher(capacity, hasher) {
            Ok(map) => map,
            Err(e) => panic!("{}", e),
        }
    }

    pub fn try_with_capacity_and_hasher(capacity: usize, hasher: S) -> Result<Self> {
        let len = table_len(capacity)?;
        debug!("concurrent map: capacity={capacity}, buckets={len}");
        let table = (0..len)
            .map(|_| Bucket {
                head: Atomic::null(),
                lock: Mutex::new(()),
            })
            .collect();
        Ok(ConcurrentBoundedMap {
            table,
            capacity,
            size: CachePadded::new(AtomicUsize::new(0)),
            mod_count: CachePadded::new(AtomicUsize::new(0)),
            state: hasher,
        })
    }

    /// Lock-free lookup.
    pub fn get<Q>(&self, key: &Q) -> Option<ValueRef<'_, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = epoch::pin();
        let value = self
            .find(key, &guard)
            .map(|node| node.value.load(Ordering::SeqCst, &guard).as_raw())
            .filter(|value| !value.is_null());
        value.map(move |value| ValueRef::new(guard, value))
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = epoch::pin();
        self.find(key, &guard).is_some()
    }

    /// Maps `key` to `value`, returning the value it replaced.
    pub fn put(&self, key: K, value: V) -> Option<ValueRef<'_, V>> {
        let guard = epoch::pin();
        let old = self.put_val(key, value, false, &guard);
        old.map(move |old| ValueRef::new(guard, old))
    }

    /// Maps `key` to `value` unless the key is present, in which case the
    /// present value is returned and the map is left unchanged.
    pub fn put_if_absent(&self, key: K, value: V) -> Option<ValueRef<'_, V>> {
        let guard = epoch::pin();
        let old = self.put_val(key, value, true, &guard);
        old.map(move |old| ValueRef::new(guard, old))
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<ValueRef<'_, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = epoch::pin();
        let old = self.remove_val(key, &guard);
        old.map(move |old| ValueRef::new(guard, old))
    }

    /// Conditional removal is not provided by this map.
    pub fn remove_if_equals(&self, _key: &K, _value: &V) -> Result<bool> {
        Err(Error::NotSupported("remove(key, value)"))
    }

    /// Replacement of present keys only is not provided by this map.
    pub fn replace(&self, _key: K, _value: V) -> Result<Option<ValueRef<'_, V>>> {
        Err(Error::NotSupported("replace(key, value)"))
    }

    /// Compare-and-replace is not provided by this map.
    pub fn replace_if_equals(&self, _key: K, _old: &V, _new: V) -> Result<bool> {
        Err(Error::NotSupported("replace(key, old, new)"))
    }

    /// There is no iterable view of a map other threads keep writing to.
    pub fn entry_set(&self) -> Result<std::iter::Empty<(&K, ValueRef<'_, V>)>> {
        Err(Error::NotSupported("entry_set()"))
    }

    fn bucket(&self, hash: u32) -> &Bucket<K, V> {
        &self.table[bucket_index(self.table.len(), hash)]
    }

    fn find<'g, Q>(&'g self, key: &Q, guard: &'g Guard) -> Option<&'g Node<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = hash_key(&self.state, key);
        let mut cur = self.bucket(hash).head.load(Ordering::SeqCst, guard);
        // SAFETY: every node reached from the table while `guard` is pinned
        // is destroyed no earlier than the guard is dropped.
        while let Some(node) = unsafe { cur.as_ref() } {
            if node.hash == hash && node.key.borrow() == key {
                return Some(node);
            }
            cur = node.next.load(Ordering::SeqCst, guard);
        }
        None
    }

    /// Whether `target` can still be reached from the bucket head.
    fn is_linked(bucket: &Bucket<K, V>, target: Shared<'_, Node<K, V>>, guard: &Guard) -> bool {
        let mut cur = bucket.head.load(Ordering::SeqCst, guard);
        // SAFETY: as in `find`.
        while let Some(node) = unsafe { cur.as_ref() } {
            if cur == target {
                return true;
            }
            cur = node.next.load(Ordering::SeqCst, guard);
        }
        false
    }

    /// Stores the value carried by `node` into `existing`, or only reads the
    /// present value when `only_if_absent`. Caller holds the bucket lock.
    fn swap_value(
        existing: &Node<K, V>,
        node: &Owned<Node<K, V>>,
        only_if_absent: bool,
        guard: &Guard,
    ) -> *const V {
        if only_if_absent {
            return existing.value.load(Ordering::SeqCst, guard).as_raw();
        }
        let value = node.value.swap(Shared::null(), Ordering::SeqCst, guard);
        let old = existing.value.swap(value, Ordering::SeqCst, guard);
        // SAFETY: `old` is no longer reachable through the map. Threads that
        // loaded it before the swap are pinned no later than we are, so the
        // deferred destruction runs after they let go of it.
        unsafe { guard.defer_destroy(old) };
        old.as_raw()
    }

    /// Returns the previous value, or `None` if a new node was linked.
    fn put_val(&self, key: K, value: V, only_if_absent: bool, guard: &Guard) -> Option<*const V> {
        let hash = hash_key(&self.state, &key);
        let bucket = self.bucket(hash);
        let mut node = Owned::new(Node {
            hash,
            key,
            value: Atomic::new(value),
            next: Atomic::null(),
        });

        let old = 'retry: loop {
            let head = bucket.head.load(Ordering::SeqCst, guard);
            if head.is_null() {
                match bucket
                    .head
                    .compare_exchange(Shared::null(), node, Ordering::SeqCst, Ordering::SeqCst, guard)
                {
                    Ok(_) => break None,
                    Err(err) => {
                        trace!("concurrent map: lost race for empty bucket, retrying");
                        node = err.new;
                        continue;
                    }
                }
            }

            let mut tail = head;
            let mut found = None;
            let mut cur = head;
            // SAFETY: as in `find`.
            while let Some(n) = unsafe { cur.as_ref() } {
                if n.hash == hash && n.key == node.key {
                    found = Some(cur);
                    break;
                }
                tail = cur;
                cur = n.next.load(Ordering::SeqCst, guard);
            }

            let _lock = bucket.lock.lock();
            if let Some(existing) = found {
                if !Self::is_linked(bucket, existing, guard) {
                    trace!("concurrent map: entry unlinked before update, retrying");
                    continue;
                }
                // SAFETY: still linked, and unlinks wait for the lock we hold.
                let existing = unsafe { existing.deref() };
                break Some(Self::swap_value(existing, &node, only_if_absent, guard));
            }

            if !Self::is_linked(bucket, tail, guard) {
                trace!("concurrent map: tail unlinked before append, retrying");
                continue;
            }
            loop {
                // SAFETY: `tail` is linked and unlinks wait for the lock we hold.
                let tail_node = unsafe { tail.deref() };
                match tail_node.next.compare_exchange(
                    Shared::null(),
                    node,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                    guard,
                ) {
                    Ok(_) => break 'retry None,
                    Err(err) => {
                        node = err.new;
                        tail = err.current;
                        // SAFETY: `err.current` was just read from a linked node.
                        let appended = unsafe { tail.deref() };
                        if appended.hash == hash && appended.key == node.key {
                            break 'retry Some(Self::swap_value(
                                appended,
                                &node,
                                only_if_absent,
                                guard,
                            ));
                        }
                    }
                }
            }
        };

        if old.is_none() {
            self.size.fetch_add(1, Ordering::SeqCst);
            self.mod_count.fetch_add(1, Ordering::SeqCst);
        }
        old
    }

    fn remove_val<Q>(&self, key: &Q, guard: &Guard) -> Option<*const V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = hash_key(&self.state, key);
        let bucket = self.bucket(hash);
        // misses never take the lock
        Self::scan(bucket, hash, key, guard)?;
        let _lock = bucket.lock.lock();
        self.unlink_locked(bucket, hash, key, guard)
    }

    /// Finds the node holding `key` together with its predecessor, which is
    /// null when the node is the bucket head.
    fn scan<'g, Q>(
        bucket: &'g Bucket<K, V>,
        hash: u32,
        key: &Q,
        guard: &'g Guard,
    ) -> Option<(Shared<'g, Node<K, V>>, Shared<'g, Node<K, V>>)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut prev = Shared::null();
        let mut cur = bucket.head.load(Ordering::SeqCst, guard);
        loop {
            // SAFETY: as in `find`.
            let node = unsafe { cur.as_ref() }?;
            if node.hash == hash && node.key.borrow() == key {
                return Some((prev, cur));
            }
            prev = cur;
            cur = node.next.load(Ordering::SeqCst, guard);
        }
    }

    /// Unlinks the node holding `key`. Caller holds the bucket lock, so no
    /// other thread can unlink or append while the chain is rescanned here:
    /// the predecessor found is live and still points at the target.
    fn unlink_locked<Q>(
        &self,
        bucket: &Bucket<K, V>,
        hash: u32,
        key: &Q,
        guard: &Guard,
    ) -> Option<*const V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        loop {
            let (prev, target) = Self::scan(bucket, hash, key, guard)?;
            // SAFETY: as in `find`.
            let target_node = unsafe { target.deref() };
            let next = target_node.next.load(Ordering::SeqCst, guard);
            let link = if prev.is_null() {
                &bucket.head
            } else {
                // SAFETY: as in `find`.
                unsafe { &prev.deref().next }
            };
            if link
                .compare_exchange(target, next, Ordering::SeqCst, Ordering::SeqCst, guard)
                .is_err()
            {
                trace!("concurrent map: chain changed during remove, retrying");
                continue;
            }
            let value = target_node.value.load(Ordering::SeqCst, guard).as_raw();

            // SAFETY: `target` is unreachable from the table now, and only
            // the lock holder could have unlinked it. Readers that still hold
            // it are pinned no later than we are.
            unsafe { guard.defer_destroy(target) };
            self.size.fetch_sub(1, Ordering::SeqCst);
            self.mod_count.fetch_add(1, Ordering::SeqCst);
            return Some(value);
        }
    }
}

impl<K, V, S> ConcurrentBoundedMap<K, V, S> {
    pub fn len(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The capacity hint the bucket table was sized from.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of structural changes made so far.
    pub fn mod_count(&self) -> usize {
        self.mod_count.load(Ordering::SeqCst)
    }
}

impl<K, V, S> Drop for ConcurrentBoundedMap<K, V, S> {
    fn drop(&mut self) {
        // SAFETY: we have `&mut self`, and every `ValueRef` borrows the map,
        // so no other thread can be inside the chains.
        let guard = unsafe { epoch::unprotected() };
        for bucket in self.table.iter() {
            let mut cur = bucket.head.swap(Shared::null(), Ordering::Relaxed, guard);
            while !cur.is_null() {
                // SAFETY: we own the whole chain now.
                let node = unsafe { cur.into_owned() };
                cur = node.next.load(Ordering::Relaxed, guard);
            }
        }
    }
}

impl<K, V, S> Map for ConcurrentBoundedMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    type Key = K;
    type Val = V;
    type ValueRef<'a>
        = ValueRef<'a, V>
    where
        Self: 'a;

    fn get(&self, key: &K) -> Option<ValueRef<'_, V>> {
        ConcurrentBoundedMap::get(self, key)
    }

    fn contains_key(&self, key: &K) -> bool {
        ConcurrentBoundedMap::contains_key(self, key)
    }

    fn put(&self, key: K, value: V) -> Option<ValueRef<'_, V>> {
        ConcurrentBoundedMap::put(self, key, value)
    }

    fn put_if_absent(&self, key: K, value: V) -> Option<ValueRef<'_, V>> {
        ConcurrentBoundedMap::put_if_absent(self, key, value)
    }

    fn remove(&self, key: &K) -> Option<ValueRef<'_, V>> {
        ConcurrentBoundedMap::remove(self, key)
    }

    fn len(&self) -> usize {
        ConcurrentBoundedMap::len(self)
    }
}
