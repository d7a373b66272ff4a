//! This module contains the hash-based maps: a single-threaded LRU map and
//! a concurrently shared bucket-chain map.
//!
//! Both address buckets the same way: the key's 64-bit hash is folded and
//! spread into 31 usable bits, then masked against a power-of-two table
//! whose length is fixed at construction.

mod concurrent_map;
mod lru_map;

pub use concurrent_map::{ConcurrentBoundedMap, ValueRef};
pub use lru_map::{Cursor, EntrySet, Iter, IterMut, Keys, LruHashMap, Values};

use std::hash::{BuildHasher, Hash, Hasher};
use std::ops::Deref;

use crate::error::{Error, Result};

/// Usable bits of a spread hash.
const HASH_BITS: u32 = 0x7fff_ffff;

/// Ratio of entries to buckets the table is sized for.
const LOAD_FACTOR: f64 = 0.75;

/// Largest bucket table either map will allocate.
pub(crate) const MAX_TABLE_LEN: usize = 1 << 30;

/// Common functionalities for hash maps shared between threads.
pub trait Map {
    /// Key type for a HashMap implementation.
    type Key: Hash + Eq;
    /// Value type for a HashMap implementation.
    type Val;
    /// HashMap entry reference type.
    type ValueRef<'a>: Deref<Target = Self::Val>
    where
        Self: 'a;

    /// Get reference to a value associated with a key, if it exists.
    fn get(&self, key: &Self::Key) -> Option<Self::ValueRef<'_>>;

    /// Check whether the map contains a value mapped to the given key.
    fn contains_key(&self, key: &Self::Key) -> bool;

    /// Emplaces a key-value pair into the map, returning the value it
    /// replaced.
    fn put(&self, key: Self::Key, value: Self::Val) -> Option<Self::ValueRef<'_>>;

    /// Emplaces a key-value pair only if the key is absent. Returns the
    /// value already present otherwise.
    fn put_if_absent(&self, key: Self::Key, value: Self::Val) -> Option<Self::ValueRef<'_>>;

    /// Removes the pair stored under `key`, returning its value.
    fn remove(&self, key: &Self::Key) -> Option<Self::ValueRef<'_>>;

    /// Number of pairs in the map.
    fn len(&self) -> usize;

    /// Whether the map holds no pairs.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Folds a 64-bit hash to 32 bits and mixes the high half into the low
/// half, so that masking by a small table length still sees every bit.
pub(crate) fn spread(hash: u64) -> u32 {
    let h = (hash as u32) ^ ((hash >> 32) as u32);
    (h ^ (h >> 16)) & HASH_BITS
}

pub(crate) fn hash_key<K, S>(state: &S, key: &K) -> u32
where
    K: Hash + ?Sized,
    S: BuildHasher,
{
    let mut hasher = state.build_hasher();
    key.hash(&mut hasher);
    spread(hasher.finish())
}

/// Bucket a spread hash lands in. `table_len` is a power of two.
pub(crate) fn bucket_index(table_len: usize, hash: u32) -> usize {
    (table_len - 1) & hash as usize
}

/// Table length for a map expected to hold `capacity` entries.
pub(crate) fn table_len(capacity: usize) -> Result<usize> {
    let wanted = ((capacity as f64 / LOAD_FACTOR) as usize).saturating_add(1);
    if wanted > MAX_TABLE_LEN {
        return Err(Error::InvalidArgument(format!(
            "capacity {capacity} needs more than {MAX_TABLE_LEN} buckets"
        )));
    }
    Ok(wanted.next_power_of_two())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spread_keeps_31_bits() {
        assert_eq!(spread(u64::MAX) & !HASH_BITS, 0);
        assert_eq!(spread(0), 0);
        // high bits of the 64-bit hash reach the low bits
        assert_ne!(spread(1 << 48), 0);
    }

    #[test]
    fn table_len_is_power_of_two_with_headroom() {
        assert_eq!(table_len(0), Ok(1));
        assert_eq!(table_len(1), Ok(2));
        assert_eq!(table_len(2), Ok(4));
        assert_eq!(table_len(12), Ok(32));
        for capacity in [3, 7, 100, 1000, 4096] {
            let len = table_len(capacity).unwrap();
            assert!(len.is_power_of_two());
            assert!(len as f64 * LOAD_FACTOR >= capacity as f64);
        }
    }

    #[test]
    fn table_len_rejects_huge_capacity() {
        assert!(matches!(
            table_len(MAX_TABLE_LEN),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn bucket_index_masks_hash() {
        assert_eq!(bucket_index(1, 12345), 0);
        assert_eq!(bucket_index(16, 0x1f), 0xf);
    }
}
