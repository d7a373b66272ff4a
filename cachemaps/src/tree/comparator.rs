use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

type CompareFn<K> = dyn Fn(&K, &K) -> Option<Ordering> + Send + Sync;

/// Ordering used by a [`SplayMap`](super::SplayMap).
///
/// A comparator may refuse to order two keys, which surfaces as
/// [`Error::TypeMismatch`]. Cloning is cheap; clones share the same
/// function.
pub struct Comparator<K> {
    cmp: Arc<CompareFn<K>>,
    reversed: bool,
}

impl<K: PartialOrd> Comparator<K> {
    /// The keys' own `PartialOrd`. Pairs it cannot order, such as a NaN
    /// against anything, are a type mismatch.
    pub fn natural() -> Self {
        Comparator {
            cmp: Arc::new(|a: &K, b: &K| a.partial_cmp(b)),
            reversed: false,
        }
    }
}

impl<K> Comparator<K> {
    /// Wraps a total order.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&K, &K) -> Ordering + Send + Sync + 'static,
    {
        Comparator {
            cmp: Arc::new(move |a: &K, b: &K| Some(f(a, b))),
            reversed: false,
        }
    }

    /// Wraps an order that returns `None` for keys it cannot compare.
    pub fn partial<F>(f: F) -> Self
    where
        F: Fn(&K, &K) -> Option<Ordering> + Send + Sync + 'static,
    {
        Comparator {
            cmp: Arc::new(f),
            reversed: false,
        }
    }

    /// The opposite order. Shares the function with `self`.
    pub fn reversed(&self) -> Self {
        Comparator {
            cmp: Arc::clone(&self.cmp),
            reversed: !self.reversed,
        }
    }

    pub fn compare(&self, a: &K, b: &K) -> Result<Ordering> {
        let (a, b) = if self.reversed { (b, a) } else { (a, b) };
        (self.cmp)(a, b).ok_or(Error::TypeMismatch)
    }
}

impl<K> Clone for Comparator<K> {
    fn clone(&self) -> Self {
        Comparator {
            cmp: Arc::clone(&self.cmp),
            reversed: self.reversed,
        }
    }
}

impl<K> fmt::Debug for Comparator<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comparator")
            .field("reversed", &self.reversed)
            .finish_non_exhaustive()
    }
}
