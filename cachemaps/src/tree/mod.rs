//! Ordered maps.

mod comparator;
mod splay_map;

pub use comparator::Comparator;
pub use splay_map::{
    Cursor, EntrySet, Iter, IterMut, KeySet, Keys, SplayMap, ValueCollection, Values, ValuesMut,
};
