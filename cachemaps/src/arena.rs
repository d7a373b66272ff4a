//! Index-addressed node storage.
//!
//! Containers whose nodes point at each other in both directions (the
//! recency list, the splay tree) keep their nodes here and link them by
//! [`SlotId`] instead of by pointer.

use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SlotId(usize);

#[derive(Debug)]
pub(crate) struct SlotArena<T> {
    slots: Vec<Option<T>>,
    free_list: Vec<usize>,
    len: usize,
}

impl<T> SlotArena<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    pub(crate) fn insert(&mut self, value: T) -> SlotId {
        let idx = if let Some(idx) = self.free_list.pop() {
            self.slots[idx] = Some(value);
            idx
        } else {
            self.slots.push(Some(value));
            self.slots.len() - 1
        };
        self.len += 1;
        SlotId(idx)
    }

    pub(crate) fn remove(&mut self, id: SlotId) -> Option<T> {
        let slot = self.slots.get_mut(id.0)?;
        let value = slot.take()?;
        self.free_list.push(id.0);
        self.len -= 1;
        Some(value)
    }

    pub(crate) fn get(&self, id: SlotId) -> Option<&T> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref())
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free_list.clear();
        self.len = 0;
    }

    /// Mutable access to the slots named by `order`, yielded in that order.
    /// Every id must be occupied and appear at most once.
    pub(crate) fn ordered_mut(&mut self, order: &[SlotId]) -> Vec<&mut T> {
        let mut rank = vec![usize::MAX; self.slots.len()];
        for (pos, id) in order.iter().enumerate() {
            rank[id.0] = pos;
        }
        let mut placed: Vec<Option<&mut T>> = (0..order.len()).map(|_| None).collect();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.as_mut() {
                if let Some(pos) = rank.get(idx).copied().filter(|&pos| pos != usize::MAX) {
                    placed[pos] = Some(value);
                }
            }
        }
        placed.into_iter().flatten().collect()
    }
}

impl<T> Default for SlotArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<SlotId> for SlotArena<T> {
    type Output = T;

    fn index(&self, id: SlotId) -> &T {
        match self.slots.get(id.0) {
            Some(Some(value)) => value,
            _ => panic!("slot {} is vacant", id.0),
        }
    }
}

impl<T> IndexMut<SlotId> for SlotArena<T> {
    fn index_mut(&mut self, id: SlotId) -> &mut T {
        match self.slots.get_mut(id.0) {
            Some(Some(value)) => value,
            _ => panic!("slot {} is vacant", id.0),
        }
    }
}
