//! Fixed-length reference sequences
//!
//! Tuples are immutable once built: the safe API only reads. The single write
//! primitive, `swap_item_unchecked`, exists for native extensions that have
//! been explicitly allowed to break that contract.

use crate::object::{ObjRef, ObjectBody};
use std::cell::UnsafeCell;

/// Tuple payload: one owned reference per slot
pub struct TupleBody {
    items: Box<[UnsafeCell<ObjRef>]>,
}

impl TupleBody {
    /// Build a tuple body that takes ownership of `items`
    pub fn new(items: impl IntoIterator<Item = ObjRef>) -> Self {
        Self {
            items: items.into_iter().map(UnsafeCell::new).collect(),
        }
    }

    /// Number of slots
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the tuple has no slots
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get a new reference to the item at `index`
    pub fn get(&self, index: usize) -> Option<ObjRef> {
        self.items.get(index).map(|cell| self.read(cell).clone())
    }

    /// Check whether the item at `index` is `other` (identity)
    pub fn item_is(&self, index: usize, other: &ObjRef) -> bool {
        self.items
            .get(index)
            .is_some_and(|cell| self.read(cell).is(other))
    }

    /// Iterate over new references to every item, in order
    pub fn iter(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.items.iter().map(|cell| self.read(cell).clone())
    }

    /// Overwrite the slot at `index` and hand back its previous occupant
    ///
    /// The caller owns both sides of the exchange: `item` must already be
    /// retained and the returned reference must be released.
    ///
    /// # Safety
    ///
    /// - `index` must be in bounds
    /// - No other code may read or rely on the tuple's contents while the
    ///   swap happens (cached hashes, dict keys, concurrent readers)
    pub unsafe fn swap_item_unchecked(&self, index: usize, item: ObjRef) -> ObjRef {
        std::mem::replace(&mut *self.items[index].get(), item)
    }

    #[inline]
    fn read<'a>(&'a self, cell: &'a UnsafeCell<ObjRef>) -> &'a ObjRef {
        // SAFETY: writes only happen through swap_item_unchecked, whose caller
        // guarantees no concurrent reader.
        unsafe { &*cell.get() }
    }
}

impl ObjRef {
    /// Allocate a tuple owning `items`
    pub fn tuple(items: impl IntoIterator<Item = ObjRef>) -> ObjRef {
        ObjRef::new(ObjectBody::Tuple(TupleBody::new(items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_reads() {
        let a = ObjRef::int(1);
        let b = ObjRef::int(2);
        let tuple = ObjRef::tuple(vec![a.clone(), b.clone()]);
        let body = tuple.as_tuple().unwrap();

        assert_eq!(body.len(), 2);
        assert!(body.item_is(0, &a));
        assert!(body.item_is(1, &b));
        assert!(!body.item_is(2, &a));
        assert!(body.get(2).is_none());

        let values: Vec<i64> = body.iter().filter_map(|item| item.as_int()).collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn test_swap_hands_back_previous_occupant() {
        let old = ObjRef::int(1);
        let new = ObjRef::int(2);
        let tuple = ObjRef::tuple(vec![old.clone()]);
        let body = tuple.as_tuple().unwrap();

        let previous = unsafe { body.swap_item_unchecked(0, new.clone()) };
        assert!(previous.is(&old));
        assert!(body.item_is(0, &new));

        drop(previous);
        assert_eq!(old.refcount(), 1);
        assert_eq!(new.refcount(), 2);
    }
}
