//! Integer-keyed mappings
//!
//! The only mapping shape native extensions build here: keys are plain
//! integers, values are owned references.

use crate::object::{ObjRef, ObjectBody};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Dict payload
#[derive(Default)]
pub struct DictBody {
    entries: Mutex<BTreeMap<i64, ObjRef>>,
}

impl DictBody {
    /// Create an empty dict body
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`; the previous value is released
    pub fn set_item(&self, key: i64, value: ObjRef) {
        let previous = self.entries.lock().insert(key, value);
        drop(previous);
    }

    /// Get a new reference to the value under `key`
    pub fn get_item(&self, key: i64) -> Option<ObjRef> {
        self.entries.lock().get(&key).cloned()
    }

    /// Remove `key` and return its value
    pub fn pop_item(&self, key: i64) -> Option<ObjRef> {
        self.entries.lock().remove(&key)
    }

    /// Check if `key` is present
    pub fn contains(&self, key: i64) -> bool {
        self.entries.lock().contains_key(&key)
    }

    /// Keys in ascending order
    pub fn keys(&self) -> Vec<i64> {
        self.entries.lock().keys().copied().collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the dict is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjRef {
    /// Allocate an empty dict
    pub fn dict() -> ObjRef {
        ObjRef::new(ObjectBody::Dict(DictBody::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dict_operations() {
        let dict = ObjRef::dict();
        let body = dict.as_dict().unwrap();
        assert!(body.is_empty());

        body.set_item(3, ObjRef::int(30));
        body.set_item(-1, ObjRef::int(5));
        assert_eq!(body.keys(), vec![-1, 3]);
        assert_eq!(body.get_item(3).and_then(|v| v.as_int()), Some(30));
        assert!(!body.contains(0));

        let popped = body.pop_item(-1).unwrap();
        assert_eq!(popped.as_int(), Some(5));
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_overwrite_releases_previous() {
        let first = ObjRef::int(1);
        let dict = ObjRef::dict();
        let body = dict.as_dict().unwrap();

        body.set_item(0, first.clone());
        assert_eq!(first.refcount(), 2);
        body.set_item(0, ObjRef::int(2));
        assert_eq!(first.refcount(), 1);
    }
}
