//! Evaluation stack inspection
//!
//! Produces a sparse view of a suspended frame's evaluation stack:
//!
//! ```text
//! slots:     [ v0 ][ v1 ][ ∅ ][ v3 ][ v4 ]
//! snapshot:  {-1: 5, 0: v0, 1: v1, 3: v3, 4: v4}
//! ```
//!
//! Empty slots never appear, not even with a placeholder. Key `-1` carries
//! the slot count so a consumer can tell trailing gaps from a short stack.

use crate::error::{expect_frame, ProbeResult};
use crate::layout::{ActiveLayout, FrameLayout};
use std::collections::BTreeMap;
use vmprobe_host::{FrameObject, ObjRef};

/// Key carrying the slot count in the dict form
pub const SIZE_KEY: i64 = -1;

/// Sparse copy of a frame's evaluation stack
#[derive(Debug, Clone)]
pub struct StackSnapshot {
    size: isize,
    slots: BTreeMap<usize, ObjRef>,
}

impl StackSnapshot {
    /// Number of slots that may be occupied (negative for a corrupt frame)
    #[inline]
    pub fn size(&self) -> isize {
        self.size
    }

    /// Check if no slot may be occupied
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size <= 0
    }

    /// Value in slot `index`, counted from the stack base
    pub fn get(&self, index: usize) -> Option<&ObjRef> {
        self.slots.get(&index)
    }

    /// Occupied slots in ascending order
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &ObjRef)> {
        self.slots.iter().map(|(index, value)| (*index, value))
    }

    /// Number of occupied slots
    pub fn occupied_count(&self) -> usize {
        self.slots.len()
    }

    /// Top of stack, if that slot is occupied
    pub fn top(&self) -> Option<&ObjRef> {
        if self.size <= 0 {
            return None;
        }
        self.get(self.size as usize - 1)
    }

    /// Dict form: `{-1: size, index: value, ...}`
    pub fn to_dict(&self) -> ObjRef {
        let dict = ObjRef::dict();
        if let Some(body) = dict.as_dict() {
            body.set_item(SIZE_KEY, ObjRef::int(self.size as i64));
            for (index, value) in &self.slots {
                body.set_item(*index as i64, value.clone());
            }
        }
        dict
    }
}

/// Snapshot `frame` using the layout `L`
///
/// # Safety
///
/// `frame` must match layout `L` and must not be executing concurrently.
pub unsafe fn snapshot_with<L: FrameLayout>(frame: &FrameObject) -> StackSnapshot {
    let size = L::slot_count(frame);
    let base = L::slot_base(frame);

    let mut slots = BTreeMap::new();
    for index in 0..size.max(0) as usize {
        if let Some(value) = &*base.add(index) {
            slots.insert(index, value.clone());
        }
    }

    tracing::trace!(target: "vmprobe::stack", size, occupied = slots.len(), "stack snapshot");
    StackSnapshot { size, slots }
}

/// Snapshot the evaluation stack of frame object `frame`
///
/// Values are new references; the frame's slots are left untouched.
///
/// # Errors
///
/// `TypeMismatch` if `frame` is not a frame object.
///
/// # Safety
///
/// The caller must hold the runtime's execution serialization so the frame
/// does not run while it is read.
pub unsafe fn snapshot(frame: &ObjRef) -> ProbeResult<StackSnapshot> {
    let record = expect_frame(frame)?;
    Ok(snapshot_with::<ActiveLayout>(record))
}

/// Snapshot the evaluation stack of `frame` as a dict keyed by slot index,
/// with key `-1` mapped to the slot count
///
/// # Errors
///
/// `TypeMismatch` if `frame` is not a frame object.
///
/// # Safety
///
/// Same as `snapshot`.
pub unsafe fn get_stack(frame: &ObjRef) -> ProbeResult<ObjRef> {
    Ok(snapshot(frame)?.to_dict())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use vmprobe_host::{CodeBody, Slot};

    fn frame(nlocalsplus: usize, stack: Vec<Slot>) -> ObjRef {
        let pool = ObjRef::tuple(Vec::new());
        let code = ObjRef::code(CodeBody::new("f", pool, nlocalsplus, 8).unwrap());
        let locals = (0..nlocalsplus).map(|i| Some(ObjRef::int(100 + i as i64))).collect();
        ObjRef::frame(FrameObject::new(code, locals, stack).unwrap())
    }

    #[test]
    fn test_gaps_are_omitted() {
        let values: Vec<ObjRef> = (0..5).map(ObjRef::int).collect();
        let stack = values
            .iter()
            .enumerate()
            .map(|(i, v)| if i == 2 { None } else { Some(v.clone()) })
            .collect();
        let frame = frame(2, stack);

        let dict = unsafe { get_stack(&frame) }.unwrap();
        let body = dict.as_dict().unwrap();

        assert_eq!(body.keys(), vec![-1, 0, 1, 3, 4]);
        assert_eq!(body.get_item(-1).and_then(|v| v.as_int()), Some(5));
        for index in [0, 1, 3, 4] {
            assert!(body.get_item(index).unwrap().is(&values[index as usize]));
        }
    }

    #[test]
    fn test_locals_are_not_reported() {
        let operand = ObjRef::str("operand");
        let frame = frame(3, vec![Some(operand.clone())]);

        let snap = unsafe { snapshot(&frame) }.unwrap();

        assert_eq!(snap.size(), 1);
        assert_eq!(snap.occupied_count(), 1);
        assert!(snap.get(0).is_some_and(|v| v.is(&operand)));
        assert!(snap.top().is_some_and(|v| v.is(&operand)));
    }

    #[test]
    fn test_empty_stack_has_only_size() {
        let frame = frame(1, Vec::new());
        let dict = unsafe { get_stack(&frame) }.unwrap();
        let body = dict.as_dict().unwrap();

        assert_eq!(body.keys(), vec![SIZE_KEY]);
        assert_eq!(body.get_item(SIZE_KEY).and_then(|v| v.as_int()), Some(0));
    }

    #[test]
    fn test_snapshot_adds_references_without_moving() {
        let operand = ObjRef::int(7);
        let frame = frame(0, vec![Some(operand.clone()), None]);
        assert_eq!(operand.refcount(), 2);

        let first = unsafe { snapshot(&frame) }.unwrap();
        assert_eq!(operand.refcount(), 3);
        assert!(first.top().is_none());

        drop(first);
        assert_eq!(operand.refcount(), 2);

        let again = unsafe { snapshot(&frame) }.unwrap();
        assert!(again.get(0).is_some_and(|v| v.is(&operand)));
    }

    #[test]
    fn test_non_frame_is_rejected() {
        let err = unsafe { get_stack(&ObjRef::int(1)) }.unwrap_err();
        assert_eq!(err, ProbeError::TypeMismatch { expected: "frame", got: "int" });
    }

    /// Drive the recorded stack size to -2 on a frame with two locals
    #[cfg(feature = "layout-iframe")]
    fn corrupt_size(record: &mut FrameObject) {
        unsafe { (*record.f_frame.as_ptr()).stacktop = 0 };
    }

    #[cfg(feature = "layout-depth")]
    fn corrupt_size(record: &mut FrameObject) {
        record.f_stackdepth = -2;
    }

    #[cfg(feature = "layout-bracketed")]
    fn corrupt_size(record: &mut FrameObject) {
        record.f_stacktop = unsafe { record.f_valuestack.sub(2) };
    }

    #[test]
    fn test_negative_size_yields_only_size_entry() {
        let pool = ObjRef::tuple(Vec::new());
        let code = ObjRef::code(CodeBody::new("f", pool, 2, 4).unwrap());
        let operand = ObjRef::int(1);
        let mut record = FrameObject::new(code, vec![None, None], vec![Some(operand.clone())]).unwrap();
        corrupt_size(&mut record);

        let snap = unsafe { snapshot_with::<ActiveLayout>(&record) };

        assert_eq!(snap.size(), -2);
        assert!(snap.is_empty());
        assert_eq!(snap.occupied_count(), 0);
        assert!(snap.top().is_none());
        assert_eq!(operand.refcount(), 2);

        let dict = snap.to_dict();
        let body = dict.as_dict().unwrap();
        assert_eq!(body.keys(), vec![SIZE_KEY]);
        assert_eq!(body.get_item(SIZE_KEY).and_then(|v| v.as_int()), Some(-2));
    }
}
