//! In-place reference substitution inside tuples
//!
//! Tuples are immutable by contract. `UncheckedSequenceMut` is the one
//! deliberate way around that contract: building one is `unsafe`, and the
//! general tuple API stays read-only.

use crate::error::{expect_tuple, ProbeResult};
use vmprobe_host::{ObjRef, TupleBody};

/// Mutable view over a tuple that is nominally immutable
pub struct UncheckedSequenceMut<'a> {
    tuple: &'a TupleBody,
}

impl<'a> UncheckedSequenceMut<'a> {
    /// Open a tuple for in-place writes
    ///
    /// # Safety
    ///
    /// While the view is alive, nothing may read the tuple concurrently or
    /// rely on its contents staying fixed (cached hashes, dict keys,
    /// interned constants compared by value).
    pub unsafe fn new(tuple: &'a TupleBody) -> Self {
        Self { tuple }
    }

    /// Overwrite every slot identical to `target` with `replacement`
    ///
    /// Identity, not equality, decides a match. Returns the number of slots
    /// overwritten.
    pub fn replace_identical(&mut self, target: &ObjRef, replacement: &ObjRef) -> usize {
        let mut replaced = 0;
        for index in 0..self.tuple.len() {
            if !self.tuple.item_is(index, target) {
                continue;
            }
            let retained = replacement.clone();
            // SAFETY: index is in bounds; exclusive access is the contract of new().
            let released = unsafe { self.tuple.swap_item_unchecked(index, retained) };
            drop(released);
            replaced += 1;
        }
        replaced
    }
}

/// Replace every occurrence of `target` in tuple `seq` with `replacement`
///
/// Returns the number of replaced occurrences; zero matches is a no-op.
///
/// # Errors
///
/// `TypeMismatch` if `seq` is not a tuple.
///
/// # Safety
///
/// Same contract as `UncheckedSequenceMut::new`, plus the runtime's execution
/// serialization must be held.
pub unsafe fn replace_in_sequence(seq: &ObjRef, target: &ObjRef, replacement: &ObjRef) -> ProbeResult<usize> {
    let tuple = expect_tuple(seq)?;
    let replaced = UncheckedSequenceMut::new(tuple).replace_identical(target, replacement);

    if replaced > 0 {
        tracing::debug!(target: "vmprobe::sequence", replaced, len = tuple.len(), "tuple items replaced");
    }
    Ok(replaced)
}
