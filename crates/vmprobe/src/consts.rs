//! Constant pool replacement
//!
//! A compiled unit owns its constant pool by reference. Swapping the pool
//! changes what the unit's instructions load from now on; anyone already
//! holding the old pool keeps a valid, orphaned copy.

use crate::error::{expect_code, expect_tuple, ProbeError, ProbeResult};
use crate::sequence;
use vmprobe_host::ObjRef;

/// Install `consts` as the constant pool of `code`
///
/// The new pool is retained before the old one is released, so passing the
/// unit's current pool is harmless.
///
/// # Errors
///
/// - `TypeMismatch` if `code` is not a code object or `consts` not a tuple
/// - `SizeMismatch` if `consts` has a different length than the current
///   pool; nothing is modified
///
/// # Safety
///
/// The caller must hold the runtime's execution serialization: the unit must
/// not be executing or read by another thread during the swap.
pub unsafe fn replace_constants(code: &ObjRef, consts: &ObjRef) -> ProbeResult<()> {
    let unit = expect_code(code)?;
    let pool = expect_tuple(consts)?;

    let expected = unit.consts_len();
    if pool.len() != expected {
        return Err(ProbeError::SizeMismatch {
            expected,
            got: pool.len(),
        });
    }

    let released = unit.swap_consts_unchecked(consts.clone());
    drop(released);

    tracing::debug!(target: "vmprobe::consts", unit = unit.name(), len = expected, "constant pool replaced");
    Ok(())
}

/// Replace every occurrence of the nested unit `old` in `parent`'s constant
/// pool with `new`
///
/// Returns the number of replaced occurrences.
///
/// # Safety
///
/// Same contract as `sequence::replace_in_sequence`, applied to the parent's
/// constant pool.
pub unsafe fn replace_nested_code(parent: &ObjRef, old: &ObjRef, new: &ObjRef) -> ProbeResult<usize> {
    let unit = expect_code(parent)?;
    expect_code(old)?;
    expect_code(new)?;

    let pool = unit.consts();
    sequence::replace_in_sequence(&pool, old, new)
}
