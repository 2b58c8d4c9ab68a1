//! Compiled units
//!
//! A code object owns its constant pool (a tuple) by reference. The pool's
//! length is fixed by the compiler; instructions index into it.

use crate::object::{ObjRef, ObjectBody};
use crate::{HostError, HostResult};
use std::cell::UnsafeCell;

/// Compiled unit payload
pub struct CodeBody {
    name: Box<str>,
    consts: UnsafeCell<ObjRef>,
    nlocalsplus: usize,
    stacksize: usize,
}

impl CodeBody {
    /// Create a compiled unit
    ///
    /// # Arguments
    /// * `name` - Qualified name of the function or module body
    /// * `consts` - Constant pool, must be a tuple
    /// * `nlocalsplus` - Locals, cells and free variables stored before the stack
    /// * `stacksize` - Maximum evaluation stack depth
    pub fn new(name: &str, consts: ObjRef, nlocalsplus: usize, stacksize: usize) -> HostResult<Self> {
        if consts.as_tuple().is_none() {
            return Err(HostError::TypeMismatch {
                expected: "tuple",
                got: consts.kind().name(),
            });
        }

        Ok(Self {
            name: name.into(),
            consts: UnsafeCell::new(consts),
            nlocalsplus,
            stacksize,
        })
    }

    /// Qualified name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a new reference to the constant pool
    pub fn consts(&self) -> ObjRef {
        // SAFETY: writes go through swap_consts_unchecked only.
        unsafe { (*self.consts.get()).clone() }
    }

    /// Length of the constant pool
    pub fn consts_len(&self) -> usize {
        // SAFETY: see consts().
        unsafe { (*self.consts.get()).as_tuple().map_or(0, |pool| pool.len()) }
    }

    /// Number of local, cell and free slots preceding the evaluation stack
    #[inline]
    pub fn nlocalsplus(&self) -> usize {
        self.nlocalsplus
    }

    /// Maximum evaluation stack depth
    #[inline]
    pub fn stacksize(&self) -> usize {
        self.stacksize
    }

    /// Install `consts` as the constant pool and hand back the previous one
    ///
    /// `consts` must already be retained; the caller releases the result.
    ///
    /// # Safety
    ///
    /// - `consts` must be a tuple of the current pool's length
    /// - The unit must not be executing or being read concurrently
    pub unsafe fn swap_consts_unchecked(&self, consts: ObjRef) -> ObjRef {
        std::mem::replace(&mut *self.consts.get(), consts)
    }
}

impl ObjRef {
    /// Allocate a code object
    pub fn code(body: CodeBody) -> ObjRef {
        ObjRef::new(ObjectBody::Code(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_requires_tuple_pool() {
        let result = CodeBody::new("f", ObjRef::int(1), 0, 0);
        assert!(matches!(
            result,
            Err(HostError::TypeMismatch { expected: "tuple", got: "int" })
        ));
    }

    #[test]
    fn test_code_accessors() {
        let pool = ObjRef::tuple(vec![ObjRef::int(1), ObjRef::none()]);
        let code = ObjRef::code(CodeBody::new("mod.f", pool.clone(), 3, 8).unwrap());
        let body = code.as_code().unwrap();

        assert_eq!(body.name(), "mod.f");
        assert_eq!(body.nlocalsplus(), 3);
        assert_eq!(body.stacksize(), 8);
        assert_eq!(body.consts_len(), 2);
        assert!(body.consts().is(&pool));
    }
}
