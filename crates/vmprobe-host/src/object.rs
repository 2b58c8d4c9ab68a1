//! Reference-counted object records
//!
//! Every runtime value lives in a heap-allocated `Object` record.
//!
//! # Memory Layout
//!
//! ```text
//! ┌─────────────────────────────────────────┐  ← ObjRef points here
//! │ refcnt: AtomicIsize (8 bytes)           │
//! ├─────────────────────────────────────────┤
//! │ body: ObjectBody                        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! `ObjRef` is an owned reference: cloning retains, dropping releases. The
//! record is freed when its last owner lets go, which in turn releases every
//! reference held by the body.

use crate::code::CodeBody;
use crate::dict::DictBody;
use crate::frame::FrameObject;
use crate::tuple::TupleBody;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{self, AtomicIsize, Ordering};

/// A runtime object record
#[repr(C)]
pub struct Object {
    refcnt: AtomicIsize,
    body: ObjectBody,
}

impl Object {
    /// Get the typed body of this record
    #[inline]
    pub fn body(&self) -> &ObjectBody {
        &self.body
    }

    /// Current number of owners
    #[inline]
    pub fn refcount(&self) -> isize {
        self.refcnt.load(Ordering::Acquire)
    }
}

/// Typed payload of an object record
pub enum ObjectBody {
    /// The singleton-style "no value"
    None,
    /// Integer
    Int(i64),
    /// Immutable string
    Str(Box<str>),
    /// Fixed-length sequence of references
    Tuple(TupleBody),
    /// Integer-keyed mapping
    Dict(DictBody),
    /// Compiled unit
    Code(CodeBody),
    /// Call frame
    Frame(FrameObject),
}

impl ObjectBody {
    /// Get the kind tag of this body
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectBody::None => ObjectKind::None,
            ObjectBody::Int(_) => ObjectKind::Int,
            ObjectBody::Str(_) => ObjectKind::Str,
            ObjectBody::Tuple(_) => ObjectKind::Tuple,
            ObjectBody::Dict(_) => ObjectKind::Dict,
            ObjectBody::Code(_) => ObjectKind::Code,
            ObjectBody::Frame(_) => ObjectKind::Frame,
        }
    }
}

/// Object kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// `ObjectBody::None`
    None,
    /// `ObjectBody::Int`
    Int,
    /// `ObjectBody::Str`
    Str,
    /// `ObjectBody::Tuple`
    Tuple,
    /// `ObjectBody::Dict`
    Dict,
    /// `ObjectBody::Code`
    Code,
    /// `ObjectBody::Frame`
    Frame,
}

impl ObjectKind {
    /// Runtime-facing type name
    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::None => "none",
            ObjectKind::Int => "int",
            ObjectKind::Str => "str",
            ObjectKind::Tuple => "tuple",
            ObjectKind::Dict => "dict",
            ObjectKind::Code => "code",
            ObjectKind::Frame => "frame",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An owned reference to an object record
///
/// # Ownership
///
/// - `clone()` increments the reference count (retain)
/// - `drop()` decrements it (release) and frees the record at zero
/// - `into_raw()` / `from_raw()` move ownership in and out of raw slots
///
/// Identity is pointer identity: `is()` never looks at the body.
pub struct ObjRef {
    ptr: NonNull<Object>,
}

// SAFETY: the reference count is atomic. Bodies with interior mutability are
// only written by `unsafe` primitives whose callers hold the runtime's
// execution serialization.
unsafe impl Send for ObjRef {}
unsafe impl Sync for ObjRef {}

impl ObjRef {
    /// Allocate a new record with a reference count of one
    pub fn new(body: ObjectBody) -> Self {
        let object = Box::new(Object {
            refcnt: AtomicIsize::new(1),
            body,
        });
        Self {
            ptr: NonNull::from(Box::leak(object)),
        }
    }

    /// Allocate a `None` object
    pub fn none() -> Self {
        Self::new(ObjectBody::None)
    }

    /// Allocate an integer object
    pub fn int(value: i64) -> Self {
        Self::new(ObjectBody::Int(value))
    }

    /// Allocate a string object
    pub fn str(value: &str) -> Self {
        Self::new(ObjectBody::Str(value.into()))
    }

    /// Reference identity (same record), not value equality
    #[inline]
    pub fn is(&self, other: &ObjRef) -> bool {
        self.ptr == other.ptr
    }

    /// Address of the record (for diagnostics and hashing)
    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Current number of owners
    #[inline]
    pub fn refcount(&self) -> isize {
        self.object().refcount()
    }

    /// Typed body of the record
    #[inline]
    pub fn body(&self) -> &ObjectBody {
        self.object().body()
    }

    /// Kind tag of the record
    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.body().kind()
    }

    /// Get as integer if this is an int
    pub fn as_int(&self) -> Option<i64> {
        match self.body() {
            ObjectBody::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Get as string slice if this is a str
    pub fn as_str(&self) -> Option<&str> {
        match self.body() {
            ObjectBody::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Get the tuple body if this is a tuple
    pub fn as_tuple(&self) -> Option<&TupleBody> {
        match self.body() {
            ObjectBody::Tuple(tuple) => Some(tuple),
            _ => None,
        }
    }

    /// Get the dict body if this is a dict
    pub fn as_dict(&self) -> Option<&DictBody> {
        match self.body() {
            ObjectBody::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    /// Get the compiled unit if this is a code object
    pub fn as_code(&self) -> Option<&CodeBody> {
        match self.body() {
            ObjectBody::Code(code) => Some(code),
            _ => None,
        }
    }

    /// Get the frame record if this is a frame
    pub fn as_frame(&self) -> Option<&FrameObject> {
        match self.body() {
            ObjectBody::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    /// Give up ownership without releasing
    #[inline]
    pub fn into_raw(self) -> NonNull<Object> {
        let ptr = self.ptr;
        std::mem::forget(self);
        ptr
    }

    /// Take ownership of a reference previously produced by `into_raw`
    ///
    /// # Safety
    ///
    /// `ptr` must come from `into_raw` and its ownership must not be
    /// reclaimed twice.
    #[inline]
    pub unsafe fn from_raw(ptr: NonNull<Object>) -> Self {
        Self { ptr }
    }

    #[inline]
    fn object(&self) -> &Object {
        // SAFETY: an ObjRef keeps its record alive.
        unsafe { self.ptr.as_ref() }
    }
}

impl Clone for ObjRef {
    #[inline]
    fn clone(&self) -> Self {
        self.object().refcnt.fetch_add(1, Ordering::Relaxed);
        Self { ptr: self.ptr }
    }
}

impl Drop for ObjRef {
    fn drop(&mut self) {
        if self.object().refcnt.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        atomic::fence(Ordering::Acquire);
        // SAFETY: this was the last owner; the record came from Box::leak.
        unsafe { drop(Box::from_raw(self.ptr.as_ptr())) }
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.body() {
            ObjectBody::None => write!(f, "None"),
            ObjectBody::Int(value) => write!(f, "Int({})", value),
            ObjectBody::Str(value) => write!(f, "Str({:?})", value),
            ObjectBody::Code(code) => write!(f, "Code({} @ {:#x})", code.name(), self.addr()),
            ObjectBody::Tuple(tuple) => write!(f, "Tuple(len={} @ {:#x})", tuple.len(), self.addr()),
            ObjectBody::Dict(dict) => write!(f, "Dict(len={} @ {:#x})", dict.len(), self.addr()),
            ObjectBody::Frame(_) => write!(f, "Frame({:#x})", self.addr()),
        }
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.body() {
            ObjectBody::None => write!(f, "None"),
            ObjectBody::Int(value) => write!(f, "{}", value),
            ObjectBody::Str(value) => write!(f, "{}", value),
            _ => write!(f, "<{} at {:#x}>", self.kind(), self.addr()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objref_creation() {
        let obj = ObjRef::int(42);
        assert_eq!(obj.as_int(), Some(42));
        assert_eq!(obj.kind(), ObjectKind::Int);
        assert_eq!(obj.refcount(), 1);
    }

    #[test]
    fn test_clone_retains_and_drop_releases() {
        let obj = ObjRef::str("hello");
        let second = obj.clone();
        assert_eq!(obj.refcount(), 2);
        assert!(obj.is(&second));

        drop(second);
        assert_eq!(obj.refcount(), 1);
    }

    #[test]
    fn test_identity_is_not_equality() {
        let a = ObjRef::int(7);
        let b = ObjRef::int(7);
        assert_eq!(a.as_int(), b.as_int());
        assert!(!a.is(&b));
    }

    #[test]
    fn test_raw_round_trip_keeps_count() {
        let obj = ObjRef::int(1);
        let keep = obj.clone();
        let raw = obj.into_raw();
        assert_eq!(keep.refcount(), 2);

        let back = unsafe { ObjRef::from_raw(raw) };
        assert!(back.is(&keep));
        drop(back);
        assert_eq!(keep.refcount(), 1);
    }

    #[test]
    fn test_freeing_container_releases_items() {
        let item = ObjRef::int(5);
        let tuple = ObjRef::tuple(vec![item.clone(), item.clone()]);
        assert_eq!(item.refcount(), 3);

        drop(tuple);
        assert_eq!(item.refcount(), 1);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ObjRef::none().kind().name(), "none");
        assert_eq!(ObjRef::tuple(Vec::new()).kind().to_string(), "tuple");
        assert_eq!(ObjRef::dict().kind().name(), "dict");
    }
}
