//! Frame records
//!
//! A frame owns one contiguous slot region: the unit's `nlocalsplus` local
//! slots come first, the evaluation stack follows. How the frame records the
//! stack's base and depth changed across runtime versions; the build selects
//! exactly one of three record layouts.
//!
//! # Layout Eras
//!
//! ```text
//! layout-bracketed          layout-depth              layout-iframe
//! ┌──────────────────┐      ┌──────────────────┐      ┌──────────────────┐
//! │ f_code           │      │ f_code           │      │ f_frame ─────────┼──┐
//! │ f_valuestack ────┼─┐    │ f_valuestack ────┼─┐    └──────────────────┘  │
//! │ f_stacktop ──────┼─┤    │ f_stackdepth     │ │    ┌──────────────────┐◄─┘
//! └──────────────────┘ │    └──────────────────┘ │    │ f_code           │
//!                      ▼                         ▼    │ stacktop (locals │
//!        [locals..][stack..]       [locals..][stack..]│  + stack depth)  │
//!                                                     │ localsplus ──────┼─► [locals..][stack..]
//!                                                     └──────────────────┘
//! ```

use crate::code::CodeBody;
use crate::object::{ObjRef, ObjectBody};
use crate::{HostError, HostResult};
use std::cell::UnsafeCell;
#[cfg(feature = "layout-iframe")]
use std::ptr::NonNull;

/// One frame slot: empty or holding a reference
pub type Slot = Option<ObjRef>;

/// Locals followed by evaluation stack slots
struct SlotRegion {
    slots: Box<[UnsafeCell<Slot>]>,
}

impl SlotRegion {
    fn build(code: &CodeBody, locals: Vec<Slot>, stack: Vec<Slot>) -> HostResult<Self> {
        if locals.len() != code.nlocalsplus() {
            return Err(HostError::InvalidFrame(format!(
                "{} expects {} local slots, got {}",
                code.name(),
                code.nlocalsplus(),
                locals.len()
            )));
        }
        if stack.len() > code.stacksize() {
            return Err(HostError::InvalidFrame(format!(
                "stack depth {} exceeds {} stacksize {}",
                stack.len(),
                code.name(),
                code.stacksize()
            )));
        }

        let capacity = code.nlocalsplus() + code.stacksize();
        let mut slots = Vec::with_capacity(capacity);
        slots.extend(locals.into_iter().map(UnsafeCell::new));
        slots.extend(stack.into_iter().map(UnsafeCell::new));
        slots.resize_with(capacity, || UnsafeCell::new(None));

        Ok(Self {
            slots: slots.into_boxed_slice(),
        })
    }

    #[inline]
    fn base(&self) -> *mut Slot {
        UnsafeCell::raw_get(self.slots.as_ptr())
    }
}

fn code_body(code: &ObjRef) -> HostResult<&CodeBody> {
    code.as_code().ok_or(HostError::TypeMismatch {
        expected: "code",
        got: code.kind().name(),
    })
}

#[cfg(any(feature = "layout-depth", feature = "layout-iframe"))]
fn stack_depth(depth: usize) -> HostResult<i32> {
    i32::try_from(depth).map_err(|_| HostError::InvalidFrame(format!("stack depth {} overflows", depth)))
}

// ============================================================================
// layout-bracketed: two pointers bracket the live stack
// ============================================================================

/// Frame record (bracketed era)
#[cfg(feature = "layout-bracketed")]
pub struct FrameObject {
    /// Unit being executed
    pub f_code: ObjRef,
    /// First evaluation stack slot
    pub f_valuestack: *mut Slot,
    /// One past the last live evaluation stack slot
    pub f_stacktop: *mut Slot,
    region: SlotRegion,
}

#[cfg(feature = "layout-bracketed")]
impl FrameObject {
    /// Build a suspended frame of `code` with the given locals and live stack
    pub fn new(code: ObjRef, locals: Vec<Slot>, stack: Vec<Slot>) -> HostResult<Self> {
        let depth = stack.len();
        let body = code_body(&code)?;
        let nlocalsplus = body.nlocalsplus();
        let region = SlotRegion::build(body, locals, stack)?;

        // SAFETY: the region holds nlocalsplus + stacksize >= nlocalsplus + depth slots.
        let f_valuestack = unsafe { region.base().add(nlocalsplus) };
        let f_stacktop = unsafe { f_valuestack.add(depth) };

        Ok(Self {
            f_code: code,
            f_valuestack,
            f_stacktop,
            region,
        })
    }

    /// Unit being executed
    pub fn code(&self) -> &ObjRef {
        &self.f_code
    }

    /// First slot of the region (locals)
    pub fn localsplus(&self) -> *mut Slot {
        self.region.base()
    }
}

// ============================================================================
// layout-depth: depth stored on the frame
// ============================================================================

/// Frame record (depth era)
#[cfg(feature = "layout-depth")]
pub struct FrameObject {
    /// Unit being executed
    pub f_code: ObjRef,
    /// First evaluation stack slot
    pub f_valuestack: *mut Slot,
    /// Number of live evaluation stack slots
    pub f_stackdepth: i32,
    region: SlotRegion,
}

#[cfg(feature = "layout-depth")]
impl FrameObject {
    /// Build a suspended frame of `code` with the given locals and live stack
    pub fn new(code: ObjRef, locals: Vec<Slot>, stack: Vec<Slot>) -> HostResult<Self> {
        let f_stackdepth = stack_depth(stack.len())?;
        let body = code_body(&code)?;
        let nlocalsplus = body.nlocalsplus();
        let region = SlotRegion::build(body, locals, stack)?;

        // SAFETY: the region holds at least nlocalsplus slots.
        let f_valuestack = unsafe { region.base().add(nlocalsplus) };

        Ok(Self {
            f_code: code,
            f_valuestack,
            f_stackdepth,
            region,
        })
    }

    /// Unit being executed
    pub fn code(&self) -> &ObjRef {
        &self.f_code
    }

    /// First slot of the region (locals)
    pub fn localsplus(&self) -> *mut Slot {
        self.region.base()
    }
}

// ============================================================================
// layout-iframe: the frame object wraps an interpreter frame
// ============================================================================

/// Inner execution record (interpreter-frame era)
#[cfg(feature = "layout-iframe")]
pub struct InterpreterFrame {
    /// Unit being executed
    pub f_code: ObjRef,
    /// Live slots counted from `localsplus`: locals plus stack depth
    pub stacktop: i32,
    region: SlotRegion,
}

#[cfg(feature = "layout-iframe")]
impl InterpreterFrame {
    /// First slot of the region (locals)
    #[inline]
    pub fn localsplus(&self) -> *mut Slot {
        self.region.base()
    }
}

/// Frame object (interpreter-frame era)
#[cfg(feature = "layout-iframe")]
pub struct FrameObject {
    /// Owned inner execution record
    pub f_frame: NonNull<InterpreterFrame>,
}

#[cfg(feature = "layout-iframe")]
impl FrameObject {
    /// Build a suspended frame of `code` with the given locals and live stack
    pub fn new(code: ObjRef, locals: Vec<Slot>, stack: Vec<Slot>) -> HostResult<Self> {
        let body = code_body(&code)?;
        let stacktop = stack_depth(body.nlocalsplus() + stack.len())?;
        let region = SlotRegion::build(body, locals, stack)?;

        let iframe = Box::new(InterpreterFrame {
            f_code: code,
            stacktop,
            region,
        });

        Ok(Self {
            f_frame: NonNull::from(Box::leak(iframe)),
        })
    }

    /// Inner execution record
    pub fn iframe(&self) -> &InterpreterFrame {
        // SAFETY: the frame object owns its interpreter frame.
        unsafe { self.f_frame.as_ref() }
    }

    /// Unit being executed
    pub fn code(&self) -> &ObjRef {
        &self.iframe().f_code
    }

    /// First slot of the region (locals)
    pub fn localsplus(&self) -> *mut Slot {
        self.iframe().localsplus()
    }
}

#[cfg(feature = "layout-iframe")]
impl Drop for FrameObject {
    fn drop(&mut self) {
        // SAFETY: f_frame came from Box::leak in new() and is never shared.
        unsafe { drop(Box::from_raw(self.f_frame.as_ptr())) }
    }
}

impl ObjRef {
    /// Allocate a frame object
    pub fn frame(frame: FrameObject) -> ObjRef {
        ObjRef::new(ObjectBody::Frame(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(nlocalsplus: usize, stacksize: usize) -> ObjRef {
        let pool = ObjRef::tuple(Vec::new());
        ObjRef::code(CodeBody::new("f", pool, nlocalsplus, stacksize).unwrap())
    }

    #[test]
    fn test_frame_rejects_wrong_local_count() {
        let result = FrameObject::new(unit(2, 4), vec![None], Vec::new());
        assert!(matches!(result, Err(HostError::InvalidFrame(_))));
    }

    #[test]
    fn test_frame_rejects_stack_overflow() {
        let result = FrameObject::new(unit(0, 1), Vec::new(), vec![None, None]);
        assert!(matches!(result, Err(HostError::InvalidFrame(_))));
    }

    #[test]
    fn test_frame_rejects_non_code() {
        let result = FrameObject::new(ObjRef::int(3), Vec::new(), Vec::new());
        assert!(matches!(result, Err(HostError::TypeMismatch { expected: "code", .. })));
    }

    #[test]
    fn test_frame_region_holds_locals_then_stack() {
        let local = ObjRef::int(10);
        let operand = ObjRef::int(20);
        let frame = FrameObject::new(
            unit(1, 3),
            vec![Some(local.clone())],
            vec![Some(operand.clone()), None],
        )
        .unwrap();

        let base = frame.localsplus();
        unsafe {
            assert!((*base).as_ref().unwrap().is(&local));
            assert!((*base.add(1)).as_ref().unwrap().is(&operand));
            assert!((*base.add(2)).is_none());
            assert!((*base.add(3)).is_none());
        }
    }

    #[test]
    fn test_dropping_frame_releases_slots() {
        let operand = ObjRef::int(1);
        let frame = ObjRef::frame(FrameObject::new(unit(0, 2), Vec::new(), vec![Some(operand.clone())]).unwrap());
        assert_eq!(operand.refcount(), 2);
        drop(frame);
        assert_eq!(operand.refcount(), 1);
    }

    #[cfg(feature = "layout-bracketed")]
    #[test]
    fn test_bracketed_pointers() {
        let frame = FrameObject::new(unit(2, 4), vec![None, None], vec![None, None, None]).unwrap();
        unsafe {
            assert_eq!(frame.f_valuestack, frame.localsplus().add(2));
            assert_eq!(frame.f_stacktop.offset_from(frame.f_valuestack), 3);
        }
    }

    #[cfg(feature = "layout-depth")]
    #[test]
    fn test_depth_field() {
        let frame = FrameObject::new(unit(2, 4), vec![None, None], vec![None, None, None]).unwrap();
        assert_eq!(frame.f_stackdepth, 3);
        assert_eq!(frame.f_valuestack, unsafe { frame.localsplus().add(2) });
    }

    #[cfg(feature = "layout-iframe")]
    #[test]
    fn test_iframe_stacktop_includes_locals() {
        let frame = FrameObject::new(unit(2, 4), vec![None, None], vec![None, None, None]).unwrap();
        assert_eq!(frame.iframe().stacktop, 5);
        assert_eq!(frame.code().as_code().unwrap().nlocalsplus(), 2);
    }
}
