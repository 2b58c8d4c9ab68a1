//! Frame layout adapter
//!
//! Answers two questions about a frame record: where its evaluation stack
//! starts, and how many stack slots may be occupied. The answer depends on
//! the runtime version the extension is built against:
//!
//! | Era | Stack base | Occupied slots |
//! |-----|------------|----------------|
//! | `layout-bracketed` | `f_valuestack` | `f_stacktop - f_valuestack` |
//! | `layout-depth` | `f_valuestack` | `f_stackdepth` |
//! | `layout-iframe` | `localsplus + co_nlocalsplus` | `stacktop - co_nlocalsplus` |
//!
//! Only the implementation matching the enabled feature is compiled, and it
//! is re-exported as `ActiveLayout`.

use vmprobe_host::{FrameObject, Slot};

/// Frame layout eras
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutEra {
    /// Stack bracketed by base and top pointers
    Bracketed,
    /// Stack depth stored on the frame
    Depth,
    /// Frame object wrapping an interpreter frame
    InterpreterFrame,
}

/// Stack geometry of one frame layout era
pub trait FrameLayout {
    /// Era described by this layout
    const ERA: LayoutEra;

    /// First evaluation stack slot of `frame`
    ///
    /// # Safety
    ///
    /// `frame` must be a live frame record that is not executing concurrently.
    unsafe fn slot_base(frame: &FrameObject) -> *const Slot;

    /// Number of evaluation stack slots that may be occupied
    ///
    /// A corrupt record may yield a negative count.
    ///
    /// # Safety
    ///
    /// Same as `slot_base`.
    unsafe fn slot_count(frame: &FrameObject) -> isize;
}

/// Bracketed-era layout
#[cfg(feature = "layout-bracketed")]
pub struct BracketedLayout;

#[cfg(feature = "layout-bracketed")]
impl FrameLayout for BracketedLayout {
    const ERA: LayoutEra = LayoutEra::Bracketed;

    #[inline]
    unsafe fn slot_base(frame: &FrameObject) -> *const Slot {
        frame.f_valuestack
    }

    #[inline]
    unsafe fn slot_count(frame: &FrameObject) -> isize {
        frame.f_stacktop.offset_from(frame.f_valuestack)
    }
}

/// Depth-era layout
#[cfg(feature = "layout-depth")]
pub struct DepthLayout;

#[cfg(feature = "layout-depth")]
impl FrameLayout for DepthLayout {
    const ERA: LayoutEra = LayoutEra::Depth;

    #[inline]
    unsafe fn slot_base(frame: &FrameObject) -> *const Slot {
        frame.f_valuestack
    }

    #[inline]
    unsafe fn slot_count(frame: &FrameObject) -> isize {
        frame.f_stackdepth as isize
    }
}

/// Interpreter-frame-era layout
#[cfg(feature = "layout-iframe")]
pub struct InterpreterFrameLayout;

#[cfg(feature = "layout-iframe")]
impl InterpreterFrameLayout {
    #[inline]
    fn nlocalsplus(frame: &FrameObject) -> usize {
        frame
            .iframe()
            .f_code
            .as_code()
            .map_or(0, |code| code.nlocalsplus())
    }
}

#[cfg(feature = "layout-iframe")]
impl FrameLayout for InterpreterFrameLayout {
    const ERA: LayoutEra = LayoutEra::InterpreterFrame;

    #[inline]
    unsafe fn slot_base(frame: &FrameObject) -> *const Slot {
        frame.iframe().localsplus().add(Self::nlocalsplus(frame))
    }

    #[inline]
    unsafe fn slot_count(frame: &FrameObject) -> isize {
        // stacktop counts the locals too
        frame.iframe().stacktop as isize - Self::nlocalsplus(frame) as isize
    }
}

/// Layout of the era selected at build time
#[cfg(feature = "layout-bracketed")]
pub type ActiveLayout = BracketedLayout;

/// Layout of the era selected at build time
#[cfg(feature = "layout-depth")]
pub type ActiveLayout = DepthLayout;

/// Layout of the era selected at build time
#[cfg(feature = "layout-iframe")]
pub type ActiveLayout = InterpreterFrameLayout;

/// Era selected at build time
pub const ACTIVE_ERA: LayoutEra = <ActiveLayout as FrameLayout>::ERA;
