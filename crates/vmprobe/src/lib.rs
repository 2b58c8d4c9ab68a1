//! vmprobe - best-effort access to host runtime internals
//!
//! Debuggers and tracers built on top of the host runtime sometimes need
//! state its embedding API does not expose. This crate reaches into the
//! runtime's records directly:
//!
//! - `replace_constants` swaps a compiled unit's constant pool
//! - `get_stack` snapshots a suspended frame's evaluation stack
//! - `replace_in_sequence` substitutes references inside a tuple in place
//! - `propagate_trace` copies the caller's trace callback to every thread
//!
//! Every call runs synchronously to completion on the calling thread. The
//! single-thread operations are `unsafe`: the caller must hold the runtime's
//! execution serialization while they run.
//!
//! # Example
//!
//! ```ignore
//! use vmprobe::{get_stack, propagate_trace};
//!
//! let stack = unsafe { get_stack(&frame)? };
//! let size = stack.as_dict().and_then(|d| d.get_item(-1));
//!
//! tstate.set_trace(TraceCallback::new(on_event, Some(debugger)))?;
//! propagate_trace()?;
//! ```
//!
//! # Frame layouts
//!
//! The frame record layout is chosen with one of the `layout-bracketed`,
//! `layout-depth` or `layout-iframe` features (default: `layout-iframe`).

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(not(any(
    feature = "layout-bracketed",
    feature = "layout-depth",
    feature = "layout-iframe"
)))]
compile_error!("enable one frame layout era: layout-bracketed, layout-depth or layout-iframe");

#[cfg(any(
    all(feature = "layout-bracketed", feature = "layout-depth"),
    all(feature = "layout-bracketed", feature = "layout-iframe"),
    all(feature = "layout-depth", feature = "layout-iframe"),
))]
compile_error!("frame layout eras are mutually exclusive");

pub mod consts;
pub mod error;
pub mod layout;
pub mod sequence;
pub mod stack;
pub mod trace;

pub use consts::{replace_constants, replace_nested_code};
pub use error::{ProbeError, ProbeResult};
pub use layout::{ActiveLayout, FrameLayout, LayoutEra, ACTIVE_ERA};
pub use sequence::{replace_in_sequence, UncheckedSequenceMut};
pub use stack::{get_stack, snapshot, StackSnapshot, SIZE_KEY};
pub use trace::{propagate_profile, propagate_trace};
