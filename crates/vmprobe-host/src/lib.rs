//! Host runtime internals
//!
//! This crate describes the parts of the host runtime that a native extension
//! can reach but the public embedding API does not expose:
//! - Reference-counted object records (`Object`, `ObjRef`)
//! - Tuples, integer-keyed dicts and compiled units (`CodeBody`)
//! - Frame records, in the layout of the era selected at build time
//! - Thread states, the interpreter's thread registry and its head lock
//!
//! # Layout Eras
//!
//! Exactly one of the `layout-bracketed`, `layout-depth` or `layout-iframe`
//! features must be enabled. Each one compiles a different `FrameObject`
//! record; there is no runtime switch between them.

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

pub mod code;
pub mod dict;
pub mod frame;
pub mod object;
pub mod thread;
pub mod tuple;

pub use code::CodeBody;
pub use dict::DictBody;
#[cfg(feature = "layout-iframe")]
pub use frame::InterpreterFrame;
pub use frame::{FrameObject, Slot};
pub use object::{ObjRef, Object, ObjectBody, ObjectKind};
pub use thread::{
    CallbackKind, HeadLock, Interpreter, ThreadId, ThreadState, TraceCallback, TraceEvent, TraceFn,
};
pub use tuple::TupleBody;

/// Errors raised by host runtime primitives
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The thread state is being torn down and no longer accepts callbacks
    #[error("Thread {0} is finalizing")]
    ThreadFinalizing(ThreadId),

    /// The thread state is not linked into a live interpreter
    #[error("Thread {0} is not registered with a live interpreter")]
    NotRegistered(ThreadId),

    /// An object of the wrong kind was supplied
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected object kind
        expected: &'static str,
        /// Actual object kind
        got: &'static str,
    },

    /// Frame construction arguments do not fit the compiled unit
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// Host primitive result
pub type HostResult<T> = Result<T, HostError>;
