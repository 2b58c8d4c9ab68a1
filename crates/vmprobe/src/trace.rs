//! Trace callback propagation
//!
//! Copies the calling thread's trace (or profile) callback pair to every
//! other live thread of its interpreter.
//!
//! # Locking
//!
//! The registry head lock is taken only to read the head and each `next`
//! link, and is released before the callback is installed on a thread:
//!
//! ```text
//! lock ─ head ─ unlock ─ install(t1) ─ lock ─ next ─ unlock ─ install(t2) ─ ...
//! ```
//!
//! A thread created or removed while propagation runs may be missed.
//!
//! # Partial failure
//!
//! If a thread rejects the callback, propagation stops and reports how many
//! peers were already updated. Those peers keep the new callback.

use crate::error::{ProbeError, ProbeResult};
use std::sync::Arc;
use vmprobe_host::{CallbackKind, ThreadState};

/// Install the calling thread's trace pair on every other thread
///
/// Returns the number of peer threads updated; a lone thread yields `Ok(0)`.
///
/// # Errors
///
/// - `NoCurrentThread` if the calling OS thread has no thread state
/// - `Propagation` if a peer rejects the callback (no rollback)
pub fn propagate_trace() -> ProbeResult<usize> {
    propagate(CallbackKind::Trace)
}

/// Install the calling thread's profile pair on every other thread
///
/// Same protocol and errors as `propagate_trace`.
pub fn propagate_profile() -> ProbeResult<usize> {
    propagate(CallbackKind::Profile)
}

/// Install the calling thread's callback pair of `kind` on every other thread
pub fn propagate(kind: CallbackKind) -> ProbeResult<usize> {
    let this = ThreadState::current().ok_or(ProbeError::NoCurrentThread)?;
    let interp = this.interpreter().ok_or(ProbeError::NoCurrentThread)?;
    let callback = this.callback(kind);

    let mut updated = 0;
    let mut cursor = interp.head_lock().head();
    while let Some(tstate) = cursor {
        if !Arc::ptr_eq(&tstate, &this) {
            if let Err(source) = tstate.set_callback(kind, callback.clone()) {
                tracing::warn!(
                    target: "vmprobe::trace",
                    thread = %tstate.id(),
                    updated,
                    error = %source,
                    "callback propagation stopped"
                );
                return Err(ProbeError::Propagation {
                    kind,
                    thread: tstate.id(),
                    updated,
                    source,
                });
            }
            updated += 1;
            tracing::debug!(target: "vmprobe::trace", thread = %tstate.id(), ?kind, "callback propagated");
        }
        cursor = interp.head_lock().next(&tstate);
    }

    Ok(updated)
}
