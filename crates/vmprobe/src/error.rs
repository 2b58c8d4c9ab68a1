//! Error types for the probe entry points

use vmprobe_host::{
    CallbackKind, CodeBody, FrameObject, HostError, ObjRef, ObjectKind, ThreadId, TupleBody,
};

/// Result type for probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Probe error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// An argument has the wrong object kind
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected kind name
        expected: &'static str,
        /// Actual kind name
        got: &'static str,
    },

    /// Replacement constant pool has a different length
    #[error("Constants tuple size mismatch: expected {expected}, got {got}")]
    SizeMismatch {
        /// Current pool length
        expected: usize,
        /// Replacement length
        got: usize,
    },

    /// The calling OS thread has no attached thread state
    #[error("No thread state is attached to the calling thread")]
    NoCurrentThread,

    /// Installing a callback on a peer thread failed; earlier peers keep it
    #[error("Failed to set {kind} callback on thread {thread} after updating {updated} thread(s)")]
    Propagation {
        /// Callback slot being propagated
        kind: CallbackKind,
        /// Thread that rejected the callback
        thread: ThreadId,
        /// Peers already updated (not rolled back)
        updated: usize,
        /// Host failure
        #[source]
        source: HostError,
    },
}

impl ProbeError {
    fn mismatch(expected: ObjectKind, got: &ObjRef) -> Self {
        ProbeError::TypeMismatch {
            expected: expected.name(),
            got: got.kind().name(),
        }
    }
}

pub(crate) fn expect_code(obj: &ObjRef) -> ProbeResult<&CodeBody> {
    obj.as_code().ok_or_else(|| ProbeError::mismatch(ObjectKind::Code, obj))
}

pub(crate) fn expect_tuple(obj: &ObjRef) -> ProbeResult<&TupleBody> {
    obj.as_tuple().ok_or_else(|| ProbeError::mismatch(ObjectKind::Tuple, obj))
}

pub(crate) fn expect_frame(obj: &ObjRef) -> ProbeResult<&FrameObject> {
    obj.as_frame().ok_or_else(|| ProbeError::mismatch(ObjectKind::Frame, obj))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmprobe_host::Interpreter;

    #[test]
    fn test_argument_checks() {
        let value = ObjRef::int(1);
        assert_eq!(
            expect_tuple(&value).err(),
            Some(ProbeError::TypeMismatch { expected: "tuple", got: "int" })
        );
        assert!(expect_code(&value).is_err());
        assert!(expect_frame(&ObjRef::none()).is_err());
        assert!(expect_tuple(&ObjRef::tuple(Vec::new())).is_ok());
    }

    #[test]
    fn test_messages() {
        let err = ProbeError::SizeMismatch { expected: 3, got: 2 };
        assert_eq!(err.to_string(), "Constants tuple size mismatch: expected 3, got 2");

        let thread = Interpreter::new().new_thread().id();
        let err = ProbeError::Propagation {
            kind: CallbackKind::Profile,
            thread,
            updated: 2,
            source: HostError::ThreadFinalizing(thread),
        };
        assert_eq!(
            err.to_string(),
            format!("Failed to set profile callback on thread {} after updating 2 thread(s)", thread)
        );
    }
}
