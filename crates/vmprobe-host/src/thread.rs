//! Thread states and the thread registry
//!
//! Every OS thread running managed code owns a `ThreadState`. The interpreter
//! links all live thread states into a singly-linked list, newest first:
//!
//! ```text
//! Interpreter.head ──► ThreadState(3) ──next──► ThreadState(2) ──next──► ThreadState(1) ──► ∅
//! ```
//!
//! The `head` and `next` links are guarded by the interpreter's head lock.
//! They can only be read through a `HeadLock`, so holding the guard is the
//! proof that the lock is held. An unlinked thread state keeps its `next`
//! link, so a traversal parked on it still reaches the rest of the list.
//!
//! Each thread state carries its own trace and profile callback pairs behind
//! a per-thread mutex; installing them from another OS thread is allowed.

use crate::object::ObjRef;
use crate::{HostError, HostResult};
use parking_lot::{Mutex, MutexGuard};
use std::cell::{RefCell, UnsafeCell};
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

thread_local! {
    static CURRENT: RefCell<Option<Arc<ThreadState>>> = const { RefCell::new(None) };
}

/// Unique identifier for a thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution events reported to trace and profile callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// A function body is entered
    Call,
    /// An exception is raised
    Exception,
    /// A new source line starts
    Line,
    /// A function body returns or unwinds
    Return,
    /// A single instruction is about to run
    Opcode,
}

/// Trace/profile callback function
///
/// Receives the callback's opaque argument, the frame being executed and
/// the event.
pub type TraceFn = fn(arg: Option<&ObjRef>, frame: &ObjRef, event: TraceEvent) -> HostResult<()>;

/// Which callback slot of a thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    /// Line-level trace callback
    Trace,
    /// Call-level profile callback
    Profile,
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackKind::Trace => f.write_str("trace"),
            CallbackKind::Profile => f.write_str("profile"),
        }
    }
}

/// A callback function plus its opaque argument
///
/// Cloning retains the argument; each thread holds its own copy.
#[derive(Clone, Default)]
pub struct TraceCallback {
    func: Option<TraceFn>,
    arg: Option<ObjRef>,
}

impl TraceCallback {
    /// Create a callback pair
    pub fn new(func: TraceFn, arg: Option<ObjRef>) -> Self {
        Self {
            func: Some(func),
            arg,
        }
    }

    /// The empty pair (no callback installed)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if a function is present
    #[inline]
    pub fn is_set(&self) -> bool {
        self.func.is_some()
    }

    /// The callback function
    pub fn func(&self) -> Option<TraceFn> {
        self.func
    }

    /// The opaque argument
    pub fn arg(&self) -> Option<&ObjRef> {
        self.arg.as_ref()
    }

    /// Same function and identical argument
    pub fn same_as(&self, other: &TraceCallback) -> bool {
        let same_func = match (self.func, other.func) {
            (Some(a), Some(b)) => a as usize == b as usize,
            (None, None) => true,
            _ => false,
        };
        let same_arg = match (&self.arg, &other.arg) {
            (Some(a), Some(b)) => a.is(b),
            (None, None) => true,
            _ => false,
        };
        same_func && same_arg
    }

    /// Call the function, if any, for `event` on `frame`
    pub fn invoke(&self, frame: &ObjRef, event: TraceEvent) -> HostResult<()> {
        match self.func {
            Some(func) => func(self.arg.as_ref(), frame, event),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for TraceCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceCallback")
            .field("func", &self.func.map(|func| func as usize as *const ()))
            .field("arg", &self.arg)
            .finish()
    }
}

#[derive(Default)]
struct Callbacks {
    trace: TraceCallback,
    profile: TraceCallback,
}

impl Callbacks {
    fn slot_mut(&mut self, kind: CallbackKind) -> &mut TraceCallback {
        match kind {
            CallbackKind::Trace => &mut self.trace,
            CallbackKind::Profile => &mut self.profile,
        }
    }
}

/// Per-thread execution state
pub struct ThreadState {
    id: ThreadId,
    interp: Weak<Interpreter>,
    callbacks: Mutex<Callbacks>,
    use_tracing: AtomicBool,
    finalizing: AtomicBool,
    registered: AtomicBool,
    /// Guarded by the interpreter's head lock
    next: UnsafeCell<Option<Arc<ThreadState>>>,
}

// SAFETY: `next` is only accessed through a HeadLock of the owning
// interpreter; everything else is atomic or behind a mutex.
unsafe impl Send for ThreadState {}
unsafe impl Sync for ThreadState {}

impl ThreadState {
    /// Get the thread state ID
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// The interpreter this thread state belongs to, if still alive
    pub fn interpreter(&self) -> Option<Arc<Interpreter>> {
        self.interp.upgrade()
    }

    /// Thread state bound to the calling OS thread
    pub fn current() -> Option<Arc<ThreadState>> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Bind this thread state to the calling OS thread
    ///
    /// Returns the previously bound thread state.
    pub fn attach(self: &Arc<Self>) -> Option<Arc<ThreadState>> {
        CURRENT.with(|current| current.replace(Some(self.clone())))
    }

    /// Unbind whatever thread state is bound to the calling OS thread
    pub fn detach() -> Option<Arc<ThreadState>> {
        CURRENT.with(|current| current.borrow_mut().take())
    }

    /// New reference to the installed callback pair of `kind`
    pub fn callback(&self, kind: CallbackKind) -> TraceCallback {
        self.callbacks.lock().slot_mut(kind).clone()
    }

    /// New reference to the installed trace pair
    pub fn trace(&self) -> TraceCallback {
        self.callback(CallbackKind::Trace)
    }

    /// New reference to the installed profile pair
    pub fn profile(&self) -> TraceCallback {
        self.callback(CallbackKind::Profile)
    }

    /// Install a trace pair on this thread
    pub fn set_trace(&self, callback: TraceCallback) -> HostResult<()> {
        self.set_callback(CallbackKind::Trace, callback)
    }

    /// Install a profile pair on this thread
    pub fn set_profile(&self, callback: TraceCallback) -> HostResult<()> {
        self.set_callback(CallbackKind::Profile, callback)
    }

    /// Install a callback pair of `kind` on this thread
    ///
    /// `callback` arrives already retained. The previous pair is released
    /// only after the new one is in place, and `use_tracing` plus the
    /// interpreter's `tracing_possible` counter are refreshed.
    ///
    /// # Errors
    ///
    /// - `ThreadFinalizing` if the thread state is being torn down
    /// - `NotRegistered` if it was unlinked or its interpreter is gone
    pub fn set_callback(&self, kind: CallbackKind, callback: TraceCallback) -> HostResult<()> {
        let interp = self.interp.upgrade().ok_or(HostError::NotRegistered(self.id))?;

        let previous = {
            let mut callbacks = self.callbacks.lock();
            // checked under the callbacks lock so begin_finalize and
            // remove_thread cannot interleave
            if self.is_finalizing() {
                return Err(HostError::ThreadFinalizing(self.id));
            }
            if !self.registered.load(Ordering::Acquire) {
                return Err(HostError::NotRegistered(self.id));
            }
            let slot = callbacks.slot_mut(kind);
            if kind == CallbackKind::Trace {
                let delta = callback.is_set() as isize - slot.is_set() as isize;
                interp.tracing_possible.fetch_add(delta, Ordering::AcqRel);
            }
            let previous = std::mem::replace(slot, callback);
            let tracing = callbacks.trace.is_set() || callbacks.profile.is_set();
            self.use_tracing.store(tracing, Ordering::Release);
            previous
        };
        drop(previous);

        tracing::trace!(target: "vmprobe_host::thread", thread = %self.id, ?kind, "callback installed");
        Ok(())
    }

    /// Whether any trace or profile callback is installed
    pub fn is_tracing(&self) -> bool {
        self.use_tracing.load(Ordering::Acquire)
    }

    /// Mark the thread state as being torn down
    ///
    /// Once this returns, no further callback install succeeds.
    pub fn begin_finalize(&self) {
        let _callbacks = self.callbacks.lock();
        self.finalizing.store(true, Ordering::Release);
    }

    /// Whether the thread state is being torn down
    pub fn is_finalizing(&self) -> bool {
        self.finalizing.load(Ordering::Acquire)
    }

    fn belongs_to(&self, interp: &Interpreter) -> bool {
        ptr::eq(self.interp.as_ptr(), interp)
    }
}

impl Drop for ThreadState {
    fn drop(&mut self) {
        // unwind the chain iteratively; stop at a node someone else still owns
        let mut link = self.next.get_mut().take();
        while let Some(tstate) = link {
            link = match Arc::try_unwrap(tstate) {
                Ok(mut owned) => owned.next.get_mut().take(),
                Err(_) => None,
            };
        }
    }
}

impl fmt::Debug for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadState")
            .field("id", &self.id)
            .field("use_tracing", &self.is_tracing())
            .field("finalizing", &self.is_finalizing())
            .finish()
    }
}

/// Interpreter state: the thread registry and its head lock
pub struct Interpreter {
    head_lock: Mutex<()>,
    /// Guarded by `head_lock`
    head: UnsafeCell<Option<Arc<ThreadState>>>,
    tracing_possible: AtomicIsize,
    next_thread_id: AtomicU64,
}

// SAFETY: `head` is only accessed through a HeadLock.
unsafe impl Send for Interpreter {}
unsafe impl Sync for Interpreter {}

impl Interpreter {
    /// Create an interpreter with no threads
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            head_lock: Mutex::new(()),
            head: UnsafeCell::new(None),
            tracing_possible: AtomicIsize::new(0),
            next_thread_id: AtomicU64::new(1),
        })
    }

    /// Acquire the head lock
    pub fn head_lock(&self) -> HeadLock<'_> {
        HeadLock {
            interp: self,
            _guard: self.head_lock.lock(),
        }
    }

    /// Create a thread state and link it at the head of the registry
    pub fn new_thread(self: &Arc<Self>) -> Arc<ThreadState> {
        let tstate = Arc::new(ThreadState {
            id: ThreadId(self.next_thread_id.fetch_add(1, Ordering::Relaxed)),
            interp: Arc::downgrade(self),
            callbacks: Mutex::new(Callbacks::default()),
            use_tracing: AtomicBool::new(false),
            finalizing: AtomicBool::new(false),
            registered: AtomicBool::new(true),
            next: UnsafeCell::new(None),
        });

        self.head_lock().push_front(tstate.clone());
        tracing::debug!(target: "vmprobe_host::thread", thread = %tstate.id, "thread state linked");
        tstate
    }

    /// Create a thread state and bind it to the calling OS thread
    pub fn attach_current(self: &Arc<Self>) -> Arc<ThreadState> {
        let tstate = self.new_thread();
        tstate.attach();
        tstate
    }

    /// Unlink a thread state and clear its callbacks
    pub fn remove_thread(&self, tstate: &ThreadState) -> HostResult<()> {
        self.head_lock().unlink(tstate)?;

        let cleared = {
            let mut callbacks = tstate.callbacks.lock();
            tstate.registered.store(false, Ordering::Release);
            if callbacks.trace.is_set() {
                self.tracing_possible.fetch_sub(1, Ordering::AcqRel);
            }
            tstate.use_tracing.store(false, Ordering::Release);
            std::mem::take(&mut *callbacks)
        };
        drop(cleared);

        tracing::debug!(target: "vmprobe_host::thread", thread = %tstate.id, "thread state unlinked");
        Ok(())
    }

    /// Number of threads with a trace function installed
    pub fn tracing_possible(&self) -> isize {
        self.tracing_possible.load(Ordering::Acquire)
    }

    /// Snapshot of the registry, newest first
    pub fn threads(&self) -> Vec<Arc<ThreadState>> {
        let lock = self.head_lock();
        let mut threads = Vec::new();
        let mut cursor = lock.head();
        while let Some(tstate) = cursor {
            cursor = lock.next(&tstate);
            threads.push(tstate);
        }
        threads
    }

    /// Number of linked thread states
    pub fn thread_count(&self) -> usize {
        self.threads().len()
    }
}

/// Proof that an interpreter's head lock is held
///
/// Dropping the guard releases the lock.
pub struct HeadLock<'a> {
    interp: &'a Interpreter,
    _guard: MutexGuard<'a, ()>,
}

impl HeadLock<'_> {
    /// First thread state of the registry
    pub fn head(&self) -> Option<Arc<ThreadState>> {
        // SAFETY: the head lock is held.
        unsafe { (*self.interp.head.get()).clone() }
    }

    /// Thread state linked after `tstate`
    pub fn next(&self, tstate: &ThreadState) -> Option<Arc<ThreadState>> {
        debug_assert!(tstate.belongs_to(self.interp));
        // SAFETY: the head lock of tstate's interpreter is held.
        unsafe { (*tstate.next.get()).clone() }
    }

    fn push_front(&self, tstate: Arc<ThreadState>) {
        // SAFETY: the head lock is held and tstate is not linked yet.
        unsafe {
            let head = &mut *self.interp.head.get();
            *tstate.next.get() = head.take();
            *head = Some(tstate);
        }
    }

    fn unlink(&self, tstate: &ThreadState) -> HostResult<()> {
        // SAFETY: the head lock is held; every node reached belongs to this
        // interpreter.
        unsafe {
            let successor = (*tstate.next.get()).clone();
            let head = &mut *self.interp.head.get();
            if head.as_deref().is_some_and(|first| ptr::eq(first, tstate)) {
                *head = successor;
                return Ok(());
            }

            let mut cursor = head.clone();
            while let Some(node) = cursor {
                let link = &mut *node.next.get();
                if link.as_deref().is_some_and(|next| ptr::eq(next, tstate)) {
                    *link = successor;
                    return Ok(());
                }
                cursor = link.clone();
            }
        }
        Err(HostError::NotRegistered(tstate.id))
    }
}
