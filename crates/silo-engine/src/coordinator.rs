//! Shared coordination state
//!
//! One `Coordinator` exists per embedding (not per process, so tests can
//! construct isolated instances). It owns the two pieces of shared mutable
//! state this layer is about:
//!
//! - the engine lock: a counting, thread-owned mutex serializing every
//!   engine-touching operation across OS threads, and
//! - the per-thread sub-state: which isolate is current on a thread and the
//!   thread's context entry stack. Cross-thread stacks are independent; a
//!   lock handoff never transfers entered-context state between threads.
//!
//! All query methods are read-only, idempotent, and return a consistent
//! point-in-time snapshot; they are safe to call from any thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::context::{ContextHandle, ContextId, ContextInner};
use crate::error::CoordError;
use crate::isolate::Isolate;

/// When the Lock-before-Context ordering rules are enforced.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LockPolicy {
    /// Strict mode switches on once any lock handle has ever been entered.
    ///
    /// Matches the historical behavior of the binding layers this design
    /// comes from: a single-threaded embedding that never locks is left
    /// alone, and the first lock use flips the whole embedding into strict
    /// multi-thread checking.
    #[default]
    Auto,

    /// Strict from the start, whether or not a lock was ever used.
    AlwaysStrict,

    /// Never strict: single-thread convenience mode, lock-agnostic
    /// contexts. The lock itself still works; only the ordering checks
    /// are disabled.
    Never,
}

struct EngineLockState {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Per-thread coordination sub-state.
#[derive(Default)]
pub(crate) struct ThreadState {
    /// Isolate current on this thread, with its reentry depth
    pub(crate) isolate: Option<(Isolate, usize)>,
    /// Context entry stack, innermost last
    pub(crate) entered: Vec<Arc<ContextInner>>,
    /// Execution frames (active evals), innermost last
    pub(crate) exec: Vec<Arc<ContextInner>>,
}

/// The coordination state shared by every isolate, lock handle, and context
/// of one embedding.
pub struct Coordinator {
    lock_state: Mutex<EngineLockState>,
    lock_available: Condvar,
    lock_active: AtomicBool,
    policy: LockPolicy,
    threads: DashMap<ThreadId, ThreadState>,
}

impl Coordinator {
    /// Create a coordinator with the default [`LockPolicy::Auto`] policy.
    pub fn new() -> Arc<Self> {
        Self::with_policy(LockPolicy::Auto)
    }

    /// Create a coordinator with an explicit lock policy.
    pub fn with_policy(policy: LockPolicy) -> Arc<Self> {
        Arc::new(Self {
            lock_state: Mutex::new(EngineLockState {
                owner: None,
                depth: 0,
            }),
            lock_available: Condvar::new(),
            lock_active: AtomicBool::new(false),
            policy,
            threads: DashMap::new(),
        })
    }

    /// The configured lock policy.
    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    // ------------------------------------------------------------------
    // Engine lock
    // ------------------------------------------------------------------

    /// Has any lock handle ever been entered on this coordinator?
    pub fn lock_active(&self) -> bool {
        self.lock_active.load(Ordering::Acquire)
    }

    /// Are the Lock-before-Context ordering rules currently in force?
    pub fn is_strict(&self) -> bool {
        match self.policy {
            LockPolicy::Auto => self.lock_active(),
            LockPolicy::AlwaysStrict => true,
            LockPolicy::Never => false,
        }
    }

    /// Is the engine lock held by any thread?
    pub fn is_locked(&self) -> bool {
        self.lock_state.lock().owner.is_some()
    }

    /// Is the engine lock held by the calling thread?
    pub fn is_locked_by_current_thread(&self) -> bool {
        self.lock_state.lock().owner == Some(thread::current().id())
    }

    pub(crate) fn mark_lock_used(&self) {
        self.lock_active.store(true, Ordering::Release);
    }

    /// Block until the engine lock is available, then take it. Reentrant
    /// for the owning thread.
    pub(crate) fn acquire_lock(&self) {
        let me = thread::current().id();
        let mut state = self.lock_state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    return;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    return;
                }
                Some(_) => self.lock_available.wait(&mut state),
            }
        }
    }

    /// Release one level of the engine lock held by the calling thread.
    pub(crate) fn release_lock(&self) -> Result<(), CoordError> {
        let me = thread::current().id();
        let mut state = self.lock_state.lock();
        match state.owner {
            Some(owner) if owner == me => {
                state.depth -= 1;
                if state.depth == 0 {
                    state.owner = None;
                    self.lock_available.notify_all();
                }
                Ok(())
            }
            _ => Err(CoordError::LockNotOwned),
        }
    }

    /// Fully release the engine lock held by the calling thread, returning
    /// the depth to restore later.
    pub(crate) fn release_lock_all(&self) -> Result<usize, CoordError> {
        let me = thread::current().id();
        let mut state = self.lock_state.lock();
        match state.owner {
            Some(owner) if owner == me => {
                let depth = state.depth;
                state.owner = None;
                state.depth = 0;
                self.lock_available.notify_all();
                Ok(depth)
            }
            _ => Err(CoordError::LockNotOwned),
        }
    }

    /// Block until the engine lock is available again and restore a depth
    /// previously returned by [`Self::release_lock_all`].
    pub(crate) fn reacquire_lock(&self, depth: usize) {
        let me = thread::current().id();
        let mut state = self.lock_state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = depth;
                    return;
                }
                Some(owner) if owner == me => {
                    state.depth += depth;
                    return;
                }
                Some(_) => self.lock_available.wait(&mut state),
            }
        }
    }

    // ------------------------------------------------------------------
    // Per-thread state
    // ------------------------------------------------------------------

    pub(crate) fn with_thread<R>(&self, f: impl FnOnce(&mut ThreadState) -> R) -> R {
        let mut entry = self.threads.entry(thread::current().id()).or_default();
        f(entry.value_mut())
    }

    fn read_thread<R>(&self, f: impl FnOnce(&ThreadState) -> R) -> Option<R> {
        self.threads.get(&thread::current().id()).map(|s| f(s.value()))
    }

    /// The isolate current on the calling thread, if any.
    pub fn current_isolate(&self) -> Option<Isolate> {
        self.read_thread(|s| s.isolate.as_ref().map(|(iso, _)| iso.clone()))
            .flatten()
    }

    pub(crate) fn push_entered(&self, context: Arc<ContextInner>) {
        self.with_thread(|s| s.entered.push(context));
    }

    pub(crate) fn pop_entered(&self, id: ContextId) -> Result<(), CoordError> {
        self.with_thread(|s| match s.entered.last() {
            Some(top) if top.id() == id => {
                s.entered.pop();
                Ok(())
            }
            _ => Err(CoordError::ContextNotOnTop),
        })
    }

    pub(crate) fn is_entered_here(&self, id: ContextId) -> bool {
        self.read_thread(|s| s.entered.iter().any(|c| c.id() == id))
            .unwrap_or(false)
    }

    pub(crate) fn push_exec(&self, context: Arc<ContextInner>) {
        self.with_thread(|s| s.exec.push(context));
    }

    pub(crate) fn pop_exec(&self) {
        self.with_thread(|s| {
            s.exec.pop();
        });
    }

    // ------------------------------------------------------------------
    // Context introspection
    // ------------------------------------------------------------------

    /// The topmost entered context on the calling thread.
    pub fn entered(&self) -> Option<ContextHandle> {
        self.read_thread(|s| s.entered.last().map(ContextHandle::from_inner))
            .flatten()
    }

    /// The context whose code is presently executing on the calling thread.
    ///
    /// Falls back to the topmost entered context when no evaluation is in
    /// flight. This differs from [`Self::entered`] while a context that
    /// shares another's globals is being evaluated.
    pub fn current(&self) -> Option<ContextHandle> {
        self.read_thread(|s| {
            s.exec
                .last()
                .or(s.entered.last())
                .map(ContextHandle::from_inner)
        })
        .flatten()
    }

    /// The context of the caller during a nested, cross-context invocation:
    /// the execution frame immediately enclosing the innermost one.
    pub fn calling(&self) -> Option<ContextHandle> {
        self.read_thread(|s| {
            s.exec
                .len()
                .checked_sub(2)
                .and_then(|i| s.exec.get(i))
                .map(ContextHandle::from_inner)
        })
        .flatten()
    }

    /// Is any context entered on the calling thread?
    pub fn in_context(&self) -> bool {
        self.read_thread(|s| !s.entered.is_empty()).unwrap_or(false)
    }
}
