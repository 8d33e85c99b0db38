//! Engine lock handles
//!
//! The coordinator owns a single counting, thread-owned mutex; `Locker` and
//! `Unlocker` are the handles through which threads take and yield it.
//!
//! A `Locker` serializes engine access: enter blocks until the lock is
//! available, is reentrant for the holding thread, and every enter must be
//! balanced by a leave. An `Unlocker` is the inverse: inside a region where
//! the lock is held (typically a host callback invoked from engine code) it
//! fully releases the lock so other threads can make progress, then
//! restores the exact hold depth on leave. The callback must not touch
//! engine state while unlocked.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::coordinator::Coordinator;
use crate::error::CoordError;
use crate::scope::{ScopeGuard, Scoped};

/// Handle for acquiring the coordinator's engine lock.
///
/// The handle tracks how many holds it took itself; [`Locker::is_entered`]
/// reflects that handle-local state, distinct from the process-wide
/// [`Coordinator::is_locked`]. Dropping a handle releases whatever it still
/// holds.
///
/// Lock ownership is per thread, so the handle is bound to the thread that
/// created it and cannot be sent to another: a handle dropped on a foreign
/// thread could not release its holds and would strand the lock.
pub struct Locker {
    coord: Arc<Coordinator>,
    held: Cell<usize>,
    _thread_bound: PhantomData<*const ()>,
}

impl Locker {
    /// Create a handle; does not acquire anything yet.
    pub fn new(coord: &Arc<Coordinator>) -> Self {
        Self {
            coord: coord.clone(),
            held: Cell::new(0),
            _thread_bound: PhantomData,
        }
    }

    /// Block until the engine lock is available, then take one hold.
    ///
    /// The first enter on any handle switches the coordinator into strict
    /// Lock-before-Context mode (under [`LockPolicy::Auto`]).
    ///
    /// [`LockPolicy::Auto`]: crate::LockPolicy::Auto
    pub fn enter(&self) {
        self.coord.mark_lock_used();
        self.coord.acquire_lock();
        self.held.set(self.held.get() + 1);
    }

    /// Release one hold taken through this handle.
    pub fn leave(&self) -> Result<(), CoordError> {
        if self.held.get() == 0 {
            return Err(CoordError::LockerNotEntered);
        }
        self.coord.release_lock()?;
        self.held.set(self.held.get() - 1);
        Ok(())
    }

    /// Does this handle currently hold the lock?
    pub fn is_entered(&self) -> bool {
        self.held.get() > 0
    }

    /// Acquire for the duration of a lexical scope, with ordering checks.
    pub fn scope(&self) -> Result<ScopeGuard<'_, Locker>, CoordError> {
        ScopeGuard::enter(self)
    }
}

impl Scoped for Locker {
    /// Scoped acquisition enforces the ordering rule: the lock must be
    /// taken before any context is entered. On violation the freshly taken
    /// hold is released immediately, never leaving a half-locked state.
    fn scope_enter(&self) -> Result<(), CoordError> {
        self.enter();
        if self.coord.in_context() {
            let _ = self.leave();
            return Err(CoordError::LockAfterContextEnter);
        }
        Ok(())
    }

    /// The symmetric rule on exit: every context must have been left while
    /// the lock was still held.
    fn scope_leave(&self) -> Result<(), CoordError> {
        if self.coord.in_context() {
            let _ = self.leave();
            return Err(CoordError::LockReleasedInsideContext);
        }
        self.leave()
    }
}

impl Drop for Locker {
    fn drop(&mut self) {
        while self.held.get() > 0 {
            if self.coord.release_lock().is_err() {
                break;
            }
            self.held.set(self.held.get() - 1);
        }
    }
}

/// Handle for temporarily yielding a held engine lock.
///
/// Enter fully releases the calling thread's holds (remembering the depth);
/// leave blocks until the lock can be retaken and restores that depth. Like
/// [`Locker`], the handle is bound to its creating thread.
pub struct Unlocker {
    coord: Arc<Coordinator>,
    saved_depth: Cell<Option<usize>>,
    _thread_bound: PhantomData<*const ()>,
}

impl Unlocker {
    /// Create a handle; does not release anything yet.
    pub fn new(coord: &Arc<Coordinator>) -> Self {
        Self {
            coord: coord.clone(),
            saved_depth: Cell::new(None),
            _thread_bound: PhantomData,
        }
    }

    /// Yield the engine lock held by the calling thread.
    pub fn enter(&self) -> Result<(), CoordError> {
        if self.saved_depth.get().is_some() {
            return Err(CoordError::UnlockAlreadyEntered);
        }
        let depth = self
            .coord
            .release_lock_all()
            .map_err(|_| CoordError::UnlockWithoutLock)?;
        self.saved_depth.set(Some(depth));
        Ok(())
    }

    /// Retake the engine lock at the depth held before [`Self::enter`].
    pub fn leave(&self) -> Result<(), CoordError> {
        match self.saved_depth.take() {
            Some(depth) => {
                self.coord.reacquire_lock(depth);
                Ok(())
            }
            None => Err(CoordError::UnlockNotEntered),
        }
    }

    /// Is the unlocked region currently active?
    pub fn is_entered(&self) -> bool {
        self.saved_depth.get().is_some()
    }

    /// Yield for the duration of a lexical scope; retake on every exit path.
    pub fn scope(&self) -> Result<ScopeGuard<'_, Unlocker>, CoordError> {
        ScopeGuard::enter(self)
    }
}

impl Scoped for Unlocker {
    fn scope_enter(&self) -> Result<(), CoordError> {
        self.enter()
    }

    fn scope_leave(&self) -> Result<(), CoordError> {
        self.leave()
    }
}

impl Drop for Unlocker {
    fn drop(&mut self) {
        if let Some(depth) = self.saved_depth.take() {
            self.coord.reacquire_lock(depth);
        }
    }
}
