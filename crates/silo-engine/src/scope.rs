//! Scoped enter/leave pairing
//!
//! Isolate, Locker, Unlocker, and Context all share the same shape: enter
//! on scope start, guaranteed leave on every exit path including unwind.
//! That pairing is implemented once here and reused by all four.

use crate::error::CoordError;

/// An entity with paired enter/leave operations that can be held by a
/// [`ScopeGuard`].
pub trait Scoped {
    /// Enter, applying any ordering checks that belong to the scoped path.
    fn scope_enter(&self) -> Result<(), CoordError>;

    /// Leave, applying the symmetric ordering checks.
    fn scope_leave(&self) -> Result<(), CoordError>;
}

/// RAII guard pairing [`Scoped::scope_enter`] with [`Scoped::scope_leave`].
///
/// Dropping the guard leaves unconditionally. A violation reported by the
/// leave panics on a normal drop; during unwind it is discarded, the panic
/// already in flight takes precedence. Call [`ScopeGuard::exit`] to observe
/// exit-time violations as a `Result` instead.
#[must_use = "dropping the guard immediately leaves the scope"]
pub struct ScopeGuard<'a, T: Scoped + ?Sized> {
    target: &'a T,
    armed: bool,
}

impl<'a, T: Scoped + ?Sized> ScopeGuard<'a, T> {
    /// Enter the scope, returning a guard that leaves it on drop.
    pub fn enter(target: &'a T) -> Result<Self, CoordError> {
        target.scope_enter()?;
        Ok(Self {
            target,
            armed: true,
        })
    }

    /// Leave the scope now, surfacing any exit-time violation.
    pub fn exit(mut self) -> Result<(), CoordError> {
        self.armed = false;
        self.target.scope_leave()
    }
}

impl<T: Scoped + ?Sized> Drop for ScopeGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let result = self.target.scope_leave();
        if !std::thread::panicking() {
            if let Err(err) = result {
                panic!("scope left with an ordering violation: {err}");
            }
        }
    }
}
