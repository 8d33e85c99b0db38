//! Isolate lifecycle
//!
//! An isolate is one independent instance of the embedded engine's global
//! state (heap, compiled-code cache). A thread explicitly enters an isolate
//! before touching it and leaves it afterwards; at most one isolate can be
//! current on a thread, though the same isolate may be re-entered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use silo_sdk::Engine;

use crate::coordinator::Coordinator;
use crate::error::CoordError;
use crate::scope::{ScopeGuard, Scoped};

/// Unique identifier for an Isolate
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IsolateId(u64);

static NEXT_ISOLATE_ID: AtomicU64 = AtomicU64::new(1);

impl IsolateId {
    /// Generate a new unique IsolateId
    pub fn new() -> Self {
        IsolateId(NEXT_ISOLATE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for IsolateId {
    fn default() -> Self {
        Self::new()
    }
}

struct IsolateInner {
    id: IsolateId,
    coord: Arc<Coordinator>,
    // The engine is single-threaded; this mutex only guards the &mut access
    // pattern, exclusivity across threads comes from the coordinator.
    engine: Mutex<Box<dyn Engine>>,
}

/// Handle to one embedded-engine instance.
///
/// Cheap to clone; clones share identity. The isolate outlives any single
/// enter/leave cycle and can be re-entered.
#[derive(Clone)]
pub struct Isolate {
    inner: Arc<IsolateInner>,
}

impl Isolate {
    /// Wrap an engine instance under a coordinator.
    pub fn new(coord: &Arc<Coordinator>, engine: Box<dyn Engine>) -> Self {
        Self {
            inner: Arc::new(IsolateInner {
                id: IsolateId::new(),
                coord: coord.clone(),
                engine: Mutex::new(engine),
            }),
        }
    }

    /// This isolate's identity.
    pub fn id(&self) -> IsolateId {
        self.inner.id
    }

    /// The coordinator this isolate belongs to.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.inner.coord
    }

    /// Is the engine lock of the owning coordinator currently held?
    pub fn is_locked(&self) -> bool {
        self.inner.coord.is_locked()
    }

    pub(crate) fn with_engine<R>(&self, f: impl FnOnce(&mut dyn Engine) -> R) -> R {
        let mut engine = self.inner.engine.lock();
        f(engine.as_mut())
    }

    /// Make this isolate current on the calling thread.
    ///
    /// Entering while a *different* isolate is current fails and leaves the
    /// original isolate current. Re-entering the same isolate nests.
    pub fn enter(&self) -> Result<(), CoordError> {
        self.inner.coord.with_thread(|state| match &mut state.isolate {
            Some((current, depth)) if current.id() == self.id() => {
                *depth += 1;
                Ok(())
            }
            Some(_) => Err(CoordError::IsolateAlreadyEntered),
            None => {
                state.isolate = Some((self.clone(), 1));
                Ok(())
            }
        })
    }

    /// Undo one [`Self::enter`] on the calling thread.
    ///
    /// Leaving an isolate that is not current is a programming error and is
    /// reported, not ignored.
    pub fn leave(&self) -> Result<(), CoordError> {
        self.inner.coord.with_thread(|state| match &mut state.isolate {
            Some((current, depth)) if current.id() == self.id() => {
                *depth -= 1;
                if *depth == 0 {
                    state.isolate = None;
                }
                Ok(())
            }
            _ => Err(CoordError::IsolateNotEntered),
        })
    }

    /// Enter for the duration of a lexical scope; leave on every exit path.
    pub fn scope(&self) -> Result<ScopeGuard<'_, Isolate>, CoordError> {
        ScopeGuard::enter(self)
    }
}

impl Scoped for Isolate {
    fn scope_enter(&self) -> Result<(), CoordError> {
        self.enter()
    }

    fn scope_leave(&self) -> Result<(), CoordError> {
        self.leave()
    }
}

impl PartialEq for Isolate {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Isolate {}

impl std::fmt::Debug for Isolate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Isolate").field("id", &self.inner.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_sdk::MockEngine;

    fn isolate(coord: &Arc<Coordinator>) -> Isolate {
        let (engine, _) = MockEngine::new();
        Isolate::new(coord, Box::new(engine))
    }

    #[test]
    fn test_enter_leave() {
        let coord = Coordinator::new();
        let iso = isolate(&coord);

        assert!(coord.current_isolate().is_none());
        iso.enter().unwrap();
        assert_eq!(coord.current_isolate(), Some(iso.clone()));
        iso.leave().unwrap();
        assert!(coord.current_isolate().is_none());
    }

    #[test]
    fn test_same_isolate_nests() {
        let coord = Coordinator::new();
        let iso = isolate(&coord);

        iso.enter().unwrap();
        iso.enter().unwrap();
        iso.leave().unwrap();
        assert_eq!(coord.current_isolate(), Some(iso.clone()));
        iso.leave().unwrap();
        assert!(coord.current_isolate().is_none());
    }

    #[test]
    fn test_second_isolate_rejected() {
        let coord = Coordinator::new();
        let first = isolate(&coord);
        let second = isolate(&coord);

        first.enter().unwrap();
        assert_eq!(second.enter(), Err(CoordError::IsolateAlreadyEntered));
        // The original isolate is untouched by the failed enter.
        assert_eq!(coord.current_isolate(), Some(first.clone()));
        first.leave().unwrap();
    }

    #[test]
    fn test_leave_not_current() {
        let coord = Coordinator::new();
        let iso = isolate(&coord);
        assert_eq!(iso.leave(), Err(CoordError::IsolateNotEntered));

        let other = isolate(&coord);
        iso.enter().unwrap();
        assert_eq!(other.leave(), Err(CoordError::IsolateNotEntered));
        iso.leave().unwrap();
    }

    #[test]
    fn test_scope_releases_on_drop() {
        let coord = Coordinator::new();
        let iso = isolate(&coord);
        {
            let _scope = iso.scope().unwrap();
            assert!(coord.current_isolate().is_some());
        }
        assert!(coord.current_isolate().is_none());
    }

    #[test]
    fn test_per_thread_currency() {
        let coord = Coordinator::new();
        let iso = isolate(&coord);
        iso.enter().unwrap();

        let peer_coord = coord.clone();
        std::thread::spawn(move || {
            // Entered state is thread-local; this thread sees none.
            assert!(peer_coord.current_isolate().is_none());
        })
        .join()
        .unwrap();

        iso.leave().unwrap();
    }
}
