//! Context entry stack
//!
//! A context is a logical global-object scope in which script runs.
//! Contexts nest per thread in a strict LIFO entry stack; the coordinator
//! tracks three positions in it:
//!
//! - `entered`: the topmost pushed context,
//! - `current`: the context actually executing engine code right now
//!   (differs from `entered` while a context that shares another's globals
//!   is being evaluated),
//! - `calling`: the context of the immediately enclosing execution frame.
//!
//! Once the coordinator is in strict mode, a context may only be entered
//! while the calling thread holds the engine lock; construction eagerly
//! takes a lock of its own on the theory that a context about to run
//! script needs exclusive engine access.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use silo_sdk::{GlobalId, HostObject, ScriptId, SecurityToken, Value};

use crate::coordinator::Coordinator;
use crate::error::{CoordError, EvalError};
use crate::isolate::Isolate;
use crate::lock::Locker;
use crate::scope::{ScopeGuard, Scoped};

/// Unique identifier for a Context
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

impl ContextId {
    /// Generate a new unique ContextId
    pub fn new() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared context state referenced from the per-thread entry stacks.
pub(crate) struct ContextInner {
    id: ContextId,
    global: GlobalId,
    token: RwLock<SecurityToken>,
}

impl ContextInner {
    pub(crate) fn id(&self) -> ContextId {
        self.id
    }
}

/// Lightweight, shareable view of a context, as returned by the
/// coordinator's introspection accessors.
#[derive(Clone)]
pub struct ContextHandle {
    inner: Arc<ContextInner>,
}

impl ContextHandle {
    pub(crate) fn from_inner(inner: &Arc<ContextInner>) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    /// The context's identity.
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// The engine global scope this context wraps.
    pub fn global(&self) -> GlobalId {
        self.inner.global
    }

    /// The context's current security token.
    pub fn security_token(&self) -> SecurityToken {
        self.inner.token.read().clone()
    }

    /// Would the engine permit cross-context access between these two?
    /// Tokens are only compared here, never interpreted.
    pub fn can_access(&self, other: &ContextHandle) -> bool {
        *self.inner.token.read() == *other.inner.token.read()
    }
}

impl PartialEq for ContextHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ContextHandle {}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("id", &self.inner.id)
            .finish()
    }
}

enum GlobalSource {
    Default,
    Host(Arc<dyn HostObject>),
    Shared(GlobalId),
}

/// A global-object scope scripts execute in.
///
/// The handle is thread-bound: it is entered and left on the thread that
/// uses it, and must be left in exactly the reverse order of entering.
pub struct Context {
    inner: Arc<ContextInner>,
    isolate: Isolate,
    /// Lock hold taken at construction under strict mode; released when
    /// the context is dropped.
    eager_lock: Option<Locker>,
}

impl Context {
    /// A context over the engine's default global scope.
    pub fn new(isolate: &Isolate) -> Self {
        Self::build(isolate, GlobalSource::Default)
    }

    /// A context whose global scope is backed by a host object: property
    /// access on the script-visible globals dispatches to it.
    pub fn with_host_object(isolate: &Isolate, host: Arc<dyn HostObject>) -> Self {
        Self::build(isolate, GlobalSource::Host(host))
    }

    /// A context sharing another context's global scope, forming an
    /// independent security domain over the same global state.
    pub fn with_globals_of(isolate: &Isolate, other: &Context) -> Self {
        Self::build(isolate, GlobalSource::Shared(other.inner.global))
    }

    fn build(isolate: &Isolate, source: GlobalSource) -> Self {
        let coord = isolate.coordinator();
        let eager_lock = if coord.is_strict() {
            let locker = Locker::new(coord);
            locker.enter();
            Some(locker)
        } else {
            None
        };

        let global = isolate.with_engine(|engine| match &source {
            GlobalSource::Default => engine.default_global(),
            GlobalSource::Host(host) => engine.new_global(Some(host.clone())),
            GlobalSource::Shared(global) => *global,
        });

        // A fresh context denies cross-context access until tokens are
        // explicitly shared.
        let token = SecurityToken::unique();
        isolate.with_engine(|engine| engine.set_security_token(global, &token));

        Self {
            inner: Arc::new(ContextInner {
                id: ContextId::new(),
                global,
                token: RwLock::new(token),
            }),
            isolate: isolate.clone(),
            eager_lock,
        }
    }

    /// The context's identity.
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// The engine global scope this context wraps.
    pub fn global(&self) -> GlobalId {
        self.inner.global
    }

    /// The isolate this context belongs to.
    pub fn isolate(&self) -> &Isolate {
        &self.isolate
    }

    /// A shareable view of this context.
    pub fn handle(&self) -> ContextHandle {
        ContextHandle::from_inner(&self.inner)
    }

    /// The context's current security token.
    pub fn security_token(&self) -> SecurityToken {
        self.inner.token.read().clone()
    }

    /// Replace the security token and propagate it to the engine.
    pub fn set_security_token(&self, token: SecurityToken) {
        self.isolate
            .with_engine(|engine| engine.set_security_token(self.inner.global, &token));
        *self.inner.token.write() = token;
    }

    /// Would the engine permit cross-context access between these two?
    pub fn can_access(&self, other: &Context) -> bool {
        *self.inner.token.read() == *other.inner.token.read()
    }

    /// Push this context onto the calling thread's entry stack.
    ///
    /// In strict mode the engine lock must already be held by this thread.
    pub fn enter(&self) -> Result<(), CoordError> {
        let coord = self.isolate.coordinator();
        if coord.is_strict() && !coord.is_locked_by_current_thread() {
            return Err(CoordError::LockNotHeld);
        }
        coord.push_entered(self.inner.clone());
        Ok(())
    }

    /// Pop this context; it must be the innermost entered one.
    ///
    /// The strict-mode rule that the lock is still held on exit is checked
    /// after the pop so a violation is reported without corrupting the
    /// stack.
    pub fn leave(&self) -> Result<(), CoordError> {
        let coord = self.isolate.coordinator();
        coord.pop_entered(self.inner.id)?;
        if coord.is_strict() && !coord.is_locked_by_current_thread() {
            return Err(CoordError::LockNotHeldOnLeave);
        }
        Ok(())
    }

    /// Enter for the duration of a lexical scope; leave on every exit path.
    pub fn scope(&self) -> Result<ScopeGuard<'_, Context>, CoordError> {
        ScopeGuard::enter(self)
    }

    /// Is this context somewhere on the calling thread's entry stack?
    pub fn is_entered(&self) -> bool {
        self.isolate.coordinator().is_entered_here(self.inner.id)
    }

    fn check_entered(&self) -> Result<(), CoordError> {
        if self.is_entered() {
            Ok(())
        } else {
            Err(CoordError::ContextNotEntered)
        }
    }

    /// Evaluate source in this context.
    ///
    /// The context must be entered on the calling thread. While the
    /// evaluation runs, this context is `current` and the enclosing
    /// execution frame (if any) becomes `calling`.
    pub fn eval(&self, source: &str) -> Result<Value, EvalError> {
        self.check_entered()?;
        let _frame = ExecFrame::push(self.isolate.coordinator(), &self.inner);
        self.isolate
            .with_engine(|engine| engine.eval(self.inner.global, source))
            .map_err(EvalError::from_engine)
    }

    /// Compile source against this context without running it.
    pub fn compile(&self, source: &str, name: &str) -> Result<Script, EvalError> {
        self.check_entered()?;
        let id = self
            .isolate
            .with_engine(|engine| engine.compile(self.inner.global, source, name))
            .map_err(EvalError::from_engine)?;
        Ok(Script {
            isolate: self.isolate.clone(),
            context: self.inner.clone(),
            id,
        })
    }
}

impl Scoped for Context {
    fn scope_enter(&self) -> Result<(), CoordError> {
        self.enter()
    }

    fn scope_leave(&self) -> Result<(), CoordError> {
        self.leave()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // Symmetric release of the construction-time lock hold.
        drop(self.eager_lock.take());
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("global", &self.inner.global)
            .finish()
    }
}

/// A compiled script bound to the context it was compiled in.
pub struct Script {
    isolate: Isolate,
    context: Arc<ContextInner>,
    id: ScriptId,
}

impl Script {
    /// The engine-side script handle.
    pub fn id(&self) -> ScriptId {
        self.id
    }

    /// Run the compiled script; the owning context must be entered.
    pub fn run(&self) -> Result<Value, EvalError> {
        let coord = self.isolate.coordinator();
        if !coord.is_entered_here(self.context.id) {
            return Err(EvalError::Coord(CoordError::ContextNotEntered));
        }
        let _frame = ExecFrame::push(coord, &self.context);
        self.isolate
            .with_engine(|engine| engine.run(self.id))
            .map_err(EvalError::from_engine)
    }
}

/// Execution-frame bookkeeping behind `current`/`calling`; pops on every
/// exit path, including unwind out of a host callback.
struct ExecFrame<'a> {
    coord: &'a Coordinator,
}

impl<'a> ExecFrame<'a> {
    fn push(coord: &'a Arc<Coordinator>, inner: &Arc<ContextInner>) -> Self {
        coord.push_exec(inner.clone());
        Self {
            coord: coord.as_ref(),
        }
    }
}

impl Drop for ExecFrame<'_> {
    fn drop(&mut self) {
        self.coord.pop_exec();
    }
}
