//! Coordination faults and structured engine exceptions

use std::error::Error as StdError;
use std::fmt;

use once_cell::sync::OnceCell;
use silo_sdk::{EngineError, ScriptError};

use crate::stack_trace::{parse_stack, StackFrame};

/// Contract violations in the coordination layer.
///
/// Every variant is a bug in the calling code, not a transient condition:
/// raised synchronously at the point of violation, never retried, never
/// swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CoordError {
    /// A different isolate is already entered on this thread
    #[error("a different isolate is already entered on this thread")]
    IsolateAlreadyEntered,

    /// Tried to leave an isolate that is not current on this thread
    #[error("isolate is not current on this thread")]
    IsolateNotEntered,

    /// Lock scope opened after a context was already entered
    #[error("lock should be acquired before entering the context")]
    LockAfterContextEnter,

    /// Lock scope closed while a context is still entered
    #[error("lock should be released after leaving the context")]
    LockReleasedInsideContext,

    /// Context entered in strict mode without the engine lock held
    #[error("engine lock must be held before entering a context")]
    LockNotHeld,

    /// Engine lock was no longer held when a context was left
    #[error("engine lock must still be held when leaving a context")]
    LockNotHeldOnLeave,

    /// Lock released by a handle that does not hold it
    #[error("lock handle does not hold the engine lock")]
    LockerNotEntered,

    /// Engine lock released by a thread that does not own it
    #[error("engine lock is not owned by this thread")]
    LockNotOwned,

    /// Unlock scope opened while the engine lock is not held by this thread
    #[error("unlock requires the engine lock to be held by this thread")]
    UnlockWithoutLock,

    /// Unlock scope opened twice on the same handle
    #[error("unlock scope is already active")]
    UnlockAlreadyEntered,

    /// Unlock scope closed without being opened
    #[error("unlock scope is not active")]
    UnlockNotEntered,

    /// Context left out of LIFO order
    #[error("context is not the innermost entered context")]
    ContextNotOnTop,

    /// Script evaluation attempted on a context that is not entered
    #[error("context is not entered on this thread")]
    ContextNotEntered,
}

/// A structured, queryable engine exception.
///
/// Wraps the raw error data the engine reports (name, message, source
/// location, backtrace text) and lazily parses the backtrace into
/// addressable [`StackFrame`]s on first access.
#[derive(Debug, Clone)]
pub struct JsError {
    name: String,
    message: String,
    resource_name: Option<String>,
    line: Option<u32>,
    column: Option<u32>,
    stack_trace: String,
    frames: OnceCell<Vec<StackFrame>>,
}

impl JsError {
    /// Error class name (e.g. `TypeError`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Script resource name, when the engine reported one
    pub fn resource_name(&self) -> Option<&str> {
        self.resource_name.as_deref()
    }

    /// 1-based line of the throw site, when known
    pub fn line(&self) -> Option<u32> {
        self.line
    }

    /// 1-based column of the throw site, when known
    pub fn column(&self) -> Option<u32> {
        self.column
    }

    /// Raw backtrace text exactly as the engine produced it
    pub fn stack_trace(&self) -> &str {
        &self.stack_trace
    }

    /// Parsed stack frames, outermost first.
    ///
    /// Parsed once on first access and memoized; parsing a malformed
    /// backtrace line panics (the engine's textual format is an assumed
    /// contract, see [`parse_stack`]).
    pub fn frames(&self) -> &[StackFrame] {
        self.frames.get_or_init(|| parse_stack(&self.stack_trace))
    }
}

impl From<ScriptError> for JsError {
    fn from(err: ScriptError) -> Self {
        Self {
            name: err.name,
            message: err.message,
            resource_name: err.resource_name,
            line: err.line,
            column: err.column,
            stack_trace: err.stack_trace,
            frames: OnceCell::new(),
        }
    }
}

impl fmt::Display for JsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl StdError for JsError {}

/// Errors surfaced by script evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// The evaluated script raised an exception
    #[error("{0}")]
    Js(JsError),

    /// A host callback raised; the original error object is preserved
    #[error("host error: {0}")]
    Host(Box<dyn StdError + Send + Sync>),

    /// The engine itself misbehaved
    #[error("engine fault: {0}")]
    Engine(String),

    /// A coordination contract was violated
    #[error("{0}")]
    Coord(#[from] CoordError),
}

impl EvalError {
    pub(crate) fn from_engine(err: EngineError) -> Self {
        match err {
            EngineError::Syntax(e) | EngineError::Script(e) => EvalError::Js(e.into()),
            EngineError::Host(e) => EvalError::Host(e.into_inner()),
            EngineError::Internal(msg) => EvalError::Engine(msg),
        }
    }

    /// The structured engine exception, if that is what this error is.
    pub fn as_js(&self) -> Option<&JsError> {
        match self {
            EvalError::Js(err) => Some(err),
            _ => None,
        }
    }
}
