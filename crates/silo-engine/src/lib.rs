//! Silo coordination layer
//!
//! Embeds a single-threaded, non-reentrant script engine in a multi-threaded
//! host and lets many threads share it safely:
//! - **Isolate**: one engine instance, explicitly entered/left per thread
//! - **Locker / Unlocker**: counting, thread-owned engine lock with a scoped
//!   escape hatch for reentrant host callbacks
//! - **Context**: per-thread LIFO entry stack of global-object scopes, with
//!   `entered`/`current`/`calling` introspection and security tokens
//! - **JsError / StackFrame**: engine exceptions with lazily parsed,
//!   addressable backtraces
//!
//! # Example
//!
//! ```rust,ignore
//! use silo_engine::{Context, Coordinator, Isolate, Locker};
//! use silo_sdk::MockEngine;
//!
//! let coord = Coordinator::new();
//! let (engine, _program) = MockEngine::new();
//! let isolate = Isolate::new(&coord, Box::new(engine));
//!
//! let _iso = isolate.scope()?;
//! let locker = Locker::new(&coord);
//! let _lock = locker.scope()?;
//!
//! let ctx = Context::new(&isolate);
//! let _entered = ctx.scope()?;
//! let value = ctx.eval("42")?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod context;
pub mod coordinator;
pub mod error;
pub mod isolate;
pub mod lock;
pub mod scope;
pub mod stack_trace;

pub use context::{Context, ContextHandle, ContextId, Script};
pub use coordinator::{Coordinator, LockPolicy};
pub use error::{CoordError, EvalError, JsError};
pub use isolate::{Isolate, IsolateId};
pub use lock::{Locker, Unlocker};
pub use scope::{ScopeGuard, Scoped};
pub use stack_trace::{parse_stack, StackFrame};

// Re-export the engine contract so embedders depend on one crate.
pub use silo_sdk::{Engine, GlobalId, HostObject, ScriptId, SecurityToken, Value};
