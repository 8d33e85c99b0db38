//! Silo SDK - Interface between the coordination layer and an embedded engine
//!
//! The silo coordination layer (`silo-engine`) serializes access to a
//! single-threaded, non-reentrant script engine across many host threads.
//! The engine itself is a collaborator, not part of silo; this crate pins
//! down the exact surface silo consumes from it:
//!
//! - **Engine**: compile/run/eval entry points and global-scope management
//! - **Value**: the minimal value representation crossing the boundary
//! - **HostObject**: the capability interface host-exposed objects implement
//! - **EngineError / HostError**: the tagged error channel in both directions
//! - **MockEngine**: a programmable in-memory engine for tests and examples
//!
//! # Example
//!
//! ```rust,ignore
//! use silo_sdk::{MockEngine, MockBehavior, Value};
//!
//! let (engine, program) = MockEngine::new();
//! program.on("1 + 1", MockBehavior::Return(Value::Int(2)));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod engine;
pub mod error;
pub mod host;
pub mod mock;
pub mod value;

pub use engine::{Engine, GlobalId, ScriptId, SecurityToken};
pub use error::{EngineError, EngineResult, HostError, ScriptError};
pub use host::{HostObject, NoopHostObject};
pub use mock::{MockBehavior, MockEngine, MockProgram};
pub use value::Value;
