//! The engine contract consumed by the coordination layer
//!
//! An `Engine` is one independent instance of the embedded engine's global
//! state (one heap, one compiled-code cache). It is single-threaded and
//! non-reentrant by construction; the coordination layer guarantees that at
//! most one thread touches it at a time, so implementations do not need
//! internal locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::EngineResult;
use crate::host::HostObject;
use crate::value::Value;

/// Handle to a global-object scope inside an engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct GlobalId(u64);

static NEXT_GLOBAL_ID: AtomicU64 = AtomicU64::new(1);

impl GlobalId {
    /// Generate a new unique GlobalId
    pub fn new() -> Self {
        GlobalId(NEXT_GLOBAL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for GlobalId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a compiled script inside an engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ScriptId(u64);

static NEXT_SCRIPT_ID: AtomicU64 = AtomicU64::new(1);

impl ScriptId {
    /// Generate a new unique ScriptId
    pub fn new() -> Self {
        ScriptId(NEXT_SCRIPT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ScriptId {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque comparable token controlling cross-context access.
///
/// The coordination layer only stores and compares these; the engine decides
/// what a mismatch means (access denied).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecurityToken(String);

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

impl SecurityToken {
    /// A token with an application-chosen value; equal values grant access.
    pub fn new(token: impl Into<String>) -> Self {
        SecurityToken(token.into())
    }

    /// A token no other context will ever equal by default.
    pub fn unique() -> Self {
        SecurityToken(format!("\0ctx:{}", NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed)))
    }

    /// The token's textual value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Operations the coordination layer performs against an embedded engine.
///
/// All methods are called with the coordination layer's exclusivity
/// guarantees already in force (engine lock held, isolate entered).
pub trait Engine: Send {
    /// The engine's default global scope, created at engine startup.
    fn default_global(&mut self) -> GlobalId;

    /// Create a fresh global scope, optionally backed by a host object
    /// whose properties become the script-visible globals.
    fn new_global(&mut self, host: Option<Arc<dyn HostObject>>) -> GlobalId;

    /// Propagate a context's security token to the engine.
    fn set_security_token(&mut self, global: GlobalId, token: &SecurityToken);

    /// Compile source against a global scope without running it.
    fn compile(&mut self, global: GlobalId, source: &str, name: &str) -> EngineResult<ScriptId>;

    /// Run a previously compiled script.
    fn run(&mut self, script: ScriptId) -> EngineResult<Value>;

    /// Compile and run source in one step.
    fn eval(&mut self, global: GlobalId, source: &str) -> EngineResult<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_uniqueness() {
        let g1 = GlobalId::new();
        let g2 = GlobalId::new();
        assert_ne!(g1, g2);
        assert!(g2.as_u64() > g1.as_u64());

        let s1 = ScriptId::new();
        let s2 = ScriptId::new();
        assert_ne!(s1, s2);
    }

    #[test]
    fn test_security_tokens() {
        assert_eq!(SecurityToken::new("a"), SecurityToken::new("a"));
        assert_ne!(SecurityToken::new("a"), SecurityToken::new("b"));
        assert_ne!(SecurityToken::unique(), SecurityToken::unique());
    }
}
