//! Error types crossing the engine boundary
//!
//! Errors flow in both directions: the engine raises script errors toward
//! the host, and host callbacks invoked from inside evaluation raise host
//! errors toward the engine. Both directions are modelled as explicit,
//! structured data so the original condition can be reconstructed on either
//! side of the boundary.

use std::error::Error as StdError;
use std::fmt;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Structured data of an engine-raised exception.
///
/// `stack_trace` is the raw multi-line backtrace text exactly as the engine
/// produced it; the coordination layer parses it lazily into frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    /// Error class name (e.g. `TypeError`)
    pub name: String,
    /// Human-readable message
    pub message: String,
    /// Script resource (file) name, when the engine knows it
    pub resource_name: Option<String>,
    /// 1-based line of the throw site, when known
    pub line: Option<u32>,
    /// 1-based column of the throw site, when known
    pub column: Option<u32>,
    /// Raw backtrace text, first line being `"<name>: <message>"`
    pub stack_trace: String,
}

impl ScriptError {
    /// Build a script error with just a name and message.
    ///
    /// The stack trace defaults to the single summary line.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        let message = message.into();
        let stack_trace = format!("{name}: {message}");
        Self {
            name,
            message,
            resource_name: None,
            line: None,
            column: None,
            stack_trace,
        }
    }

    /// Attach a raw backtrace text.
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = stack_trace.into();
        self
    }

    /// Attach a source location.
    pub fn with_location(
        mut self,
        resource_name: impl Into<String>,
        line: u32,
        column: u32,
    ) -> Self {
        self.resource_name = Some(resource_name.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Opaque carrier for an error raised by host code invoked from the engine.
///
/// The boxed error object travels through the engine untouched so that the
/// *same* object (same concrete type) unwinds back out to the host when the
/// evaluation that triggered the callback fails.
#[derive(Debug)]
pub struct HostError(Box<dyn StdError + Send + Sync>);

impl HostError {
    /// Wrap a host error for transport across the engine boundary.
    pub fn new(err: impl StdError + Send + Sync + 'static) -> Self {
        Self(Box::new(err))
    }

    /// Wrap an already-boxed host error.
    pub fn from_boxed(err: Box<dyn StdError + Send + Sync>) -> Self {
        Self(err)
    }

    /// Borrow the original error as a concrete type, if it is one.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    /// Recover the boxed error object.
    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync> {
        self.0
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for HostError {}

/// Errors an engine operation can produce.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Source failed to compile
    #[error("syntax error: {0}")]
    Syntax(ScriptError),

    /// Evaluated script raised an exception
    #[error("script error: {0}")]
    Script(ScriptError),

    /// A host callback invoked from engine code failed
    #[error("host error: {0}")]
    Host(HostError),

    /// The engine itself misbehaved (unknown script/global handle, etc.)
    #[error("engine fault: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom {0}")]
    struct Boom(u32);

    #[test]
    fn test_script_error_display() {
        let err = ScriptError::new("TypeError", "x is not a function");
        assert_eq!(err.to_string(), "TypeError: x is not a function");
        assert_eq!(err.stack_trace, "TypeError: x is not a function");
    }

    #[test]
    fn test_script_error_location() {
        let err = ScriptError::new("Error", "e").with_location("main.js", 3, 7);
        assert_eq!(err.resource_name.as_deref(), Some("main.js"));
        assert_eq!(err.line, Some(3));
        assert_eq!(err.column, Some(7));
    }

    #[test]
    fn test_host_error_downcast() {
        let err = HostError::new(Boom(9));
        assert_eq!(err.downcast_ref::<Boom>().map(|b| b.0), Some(9));
        assert!(err.downcast_ref::<std::io::Error>().is_none());

        let inner = err.into_inner();
        assert!(inner.downcast::<Boom>().is_ok());
    }
}
