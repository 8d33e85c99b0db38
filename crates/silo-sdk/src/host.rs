//! Capability interface for host objects exposed to the engine
//!
//! A host object backs a context's global scope (or any scriptable host
//! value). Property access from script is dispatched through this explicit
//! interface rather than reflection: the engine asks, the object answers.

use crate::error::HostError;
use crate::value::Value;

/// Operations the engine may perform on a host-exposed object.
///
/// `call` is the engine-to-host callback channel: when script invokes a
/// host-provided function, the engine dispatches here. A callback may do
/// slow host-side work; inside it the host is allowed to temporarily yield
/// the engine lock (see `Unlocker` in `silo-engine`) as long as it does not
/// touch engine state while unlocked.
pub trait HostObject: Send + Sync {
    /// Read a named property. `Ok(None)` means the property does not exist.
    fn get(&self, name: &str) -> Result<Option<Value>, HostError>;

    /// Write a named property.
    fn set(&self, name: &str, value: Value) -> Result<(), HostError>;

    /// Does a named property exist?
    fn has(&self, name: &str) -> bool;

    /// Invoke a named property as a function.
    ///
    /// An `Err` here crosses into the engine as an engine-visible error and
    /// must unwind back to the host unchanged when evaluation fails.
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, HostError>;
}

/// A host object with no properties; every call is an error.
pub struct NoopHostObject;

impl HostObject for NoopHostObject {
    fn get(&self, _name: &str) -> Result<Option<Value>, HostError> {
        Ok(None)
    }

    fn set(&self, _name: &str, _value: Value) -> Result<(), HostError> {
        Ok(())
    }

    fn has(&self, _name: &str) -> bool {
        false
    }

    fn call(&self, name: &str, _args: &[Value]) -> Result<Value, HostError> {
        Err(HostError::new(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no such host function: {name}"),
        )))
    }
}
