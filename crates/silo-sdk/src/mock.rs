//! Programmable in-memory engine
//!
//! The coordination layer must be testable without a real script engine, so
//! this module provides one that is scripted from the outside: tests map
//! source text to an outcome (return a value, throw with a backtrace, fail
//! to compile, or call back into the host object) and the engine replays it.
//! Integer-literal sources evaluate to `Value::Int` without registration.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::{Engine, GlobalId, ScriptId, SecurityToken};
use crate::error::{EngineError, EngineResult, ScriptError};
use crate::host::HostObject;
use crate::value::Value;

/// Outcome replayed when a registered source is evaluated.
#[derive(Clone)]
pub enum MockBehavior {
    /// Evaluation succeeds with this value
    Return(Value),
    /// Evaluation raises this engine exception
    Throw(ScriptError),
    /// Compilation fails with this message
    SyntaxError(String),
    /// Evaluation calls the global's host object and returns its result
    CallHost {
        /// Host function name to invoke
        method: String,
        /// Arguments to pass
        args: Vec<Value>,
    },
}

#[derive(Default)]
struct ProgramState {
    behaviors: HashMap<String, MockBehavior>,
    tokens: HashMap<GlobalId, SecurityToken>,
}

/// Handle for scripting a [`MockEngine`] and inspecting what it saw.
///
/// The engine itself is moved into an isolate; this handle stays with the
/// test and shares state with it.
#[derive(Clone)]
pub struct MockProgram {
    state: Arc<Mutex<ProgramState>>,
}

impl MockProgram {
    /// Map `source` to an outcome.
    pub fn on(&self, source: impl Into<String>, behavior: MockBehavior) {
        self.state.lock().behaviors.insert(source.into(), behavior);
    }

    /// The last security token propagated for `global`, if any.
    pub fn token_of(&self, global: GlobalId) -> Option<SecurityToken> {
        self.state.lock().tokens.get(&global).cloned()
    }
}

/// A fake engine driven entirely by a [`MockProgram`].
pub struct MockEngine {
    state: Arc<Mutex<ProgramState>>,
    default_global: Option<GlobalId>,
    globals: HashMap<GlobalId, Option<Arc<dyn HostObject>>>,
    scripts: HashMap<ScriptId, (GlobalId, String)>,
}

impl MockEngine {
    /// Create an engine plus the handle that programs it.
    pub fn new() -> (Self, MockProgram) {
        let state = Arc::new(Mutex::new(ProgramState::default()));
        let engine = Self {
            state: state.clone(),
            default_global: None,
            globals: HashMap::new(),
            scripts: HashMap::new(),
        };
        (engine, MockProgram { state })
    }

    fn execute(&mut self, global: GlobalId, source: &str) -> EngineResult<Value> {
        let behavior = self.state.lock().behaviors.get(source).cloned();
        match behavior {
            Some(MockBehavior::Return(value)) => Ok(value),
            Some(MockBehavior::Throw(err)) => Err(EngineError::Script(err)),
            Some(MockBehavior::SyntaxError(message)) => {
                Err(EngineError::Syntax(ScriptError::new("SyntaxError", message)))
            }
            Some(MockBehavior::CallHost { method, args }) => {
                let host = self
                    .globals
                    .get(&global)
                    .and_then(|h| h.clone())
                    .ok_or_else(|| {
                        EngineError::Internal(format!(
                            "global {} has no host object",
                            global.as_u64()
                        ))
                    })?;
                host.call(&method, &args).map_err(EngineError::Host)
            }
            None => {
                if let Ok(i) = source.trim().parse::<i64>() {
                    return Ok(Value::Int(i));
                }
                Err(EngineError::Syntax(ScriptError::new(
                    "SyntaxError",
                    format!("mock engine has no behavior for {source:?}"),
                )))
            }
        }
    }
}

impl Engine for MockEngine {
    fn default_global(&mut self) -> GlobalId {
        match self.default_global {
            Some(id) => id,
            None => {
                let id = GlobalId::new();
                self.globals.insert(id, None);
                self.default_global = Some(id);
                id
            }
        }
    }

    fn new_global(&mut self, host: Option<Arc<dyn HostObject>>) -> GlobalId {
        let id = GlobalId::new();
        self.globals.insert(id, host);
        id
    }

    fn set_security_token(&mut self, global: GlobalId, token: &SecurityToken) {
        self.state.lock().tokens.insert(global, token.clone());
    }

    fn compile(&mut self, global: GlobalId, source: &str, name: &str) -> EngineResult<ScriptId> {
        if let Some(MockBehavior::SyntaxError(message)) =
            self.state.lock().behaviors.get(source).cloned()
        {
            return Err(EngineError::Syntax(
                ScriptError::new("SyntaxError", message).with_location(name, 1, 1),
            ));
        }
        let id = ScriptId::new();
        self.scripts.insert(id, (global, source.to_string()));
        Ok(id)
    }

    fn run(&mut self, script: ScriptId) -> EngineResult<Value> {
        let (global, source) = self
            .scripts
            .get(&script)
            .cloned()
            .ok_or_else(|| EngineError::Internal(format!("unknown script {}", script.as_u64())))?;
        self.execute(global, &source)
    }

    fn eval(&mut self, global: GlobalId, source: &str) -> EngineResult<Value> {
        self.execute(global, source)
    }
}
