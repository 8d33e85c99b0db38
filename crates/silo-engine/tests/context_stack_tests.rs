//! Context entry stack and evaluation tests
//!
//! Covers LIFO entry discipline, the entered/current/calling accessors,
//! security tokens, error propagation through eval (engine exceptions and
//! host-callback errors), and the end-to-end multi-thread scenario.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use silo_engine::{
    Context, ContextHandle, CoordError, Coordinator, EvalError, Isolate, LockPolicy, Locker,
};
use silo_sdk::{HostError, HostObject, MockBehavior, MockEngine, MockProgram, ScriptError, Value};

fn setup(policy: LockPolicy) -> (Arc<Coordinator>, Isolate, MockProgram) {
    let coord = Coordinator::with_policy(policy);
    let (engine, program) = MockEngine::new();
    let isolate = Isolate::new(&coord, Box::new(engine));
    (coord, isolate, program)
}

#[test]
fn test_lifo_entry_stack() {
    let (coord, isolate, _) = setup(LockPolicy::Never);
    let contexts: Vec<Context> = (0..4).map(|_| Context::new(&isolate)).collect();

    assert!(coord.entered().is_none());
    for ctx in &contexts {
        ctx.enter().unwrap();
        assert_eq!(coord.entered().unwrap(), ctx.handle());
    }

    for (i, ctx) in contexts.iter().enumerate().rev() {
        assert_eq!(coord.entered().unwrap(), ctx.handle());
        ctx.leave().unwrap();
        if i > 0 {
            assert_eq!(coord.entered().unwrap(), contexts[i - 1].handle());
        }
    }
    assert!(coord.entered().is_none());
    assert!(!coord.in_context());
}

#[test]
fn test_out_of_order_leave_is_rejected() {
    let (_coord, isolate, _) = setup(LockPolicy::Never);
    let outer = Context::new(&isolate);
    let inner = Context::new(&isolate);

    outer.enter().unwrap();
    inner.enter().unwrap();
    assert_eq!(outer.leave(), Err(CoordError::ContextNotOnTop));

    inner.leave().unwrap();
    outer.leave().unwrap();
}

/// Host object that snapshots the coordinator's view when called.
struct Snapshot {
    coord: Arc<Coordinator>,
    seen: Mutex<Option<(Option<ContextHandle>, Option<ContextHandle>)>>,
}

impl HostObject for Snapshot {
    fn get(&self, _: &str) -> Result<Option<Value>, HostError> {
        Ok(None)
    }
    fn set(&self, _: &str, _: Value) -> Result<(), HostError> {
        Ok(())
    }
    fn has(&self, _: &str) -> bool {
        false
    }
    fn call(&self, _: &str, _: &[Value]) -> Result<Value, HostError> {
        *self.seen.lock() = Some((self.coord.entered(), self.coord.current()));
        Ok(Value::Null)
    }
}

#[test]
fn test_current_differs_from_entered_for_shared_globals() {
    let (coord, isolate, program) = setup(LockPolicy::Never);
    let snapshot = Arc::new(Snapshot {
        coord: coord.clone(),
        seen: Mutex::new(None),
    });

    let original = Context::with_host_object(&isolate, snapshot.clone());
    let copy = Context::with_globals_of(&isolate, &original);
    program.on(
        "snap()",
        MockBehavior::CallHost {
            method: "snap".into(),
            args: vec![],
        },
    );

    original.enter().unwrap();
    copy.enter().unwrap();

    // `copy` is nominally topmost while `original` executes.
    original.eval("snap()").unwrap();
    let (entered, current) = snapshot.seen.lock().clone().unwrap();
    assert_eq!(entered.unwrap(), copy.handle());
    assert_eq!(current.unwrap(), original.handle());

    copy.leave().unwrap();
    original.leave().unwrap();
}

#[test]
fn test_queries_are_idempotent() {
    let (coord, isolate, _) = setup(LockPolicy::Never);
    let ctx = Context::new(&isolate);
    ctx.enter().unwrap();

    for _ in 0..3 {
        assert!(coord.in_context());
        assert_eq!(coord.entered().unwrap(), ctx.handle());
        assert_eq!(coord.current().unwrap(), ctx.handle());
        assert!(coord.calling().is_none());
        assert!(!coord.is_locked());
    }

    ctx.leave().unwrap();
}

#[test]
fn test_engine_exception_carries_frames() {
    let (_coord, isolate, program) = setup(LockPolicy::Never);
    let ctx = Context::new(&isolate);
    program.on(
        "explode()",
        MockBehavior::Throw(
            ScriptError::new("Error", "err")
                .with_location("test1", 2, 19)
                .with_stack_trace(
                    "Error: err\n    at f (test1:2:19)\n    at g (test2:1:15)\n    at test3:1",
                ),
        ),
    );

    let _entered = ctx.scope().unwrap();
    let err = ctx.eval("explode()").unwrap_err();
    let js = err.as_js().expect("engine exception expected");
    assert_eq!(js.name(), "Error");
    assert_eq!(js.line(), Some(2));

    let frames = js.frames();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].func_name.as_deref(), Some("f"));
    assert_eq!(frames[1].row, Some(1));
    assert_eq!(frames[2].func_name, None);
    assert_eq!(frames[2].file_name, "test3");
}

#[derive(Debug, thiserror::Error)]
#[error("quota exceeded: {0}")]
struct QuotaError(u32);

struct FailingHost;

impl HostObject for FailingHost {
    fn get(&self, _: &str) -> Result<Option<Value>, HostError> {
        Ok(None)
    }
    fn set(&self, _: &str, _: Value) -> Result<(), HostError> {
        Ok(())
    }
    fn has(&self, _: &str) -> bool {
        false
    }
    fn call(&self, _: &str, _: &[Value]) -> Result<Value, HostError> {
        Err(HostError::new(QuotaError(31)))
    }
}

#[test]
fn test_host_error_round_trips_unchanged() {
    let (_coord, isolate, program) = setup(LockPolicy::Never);
    let ctx = Context::with_host_object(&isolate, Arc::new(FailingHost));
    program.on(
        "readQuota()",
        MockBehavior::CallHost {
            method: "readQuota".into(),
            args: vec![],
        },
    );

    let _entered = ctx.scope().unwrap();
    match ctx.eval("readQuota()").unwrap_err() {
        EvalError::Host(inner) => {
            let quota = inner
                .downcast_ref::<QuotaError>()
                .expect("original error type must survive the boundary");
            assert_eq!(quota.0, 31);
        }
        other => panic!("expected host error, got {other:?}"),
    }
}

#[test]
fn test_panic_during_entry_scope_unwinds_cleanly() {
    let (coord, isolate, _) = setup(LockPolicy::Never);
    let ctx = Context::new(&isolate);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _entered = ctx.scope().unwrap();
        panic!("host bug");
    }));
    assert!(result.is_err());
    assert!(!coord.in_context(), "unwind must pop the entry stack");
}

#[test]
fn test_threads_serialize_engine_access() {
    let coord = Coordinator::with_policy(LockPolicy::AlwaysStrict);
    let (engine, program) = MockEngine::new();
    program.on("tick()", MockBehavior::Return(Value::Int(1)));
    let isolate = Isolate::new(&coord, Box::new(engine));

    let mut workers = Vec::new();
    for _ in 0..4 {
        let iso = isolate.clone();
        workers.push(thread::spawn(move || {
            let coord = iso.coordinator().clone();
            let _iso = iso.scope().unwrap();

            let locker = Locker::new(&coord);
            let lock = locker.scope().unwrap();
            {
                let ctx = Context::new(&iso);
                let entered = ctx.scope().unwrap();
                for _ in 0..16 {
                    assert_eq!(ctx.eval("tick()").unwrap(), Value::Int(1));
                }
                entered.exit().unwrap();
            }
            lock.exit().unwrap();
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }
    assert!(!coord.is_locked());
}
