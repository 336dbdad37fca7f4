//! End-to-end request scenarios against a single worker.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use tern_alloc::AllocError;
use tern_call::{CallError, ExecContext, Function, InvokeOptions, OpArray, Param, RequestFatal};
use tern_const::Constant;
use tern_diagnostic::Severity;
use tern_engine::{Engine, EngineConfig};
use tern_timeout::TimedOut;
use tern_value::{Slot, Value};

struct Spin;

impl OpArray for Spin {
    fn execute(&self, cx: &mut ExecContext<'_>) -> Result<Value, CallError> {
        loop {
            let block = cx.arena().allocate(32)?;
            cx.arena().release(block)?;
            cx.checkpoint()?;
        }
    }
}

struct Increment;

impl OpArray for Increment {
    fn execute(&self, cx: &mut ExecContext<'_>) -> Result<Value, CallError> {
        let n = cx.local("n").and_then(|slot| slot.get().as_int()).unwrap_or(0);
        cx.assign("n", Value::Int(n + 1));
        Ok(Value::Int(n + 1))
    }
}

fn config() -> EngineConfig {
    EngineConfig::builder().debug_guards(true).build().unwrap()
}

#[test]
fn persistent_constants_survive_request_sweep() {
    let engine = Engine::builder(config())
        .constant(Constant::new("FOO", Value::Int(42)))
        .startup()
        .unwrap();
    let mut worker = engine.worker();

    let summary = worker
        .run_request(|cx| {
            cx.define_constant(Constant::new("BAR", Value::from("x")))?;
            Ok(cx.constants().lookup("BAR").unwrap_or_default())
        })
        .unwrap();
    assert_eq!(summary.value, Some(Value::from("x")));
    assert!(summary.is_clean());

    assert_eq!(worker.constants().lookup("FOO"), Some(Value::Int(42)));
    assert_eq!(worker.constants().lookup("BAR"), None);
    assert_eq!(worker.constants().lookup("true"), Some(Value::Bool(true)));

    // The next request can define it again without a duplicate notice.
    let summary = worker
        .run_request(|cx| {
            cx.define_constant(Constant::new("BAR", Value::from("y")))?;
            Ok(Value::Null)
        })
        .unwrap();
    assert!(summary.diagnostics.is_empty());
}

#[test]
fn forced_reference_arguments() {
    let increment = Function::user(
        "increment",
        vec![Param::new("n").by_ref()],
        Arc::new(Increment),
    );
    let engine = Engine::builder(config())
        .function(increment)
        .startup()
        .unwrap();
    let mut worker = engine.worker();

    let summary = worker
        .run_request(|cx| {
            // Shared with another holder: a private reference is synthesized.
            let other = Slot::new(Value::Int(1));
            let mut args = [other.clone()];
            let mut callable = Slot::new(Value::from("increment"));
            cx.invoke(
                &mut callable,
                None,
                &mut args,
                InvokeOptions::new().allow_separation(),
            )?;
            assert_eq!(args[0].get(), Value::Int(2));
            assert_eq!(other.get(), Value::Int(1));

            // Sole holder: the slot itself becomes the reference.
            let mut args = [Slot::new(Value::Int(10))];
            cx.call("increment", &mut args)?;
            cx.call("increment", &mut args)?;
            Ok(args[0].get())
        })
        .unwrap();

    assert_eq!(summary.value, Some(Value::Int(12)));
    assert!(summary.is_clean());
}

#[test]
fn timeout_ends_request_without_leaks() {
    let config = EngineConfig::builder()
        .timeout(Duration::from_millis(50))
        .debug_guards(true)
        .build()
        .unwrap();
    let engine = Engine::builder(config)
        .function(Function::user("spin", vec![], Arc::new(Spin)))
        .startup()
        .unwrap();
    let mut worker = engine.worker();

    let summary = worker.run_request(|cx| cx.call("spin", &mut [])).unwrap();
    assert_eq!(
        summary.fatal,
        Some(RequestFatal::Timeout(TimedOut { seconds: 1 }))
    );
    assert_eq!(summary.value, None);
    assert_eq!(summary.error, None);
    assert!(summary.leaks.is_empty());
    assert!(summary.integrity.is_clean());

    let fatal: Vec<_> = summary
        .diagnostics
        .iter()
        .filter(|diag| diag.severity == Severity::Fatal)
        .map(|diag| diag.message.as_str())
        .collect();
    assert_eq!(fatal, vec!["Maximum execution time of 1 second exceeded"]);

    // The worker is usable again straight away.
    let summary = worker.run_request(|_| Ok(Value::Int(1))).unwrap();
    assert_eq!(summary.fatal, None);
    assert_eq!(summary.value, Some(Value::Int(1)));
}

#[test]
fn overflowing_array_allocation_is_a_local_error() {
    let engine = Engine::startup(config()).unwrap();
    let mut worker = engine.worker();

    let summary = worker
        .run_request(|cx| {
            let count = usize::MAX / 2;
            let err = cx.arena().allocate_array(count, 3, 0).unwrap_err();
            assert_eq!(
                err,
                AllocError::Overflow {
                    count,
                    size: 3,
                    offset: 0
                }
            );
            assert!(cx.arena().allocate_zeroed(usize::MAX, 2).is_err());

            let block = cx.arena().allocate_array(4, 8, 16)?;
            let size = cx.arena().size_of(block)?;
            cx.arena().release(block)?;
            Ok(Value::Int(i64::try_from(size).unwrap()))
        })
        .unwrap();

    assert_eq!(summary.value, Some(Value::Int(48)));
    assert!(summary.fatal.is_none());
    assert!(summary.is_clean());
}

#[test]
fn memory_ceiling_ends_request_and_reclaims_blocks() {
    let config = EngineConfig::builder()
        .memory_limit(4096)
        .debug_guards(true)
        .build()
        .unwrap();
    let engine = Engine::startup(config).unwrap();
    let mut worker = engine.worker();

    let summary = worker
        .run_request(|cx| {
            for _ in 0..10 {
                cx.arena().allocate(1024)?;
            }
            Ok(Value::Null)
        })
        .unwrap();

    assert_eq!(
        summary.fatal,
        Some(RequestFatal::MemoryExhausted(AllocError::LimitExceeded {
            limit: 4096,
            requested: 1024
        }))
    );
    assert_eq!(summary.leaks.total_blocks(), 4);
    assert!(summary.integrity.is_clean());
    assert_eq!(worker.arena().live_blocks(), 0);

    let summary = worker
        .run_request(|cx| {
            let block = cx.arena().allocate(1024)?;
            cx.arena().release(block)?;
            Ok(Value::Null)
        })
        .unwrap();
    assert!(summary.fatal.is_none());
    assert!(summary.is_clean());
}

#[test]
fn used_worker_has_the_same_ceiling_as_a_fresh_one() {
    fn fill(cx: &mut ExecContext<'_>) -> Result<Value, CallError> {
        let block = cx.arena().allocate(4096)?;
        cx.arena().release(block)?;
        Ok(Value::Null)
    }

    let config = EngineConfig::builder()
        .memory_limit(4096)
        .debug_guards(true)
        .build()
        .unwrap();
    let engine = Engine::startup(config).unwrap();

    let mut fresh = engine.worker();
    let summary = fresh.run_request(fill).unwrap();
    assert_eq!(summary.fatal, None);

    let mut used = engine.worker();
    let summary = used
        .run_request(|cx| {
            let block = cx.arena().allocate(8)?;
            cx.arena().release(block)?;
            Ok(Value::Null)
        })
        .unwrap();
    assert!(summary.is_clean());

    let summary = used.run_request(fill).unwrap();
    assert_eq!(summary.fatal, None);
    assert!(summary.is_clean());
    assert_eq!(used.usage().allocated, 0);
}

#[test]
fn dropped_request_is_torn_down() {
    let engine = Engine::startup(config()).unwrap();
    let mut worker = engine.worker();

    {
        let mut request = worker.begin_request().unwrap();
        let cx = request.context();
        cx.define_constant(Constant::new("BAR", Value::from("x")))
            .unwrap();
        cx.arena().allocate(64).unwrap();
    }
    assert_eq!(worker.constants().lookup("BAR"), None);
    assert_eq!(worker.arena().live_blocks(), 0);

    let summary = worker
        .run_request(|cx| Ok(cx.constants().lookup("BAR").unwrap_or_default()))
        .unwrap();
    assert_eq!(summary.value, Some(Value::Null));
    assert!(summary.is_clean());
}

#[test]
fn local_failures_reach_the_host_as_errors() {
    let engine = Engine::startup(config()).unwrap();
    let mut worker = engine.worker();

    let summary = worker.run_request(|cx| cx.call("missing", &mut [])).unwrap();
    assert_eq!(
        summary.error,
        Some(CallError::UndefinedFunction {
            name: "missing".into()
        })
    );
    assert_eq!(summary.fatal, None);
    assert!(summary.is_clean());
}

#[test]
fn leaked_blocks_are_reported_by_site() {
    let engine = Engine::startup(config()).unwrap();
    let mut worker = engine.worker();

    let summary = worker
        .run_request(|cx| {
            for _ in 0..3 {
                cx.arena().allocate(200)?;
            }
            Ok(Value::Null)
        })
        .unwrap();

    assert_eq!(summary.leaks.total_blocks(), 3);
    assert_eq!(summary.leaks.leaks.len(), 1);
    assert_eq!(summary.leaks.leaks[0].repeats, 2);

    let summary = worker.run_request(|_| Ok(Value::Null)).unwrap();
    assert!(summary.is_clean());
}
