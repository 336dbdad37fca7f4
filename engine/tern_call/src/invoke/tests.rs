#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use tern_alloc::{AllocConfig, AllocError, Arena};
use tern_const::{Constant, ConstantTable};
use tern_timeout::{TimedOut, Timeout};
use tern_value::{Array, ArrayKey, Object, Slot, Value};

use super::*;
use crate::{ClassEntry, Function, OpArray, Param, Registry, RequestFatal};

struct Body<F>(F);

impl<F> OpArray for Body<F>
where
    F: Fn(&mut ExecContext<'_>) -> Result<Value, CallError> + Send + Sync,
{
    fn execute(&self, cx: &mut ExecContext<'_>) -> Result<Value, CallError> {
        (self.0)(cx)
    }
}

fn body(
    f: impl Fn(&mut ExecContext<'_>) -> Result<Value, CallError> + Send + Sync + 'static,
) -> Arc<dyn OpArray> {
    Arc::new(Body(f))
}

fn int(slot: &Slot) -> i64 {
    slot.get().as_int().unwrap()
}

fn property(slot: &Slot, name: &str) -> Option<i64> {
    match &*slot.read() {
        Value::Object(object) => object
            .properties
            .get(&ArrayKey::from(name))
            .and_then(|p| p.get().as_int()),
        _ => None,
    }
}

fn double(cx: &mut ExecContext<'_>) -> Result<Value, CallError> {
    let n = cx.arg(0).map_or(0, |slot| int(&slot));
    Ok(Value::Int(n * 2))
}

/// Writes 99 through its forced-reference argument and reports whether
/// it arrived as a reference.
fn set_ref(cx: &mut ExecContext<'_>) -> Result<Value, CallError> {
    let arg = cx.arg(0).unwrap();
    let Some(mut value) = arg.write_shared() else {
        return Ok(Value::Bool(false));
    };
    *value = Value::Int(99);
    Ok(Value::Bool(true))
}

/// Assigns 7 to its first argument with copy-on-write.
fn assign_seven(cx: &mut ExecContext<'_>) -> Result<Value, CallError> {
    if let Some(slot) = cx.arg_mut(0) {
        slot.assign(Value::Int(7));
    }
    Ok(Value::Null)
}

fn bump(cx: &mut ExecContext<'_>) -> Result<Value, CallError> {
    let this = cx.this().ok_or_else(|| CallError::fatal("no receiver"))?;
    let mut value = this
        .write_shared()
        .ok_or_else(|| CallError::fatal("receiver not bound by reference"))?;
    let Value::Object(object) = &mut *value else {
        return Err(CallError::fatal("receiver is not an object"));
    };
    let count = object
        .properties
        .get(&ArrayKey::from("count"))
        .and_then(|p| p.get().as_int())
        .unwrap_or(0)
        + 1;
    object.properties.insert("count", Value::Int(count));
    Ok(Value::Int(count))
}

fn has_this(cx: &mut ExecContext<'_>) -> Result<Value, CallError> {
    Ok(Value::Bool(cx.this().is_some()))
}

fn whoami(cx: &mut ExecContext<'_>) -> Result<Value, CallError> {
    Ok(Value::from(cx.current_function_name()))
}

fn registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    let functions = &mut registry.functions;
    functions
        .declare(Function::native("double", vec![Param::new("n")], double))
        .unwrap();
    functions
        .declare(Function::native("set_ref", vec![Param::new("x").by_ref()], set_ref))
        .unwrap();
    functions
        .declare(Function::native(
            "maybe_ref",
            vec![Param::new("x").with_mode(RefMode::Allow)],
            assign_seven,
        ))
        .unwrap();
    functions
        .declare(Function::native("by_value", vec![Param::new("x")], assign_seven))
        .unwrap();
    functions
        .declare(Function::native("whoami", vec![], whoami))
        .unwrap();

    let counter = ClassEntry::new("Counter")
        .with_method(Function::native("bump", vec![], bump))
        .unwrap()
        .with_method(Function::native("hasThis", vec![], has_this))
        .unwrap();
    registry.classes.declare(counter).unwrap();
    Arc::new(registry)
}

fn counter() -> Slot {
    Slot::new(Value::Object(Object::new("Counter")))
}

#[test]
fn native_call_by_name() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    let mut args = [Slot::new(Value::Int(21))];
    assert_eq!(cx.call("double", &mut args).unwrap(), Value::Int(42));
    assert_eq!(cx.call("DOUBLE", &mut args).unwrap(), Value::Int(42));
    assert_eq!(int(&args[0]), 21);
}

#[test]
fn undefined_function_keeps_name_as_written() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants).build();

    let err = cx.call("NoSuchThing", &mut []).unwrap_err();
    assert_eq!(
        err,
        CallError::UndefinedFunction {
            name: "NoSuchThing".into()
        }
    );
    assert!(!err.is_fatal());
    assert_eq!(err.to_string(), "Call to undefined function NoSuchThing()");
}

#[test]
fn invalid_callables_are_local_failures() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    let mut callable = Slot::new(Value::Int(3));
    let err = cx
        .invoke(&mut callable, None, &mut [], InvokeOptions::new())
        .unwrap_err();
    assert_eq!(err, CallError::InvalidCallable { type_name: "integer" });

    let mut triple = Slot::new(Value::Array(Array::list([
        Value::from("Counter"),
        Value::from("bump"),
        Value::Null,
    ])));
    let err = cx
        .invoke(&mut triple, None, &mut [], InvokeOptions::new())
        .unwrap_err();
    assert_eq!(err, CallError::InvalidCallable { type_name: "array" });
}

#[test]
fn user_function_binds_params_and_defaults() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants).build();

    cx.declare_function(Function::user(
        "greet",
        vec![
            Param::new("name"),
            Param::new("greeting").with_default(Value::from("hello")),
        ],
        body(|cx| {
            let name = cx.local("name").map(|s| s.get()).unwrap_or_default();
            let greeting = cx.local("greeting").map(|s| s.get()).unwrap_or_default();
            Ok(Value::from(format!("{greeting}, {name}")))
        }),
    ))
    .unwrap();

    let mut args = [Slot::new(Value::from("ada"))];
    assert_eq!(cx.call("greet", &mut args).unwrap(), Value::from("hello, ada"));

    let mut args = [Slot::new(Value::from("ada")), Slot::new(Value::from("hi"))];
    assert_eq!(cx.call("greet", &mut args).unwrap(), Value::from("hi, ada"));
}

#[test]
fn missing_argument_without_default_fails_locally() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants).build();

    cx.declare_function(Function::user(
        "needs_two",
        vec![Param::new("a"), Param::new("b")],
        body(|_| Ok(Value::Null)),
    ))
    .unwrap();

    let mut args = [Slot::new(Value::Int(1))];
    let err = cx.call("needs_two", &mut args).unwrap_err();
    assert_eq!(
        err,
        CallError::MissingArgument {
            function: "needs_two".into(),
            position: 2
        }
    );
    assert!(!err.is_fatal());
    assert_eq!(cx.depth(), 0);
    assert_eq!(cx.arena().live_blocks(), 0);
}

#[test]
fn default_values_resolve_constants() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants).build();

    cx.define_constant(Constant::new("GREETING", Value::from("hi")))
        .unwrap();
    cx.declare_function(Function::user(
        "greeting",
        vec![Param::new("g").with_default(Value::ConstantRef(Arc::from("GREETING")))],
        body(|cx| Ok(cx.local("g").map(|s| s.get()).unwrap_or_default())),
    ))
    .unwrap();

    assert_eq!(cx.call("greeting", &mut []).unwrap(), Value::from("hi"));
}

#[test]
fn by_value_parameter_is_isolated_from_caller() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants).build();

    cx.declare_function(Function::user(
        "clobber",
        vec![Param::new("x")],
        body(|cx| {
            cx.assign("x", Value::Int(0));
            Ok(Value::Null)
        }),
    ))
    .unwrap();

    let mut args = [Slot::new(Value::Int(5))];
    cx.call("clobber", &mut args).unwrap();
    assert_eq!(int(&args[0]), 5);
}

#[test]
fn forced_reference_promotes_unshared_argument_in_place() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    let mut args = [Slot::new(Value::Int(1))];
    assert_eq!(args[0].refcount(), 1);
    assert_eq!(cx.call("set_ref", &mut args).unwrap(), Value::Bool(true));
    assert_eq!(int(&args[0]), 99);
}

#[test]
fn forced_reference_refuses_shared_argument() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    let original = Slot::new(Value::Int(1));
    let mut args = [original.clone()];
    let err = cx.call("set_ref", &mut args).unwrap_err();
    assert_eq!(
        err,
        CallError::Marshal {
            function: "set_ref".into(),
            position: 1
        }
    );
    assert!(!err.is_fatal());
    assert_eq!(int(&original), 1);
    assert!(!args[0].is_ref());
}

#[test]
fn forced_reference_separates_when_allowed() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    let original = Slot::new(Value::Int(1));
    let mut args = [original.clone()];
    let mut callable = Slot::new(Value::from("set_ref"));
    let result = cx
        .invoke(
            &mut callable,
            None,
            &mut args,
            InvokeOptions::new().allow_separation(),
        )
        .unwrap();

    assert_eq!(result, Value::Bool(true));
    assert_eq!(int(&args[0]), 99);
    assert_eq!(int(&original), 1);
    assert!(!args[0].same_identity(&original));
}

#[test]
fn allow_reference_follows_the_caller() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    let mut by_ref = [Slot::new_ref(Value::Int(1))];
    cx.call("maybe_ref", &mut by_ref).unwrap();
    assert_eq!(int(&by_ref[0]), 7);

    let mut by_value = [Slot::new(Value::Int(1))];
    cx.call("maybe_ref", &mut by_value).unwrap();
    assert_eq!(int(&by_value[0]), 1);
}

#[test]
fn value_parameter_copies_a_reference() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    let mut args = [Slot::new_ref(Value::Int(5))];
    cx.call("by_value", &mut args).unwrap();
    assert_eq!(int(&args[0]), 5);
}

#[test]
fn method_call_binds_this_by_reference() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    let mut receiver = counter();
    assert_eq!(cx.call_method(&mut receiver, "BUMP", &mut []).unwrap(), Value::Int(1));
    assert_eq!(cx.call_method(&mut receiver, "bump", &mut []).unwrap(), Value::Int(2));
    assert_eq!(property(&receiver, "count"), Some(2));
}

#[test]
fn array_callable_with_object_receiver() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    let mut callable = Slot::new(Value::Array(Array::list([
        Value::Object(Object::new("Counter")),
        Value::from("bump"),
    ])));
    cx.invoke(&mut callable, None, &mut [], InvokeOptions::new())
        .unwrap();

    let value = callable.read();
    let target = value.as_array().unwrap().get(&ArrayKey::Int(0)).unwrap();
    assert!(target.is_ref());
    assert_eq!(property(target, "count"), Some(1));
}

#[test]
fn array_callable_separates_shared_pair() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    let pair = Slot::new(Value::Array(Array::list([
        Value::Object(Object::new("Counter")),
        Value::from("bump"),
    ])));
    let mut callable = pair.clone();
    cx.invoke(&mut callable, None, &mut [], InvokeOptions::new())
        .unwrap();

    assert!(!callable.same_identity(&pair));
    let untouched = pair.read();
    let target = untouched.as_array().unwrap().get(&ArrayKey::Int(0)).unwrap();
    assert!(!target.is_ref());
}

#[test]
fn class_name_pair_is_a_static_call() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    let mut callable = Slot::new(Value::Array(Array::list([
        Value::from("counter"),
        Value::from("HASTHIS"),
    ])));
    let result = cx
        .invoke(&mut callable, None, &mut [], InvokeOptions::new())
        .unwrap();
    assert_eq!(result, Value::Bool(false));

    let mut receiver = counter();
    assert_eq!(
        cx.call_method(&mut receiver, "hasThis", &mut []).unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn unknown_class_and_method() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    let mut ghost = Slot::new(Value::Array(Array::list([
        Value::from("Ghost"),
        Value::from("boo"),
    ])));
    let err = cx
        .invoke(&mut ghost, None, &mut [], InvokeOptions::new())
        .unwrap_err();
    assert_eq!(err, CallError::UndefinedClass { name: "Ghost".into() });

    let mut receiver = counter();
    let err = cx.call_method(&mut receiver, "reset", &mut []).unwrap_err();
    assert_eq!(
        err,
        CallError::UndefinedMethod {
            class: "Counter".into(),
            name: "reset".into()
        }
    );
    assert_eq!(err.to_string(), "Call to undefined method Counter::reset()");
}

#[test]
fn non_object_receiver_falls_back_to_functions() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    let mut receiver = Slot::new(Value::Int(0));
    let mut args = [Slot::new(Value::Int(4))];
    assert_eq!(
        cx.call_method(&mut receiver, "double", &mut args).unwrap(),
        Value::Int(8)
    );
}

#[test]
fn current_function_name_tracks_nesting() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    cx.declare_function(Function::user(
        "outer",
        vec![],
        body(|cx| {
            let inner = cx.call("whoami", &mut [])?;
            Ok(Value::from(format!("{}<{inner}", cx.current_function_name())))
        }),
    ))
    .unwrap();

    assert_eq!(cx.current_function_name(), "main");
    assert_eq!(cx.call("outer", &mut []).unwrap(), Value::from("outer<whoami"));
    assert_eq!(cx.current_function_name(), "main");
}

#[test]
fn supplied_locals_are_used_and_returned() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants).build();

    cx.declare_function(Function::user(
        "in_scope",
        vec![],
        body(|cx| {
            let x = cx.local("x").map_or(0, |s| int(&s));
            cx.assign("y", Value::Int(x * 10));
            Ok(Value::Null)
        }),
    ))
    .unwrap();

    let mut scope = Locals::default();
    scope.insert(Arc::from("x"), Slot::new(Value::Int(5)));
    let mut callable = Slot::new(Value::from("in_scope"));
    cx.invoke(
        &mut callable,
        None,
        &mut [],
        InvokeOptions::new().with_locals(&mut scope),
    )
    .unwrap();

    assert_eq!(scope.len(), 2);
    assert_eq!(int(&scope["y"]), 50);
    assert!(cx.locals_cache.is_empty());
}

#[test]
fn fresh_locals_are_recycled() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants).build();

    cx.declare_function(Function::user(
        "f",
        vec![Param::new("a")],
        body(|_| Ok(Value::Null)),
    ))
    .unwrap();

    let kept = Slot::new(Value::Int(1));
    let mut args = [kept.clone()];
    cx.call("f", &mut args).unwrap();
    cx.call("f", &mut args).unwrap();

    assert_eq!(cx.locals_cache.len(), 1);
    assert_eq!(kept.refcount(), 2);
}

#[test]
fn frames_are_released_on_error() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    cx.declare_function(Function::user(
        "deep",
        vec![Param::new("n")],
        body(|cx| {
            let n = cx.local("n").map_or(0, |s| int(&s));
            if n == 0 {
                return Err(CallError::fatal("bottom reached"));
            }
            let mut args = [Slot::new(Value::Int(n - 1))];
            cx.call("deep", &mut args)
        }),
    ))
    .unwrap();

    let mut args = [Slot::new(Value::Int(10))];
    let err = cx.call("deep", &mut args).unwrap_err();
    assert_eq!(
        err,
        CallError::Fatal(RequestFatal::User {
            message: "bottom reached".into()
        })
    );
    assert_eq!(cx.depth(), 0);
    assert_eq!(cx.arena().live_blocks(), 0);
    assert!(cx.arena().full_check().is_clean());
}

#[test]
fn interrupt_stops_a_busy_loop() {
    let mut arena = Arena::default();
    let mut constants = ConstantTable::default();
    let mut timeout = Timeout::new();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .interrupt(timeout.flag())
        .build();

    cx.declare_function(Function::user(
        "spin",
        vec![],
        body(|cx| loop {
            cx.checkpoint()?;
        }),
    ))
    .unwrap();

    timeout.arm(Duration::from_millis(20)).unwrap();
    let err = cx.call("spin", &mut []).unwrap_err();
    assert_eq!(
        err,
        CallError::Fatal(RequestFatal::Timeout(TimedOut { seconds: 1 }))
    );
    assert_eq!(cx.depth(), 0);

    // The flag stays set until disarmed, so the next call fails at entry.
    assert!(cx.call("spin", &mut []).unwrap_err().is_fatal());
    timeout.disarm();
    assert!(cx.checkpoint().is_ok());
}

#[test]
fn memory_ceiling_is_request_fatal() {
    let mut arena = Arena::new(AllocConfig {
        memory_limit: 0,
        ..AllocConfig::default()
    });
    let mut constants = ConstantTable::default();
    let mut cx = ExecContext::builder(&mut arena, &mut constants)
        .registry(registry())
        .build();

    let err = cx.call("whoami", &mut []).unwrap_err();
    assert_eq!(
        err,
        CallError::Fatal(RequestFatal::MemoryExhausted(AllocError::LimitExceeded {
            limit: 0,
            requested: FRAME_RECORD_BYTES
        }))
    );
}
