//! End-to-end scenarios over an in-memory port pair.

use std::cell::RefCell;
use std::rc::Rc;

use proxify::{
    Buffer, ErrorObject, Fault, Function, Key, LocalRuntime, ProxifyError, TargetObject, Value,
    expose, proxify, transfer,
};

use crate::mock_port::{connected, until};

fn sum(args: Vec<Value>) -> Result<Value, Fault> {
    Ok(Value::Int(args.iter().filter_map(Value::as_i64).sum()))
}

#[test]
fn function_target_adds() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(&target, Function::new(sum));
    let proxy = proxify(&caller);

    let outcome = rt.block_on(async move { proxy.call(vec![1.into(), 2.into()]).await });
    assert_eq!(outcome, Ok(Value::Int(3)));
}

#[test]
fn member_function_adds() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(&target, TargetObject::new().function("add", sum));
    let proxy = proxify(&caller);

    let add = proxy.get("add").unwrap();
    let outcome = rt.block_on(async move { add.call(vec![1.into(), 2.into()]).await });
    assert_eq!(outcome, Ok(Value::Int(3)));
}

#[test]
fn thrown_error_rejects_with_message() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(
        &target,
        Function::new(|_| Err(ErrorObject::new("foo").with_property("code", 7).into())),
    );
    let proxy = proxify(&caller);

    let outcome = rt.block_on(async move { proxy.call(Vec::new()).await });
    let Err(ProxifyError::Remote(Fault::Error(error))) = outcome else {
        panic!("expected a remote error");
    };
    assert!(error.message.contains("foo"));
    assert_eq!(error.name, "Error");
    assert_eq!(error.property("code"), Some(&Value::Int(7)));
}

#[test]
fn thrown_plain_value_passes_through() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(&target, Function::new(|_| Err(Fault::Value(Value::Int(404)))));
    let proxy = proxify(&caller);

    let outcome = rt.block_on(async move { proxy.call(Vec::new()).await });
    assert_eq!(
        outcome,
        Err(ProxifyError::Remote(Fault::Value(Value::Int(404))))
    );
}

#[test]
fn target_side_close_rejects_calls_before_and_after_notice() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(&target, Function::new(|_| Ok(Value::Int(42))));
    let proxy = proxify(&caller);

    // Close on the target side; the notice reaches the caller in a later task.
    target.close();
    let before = proxy.call(Vec::new());

    let c = caller.clone();
    let p = proxy.clone();
    let (a, b) = rt.block_on(async move {
        until(|| c.is_closed()).await;
        let after = p.call(Vec::new());
        (before.await, after.await)
    });
    assert_eq!(a, Err(ProxifyError::ChannelClosed));
    assert_eq!(b, Err(ProxifyError::ChannelClosed));
}

#[test]
fn transferred_result_buffers_arrive_whole() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    let originals = Rc::new(RefCell::new(Vec::new()));

    let kept = originals.clone();
    expose(
        &target,
        Function::new(move |_| {
            let buffers: Vec<Buffer> = [1, 2, 3].into_iter().map(Buffer::new).collect();
            kept.borrow_mut().extend(buffers.iter().cloned());
            Ok(transfer(buffers.clone(), &buffers))
        }),
    );
    let proxy = proxify(&caller);

    let outcome = rt.block_on(async move { proxy.call(Vec::new()).await }).unwrap();
    let lengths: Vec<usize> = outcome
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_buffer().unwrap().byte_length())
        .collect();
    assert_eq!(lengths, vec![1, 2, 3]);
    assert!(originals.borrow().iter().all(Buffer::is_detached));
}

#[test]
fn transferred_argument_moves_to_target() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(
        &target,
        Function::new(|args| {
            let len = args.first().and_then(Value::as_buffer).map_or(0, Buffer::byte_length);
            Ok(Value::from(len))
        }),
    );
    let proxy = proxify(&caller);

    let buffer = Buffer::new(42);
    let arg = Value::Buffer(buffer.clone());
    let outcome = rt.block_on(async move { proxy.call(vec![arg]).await });
    assert_eq!(outcome, Ok(Value::Int(42)));
    assert!(buffer.is_detached());
}

#[test]
fn marked_argument_array_is_moved() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(
        &target,
        Function::new(|args| {
            let lengths: Vec<Value> = args[0]
                .as_array()
                .unwrap_or_default()
                .iter()
                .filter_map(Value::as_buffer)
                .map(|b| Value::from(b.byte_length()))
                .collect();
            Ok(Value::Array(lengths))
        }),
    );
    let proxy = proxify(&caller);

    let buffers: Vec<Buffer> = [1, 2, 3].into_iter().map(Buffer::new).collect();
    let arg = transfer(buffers.clone(), &buffers);
    let outcome = rt.block_on(async move { proxy.call(vec![arg]).await });
    assert_eq!(outcome, Ok(Value::from(vec![1, 2, 3])));
    assert!(buffers.iter().all(Buffer::is_detached));
}

#[test]
fn async_target_is_awaited_before_reply() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(
        &target,
        TargetObject::new().member(
            "slow",
            Function::asynchronous(|args: Vec<Value>| async move {
                for _ in 0..5 {
                    futures_lite::future::yield_now().await;
                }
                Ok::<_, Fault>(Value::from(args.len()))
            }),
        ),
    );
    let proxy = proxify(&caller);

    let slow = proxy.get("slow").unwrap();
    let outcome = rt.block_on(async move { slow.call(vec![Value::Null, Value::Null]).await });
    assert_eq!(outcome, Ok(Value::Int(2)));
}

#[test]
fn missing_member_rejects_with_type_error() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(&target, TargetObject::new().function("add", sum));
    let proxy = proxify(&caller);

    let node = proxy.get("nope").unwrap().get("deeper").unwrap();
    let outcome = rt.block_on(async move { node.call(Vec::new()).await });
    let Err(ProxifyError::Remote(fault)) = outcome else {
        panic!("expected a remote fault");
    };
    assert_eq!(fault.as_error().map(|e| e.name.as_str()), Some("TypeError"));
}

#[test]
fn binder_survives_failures() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(
        &target,
        TargetObject::new()
            .function("fail", |_| Err(ErrorObject::new("boom").into()))
            .function("add", sum),
    );
    let proxy = proxify(&caller);

    let (fail, add) = (proxy.get("fail").unwrap(), proxy.get("add").unwrap());
    let (first, second) = rt.block_on(async move {
        let first = fail.call(Vec::new()).await;
        let second = add.call(vec![2.into(), 2.into()]).await;
        (first, second)
    });
    assert!(first.is_err());
    assert_eq!(second, Ok(Value::Int(4)));
}

#[test]
fn concurrent_calls_resolve_independently() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(&target, Function::new(sum));
    let proxy = proxify(&caller);

    let replies: Vec<_> = (0..5).map(|i| proxy.call(vec![Value::from(i), 100.into()])).collect();
    let outcomes = rt.block_on(async move {
        let mut out = Vec::new();
        for reply in replies.into_iter().rev() {
            out.push(reply.await);
        }
        out
    });
    let expected: Vec<_> = (0..5).rev().map(|i| Ok(Value::Int(i + 100))).collect();
    assert_eq!(outcomes, expected);
}

#[test]
fn out_of_range_index_settles() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(
        &target,
        TargetObject::new().value("items", vec![1, 2, 3]).function(
            usize::MAX.to_string(),
            |_| Ok(Value::from("max")),
        ),
    );
    let proxy = proxify(&caller);

    let (by_name, missing) = rt.block_on(async move {
        let by_name = proxy.get_literal(Key::Index(usize::MAX)).call(Vec::new()).await;
        let missing = proxy
            .get("items")
            .unwrap()
            .get_literal(Key::Index(usize::MAX))
            .call(Vec::new())
            .await;
        (by_name, missing)
    });
    assert_eq!(by_name, Ok(Value::from("max")));
    let Err(ProxifyError::Remote(Fault::Error(error))) = missing else {
        panic!("expected a TypeError, got {missing:?}");
    };
    assert_eq!(error.name, "TypeError");
    assert_eq!(caller.pending_calls(), 0);
}
