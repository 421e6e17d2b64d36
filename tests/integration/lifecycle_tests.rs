//! Lifecycle, correlation and cancellation against the scripted port.

use proxify::rpc::message::{CallId, CallResponse, Message};
use proxify::{
    ChannelConfig, ChannelState, Fault, Function, LocalRuntime, ProxifyError, Value, expose,
    proxify, unproxify, with_proxy,
};

use crate::mock_port::{connected, scripted, until};

#[test]
fn double_close_is_a_quiet_no_op() {
    let rt = LocalRuntime::new();
    let (port, channel) = scripted(&rt);
    let proxy = proxify(&channel);

    unproxify(&proxy);
    assert_eq!(channel.state(), ChannelState::Closed);
    channel.close();
    proxy.close();
    assert_eq!(channel.state(), ChannelState::Closed);

    assert_eq!(port.close_notifications(), 1);
    assert_eq!(port.closes.get(), 1);
    assert_eq!(port.listener_count(), 0);
}

#[test]
fn calls_after_close_fail_without_sending() {
    let rt = LocalRuntime::new();
    let (port, channel) = scripted(&rt);
    let proxy = proxify(&channel);
    channel.close();
    let sent = port.sent_count();

    let add = proxy.get("add").unwrap();
    let outcome = futures_lite::future::block_on(add.call(vec![1.into()]));
    assert_eq!(outcome, Err(ProxifyError::ChannelClosed));
    assert_eq!(port.sent_count(), sent);
}

#[test]
fn pending_calls_reject_exactly_once_on_close() {
    let rt = LocalRuntime::new();
    let (port, channel) = scripted(&rt);
    let proxy = proxify(&channel);

    let replies: Vec<_> = (0..3).map(|i| proxy.call(vec![Value::from(i)])).collect();
    let requests = port.requests();
    assert_eq!(channel.pending_calls(), 3);

    channel.close();
    assert_eq!(channel.pending_calls(), 0);

    // Late responses find nothing to settle.
    for req in &requests {
        port.respond(req.id, Ok(Value::Int(1)));
    }

    for reply in replies {
        assert_eq!(
            futures_lite::future::block_on(reply),
            Err(ProxifyError::ChannelClosed)
        );
    }
}

#[test]
fn responses_in_reverse_order_settle_their_own_calls() {
    let rt = LocalRuntime::new();
    let (port, channel) = scripted(&rt);
    let proxy = proxify(&channel);

    let x = proxy.call(vec![Value::from("x")]);
    let y = proxy.call(vec![Value::from("y")]);
    let requests = port.requests();
    assert_ne!(requests[0].id, requests[1].id);

    port.respond(requests[1].id, Ok(Value::from("result y")));
    port.respond(requests[0].id, Ok(Value::from("result x")));

    assert_eq!(futures_lite::future::block_on(x), Ok(Value::from("result x")));
    assert_eq!(futures_lite::future::block_on(y), Ok(Value::from("result y")));
}

#[test]
fn unknown_and_duplicate_responses_are_dropped() {
    let rt = LocalRuntime::new();
    let (port, channel) = scripted(&rt);
    let proxy = proxify(&channel);

    let reply = proxy.call(Vec::new());
    let id = port.requests()[0].id;
    port.respond(id, Ok(Value::Int(1)));
    port.respond(id, Ok(Value::Int(2)));
    port.inject(Value::from("not a message"));

    assert_eq!(futures_lite::future::block_on(reply), Ok(Value::Int(1)));
    assert!(channel.is_open());
}

#[test]
fn peer_close_is_not_echoed() {
    let rt = LocalRuntime::new();
    let (port, channel) = scripted(&rt);
    let proxy = proxify(&channel);
    let pending = proxy.call(Vec::new());

    port.inject(Message::Close.into_value());
    assert!(channel.is_closed());
    assert_eq!(port.close_notifications(), 0);
    assert_eq!(
        futures_lite::future::block_on(pending),
        Err(ProxifyError::ChannelClosed)
    );
}

#[test]
fn nested_unlisted_port_is_not_cloneable() {
    let rt = LocalRuntime::new();
    let (port, channel) = scripted(&rt);
    let proxy = proxify(&channel);

    let stray = proxify::PortHandle::new(crate::mock_port::ScriptedPort::new());
    let other = proxy.call(Vec::new());
    let bad = proxy.call(vec![Value::from(vec![Value::Port(stray)])]);

    assert!(matches!(
        futures_lite::future::block_on(bad),
        Err(ProxifyError::NonCloneable(_))
    ));
    assert_eq!(channel.pending_calls(), 1, "the other call stays in flight");

    port.respond(port.requests()[0].id, Ok(Value::Null));
    assert_eq!(futures_lite::future::block_on(other), Ok(Value::Null));
}

#[test]
fn dropping_every_proxy_closes_and_notifies_peer() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    proxify::expose(&target, proxify::TargetObject::new());

    let child = proxify(&caller).get("a").unwrap().get("b").unwrap();
    assert!(caller.is_open());
    drop(child);
    assert!(caller.is_closed());

    let t = target.clone();
    rt.block_on(async move { until(|| t.is_closed()).await });
    assert!(target.is_closed());
}

#[test]
fn close_on_drop_can_be_disabled() {
    let rt = LocalRuntime::new();
    let (port, _) = scripted(&rt);
    let config = ChannelConfig {
        close_on_drop: false,
        ..ChannelConfig::default()
    };
    let channel = proxify::Channel::with_config(port.clone(), rt.spawner(), config).unwrap();
    drop(proxify(&channel));
    assert!(channel.is_open());
    assert_eq!(port.close_notifications(), 0);
}

#[test]
fn scoped_proxy_closes_even_on_error_exit() {
    let rt = LocalRuntime::new();
    let (port, channel) = scripted(&rt);
    let scope = channel.clone();
    let outcome: Result<(), &str> = rt.block_on(async move {
        with_proxy(&scope, |proxy| async move {
            let _keep = proxy;
            Err("bail out")
        })
        .await
    });
    assert!(outcome.is_err());
    assert!(channel.is_closed());
    assert_eq!(port.close_notifications(), 1);
}

#[test]
fn thenable_member_is_absent() {
    let rt = LocalRuntime::new();
    let (port, channel) = scripted(&rt);
    let proxy = proxify(&channel);
    assert!(proxy.get("then").is_none());
    assert!(proxy.get("value").unwrap().get("then").is_none());
    assert_eq!(port.sent_count(), 0);
}

#[test]
fn identified_malformed_request_is_answered() {
    let rt = LocalRuntime::new();
    let (port, channel) = scripted(&rt);
    expose(&channel, Function::new(|_| Ok(Value::Null)));

    port.inject(Value::object([
        ("id", Value::Int(9)),
        ("path", Value::from(vec![Value::Bool(true)])),
        ("args", Value::Array(Vec::new())),
    ]));
    port.inject(Value::object([
        ("id", Value::Int(10)),
        ("path", Value::Array(Vec::new())),
        ("args", Value::from("not a list")),
    ]));

    let answers: Vec<_> = port
        .posted
        .borrow()
        .iter()
        .filter_map(|p| match Message::from_value(p.data.clone()) {
            Ok(Message::Response(CallResponse { id, outcome: Err(record) })) => {
                Some((id, proxify::rpc::marshal::from_cloneable(record)))
            }
            _ => None,
        })
        .collect();
    assert_eq!(answers.len(), 2);
    for ((id, fault), (want_id, field)) in answers.iter().zip([(9, "path"), (10, "args")]) {
        assert_eq!(*id, CallId(want_id));
        let Fault::Error(error) = fault else {
            panic!("expected an error for call {id}");
        };
        assert_eq!(error.name, "TypeError");
        assert!(error.message.contains(field));
    }
    assert!(channel.is_open());
}

#[test]
fn unidentified_malformed_request_is_dropped() {
    let rt = LocalRuntime::new();
    let (port, channel) = scripted(&rt);
    expose(&channel, Function::new(|_| Ok(Value::Null)));

    port.inject(Value::object([
        ("id", Value::from("nine")),
        ("path", Value::Array(Vec::new())),
        ("args", Value::Array(Vec::new())),
    ]));
    assert_eq!(port.sent_count(), 0);
    assert!(channel.is_open());
}
