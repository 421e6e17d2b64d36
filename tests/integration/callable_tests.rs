//! Functions passed as arguments and returned as results.

use proxify::{
    ErrorObject, Fault, Function, LocalRuntime, ProxifyError, TargetObject, Value, expose,
    proxify,
};

use crate::mock_port::connected;

fn sum(args: Vec<Value>) -> Result<Value, Fault> {
    Ok(Value::Int(args.iter().filter_map(Value::as_i64).sum()))
}

/// Calls its first argument with the rest.
fn apply() -> Function {
    Function::asynchronous(|args: Vec<Value>| async move {
        let mut args = args.into_iter();
        let callee = args.next().and_then(|f| f.as_remote().cloned());
        let Some(callee) = callee else {
            return Err(Fault::from(ErrorObject::type_error("first argument is not a function")));
        };
        callee.call(args.collect()).await.map_err(Fault::from)
    })
}

#[test]
fn function_argument_is_called_back() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(&target, apply());
    let proxy = proxify(&caller);

    let outcome = rt.block_on(async move {
        proxy
            .call(vec![Function::new(sum).into(), 1.into(), 2.into()])
            .await
    });
    assert_eq!(outcome, Ok(Value::Int(3)));
    assert!(caller.is_open());
}

#[test]
fn function_result_can_be_called() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(
        &target,
        TargetObject::new().function("adder", |_| Ok(Function::new(sum).into())),
    );
    let proxy = proxify(&caller);

    let outcome = rt.block_on(async move {
        let adder = proxy.get("adder").expect("adder").call(Vec::new()).await?;
        let adder = adder.as_remote().expect("a callable result").clone();
        adder.call(vec![1.into(), 2.into()]).await
    });
    assert_eq!(outcome, Ok(Value::Int(3)));
}

#[test]
fn nested_function_arguments_are_callable() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(
        &target,
        Function::asynchronous(|args: Vec<Value>| async move {
            let on_done = args
                .first()
                .and_then(|options| options.get(&"onDone".into()))
                .and_then(Value::as_remote)
                .cloned();
            match on_done {
                Some(f) => f.call(vec!["done".into()]).await.map_err(Fault::from),
                None => Ok(Value::Undefined),
            }
        }),
    );
    let proxy = proxify(&caller);

    let echo = Function::new(|args| Ok(args.into_iter().next().unwrap_or_default()));
    let options = Value::object([("onDone", Value::from(echo)), ("retries", Value::Int(2))]);
    let outcome = rt.block_on(async move { proxy.call(vec![options]).await });
    assert_eq!(outcome, Ok(Value::from("done")));
}

#[test]
fn received_function_can_be_passed_back() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(
        &target,
        Function::new(|args| Ok(args.into_iter().next().unwrap_or_default())),
    );
    let proxy = proxify(&caller);

    let outcome = rt.block_on(async move {
        let back = proxy.call(vec![Function::new(sum).into()]).await?;
        let back = back.as_remote().expect("a callable").clone();
        back.call(vec![20.into(), 22.into()]).await
    });
    assert_eq!(outcome, Ok(Value::Int(42)));
}

#[test]
fn callback_errors_propagate_to_the_caller() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(&target, apply());
    let proxy = proxify(&caller);

    let failing = Function::new(|_| Err(ErrorObject::named("RangeError", "too big").into()));
    let outcome = rt.block_on(async move { proxy.call(vec![failing.into()]).await });
    let Err(ProxifyError::Remote(Fault::Error(error))) = outcome else {
        panic!("expected the callback's error");
    };
    assert_eq!(error.name, "RangeError");
    assert_eq!(error.message, "too big");
}

#[test]
fn closing_the_channel_closes_received_functions() {
    let rt = LocalRuntime::new();
    let (caller, target) = connected(&rt);
    expose(
        &target,
        TargetObject::new().function("adder", |_| Ok(Function::new(sum).into())),
    );
    let proxy = proxify(&caller);

    let adder = rt.block_on({
        let proxy = proxy.clone();
        async move { proxy.get("adder").expect("adder").call(Vec::new()).await }
    });
    let adder = adder.expect("adder result");
    let adder = adder.as_remote().expect("a callable result").clone();

    caller.close();
    assert!(adder.channel().is_closed());
    let outcome = rt.block_on(async move { adder.call(vec![1.into()]).await });
    assert_eq!(outcome, Err(ProxifyError::ChannelClosed));
}
