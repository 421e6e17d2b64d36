//! Proxify demo: a calculator served over an in-memory port pair.
//!
//! ```text
//! ┌─────────────── LocalRuntime (one thread) ───────────────┐
//! │                                                          │
//! │   caller Channel ◀── MessagePort pair ──▶ target Channel │
//! │   proxify()                               expose(calc)   │
//! │                                                          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `proxify-demo [config.json]`. Set `RUST_LOG=debug` to trace
//! every call.

use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use log::{info, warn};

use proxify::{
    Buffer, Channel, ChannelConfig, ErrorObject, Fault, Function, LocalRuntime, MessageChannel,
    Proxy, TargetObject, Value, expose, transfer, with_proxy,
};

fn load_config() -> Result<ChannelConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(ChannelConfig::default());
    };
    let json = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    ChannelConfig::from_json(&json).map_err(|e| anyhow!("{path}: {e}"))
}

fn calculator() -> TargetObject {
    TargetObject::new()
        .function("add", |args| {
            Ok(Value::Float(args.iter().filter_map(Value::as_f64).sum()))
        })
        .function("divide", |args| {
            let (a, b) = match args.as_slice() {
                [a, b] => (a.as_f64(), b.as_f64()),
                _ => (None, None),
            };
            match (a, b) {
                (Some(_), Some(b)) if b == 0.0 => Err(ErrorObject::named(
                    "RangeError",
                    "division by zero",
                )
                .with_property("divisor", 0)
                .into()),
                (Some(a), Some(b)) => Ok(Value::Float(a / b)),
                _ => Err(ErrorObject::type_error("divide takes two numbers").into()),
            }
        })
        .member(
            "blobs",
            Function::asynchronous(|args: Vec<Value>| async move {
                futures_lite::future::yield_now().await;
                let buffers: Vec<Buffer> = args
                    .iter()
                    .filter_map(Value::as_i64)
                    .map(|n| Buffer::new(usize::try_from(n).unwrap_or(0)))
                    .collect();
                Ok::<_, Fault>(transfer(buffers.clone(), &buffers))
            }),
        )
}

async fn exercise(calc: Proxy) -> Result<Vec<String>> {
    let mut lines = Vec::new();

    let add = calc.get("add").context("add")?;
    let sum = add.call(vec![1.into(), 2.into()]).await.map_err(|e| anyhow!("{e}"))?;
    lines.push(format!("add(1, 2) = {sum}"));

    let divide = calc.get("divide").context("divide")?;
    match divide.call(vec![1.into(), 0.into()]).await {
        Ok(v) => lines.push(format!("divide(1, 0) = {v}")),
        Err(e) => lines.push(format!("divide(1, 0) failed: {e}")),
    }

    let blobs = calc.get("blobs").context("blobs")?;
    let buffers = blobs
        .call(vec![1.into(), 2.into(), 3.into()])
        .await
        .map_err(|e| anyhow!("{e}"))?;
    let lengths: Vec<usize> = buffers
        .as_array()
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_buffer)
        .map(Buffer::byte_length)
        .collect();
    lines.push(format!("blobs(1, 2, 3) -> byte lengths {lengths:?}"));

    Ok(lines)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("proxify demo v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    let rt = LocalRuntime::new();
    let (caller_port, target_port) = MessageChannel::new(&rt.spawner());

    let target = Channel::with_config(Rc::new(target_port), rt.spawner(), config.clone())
        .map_err(|e| anyhow!("{e}"))?;
    expose(&target, calculator());

    let caller = Channel::with_config(Rc::new(caller_port), rt.spawner(), config)
        .map_err(|e| anyhow!("{e}"))?;

    let scope = caller.clone();
    let report = rt.block_on(async move { with_proxy(&scope, exercise).await })?;

    for line in report {
        info!("{line}");
    }
    if !caller.is_closed() {
        warn!("caller channel still open after scope");
    }
    info!("caller channel {}", caller.state());
    Ok(())
}
