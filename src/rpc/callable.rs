//! Function-valued arguments and results.
//!
//! A [`Value::Function`] never crosses a port by itself. Right before a
//! request or response is posted, every function inside it is bound to a
//! fresh [`MessageChannel`]: the local end is exposed with the function as
//! its target and the other end travels, transferred, in a tagged record.
//! The receiving side turns each such record back into a callable
//! [`Value::Remote`].
//!
//! ```text
//!   sender                                          receiver
//!   ──────                                          ────────
//!   Function ──expose──▶ sub-channel                { FUNCTION_TAG: port }
//!                             ▲                              │ import
//!                             └────── calls ◀── Value::Remote(proxify(port))
//! ```
//!
//! Sub-channels are owned by the channel that created them and close with
//! it. Dropping the last handle to a received function closes its
//! sub-channel, which in turn releases the exported function.

use std::collections::BTreeMap;
use std::rc::Rc;

use log::debug;

use super::channel::Channel;
use super::marshal::Fault;
use super::message::{CallRequest, CallResponse, Message};
use super::proxy::{Proxy, proxify};
use super::target::{Function, expose};
use crate::port::Port;
use crate::port::memory::MessageChannel;
use crate::value::{MAX_CLONE_DEPTH, PortHandle, Transferable, Value};

/// Field name marking a record that carries a function's port.
pub const FUNCTION_TAG: &str = "$proxify:function";

/// Replace every function in `message` with a transferable port bound to
/// it. Ports are appended to `transfer`; the sub-channels serving them are
/// returned so the caller can close them if the post fails.
pub(crate) fn export_message(
    message: Message,
    channel: &Channel,
    transfer: &mut Vec<Transferable>,
) -> (Message, Vec<Channel>) {
    let mut exported = Vec::new();
    let mut export = |value: Value| export_value(value, channel, transfer, &mut exported, 0);
    let message = match message {
        Message::Request(CallRequest { id, path, args }) => Message::Request(CallRequest {
            id,
            path,
            args: args.into_iter().map(&mut export).collect(),
        }),
        Message::Response(CallResponse {
            id,
            outcome: Ok(result),
        }) => Message::Response(CallResponse {
            id,
            outcome: Ok(export(result)),
        }),
        other => other,
    };
    (message, exported)
}

fn export_value(
    value: Value,
    channel: &Channel,
    transfer: &mut Vec<Transferable>,
    exported: &mut Vec<Channel>,
    depth: usize,
) -> Value {
    // Too deep to post anyway; the clone reports it.
    if depth > MAX_CLONE_DEPTH {
        return value;
    }
    match value {
        Value::Function(function) => bind(function, channel, transfer, exported),
        Value::Remote(proxy) => bind(forward(proxy), channel, transfer, exported),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| export_value(item, channel, transfer, exported, depth + 1))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, export_value(v, channel, transfer, exported, depth + 1)))
                .collect(),
        ),
        Value::Marked(inner, marks) => Value::Marked(
            Box::new(export_value(*inner, channel, transfer, exported, depth)),
            marks,
        ),
        other => other,
    }
}

fn bind(
    function: Function,
    channel: &Channel,
    transfer: &mut Vec<Transferable>,
    exported: &mut Vec<Channel>,
) -> Value {
    let (mine, theirs) = MessageChannel::new(channel.spawner());
    let sub = channel.sibling(Rc::new(mine));
    expose(&sub, function);
    exported.push(sub);

    let handle = PortHandle::new(Rc::new(theirs));
    transfer.push(Transferable::Port(handle.clone()));
    Value::Object(BTreeMap::from([(FUNCTION_TAG.to_owned(), Value::Port(handle))]))
}

/// A received function passed on again is served by calling through.
fn forward(proxy: Proxy) -> Function {
    Function::asynchronous(move |args| {
        let reply = proxy.call(args);
        async move { reply.await.map_err(Fault::from) }
    })
}

/// Turn every tagged port record in an inbound `message` into a callable
/// [`Value::Remote`]. The sub-channels created are returned for the
/// receiving channel to own.
pub(crate) fn import_message(message: Message, channel: &Channel) -> (Message, Vec<Channel>) {
    let mut imported = Vec::new();
    let mut import = |value: Value| import_value(value, channel, &mut imported, 0);
    let message = match message {
        Message::Request(CallRequest { id, path, args }) => Message::Request(CallRequest {
            id,
            path,
            args: args.into_iter().map(&mut import).collect(),
        }),
        Message::Response(CallResponse {
            id,
            outcome: Ok(result),
        }) => Message::Response(CallResponse {
            id,
            outcome: Ok(import(result)),
        }),
        other => other,
    };
    (message, imported)
}

fn import_value(value: Value, channel: &Channel, imported: &mut Vec<Channel>, depth: usize) -> Value {
    if depth > MAX_CLONE_DEPTH {
        return value;
    }
    match value {
        Value::Object(map) => match tagged_port(&map) {
            Some(port) => {
                let sub = channel.sibling(port);
                let remote = proxify(&sub);
                imported.push(sub);
                Value::Remote(remote)
            }
            None => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, import_value(v, channel, imported, depth + 1)))
                    .collect(),
            ),
        },
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| import_value(item, channel, imported, depth + 1))
                .collect(),
        ),
        other => other,
    }
}

fn tagged_port(map: &BTreeMap<String, Value>) -> Option<Rc<dyn Port>> {
    if map.len() != 1 {
        return None;
    }
    let port = map.get(FUNCTION_TAG)?.as_port()?.port();
    if port.is_none() {
        debug!("RPC: function record without a live port, left as data");
    }
    port
}
