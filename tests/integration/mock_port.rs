//! Scripted port and channel-pair helpers for integration tests.
//!
//! `ScriptedPort` records every post (payload plus transfer list) so tests
//! can assert on the exact wire traffic, and lets a test inject inbound
//! messages in whatever order it likes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use proxify::port::{Listener, ListenerId, MessageEvent, Port};
use proxify::rpc::message::{CallId, CallRequest, CallResponse, Message};
use proxify::value::structured_clone;
use proxify::{Channel, CloneError, LocalRuntime, MessageChannel, Transferable, Value};

// ── Posted message record ─────────────────────────────────────

pub struct Posted {
    pub data: Value,
    pub transfer: Vec<Transferable>,
}

// ── ScriptedPort ──────────────────────────────────────────────

#[derive(Default)]
pub struct ScriptedPort {
    pub posted: RefCell<Vec<Posted>>,
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_id: Cell<u64>,
    pub closes: Cell<u32>,
}

#[allow(dead_code)]
impl ScriptedPort {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn sent_count(&self) -> usize {
        self.posted.borrow().len()
    }

    /// Every call request posted so far, in order.
    pub fn requests(&self) -> Vec<CallRequest> {
        self.posted
            .borrow()
            .iter()
            .filter_map(|p| match Message::from_value(p.data.clone()) {
                Ok(Message::Request(req)) => Some(req),
                _ => None,
            })
            .collect()
    }

    pub fn close_notifications(&self) -> usize {
        self.posted
            .borrow()
            .iter()
            .filter(|p| matches!(Message::from_value(p.data.clone()), Ok(Message::Close)))
            .count()
    }

    /// Deliver `data` to every listener, as if the peer had posted it.
    pub fn inject(&self, data: Value) {
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        let event = MessageEvent {
            data,
            ports: Vec::new(),
        };
        for listener in snapshot {
            listener(&event);
        }
    }

    pub fn respond(&self, id: CallId, outcome: Result<Value, Value>) {
        self.inject(Message::Response(CallResponse { id, outcome }).into_value());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl Port for ScriptedPort {
    fn post_message(&self, data: Value, transfer: Vec<Transferable>) -> Result<(), CloneError> {
        // Same serialization rules as a real port; the copy goes nowhere.
        structured_clone(&data, &transfer)?;
        self.posted.borrow_mut().push(Posted { data, transfer });
        Ok(())
    }

    fn subscribe(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|(entry, _)| *entry != id);
    }

    fn close(&self) {
        self.closes.set(self.closes.get() + 1);
    }
}

// ── Channel helpers ───────────────────────────────────────────

/// A caller channel over a scripted port.
pub fn scripted(rt: &LocalRuntime) -> (Rc<ScriptedPort>, Channel) {
    let port = ScriptedPort::new();
    let channel = Channel::new(port.clone(), rt.spawner());
    (port, channel)
}

/// `(caller, target)` channels over an entangled in-memory port pair.
pub fn connected(rt: &LocalRuntime) -> (Channel, Channel) {
    let (a, b) = MessageChannel::new(&rt.spawner());
    (
        Channel::new(Rc::new(a), rt.spawner()),
        Channel::new(Rc::new(b), rt.spawner()),
    )
}

/// Yield until `done` holds, so spawned delivery tasks get to run.
pub async fn until(mut done: impl FnMut() -> bool) {
    while !done() {
        futures_lite::future::yield_now().await;
    }
}
