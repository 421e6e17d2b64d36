//! Port abstraction: any duplex, message-oriented channel.
//!
//! ```text
//!   Proxy / Binder ──▶ Port trait ──▶ MessagePort  (in-memory, structured clone)
//!                                 └─▶ FramedPort   (byte Transport + postcard frames)
//! ```
//!
//! The RPC core is generic over [`Port`], so adding a new transport
//! requires zero changes to the proxy logic. A port only has to post
//! values, deliver inbound values to subscribed listeners, and optionally
//! honour `start`/`close`.

pub mod codec;
pub mod framed;
pub mod memory;
pub mod transport;

use core::cell::Cell;
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::CloneError;
use crate::value::{PortHandle, Transferable, Value};

/// Inbound message as seen by listeners.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub data: Value,
    /// Ports that were transferred along with `data`.
    pub ports: Vec<PortHandle>,
}

/// Callback invoked for each inbound message.
pub type Listener = Rc<dyn Fn(&MessageEvent)>;

/// Subscription handle returned by [`Port::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Duplex message channel endpoint.
pub trait Port {
    /// Send `data` to the peer, moving every entry of `transfer`.
    ///
    /// Fails synchronously if `data` cannot be represented; a closed port
    /// silently drops the message.
    fn post_message(&self, data: Value, transfer: Vec<Transferable>) -> Result<(), CloneError>;

    /// Register a listener for inbound messages.
    fn subscribe(&self, listener: Listener) -> ListenerId;

    /// Remove a listener. Unknown ids are ignored.
    fn unsubscribe(&self, id: ListenerId);

    /// Begin delivering inbound messages.
    fn start(&self) {}

    /// Stop delivering and release transport resources.
    fn close(&self) {}
}

/// Listener bookkeeping shared by the concrete ports.
#[derive(Default)]
pub(crate) struct Listeners {
    entries: RefCell<Vec<(ListenerId, Listener)>>,
    next_id: Cell<u64>,
}

impl Listeners {
    pub(crate) fn add(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entries.borrow_mut().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) {
        self.entries.borrow_mut().retain(|(entry, _)| *entry != id);
    }

    pub(crate) fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Deliver `event` to a snapshot of the current listeners, so a
    /// listener may (un)subscribe while being called.
    pub(crate) fn dispatch(&self, event: &MessageEvent) {
        let snapshot: Vec<Listener> = self
            .entries
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }
}

/// A port that discards all posts and never delivers.
/// Useful as a placeholder before a real peer is connected.
#[derive(Default)]
pub struct NullPort {
    listeners: Listeners,
}

impl Port for NullPort {
    fn post_message(&self, _data: Value, _transfer: Vec<Transferable>) -> Result<(), CloneError> {
        Ok(())
    }

    fn subscribe(&self, listener: Listener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners.remove(id);
    }
}
