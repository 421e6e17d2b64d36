//! In-memory entangled port pair.
//!
//! Posting runs a [`structured_clone`] synchronously, so serialization
//! errors surface to the poster and transferred buffers are detached right
//! away. Delivery is asynchronous: each port owns an inbox and, once
//! started, a delivery task that hands one message at a time to the
//! listeners and yields between messages.
//!
//! ```text
//!  port1.post_message ──▶ clone ──▶ inbox(port2) ──▶ delivery task ──▶ listeners
//!  port2.post_message ──▶ clone ──▶ inbox(port1) ──▶ delivery task ──▶ listeners
//! ```

use core::cell::Cell;
use core::future::poll_fn;
use core::task::{Context, Poll};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use embassy_sync::waitqueue::WakerRegistration;
use futures_lite::FutureExt;
use log::debug;

use super::{Listener, ListenerId, Listeners, MessageEvent, Port};
use crate::error::CloneError;
use crate::runtime::Spawner;
use crate::value::{Transferable, Value, structured_clone};

/// One side's receive state.
struct Endpoint {
    inbox: RefCell<VecDeque<MessageEvent>>,
    waker: RefCell<WakerRegistration>,
    listeners: Listeners,
    started: Cell<bool>,
    closed: Cell<bool>,
}

impl Endpoint {
    fn new() -> Self {
        Self {
            inbox: RefCell::new(VecDeque::new()),
            waker: RefCell::new(WakerRegistration::new()),
            listeners: Listeners::default(),
            started: Cell::new(false),
            closed: Cell::new(false),
        }
    }

    fn push(&self, event: MessageEvent) {
        if self.closed.get() {
            return;
        }
        self.inbox.borrow_mut().push_back(event);
        self.waker.borrow_mut().wake();
    }

    fn poll_next(&self, cx: &mut Context<'_>) -> Poll<Option<MessageEvent>> {
        if self.closed.get() {
            return Poll::Ready(None);
        }
        if let Some(event) = self.inbox.borrow_mut().pop_front() {
            return Poll::Ready(Some(event));
        }
        self.waker.borrow_mut().register(cx.waker());
        Poll::Pending
    }

    fn shut(&self) {
        self.closed.set(true);
        self.inbox.borrow_mut().clear();
        self.listeners.clear();
        self.waker.borrow_mut().wake();
    }
}

async fn deliver(endpoint: Rc<Endpoint>) {
    while let Some(event) = poll_fn(|cx| endpoint.poll_next(cx)).await {
        endpoint.listeners.dispatch(&event);
        // Each message is its own task turn.
        futures_lite::future::yield_now().await;
    }
    debug!("PORT: delivery stopped");
}

/// One end of a [`MessageChannel`].
pub struct MessagePort {
    local: Rc<Endpoint>,
    peer: Rc<Endpoint>,
    spawner: Spawner,
}

impl MessagePort {
    pub fn is_closed(&self) -> bool {
        self.local.closed.get()
    }

    /// Number of messages waiting for delivery on this side.
    pub fn queued(&self) -> usize {
        self.local.inbox.borrow().len()
    }
}

impl Port for MessagePort {
    fn post_message(&self, data: Value, transfer: Vec<Transferable>) -> Result<(), CloneError> {
        if self.local.closed.get() {
            return Ok(());
        }
        let cloned = structured_clone(&data, &transfer)?;
        self.peer.push(MessageEvent {
            data: cloned.value,
            ports: cloned.ports,
        });
        Ok(())
    }

    fn subscribe(&self, listener: Listener) -> ListenerId {
        self.local.listeners.add(listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.local.listeners.remove(id);
    }

    fn start(&self) {
        if self.local.started.replace(true) || self.local.closed.get() {
            return;
        }
        self.spawner
            .spawn_local(deliver(self.local.clone()).boxed_local());
    }

    fn close(&self) {
        if !self.local.closed.get() {
            self.local.shut();
        }
    }
}

/// Factory for an entangled [`MessagePort`] pair.
pub struct MessageChannel;

impl MessageChannel {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(spawner: &Spawner) -> (MessagePort, MessagePort) {
        let a = Rc::new(Endpoint::new());
        let b = Rc::new(Endpoint::new());
        (
            MessagePort {
                local: a.clone(),
                peer: b.clone(),
                spawner: spawner.clone(),
            },
            MessagePort {
                local: b,
                peer: a,
                spawner: spawner.clone(),
            },
        )
    }
}
