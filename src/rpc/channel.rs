//! Channel lifecycle and cancellation.
//!
//! A [`Channel`] is one half of a duplex connection. It owns the port, the
//! call correlation table and the lifecycle state; proxies and target
//! bindings reach all of it through the channel handle.
//!
//! ```text
//!   Open ──close()──────────▶ Closing ──post {close:true}──┐
//!     │                                                    ▼
//!     └──{close:true} from peer──▶ Closing ──────────▶ port.close()
//!                                                     reject pending
//!                                                     unsubscribe
//!                                                          │
//!                                                          ▼
//!                                                       Closed
//! ```
//!
//! Closing is idempotent: only the first close from `Open` does any work,
//! and only a local close notifies the peer.

use core::cell::Cell;
use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info, warn};

use super::callable::{export_message, import_message};
use super::marshal::{ErrorObject, from_cloneable, to_cloneable};
use super::message::{CallId, CallRequest, CallResponse, Message};
use super::pending::PendingCalls;
use crate::config::ChannelConfig;
use crate::error::{CloneError, ProtocolError, ProxifyError, Result};
use crate::port::{ListenerId, MessageEvent, Port};
use crate::runtime::Spawner;
use crate::value::{Transferable, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Handler for inbound call requests, installed by the target binder.
pub(crate) type RequestHandler = Rc<dyn Fn(&Channel, CallRequest)>;

struct Inner {
    port: Rc<dyn Port>,
    spawner: Spawner,
    config: ChannelConfig,
    state: Cell<ChannelState>,
    pending: RefCell<PendingCalls>,
    listener: Cell<Option<ListenerId>>,
    on_request: RefCell<Option<RequestHandler>>,
    /// Sub-channels carrying function arguments and results.
    children: RefCell<Vec<Channel>>,
}

/// Shared handle to one side of a proxied connection.
#[derive(Clone)]
pub struct Channel(Rc<Inner>);

impl Channel {
    /// Wrap `port` with the default configuration.
    pub fn new(port: Rc<dyn Port>, spawner: Spawner) -> Self {
        Self::build(port, spawner, ChannelConfig::default())
    }

    pub fn with_config(port: Rc<dyn Port>, spawner: Spawner, config: ChannelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(port, spawner, config))
    }

    fn build(port: Rc<dyn Port>, spawner: Spawner, config: ChannelConfig) -> Self {
        Self(Rc::new(Inner {
            port,
            spawner,
            config,
            state: Cell::new(ChannelState::Open),
            pending: RefCell::new(PendingCalls::new()),
            listener: Cell::new(None),
            on_request: RefCell::new(None),
            children: RefCell::new(Vec::new()),
        }))
    }

    /// A new channel over `port` sharing this one's executor and
    /// configuration.
    pub(crate) fn sibling(&self, port: Rc<dyn Port>) -> Self {
        Self::build(port, self.0.spawner.clone(), self.0.config.clone())
    }

    fn adopt(&self, children: Vec<Channel>) {
        if children.is_empty() {
            return;
        }
        let mut owned = self.0.children.borrow_mut();
        owned.retain(Channel::is_open);
        owned.extend(children);
    }

    pub fn state(&self) -> ChannelState {
        self.0.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ChannelState::Closed
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.0.config
    }

    pub fn port(&self) -> &Rc<dyn Port> {
        &self.0.port
    }

    pub fn spawner(&self) -> &Spawner {
        &self.0.spawner
    }

    /// Number of calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.0.pending.borrow().len()
    }

    pub(crate) fn pending(&self) -> &RefCell<PendingCalls> {
        &self.0.pending
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Close locally and notify the peer. No-op unless open.
    pub fn close(&self) {
        if !self.begin_close() {
            return;
        }
        if let Err(e) = self.post(Message::Close, Vec::new()) {
            warn!("RPC: close notification failed: {e}");
        }
        self.finish_close("local");
    }

    /// Close in response to the peer's notification, without echoing it.
    pub fn close_from_peer(&self) {
        if !self.begin_close() {
            return;
        }
        self.finish_close("peer");
    }

    fn begin_close(&self) -> bool {
        if self.state() != ChannelState::Open {
            return false;
        }
        self.0.state.set(ChannelState::Closing);
        true
    }

    fn finish_close(&self, origin: &str) {
        self.0.port.close();
        let rejected = self
            .0
            .pending
            .borrow_mut()
            .reject_all(&ProxifyError::ChannelClosed);
        if let Some(id) = self.0.listener.take() {
            self.0.port.unsubscribe(id);
        }
        self.0.on_request.borrow_mut().take();
        let children = self.0.children.take();
        for child in &children {
            child.close();
        }
        self.0.state.set(ChannelState::Closed);
        info!("RPC: channel closed ({origin}), {rejected} pending call(s) rejected");
    }

    /// Post a wire message. Closed channels drop it silently.
    ///
    /// Functions inside arguments or results are exported first; if the
    /// post fails their sub-channels are closed again.
    pub(crate) fn post(
        &self,
        message: Message,
        mut transfer: Vec<Transferable>,
    ) -> core::result::Result<(), CloneError> {
        if self.is_closed() {
            return Ok(());
        }
        let (message, exported) = export_message(message, self, &mut transfer);
        match self.0.port.post_message(message.into_value(), transfer) {
            Ok(()) => {
                self.adopt(exported);
                Ok(())
            }
            Err(e) => {
                for sub in &exported {
                    sub.close();
                }
                Err(e)
            }
        }
    }

    /// Install the message dispatcher (once) and start the port if
    /// configured to.
    pub(crate) fn listen(&self) {
        if !self.is_open() {
            return;
        }
        if self.0.listener.get().is_none() {
            // The listener owns a handle; the cycle is cut on close.
            let channel = self.clone();
            let id = self
                .0
                .port
                .subscribe(Rc::new(move |event: &MessageEvent| channel.dispatch(event)));
            self.0.listener.set(Some(id));
        }
        if self.0.config.auto_start {
            self.0.port.start();
        }
    }

    pub(crate) fn set_request_handler(&self, handler: RequestHandler) {
        if self.0.on_request.replace(Some(handler)).is_some() {
            warn!("RPC: replacing existing target binding");
        }
    }

    fn dispatch(&self, event: &MessageEvent) {
        if self.is_closed() {
            return;
        }
        let message = match Message::from_value(event.data.clone()) {
            Ok(message) => message,
            Err(ProtocolError::BadRequest { id, field }) => {
                self.refuse(id, field);
                return;
            }
            Err(e) => {
                warn!("RPC: ignoring malformed message: {e}");
                return;
            }
        };
        let message = if event.ports.is_empty() {
            message
        } else {
            let (message, imported) = import_message(message, self);
            self.adopt(imported);
            message
        };
        match message {
            Message::Close => self.close_from_peer(),
            Message::Response(response) => self.settle(response),
            Message::Request(request) => {
                let handler = self.0.on_request.borrow().clone();
                match handler {
                    Some(handler) => handler(self, request),
                    None => debug!("RPC: no target bound, dropping call {}", request.id),
                }
            }
        }
    }

    /// Answer a request whose id is usable but whose `field` is not, so the
    /// caller is not left waiting. Without a bound target it is dropped
    /// like any other request.
    fn refuse(&self, id: CallId, field: &'static str) {
        if self.0.on_request.borrow().is_none() {
            debug!("RPC: no target bound, dropping malformed call {id}");
            return;
        }
        warn!("RPC[{id}]: rejecting request with invalid `{field}`");
        let error = ErrorObject::type_error(format!("invalid call request: bad `{field}`"));
        if let Err(e) = self.post(response(id, Err(to_cloneable(error.into()))), Vec::new()) {
            warn!("RPC[{id}]: error reply failed: {e}");
        }
    }

    fn settle(&self, response: CallResponse) {
        let outcome = response
            .outcome
            .map_err(|record| ProxifyError::Remote(from_cloneable(record)));
        if !self.0.pending.borrow_mut().settle(response.id, outcome) {
            debug!("RPC: response for unknown call {}, dropped", response.id);
        }
    }
}

impl AsRef<Channel> for Channel {
    fn as_ref(&self) -> &Channel {
        self
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("state", &self.state())
            .field("pending", &self.pending_calls())
            .finish_non_exhaustive()
    }
}

/// Close the channel behind a proxy or a channel handle.
pub fn unproxify(handle: &impl AsRef<Channel>) {
    handle.as_ref().close();
}

pub(crate) fn response(id: CallId, outcome: core::result::Result<Value, Value>) -> Message {
    Message::Response(CallResponse { id, outcome })
}
