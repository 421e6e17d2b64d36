//! Caller-side proxies.
//!
//! A [`Proxy`] is an immutable path node. [`Proxy::get`] extends the path
//! without touching the channel; [`Proxy::call`] is the only operation that
//! sends anything.
//!
//! ```text
//!   root ([])  ◀── parent ── add (["add"])
//!     ▲
//!     └──────── parent ── items (["items"]) ◀── parent ── 0 (["items", 0])
//! ```
//!
//! Children keep their parent alive, so the root lives as long as any node
//! or outstanding [`Reply`] does. When the last one is dropped the root's
//! guard closes the channel (if `close_on_drop` is set). Code that needs a
//! deterministic close should use [`with_proxy`] or close explicitly.

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::rc::Rc;

use futures_lite::FutureExt;
use futures_lite::future::BoxedLocal;
use log::debug;

use super::channel::Channel;
use super::message::{CallRequest, Message};
use super::transfer::resolve_all;
use crate::error::{ProxifyError, Result};
use crate::value::{Key, Value};

struct Node {
    channel: Channel,
    path: Vec<Key>,
    /// Keeps the root reachable; never read.
    _parent: Option<Proxy>,
    _guard: Option<RootGuard>,
}

/// Closes the channel when the root node goes away.
struct RootGuard {
    channel: Channel,
}

impl Drop for RootGuard {
    fn drop(&mut self) {
        if self.channel.config().close_on_drop && self.channel.is_open() {
            debug!("RPC: last proxy dropped, closing channel");
            self.channel.close();
        }
    }
}

/// Path-accumulating handle onto a remote target.
#[derive(Clone)]
pub struct Proxy(Rc<Node>);

/// Create the root proxy for `channel` and start listening for responses.
pub fn proxify(channel: &Channel) -> Proxy {
    channel.listen();
    Proxy(Rc::new(Node {
        channel: channel.clone(),
        path: Vec::new(),
        _parent: None,
        _guard: Some(RootGuard {
            channel: channel.clone(),
        }),
    }))
}

impl Proxy {
    /// Child node for `key`, or `None` for the thenable name.
    pub fn get(&self, key: impl Into<Key>) -> Option<Proxy> {
        let key = key.into();
        if key.is_thenable() {
            return None;
        }
        Some(self.child(key))
    }

    /// Child node for `key`, even when it is the thenable name.
    pub fn get_literal(&self, key: impl Into<Key>) -> Proxy {
        self.child(key.into())
    }

    fn child(&self, key: Key) -> Proxy {
        let mut path = self.0.path.clone();
        path.push(key);
        Proxy(Rc::new(Node {
            channel: self.0.channel.clone(),
            path,
            _parent: Some(self.clone()),
            _guard: None,
        }))
    }

    pub fn path(&self) -> &[Key] {
        &self.0.path
    }

    pub fn channel(&self) -> &Channel {
        &self.0.channel
    }

    /// Close the underlying channel.
    pub fn close(&self) {
        self.0.channel.close();
    }

    /// Invoke the remote member at this node's path.
    ///
    /// Fails fast with [`ProxifyError::ChannelClosed`] when the channel is
    /// no longer open, and with [`ProxifyError::NonCloneable`] when the
    /// arguments cannot be posted. In both cases nothing stays pending.
    pub fn call(&self, args: Vec<Value>) -> Reply {
        let channel = &self.0.channel;
        if !channel.is_open() {
            return Reply::ready(self.clone(), Err(ProxifyError::ChannelClosed));
        }

        let (id, slot) = channel.pending().borrow_mut().register();
        let (args, transfer) = resolve_all(args);
        let request = Message::Request(CallRequest {
            id,
            path: self.0.path.clone(),
            args,
        });
        if let Err(e) = channel.post(request, transfer) {
            channel.pending().borrow_mut().remove(id);
            debug!("RPC[{id}]: arguments not cloneable: {e}");
            return Reply::ready(self.clone(), Err(ProxifyError::NonCloneable(e)));
        }
        debug!("RPC[{id}]: sent");

        let wait = async move { slot.wait().await }.boxed_local();
        Reply {
            _node: self.clone(),
            state: ReplyState::Waiting(wait),
        }
    }
}

impl AsRef<Channel> for Proxy {
    fn as_ref(&self) -> &Channel {
        &self.0.channel
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("path", &self.0.path)
            .field("channel", &self.0.channel.state())
            .finish()
    }
}

enum ReplyState {
    Ready(Option<Result<Value>>),
    Waiting(BoxedLocal<Result<Value>>),
}

/// Outcome of a [`Proxy::call`].
#[must_use = "a reply does nothing unless awaited"]
pub struct Reply {
    _node: Proxy,
    state: ReplyState,
}

impl Reply {
    fn ready(node: Proxy, outcome: Result<Value>) -> Self {
        Self {
            _node: node,
            state: ReplyState::Ready(Some(outcome)),
        }
    }
}

impl Future for Reply {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            ReplyState::Ready(outcome) => {
                Poll::Ready(outcome.take().unwrap_or(Err(ProxifyError::ChannelClosed)))
            }
            ReplyState::Waiting(wait) => wait.as_mut().poll(cx),
        }
    }
}

struct CloseOnExit(Channel);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Run `f` with a proxy for `channel`, closing the channel afterwards on
/// every exit path.
///
/// The close is unconditional: it happens even while another root made
/// by [`proxify`] on the same channel is still alive, and that root's
/// later calls fail with [`ProxifyError::ChannelClosed`]. The scoped
/// proxy must be the channel's only root.
pub async fn with_proxy<F, Fut, T>(channel: &Channel, f: F) -> T
where
    F: FnOnce(Proxy) -> Fut,
    Fut: Future<Output = T>,
{
    let _scope = CloseOnExit(channel.clone());
    f(proxify(channel)).await
}
