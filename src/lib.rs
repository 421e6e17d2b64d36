//! Proxify library.
//!
//! Transparent remote invocation over a duplex message port. One side
//! exposes a target; the other builds [`Proxy`] paths onto it and calls
//! them as if they were local. Functions passed as arguments or returned
//! as results travel as callables on their own sub-channels.
//!
//! ```text
//!   caller                                           target
//!   ──────                                           ──────
//!   proxify(&channel)                                expose(&channel, target)
//!     .get("math")?.get("add")?                        │
//!     .call(args) ──▶ { id, path, args } ──▶ Port ──▶  resolve + invoke
//!        ▲                                             │
//!        └──── Reply ◀── { id, result | error } ◀──────┘
//! ```

#![deny(unused_must_use)]

pub mod config;
pub mod error;
pub mod port;
pub mod rpc;
pub mod runtime;
pub mod value;

pub use config::ChannelConfig;
pub use error::{CloneError, ProtocolError, ProxifyError, Result};
pub use port::memory::{MessageChannel, MessagePort};
pub use port::{MessageEvent, Port};
pub use rpc::callable::FUNCTION_TAG;
pub use rpc::channel::{Channel, ChannelState, unproxify};
pub use rpc::marshal::{ErrorObject, Fault};
pub use rpc::proxy::{Proxy, Reply, proxify, with_proxy};
pub use rpc::target::{Function, Member, Object, TargetObject, expose};
pub use rpc::transfer::transfer;
pub use runtime::{LocalRuntime, Spawn, Spawner};
pub use value::{Buffer, Key, PortHandle, Transferable, Value};
