//! Transport-agnostic RPC subsystem.
//!
//! Transparent remote invocation over any [`Port`](crate::port::Port).
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                           RPC Stack                            │
//! │                                                                │
//! │  ┌──────────┐   ┌──────────┐   ┌─────────┐   ┌──────────────┐  │
//! │  │  Proxy   │──▶│ Transfer │──▶│ Message │──▶│ Port (trait) │  │
//! │  │ (caller) │   │ resolver │   │ (wire)  │   └──────┬───────┘  │
//! │  └────▲─────┘   └──────────┘   └─────────┘          │          │
//! │       │ settle                                      ▼          │
//! │  ┌────┴─────┐   ┌──────────┐                 ┌──────────────┐  │
//! │  │ Pending  │◀──│ Channel  │◀────────────────│ Target       │  │
//! │  │ calls    │   │ (state)  │  response/close │ (binder)     │  │
//! │  └──────────┘   └──────────┘                 └──────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```

pub mod callable;
pub mod channel;
pub mod marshal;
pub mod message;
pub mod pending;
pub mod proxy;
pub mod target;
pub mod transfer;
