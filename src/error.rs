//! Unified error types for the proxy runtime.
//!
//! A single [`ProxifyError`] enum that every subsystem converts into, so a
//! caller awaiting a [`Reply`](crate::rpc::proxy::Reply) handles one type.
//! Serialization failures ([`CloneError`]) and malformed wire messages
//! ([`ProtocolError`]) are small `Copy` enums of their own.

use core::fmt;

use crate::rpc::marshal::Fault;
use crate::rpc::message::CallId;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible proxy operation funnels into this type.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxifyError {
    /// A message did not have a recognised shape. Never surfaced to callers
    /// by the runtime itself; the listeners log and drop such messages.
    Protocol(ProtocolError),
    /// The target raised a failure while resolving or executing the call.
    Remote(Fault),
    /// The channel was closed before or while the call was outstanding.
    ChannelClosed,
    /// An argument or result cannot be represented by the port.
    NonCloneable(CloneError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for ProxifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Remote(fault) => write!(f, "remote: {fault}"),
            Self::ChannelClosed => write!(f, "port closed"),
            Self::NonCloneable(e) => write!(f, "non-cloneable value: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for ProxifyError {}

impl From<ProtocolError> for ProxifyError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<CloneError> for ProxifyError {
    fn from(e: CloneError) -> Self {
        Self::NonCloneable(e)
    }
}

impl From<Fault> for ProxifyError {
    fn from(fault: Fault) -> Self {
        Self::Remote(fault)
    }
}

// ---------------------------------------------------------------------------
// Structured-clone errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneError {
    /// A buffer was already transferred away.
    DetachedBuffer,
    /// A port handle was already transferred away.
    NeuteredPort,
    /// A port appears in the value but not in the transfer list.
    PortNotTransferred,
    /// The port's encoding cannot represent this kind of value.
    Unrepresentable(&'static str),
    /// The encoded message exceeds the port's frame limit.
    TooLarge,
    /// Arrays and objects are nested deeper than the clone limit.
    TooDeep,
}

impl fmt::Display for CloneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DetachedBuffer => write!(f, "buffer is detached"),
            Self::NeuteredPort => write!(f, "port was already transferred"),
            Self::PortNotTransferred => write!(f, "port must be listed in the transfer list"),
            Self::Unrepresentable(kind) => write!(f, "{kind} cannot be serialized"),
            Self::TooLarge => write!(f, "message exceeds the frame size limit"),
            Self::TooDeep => write!(f, "value is nested too deeply"),
        }
    }
}

impl std::error::Error for CloneError {}

// ---------------------------------------------------------------------------
// Wire protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Message data is not an object.
    NotAnObject,
    /// A required field is absent.
    MissingField(&'static str),
    /// A field is present but has the wrong type.
    InvalidField(&'static str),
    /// A frame could not be decoded.
    Undecodable,
    /// A call request with a usable `id` but an unusable `field`. The
    /// target answers it with an error instead of dropping it.
    BadRequest { id: CallId, field: &'static str },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "message is not an object"),
            Self::MissingField(name) => write!(f, "missing field `{name}`"),
            Self::InvalidField(name) => write!(f, "invalid field `{name}`"),
            Self::Undecodable => write!(f, "undecodable frame"),
            Self::BadRequest { id, field } => write!(f, "request {id}: invalid field `{field}`"),
        }
    }
}

impl std::error::Error for ProtocolError {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, ProxifyError>;
