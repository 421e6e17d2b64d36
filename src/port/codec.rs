//! Length-prefix frame codec and the serde wire form of [`Value`].
//!
//! Wire format:
//! ```text
//! ┌────────────┬───────────────────────────────┐
//! │ Length (4B)│ postcard(WireValue) (N bytes) │
//! │ LE u32     │                               │
//! └────────────┴───────────────────────────────┘
//! ```
//!
//! The decoder accumulates incoming bytes and yields complete frames. This
//! handles partial reads gracefully: a single `Transport::read` may return
//! part of the header, part of the payload, or several frames at once.
//!
//! Payloads come from the peer, so [`decode_value`] checks their nesting
//! depth with a flat scan before postcard gets to recurse into them.

use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{CloneError, ProtocolError};
use crate::value::{Buffer, MAX_CLONE_DEPTH, Value};

/// Frame header size (4-byte little-endian length).
pub const HEADER_SIZE: usize = 4;

/// Decoder state machine.
enum DecoderState {
    /// Waiting for header bytes.
    ReadingHeader { collected: usize },
    /// Header received, reading payload.
    ReadingPayload { expected: usize },
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    header_buf: [u8; HEADER_SIZE],
    payload_buf: Vec<u8>,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            state: DecoderState::ReadingHeader { collected: 0 },
            header_buf: [0; HEADER_SIZE],
            payload_buf: Vec::new(),
            max_frame_size,
        }
    }

    /// Feed bytes into the decoder and return every frame they complete.
    ///
    /// A zero or oversized length prefix resets the decoder to header
    /// scanning; the offending header is dropped.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            match &mut self.state {
                DecoderState::ReadingHeader { collected } => {
                    let to_copy = (HEADER_SIZE - *collected).min(data.len() - offset);
                    self.header_buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);
                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == HEADER_SIZE {
                        let expected = u32::from_le_bytes(self.header_buf) as usize;
                        if expected == 0 || expected > self.max_frame_size {
                            warn!("PORT: invalid frame length {expected}, resyncing");
                            self.state = DecoderState::ReadingHeader { collected: 0 };
                            continue;
                        }
                        self.payload_buf.clear();
                        self.state = DecoderState::ReadingPayload { expected };
                    }
                }

                DecoderState::ReadingPayload { expected } => {
                    let needed = *expected - self.payload_buf.len();
                    let to_copy = needed.min(data.len() - offset);
                    self.payload_buf
                        .extend_from_slice(&data[offset..offset + to_copy]);
                    offset += to_copy;

                    if self.payload_buf.len() == *expected {
                        frames.push(core::mem::take(&mut self.payload_buf));
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                    }
                }
            }
        }

        frames
    }

    /// Reset decoder state (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
        self.payload_buf.clear();
    }
}

/// Encode a payload into a length-prefixed frame.
///
/// Returns `None` if the payload is empty or exceeds `max_frame_size`.
pub fn encode_frame(payload: &[u8], max_frame_size: usize) -> Option<Vec<u8>> {
    if payload.is_empty() || payload.len() > max_frame_size {
        return None;
    }
    let len = u32::try_from(payload.len()).ok()?;
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Some(out)
}

// ───────────────────────────────────────────────────────────────
// Wire value
// ───────────────────────────────────────────────────────────────

/// Serializable mirror of [`Value`]. Buffers are copied; ports have no
/// byte representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Buffer(Vec<u8>),
    Array(Vec<WireValue>),
    Object(BTreeMap<String, WireValue>),
}

impl TryFrom<&Value> for WireValue {
    type Error = CloneError;

    fn try_from(value: &Value) -> Result<Self, CloneError> {
        to_wire(value, 0)
    }
}

fn to_wire(value: &Value, depth: usize) -> Result<WireValue, CloneError> {
    if depth > MAX_CLONE_DEPTH {
        return Err(CloneError::TooDeep);
    }
    Ok(match value {
        Value::Undefined => WireValue::Undefined,
        Value::Null => WireValue::Null,
        Value::Bool(b) => WireValue::Bool(*b),
        Value::Int(i) => WireValue::Int(*i),
        Value::Float(f) => WireValue::Float(*f),
        Value::String(s) => WireValue::String(s.clone()),
        Value::Buffer(b) => WireValue::Buffer(b.to_vec().ok_or(CloneError::DetachedBuffer)?),
        Value::Array(items) => WireValue::Array(
            items
                .iter()
                .map(|item| to_wire(item, depth + 1))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => WireValue::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), to_wire(v, depth + 1)?)))
                .collect::<Result<_, CloneError>>()?,
        ),
        Value::Port(_) => return Err(CloneError::Unrepresentable("port")),
        Value::Function(_) | Value::Remote(_) => {
            return Err(CloneError::Unrepresentable("function"));
        }
        Value::Marked(inner, _) => to_wire(inner, depth)?,
    })
}

impl From<WireValue> for Value {
    fn from(wire: WireValue) -> Self {
        match wire {
            WireValue::Undefined => Self::Undefined,
            WireValue::Null => Self::Null,
            WireValue::Bool(b) => Self::Bool(b),
            WireValue::Int(i) => Self::Int(i),
            WireValue::Float(f) => Self::Float(f),
            WireValue::String(s) => Self::String(s),
            WireValue::Buffer(bytes) => Self::Buffer(Buffer::from_vec(bytes)),
            WireValue::Array(items) => Self::Array(items.into_iter().map(Into::into).collect()),
            WireValue::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Serialize a value into one complete frame.
pub fn encode_value(value: &Value, max_frame_size: usize) -> Result<Vec<u8>, CloneError> {
    let wire = WireValue::try_from(value)?;
    let payload =
        postcard::to_allocvec(&wire).map_err(|_| CloneError::Unrepresentable("value"))?;
    encode_frame(&payload, max_frame_size).ok_or(CloneError::TooLarge)
}

/// Deserialize one frame payload (without the length header).
///
/// Payloads nesting arrays or objects deeper than `max_depth` are rejected
/// before deserialization.
pub fn decode_value(payload: &[u8], max_depth: usize) -> Result<Value, ProtocolError> {
    check_depth(payload, max_depth)?;
    postcard::from_bytes::<WireValue>(payload)
        .map(Value::from)
        .map_err(|_| ProtocolError::Undecodable)
}

// ───────────────────────────────────────────────────────────────
// Depth scan
// ───────────────────────────────────────────────────────────────

// postcard variant indices, in `WireValue` declaration order.
const TAG_UNDEFINED: u64 = 0;
const TAG_NULL: u64 = 1;
const TAG_BOOL: u64 = 2;
const TAG_INT: u64 = 3;
const TAG_FLOAT: u64 = 4;
const TAG_STRING: u64 = 5;
const TAG_BUFFER: u64 = 6;
const TAG_ARRAY: u64 = 7;
const TAG_OBJECT: u64 = 8;

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn byte(&mut self) -> Result<u8, ProtocolError> {
        let b = *self.bytes.get(self.pos).ok_or(ProtocolError::Undecodable)?;
        self.pos += 1;
        Ok(b)
    }

    /// LEB128 varint, at most ten bytes.
    fn varint(&mut self) -> Result<u64, ProtocolError> {
        let mut out = 0u64;
        for shift in (0..64).step_by(7) {
            let b = self.byte()?;
            out |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(out);
            }
        }
        Err(ProtocolError::Undecodable)
    }

    fn skip(&mut self, n: u64) -> Result<(), ProtocolError> {
        let end = usize::try_from(n)
            .ok()
            .and_then(|n| self.pos.checked_add(n))
            .filter(|&end| end <= self.bytes.len())
            .ok_or(ProtocolError::Undecodable)?;
        self.pos = end;
        Ok(())
    }

    fn skip_bytes(&mut self) -> Result<(), ProtocolError> {
        let len = self.varint()?;
        self.skip(len)
    }
}

/// Walk one encoded `WireValue` with an explicit stack and fail once
/// non-empty containers nest deeper than `max_depth`.
fn check_depth(payload: &[u8], max_depth: usize) -> Result<(), ProtocolError> {
    let mut cursor = Cursor {
        bytes: payload,
        pos: 0,
    };
    // (values left to read, entries carry a key); the first entry is the root.
    let mut open: Vec<(u64, bool)> = vec![(1, false)];

    while let Some(top) = open.last_mut() {
        if top.0 == 0 {
            open.pop();
            continue;
        }
        top.0 -= 1;
        let keyed = top.1;

        if keyed {
            cursor.skip_bytes()?;
        }
        match cursor.varint()? {
            TAG_UNDEFINED | TAG_NULL => {}
            TAG_BOOL => cursor.skip(1)?,
            TAG_INT => {
                cursor.varint()?;
            }
            TAG_FLOAT => cursor.skip(8)?,
            TAG_STRING | TAG_BUFFER => cursor.skip_bytes()?,
            tag @ (TAG_ARRAY | TAG_OBJECT) => {
                let len = cursor.varint()?;
                if len > 0 {
                    if open.len() > max_depth {
                        warn!("PORT: value nests deeper than {max_depth}, rejecting");
                        return Err(ProtocolError::Undecodable);
                    }
                    open.push((len, tag == TAG_OBJECT));
                }
            }
            _ => return Err(ProtocolError::Undecodable),
        }
    }
    Ok(())
}
