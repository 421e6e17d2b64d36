//! Wire messages.
//!
//! Every message is a plain [`Value::Object`]; field presence decides the
//! kind:
//!
//! | Message          | Fields                 |
//! |------------------|------------------------|
//! | Call request     | `id`, `path`, `args`   |
//! | Call response ok | `id`, `result`         |
//! | Call response err| `id`, `error`          |
//! | Control          | `close: true`          |

use core::fmt;
use std::collections::BTreeMap;

use crate::error::ProtocolError;
use crate::value::{Key, Value};

/// Call identifier, unique among a channel's outstanding calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub id: CallId,
    pub path: Vec<Key>,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallResponse {
    pub id: CallId,
    /// `Err` holds the marshalled failure record.
    pub outcome: Result<Value, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(CallRequest),
    Response(CallResponse),
    Close,
}

const ID: &str = "id";
const PATH: &str = "path";
const ARGS: &str = "args";
const RESULT: &str = "result";
const ERROR: &str = "error";
const CLOSE: &str = "close";

impl Message {
    pub fn into_value(self) -> Value {
        let mut map = BTreeMap::new();
        match self {
            Self::Request(req) => {
                map.insert(ID.into(), id_value(req.id));
                map.insert(
                    PATH.into(),
                    Value::Array(req.path.into_iter().map(key_value).collect()),
                );
                map.insert(ARGS.into(), Value::Array(req.args));
            }
            Self::Response(resp) => {
                map.insert(ID.into(), id_value(resp.id));
                match resp.outcome {
                    Ok(result) => map.insert(RESULT.into(), result),
                    Err(error) => map.insert(ERROR.into(), error),
                };
            }
            Self::Close => {
                map.insert(CLOSE.into(), Value::Bool(true));
            }
        }
        Value::Object(map)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut map) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        if map.get(CLOSE).and_then(Value::as_bool) == Some(true) {
            return Ok(Self::Close);
        }

        let id = match map.get(ID) {
            None => return Err(ProtocolError::MissingField(ID)),
            Some(v) => v
                .as_i64()
                .and_then(|i| u64::try_from(i).ok())
                .map(CallId)
                .ok_or(ProtocolError::InvalidField(ID))?,
        };

        if let Some(path) = map.remove(PATH) {
            let bad = |field| ProtocolError::BadRequest { id, field };
            let path = match path {
                Value::Array(steps) => steps
                    .iter()
                    .map(value_key)
                    .collect::<Option<Vec<_>>>()
                    .ok_or(bad(PATH))?,
                _ => return Err(bad(PATH)),
            };
            let args = match map.remove(ARGS) {
                Some(Value::Array(args)) => args,
                _ => return Err(bad(ARGS)),
            };
            return Ok(Self::Request(CallRequest { id, path, args }));
        }

        if let Some(result) = map.remove(RESULT) {
            return Ok(Self::Response(CallResponse {
                id,
                outcome: Ok(result),
            }));
        }
        if let Some(error) = map.remove(ERROR) {
            return Ok(Self::Response(CallResponse {
                id,
                outcome: Err(error),
            }));
        }
        Err(ProtocolError::MissingField(RESULT))
    }
}

#[allow(clippy::cast_possible_wrap)]
fn id_value(id: CallId) -> Value {
    Value::Int(id.0 as i64)
}

/// Indices beyond the wire's integer range travel as decimal names, which
/// targets resolve the same way.
fn key_value(key: Key) -> Value {
    match key {
        Key::Name(name) => Value::String(name),
        Key::Index(index) => match i64::try_from(index) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::String(index.to_string()),
        },
    }
}

fn value_key(value: &Value) -> Option<Key> {
    match value {
        Value::String(name) => Some(Key::Name(name.clone())),
        other => other
            .as_i64()
            .and_then(|i| usize::try_from(i).ok())
            .map(Key::Index),
    }
}
