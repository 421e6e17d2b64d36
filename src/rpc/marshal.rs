//! Error marshalling across the port.
//!
//! A target-side failure is either an error-like [`ErrorObject`] or an
//! arbitrary thrown [`Value`]. Error objects travel as plain records:
//!
//! ```text
//! { name: "TypeError", message: "...", stack?: "...", <clone-safe props> }
//! ```
//!
//! Each extra property is checked with an isolated [`structured_clone`] and
//! dropped on failure, so one bad property never poisons the whole error.

use core::fmt;
use std::collections::BTreeMap;

use log::debug;

use crate::error::ProxifyError;
use crate::value::{Value, structured_clone};

const NAME: &str = "name";
const MESSAGE: &str = "message";
const STACK: &str = "stack";

/// Error-like failure with a name, a message and arbitrary extra fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorObject {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    pub properties: BTreeMap<String, Value>,
}

impl ErrorObject {
    /// A generic `Error`.
    pub fn new(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::named("TypeError", message)
    }

    pub fn data_clone(message: impl Into<String>) -> Self {
        Self::named("DataCloneError", message)
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Wrap any Rust error; its source chain becomes the stack.
    pub fn from_error(error: &dyn std::error::Error) -> Self {
        let mut object = Self::new(error.to_string());
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        if !chain.is_empty() {
            object.stack = Some(chain.join("\n"));
        }
        object
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

impl std::error::Error for ErrorObject {}

/// A failure raised on the target side.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    Error(ErrorObject),
    /// A non-error value was thrown.
    Value(Value),
}

impl Fault {
    /// The error message, if this is an error-like fault.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Error(e) => Some(&e.message),
            Self::Value(_) => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorObject> {
        match self {
            Self::Error(e) => Some(e),
            Self::Value(_) => None,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => write!(f, "{e}"),
            Self::Value(v) => write!(f, "thrown {}: {v}", v.kind()),
        }
    }
}

impl From<ErrorObject> for Fault {
    fn from(e: ErrorObject) -> Self {
        Self::Error(e)
    }
}

/// A failed call made on behalf of the peer: remote faults pass through,
/// local failures become plain errors.
impl From<ProxifyError> for Fault {
    fn from(e: ProxifyError) -> Self {
        match e {
            ProxifyError::Remote(fault) => fault,
            other => ErrorObject::from_error(&other).into(),
        }
    }
}

impl From<Value> for Fault {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

/// Convert a fault into a value the port can carry.
pub fn to_cloneable(fault: Fault) -> Value {
    let error = match fault {
        Fault::Error(error) => error,
        Fault::Value(value) => return value,
    };

    let mut record = BTreeMap::new();
    for (key, value) in error.properties {
        if matches!(key.as_str(), NAME | MESSAGE | STACK) {
            continue;
        }
        match structured_clone(&value, &[]) {
            Ok(_) => {
                record.insert(key, value);
            }
            Err(e) => debug!("RPC: dropping error property `{key}`: {e}"),
        }
    }
    record.insert(NAME.into(), Value::String(error.name));
    record.insert(MESSAGE.into(), Value::String(error.message));
    if let Some(stack) = error.stack {
        record.insert(STACK.into(), Value::String(stack));
    }
    Value::Object(record)
}

/// Rebuild a fault from its marshalled form.
///
/// Records carrying `message` become an [`ErrorObject`]; `name` and `stack`
/// are only taken when they are strings and are otherwise skipped. Anything
/// else is returned as a thrown value.
pub fn from_cloneable(value: Value) -> Fault {
    let mut record = match value {
        Value::Object(record) if record.contains_key(MESSAGE) => record,
        other => return Fault::Value(other),
    };

    let message = match record.remove(MESSAGE) {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let mut error = ErrorObject::new(message);
    match record.remove(NAME) {
        Some(Value::String(name)) => error.name = name,
        Some(other) => debug!("RPC: ignoring non-string error name ({})", other.kind()),
        None => {}
    }
    match record.remove(STACK) {
        Some(Value::String(stack)) => error.stack = Some(stack),
        Some(other) => debug!("RPC: ignoring non-string error stack ({})", other.kind()),
        None => {}
    }
    error.properties = record;
    Fault::Error(error)
}
