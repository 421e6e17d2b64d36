//! Values carried across a port.
//!
//! [`Value`] is the dynamically-typed payload of every message. Two of its
//! variants have reference identity and can be *moved* instead of copied:
//!
//! - [`Buffer`]: a shared byte buffer. Transferring it moves the bytes into a
//!   fresh buffer on the receiving side and leaves the sender's handle
//!   detached (length 0).
//! - [`PortHandle`]: a slot holding a channel endpoint. Transferring it moves
//!   the endpoint and neuters the sender's handle. A port that is not in the
//!   transfer list cannot be sent at all.
//!
//! [`structured_clone`] implements that copy-or-move pass. In-memory ports
//! run it on every post; the error marshaller uses it as a clone-safety check.

use core::fmt;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::CloneError;
use crate::port::Port;
use crate::rpc::proxy::Proxy;
use crate::rpc::target::Function;

/// Deepest array/object nesting a structured clone will walk.
pub const MAX_CLONE_DEPTH: usize = 256;

// ───────────────────────────────────────────────────────────────
// Buffer
// ───────────────────────────────────────────────────────────────

/// Shared, transferable byte buffer. `None` contents mean detached.
#[derive(Clone)]
pub struct Buffer(Rc<RefCell<Option<Vec<u8>>>>);

impl Buffer {
    /// A zero-filled buffer of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self::from_vec(vec![0; len])
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(Rc::new(RefCell::new(Some(bytes))))
    }

    fn detached() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }

    /// Length in bytes; 0 once detached.
    pub fn byte_length(&self) -> usize {
        self.0.borrow().as_ref().map_or(0, Vec::len)
    }

    pub fn is_detached(&self) -> bool {
        self.0.borrow().is_none()
    }

    /// Copy of the contents, or `None` if detached.
    pub fn to_vec(&self) -> Option<Vec<u8>> {
        self.0.borrow().clone()
    }

    /// Mutate the contents in place. No-op on a detached buffer.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        self.0.borrow_mut().as_mut().map(|bytes| f(bytes))
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn take(&self) -> Option<Vec<u8>> {
        self.0.borrow_mut().take()
    }

    fn fill(&self, bytes: Vec<u8>) {
        *self.0.borrow_mut() = Some(bytes);
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0.borrow() {
            Some(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
            None => write!(f, "Buffer(detached)"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// PortHandle
// ───────────────────────────────────────────────────────────────

/// Transferable slot holding a channel endpoint.
#[derive(Clone)]
pub struct PortHandle(Rc<RefCell<Option<Rc<dyn Port>>>>);

impl PortHandle {
    pub fn new(port: Rc<dyn Port>) -> Self {
        Self(Rc::new(RefCell::new(Some(port))))
    }

    fn empty() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }

    /// The endpoint, or `None` if it was transferred away.
    pub fn port(&self) -> Option<Rc<dyn Port>> {
        self.0.borrow().clone()
    }

    pub fn is_neutered(&self) -> bool {
        self.0.borrow().is_none()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn take(&self) -> Option<Rc<dyn Port>> {
        self.0.borrow_mut().take()
    }

    fn fill(&self, port: Rc<dyn Port>) {
        *self.0.borrow_mut() = Some(port);
    }
}

impl fmt::Debug for PortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_neutered() {
            write!(f, "PortHandle(neutered)")
        } else {
            write!(f, "PortHandle")
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Transferable
// ───────────────────────────────────────────────────────────────

/// A sub-value that moves rather than copies when sent.
#[derive(Debug, Clone)]
pub enum Transferable {
    Buffer(Buffer),
    Port(PortHandle),
}

impl Transferable {
    /// Identity comparison.
    pub fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Buffer(a), Self::Buffer(b)) => a.ptr_eq(b),
            (Self::Port(a), Self::Port(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<Buffer> for Transferable {
    fn from(buffer: Buffer) -> Self {
        Self::Buffer(buffer)
    }
}

impl From<&Buffer> for Transferable {
    fn from(buffer: &Buffer) -> Self {
        Self::Buffer(buffer.clone())
    }
}

impl From<PortHandle> for Transferable {
    fn from(port: PortHandle) -> Self {
        Self::Port(port)
    }
}

impl From<&PortHandle> for Transferable {
    fn from(port: &PortHandle) -> Self {
        Self::Port(port.clone())
    }
}

// ───────────────────────────────────────────────────────────────
// Key
// ───────────────────────────────────────────────────────────────

/// One member-access step of a call path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(String),
    Index(usize),
}

/// Member name that awaiting code looks for.
pub const THENABLE: &str = "then";

impl Key {
    pub fn is_thenable(&self) -> bool {
        matches!(self, Self::Name(name) if name == THENABLE)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

// ───────────────────────────────────────────────────────────────
// Value
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Buffer(Buffer),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Port(PortHandle),
    /// A local callable. Channels export it as a port bound to the
    /// function; it is never cloned directly.
    Function(Function),
    /// A callable received from the peer.
    Remote(Proxy),
    /// A value carrying an explicit transfer association; see
    /// [`transfer`](crate::rpc::transfer::transfer).
    Marked(Box<Value>, Vec<Transferable>),
}

impl Value {
    /// Build an object from `(key, value)` pairs.
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Member lookup on plain data: object fields by name, array elements
    /// by index. Marks are looked through.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        match (self.unmarked(), key) {
            (Self::Object(map), Key::Name(name)) => map.get(name),
            (Self::Object(map), Key::Index(index)) => map.get(&index.to_string()),
            (Self::Array(items), Key::Index(index)) => items.get(*index),
            _ => None,
        }
    }

    /// The value without any transfer mark.
    pub fn unmarked(&self) -> &Value {
        match self {
            Self::Marked(inner, _) => inner.unmarked(),
            other => other,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.unmarked() {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.unmarked() {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.unmarked() {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.unmarked() {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&Buffer> {
        match self.unmarked() {
            Self::Buffer(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self.unmarked() {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self.unmarked() {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_port(&self) -> Option<&PortHandle> {
        match self.unmarked() {
            Self::Port(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_remote(&self) -> Option<&Proxy> {
        match self.unmarked() {
            Self::Remote(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self.unmarked(), Self::Undefined)
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Buffer(_) => "buffer",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Port(_) => "port",
            Self::Function(_) => "function",
            Self::Remote(_) => "remote function",
            Self::Marked(inner, _) => inner.kind(),
        }
    }
}

/// Buffers compare by contents, ports and functions by identity, marks
/// are ignored.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self.unmarked(), other.unmarked()) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Buffer(a), Self::Buffer(b)) => a.ptr_eq(b) || a.to_vec() == b.to_vec(),
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Port(a), Self::Port(b)) => a.ptr_eq(b),
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Remote(a), Self::Remote(b)) => {
                a.channel().ptr_eq(b.channel()) && a.path() == b.path()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unmarked() {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Buffer(b) => write!(f, "[buffer {}]", b.byte_length()),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Object(_) => write!(f, "[object]"),
            Self::Port(_) => write!(f, "[port]"),
            Self::Function(_) | Self::Remote(_) => write!(f, "[function]"),
            Self::Marked(..) => unreachable!("unmarked() strips marks"),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v $(as $cast)?)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => Int as i64,
    i64 => Int,
    u32 => Int as i64,
    f64 => Float,
    String => String,
    Buffer => Buffer,
    PortHandle => Port,
}

/// Indices past `i64::MAX` become floats, as any wire number would.
impl From<usize> for Value {
    fn from(n: usize) -> Self {
        i64::try_from(n).map_or(Self::Float(n as f64), Self::Int)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Self::Function(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::Undefined
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ───────────────────────────────────────────────────────────────
// Structured clone
// ───────────────────────────────────────────────────────────────

/// Result of a structured clone: the receiver's copy plus the ports that
/// were moved along with it.
#[derive(Debug)]
pub struct Cloned {
    pub value: Value,
    pub ports: Vec<PortHandle>,
}

/// Deep-copy `value`, moving every entry of `transfer` instead of copying it.
///
/// The pass is all-or-nothing: sources are only detached once the whole
/// value has been cloned successfully. Marks are looked through.
pub fn structured_clone(value: &Value, transfer: &[Transferable]) -> Result<Cloned, CloneError> {
    // Receiving-side placeholders, one per transfer entry.
    let mut targets = Vec::with_capacity(transfer.len());
    for item in transfer {
        let target = match item {
            Transferable::Buffer(b) if b.is_detached() => return Err(CloneError::DetachedBuffer),
            Transferable::Port(p) if p.is_neutered() => return Err(CloneError::NeuteredPort),
            Transferable::Buffer(_) => Transferable::Buffer(Buffer::detached()),
            Transferable::Port(_) => Transferable::Port(PortHandle::empty()),
        };
        targets.push(target);
    }

    let value = clone_value(value, transfer, &targets, 0)?;

    let mut ports = Vec::new();
    for (source, target) in transfer.iter().zip(&targets) {
        match (source, target) {
            (Transferable::Buffer(src), Transferable::Buffer(dst)) => {
                if let Some(bytes) = src.take() {
                    dst.fill(bytes);
                }
            }
            (Transferable::Port(src), Transferable::Port(dst)) => {
                if let Some(port) = src.take() {
                    dst.fill(port);
                }
                ports.push(dst.clone());
            }
            _ => {}
        }
    }
    Ok(Cloned { value, ports })
}

fn clone_value(
    value: &Value,
    transfer: &[Transferable],
    targets: &[Transferable],
    depth: usize,
) -> Result<Value, CloneError> {
    if depth > MAX_CLONE_DEPTH {
        return Err(CloneError::TooDeep);
    }
    let moved = |wanted: &Transferable| {
        transfer
            .iter()
            .position(|t| t.same(wanted))
            .map(|i| targets[i].clone())
    };

    Ok(match value {
        Value::Buffer(buffer) => match moved(&Transferable::Buffer(buffer.clone())) {
            Some(Transferable::Buffer(dst)) => Value::Buffer(dst),
            _ => Value::Buffer(Buffer::from_vec(
                buffer.to_vec().ok_or(CloneError::DetachedBuffer)?,
            )),
        },
        Value::Port(port) => match moved(&Transferable::Port(port.clone())) {
            Some(Transferable::Port(dst)) => Value::Port(dst),
            _ if port.is_neutered() => return Err(CloneError::NeuteredPort),
            _ => return Err(CloneError::PortNotTransferred),
        },
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| clone_value(item, transfer, targets, depth + 1))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), clone_value(v, transfer, targets, depth + 1)?)))
                .collect::<Result<_, CloneError>>()?,
        ),
        Value::Marked(inner, _) => clone_value(inner, transfer, targets, depth)?,
        Value::Function(_) | Value::Remote(_) => {
            return Err(CloneError::Unrepresentable("function"));
        }
        Value::Undefined => Value::Undefined,
        Value::Null => Value::Null,
        Value::Bool(b) => Value::Bool(*b),
        Value::Int(i) => Value::Int(*i),
        Value::Float(f) => Value::Float(*f),
        Value::String(s) => Value::String(s.clone()),
    })
}
