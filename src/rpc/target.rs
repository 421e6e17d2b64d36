//! Target binding.
//!
//! A target is a graph of [`Member`]s: callable [`Function`]s, objects that
//! resolve further keys, and plain [`Value`]s. Values holding a function,
//! local or received from the peer, are callable too. [`expose`] binds a target to
//! a channel; each inbound call request then runs as its own task:
//!
//! ```text
//!  request ──▶ resolve path ──▶ (owner, member) ──▶ invoke ──▶ await
//!                   │                                 │
//!                   └──────── fault ◀─────────────────┘
//!                               │
//!                               ▼
//!          { id, error } ◀── marshal        { id, result } + transfer list
//! ```
//!
//! Target failures never escape a task; every request gets exactly one
//! response while the channel stays open.

use core::fmt;
use core::future::Future;
use std::collections::BTreeMap;
use std::rc::Rc;

use futures_lite::FutureExt;
use futures_lite::future::BoxedLocal;
use log::{debug, warn};

use super::channel::{Channel, response};
use super::marshal::{ErrorObject, Fault, to_cloneable};
use super::message::CallRequest;
use super::transfer::resolve_one;
use crate::value::{Key, Value};

/// Outcome of invoking a target function.
pub type Outcome = Result<Value, Fault>;

type Callable = dyn Fn(Option<Member>, Vec<Value>) -> BoxedLocal<Outcome>;

/// A callable target member.
#[derive(Clone)]
pub struct Function(Rc<Callable>);

impl Function {
    /// Synchronous function of its arguments.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Outcome + 'static,
    {
        Self(Rc::new(move |_, args| {
            let outcome = f(args);
            async move { outcome }.boxed_local()
        }))
    }

    /// Synchronous function that also sees the object it was looked up on.
    pub fn method<F>(f: F) -> Self
    where
        F: Fn(Option<Member>, Vec<Value>) -> Outcome + 'static,
    {
        Self(Rc::new(move |receiver, args| {
            let outcome = f(receiver, args);
            async move { outcome }.boxed_local()
        }))
    }

    /// Asynchronous function; the response is sent once the future completes.
    pub fn asynchronous<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + 'static,
        Fut: Future<Output = Outcome> + 'static,
    {
        Self(Rc::new(move |_, args| f(args).boxed_local()))
    }

    pub fn call(&self, receiver: Option<Member>, args: Vec<Value>) -> BoxedLocal<Outcome> {
        (self.0)(receiver, args)
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function")
    }
}

/// An object whose members are resolved by key.
pub trait Object {
    fn get(&self, key: &Key) -> Option<Member>;
}

/// One node of a target graph.
#[derive(Clone)]
pub enum Member {
    Function(Function),
    Object(Rc<dyn Object>),
    Value(Value),
}

impl Member {
    /// Member lookup: objects resolve keys themselves, plain values by
    /// field name or index, functions have no members.
    pub fn get(&self, key: &Key) -> Option<Member> {
        match self {
            Self::Function(_) => None,
            Self::Object(object) => object.get(key),
            Self::Value(value) => value.get(key).cloned().map(Self::Value),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => write!(f, "Member::Function"),
            Self::Object(_) => write!(f, "Member::Object"),
            Self::Value(v) => write!(f, "Member::Value({v:?})"),
        }
    }
}

impl From<Function> for Member {
    fn from(f: Function) -> Self {
        Self::Function(f)
    }
}

impl From<Value> for Member {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<TargetObject> for Member {
    fn from(object: TargetObject) -> Self {
        Self::Object(Rc::new(object))
    }
}

impl From<Rc<dyn Object>> for Member {
    fn from(object: Rc<dyn Object>) -> Self {
        Self::Object(object)
    }
}

/// Map-backed [`Object`], assembled builder-style.
#[derive(Default)]
pub struct TargetObject {
    members: BTreeMap<String, Member>,
}

impl TargetObject {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn member(mut self, name: impl Into<String>, member: impl Into<Member>) -> Self {
        self.members.insert(name.into(), member.into());
        self
    }

    #[must_use]
    pub fn function<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Outcome + 'static,
    {
        self.member(name, Function::new(f))
    }

    #[must_use]
    pub fn value(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.member(name, Member::Value(value.into()))
    }
}

impl Object for TargetObject {
    fn get(&self, key: &Key) -> Option<Member> {
        match key {
            Key::Name(name) => self.members.get(name).cloned(),
            Key::Index(index) => self.members.get(&index.to_string()).cloned(),
        }
    }
}

fn display_path(path: &[Key]) -> String {
    if path.is_empty() {
        return "<target>".into();
    }
    path.iter().map(ToString::to_string).collect::<Vec<_>>().join(".")
}

/// Reduce `path` left to right from `root`, yielding `(owner, member)`.
pub fn resolve(root: &Member, path: &[Key]) -> Result<(Option<Member>, Member), Fault> {
    let mut owner = None;
    let mut current = root.clone();
    for (depth, key) in path.iter().enumerate() {
        let next = current.get(key).ok_or_else(|| {
            ErrorObject::type_error(format!(
                "cannot read `{key}` of `{}`",
                display_path(&path[..depth])
            ))
        })?;
        owner = Some(current);
        current = next;
    }
    Ok((owner, current))
}

/// Resolve and invoke one call against `target`.
pub async fn invoke(target: &Member, path: &[Key], args: Vec<Value>, max_depth: usize) -> Outcome {
    if path.len() > max_depth {
        return Err(ErrorObject::type_error(format!(
            "call path exceeds {max_depth} steps"
        ))
        .into());
    }
    let (owner, member) = resolve(target, path)?;
    match member {
        Member::Function(function) | Member::Value(Value::Function(function)) => {
            function.call(owner, args).await
        }
        Member::Value(Value::Remote(proxy)) => proxy.call(args).await.map_err(Fault::from),
        _ => Err(ErrorObject::type_error(format!("`{}` is not a function", display_path(path))).into()),
    }
}

/// Bind `target` to `channel`: every inbound call request is resolved
/// against it and answered.
pub fn expose(channel: &Channel, target: impl Into<Member>) {
    let target = target.into();
    channel.set_request_handler(Rc::new(move |channel: &Channel, request: CallRequest| {
        channel
            .spawner()
            .spawn_local(serve(channel.clone(), target.clone(), request).boxed_local());
    }));
    channel.listen();
}

/// Handle one request and post its single response.
pub async fn serve(channel: Channel, target: Member, request: CallRequest) {
    let CallRequest { id, path, args } = request;
    debug!("RPC[{id}]: call {}", display_path(&path));

    let outcome = invoke(&target, &path, args, channel.config().max_path_depth).await;
    if !channel.is_open() {
        debug!("RPC[{id}]: channel closed before reply");
        return;
    }

    let (message, transfer) = match outcome {
        Ok(result) => {
            let (result, transfer) = resolve_one(result);
            (response(id, Ok(result)), transfer)
        }
        Err(fault) => {
            debug!("RPC[{id}]: failed: {fault}");
            (response(id, Err(to_cloneable(fault))), Vec::new())
        }
    };

    if let Err(e) = channel.post(message, transfer) {
        warn!("RPC[{id}]: reply not cloneable: {e}");
        let fallback = to_cloneable(ErrorObject::data_clone(e.to_string()).into());
        if let Err(e) = channel.post(response(id, Err(fallback)), Vec::new()) {
            warn!("RPC[{id}]: error reply failed: {e}");
        }
    }
}
