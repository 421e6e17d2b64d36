//! Transfer-list computation.
//!
//! A value moves instead of copying when either
//!
//! - it was explicitly marked with [`transfer`], at any depth, or
//! - it is an unmarked top-level argument/result that is inherently
//!   transferable ([`Value::Buffer`], [`Value::Port`]).
//!
//! A marked top-level value contributes exactly its mark. Marks are
//! consumed when the message is built; the port never sees them.

use crate::value::{Transferable, Value};

/// Attach a transfer association to `value`, replacing any previous one.
pub fn transfer<T>(value: impl Into<Value>, transferables: impl IntoIterator<Item = T>) -> Value
where
    T: Into<Transferable>,
{
    let value = match value.into() {
        Value::Marked(inner, _) => *inner,
        other => other,
    };
    Value::Marked(
        Box::new(value),
        transferables.into_iter().map(Into::into).collect(),
    )
}

/// Strip marks from every value and compute their union transfer list.
pub fn resolve_all(values: Vec<Value>) -> (Vec<Value>, Vec<Transferable>) {
    let mut list = TransferList::default();
    let stripped = values
        .into_iter()
        .map(|value| {
            match &value {
                Value::Buffer(buffer) => list.push(Transferable::Buffer(buffer.clone())),
                Value::Port(port) => list.push(Transferable::Port(port.clone())),
                _ => {}
            }
            strip(value, &mut list)
        })
        .collect();
    (stripped, list.0)
}

/// [`resolve_all`] for a single value, e.g. a call result.
pub fn resolve_one(value: Value) -> (Value, Vec<Transferable>) {
    let (mut values, list) = resolve_all(vec![value]);
    (values.pop().unwrap_or_default(), list)
}

#[derive(Default)]
struct TransferList(Vec<Transferable>);

impl TransferList {
    fn push(&mut self, item: Transferable) {
        if !self.0.iter().any(|seen| seen.same(&item)) {
            self.0.push(item);
        }
    }
}

fn strip(value: Value, list: &mut TransferList) -> Value {
    match value {
        Value::Marked(inner, marks) => {
            for mark in marks {
                list.push(mark);
            }
            strip(*inner, list)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(|v| strip(v, list)).collect()),
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, strip(v, list))).collect())
        }
        other => other,
    }
}
