//! Call correlation table.
//!
//! Maps each outstanding [`CallId`] to a one-shot [`Slot`] the caller's
//! [`Reply`](super::proxy::Reply) waits on. Entries are removed the instant
//! they settle, so a late or duplicate response finds nothing.

use std::collections::HashMap;
use std::rc::Rc;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;

use super::message::CallId;
use crate::error::ProxifyError;
use crate::value::Value;

/// Outcome cell for one call.
pub type Slot = Signal<NoopRawMutex, Result<Value, ProxifyError>>;

/// Largest id that still fits the wire's signed integer.
#[allow(clippy::cast_sign_loss)]
const MAX_ID: u64 = i64::MAX as u64;

#[derive(Default)]
pub struct PendingCalls {
    calls: HashMap<CallId, Rc<Slot>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw a fresh random id and register a slot for it.
    pub fn register(&mut self) -> (CallId, Rc<Slot>) {
        let id = loop {
            let candidate = CallId(fastrand::u64(0..=MAX_ID));
            if !self.calls.contains_key(&candidate) {
                break candidate;
            }
        };
        let slot = Rc::new(Slot::new());
        self.calls.insert(id, slot.clone());
        (id, slot)
    }

    /// Settle and remove `id`. Returns `false` if it was not outstanding.
    pub fn settle(&mut self, id: CallId, outcome: Result<Value, ProxifyError>) -> bool {
        match self.calls.remove(&id) {
            Some(slot) => {
                slot.signal(outcome);
                true
            }
            None => false,
        }
    }

    /// Forget `id` without settling it.
    pub fn remove(&mut self, id: CallId) -> bool {
        self.calls.remove(&id).is_some()
    }

    /// Settle every outstanding call with `error` and clear the table.
    pub fn reject_all(&mut self, error: &ProxifyError) -> usize {
        let count = self.calls.len();
        for (_, slot) in self.calls.drain() {
            slot.signal(Err(error.clone()));
        }
        count
    }

    pub fn contains(&self, id: CallId) -> bool {
        self.calls.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
