//! Signals
//!
//! A [`Signal`] is a broadcast point with an ordered list of listeners
//! ("slots"). Emission is synchronous and calls slots in connection order.
//!
//! # Fault Isolation
//!
//! A slot may fail by returning an error or by panicking. Either way the
//! failure is captured as a [`ListenerError`], logged, and emission moves on
//! to the next slot. The mutation that triggered the emission is never rolled
//! back.
//!
//! Slots are snapshotted before emission, so a slot may connect or disconnect
//! other slots (including itself) without deadlocking; such changes take
//! effect from the next emission.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

/// Unique identifier for a connected slot.
///
/// Returned by [`Signal::connect`] and used to disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

impl SlotId {
    /// Generate a new unique slot ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a slot returns. Any error type may be boxed into the failure case.
pub type SlotResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type SlotFn<T> = Arc<dyn Fn(&T) -> SlotResult + Send + Sync>;

/// A captured slot failure.
#[derive(Debug, Clone, Error)]
#[error("listener on \"{signal}\" failed: {message}")]
pub struct ListenerError {
    pub signal: &'static str,
    pub slot: SlotId,
    pub message: String,
}

/// An ordered list of listeners for events of type `T`.
pub struct Signal<T> {
    name: &'static str,
    slots: RwLock<Vec<(SlotId, SlotFn<T>)>>,
}

impl<T> Signal<T> {
    /// Create a signal; `name` identifies it in log output.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Connect a slot that may fail.
    pub fn connect<F>(&self, slot: F) -> SlotId
    where
        F: Fn(&T) -> SlotResult + Send + Sync + 'static,
    {
        let id = SlotId::new();
        self.slots.write().push((id, Arc::new(slot)));
        id
    }

    /// Connect a slot that cannot fail.
    pub fn observe<F>(&self, slot: F) -> SlotId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.connect(move |event| {
            slot(event);
            Ok(())
        })
    }

    /// Remove a slot. Returns `false` if it was not connected.
    pub fn disconnect(&self, id: SlotId) -> bool {
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|(slot_id, _)| *slot_id != id);
        slots.len() != before
    }

    pub fn slot_count(&self) -> usize {
        self.slots.read().len()
    }

    /// Call every slot with `event`, returning the failures.
    ///
    /// Failures are also logged at `error` level.
    pub fn emit(&self, event: &T) -> Vec<ListenerError> {
        let slots: Vec<(SlotId, SlotFn<T>)> = self.slots.read().clone();
        let mut failures = Vec::new();

        for (id, slot) in slots {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| slot(event)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(payload) => panic_message(payload.as_ref()),
            };
            let failure = ListenerError {
                signal: self.name,
                slot: id,
                message,
            };
            tracing::error!(signal = self.name, slot = ?id, "{}", failure);
            failures.push(failure);
        }

        failures
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_owned()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("slot_count", &self.slot_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn slot_ids_are_unique() {
        let id1 = SlotId::new();
        let id2 = SlotId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn slots_run_in_connection_order() {
        let signal = Signal::<i32>::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));

        let l1 = log.clone();
        signal.observe(move |v| l1.lock().push(("first", *v)));
        let l2 = log.clone();
        signal.observe(move |v| l2.lock().push(("second", *v)));

        assert!(signal.emit(&7).is_empty());
        assert_eq!(*log.lock(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn failing_slots_are_isolated() {
        let signal = Signal::<()>::new("test");
        let called = Arc::new(Mutex::new(0));

        signal.connect(|_| Err("Oops".into()));
        signal.observe(|_| panic!("boom"));
        let c = called.clone();
        signal.observe(move |_| *c.lock() += 1);

        let failures = signal.emit(&());
        assert_eq!(*called.lock(), 1);
        assert_eq!(failures.len(), 2);
        assert!(failures[0].message.contains("Oops"));
        assert!(failures[1].message.contains("boom"));
    }

    #[test]
    fn disconnect_removes_slot() {
        let signal = Signal::<()>::new("test");
        let id = signal.observe(|_| {});
        assert_eq!(signal.slot_count(), 1);
        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        assert_eq!(signal.slot_count(), 0);
    }
}
