//! Single-resolution completion signal
//!
//! A [`SignalSlot`] is shared between the thread that issues a driver request
//! and the thread that dispatches driver events. The requester arms the slot
//! before issuing the request and blocks on the returned [`Waiter`]; the
//! dispatcher resolves it when the matching event arrives.
//!
//! At most one waiter is armed at a time. Resolving an unarmed slot, resolving
//! twice, or resolving after the waiter gave up are all no-ops. A slot armed
//! with a request key only accepts keyed resolutions carrying the same key.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::error::SignalError;

struct Armed<T> {
    ticket: u64,
    key: Option<u64>,
    tx: Sender<T>,
}

struct SlotState<T> {
    next_ticket: u64,
    armed: Option<Armed<T>>,
}

/// Rendezvous point for one in-flight request
pub struct SignalSlot<T> {
    state: Arc<Mutex<SlotState<T>>>,
}

impl<T> Clone for SignalSlot<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Default for SignalSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SignalSlot<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SlotState {
                next_ticket: 1,
                armed: None,
            })),
        }
    }

    /// Arm the slot for a new request.
    ///
    /// A previously armed waiter is abandoned.
    pub fn arm(&self) -> Waiter<T> {
        self.arm_with(None)
    }

    /// Arm the slot for the request identified by `key`
    pub fn arm_for(&self, key: u64) -> Waiter<T> {
        self.arm_with(Some(key))
    }

    fn arm_with(&self, key: Option<u64>) -> Waiter<T> {
        let (tx, rx) = bounded(1);
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.armed = Some(Armed { ticket, key, tx });
        Waiter {
            ticket,
            rx,
            slot: self.clone(),
        }
    }

    /// Deliver `value` to the armed waiter. Returns false if nothing was armed.
    pub fn resolve(&self, value: T) -> bool {
        let armed = self.state.lock().armed.take();
        match armed {
            Some(armed) => armed.tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Deliver `value` only if the armed request carries `key`, or was armed
    /// without one. Returns false if the event belongs to another request.
    pub fn resolve_for(&self, key: u64, value: T) -> bool {
        let armed = {
            let mut state = self.state.lock();
            let matches = state
                .armed
                .as_ref()
                .is_some_and(|a| a.key.map_or(true, |k| k == key));
            if !matches {
                return false;
            }
            state.armed.take()
        };
        armed.is_some_and(|armed| armed.tx.send(value).is_ok())
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().armed.is_some()
    }

    fn disarm(&self, ticket: u64) {
        let mut state = self.state.lock();
        if state.armed.as_ref().map(|a| a.ticket) == Some(ticket) {
            state.armed = None;
        }
    }
}

/// The requester's side of an armed slot. Dropping it disarms the slot.
pub struct Waiter<T> {
    ticket: u64,
    rx: Receiver<T>,
    slot: SignalSlot<T>,
}

impl<T> Waiter<T> {
    /// Block until resolved or `timeout` elapses
    pub fn wait(self, timeout: Duration) -> Result<T, SignalError> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => Err(SignalError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(SignalError::Abandoned),
        }
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

impl<T> Drop for Waiter<T> {
    fn drop(&mut self) {
        self.slot.disarm(self.ticket);
    }
}
