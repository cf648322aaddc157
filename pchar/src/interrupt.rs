//! Interruption signal for blocking device calls
//!
//! An [`Interrupt`] belongs to one caller session (one open handle).
//! Raising it cancels every call currently parked on it; if none is parked,
//! the signal stays pending and cancels the next call that would have to
//! suspend. A call that is cancelled consumes the pending signal.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Why a parked thread was resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// A wait queue notification: re-check the predicate
    Notified,
    /// The session's interrupt was raised
    Interrupted,
}

/// One-shot park slot for a single waiting thread
///
/// Whoever calls [`Parker::unpark`] first decides the wake reason;
/// later calls are ignored until the slot is consumed by [`Parker::park`].
#[derive(Debug, Default)]
pub struct Parker {
    reason: Mutex<Option<Wake>>,
    cond: Condvar,
}

impl Parker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unpark(&self, wake: Wake) {
        let mut reason = self.reason.lock();
        if reason.is_none() {
            *reason = Some(wake);
            self.cond.notify_one();
        }
    }

    /// Block until unparked and return the reason
    pub fn park(&self) -> Wake {
        let mut reason = self.reason.lock();
        loop {
            if let Some(wake) = reason.take() {
                return wake;
            }
            self.cond.wait(&mut reason);
        }
    }
}

#[derive(Default)]
struct InterruptState {
    pending: bool,
    next_ticket: u64,
    /// Several threads may block on the same handle at once
    parked: Vec<(u64, Arc<Parker>)>,
}

/// Cloneable per-session cancellation signal
#[derive(Clone, Default)]
pub struct Interrupt {
    state: Arc<Mutex<InterruptState>>,
}

impl Interrupt {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the signal pending and wake every call parked on it
    pub fn raise(&self) {
        let mut state = self.state.lock();
        state.pending = true;
        for (_, parker) in &state.parked {
            parker.unpark(Wake::Interrupted);
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.lock().pending
    }

    /// Discard a pending signal without delivering it
    pub fn clear(&self) {
        self.state.lock().pending = false;
    }

    /// Consume the pending signal, returning whether there was one
    pub(crate) fn take_pending(&self) -> bool {
        std::mem::take(&mut self.state.lock().pending)
    }

    /// Route future raises to `parker` until [`Interrupt::disarm`]
    ///
    /// Returns the registration ticket, or `None` without arming if a signal
    /// is already pending; the caller must not park in that case.
    pub(crate) fn arm(&self, parker: &Arc<Parker>) -> Option<u64> {
        let mut state = self.state.lock();
        if state.pending {
            return None;
        }
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.parked.push((ticket, Arc::clone(parker)));
        Some(ticket)
    }

    /// Drop the registration made by `arm`; other armed parkers stay
    pub(crate) fn disarm(&self, ticket: u64) {
        self.state.lock().parked.retain(|(t, _)| *t != ticket);
    }

    /// Number of parkers currently armed
    #[must_use]
    pub fn armed(&self) -> usize {
        self.state.lock().parked.len()
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(
            f,
            "Interrupt(pending={}, parked={})",
            state.pending,
            state.parked.len()
        )
    }
}
