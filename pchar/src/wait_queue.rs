//! Wait Queue
//!
//! Blocking wait/notify point used by writers waiting for free space.
//!
//! # Lost wakeups
//!
//! The naive workflow is:
//!
//! 10. Writer: check "buffer is full"
//! 20. Writer: register itself in the waiting list
//! 30. Writer: park
//!
//! 40. Reader: remove bytes
//! 50. Reader: take every writer off the waiting list and unpark it
//!
//! A reader running on another thread can execute steps 40-50 between the
//! writer's steps 10 and 20. The writer then parks although space exists and
//! nobody will ever wake it.
//!
//! To avoid this, the writer holds the queue lock across steps 10-20, and
//! the notifier needs the same lock for step 50:
//!
//! ```ignore
//! if !should_wait() {
//!     return;
//! }
//!
//! let lock = queue.get_lock();
//! if should_wait() {
//!     queue.wait(debug_hint, lock, &interrupt);
//!     // lock is consumed by wait and released before parking
//! }
//! ```
//!
//! [`WaitQueue::wait_until`] wraps this loop, including the re-check after
//! every wakeup.
//!
//! # Interruption
//!
//! Each waiter parks on its own [`Parker`] which is also armed on the
//! caller's [`Interrupt`]. Notification and interruption race for the slot;
//! the loser is ignored.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::error::{DeviceError, Result};
use crate::interrupt::{Interrupt, Parker, Wake};

/// A thread parked in the queue
struct WaitingClient {
    ticket: u64,
    parker: Arc<Parker>,
    debug_hint: String,
}

impl std::fmt::Debug for WaitingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitingClient")
            .field("ticket", &self.ticket)
            .field("debug_hint", &self.debug_hint)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct WaitState {
    waiters: Vec<WaitingClient>,
    next_ticket: u64,
}

/// Thread-safe wait/notify point
#[derive(Debug)]
pub struct WaitQueue {
    inner: Mutex<WaitState>,
    name: String,
}

impl WaitQueue {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            inner: Mutex::new(WaitState::default()),
            name: name.to_string(),
        }
    }

    /// Get the lock for atomic condition-check + register operations
    pub fn get_lock(&self) -> MutexGuard<'_, WaitState> {
        self.inner.lock()
    }

    /// Park until notified or interrupted
    ///
    /// Precondition: the caller acquired the lock and checked its condition.
    /// Post-condition: the lock is released and the waiter is no longer
    /// registered.
    ///
    /// Returns immediately with [`Wake::Interrupted`] if the interrupt is
    /// already pending. The pending signal is left for the caller to consume.
    pub fn wait(
        &self,
        debug_hint: &str,
        mut lock: MutexGuard<'_, WaitState>,
        interrupt: &Interrupt,
    ) -> Wake {
        let parker = Arc::new(Parker::new());
        let Some(armed) = interrupt.arm(&parker) else {
            drop(lock);
            return Wake::Interrupted;
        };

        let ticket = lock.next_ticket;
        lock.next_ticket += 1;
        lock.waiters.push(WaitingClient {
            ticket,
            parker: Arc::clone(&parker),
            debug_hint: debug_hint.to_string(),
        });
        drop(lock);

        trace!(queue = %self.name, ticket, hint = debug_hint, "parked");
        let wake = parker.park();
        interrupt.disarm(armed);

        if wake == Wake::Interrupted {
            // A notifier may have already removed us; retain is then a no-op
            self.inner.lock().waiters.retain(|w| w.ticket != ticket);
        }
        trace!(queue = %self.name, ticket, ?wake, "resumed");
        wake
    }

    /// Block until `ready` holds, re-checking after every wakeup
    ///
    /// # Errors
    /// `Interrupted` if the interrupt was raised before `ready` held.
    /// The interrupt is consumed in that case.
    pub fn wait_until(
        &self,
        debug_hint: &str,
        interrupt: &Interrupt,
        mut ready: impl FnMut() -> bool,
    ) -> Result<()> {
        loop {
            if ready() {
                return Ok(());
            }

            let lock = self.get_lock();
            if ready() {
                return Ok(());
            }
            match self.wait(debug_hint, lock, interrupt) {
                Wake::Notified => {}
                Wake::Interrupted => {
                    interrupt.take_pending();
                    return Err(DeviceError::Interrupted);
                }
            }
        }
    }

    /// Wake every parked thread; returns how many were woken
    pub fn notify_all(&self) -> usize {
        let waiters = std::mem::take(&mut self.inner.lock().waiters);
        let count = waiters.len();
        for waiter in waiters {
            waiter.parker.unpark(Wake::Notified);
        }
        if count > 0 {
            debug!(queue = %self.name, waiters = count, "notify_all");
        }
        count
    }

    /// Wake the longest-parked thread, if any
    pub fn notify_one(&self) -> bool {
        let waiter = {
            let mut state = self.inner.lock();
            if state.waiters.is_empty() {
                None
            } else {
                Some(state.waiters.remove(0))
            }
        };
        match waiter {
            Some(waiter) => {
                debug!(queue = %self.name, hint = %waiter.debug_hint, "notify_one");
                waiter.parker.unpark(Wake::Notified);
                true
            }
            None => false,
        }
    }

    /// Number of currently parked threads
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
