//! One device instance: a FIFO, its lock, and the queue of blocked writers
//!
//! # Locking
//!
//! - Every FIFO access, including the info snapshot, happens under `fifo`.
//! - Each mutation publishes the new length and free space to two atomics
//!   before the lock is released. The "not full" and "empty" checks read
//!   those, so neither ever takes the FIFO lock.
//! - The lock is never held while parked. A writer first waits for
//!   "not full" in the wait queue, then takes the lock separately, so the
//!   amount it enqueues may be smaller than the space it saw while waiting.
//! - The wait queue lock and the FIFO lock are never held together.
//!   Mutators publish and release the FIFO before notifying.
//!
//! # Thread Safety
//!
//! `PcharDevice` is `Send + Sync` and is shared as `Arc<PcharDevice>` by the
//! device table and every open handle bound to it.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::config::{DeviceConfig, WritePolicy};
use crate::control::{self, ControlReply, ControlRequest};
use crate::error::{DeviceError, Result};
use crate::fifo::{ByteFifo, FifoInfo};
use crate::interrupt::Interrupt;
use crate::wait_queue::WaitQueue;

pub struct PcharDevice {
    minor: usize,
    name: String,
    fifo: Mutex<ByteFifo>,
    stored: AtomicUsize,
    free: AtomicUsize,
    writers: WaitQueue,
    write_policy: WritePolicy,
    max_fifo_size: usize,
    lock_poll: Duration,
}

impl PcharDevice {
    /// Create device `minor` with an empty FIFO of `config.fifo_size` bytes
    ///
    /// # Errors
    /// `Allocation` if the FIFO cannot be provisioned (including a size above
    /// `config.max_fifo_size`), `InvalidArgument` for a zero size.
    pub fn new(minor: usize, config: &DeviceConfig) -> Result<Self> {
        let name = format!("pchar{minor}");
        if config.fifo_size > config.max_fifo_size {
            return Err(DeviceError::Allocation {
                requested: config.fifo_size,
            });
        }
        let fifo = ByteFifo::with_capacity(config.fifo_size)?;
        debug!(device = %name, size = config.fifo_size, "fifo allocated");

        Ok(Self {
            minor,
            writers: WaitQueue::new(&name),
            name,
            stored: AtomicUsize::new(0),
            free: AtomicUsize::new(fifo.avail()),
            fifo: Mutex::new(fifo),
            write_policy: config.write_policy,
            max_fifo_size: config.max_fifo_size,
            lock_poll: config.lock_poll(),
        })
    }

    #[must_use]
    pub fn minor(&self) -> usize {
        self.minor
    }

    /// Node name, `pchar<minor>`
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }

    /// Write up to `data.len()` bytes
    ///
    /// Under [`WritePolicy::Block`] a full FIFO suspends the caller until a
    /// reader (or a clear/resize) frees space. Returns the number of bytes
    /// accepted, bounded by the free space at the time the lock is taken.
    ///
    /// # Errors
    /// - `Interrupted` if `interrupt` fires while waiting for space or for
    ///   the lock; nothing was written.
    /// - `NoSpace` if the FIFO is full under [`WritePolicy::NoSpace`].
    pub fn write(&self, data: &[u8], interrupt: &Interrupt) -> Result<usize> {
        trace!(device = %self.name, requested = data.len(), "write");
        if data.is_empty() {
            return Ok(0);
        }

        if self.write_policy == WritePolicy::Block {
            let waited = self
                .writers
                .wait_until("writer", interrupt, || self.free.load(Ordering::SeqCst) > 0);
            if let Err(e) = waited {
                debug!(device = %self.name, "writer woken by interrupt");
                return Err(e);
            }
        }

        let mut fifo = self.lock_interruptible(interrupt)?;
        if self.write_policy == WritePolicy::NoSpace && fifo.is_full() {
            debug!(device = %self.name, "write refused, fifo full");
            return Err(DeviceError::NoSpace);
        }
        let written = fifo.enqueue(data);
        self.publish(&fifo);
        drop(fifo);

        debug!(device = %self.name, requested = data.len(), written, "write done");
        Ok(written)
    }

    /// Read up to `buf.len()` bytes; `0` when the FIFO is empty
    ///
    /// Never suspends waiting for data: an empty FIFO answers `0` without
    /// touching the lock. Removing at least one byte wakes the blocked
    /// writers so they re-check for space.
    ///
    /// # Errors
    /// `Interrupted` if `interrupt` fires while waiting for the lock.
    pub fn read(&self, buf: &mut [u8], interrupt: &Interrupt) -> Result<usize> {
        trace!(device = %self.name, requested = buf.len(), "read");
        if self.stored.load(Ordering::SeqCst) == 0 {
            return Ok(0);
        }
        let mut fifo = self.lock_interruptible(interrupt)?;
        if fifo.is_empty() {
            return Ok(0);
        }
        let read = fifo.dequeue(buf);
        self.publish(&fifo);
        drop(fifo);

        if read > 0 {
            let woken = self.writers.notify_all();
            if woken > 0 {
                debug!(device = %self.name, woken, "blocked writers woken up");
            }
        }
        debug!(device = %self.name, read, "read done");
        Ok(read)
    }

    /// Run a control request atomically under the device lock
    ///
    /// # Errors
    /// `Interrupted` while waiting for the lock, otherwise whatever the
    /// request itself reports (`InvalidArgument`, `Allocation`).
    pub fn control(&self, request: ControlRequest, interrupt: &Interrupt) -> Result<ControlReply> {
        debug!(device = %self.name, ?request, "control");
        let mut fifo = self.lock_interruptible(interrupt)?;
        let reply = control::apply(&mut fifo, request, self.max_fifo_size);
        let has_room = !fifo.is_full();
        self.publish(&fifo);
        drop(fifo);

        let frees_space = matches!(request, ControlRequest::Clear | ControlRequest::Resize(_));
        if reply.is_ok() && frees_space && has_room {
            self.writers.notify_all();
        }
        reply
    }

    /// Locked snapshot of the FIFO
    #[must_use]
    pub fn info(&self) -> FifoInfo {
        self.fifo.lock().snapshot()
    }

    /// Number of writers currently suspended on a full FIFO
    #[must_use]
    pub fn waiting_writers(&self) -> usize {
        self.writers.len()
    }

    /// Mirror length and free space for the lock-free checks; call with the
    /// lock held, after every mutation
    fn publish(&self, fifo: &ByteFifo) {
        self.stored.store(fifo.len(), Ordering::SeqCst);
        self.free.store(fifo.avail(), Ordering::SeqCst);
    }

    /// Take the FIFO lock, giving up if `interrupt` fires while contended
    fn lock_interruptible(&self, interrupt: &Interrupt) -> Result<MutexGuard<'_, ByteFifo>> {
        if let Some(guard) = self.fifo.try_lock() {
            return Ok(guard);
        }
        loop {
            if interrupt.take_pending() {
                debug!(device = %self.name, "lock wait interrupted");
                return Err(DeviceError::Interrupted);
            }
            if let Some(guard) = self.fifo.try_lock_for(self.lock_poll) {
                return Ok(guard);
            }
        }
    }
}

impl fmt::Debug for PcharDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // one lock at a time
        let fifo = format!("{:?}", *self.fifo.lock());
        let waiting = self.writers.len();
        write!(
            f,
            "PcharDevice(name={}, fifo={fifo}, waiting_writers={waiting}, policy={:?})",
            self.name, self.write_policy
        )
    }
}

impl Drop for PcharDevice {
    fn drop(&mut self) {
        trace!(device = %self.name, "device released");
    }
}
