//! Bounded byte FIFO
//!
//! Fixed-capacity circular byte store backing one device instance.
//! The FIFO itself is not synchronized: the owning device keeps it behind
//! its mutex, so every method here assumes exclusive access.
//!
//! ```text
//!          head            head + len
//!           │                  │
//!  ┌────────▼──────────────────▼──────┐
//!  │ free   │ valid bytes (FIFO order) │ free │   (wraps at capacity)
//!  └──────────────────────────────────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, Result};

/// Point-in-time `{size, length, avail}` description of a FIFO
///
/// A copy, not a live view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FifoInfo {
    pub size: usize,
    pub length: usize,
    pub avail: usize,
}

/// Fixed-capacity circular byte buffer
pub struct ByteFifo {
    buf: Box<[u8]>,
    head: usize,
    len: usize,
}

/// Allocate `capacity` zeroed bytes, reporting failure instead of aborting.
fn provision(capacity: usize) -> Result<Box<[u8]>> {
    if capacity == 0 {
        return Err(DeviceError::InvalidArgument(
            "fifo capacity must be positive".into(),
        ));
    }
    let mut storage = Vec::new();
    storage
        .try_reserve_exact(capacity)
        .map_err(|_| DeviceError::Allocation {
            requested: capacity,
        })?;
    storage.resize(capacity, 0);
    Ok(storage.into_boxed_slice())
}

impl ByteFifo {
    /// Create an empty FIFO holding at most `capacity` bytes
    ///
    /// # Errors
    /// `InvalidArgument` for a zero capacity, `Allocation` if the storage
    /// cannot be reserved.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Ok(Self {
            buf: provision(capacity)?,
            head: 0,
            len: 0,
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn avail(&self) -> usize {
        self.capacity() - self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Append as many bytes of `data` as fit
    ///
    /// Returns the number of bytes copied, which is `0` when the FIFO is full.
    /// Never blocks.
    pub fn enqueue(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.avail());
        if n == 0 {
            return 0;
        }
        let cap = self.capacity();
        let tail = (self.head + self.len) % cap;
        let first = n.min(cap - tail);

        // first <= cap - tail and n - first <= head (the free gap before head)
        #[allow(clippy::indexing_slicing)]
        {
            self.buf[tail..tail + first].copy_from_slice(&data[..first]);
            self.buf[..n - first].copy_from_slice(&data[first..n]);
        }
        self.len += n;
        n
    }

    /// Remove up to `out.len()` bytes in FIFO order into `out`
    ///
    /// Returns the number of bytes removed, `0` when empty.
    pub fn dequeue(&mut self, out: &mut [u8]) -> usize {
        let n = self.copy_oldest(out);
        self.len -= n;
        self.head = if self.len == 0 {
            0
        } else {
            (self.head + n) % self.capacity()
        };
        n
    }

    /// Drop every stored byte; capacity is unchanged
    pub fn reset(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Reallocate to `new_capacity`, keeping the oldest bytes that fit
    ///
    /// Bytes beyond the new capacity (the newest ones) are discarded.
    /// On failure the FIFO is left exactly as it was.
    ///
    /// # Errors
    /// `InvalidArgument` for a zero capacity, `Allocation` if the new storage
    /// cannot be reserved.
    pub fn resize(&mut self, new_capacity: usize) -> Result<()> {
        let mut storage = provision(new_capacity)?;
        let keep = self.len.min(new_capacity);

        #[allow(clippy::indexing_slicing)]
        let copied = self.copy_oldest(&mut storage[..keep]);
        debug_assert_eq!(copied, keep);

        self.buf = storage;
        self.head = 0;
        self.len = keep;
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> FifoInfo {
        FifoInfo {
            size: self.capacity(),
            length: self.len,
            avail: self.avail(),
        }
    }

    /// Copy the oldest `min(out.len(), len)` bytes without consuming them
    fn copy_oldest(&self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len);
        if n == 0 {
            return 0;
        }
        let first = n.min(self.capacity() - self.head);

        #[allow(clippy::indexing_slicing)]
        {
            out[..first].copy_from_slice(&self.buf[self.head..self.head + first]);
            out[first..n].copy_from_slice(&self.buf[..n - first]);
        }
        n
    }
}

impl fmt::Debug for ByteFifo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ByteFifo(size={}, length={}, head={})",
            self.capacity(),
            self.len,
            self.head
        )
    }
}
