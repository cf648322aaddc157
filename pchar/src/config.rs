//! Start-time driver parameters
//!
//! Parsed from JSON, every field optional:
//!
//! ```json
//! { "devcnt": 4, "fifo_size": 32, "max_fifo_size": 16384,
//!   "write_policy": "block", "lock_poll_ms": 5 }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, Result};

pub const DEFAULT_DEVCNT: usize = 4;
pub const DEFAULT_FIFO_SIZE: usize = 32;
pub const DEFAULT_MAX_FIFO_SIZE: usize = 16 * 1024;
pub const DEFAULT_LOCK_POLL_MS: u64 = 5;

/// What a write does when the FIFO is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Suspend the writer until a reader frees space
    #[default]
    Block,
    /// Fail at once with `NoSpace`
    NoSpace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub devcnt: usize,
    pub fifo_size: usize,
    pub max_fifo_size: usize,
    pub write_policy: WritePolicy,
    pub lock_poll_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            devcnt: DEFAULT_DEVCNT,
            fifo_size: DEFAULT_FIFO_SIZE,
            max_fifo_size: DEFAULT_MAX_FIFO_SIZE,
            write_policy: WritePolicy::Block,
            lock_poll_ms: DEFAULT_LOCK_POLL_MS,
        }
    }
}

impl DeviceConfig {
    /// One device that refuses writes when full instead of blocking
    #[must_use]
    pub fn single_instance() -> Self {
        Self {
            devcnt: 1,
            write_policy: WritePolicy::NoSpace,
            ..Self::default()
        }
    }

    /// Read JSON config from a reader
    ///
    /// # Errors
    /// `InvalidArgument` if reading fails, the JSON is malformed, or the
    /// resulting config does not validate.
    pub fn from_reader(mut reader: impl embedded_io::Read) -> Result<Self> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match embedded_io::Read::read(&mut reader, &mut chunk) {
                Ok(0) => break,
                #[allow(clippy::indexing_slicing)]
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    return Err(DeviceError::InvalidArgument(format!(
                        "failed to read config: {e:?}"
                    )))
                }
            }
        }
        Self::from_json_slice(&buffer)
    }

    /// # Errors
    /// `InvalidArgument` for malformed JSON or an invalid config.
    pub fn from_json_slice(json: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(json)
            .map_err(|e| DeviceError::InvalidArgument(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// `InvalidArgument` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.devcnt == 0 {
            return Err(DeviceError::InvalidArgument(
                "devcnt must be positive".into(),
            ));
        }
        if self.fifo_size == 0 {
            return Err(DeviceError::InvalidArgument(
                "fifo_size must be positive".into(),
            ));
        }
        if self.fifo_size > self.max_fifo_size {
            return Err(DeviceError::InvalidArgument(format!(
                "fifo_size {} exceeds max_fifo_size {}",
                self.fifo_size, self.max_fifo_size
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms.max(1))
    }
}
