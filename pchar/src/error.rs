//! Error type shared by every device operation
//!
//! Each variant corresponds to one errno the driver hands back to the
//! calling process. `Interrupted` is the only retryable outcome: the caller
//! reissues the identical call, nothing was transferred and no lock is held.

use std::os::raw::c_int;

pub type Result<T> = std::result::Result<T, DeviceError>;

const EBADF: c_int = 9;
const ENXIO: c_int = 6;
const ENOMEM: c_int = 12;
const EFAULT: c_int = 14;
const EINVAL: c_int = 22;
const ENOSPC: c_int = 28;
/// Kernel-internal "restart the syscall" code.
const ERESTARTSYS: c_int = 512;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// Malformed request: unknown control code, non-positive size, bad config.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Backing storage could not be provisioned.
    #[error("cannot provision {requested} bytes of fifo storage")]
    Allocation { requested: usize },

    /// Bytes or an info structure could not cross the caller/device boundary.
    #[error("transfer to caller failed: {0}")]
    Transfer(String),

    /// A suspended or lock-waiting call was cancelled before taking effect.
    #[error("interrupted, call must be restarted")]
    Interrupted,

    /// No device instance with this identity.
    #[error("no such device: {0}")]
    NotFound(String),

    /// The open handle is unknown or already closed.
    #[error("bad file handle {0}")]
    BadHandle(i64),

    /// Write to a full buffer under the no-space write policy.
    #[error("no space left on device")]
    NoSpace,
}

impl DeviceError {
    /// Negative errno as returned by the device entry points.
    #[must_use]
    pub fn errno(&self) -> c_int {
        let code = match self {
            Self::InvalidArgument(_) => EINVAL,
            Self::Allocation { .. } => ENOMEM,
            Self::Transfer(_) => EFAULT,
            Self::Interrupted => ERESTARTSYS,
            Self::NotFound(_) => ENXIO,
            Self::BadHandle(_) => EBADF,
            Self::NoSpace => ENOSPC,
        };
        -code
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

impl embedded_io::Error for DeviceError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Self::Interrupted => embedded_io::ErrorKind::Interrupted,
            Self::Allocation { .. } | Self::NoSpace => embedded_io::ErrorKind::OutOfMemory,
            Self::InvalidArgument(_) | Self::BadHandle(_) => embedded_io::ErrorKind::InvalidInput,
            Self::NotFound(_) => embedded_io::ErrorKind::NotFound,
            Self::Transfer(_) => embedded_io::ErrorKind::Other,
        }
    }
}
