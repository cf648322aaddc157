//! Control requests (clear, get-info, resize)
//!
//! Two front ends share one handler:
//! - typed: [`ControlRequest`] in, [`ControlReply`] out
//! - raw: an ioctl-style `(cmd, arg)` pair using the numeric command codes
//!   of the classic `pchar_ioctl.h` header, decoded by
//!   [`ControlRequest::from_raw`]
//!
//! The handler runs with the device lock held; see `PcharDevice::control`.

use std::mem::size_of;

use tracing::{info, warn};

use crate::error::{DeviceError, Result};
use crate::fifo::{ByteFifo, FifoInfo};

const IOC_NONE: u32 = 0;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

/// ioctl "type" byte of the device
pub const FIFO_MAGIC: u8 = b'x';

/// Size of the raw info structure: three native-endian `i16`
pub const FIFO_INFO_SIZE: usize = 3 * size_of::<i16>();

#[allow(clippy::cast_possible_truncation)]
const fn ioc(dir: u32, nr: u32, size: usize) -> u32 {
    (dir << 30) | ((size as u32) << 16) | ((FIFO_MAGIC as u32) << 8) | nr
}

pub const FIFO_CLEAR: u32 = ioc(IOC_NONE, 1, 0);
pub const FIFO_GET_INFO: u32 = ioc(IOC_READ, 2, FIFO_INFO_SIZE);
pub const FIFO_RESIZE: u32 = ioc(IOC_WRITE, 3, size_of::<i32>());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Drop all buffered bytes
    Clear,
    /// Snapshot `{size, length, avail}`
    GetInfo,
    /// Reallocate to the given capacity, keeping the oldest bytes
    Resize(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlReply {
    Done,
    Info(FifoInfo),
}

/// Argument slot of a raw control call
#[derive(Debug)]
pub enum IoctlArg<'a> {
    None,
    Value(i64),
    /// Caller memory receiving a result structure
    Out(&'a mut [u8]),
}

impl ControlRequest {
    /// Decode a raw command code and its argument
    ///
    /// # Errors
    /// `InvalidArgument` for an unknown code or a resize value that is not a
    /// positive `int`.
    pub fn from_raw(cmd: u32, arg: &IoctlArg<'_>) -> Result<Self> {
        match cmd {
            FIFO_CLEAR => Ok(Self::Clear),
            FIFO_GET_INFO => Ok(Self::GetInfo),
            FIFO_RESIZE => {
                let IoctlArg::Value(value) = arg else {
                    return Err(DeviceError::InvalidArgument(
                        "resize expects an integer argument".into(),
                    ));
                };
                if *value <= 0 || *value > i64::from(i32::MAX) {
                    warn!(value, "resize: invalid size");
                    return Err(DeviceError::InvalidArgument(format!(
                        "invalid fifo size {value}"
                    )));
                }
                let size = usize::try_from(*value).map_err(|_| {
                    DeviceError::InvalidArgument(format!("invalid fifo size {value}"))
                })?;
                Ok(Self::Resize(size))
            }
            _ => {
                warn!("invalid control command {cmd:#x}");
                Err(DeviceError::InvalidArgument(format!(
                    "unknown control command {cmd:#x}"
                )))
            }
        }
    }

    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::Clear => FIFO_CLEAR,
            Self::GetInfo => FIFO_GET_INFO,
            Self::Resize(_) => FIFO_RESIZE,
        }
    }
}

impl FifoInfo {
    /// Write the info into caller memory in the raw `struct fifo_info` layout
    ///
    /// # Errors
    /// `Transfer` if `dest` is shorter than [`FIFO_INFO_SIZE`] or a field
    /// does not fit a 16-bit field. Nothing is written on failure.
    pub fn copy_to_user(&self, dest: &mut [u8]) -> Result<()> {
        let short = |name: &str, value: usize| {
            i16::try_from(value).map_err(|_| {
                DeviceError::Transfer(format!("{name}={value} does not fit the info structure"))
            })
        };
        let fields = [
            short("size", self.size)?,
            short("length", self.length)?,
            short("avail", self.avail)?,
        ];
        let held = dest.len();
        let Some(dest) = dest.get_mut(..FIFO_INFO_SIZE) else {
            return Err(DeviceError::Transfer(format!(
                "destination holds {held} bytes, info needs {FIFO_INFO_SIZE}"
            )));
        };
        for (chunk, field) in dest.chunks_exact_mut(size_of::<i16>()).zip(fields) {
            chunk.copy_from_slice(&field.to_ne_bytes());
        }
        Ok(())
    }

    /// Inverse of [`FifoInfo::copy_to_user`]
    ///
    /// # Errors
    /// `Transfer` if `src` is too short or holds a negative field.
    pub fn from_user(src: &[u8]) -> Result<Self> {
        let Some(src) = src.get(..FIFO_INFO_SIZE) else {
            return Err(DeviceError::Transfer("info structure truncated".into()));
        };
        let mut fields = src
            .chunks_exact(size_of::<i16>())
            .map(|c| i16::from_ne_bytes([c[0], c[1]]))
            .map(|v| {
                usize::try_from(v).map_err(|_| DeviceError::Transfer(format!("negative field {v}")))
            });
        let mut next = || {
            fields
                .next()
                .unwrap_or_else(|| Err(DeviceError::Transfer("info structure truncated".into())))
        };
        Ok(Self {
            size: next()?,
            length: next()?,
            avail: next()?,
        })
    }
}

/// Execute one request on a locked FIFO
///
/// `max_fifo_size` is the provisioning limit: larger resizes fail with
/// `Allocation` just like a failed reservation would.
pub(crate) fn apply(
    fifo: &mut ByteFifo,
    request: ControlRequest,
    max_fifo_size: usize,
) -> Result<ControlReply> {
    match request {
        ControlRequest::Clear => {
            fifo.reset();
            Ok(ControlReply::Done)
        }
        ControlRequest::GetInfo => Ok(ControlReply::Info(fifo.snapshot())),
        ControlRequest::Resize(new_size) => {
            if new_size == 0 {
                return Err(DeviceError::InvalidArgument(
                    "fifo size must be positive".into(),
                ));
            }
            if new_size > max_fifo_size {
                return Err(DeviceError::Allocation {
                    requested: new_size,
                });
            }
            let old = fifo.snapshot();
            fifo.resize(new_size)?;
            info!(
                from = old.size,
                to = new_size,
                restored = fifo.len(),
                dropped = old.length - fifo.len(),
                "fifo resized"
            );
            Ok(ControlReply::Done)
        }
    }
}
