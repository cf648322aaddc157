//! Pseudo character device with a bounded byte FIFO per instance
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  Driver (entry points)              │
//! │  - open / close / read / write      │
//! │  - control, raw ioctl               │
//! └─────────────────────────────────────┘
//!          │ resolves minor / path
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  DeviceTable                        │
//! │  - fixed set of PcharDevice         │
//! └─────────────────────────────────────┘
//!          │ one per minor
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  PcharDevice                        │
//! │  - Mutex<ByteFifo>                  │
//! │  - WaitQueue of blocked writers     │
//! └─────────────────────────────────────┘
//! ```

pub mod config;
pub mod control;
pub mod device;
pub mod driver;
pub mod error;
pub mod fifo;
pub mod idgen;
pub mod interrupt;
pub mod table;
pub mod wait_queue;

pub use config::{DeviceConfig, WritePolicy};
pub use control::{
    ControlReply, ControlRequest, IoctlArg, FIFO_CLEAR, FIFO_GET_INFO, FIFO_INFO_SIZE, FIFO_RESIZE,
};
pub use device::PcharDevice;
pub use driver::{Driver, OpenFile};
pub use error::{DeviceError, Result};
pub use fifo::{ByteFifo, FifoInfo};
pub use idgen::{Fd, FdGen};
pub use interrupt::Interrupt;
pub use table::DeviceTable;
pub use wait_queue::WaitQueue;
