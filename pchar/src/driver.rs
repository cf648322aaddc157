//! Driver - entry points used by calling processes
//!
//! Maps open handles to device instances and routes read/write/control
//! calls to them:
//!
//! ```text
//!  open(minor | path) ──► Fd ──► OpenFile { device, interrupt }
//!                                   │
//!  read / write / control / ioctl ──┴──► PcharDevice ──► ByteFifo
//! ```
//!
//! An open handle carries no buffered state; it only binds a caller session
//! (and that session's [`Interrupt`]) to one device.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::DeviceConfig;
use crate::control::{ControlReply, ControlRequest, IoctlArg};
use crate::device::PcharDevice;
use crate::error::{DeviceError, Result};
use crate::idgen::{Fd, FdGen};
use crate::interrupt::Interrupt;
use crate::table::DeviceTable;

/// One open handle bound to a device
///
/// Clones share the device and the interrupt, so a clone moved to another
/// thread can be used to cancel a blocked call.
#[derive(Debug, Clone)]
pub struct OpenFile {
    fd: Fd,
    device: Arc<PcharDevice>,
    interrupt: Interrupt,
}

impl OpenFile {
    #[must_use]
    pub fn fd(&self) -> Fd {
        self.fd
    }

    #[must_use]
    pub fn device(&self) -> &Arc<PcharDevice> {
        &self.device
    }

    #[must_use]
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// # Errors
    /// See [`PcharDevice::read`].
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.device.read(buf, &self.interrupt)
    }

    /// # Errors
    /// See [`PcharDevice::write`].
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.device.write(data, &self.interrupt)
    }

    /// # Errors
    /// See [`PcharDevice::control`].
    pub fn control(&self, request: ControlRequest) -> Result<ControlReply> {
        self.device.control(request, &self.interrupt)
    }

    /// Raw control call; returns `0` on success
    ///
    /// # Errors
    /// - `InvalidArgument` for an unknown `cmd` or a bad resize value
    /// - `Transfer` if a get-info result cannot be delivered to `arg`
    /// - anything [`PcharDevice::control`] reports
    pub fn ioctl(&self, cmd: u32, arg: IoctlArg<'_>) -> Result<i64> {
        let request = ControlRequest::from_raw(cmd, &arg)?;
        match self.control(request)? {
            ControlReply::Done => Ok(0),
            ControlReply::Info(info) => {
                let IoctlArg::Out(dest) = arg else {
                    return Err(DeviceError::Transfer(
                        "get-info needs a destination buffer".into(),
                    ));
                };
                info.copy_to_user(dest)?;
                debug!(
                    fd = %self.fd,
                    size = info.size,
                    length = info.length,
                    avail = info.avail,
                    "info delivered"
                );
                Ok(0)
            }
        }
    }
}

impl embedded_io::ErrorType for OpenFile {
    type Error = DeviceError;
}

impl embedded_io::Read for OpenFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        OpenFile::read(self, buf)
    }
}

impl embedded_io::Write for OpenFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        OpenFile::write(self, buf)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// The device table plus the table of open handles
///
/// Every method takes `&self`; share the driver between threads with `Arc`.
pub struct Driver {
    table: DeviceTable,
    files: Mutex<HashMap<Fd, OpenFile>>,
    fd_gen: FdGen,
}

impl Driver {
    /// Build the device table described by `config`
    ///
    /// # Errors
    /// See [`DeviceTable::initialize`].
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        let table = DeviceTable::initialize(config)?;
        info!(
            devcnt = table.len(),
            fifo_size = config.fifo_size,
            write_policy = ?config.write_policy,
            "pchar driver loaded"
        );
        Ok(Self::with_table(table))
    }

    #[must_use]
    pub fn with_table(table: DeviceTable) -> Self {
        Self {
            table,
            files: Mutex::new(HashMap::new()),
            fd_gen: FdGen::new(),
        }
    }

    #[must_use]
    pub fn table(&self) -> &DeviceTable {
        &self.table
    }

    /// Open device `minor`
    ///
    /// # Errors
    /// `NotFound` if the minor does not exist.
    pub fn open(&self, minor: usize) -> Result<Fd> {
        let device = Arc::clone(self.table.resolve(minor)?);
        Ok(self.bind(device))
    }

    /// Open a device by node path (`/dev/pchar1` or `pchar1`)
    ///
    /// # Errors
    /// `NotFound` if the path names no device.
    pub fn open_path(&self, path: &str) -> Result<Fd> {
        let device = Arc::clone(self.table.resolve_path(path)?);
        Ok(self.bind(device))
    }

    fn bind(&self, device: Arc<PcharDevice>) -> Fd {
        let fd = self.fd_gen.get_next();
        debug!(fd = %fd, device = %device.name(), "open");
        let file = OpenFile {
            fd,
            device,
            interrupt: Interrupt::new(),
        };
        self.files.lock().insert(fd, file);
        fd
    }

    /// Release an open handle; buffered data is unaffected
    ///
    /// A call still running on the handle (e.g. a blocked write) keeps its
    /// device alive and completes normally.
    ///
    /// # Errors
    /// `BadHandle` if `fd` is not open.
    pub fn close(&self, fd: Fd) -> Result<()> {
        let file = self
            .files
            .lock()
            .remove(&fd)
            .ok_or(DeviceError::BadHandle(fd.id()))?;
        debug!(fd = %fd, device = %file.device.name(), "close");
        Ok(())
    }

    /// Clone of the open handle `fd`
    ///
    /// # Errors
    /// `BadHandle` if `fd` is not open.
    pub fn file(&self, fd: Fd) -> Result<OpenFile> {
        self.files
            .lock()
            .get(&fd)
            .cloned()
            .ok_or(DeviceError::BadHandle(fd.id()))
    }

    /// # Errors
    /// `BadHandle`, or see [`PcharDevice::read`].
    pub fn read(&self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        self.file(fd)?.read(buf)
    }

    /// May block; the handle table is not locked while blocked
    ///
    /// # Errors
    /// `BadHandle`, or see [`PcharDevice::write`].
    pub fn write(&self, fd: Fd, data: &[u8]) -> Result<usize> {
        self.file(fd)?.write(data)
    }

    /// # Errors
    /// `BadHandle`, or see [`PcharDevice::control`].
    pub fn control(&self, fd: Fd, request: ControlRequest) -> Result<ControlReply> {
        self.file(fd)?.control(request)
    }

    /// # Errors
    /// `BadHandle`, or see [`OpenFile::ioctl`].
    pub fn ioctl(&self, fd: Fd, cmd: u32, arg: IoctlArg<'_>) -> Result<i64> {
        self.file(fd)?.ioctl(cmd, arg)
    }

    /// Deliver an interruption to the session behind `fd`
    ///
    /// # Errors
    /// `BadHandle` if `fd` is not open.
    pub fn interrupt(&self, fd: Fd) -> Result<()> {
        let file = self.file(fd)?;
        debug!(fd = %fd, "interrupt raised");
        file.interrupt.raise();
        Ok(())
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.files.lock().len()
    }

    /// Drop every open handle and tear down the device table
    pub fn shutdown(self) {
        let Self { table, files, .. } = self;
        let open = files.into_inner().len();
        if open > 0 {
            debug!(open, "dropping open handles at shutdown");
        }
        table.teardown();
        info!("pchar driver unloaded");
    }
}
