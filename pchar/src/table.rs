//! DeviceTable - the fixed set of device instances
//!
//! Built once at start-up, addressed by minor number, torn down in reverse
//! minor order. Initialization is all-or-nothing: if device `k` cannot be
//! created, devices `k-1..0` are released (in that order) before the error
//! is returned.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::device::PcharDevice;
use crate::error::{DeviceError, Result};

/// Node-name prefix of every device, as in `/dev/pchar0`
pub const DEVICE_PREFIX: &str = "pchar";

/// Fixed-size collection of devices, one per minor number
pub struct DeviceTable {
    devices: Vec<Arc<PcharDevice>>,
}

impl DeviceTable {
    /// Create `config.devcnt` devices from `config`
    ///
    /// # Errors
    /// `InvalidArgument` for an invalid config, or the first device creation
    /// error (after unwinding).
    pub fn initialize(config: &DeviceConfig) -> Result<Self> {
        config.validate()?;
        Self::initialize_with(config.devcnt, |minor| {
            PcharDevice::new(minor, config).map(Arc::new)
        })
    }

    /// Create `count` devices with a custom constructor
    ///
    /// # Errors
    /// `InvalidArgument` for a zero count, or the first error returned by
    /// `create` (after unwinding the devices created so far).
    pub fn initialize_with<F>(count: usize, mut create: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<Arc<PcharDevice>>,
    {
        if count == 0 {
            return Err(DeviceError::InvalidArgument(
                "device count must be positive".into(),
            ));
        }

        let mut devices = Vec::with_capacity(count);
        for minor in 0..count {
            match create(minor) {
                Ok(device) => {
                    debug!(device = %device.name(), "device initialized");
                    devices.push(device);
                }
                Err(e) => {
                    warn!(minor, error = %e, "device init failed, unwinding");
                    release_in_reverse(&mut devices);
                    return Err(e);
                }
            }
        }

        info!(devcnt = count, "device table initialized");
        Ok(Self { devices })
    }

    /// Release every device, highest minor first
    pub fn teardown(mut self) {
        release_in_reverse(&mut self.devices);
        info!("device table torn down");
    }

    /// # Errors
    /// `NotFound` if `minor` is out of range.
    pub fn resolve(&self, minor: usize) -> Result<&Arc<PcharDevice>> {
        self.devices
            .get(minor)
            .ok_or_else(|| DeviceError::NotFound(format!("{DEVICE_PREFIX}{minor}")))
    }

    /// Resolve a node path such as `/dev/pchar2` or `pchar2`
    ///
    /// # Errors
    /// `NotFound` if the name is not a device node of this table.
    pub fn resolve_path(&self, path: &str) -> Result<&Arc<PcharDevice>> {
        let not_found = || DeviceError::NotFound(path.to_string());
        let name = path.strip_prefix("/dev/").unwrap_or(path);
        let digits = name.strip_prefix(DEVICE_PREFIX).ok_or_else(not_found)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(not_found());
        }
        let minor: usize = digits.parse().map_err(|_| not_found())?;
        self.resolve(minor).map_err(|_| not_found())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PcharDevice>> {
        self.devices.iter()
    }
}

impl Drop for DeviceTable {
    fn drop(&mut self) {
        release_in_reverse(&mut self.devices);
    }
}

impl std::fmt::Debug for DeviceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.devices.iter()).finish()
    }
}

fn release_in_reverse(devices: &mut Vec<Arc<PcharDevice>>) {
    while let Some(device) = devices.pop() {
        debug!(device = %device.name(), "releasing device");
        drop(device);
    }
}
