//! In-memory topology (testing only)
//!
//! Provides `StaticDeviceLib`, a `DeviceLib` over a fixed device list that
//! records how often it was initialised and shut down, plus fixture helpers
//! for devices and partitions.

use crate::device::{Device, DeviceLib, MigDevice};
use crate::{Result, TopologyError};

#[derive(Debug, Clone)]
struct FakeDevice {
    device: Device,
    mig_enabled: bool,
    migs: Vec<MigDevice>,
}

/// Fixed, in-memory device topology.
#[derive(Debug, Default)]
pub struct StaticDeviceLib {
    driver_version: String,
    devices: Vec<FakeDevice>,
    fail_init: bool,
    fail_devices: bool,
    initialized: bool,
    pub init_calls: usize,
    pub shutdown_calls: usize,
}

impl StaticDeviceLib {
    pub fn new(driver_version: impl Into<String>) -> Self {
        Self {
            driver_version: driver_version.into(),
            ..Self::default()
        }
    }

    /// Add a device operating as a whole device.
    pub fn with_device(mut self, device: Device) -> Self {
        self.devices.push(FakeDevice {
            device,
            mig_enabled: false,
            migs: Vec::new(),
        });
        self
    }

    /// Add a device in partition mode with the given partitions.
    pub fn with_mig_device(mut self, device: Device, migs: Vec<MigDevice>) -> Self {
        self.devices.push(FakeDevice {
            device,
            mig_enabled: true,
            migs,
        });
        self
    }

    /// Make `init` fail.
    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Make device enumeration fail after a successful `init`.
    pub fn failing_devices(mut self) -> Self {
        self.fail_devices = true;
        self
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(TopologyError::NotInitialized)
        }
    }

    fn find(&self, device: &Device) -> Result<&FakeDevice> {
        self.devices
            .iter()
            .find(|d| d.device.uuid == device.uuid)
            .ok_or_else(|| TopologyError::Query(format!("unknown device {}", device.uuid)))
    }
}

impl DeviceLib for StaticDeviceLib {
    fn init(&mut self) -> Result<()> {
        self.init_calls += 1;
        if self.fail_init {
            return Err(TopologyError::InitFailed("injected failure".to_string()));
        }
        self.initialized = true;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.shutdown_calls += 1;
        self.initialized = false;
        Ok(())
    }

    fn driver_version(&self) -> Result<String> {
        self.ensure_initialized()?;
        Ok(self.driver_version.clone())
    }

    fn devices(&self) -> Result<Vec<Device>> {
        self.ensure_initialized()?;
        if self.fail_devices {
            return Err(TopologyError::Query("injected enumeration failure".to_string()));
        }
        Ok(self.devices.iter().map(|d| d.device.clone()).collect())
    }

    fn is_mig_enabled(&self, device: &Device) -> Result<bool> {
        self.ensure_initialized()?;
        Ok(self.find(device)?.mig_enabled)
    }

    fn mig_devices(&self, device: &Device) -> Result<Vec<MigDevice>> {
        self.ensure_initialized()?;
        Ok(self.find(device)?.migs.clone())
    }
}

/// A device fixture keyed by its minor number.
///
/// Bus id, UUID and DRM nodes are derived from `minor` so fixtures with
/// different minors never collide.
pub fn device(minor: u32) -> Device {
    Device {
        minor,
        uuid: format!("GPU-00000000-0000-0000-0000-{:012}", minor),
        model: "NVIDIA A100-SXM4-40GB".to_string(),
        pci_bus_id: format!("0000:{:02x}:00.0", minor + 1),
        drm_nodes: vec![format!("card{}", minor + 1), format!("renderD{}", 128 + minor)],
    }
}

/// A partition fixture.
pub fn mig(gpu_instance: u32, compute_instance: u32, gi_cap_minor: u32, ci_cap_minor: u32) -> MigDevice {
    MigDevice {
        gpu_instance,
        compute_instance,
        gi_cap_minor,
        ci_cap_minor,
    }
}
