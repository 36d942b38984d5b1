//! Device model and the query interface implemented by topology backends.

use crate::Result;

/// A physical accelerator as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Minor number of the `/dev/nvidia<minor>` character device.
    pub minor: u32,
    pub uuid: String,
    pub model: String,
    /// PCI bus location, e.g. `0000:3b:00.0`.
    pub pci_bus_id: String,
    /// DRM node names bound to this device (`card1`, `renderD128`), sorted.
    pub drm_nodes: Vec<String>,
}

/// A partition (MIG device) of a physical accelerator: one compute instance
/// inside one GPU instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigDevice {
    pub gpu_instance: u32,
    pub compute_instance: u32,
    /// Minor of `/dev/nvidia-caps/nvidia-cap<minor>` granting the GPU instance.
    pub gi_cap_minor: u32,
    /// Minor of `/dev/nvidia-caps/nvidia-cap<minor>` granting the compute instance.
    pub ci_cap_minor: u32,
}

/// Read-only query interface over the device topology.
///
/// Queries are only valid between a successful [`init`](DeviceLib::init) and
/// the matching [`shutdown`](DeviceLib::shutdown); use [`crate::Session`]
/// rather than calling these two directly.
pub trait DeviceLib {
    /// Acquire the backend. Failure is fatal to the caller.
    fn init(&mut self) -> Result<()>;

    /// Release the backend.
    fn shutdown(&mut self) -> Result<()>;

    /// Version string of the loaded kernel driver.
    fn driver_version(&self) -> Result<String>;

    /// All physical devices, in a stable enumeration order.
    fn devices(&self) -> Result<Vec<Device>>;

    /// Whether `device` is operating in partitioned (MIG) mode.
    ///
    /// Backends with access to the driver's mode flag should report it here.
    /// [`ProcfsDeviceLib`](crate::ProcfsDeviceLib) only sees the capability
    /// tree and reports `false` for a device in MIG mode that has no GPU
    /// instances yet, so such a device is treated as a whole GPU.
    fn is_mig_enabled(&self, device: &Device) -> Result<bool>;

    /// The partitions of `device`, in a stable enumeration order.
    fn mig_devices(&self, device: &Device) -> Result<Vec<MigDevice>>;
}
