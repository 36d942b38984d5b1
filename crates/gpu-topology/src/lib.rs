//! GPU-Topology: Read-only accelerator topology queries for cdikit
//!
//! This crate is the hardware-query boundary of cdikit. Spec generation only
//! ever talks to the [`DeviceLib`] trait, through a scoped [`Session`] that is
//! opened once per generation run and always shut down when dropped.
//!
//! ## Key Components
//!
//! - `DeviceLib`: enumerate physical devices, their partition (MIG) mode and
//!   their partitions
//! - `Session`: RAII guard around an initialised `DeviceLib`
//! - `ProcfsDeviceLib`: implementation backed by the driver's procfs entries
//!   and sysfs
//! - `fakes::StaticDeviceLib`: in-memory topology for tests

mod device;
mod error;
pub mod fakes;
mod procfs;
mod session;

pub use device::{Device, DeviceLib, MigDevice};
pub use error::TopologyError;
pub use procfs::ProcfsDeviceLib;
pub use session::Session;

/// Result type for topology queries
pub type Result<T> = std::result::Result<T, TopologyError>;
