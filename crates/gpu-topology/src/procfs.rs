//! Topology backend reading the kernel driver's procfs tree and sysfs.
//!
//! Layout consumed, relative to the configured root:
//!
//! ```text
//! proc/driver/nvidia/version
//! proc/driver/nvidia/gpus/<bus-id>/information
//! proc/driver/nvidia/capabilities/gpu<minor>/mig/gi<N>/access
//! proc/driver/nvidia/capabilities/gpu<minor>/mig/gi<N>/ci<M>/access
//! sys/bus/pci/devices/<bus-id>/drm/{card*,renderD*}
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::device::{Device, DeviceLib, MigDevice};
use crate::{Result, TopologyError};

const DRIVER_PROC_DIR: &str = "proc/driver/nvidia";
const PCI_DEVICES_DIR: &str = "sys/bus/pci/devices";

/// `DeviceLib` backed by procfs and sysfs under `root`.
#[derive(Debug)]
pub struct ProcfsDeviceLib {
    root: PathBuf,
    initialized: bool,
}

impl ProcfsDeviceLib {
    /// Query the host (`/`).
    pub fn new() -> Self {
        Self::with_root("/")
    }

    /// Query a tree mounted at `root` (a driver container, or a test fixture).
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            initialized: false,
        }
    }

    fn driver_dir(&self) -> PathBuf {
        self.root.join(DRIVER_PROC_DIR)
    }

    fn mig_dir(&self, device: &Device) -> PathBuf {
        self.driver_dir()
            .join("capabilities")
            .join(format!("gpu{}", device.minor))
            .join("mig")
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(TopologyError::NotInitialized)
        }
    }

    fn read_device(&self, info_path: &Path, bus_id: &str) -> Result<Device> {
        let content =
            fs::read_to_string(info_path).map_err(|e| TopologyError::read(info_path, e))?;
        let fields = parse_key_values(&content);

        let field = |key: &str| {
            fields
                .get(key)
                .cloned()
                .ok_or_else(|| TopologyError::malformed(info_path, format!("missing {key:?}")))
        };

        let minor = field("Device Minor")?
            .parse::<u32>()
            .map_err(|e| TopologyError::malformed(info_path, format!("bad device minor: {e}")))?;

        Ok(Device {
            minor,
            uuid: field("GPU UUID")?,
            model: fields.get("Model").cloned().unwrap_or_default(),
            pci_bus_id: fields
                .get("Bus Location")
                .cloned()
                .unwrap_or_else(|| bus_id.to_string()),
            drm_nodes: self.drm_nodes(bus_id)?,
        })
    }

    fn drm_nodes(&self, bus_id: &str) -> Result<Vec<String>> {
        let drm_dir = self.root.join(PCI_DEVICES_DIR).join(bus_id).join("drm");
        if !drm_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut nodes: Vec<String> = dir_names(&drm_dir)?
            .into_iter()
            .filter(|n| n.starts_with("card") || n.starts_with("renderD"))
            .collect();
        nodes.sort();
        Ok(nodes)
    }
}

impl Default for ProcfsDeviceLib {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLib for ProcfsDeviceLib {
    fn init(&mut self) -> Result<()> {
        let gpus = self.driver_dir().join("gpus");
        if !gpus.is_dir() {
            return Err(TopologyError::DriverNotLoaded(gpus));
        }
        self.initialized = true;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.initialized = false;
        Ok(())
    }

    fn driver_version(&self) -> Result<String> {
        self.ensure_initialized()?;
        let path = self.driver_dir().join("version");
        let content = fs::read_to_string(&path).map_err(|e| TopologyError::read(&path, e))?;
        parse_driver_version(&content)
            .ok_or_else(|| TopologyError::malformed(&path, "no NVRM version line"))
    }

    fn devices(&self) -> Result<Vec<Device>> {
        self.ensure_initialized()?;
        let gpus = self.driver_dir().join("gpus");
        let mut bus_ids = dir_names(&gpus)?;
        // PCI bus order is the enumeration order.
        bus_ids.sort();

        let mut devices = Vec::with_capacity(bus_ids.len());
        for bus_id in bus_ids {
            let info = gpus.join(&bus_id).join("information");
            let device = self.read_device(&info, &bus_id)?;
            debug!(minor = device.minor, bus = %device.pci_bus_id, "found device");
            devices.push(device);
        }
        Ok(devices)
    }

    // MIG mode is inferred from existing gi* entries; see the trait docs.
    fn is_mig_enabled(&self, device: &Device) -> Result<bool> {
        self.ensure_initialized()?;
        let mig_dir = self.mig_dir(device);
        if !mig_dir.is_dir() {
            return Ok(false);
        }
        Ok(!indexed_entries(&mig_dir, "gi")?.is_empty())
    }

    fn mig_devices(&self, device: &Device) -> Result<Vec<MigDevice>> {
        self.ensure_initialized()?;
        let mig_dir = self.mig_dir(device);
        if !mig_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut migs = Vec::new();
        for (gi, gi_dir) in indexed_entries(&mig_dir, "gi")? {
            let gi_cap_minor = read_access_minor(&gi_dir.join("access"))?;
            for (ci, ci_dir) in indexed_entries(&gi_dir, "ci")? {
                migs.push(MigDevice {
                    gpu_instance: gi,
                    compute_instance: ci,
                    gi_cap_minor,
                    ci_cap_minor: read_access_minor(&ci_dir.join("access"))?,
                });
            }
        }
        Ok(migs)
    }
}

/// Parse `Key: value` lines; values are trimmed, later keys win.
fn parse_key_values(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Extract `535.104.05` from
/// `NVRM version: NVIDIA UNIX x86_64 Kernel Module  535.104.05  Sat Aug 19 ...`.
fn parse_driver_version(content: &str) -> Option<String> {
    let line = content.lines().find(|l| l.starts_with("NVRM version:"))?;
    line.split_whitespace()
        .find(|tok| {
            tok.contains('.')
                && tok.chars().next().is_some_and(|c| c.is_ascii_digit())
                && tok.chars().all(|c| c.is_ascii_digit() || c == '.')
        })
        .map(str::to_string)
}

fn read_access_minor(path: &Path) -> Result<u32> {
    let content = fs::read_to_string(path).map_err(|e| TopologyError::read(path, e))?;
    parse_key_values(&content)
        .get("DeviceFileMinor")
        .ok_or_else(|| TopologyError::malformed(path, "missing DeviceFileMinor"))?
        .parse::<u32>()
        .map_err(|e| TopologyError::malformed(path, format!("bad DeviceFileMinor: {e}")))
}

fn dir_names(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| TopologyError::read(dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| TopologyError::read(dir, e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Directories named `<prefix><N>` under `dir`, sorted numerically by `N`.
fn indexed_entries(dir: &Path, prefix: &str) -> Result<Vec<(u32, PathBuf)>> {
    let mut entries: Vec<(u32, PathBuf)> = dir_names(dir)?
        .into_iter()
        .filter_map(|name| {
            let index = name.strip_prefix(prefix)?.parse::<u32>().ok()?;
            let path = dir.join(&name);
            path.is_dir().then_some((index, path))
        })
        .collect();
    entries.sort_by_key(|(index, _)| *index);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_driver_version() {
        let content = "NVRM version: NVIDIA UNIX x86_64 Kernel Module  535.104.05  Sat Aug 19 01:15:15 UTC 2023\nGCC version:  gcc version 12.2.0\n";
        assert_eq!(parse_driver_version(content).as_deref(), Some("535.104.05"));
    }

    #[test]
    fn test_parse_driver_version_missing_line() {
        assert_eq!(parse_driver_version("GCC version: 12.2.0\n"), None);
    }

    #[test]
    fn test_parse_key_values_trims_tabs() {
        let fields = parse_key_values("Model: \t\t NVIDIA A100\nDevice Minor: \t 3\n");
        assert_eq!(fields.get("Model").map(String::as_str), Some("NVIDIA A100"));
        assert_eq!(fields.get("Device Minor").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_queries_require_init() {
        let dir = tempfile::tempdir().unwrap();
        let lib = ProcfsDeviceLib::with_root(dir.path());
        assert!(matches!(lib.devices(), Err(TopologyError::NotInitialized)));
    }

    #[test]
    fn test_init_fails_without_driver() {
        let dir = tempfile::tempdir().unwrap();
        let mut lib = ProcfsDeviceLib::with_root(dir.path());
        assert!(matches!(lib.init(), Err(TopologyError::DriverNotLoaded(_))));
    }
}
