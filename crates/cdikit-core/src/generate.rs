//! Two-phase spec assembly.
//!
//! Phase 1 walks the device topology and builds one entry per whole device
//! (`gpu<i>`) and per partition (`mig<i>:<j>`), then folds them into `all`.
//! Phase 2 builds the host-scoped edits (IPC mounts, common driver files and
//! the device-folder permission hook derived from phase 1).

use gpu_topology::{DeviceLib, Session};
use tracing::{debug, info};

use crate::config::GenerateConfig;
use crate::discover::{nvidia, DeviceFolderPermissions, Merge};
use crate::edits::ContainerEdits;
use crate::error::{Error, Result};
use crate::spec::{DeviceSpec, Spec, ALL_DEVICE, SPEC_VERSION};

/// Generate a complete spec for the devices reported by `lib`.
///
/// The device library is initialised once and shut down before returning,
/// on success and on failure alike.
pub fn generate_spec<L: DeviceLib + ?Sized>(lib: &mut L, cfg: &GenerateConfig) -> Result<Spec> {
    let session = Session::open(lib).map_err(|e| Error::from(e).context("failed to open device library"))?;

    let driver_version = session
        .driver_version()
        .map_err(|e| Error::from(e).context("failed to get driver version"))?;
    debug!(driver_version = %driver_version, "driver detected");

    let mut devices = device_specs(&session, cfg)?;
    let container_edits = common_edits(cfg, &driver_version, &devices)?;
    devices.push(all_device(&devices));

    let spec = Spec {
        version: SPEC_VERSION.to_string(),
        kind: cfg.kind(),
        devices,
        container_edits,
    };
    spec.validate()?;

    info!(
        kind = %spec.kind,
        devices = spec.devices.len(),
        "generated CDI spec"
    );
    Ok(spec)
}

/// The aggregate device: every entry's edits appended in order.
pub fn all_device(devices: &[DeviceSpec]) -> DeviceSpec {
    let mut edits = ContainerEdits::default();
    for device in devices {
        edits.append(device.container_edits.clone());
    }
    DeviceSpec::new(ALL_DEVICE, edits)
}

fn device_specs<L: DeviceLib + ?Sized>(
    session: &Session<'_, L>,
    cfg: &GenerateConfig,
) -> Result<Vec<DeviceSpec>> {
    let mut specs = Vec::new();

    session
        .visit_devices(|i, device| -> Result<()> {
            let name = format!("gpu{i}");
            let mig_enabled = session
                .is_mig_enabled(device)
                .map_err(|e| Error::from(e).context(format!("failed to check MIG mode of {name}")))?;
            if mig_enabled {
                debug!(device = %name, "MIG mode enabled; exposing partitions only");
                return Ok(());
            }

            let edits = ContainerEdits::from_discoverer(&nvidia::full_gpu(cfg, device))
                .map_err(|e| e.context(format!("failed to create container edits for device {name}")))?;
            specs.push(DeviceSpec::new(name, edits));
            Ok(())
        })
        .map_err(|e| e.context("failed to enumerate devices"))?;

    session
        .visit_mig_devices(|i, parent, j, mig| -> Result<()> {
            let name = format!("mig{i}:{j}");
            let edits = ContainerEdits::from_discoverer(&nvidia::mig_device(cfg, parent, mig))
                .map_err(|e| e.context(format!("failed to create container edits for device {name}")))?;
            specs.push(DeviceSpec::new(name, edits));
            Ok(())
        })
        .map_err(|e| e.context("failed to enumerate MIG devices"))?;

    Ok(specs)
}

fn common_edits(
    cfg: &GenerateConfig,
    driver_version: &str,
    devices: &[DeviceSpec],
) -> Result<ContainerEdits> {
    let mut edits = ContainerEdits::from_discoverer(&nvidia::ipc(cfg))
        .map_err(|e| e.context("failed to create container edits for IPC"))?;
    for mount in &mut edits.mounts {
        mount.add_option("noexec");
    }

    let common = Merge::default()
        .with(nvidia::common(cfg, driver_version))
        .with(DeviceFolderPermissions::from_device_specs(
            cfg.hook_path.as_str(),
            devices,
        ));
    let common = ContainerEdits::from_discoverer(&common)
        .map_err(|e| e.context("failed to create common container edits"))?;

    edits.append(common);
    Ok(edits)
}
