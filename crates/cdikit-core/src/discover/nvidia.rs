//! Per-scope discoverer compositions for NVIDIA devices.

use std::path::PathBuf;

use gpu_topology::{Device, MigDevice};
use tracing::debug;

use super::{
    host_path, CharDevices, DevelopmentSymlinks, Discoverer, EnvVars, LdCacheUpdate, Merge,
    Mounts, Symlinks, READ_ONLY_BIND,
};
use crate::config::GenerateConfig;
use crate::error::Result;
use crate::spec::{EnvVar, Hook};

/// Directories searched for driver libraries, in order.
pub const LIBRARY_SEARCH_DIRS: &[&str] = &[
    "/usr/lib64",
    "/usr/lib/x86_64-linux-gnu",
    "/usr/lib/aarch64-linux-gnu",
    "/lib64",
    "/lib/x86_64-linux-gnu",
    "/usr/lib",
];

/// Directories searched for driver binaries, in order.
pub const BINARY_SEARCH_DIRS: &[&str] = &["/usr/bin", "/usr/sbin", "/bin"];

const DRIVER_LIBRARIES: &[&str] = &[
    "libcuda.so",
    "libnvidia-ml.so",
    "libnvidia-ptxjitcompiler.so",
    "libnvidia-nvvm.so",
    "libnvidia-cfg.so",
    "libnvidia-opencl.so",
    "libnvidia-allocator.so",
    "libnvidia-gpucomp.so",
];

const DRIVER_BINARIES: &[&str] = &[
    "nvidia-smi",
    "nvidia-debugdump",
    "nvidia-persistenced",
    "nvidia-cuda-mps-control",
    "nvidia-cuda-mps-server",
];

const IPC_PATHS: &[&str] = &[
    "/var/run/nvidia-persistenced/socket",
    "/var/run/nvidia-fabricmanager/socket",
    "/tmp/nvidia-mps",
];

/// Edits for a whole device: its character device, its DRM nodes and the
/// `/dev/dri/by-path` links to them.
pub fn full_gpu(cfg: &GenerateConfig, device: &Device) -> Merge {
    let drm_nodes: Vec<String> = device
        .drm_nodes
        .iter()
        .map(|node| format!("/dev/dri/{node}"))
        .collect();

    Merge::default()
        .with(
            CharDevices::new(&cfg.dev_root)
                .required([format!("/dev/nvidia{}", device.minor)])
                .optional(drm_nodes),
        )
        .with(DrmByPathLinks {
            dev_root: cfg.dev_root.clone(),
            hook_path: cfg.hook_path.clone(),
            pci_bus_id: device.pci_bus_id.clone(),
            nodes: device.drm_nodes.clone(),
        })
}

/// Edits for one partition: the parent device and the partition's
/// capability nodes.
pub fn mig_device(cfg: &GenerateConfig, parent: &Device, mig: &MigDevice) -> Merge {
    Merge::default().with(CharDevices::new(&cfg.dev_root).required([
        format!("/dev/nvidia{}", parent.minor),
        format!("/dev/nvidia-caps/nvidia-cap{}", mig.gi_cap_minor),
        format!("/dev/nvidia-caps/nvidia-cap{}", mig.ci_cap_minor),
    ]))
}

/// Sockets and pipe directories of the host's driver daemons, when running.
pub fn ipc(cfg: &GenerateConfig) -> Merge {
    Merge::default().with(
        Mounts::new(&cfg.driver_root, READ_ONLY_BIND)
            .exact(IPC_PATHS.iter().copied())
            .optional(),
    )
}

/// Edits every container using any device needs: control nodes, driver
/// libraries and binaries, the hooks that make the libraries usable, and the
/// environment.
pub fn common(cfg: &GenerateConfig, driver_version: &str) -> Merge {
    let library_names: Vec<String> = DRIVER_LIBRARIES
        .iter()
        .map(|lib| format!("{lib}.{driver_version}"))
        .collect();
    let binary_names: Vec<String> = DRIVER_BINARIES.iter().map(|b| b.to_string()).collect();

    let libraries =
        Mounts::new(&cfg.driver_root, READ_ONLY_BIND).search(LIBRARY_SEARCH_DIRS, &library_names);
    let binaries =
        Mounts::new(&cfg.driver_root, READ_ONLY_BIND).search(BINARY_SEARCH_DIRS, &binary_names);

    Merge::default()
        .with(
            CharDevices::new(&cfg.dev_root)
                .required(["/dev/nvidiactl"])
                .optional(["/dev/nvidia-uvm", "/dev/nvidia-uvm-tools", "/dev/nvidia-modeset"]),
        )
        // Only the mount list reports missing libraries.
        .with(DevelopmentSymlinks::new(cfg.hook_path.as_str(), libraries.clone().optional()))
        .with(LdCacheUpdate::new(cfg.hook_path.as_str(), libraries.clone().optional()))
        .with(libraries)
        .with(binaries)
        .with(EnvVars(vec![EnvVar::new("NVIDIA_VISIBLE_DEVICES", "void")]))
}

/// `/dev/dri/by-path/pci-<bus>-{card,render}` links for the DRM nodes present
/// on the host.
struct DrmByPathLinks {
    dev_root: PathBuf,
    hook_path: String,
    pci_bus_id: String,
    nodes: Vec<String>,
}

impl Discoverer for DrmByPathLinks {
    fn hooks(&self) -> Result<Vec<Hook>> {
        let mut links = Symlinks::new(self.hook_path.as_str());
        for node in &self.nodes {
            let suffix = if node.starts_with("card") {
                "card"
            } else if node.starts_with("renderD") {
                "render"
            } else {
                continue;
            };
            if !host_path(&self.dev_root, &format!("/dev/dri/{node}")).exists() {
                debug!(node = %node, "DRM node not present; no by-path link");
                continue;
            }
            links = links.link(
                format!("../{node}"),
                format!("/dev/dri/by-path/pci-{}-{suffix}", self.pci_bus_id),
            );
        }
        links.hooks()
    }
}
