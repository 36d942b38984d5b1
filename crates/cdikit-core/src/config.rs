//! Generation settings shared by the discoverers and the assembler.

use std::path::PathBuf;

/// Default location of the hook executable referenced by generated hooks.
pub const DEFAULT_HOOK_PATH: &str = "/usr/bin/cdikit-hook";

/// Settings for one generation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateConfig {
    /// Root under which driver libraries, binaries and IPC sockets are
    /// located on the host.
    pub driver_root: PathBuf,
    /// Root under which `/dev` is located on the host.
    pub dev_root: PathBuf,
    /// Hook executable written into every generated hook.
    pub hook_path: String,
    pub vendor: String,
    pub class: String,
}

impl GenerateConfig {
    /// The spec kind, `<vendor>/<class>`.
    pub fn kind(&self) -> String {
        format!("{}/{}", self.vendor, self.class)
    }
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            driver_root: PathBuf::from("/"),
            dev_root: PathBuf::from("/"),
            hook_path: DEFAULT_HOOK_PATH.to_string(),
            vendor: "nvidia.com".to_string(),
            class: "gpu".to_string(),
        }
    }
}
