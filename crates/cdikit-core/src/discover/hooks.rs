//! Discoverers that yield hook invocations.

use super::{parent_dir, Discoverer, Mounts};
use crate::error::Result;
use crate::spec::{DeviceSpec, Hook, HookOperation};

/// One `create-symlinks` hook for a list of `(target, link)` pairs.
#[derive(Debug, Clone)]
pub struct Symlinks {
    hook_path: String,
    links: Vec<(String, String)>,
}

impl Symlinks {
    pub fn new(hook_path: impl Into<String>) -> Self {
        Self {
            hook_path: hook_path.into(),
            links: Vec::new(),
        }
    }

    /// Add a link at `link` pointing to `target`.
    pub fn link(mut self, target: impl Into<String>, link: impl Into<String>) -> Self {
        self.links.push((target.into(), link.into()));
        self
    }
}

impl Discoverer for Symlinks {
    fn hooks(&self) -> Result<Vec<Hook>> {
        if self.links.is_empty() {
            return Ok(Vec::new());
        }
        let args = self
            .links
            .iter()
            .flat_map(|(target, link)| ["--link".to_string(), format!("{target}::{link}")])
            .collect();
        Ok(vec![Hook::create_container(
            self.hook_path.as_str(),
            HookOperation::CreateSymlinks,
            args,
        )])
    }
}

/// One `update-ldcache` hook covering the folders of the located libraries.
#[derive(Debug, Clone)]
pub struct LdCacheUpdate {
    hook_path: String,
    libraries: Mounts,
}

impl LdCacheUpdate {
    pub fn new(hook_path: impl Into<String>, libraries: Mounts) -> Self {
        Self {
            hook_path: hook_path.into(),
            libraries,
        }
    }
}

impl Discoverer for LdCacheUpdate {
    fn hooks(&self) -> Result<Vec<Hook>> {
        let mut folders: Vec<String> = Vec::new();
        for mount in self.libraries.mounts()? {
            let dir = parent_dir(&mount.container_path);
            if !folders.iter().any(|f| f == dir) {
                folders.push(dir.to_string());
            }
        }
        if folders.is_empty() {
            return Ok(Vec::new());
        }

        let args = folders
            .into_iter()
            .flat_map(|f| ["--folder".to_string(), f])
            .collect();
        Ok(vec![Hook::create_container(
            self.hook_path.as_str(),
            HookOperation::UpdateLdcache,
            args,
        )])
    }
}

/// The `libcuda.so -> libcuda.so.1` link development toolchains expect next
/// to the versioned driver library.
#[derive(Debug, Clone)]
pub struct DevelopmentSymlinks {
    hook_path: String,
    libraries: Mounts,
}

impl DevelopmentSymlinks {
    pub fn new(hook_path: impl Into<String>, libraries: Mounts) -> Self {
        Self {
            hook_path: hook_path.into(),
            libraries,
        }
    }
}

impl Discoverer for DevelopmentSymlinks {
    fn hooks(&self) -> Result<Vec<Hook>> {
        let mut symlinks = Symlinks::new(self.hook_path.as_str());
        for mount in self.libraries.mounts()? {
            let path = mount.container_path.as_str();
            let file_name = path.rsplit('/').next().unwrap_or(path);
            if file_name.starts_with("libcuda.so.") {
                symlinks = symlinks.link("libcuda.so.1", format!("{}/libcuda.so", parent_dir(path)));
            }
        }
        symlinks.hooks()
    }
}

/// A `chmod 755` hook for the directories below `/dev` holding device nodes.
///
/// Runtimes create intermediate directories such as `/dev/dri` with
/// restrictive modes; the hook opens them up so the nodes are reachable.
#[derive(Debug, Clone)]
pub struct DeviceFolderPermissions {
    hook_path: String,
    folders: Vec<String>,
}

impl DeviceFolderPermissions {
    pub fn from_device_specs(hook_path: impl Into<String>, devices: &[DeviceSpec]) -> Self {
        let mut folders: Vec<String> = Vec::new();
        let nodes = devices.iter().flat_map(|d| &d.container_edits.device_nodes);
        for node in nodes {
            let dir = parent_dir(&node.path);
            if dir.starts_with("/dev/") && !folders.iter().any(|f| f == dir) {
                folders.push(dir.to_string());
            }
        }
        Self {
            hook_path: hook_path.into(),
            folders,
        }
    }
}

impl Discoverer for DeviceFolderPermissions {
    fn hooks(&self) -> Result<Vec<Hook>> {
        if self.folders.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = vec!["--mode".to_string(), "755".to_string()];
        for folder in &self.folders {
            args.push("--path".to_string());
            args.push(folder.clone());
        }
        Ok(vec![Hook::create_container(
            self.hook_path.as_str(),
            HookOperation::Chmod,
            args,
        )])
    }
}
