//! Discoverers: composable producers of container edits.
//!
//! A [`Discoverer`] exposes up to four independent capabilities (device
//! nodes, mounts, hooks, environment variables). Each accessor computes its
//! result when called and may be called any number of times; discovery only
//! reads host state. Narrow discoverers are combined with [`Merge`].

mod char_devices;
mod hooks;
mod mounts;
pub mod nvidia;

use std::path::{Path, PathBuf};

pub use char_devices::CharDevices;
pub use hooks::{DevelopmentSymlinks, DeviceFolderPermissions, LdCacheUpdate, Symlinks};
pub use mounts::{Mounts, READ_ONLY_BIND};

use crate::error::Result;
use crate::spec::{DeviceNode, EnvVar, Hook, Mount};

/// A read-only producer of container edits.
///
/// Every accessor defaults to an empty result, so implementations only
/// provide the capabilities they have.
pub trait Discoverer {
    fn devices(&self) -> Result<Vec<DeviceNode>> {
        Ok(Vec::new())
    }

    fn mounts(&self) -> Result<Vec<Mount>> {
        Ok(Vec::new())
    }

    fn hooks(&self) -> Result<Vec<Hook>> {
        Ok(Vec::new())
    }

    fn env_vars(&self) -> Result<Vec<EnvVar>> {
        Ok(Vec::new())
    }
}

impl<D: Discoverer + ?Sized> Discoverer for Box<D> {
    fn devices(&self) -> Result<Vec<DeviceNode>> {
        (**self).devices()
    }

    fn mounts(&self) -> Result<Vec<Mount>> {
        (**self).mounts()
    }

    fn hooks(&self) -> Result<Vec<Hook>> {
        (**self).hooks()
    }

    fn env_vars(&self) -> Result<Vec<EnvVar>> {
        (**self).env_vars()
    }
}

/// The discoverer that finds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Empty;

impl Discoverer for Empty {}

/// Concatenation of several discoverers, in order.
///
/// Each accessor stops at the first constituent that fails and returns that
/// error; later constituents are not consulted for that accessor.
#[derive(Default)]
pub struct Merge {
    discoverers: Vec<Box<dyn Discoverer>>,
}

impl Merge {
    pub fn new(discoverers: Vec<Box<dyn Discoverer>>) -> Self {
        Self { discoverers }
    }

    /// Append a constituent.
    pub fn with(mut self, discoverer: impl Discoverer + 'static) -> Self {
        self.discoverers.push(Box::new(discoverer));
        self
    }

    fn collect<T>(&self, accessor: impl Fn(&dyn Discoverer) -> Result<Vec<T>>) -> Result<Vec<T>> {
        let mut all = Vec::new();
        for discoverer in &self.discoverers {
            all.extend(accessor(discoverer.as_ref())?);
        }
        Ok(all)
    }
}

impl Discoverer for Merge {
    fn devices(&self) -> Result<Vec<DeviceNode>> {
        self.collect(|d| d.devices())
    }

    fn mounts(&self) -> Result<Vec<Mount>> {
        self.collect(|d| d.mounts())
    }

    fn hooks(&self) -> Result<Vec<Hook>> {
        self.collect(|d| d.hooks())
    }

    fn env_vars(&self) -> Result<Vec<EnvVar>> {
        self.collect(|d| d.env_vars())
    }
}

/// A fixed list of environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvVars(pub Vec<EnvVar>);

impl Discoverer for EnvVars {
    fn env_vars(&self) -> Result<Vec<EnvVar>> {
        Ok(self.0.clone())
    }
}

/// Host location of `container_path` under `root`.
pub(crate) fn host_path(root: &Path, container_path: &str) -> PathBuf {
    root.join(container_path.trim_start_matches('/'))
}

/// Parent directory of an absolute container path (`/` for top-level entries).
pub(crate) fn parent_dir(container_path: &str) -> &str {
    match container_path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &container_path[..i],
    }
}
