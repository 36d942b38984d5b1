//! The container-edits accumulator.
//!
//! [`ContainerEdits::from_discoverer`] materializes a discoverer and applies
//! the deduplication rules while entries are added:
//!
//! - device nodes: first entry per `(host_path, path)` wins
//! - mounts: one entry per `(host_path, container_path)`, options unioned in
//!   first-seen order
//! - env: last value per key wins, first-seen key order kept
//! - hooks: kept in discovery order, never deduplicated
//!
//! [`ContainerEdits::append`] concatenates and does not deduplicate across
//! documents.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::discover::Discoverer;
use crate::error::{Error, Result};
use crate::spec::{DeviceNode, EnvVar, Hook, Mount};

/// Modifications to apply to a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerEdits {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_nodes: Vec<DeviceNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<Hook>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
}

impl ContainerEdits {
    /// Materialize every accessor of `discoverer` into one document.
    ///
    /// Fails on the first discovery error, or on a malformed entity.
    pub fn from_discoverer<D: Discoverer + ?Sized>(discoverer: &D) -> Result<Self> {
        let mut edits = ContainerEdits::default();

        for node in discoverer.devices()? {
            edits.add_device_node(node)?;
        }
        for mount in discoverer.mounts()? {
            edits.add_mount(mount)?;
        }
        for hook in discoverer.hooks()? {
            edits.add_hook(hook)?;
        }
        for env in discoverer.env_vars()? {
            edits.add_env(env)?;
        }

        Ok(edits)
    }

    /// Place `other`'s entries after this document's entries.
    ///
    /// Takes `other` by value; no cross-document deduplication.
    pub fn append(&mut self, other: ContainerEdits) {
        self.env.extend(other.env);
        self.device_nodes.extend(other.device_nodes);
        self.hooks.extend(other.hooks);
        self.mounts.extend(other.mounts);
    }

    pub fn is_empty(&self) -> bool {
        self.env.is_empty()
            && self.device_nodes.is_empty()
            && self.hooks.is_empty()
            && self.mounts.is_empty()
    }

    fn add_device_node(&mut self, node: DeviceNode) -> Result<()> {
        check_container_path("device node", &node.path)?;
        check_host_path("device node", &node.host_path)?;

        if self.device_nodes.iter().any(|n| n.identity() == node.identity()) {
            debug!(path = %node.path, "skipping duplicate device node");
            return Ok(());
        }
        self.device_nodes.push(node);
        Ok(())
    }

    fn add_mount(&mut self, mount: Mount) -> Result<()> {
        check_container_path("mount", &mount.container_path)?;
        check_host_path("mount", &mount.host_path)?;

        match self
            .mounts
            .iter_mut()
            .find(|m| m.identity() == mount.identity())
        {
            Some(existing) => {
                for option in mount.options {
                    existing.add_option(option);
                }
            }
            None => {
                let mut deduped = Mount::new(mount.host_path, mount.container_path, &[]);
                for option in mount.options {
                    deduped.add_option(option);
                }
                self.mounts.push(deduped);
            }
        }
        Ok(())
    }

    fn add_hook(&mut self, hook: Hook) -> Result<()> {
        if hook.path.is_empty() {
            return Err(Error::Composition(format!(
                "{} hook with empty executable path",
                hook.operation
            )));
        }
        self.hooks.push(hook);
        Ok(())
    }

    fn add_env(&mut self, env: EnvVar) -> Result<()> {
        env.validate()?;
        match self.env.iter_mut().find(|e| e.key == env.key) {
            Some(existing) => existing.value = env.value,
            None => self.env.push(env),
        }
        Ok(())
    }
}

fn check_container_path(entity: &str, path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(Error::Composition(format!(
            "{entity} container path {path:?} is not absolute"
        )));
    }
    Ok(())
}

fn check_host_path(entity: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::Composition(format!("{entity} with empty host path")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::HookOperation;

    #[derive(Default)]
    struct Fixed {
        devices: Vec<DeviceNode>,
        mounts: Vec<Mount>,
        hooks: Vec<Hook>,
        env: Vec<EnvVar>,
    }

    impl Discoverer for Fixed {
        fn devices(&self) -> Result<Vec<DeviceNode>> {
            Ok(self.devices.clone())
        }
        fn mounts(&self) -> Result<Vec<Mount>> {
            Ok(self.mounts.clone())
        }
        fn hooks(&self) -> Result<Vec<Hook>> {
            Ok(self.hooks.clone())
        }
        fn env_vars(&self) -> Result<Vec<EnvVar>> {
            Ok(self.env.clone())
        }
    }

    fn chmod(path: &str) -> Hook {
        Hook::create_container(
            "/usr/bin/cdikit-hook",
            HookOperation::Chmod,
            vec!["--mode".into(), "755".into(), "--path".into(), path.into()],
        )
    }

    #[test]
    fn test_duplicate_device_nodes_keep_first() {
        let mut first = DeviceNode::new("/dev/nvidia0", "/dev/nvidia0");
        first.permissions = Some("rw".to_string());
        let d = Fixed {
            devices: vec![
                first.clone(),
                DeviceNode::new("/dev/nvidia0", "/dev/nvidia0"),
                DeviceNode::new("/dev/nvidiactl", "/dev/nvidiactl"),
            ],
            ..Fixed::default()
        };
        let edits = ContainerEdits::from_discoverer(&d).unwrap();
        assert_eq!(edits.device_nodes.len(), 2);
        assert_eq!(edits.device_nodes[0], first);
    }

    #[test]
    fn test_same_host_path_different_container_path_is_distinct() {
        let d = Fixed {
            devices: vec![
                DeviceNode::new("/dev/nvidia0", "/dev/nvidia0"),
                DeviceNode::new("/dev/gpu0", "/dev/nvidia0"),
            ],
            ..Fixed::default()
        };
        let edits = ContainerEdits::from_discoverer(&d).unwrap();
        assert_eq!(edits.device_nodes.len(), 2);
    }

    #[test]
    fn test_duplicate_mounts_union_options() {
        let d = Fixed {
            mounts: vec![
                Mount::new("/run/a", "/run/a", &["ro", "bind"]),
                Mount::new("/run/b", "/run/b", &["ro"]),
                Mount::new("/run/a", "/run/a", &["bind", "nosuid", "ro"]),
            ],
            ..Fixed::default()
        };
        let edits = ContainerEdits::from_discoverer(&d).unwrap();
        assert_eq!(edits.mounts.len(), 2);
        assert_eq!(edits.mounts[0].options, vec!["ro", "bind", "nosuid"]);
        assert_eq!(edits.mounts[1].container_path, "/run/b");
    }

    #[test]
    fn test_env_last_writer_wins_first_order_kept() {
        let d = Fixed {
            env: vec![
                EnvVar::new("A", "1"),
                EnvVar::new("B", "2"),
                EnvVar::new("A", "3"),
            ],
            ..Fixed::default()
        };
        let edits = ContainerEdits::from_discoverer(&d).unwrap();
        assert_eq!(edits.env, vec![EnvVar::new("A", "3"), EnvVar::new("B", "2")]);
    }

    #[test]
    fn test_hooks_never_deduplicated() {
        let d = Fixed {
            hooks: vec![chmod("/dev/dri"), chmod("/dev/dri")],
            ..Fixed::default()
        };
        let edits = ContainerEdits::from_discoverer(&d).unwrap();
        assert_eq!(edits.hooks.len(), 2);
    }

    #[test]
    fn test_relative_container_path_rejected() {
        let d = Fixed {
            devices: vec![DeviceNode::new("dev/nvidia0", "/dev/nvidia0")],
            ..Fixed::default()
        };
        let err = ContainerEdits::from_discoverer(&d).unwrap_err();
        assert!(matches!(err, Error::Composition(_)));
    }

    #[test]
    fn test_empty_host_path_rejected() {
        let d = Fixed {
            mounts: vec![Mount::new("", "/usr/lib64/libcuda.so.1", &["ro"])],
            ..Fixed::default()
        };
        assert!(ContainerEdits::from_discoverer(&d).is_err());
    }

    #[test]
    fn test_append_keeps_order_without_cross_dedup() {
        let node = DeviceNode::new("/dev/nvidiactl", "/dev/nvidiactl");
        let mut a = ContainerEdits {
            device_nodes: vec![DeviceNode::new("/dev/nvidia0", "/dev/nvidia0"), node.clone()],
            env: vec![EnvVar::new("A", "1")],
            ..ContainerEdits::default()
        };
        let b = ContainerEdits {
            device_nodes: vec![node.clone(), DeviceNode::new("/dev/nvidia1", "/dev/nvidia1")],
            env: vec![EnvVar::new("A", "2")],
            ..ContainerEdits::default()
        };

        a.append(b);

        let paths: Vec<_> = a.device_nodes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/dev/nvidia0", "/dev/nvidiactl", "/dev/nvidiactl", "/dev/nvidia1"]
        );
        assert_eq!(a.env, vec![EnvVar::new("A", "1"), EnvVar::new("A", "2")]);
    }

    #[test]
    fn test_append_is_associative() {
        let doc = |path: &str| ContainerEdits {
            device_nodes: vec![DeviceNode::new(path, path)],
            hooks: vec![chmod(path)],
            ..ContainerEdits::default()
        };
        let (a, b, c) = (doc("/dev/a"), doc("/dev/b"), doc("/dev/c"));

        let mut left = a.clone();
        left.append(b.clone());
        left.append(c.clone());

        let mut bc = b;
        bc.append(c);
        let mut right = a;
        right.append(bc);

        assert_eq!(left, right);
    }

    #[test]
    fn test_empty_document_serializes_to_empty_map() {
        let value = serde_json::to_value(ContainerEdits::default()).unwrap();
        assert_eq!(value, serde_json::json!({}));
    }
}
