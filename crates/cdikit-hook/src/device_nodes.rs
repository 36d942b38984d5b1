//! `create-device-nodes`: create character or block device nodes inside the
//! container.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info};

use crate::container::ContainerRoot;
use crate::error::HookError;
use crate::Result;

const DEFAULT_NODE_MODE: u32 = 0o666;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Char,
    Block,
}

impl NodeKind {
    fn file_type_bits(self) -> libc::mode_t {
        match self {
            NodeKind::Char => libc::S_IFCHR,
            NodeKind::Block => libc::S_IFBLK,
        }
    }
}

/// A `<path>:<c|b>:<major>:<minor>[:<octal-mode>]` node description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub path: String,
    pub kind: NodeKind,
    pub major: u32,
    pub minor: u32,
    pub mode: u32,
}

impl NodeSpec {
    fn rdev(&self) -> libc::dev_t {
        libc::makedev(self.major, self.minor)
    }
}

impl FromStr for NodeSpec {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            HookError::InvalidArgument(format!(
                "invalid device node {s:?}: {reason}; expected <path>:<c|b>:<major>:<minor>[:<mode>]"
            ))
        };

        let fields: Vec<&str> = s.split(':').collect();
        if !(4..=5).contains(&fields.len()) {
            return Err(invalid("wrong number of fields"));
        }
        if fields[0].is_empty() {
            return Err(invalid("empty path"));
        }
        let kind = match fields[1] {
            "c" => NodeKind::Char,
            "b" => NodeKind::Block,
            _ => return Err(invalid("type must be c or b")),
        };
        let major = fields[2].parse().map_err(|_| invalid("bad major number"))?;
        let minor = fields[3].parse().map_err(|_| invalid("bad minor number"))?;
        let mode = match fields.get(4) {
            Some(mode) => crate::parse_mode(mode).map_err(|e| invalid(&e))?,
            None => DEFAULT_NODE_MODE,
        };

        Ok(NodeSpec {
            path: fields[0].to_string(),
            kind,
            major,
            minor,
            mode,
        })
    }
}

/// Create every node in `nodes` under `root`.
pub fn create_device_nodes(root: &ContainerRoot, nodes: &[NodeSpec]) -> Result<()> {
    for node in nodes {
        let path = root.resolve_entry(&node.path)?;
        create_device_node(node, &path)?;
    }
    Ok(())
}

fn create_device_node(node: &NodeSpec, path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) => {
            let file_type = meta.file_type();
            let same_kind = match node.kind {
                NodeKind::Char => file_type.is_char_device(),
                NodeKind::Block => file_type.is_block_device(),
            };
            if same_kind && meta.rdev() == node.rdev() as u64 {
                debug!(node = %path.display(), "device node already present");
                return Ok(());
            }
            return Err(HookError::Conflict {
                path: path.to_path_buf(),
                reason: format!("not a {:?} device {}:{}", node.kind, node.major, node.minor),
            });
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(HookError::io("failed to stat", path, e)),
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| HookError::io("failed to create directory", parent, e))?;
    }

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| HookError::InvalidArgument(format!("path {} contains NUL", path.display())))?;
    let mode = node.kind.file_type_bits() | node.mode as libc::mode_t;
    let ret = unsafe { libc::mknod(c_path.as_ptr(), mode, node.rdev()) };
    if ret != 0 {
        return Err(HookError::io(
            "failed to create device node",
            path,
            std::io::Error::last_os_error(),
        ));
    }

    // mknod applies the umask.
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(node.mode))
        .map_err(|e| HookError::io("failed to chmod", path, e))?;
    info!(
        "created device node {} ({}:{})",
        path.display(),
        node.major,
        node.minor
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_spec() {
        let node: NodeSpec = "/dev/nvidia0:c:195:0".parse().unwrap();
        assert_eq!(node.path, "/dev/nvidia0");
        assert_eq!(node.kind, NodeKind::Char);
        assert_eq!((node.major, node.minor), (195, 0));
        assert_eq!(node.mode, 0o666);

        let node: NodeSpec = "/dev/nvidia-caps/nvidia-cap21:c:236:21:0444".parse().unwrap();
        assert_eq!(node.mode, 0o444);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "/dev/nvidia0",
            "/dev/nvidia0:x:195:0",
            "/dev/nvidia0:c:major:0",
            "/dev/nvidia0:c:195:0:999",
            ":c:195:0",
            "/dev/nvidia0:c:195:0:0666:extra",
        ] {
            assert!(bad.parse::<NodeSpec>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_matching_node_left_alone() {
        let root = ContainerRoot::new("/");
        let null: NodeSpec = "/dev/null:c:1:3".parse().unwrap();
        create_device_nodes(&root, &[null.clone()]).unwrap();
        create_device_nodes(&root, &[null]).unwrap();

        let zero_as_null: NodeSpec = "/dev/null:c:1:5".parse().unwrap();
        assert!(create_device_nodes(&root, &[zero_as_null]).is_err());
    }

    #[test]
    fn test_existing_regular_file_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dev")).unwrap();
        std::fs::write(dir.path().join("dev/nvidia0"), b"").unwrap();

        let err = create_device_nodes(
            &ContainerRoot::new(dir.path()),
            &["/dev/nvidia0:c:195:0".parse().unwrap()],
        )
        .unwrap_err();
        assert!(matches!(err, HookError::Conflict { .. }));
    }

    #[test]
    fn test_escape_rejected_before_mknod() {
        let dir = tempfile::tempdir().unwrap();
        let err = create_device_nodes(
            &ContainerRoot::new(dir.path()),
            &["/../nvidia0:c:195:0".parse().unwrap()],
        )
        .unwrap_err();
        assert!(matches!(err, HookError::PathEscape(_)));
    }
}
