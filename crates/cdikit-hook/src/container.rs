//! Locating the container's root filesystem.
//!
//! Runtimes pass the OCI container state on stdin; its `bundle` directory
//! holds the `config.json` whose `root.path` names the root filesystem,
//! relative to the bundle unless absolute.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::HookError;
use crate::Result;

/// Matches the kernel's limit on symlinks followed in one lookup.
const MAX_LINK_HOPS: usize = 40;

#[derive(Deserialize)]
struct State {
    bundle: String,
}

#[derive(Deserialize)]
struct Config {
    root: Option<Root>,
}

#[derive(Deserialize)]
struct Root {
    path: String,
}

/// Root filesystem of the container a hook runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRoot {
    path: PathBuf,
}

impl ContainerRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the root from the OCI runtime config at `config_path`.
    pub fn from_config_file(config_path: &Path) -> Result<Self> {
        let data = std::fs::read(config_path)
            .map_err(|e| HookError::io("failed to read", config_path, e))?;
        let config: Config = serde_json::from_slice(&data).map_err(|e| {
            HookError::ContainerState(format!("failed to parse {}: {e}", config_path.display()))
        })?;
        let root = config.root.ok_or_else(|| {
            HookError::ContainerState(format!("{} has no root.path", config_path.display()))
        })?;

        let bundle = config_path.parent().unwrap_or_else(|| Path::new("/"));
        let path = bundle.join(root.path);
        debug!(root = %path.display(), "container root from config");
        Ok(Self::new(path))
    }

    /// Read the OCI container state from `reader` and follow it to the root.
    pub fn from_state<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| HookError::io("failed to read container state from", "stdin", e))?;
        let state: State = serde_json::from_slice(&data)
            .map_err(|e| HookError::ContainerState(format!("failed to parse container state: {e}")))?;
        if state.bundle.is_empty() {
            return Err(HookError::ContainerState(
                "container state has an empty bundle".to_string(),
            ));
        }
        Self::from_config_file(&Path::new(&state.bundle).join("config.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Host location of `container_path` inside this root, following
    /// symlinks.
    ///
    /// `..` in `container_path` may not climb above the root. Symlinks met on
    /// the way are resolved as the container would see them: absolute
    /// targets restart at the root and `..` in a target stops at the root.
    pub fn resolve(&self, container_path: &str) -> Result<PathBuf> {
        self.walk(container_path, true)
    }

    /// Like [`resolve`](Self::resolve), but a symlink in the last component
    /// is not followed. For entries the hook creates or replaces.
    pub fn resolve_entry(&self, container_path: &str) -> Result<PathBuf> {
        self.walk(container_path, false)
    }

    fn walk(&self, container_path: &str, follow_last: bool) -> Result<PathBuf> {
        let mut pending: VecDeque<OsString> = lexical_parts(container_path)?.into();
        let mut resolved: Vec<OsString> = Vec::new();
        let mut hops = 0;

        while let Some(part) = pending.pop_front() {
            if part == ".." {
                resolved.pop();
                continue;
            }
            resolved.push(part);
            if pending.is_empty() && !follow_last {
                break;
            }

            let host = self.host_path(&resolved);
            let target = match std::fs::symlink_metadata(&host) {
                Ok(meta) if meta.file_type().is_symlink() => std::fs::read_link(&host)
                    .map_err(|e| HookError::io("failed to read link", &host, e))?,
                Ok(_) => continue,
                Err(e) if is_missing(&e) => continue,
                Err(e) => return Err(HookError::io("failed to stat", &host, e)),
            };

            hops += 1;
            if hops > MAX_LINK_HOPS {
                return Err(HookError::TooManyLinks(container_path.to_string()));
            }
            resolved.pop();
            if target.is_absolute() {
                resolved.clear();
            }
            for component in target.components().rev() {
                match component {
                    Component::Normal(p) => pending.push_front(p.to_os_string()),
                    Component::ParentDir => pending.push_front(OsString::from("..")),
                    Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
                }
            }
        }

        Ok(self.host_path(&resolved))
    }

    fn host_path(&self, parts: &[OsString]) -> PathBuf {
        let mut path = self.path.clone();
        path.extend(parts);
        path
    }
}

/// Normal components of `container_path` after lexical `..` handling.
fn lexical_parts(container_path: &str) -> Result<Vec<OsString>> {
    let mut parts = Vec::new();
    for component in Path::new(container_path).components() {
        match component {
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(HookError::PathEscape(container_path.to_string()));
                }
            }
            Component::Normal(part) => parts.push(part.to_os_string()),
        }
    }
    Ok(parts)
}

/// A component that does not exist, or sits below a non-directory.
fn is_missing(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ENOTDIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_under_root() {
        let root = ContainerRoot::new("/run/c1/rootfs");
        assert_eq!(
            root.resolve("/dev/dri/card1").unwrap(),
            PathBuf::from("/run/c1/rootfs/dev/dri/card1")
        );
        assert_eq!(
            root.resolve("usr/lib64/./libcuda.so").unwrap(),
            PathBuf::from("/run/c1/rootfs/usr/lib64/libcuda.so")
        );
        assert_eq!(
            root.resolve("/dev/dri/by-path/../card1").unwrap(),
            PathBuf::from("/run/c1/rootfs/dev/dri/card1")
        );
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let root = ContainerRoot::new("/run/c1/rootfs");
        assert!(matches!(
            root.resolve("/../../etc/shadow"),
            Err(HookError::PathEscape(_))
        ));
        assert!(root.resolve("/dev/../../etc").is_err());
    }

    #[test]
    fn test_resolve_follows_links_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let rootfs = dir.path();
        std::fs::create_dir_all(rootfs.join("usr/lib64")).unwrap();
        std::fs::create_dir_all(rootfs.join("dev")).unwrap();
        std::fs::create_dir_all(rootfs.join("opt")).unwrap();
        std::os::unix::fs::symlink("lib64", rootfs.join("usr/lib")).unwrap();
        std::os::unix::fs::symlink("/host/dri", rootfs.join("dev/dri")).unwrap();
        std::os::unix::fs::symlink("../../../../etc", rootfs.join("opt/up")).unwrap();
        let root = ContainerRoot::new(rootfs);

        assert_eq!(
            root.resolve("/usr/lib/libcuda.so").unwrap(),
            rootfs.join("usr/lib64/libcuda.so")
        );
        assert_eq!(root.resolve("/dev/dri").unwrap(), rootfs.join("host/dri"));
        assert_eq!(root.resolve("/opt/up/ld.so.conf.d").unwrap(), rootfs.join("etc/ld.so.conf.d"));
    }

    #[test]
    fn test_resolve_entry_keeps_last_link() {
        let dir = tempfile::tempdir().unwrap();
        let rootfs = dir.path();
        std::fs::create_dir_all(rootfs.join("usr/lib64")).unwrap();
        std::os::unix::fs::symlink("/etc/passwd", rootfs.join("usr/lib64/libcuda.so")).unwrap();
        let root = ContainerRoot::new(rootfs);

        assert_eq!(
            root.resolve_entry("/usr/lib64/libcuda.so").unwrap(),
            rootfs.join("usr/lib64/libcuda.so")
        );
        assert_eq!(root.resolve("/usr/lib64/libcuda.so").unwrap(), rootfs.join("etc/passwd"));
    }

    #[test]
    fn test_link_loop_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("b", dir.path().join("a")).unwrap();
        std::os::unix::fs::symlink("a", dir.path().join("b")).unwrap();

        let err = ContainerRoot::new(dir.path()).resolve("/a/x").unwrap_err();
        assert!(matches!(err, HookError::TooManyLinks(_)));
    }

    #[test]
    fn test_relative_root_follows_bundle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"ociVersion":"1.0.2","root":{"path":"rootfs","readonly":false}}"#,
        )
        .unwrap();
        let state = format!(
            r#"{{"ociVersion":"1.0.2","id":"c1","status":"creating","pid":42,"bundle":"{}"}}"#,
            dir.path().display()
        );

        let root = ContainerRoot::from_state(state.as_bytes()).unwrap();
        assert_eq!(root.path(), dir.path().join("rootfs"));
    }

    #[test]
    fn test_absolute_root_kept() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.json");
        std::fs::write(&config, r#"{"root":{"path":"/var/lib/containers/c1/merged"}}"#).unwrap();

        let root = ContainerRoot::from_config_file(&config).unwrap();
        assert_eq!(root.path(), Path::new("/var/lib/containers/c1/merged"));
    }

    #[test]
    fn test_bad_state() {
        assert!(ContainerRoot::from_state(&b"not json"[..]).is_err());
        assert!(ContainerRoot::from_state(&br#"{"bundle":""}"#[..]).is_err());

        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.json");
        std::fs::write(&config, r#"{"ociVersion":"1.0.2"}"#).unwrap();
        assert!(matches!(
            ContainerRoot::from_config_file(&config),
            Err(HookError::ContainerState(_))
        ));
    }
}
