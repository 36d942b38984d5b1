//! `chmod`: set permissions on container paths.

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;

use tracing::{debug, info};

use crate::container::ContainerRoot;
use crate::error::HookError;
use crate::Result;

/// Set `mode` on each of `paths` that exists in the container. Symlinks are
/// followed as the container sees them, never out to the host.
pub fn chmod(root: &ContainerRoot, mode: u32, paths: &[String]) -> Result<()> {
    for container_path in paths {
        let path = root.resolve(container_path)?;
        match std::fs::symlink_metadata(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %container_path, "not present in container; skipping");
                continue;
            }
            Err(e) => return Err(HookError::io("failed to stat", &path, e)),
        }
        std::fs::set_permissions(&path, Permissions::from_mode(mode))
            .map_err(|e| HookError::io("failed to chmod", &path, e))?;
        info!("set mode {:o} on {}", mode, container_path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sets_mode_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let dri = dir.path().join("dev/dri");
        std::fs::create_dir_all(&dri).unwrap();
        std::fs::set_permissions(&dri, Permissions::from_mode(0o700)).unwrap();

        chmod(
            &ContainerRoot::new(dir.path()),
            0o755,
            &["/dev/dri".to_string(), "/dev/nvidia-caps".to_string()],
        )
        .unwrap();

        let mode = std::fs::metadata(&dri).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o755);
    }
}
