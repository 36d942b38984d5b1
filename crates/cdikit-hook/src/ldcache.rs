//! `update-ldcache`: register library folders with the container's dynamic
//! linker and rebuild its cache.

use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use crate::container::ContainerRoot;
use crate::error::HookError;
use crate::Result;

/// Linker configuration file written inside the container.
pub const LD_SO_CONF: &str = "/etc/ld.so.conf.d/00-cdikit.conf";

pub const DEFAULT_LDCONFIG: &str = "/sbin/ldconfig";

/// Write [`LD_SO_CONF`] listing `folders`, then run `ldconfig -r <root>`.
pub fn update_ldcache(root: &ContainerRoot, folders: &[String], ldconfig: &Path) -> Result<()> {
    let mut unique: Vec<&str> = Vec::with_capacity(folders.len());
    for folder in folders {
        // Folders may not escape the root.
        root.resolve(folder)?;
        if !unique.contains(&folder.as_str()) {
            unique.push(folder);
        }
    }

    if !unique.is_empty() {
        let conf = root.resolve_entry(LD_SO_CONF)?;
        if let Some(parent) = conf.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HookError::io("failed to create directory", parent, e))?;
        }
        // The write must not follow a link planted by the image.
        if std::fs::symlink_metadata(&conf).is_ok_and(|meta| meta.file_type().is_symlink()) {
            std::fs::remove_file(&conf).map_err(|e| HookError::io("failed to remove", &conf, e))?;
        }
        let mut content = String::from("# Generated by cdikit-hook\n");
        for folder in &unique {
            content.push_str(folder);
            content.push('\n');
        }
        std::fs::write(&conf, content).map_err(|e| HookError::io("failed to write", &conf, e))?;
        debug!(conf = %conf.display(), folders = unique.len(), "wrote linker config");
    }

    let status = Command::new(ldconfig)
        .arg("-r")
        .arg(root.path())
        .status()
        .map_err(|e| HookError::io("failed to run", ldconfig, e))?;
    if !status.success() {
        return Err(HookError::Command {
            program: ldconfig.display().to_string(),
            status: status.to_string(),
        });
    }
    info!("updated ldcache in {}", root.path().display());
    Ok(())
}
