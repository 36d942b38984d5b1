//! `create-symlinks`: create links inside the container.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info};

use crate::container::ContainerRoot;
use crate::error::HookError;
use crate::Result;

/// A `<target>::<link>` pair. `link` is a container path; `target` is stored
/// verbatim in the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    pub target: String,
    pub link: String,
}

impl FromStr for LinkSpec {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once("::") {
            Some((target, link)) if !target.is_empty() && !link.is_empty() => Ok(LinkSpec {
                target: target.to_string(),
                link: link.to_string(),
            }),
            _ => Err(HookError::InvalidArgument(format!(
                "invalid link {s:?}; expected <target>::<link>"
            ))),
        }
    }
}

impl fmt::Display for LinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.target, self.link)
    }
}

/// Create every link in `links` under `root`.
pub fn create_symlinks(root: &ContainerRoot, links: &[LinkSpec]) -> Result<()> {
    for spec in links {
        let path = root.resolve_entry(&spec.link)?;
        create_symlink(Path::new(&spec.target), &path)?;
    }
    Ok(())
}

fn create_symlink(target: &Path, path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let current =
                std::fs::read_link(path).map_err(|e| HookError::io("failed to read link", path, e))?;
            if current.as_path() == target {
                debug!(link = %path.display(), "symlink already present");
                return Ok(());
            }
            std::fs::remove_file(path).map_err(|e| HookError::io("failed to remove", path, e))?;
        }
        Ok(_) => {
            return Err(HookError::Conflict {
                path: path.to_path_buf(),
                reason: "not a symlink".to_string(),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(HookError::io("failed to stat", path, e)),
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| HookError::io("failed to create directory", parent, e))?;
    }
    std::os::unix::fs::symlink(target, path)
        .map_err(|e| HookError::io("failed to create symlink", path, e))?;
    info!("created symlink {} -> {}", path.display(), target.display());
    Ok(())
}
