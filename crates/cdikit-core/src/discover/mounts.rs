use std::path::PathBuf;

use tracing::{debug, warn};

use super::{host_path, Discoverer};
use crate::error::Result;
use crate::spec::Mount;

/// Options for read-only driver files bind-mounted into a container.
pub const READ_ONLY_BIND: &[&str] = &["ro", "nosuid", "nodev", "bind"];

/// Locates files under a root and yields them as bind mounts.
///
/// Each entry is a list of alternative container paths; the first one that
/// exists on the host is mounted at the same path in the container. Entries
/// with no match are skipped.
#[derive(Debug, Clone)]
pub struct Mounts {
    root: PathBuf,
    options: Vec<String>,
    candidates: Vec<Vec<String>>,
    optional: bool,
}

impl Mounts {
    pub fn new(root: impl Into<PathBuf>, options: &[&str]) -> Self {
        Self {
            root: root.into(),
            options: options.iter().map(|o| o.to_string()).collect(),
            candidates: Vec::new(),
            optional: false,
        }
    }

    /// Look for each of `names` in `dirs`, in directory order.
    pub fn search(mut self, dirs: &[&str], names: &[String]) -> Self {
        for name in names {
            let alternatives = dirs
                .iter()
                .map(|dir| format!("{}/{}", dir.trim_end_matches('/'), name))
                .collect();
            self.candidates.push(alternatives);
        }
        self
    }

    /// Mount each of `paths` if it exists.
    pub fn exact<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates
            .extend(paths.into_iter().map(|p| vec![p.into()]));
        self
    }

    /// Log missing entries at debug level instead of warning.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

impl Discoverer for Mounts {
    fn mounts(&self) -> Result<Vec<Mount>> {
        let options: Vec<&str> = self.options.iter().map(String::as_str).collect();
        let mut mounts = Vec::new();

        for alternatives in &self.candidates {
            let found = alternatives
                .iter()
                .map(|path| (path, host_path(&self.root, path)))
                .find(|(_, host)| host.exists());

            match found {
                Some((path, host)) => {
                    debug!(path = %path, "located {}", host.display());
                    mounts.push(Mount::new(host.to_string_lossy(), path.as_str(), &options));
                }
                None if self.optional => {
                    debug!("{} not present; skipping", alternatives.join(", "));
                }
                None => {
                    warn!("could not locate {}; skipping", display_name(alternatives));
                }
            }
        }

        Ok(mounts)
    }
}

fn display_name(alternatives: &[String]) -> &str {
    match alternatives.first() {
        Some(path) => path.rsplit('/').next().unwrap_or(path),
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &std::path::Path, path: &str) {
        let full = root.join(path.trim_start_matches('/'));
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, b"").unwrap();
    }

    #[test]
    fn test_search_takes_first_directory_with_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "/usr/lib/x86_64-linux-gnu/libcuda.so.550.54");
        touch(dir.path(), "/usr/lib/libcuda.so.550.54");

        let mounts = Mounts::new(dir.path(), READ_ONLY_BIND)
            .search(
                &["/usr/lib64", "/usr/lib/x86_64-linux-gnu", "/usr/lib"],
                &["libcuda.so.550.54".to_string()],
            )
            .mounts()
            .unwrap();

        assert_eq!(mounts.len(), 1);
        assert_eq!(
            mounts[0].container_path,
            "/usr/lib/x86_64-linux-gnu/libcuda.so.550.54"
        );
        assert!(mounts[0].host_path.starts_with(&*dir.path().to_string_lossy()));
        assert_eq!(mounts[0].options, vec!["ro", "nosuid", "nodev", "bind"]);
    }

    #[test]
    fn test_missing_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "/usr/bin/nvidia-smi");

        let mounts = Mounts::new(dir.path(), READ_ONLY_BIND)
            .search(
                &["/usr/bin"],
                &["nvidia-smi".to_string(), "nvidia-debugdump".to_string()],
            )
            .mounts()
            .unwrap();

        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].container_path, "/usr/bin/nvidia-smi");
    }

    #[test]
    fn test_exact_paths_keep_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "/tmp/nvidia-mps/control");
        touch(dir.path(), "/var/run/nvidia-persistenced/socket");

        let mounts = Mounts::new(dir.path(), &["ro"])
            .exact([
                "/var/run/nvidia-persistenced/socket",
                "/var/run/nvidia-fabricmanager/socket",
                "/tmp/nvidia-mps",
            ])
            .optional()
            .mounts()
            .unwrap();

        let paths: Vec<_> = mounts.iter().map(|m| m.container_path.as_str()).collect();
        assert_eq!(paths, vec!["/var/run/nvidia-persistenced/socket", "/tmp/nvidia-mps"]);
    }
}
