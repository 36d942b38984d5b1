use std::path::PathBuf;

use tracing::debug;

use super::{host_path, Discoverer};
use crate::error::{Error, Result};
use crate::spec::DeviceNode;

/// Character devices located under a dev root.
///
/// Required nodes missing on the host fail discovery; optional ones are
/// skipped.
#[derive(Debug, Clone)]
pub struct CharDevices {
    dev_root: PathBuf,
    required: Vec<String>,
    optional: Vec<String>,
}

impl CharDevices {
    pub fn new(dev_root: impl Into<PathBuf>) -> Self {
        Self {
            dev_root: dev_root.into(),
            required: Vec::new(),
            optional: Vec::new(),
        }
    }

    pub fn required<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn optional<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional.extend(paths.into_iter().map(Into::into));
        self
    }
}

impl Discoverer for CharDevices {
    fn devices(&self) -> Result<Vec<DeviceNode>> {
        let mut nodes = Vec::with_capacity(self.required.len() + self.optional.len());

        for path in &self.required {
            let host = host_path(&self.dev_root, path);
            if !host.exists() {
                return Err(Error::Discovery(format!(
                    "required device node {} not found",
                    host.display()
                )));
            }
            nodes.push(DeviceNode::new(path.as_str(), host.to_string_lossy()));
        }

        for path in &self.optional {
            let host = host_path(&self.dev_root, path);
            if !host.exists() {
                debug!("optional device node {} not found; skipping", host.display());
                continue;
            }
            nodes.push(DeviceNode::new(path.as_str(), host.to_string_lossy()));
        }

        Ok(nodes)
    }
}
