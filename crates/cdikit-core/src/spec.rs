//! Wire model of a CDI specification.
//!
//! Field order in these structs is the field order of the rendered document;
//! empty sequences are omitted.

use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::edits::ContainerEdits;
use crate::error::{Error, Result};

/// CDI specification version written by this generator.
pub const SPEC_VERSION: &str = "0.4.0";

/// Lifecycle point at which generated hooks run.
pub const CREATE_CONTAINER_HOOK: &str = "createContainer";

/// Name of the aggregate device.
pub const ALL_DEVICE: &str = "all";

/// A device node to create in the container.
///
/// Identity for deduplication is `(host_path, path)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceNode {
    /// Path inside the container.
    pub path: String,
    pub host_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

impl DeviceNode {
    pub fn new(path: impl Into<String>, host_path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            host_path: host_path.into(),
            permissions: None,
        }
    }

    pub fn identity(&self) -> (&str, &str) {
        (&self.host_path, &self.path)
    }
}

/// A bind mount into the container.
///
/// Identity for deduplication is `(host_path, container_path)`; `options` is
/// an ordered set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub host_path: String,
    pub container_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Mount {
    pub fn new(
        host_path: impl Into<String>,
        container_path: impl Into<String>,
        options: &[&str],
    ) -> Self {
        let mut mount = Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            options: Vec::new(),
        };
        for option in options {
            mount.add_option(*option);
        }
        mount
    }

    pub fn identity(&self) -> (&str, &str) {
        (&self.host_path, &self.container_path)
    }

    /// Add `option` unless it is already present.
    pub fn add_option(&mut self, option: impl Into<String>) {
        let option = option.into();
        if !self.options.contains(&option) {
            self.options.push(option);
        }
    }
}

/// An environment variable, `KEY=VALUE` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(Error::Composition("environment variable with empty key".to_string()));
        }
        if self.key.contains('=') {
            return Err(Error::Composition(format!(
                "environment variable key {:?} contains '='",
                self.key
            )));
        }
        Ok(())
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

impl FromStr for EnvVar {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| Error::Composition(format!("environment entry {s:?} is not KEY=VALUE")))?;
        let env = EnvVar::new(key, value);
        env.validate()?;
        Ok(env)
    }
}

impl TryFrom<String> for EnvVar {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<EnvVar> for String {
    fn from(env: EnvVar) -> Self {
        env.to_string()
    }
}

/// Operations understood by the hook executable.
///
/// `Other` carries names this version does not know, so documents written by
/// newer producers still parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HookOperation {
    CreateSymlinks,
    CreateDeviceNodes,
    UpdateLdcache,
    Chmod,
    Other(String),
}

impl HookOperation {
    /// Every operation with a handler in the hook executable.
    pub fn known() -> [HookOperation; 4] {
        [
            HookOperation::CreateSymlinks,
            HookOperation::CreateDeviceNodes,
            HookOperation::UpdateLdcache,
            HookOperation::Chmod,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            HookOperation::CreateSymlinks => "create-symlinks",
            HookOperation::CreateDeviceNodes => "create-device-nodes",
            HookOperation::UpdateLdcache => "update-ldcache",
            HookOperation::Chmod => "chmod",
            HookOperation::Other(name) => name,
        }
    }
}

impl fmt::Display for HookOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookOperation {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Infallible> {
        Ok(match s {
            "create-symlinks" => HookOperation::CreateSymlinks,
            "create-device-nodes" => HookOperation::CreateDeviceNodes,
            "update-ldcache" => HookOperation::UpdateLdcache,
            "chmod" => HookOperation::Chmod,
            other => HookOperation::Other(other.to_string()),
        })
    }
}

/// A hook invocation recorded in the spec.
///
/// On the wire `args` is the full argv: the executable's base name, the
/// operation name, then the operation's own arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawHook", into = "RawHook")]
pub struct Hook {
    /// Lifecycle point (`hookName` on the wire).
    pub lifecycle: String,
    /// Hook executable.
    pub path: String,
    pub operation: HookOperation,
    pub args: Vec<String>,
    pub env: Vec<String>,
}

impl Hook {
    /// A `createContainer` hook running `operation` via the executable at `path`.
    pub fn create_container(
        path: impl Into<String>,
        operation: HookOperation,
        args: Vec<String>,
    ) -> Self {
        Self {
            lifecycle: CREATE_CONTAINER_HOOK.to_string(),
            path: path.into(),
            operation,
            args,
            env: Vec::new(),
        }
    }

    /// The full argv as written to the spec.
    pub fn argv(&self) -> Vec<String> {
        let program = Path::new(&self.path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.clone());
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        argv.push(program);
        argv.push(self.operation.to_string());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHook {
    hook_name: String,
    path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    env: Vec<String>,
}

impl From<Hook> for RawHook {
    fn from(hook: Hook) -> Self {
        RawHook {
            args: hook.argv(),
            hook_name: hook.lifecycle,
            path: hook.path,
            env: hook.env,
        }
    }
}

impl TryFrom<RawHook> for Hook {
    type Error = Error;

    fn try_from(raw: RawHook) -> Result<Self> {
        let mut args = raw.args.into_iter();
        let (Some(_program), Some(operation)) = (args.next(), args.next()) else {
            return Err(Error::Composition(format!(
                "hook {} must name its executable and operation in args",
                raw.path
            )));
        };
        let operation = operation
            .parse::<HookOperation>()
            .unwrap_or_else(|never| match never {});
        Ok(Hook {
            lifecycle: raw.hook_name,
            path: raw.path,
            operation,
            args: args.collect(),
            env: raw.env,
        })
    }
}

/// A named device and the edits that expose it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSpec {
    pub name: String,
    #[serde(default)]
    pub container_edits: ContainerEdits,
}

impl DeviceSpec {
    pub fn new(name: impl Into<String>, container_edits: ContainerEdits) -> Self {
        Self {
            name: name.into(),
            container_edits,
        }
    }
}

/// A complete CDI specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    #[serde(rename = "cdiVersion", alias = "version")]
    pub version: String,
    pub kind: String,
    pub devices: Vec<DeviceSpec>,
    /// Edits applied whenever any device of this spec is requested.
    #[serde(default)]
    pub container_edits: ContainerEdits,
}

impl Spec {
    /// Check the invariants consumers rely on: a `vendor/class` kind and
    /// unique, non-empty device names.
    pub fn validate(&self) -> Result<()> {
        match self.kind.split_once('/') {
            Some((vendor, class)) if !vendor.is_empty() && !class.is_empty() => {}
            _ => {
                return Err(Error::Composition(format!(
                    "kind {:?} is not of the form vendor/class",
                    self.kind
                )))
            }
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.name.is_empty() {
                return Err(Error::Composition("device with empty name".to_string()));
            }
            if !seen.insert(device.name.as_str()) {
                return Err(Error::Composition(format!(
                    "duplicate device name {:?}",
                    device.name
                )));
            }
        }
        Ok(())
    }

    pub fn device(&self, name: &str) -> Option<&DeviceSpec> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Parse a YAML document (with or without a leading `---`).
    pub fn from_yaml(data: &[u8]) -> Result<Self> {
        Ok(serde_yaml::from_slice(data)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
