//! Output format selection, rendering and writing.
//!
//! A spec is always rendered to one canonical YAML value first. YAML output
//! prints that value; JSON output is a strict transcode of it, so both
//! encodings carry the same fields in the same order.

use std::fmt;
use std::fs::DirBuilder;
use std::io::Write;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::spec::Spec;

/// Document marker written before YAML output.
pub const YAML_DOCUMENT_MARKER: &str = "---\n";

/// Supported document encodings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Yaml => "yaml",
            OutputFormat::Json => "json",
        }
    }

    /// Format implied by the file extension of `path`, if any.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(OutputFormat::Json),
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" => Ok(OutputFormat::Yaml),
            "json" => Ok(OutputFormat::Json),
            _ => Err(Error::InvalidArgument(format!(
                "invalid output format {s:?}; expected one of json, yaml"
            ))),
        }
    }
}

/// The resolved format, and the extension format it overrode, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatChoice {
    pub format: OutputFormat,
    pub conflicting_extension: Option<OutputFormat>,
}

/// Pick the output format.
///
/// An explicit format wins; otherwise the output extension decides;
/// otherwise YAML. A disagreement between the two is logged.
pub fn resolve_format(explicit: Option<OutputFormat>, output: Option<&Path>) -> FormatChoice {
    let inferred = output.and_then(OutputFormat::from_path);
    match (explicit, inferred) {
        (Some(format), Some(ext)) if format != ext => {
            warn!(
                "requested format {} does not match the extension of the output file; writing {}",
                format, format
            );
            FormatChoice {
                format,
                conflicting_extension: Some(ext),
            }
        }
        (Some(format), _) | (None, Some(format)) => FormatChoice {
            format,
            conflicting_extension: None,
        },
        (None, None) => FormatChoice {
            format: OutputFormat::default(),
            conflicting_extension: None,
        },
    }
}

/// The canonical intermediate form of `spec`.
pub fn to_canonical(spec: &Spec) -> Result<serde_yaml::Value> {
    Ok(serde_yaml::to_value(spec)?)
}

/// Transcode a YAML value to JSON without loss.
///
/// Non-string mapping keys, tagged values and non-finite numbers have no JSON
/// form and are rejected.
pub fn yaml_to_json_strict(value: &serde_yaml::Value) -> Result<serde_json::Value> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => serde_json::Value::Null,
        Yaml::Bool(b) => serde_json::Value::Bool(*b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_json::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                serde_json::Value::from(u)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                serde_json::Number::from_f64(f)
                    .map(serde_json::Value::Number)
                    .ok_or_else(|| {
                        Error::Serialization(format!("number {n} has no JSON representation"))
                    })?
            }
        }
        Yaml::String(s) => serde_json::Value::String(s.clone()),
        Yaml::Sequence(items) => serde_json::Value::Array(
            items
                .iter()
                .map(yaml_to_json_strict)
                .collect::<Result<Vec<_>>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut object = serde_json::Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                let Yaml::String(key) = key else {
                    return Err(Error::Serialization(format!(
                        "mapping key {key:?} is not a string"
                    )));
                };
                object.insert(key.clone(), yaml_to_json_strict(value)?);
            }
            serde_json::Value::Object(object)
        }
        Yaml::Tagged(tagged) => {
            return Err(Error::Serialization(format!(
                "tagged value {} has no JSON representation",
                tagged.tag
            )))
        }
    })
}

/// Render `spec` as a complete document.
pub fn render(spec: &Spec, format: OutputFormat) -> Result<Vec<u8>> {
    let canonical = to_canonical(spec)?;
    match format {
        OutputFormat::Yaml => {
            let body = serde_yaml::to_string(&canonical)?;
            let mut document = String::with_capacity(YAML_DOCUMENT_MARKER.len() + body.len());
            document.push_str(YAML_DOCUMENT_MARKER);
            document.push_str(&body);
            Ok(document.into_bytes())
        }
        OutputFormat::Json => Ok(serde_json::to_vec(&yaml_to_json_strict(&canonical)?)?),
    }
}

/// Write a rendered document to `writer`.
pub fn write_document<W: Write>(writer: &mut W, document: &[u8]) -> Result<()> {
    writer.write_all(document)?;
    writer.flush()?;
    Ok(())
}

/// Render `spec` and write it to `output`, or to stdout when `output` is
/// absent or empty.
///
/// An existing file is replaced; missing parent directories are created.
pub fn write_spec(spec: &Spec, format: OutputFormat, output: Option<&Path>) -> Result<()> {
    let document = render(spec, format)?;

    let Some(path) = output.filter(|p| !p.as_os_str().is_empty()) else {
        let stdout = std::io::stdout();
        return write_document(&mut stdout.lock(), &document)
            .map_err(|e| e.context("failed to write spec to stdout"));
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(parent)
            .map_err(|e| {
                Error::from(e).context(format!("failed to create directory {}", parent.display()))
            })?;
    }

    std::fs::write(path, &document)
        .map_err(|e| Error::from(e).context(format!("failed to write {}", path.display())))?;
    debug!(path = %path.display(), format = %format, "wrote spec");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edits::ContainerEdits;
    use crate::spec::{DeviceNode, DeviceSpec, EnvVar, SPEC_VERSION};

    fn sample() -> Spec {
        Spec {
            version: SPEC_VERSION.to_string(),
            kind: "nvidia.com/gpu".to_string(),
            devices: vec![DeviceSpec::new(
                "gpu0",
                ContainerEdits {
                    device_nodes: vec![DeviceNode::new("/dev/nvidia0", "/dev/nvidia0")],
                    ..ContainerEdits::default()
                },
            )],
            container_edits: ContainerEdits {
                env: vec![EnvVar::new("NVIDIA_VISIBLE_DEVICES", "void")],
                ..ContainerEdits::default()
            },
        }
    }

    #[test]
    fn test_format_parse_is_case_insensitive() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("Yaml".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert!(matches!(
            "toml".parse::<OutputFormat>(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_resolve_format() {
        let out = Path::new("/etc/cdi/nvidia.JSON");
        assert_eq!(resolve_format(None, Some(out)).format, OutputFormat::Json);
        assert_eq!(resolve_format(None, None).format, OutputFormat::Yaml);
        assert_eq!(
            resolve_format(None, Some(Path::new("/etc/cdi/nvidia.yml"))).format,
            OutputFormat::Yaml
        );
        assert_eq!(
            resolve_format(None, Some(Path::new("/etc/cdi/nvidia"))).format,
            OutputFormat::Yaml
        );

        let choice = resolve_format(Some(OutputFormat::Yaml), Some(out));
        assert_eq!(choice.format, OutputFormat::Yaml);
        assert_eq!(choice.conflicting_extension, Some(OutputFormat::Json));

        let choice = resolve_format(Some(OutputFormat::Json), Some(out));
        assert_eq!(choice.conflicting_extension, None);
    }

    #[test]
    fn test_yaml_has_document_marker() {
        let doc = String::from_utf8(render(&sample(), OutputFormat::Yaml).unwrap()).unwrap();
        assert!(doc.starts_with("---\ncdiVersion: "));
        assert!(doc.contains("\nkind: nvidia.com/gpu\n"));
    }

    #[test]
    fn test_json_is_compact_and_ordered() {
        let doc = String::from_utf8(render(&sample(), OutputFormat::Json).unwrap()).unwrap();
        assert!(doc.starts_with(r#"{"cdiVersion":"0.4.0","kind":"nvidia.com/gpu","devices":["#));
        assert!(!doc.contains('\n'));
    }

    #[test]
    fn test_both_encodings_parse_back_equal() {
        let spec = sample();
        let yaml = render(&spec, OutputFormat::Yaml).unwrap();
        let json = render(&spec, OutputFormat::Json).unwrap();
        assert_eq!(Spec::from_yaml(&yaml).unwrap(), spec);
        assert_eq!(Spec::from_json(&json).unwrap(), spec);
    }

    #[test]
    fn test_strict_transcode_rejects_non_string_keys() {
        let value: serde_yaml::Value = serde_yaml::from_str("1: one\n").unwrap();
        assert!(matches!(
            yaml_to_json_strict(&value),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_strict_transcode_rejects_tags_and_nan() {
        let tagged: serde_yaml::Value = serde_yaml::from_str("!custom value").unwrap();
        assert!(yaml_to_json_strict(&tagged).is_err());

        let nan: serde_yaml::Value = serde_yaml::from_str(".nan").unwrap();
        assert!(yaml_to_json_strict(&nan).is_err());
    }

    #[test]
    fn test_write_spec_creates_parents_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc/cdi/nvidia.yaml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "x".repeat(10_000)).unwrap();

        write_spec(&sample(), OutputFormat::Yaml, Some(&path)).unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, render(&sample(), OutputFormat::Yaml).unwrap());

        let nested = dir.path().join("a/b/c/spec.json");
        write_spec(&sample(), OutputFormat::Json, Some(&nested)).unwrap();
        assert!(nested.exists());
    }
}
