//! cdikit Core Library
//!
//! Builds Container Device Interface (CDI) specifications for accelerators.
//!
//! ## Pipeline
//!
//! ```text
//! gpu_topology::Session ─► discover::* ─► ContainerEdits ─► Spec ─► output
//!      (devices, MIG)       (per scope)      (merge/dedup)          (yaml|json)
//! ```
//!
//! - [`discover`]: composable, read-only producers of device nodes, mounts,
//!   hooks and environment variables
//! - [`edits`]: the ordered, deduplicating accumulator
//! - [`generate`]: two-phase spec assembly over a device session
//! - [`output`]: format selection, rendering and writing

pub mod config;
pub mod discover;
pub mod edits;
pub mod error;
pub mod generate;
pub mod output;
pub mod spec;
pub mod telemetry;

pub use config::GenerateConfig;
pub use discover::{Discoverer, Merge};
pub use edits::ContainerEdits;
pub use error::{Error, Result};
pub use generate::{all_device, generate_spec};
pub use output::{resolve_format, write_spec, FormatChoice, OutputFormat};
pub use spec::{DeviceNode, DeviceSpec, EnvVar, Hook, HookOperation, Mount, Spec};
pub use telemetry::{init_tracing, level_from_flags};

/// cdikit version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
