//! cdikit-hook: operations run by container runtimes for generated CDI specs
//!
//! Each hook recorded in a spec invokes the `cdikit-hook` executable once
//! with an operation name and its arguments. Operations act on the
//! container's root filesystem and are idempotent: running one twice leaves
//! the container as running it once does.
//!
//! ## Operations
//!
//! - `create-symlinks`: [`symlinks::create_symlinks`]
//! - `create-device-nodes`: [`device_nodes::create_device_nodes`]
//! - `update-ldcache`: [`ldcache::update_ldcache`]
//! - `chmod`: [`chmod::chmod`]

pub mod chmod;
pub mod container;
pub mod device_nodes;
pub mod error;
pub mod ldcache;
pub mod symlinks;

pub use container::ContainerRoot;
pub use device_nodes::{NodeKind, NodeSpec};
pub use error::HookError;
pub use symlinks::LinkSpec;

/// Result type for hook operations
pub type Result<T> = std::result::Result<T, HookError>;

/// Parse an octal permission mode such as `755` or `0644`.
pub fn parse_mode(s: &str) -> std::result::Result<u32, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    match u32::from_str_radix(digits, 8) {
        Ok(mode) if mode <= 0o7777 => Ok(mode),
        _ => Err(format!("invalid octal mode {s:?}")),
    }
}
