//! cdikit-hook - hook executable referenced by cdikit-generated CDI specs
//!
//! Invoked by the container runtime once per hook entry, with the OCI
//! container state on stdin.
//!
//! ## Commands
//!
//! - `create-symlinks`: create symbolic links in the container
//! - `create-device-nodes`: create device nodes in the container
//! - `update-ldcache`: register library folders and rebuild the linker cache
//! - `chmod`: set permissions on container paths
//!
//! Any other operation (one added by a newer generator, or one since
//! removed) is reported as a warning and exits successfully so the container
//! still starts.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};
use tracing::{error, warn};

use cdikit_hook::ldcache::DEFAULT_LDCONFIG;
use cdikit_hook::{chmod, device_nodes, ldcache, parse_mode, symlinks};
use cdikit_hook::{ContainerRoot, LinkSpec, NodeSpec};

#[derive(Parser)]
#[command(name = "cdikit-hook")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Prepare a container's filesystem for injected devices; run as a hook from a CDI spec",
    long_about = None
)]
struct Cli {
    /// Enable debug-level logging
    #[arg(
        short,
        long,
        global = true,
        env = "CDIKIT_DEBUG",
        value_parser = BoolishValueParser::new()
    )]
    debug: bool,

    /// Suppress all output except errors; overrides --debug
    #[arg(long, global = true, env = "CDIKIT_QUIET", value_parser = BoolishValueParser::new())]
    quiet: bool,

    /// OCI runtime config of the container (default: follow the state on stdin)
    #[arg(long, global = true)]
    container_spec: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<HookCommand>,
}

#[derive(Subcommand)]
enum HookCommand {
    /// Create symbolic links in the container
    CreateSymlinks {
        /// Link to create, as <target>::<link>
        #[arg(long = "link", value_name = "TARGET::LINK")]
        links: Vec<LinkSpec>,
    },

    /// Create device nodes in the container
    CreateDeviceNodes {
        /// Node to create, as <path>:<c|b>:<major>:<minor>[:<mode>]
        #[arg(long = "node", value_name = "NODE")]
        nodes: Vec<NodeSpec>,
    },

    /// Register library folders and rebuild the container's linker cache
    UpdateLdcache {
        /// Folder holding injected libraries
        #[arg(long = "folder", value_name = "DIR")]
        folders: Vec<String>,

        /// ldconfig executable on the host
        #[arg(long, default_value = DEFAULT_LDCONFIG)]
        ldconfig_path: PathBuf,
    },

    /// Set permissions on container paths
    Chmod {
        /// Octal mode to set
        #[arg(long, value_parser = parse_mode)]
        mode: u32,

        /// Path in the container
        #[arg(long = "path", value_name = "PATH")]
        paths: Vec<String>,
    },

    #[command(external_subcommand)]
    Unsupported(Vec<String>),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    cdikit_core::init_tracing(false, cdikit_core::level_from_flags(cli.debug, cli.quiet));

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let command = match cli.command {
        None => {
            warn!("no hook operation given; nothing to do");
            return Ok(());
        }
        Some(HookCommand::Unsupported(args)) => {
            let name = args.first().map(String::as_str).unwrap_or_default();
            warn!("unsupported hook {:?}; ignoring", name);
            return Ok(());
        }
        Some(command) => command,
    };

    let root = match cli.container_spec {
        Some(config) => ContainerRoot::from_config_file(&config),
        None => ContainerRoot::from_state(std::io::stdin().lock()),
    }
    .context("Failed to determine container root")?;

    match command {
        HookCommand::CreateSymlinks { links } => {
            symlinks::create_symlinks(&root, &links).context("create-symlinks failed")
        }
        HookCommand::CreateDeviceNodes { nodes } => {
            device_nodes::create_device_nodes(&root, &nodes).context("create-device-nodes failed")
        }
        HookCommand::UpdateLdcache {
            folders,
            ldconfig_path,
        } => ldcache::update_ldcache(&root, &folders, &ldconfig_path)
            .context("update-ldcache failed"),
        HookCommand::Chmod { mode, paths } => {
            chmod::chmod(&root, mode, &paths).context("chmod failed")
        }
        HookCommand::Unsupported(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdikit_core::HookOperation;
    use clap::CommandFactory;
    use tracing_test::traced_test;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_every_known_operation_has_a_subcommand() {
        let cmd = Cli::command();
        for op in HookOperation::known() {
            assert!(
                cmd.find_subcommand(op.as_str()).is_some(),
                "no subcommand for {op}"
            );
        }
    }

    #[traced_test]
    #[test]
    fn test_unknown_operation_is_unsupported_and_succeeds() {
        let cli = Cli::try_parse_from(["cdikit-hook", "enable-cuda-compat", "--host-driver-version", "550"])
            .unwrap();
        assert!(matches!(
            &cli.command,
            Some(HookCommand::Unsupported(args)) if args[0] == "enable-cuda-compat"
        ));
        assert!(run(cli).is_ok());
        assert!(logs_contain("unsupported hook"));
        assert!(logs_contain("enable-cuda-compat"));
    }

    #[traced_test]
    #[test]
    fn test_no_operation_succeeds() {
        let cli = Cli::try_parse_from(["cdikit-hook", "--debug"]).unwrap();
        assert!(cli.command.is_none());
        assert!(run(cli).is_ok());
        assert!(logs_contain("no hook operation given"));
    }

    #[test]
    fn test_quiet_and_debug_flags() {
        let cli = Cli::try_parse_from(["cdikit-hook", "-d", "--quiet", "chmod", "--mode", "755"]).unwrap();
        assert!(cli.debug);
        assert!(cli.quiet);
    }

    #[test]
    fn test_parse_repeated_arguments() {
        let cli = Cli::try_parse_from([
            "cdikit-hook",
            "create-symlinks",
            "--link",
            "libcuda.so.1::/usr/lib64/libcuda.so",
            "--link",
            "../card1::/dev/dri/by-path/pci-0000:01:00.0-card",
        ])
        .unwrap();
        match cli.command {
            Some(HookCommand::CreateSymlinks { links }) => assert_eq!(links.len(), 2),
            _ => panic!("expected create-symlinks"),
        }
    }

    #[test]
    fn test_malformed_arguments_rejected() {
        assert!(Cli::try_parse_from(["cdikit-hook", "chmod", "--mode", "rwx"]).is_err());
        assert!(
            Cli::try_parse_from(["cdikit-hook", "create-symlinks", "--link", "no-separator"]).is_err()
        );
        assert!(Cli::try_parse_from([
            "cdikit-hook",
            "create-device-nodes",
            "--node",
            "/dev/nvidia0:q:195:0"
        ])
        .is_err());
    }

    #[test]
    fn test_hook_from_generated_spec_runs() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path();
        std::fs::create_dir_all(bundle.join("rootfs/dev/dri")).unwrap();
        std::fs::write(bundle.join("config.json"), r#"{"root":{"path":"rootfs"}}"#).unwrap();

        let hook = cdikit_core::Hook::create_container(
            "/usr/bin/cdikit-hook",
            HookOperation::CreateSymlinks,
            vec![
                "--link".to_string(),
                "../card1::/dev/dri/by-path/pci-0000:01:00.0-card".to_string(),
            ],
        );
        let mut argv = hook.argv();
        argv.push("--container-spec".to_string());
        argv.push(bundle.join("config.json").display().to_string());

        let cli = Cli::try_parse_from(argv).unwrap();
        run(cli).unwrap();

        let link = bundle.join("rootfs/dev/dri/by-path/pci-0000:01:00.0-card");
        assert_eq!(std::fs::read_link(link).unwrap(), PathBuf::from("../card1"));
    }
}
