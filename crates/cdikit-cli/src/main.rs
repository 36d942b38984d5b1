//! cdikit - Container Device Interface tooling CLI
//!
//! ## Commands
//!
//! - `cdi generate`: write a CDI specification for the accelerators on this
//!   host to a file or stdout

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gpu_topology::{DeviceLib, ProcfsDeviceLib};
use tracing::info;

use cdikit_core::config::DEFAULT_HOOK_PATH;
use cdikit_core::{
    generate_spec, level_from_flags, resolve_format, write_spec, GenerateConfig, OutputFormat,
};

#[derive(Parser)]
#[command(name = "cdikit")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Container Device Interface (CDI) tooling for accelerators", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Work with CDI specifications
    Cdi {
        #[command(subcommand)]
        action: CdiAction,
    },
}

#[derive(Subcommand)]
enum CdiAction {
    /// Generate a CDI specification for the devices on this host
    Generate(GenerateArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// File to write the spec to (default: stdout)
    #[arg(short, long, env = "CDIKIT_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format, json or yaml (default: from the output extension, else yaml)
    #[arg(long, env = "CDIKIT_FORMAT")]
    format: Option<OutputFormat>,

    /// Root under which driver libraries, binaries and sockets are located
    #[arg(long, env = "CDIKIT_DRIVER_ROOT", default_value = "/")]
    driver_root: PathBuf,

    /// Root under which /dev is located
    #[arg(long, env = "CDIKIT_DEV_ROOT", default_value = "/")]
    dev_root: PathBuf,

    /// Hook executable referenced by generated hooks
    #[arg(long, env = "CDIKIT_HOOK_PATH", default_value = DEFAULT_HOOK_PATH)]
    hook_path: String,

    /// Vendor part of the spec kind
    #[arg(long, default_value = "nvidia.com")]
    vendor: String,

    /// Class part of the spec kind
    #[arg(long, default_value = "gpu")]
    class: String,
}

impl GenerateArgs {
    fn config(&self) -> GenerateConfig {
        GenerateConfig {
            driver_root: self.driver_root.clone(),
            dev_root: self.dev_root.clone(),
            hook_path: self.hook_path.clone(),
            vendor: self.vendor.clone(),
            class: self.class.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    cdikit_core::init_tracing(cli.json, level_from_flags(cli.verbose, false));

    match cli.command {
        Commands::Cdi { action } => match action {
            CdiAction::Generate(args) => cmd_generate(&mut ProcfsDeviceLib::new(), &args),
        },
    }
}

fn cmd_generate<L: DeviceLib + ?Sized>(lib: &mut L, args: &GenerateArgs) -> Result<()> {
    let output = args.output.as_deref();
    let choice = resolve_format(args.format, output);

    let spec = generate_spec(lib, &args.config()).context("Failed to generate CDI spec")?;
    write_spec(&spec, choice.format, output).context("Failed to write CDI spec")?;

    match output.filter(|p| !p.as_os_str().is_empty()) {
        Some(path) => info!(
            "Wrote {} CDI spec with {} devices to {}",
            choice.format,
            spec.devices.len(),
            path.display()
        ),
        None => info!("Wrote {} CDI spec with {} devices", choice.format, spec.devices.len()),
    }
    Ok(())
}
