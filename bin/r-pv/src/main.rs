//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Command line front end for the R-PV modeling engine."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use r_pv_common::{init_tracing, AppConfig, LogFormat};
use r_pv_engine::ENGINE_VERSION;
use serde::Serialize;
use tracing::{info, warn};

mod calculate;
mod catalog;
mod context;
mod tools;

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "PV performance, sizing and financial modeling",
    long_about = None
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "Path to configuration file (overrides R_PV_CONFIG)"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Human readable console logs")]
    pretty: bool,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print version information and exit"
    )]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run a full calculation for a request document")]
    Calculate(calculate::CalculateArgs),
    #[command(about = "Fetch and summarize weather for a site")]
    Weather(calculate::WeatherArgs),
    #[command(about = "List catalog modules")]
    Modules,
    #[command(about = "List catalog inverters")]
    Inverters,
    #[command(about = "Show one module's specification")]
    Module { name: String },
    #[command(about = "Show one inverter's specification")]
    Inverter { name: String },
    #[command(about = "Check whether an inverter model suits a system size")]
    CheckSizing(tools::CheckSizingArgs),
    #[command(about = "Area of a latitude/longitude polygon in m²")]
    Area(tools::AreaArgs),
    #[command(about = "List mount types per temperature model")]
    MountTypes(tools::MountTypesArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("r-pv {ENGINE_VERSION}");
        return Ok(());
    }
    let Some(command) = cli.command else {
        println!("r-pv {ENGINE_VERSION}: no command given, see --help");
        return Ok(());
    };

    let (mut config, source) = load_config(cli.config.as_ref())?;
    if cli.pretty {
        config.logging.format = LogFormat::Pretty;
    }
    init_tracing("r-pv", &config.logging)?;
    match &source {
        Some(path) => info!(config = %path.display(), "configuration loaded"),
        None => warn!("no configuration file found; using built-in defaults"),
    }

    match command {
        Commands::Calculate(args) => calculate::run(args, &config).await?,
        Commands::Weather(args) => calculate::weather(args, &config).await?,
        Commands::Modules => catalog::list_modules(&config)?,
        Commands::Inverters => catalog::list_inverters(&config)?,
        Commands::Module { name } => catalog::show_module(&config, &name)?,
        Commands::Inverter { name } => catalog::show_inverter(&config, &name)?,
        Commands::CheckSizing(args) => tools::check_sizing(args, &config)?,
        Commands::Area(args) => tools::area(args)?,
        Commands::MountTypes(args) => tools::mount_types(args)?,
    }
    Ok(())
}

/// An explicit `--config` must exist; otherwise the usual candidates are
/// tried and built-in defaults apply when none is present.
fn load_config(explicit: Option<&PathBuf>) -> Result<(AppConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let loaded = AppConfig::load_with_source(&[path])
            .with_context(|| format!("failed to load {}", path.display()))?;
        return Ok((loaded.config, Some(loaded.source)));
    }
    let env_set = std::env::var(AppConfig::ENV_CONFIG_PATH)
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);
    let candidates = [
        PathBuf::from("configs/r-pv.toml"),
        PathBuf::from("configs/example.dev.toml"),
    ];
    if env_set || candidates.iter().any(|path| path.exists()) {
        let loaded = AppConfig::load_with_source(&candidates)?;
        return Ok((loaded.config, Some(loaded.source)));
    }
    Ok((AppConfig::default(), None))
}

/// Pretty JSON on stdout; logs go to stderr.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
