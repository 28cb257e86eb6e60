#![forbid(unsafe_code)]

//! `pull-bridge-deploy`: installs or removes the web UI tree.
//!
//! The installed directory holds the browser assets plus a
//! `pull-bridge.toml` that points the server at it:
//!
//! ```text
//! pull-bridge-deploy install --verbose
//! pull-bridge --config ~/ollama-webui/pull-bridge.toml
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use pull_bridge::deploy::catalog::parse_catalog;
use pull_bridge::deploy::{self, DeployReport, InstallOptions};
use pull_bridge::{AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "pull-bridge-deploy",
    about = "Install or remove the pull-bridge web UI",
    version,
    long_about = None
)]
struct Cli {
    /// Target directory. Defaults to `~/ollama-webui`.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Preview actions without executing them.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Log every file operation.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the web UI and its config into the target directory.
    Install {
        /// JSON model catalog to ship instead of the bundled one.
        #[arg(long)]
        models: Option<PathBuf>,
    },

    /// Delete the target directory.
    Uninstall,
}

fn main() {
    let args = Cli::parse();
    init_tracing(args.verbose);

    match execute(&args) {
        Ok(report) => print_report(&report),
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}

fn execute(args: &Cli) -> Result<DeployReport> {
    let target = match &args.dir {
        Some(dir) => dir.clone(),
        None => deploy::default_target()?,
    };

    match &args.command {
        Command::Install { models } => {
            let catalog = models.as_deref().map(load_catalog).transpose()?;
            deploy::install(&InstallOptions {
                target,
                dry_run: args.dry_run,
                catalog,
            })
        }
        Command::Uninstall => deploy::uninstall(&target, args.dry_run),
    }
}

fn load_catalog(path: &Path) -> Result<Vec<deploy::catalog::ModelEntry>> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        AppError::Deploy(format!("cannot read model catalog {}: {err}", path.display()))
    })?;
    parse_catalog(&raw)
}

fn print_report(report: &DeployReport) {
    if report.actions.is_empty() {
        println!("Nothing to do.");
        return;
    }
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    for action in &report.actions {
        println!("{prefix}{action}");
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A second initialization can only fail in tests; logging is optional here.
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
