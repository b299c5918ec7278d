//! Nexus license client CLI
//!
//! Drives the license lifecycle from a terminal: activate a key, check it
//! against the licensing server, inspect the stored state, or run the
//! background revalidation loop.
//!
//! Usage:
//!   nexus-license activate --key NEXUS-XXXX-XXXX-XXXX
//!   nexus-license status --json

mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nexus_license::{LicenseConfig, LicenseError, LicenseManager, LicenseSnapshot};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nexus-license")]
#[command(about = "Manage the Nexus POS license on this device")]
struct Args {
    /// Path to a JSON config file (default: <data dir>/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the stored license without contacting the server
    Status,
    /// Print this device's identity token
    DeviceId,
    /// Activate a license key on this device
    Activate {
        /// License key, e.g. NEXUS-XXXX-XXXX-XXXX
        #[arg(short, long)]
        key: String,

        /// Licensing API base URL (default from config)
        #[arg(long)]
        api_base: Option<String>,
    },
    /// Revalidate the stored license with the server
    Check,
    /// Remove the license from this device
    Deactivate,
    /// Validate on startup, then keep revalidating until Ctrl-C
    Watch,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<LicenseConfig> {
    let path = match path {
        Some(path) => path.clone(),
        None => LicenseConfig::default()
            .resolved_data_dir()
            .context("Failed to locate the data directory")?
            .join("config.json"),
    };
    debug!("Loading config from {:?}", path);
    let config = LicenseConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    Ok(config.with_env_overrides())
}

fn print_snapshot(snapshot: &LicenseSnapshot, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(snapshot).context("Failed to encode snapshot")?;
        println!("{text}");
    } else {
        print!("{}", render::render(snapshot));
    }
    Ok(())
}

fn exit_code(snapshot: &LicenseSnapshot) -> ExitCode {
    if snapshot.is_licensed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(args.config.as_ref())?;
    let manager = Arc::new(
        LicenseManager::from_config(&config).context("Failed to open the license store")?,
    );

    match args.command {
        Command::Status => {
            let snapshot = manager.restore().await?;
            print_snapshot(&snapshot, args.json)?;
            Ok(exit_code(&snapshot))
        }
        Command::DeviceId => {
            let identity = manager.device_identity()?;
            if args.json {
                let value = serde_json::json!({
                    "device_identity": identity.as_str(),
                    "device_name": manager.device_name(),
                });
                println!("{value}");
            } else {
                println!("{identity}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Activate { key, api_base } => {
            let api_base = api_base.unwrap_or_else(|| config.api_base_url.clone());
            manager.restore().await?;
            let activated = manager
                .activate(&api_base, &key)
                .await
                .context("Activation failed")?;
            print_snapshot(&manager.snapshot().await, args.json)?;
            Ok(if activated {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Check => {
            if manager.restore().await?.record.is_none() {
                return Err(LicenseError::NotActivated.into());
            }
            manager.check_license().await.context("License check failed")?;
            let snapshot = manager.snapshot().await;
            print_snapshot(&snapshot, args.json)?;
            Ok(exit_code(&snapshot))
        }
        Command::Deactivate => {
            manager.deactivate().await?;
            if args.json {
                print_snapshot(&manager.snapshot().await, true)?;
            } else {
                println!("License removed from this device.");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch => watch(manager, &config, args.json).await,
    }
}

async fn watch(
    manager: Arc<LicenseManager>,
    config: &LicenseConfig,
    json: bool,
) -> Result<ExitCode> {
    let mut last = manager.start().await?;
    print_snapshot(&last, json)?;

    manager.start_revalidation();
    info!(
        "Revalidating every {:?} when due, press Ctrl-C to stop",
        config.poll_interval()
    );

    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let current = manager.snapshot().await;
                if current != last {
                    print_snapshot(&current, json)?;
                    last = current;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Stopping");
                break;
            }
        }
    }

    manager.stop_revalidation();
    Ok(exit_code(&last))
}
