//! Nexus licensing development server
//!
//! Serves the licensing API from memory, seeded with a fixed set of test
//! keys, so the client can be exercised without the production service.
//!
//! Usage:
//!   nexus-license-devserver --port 3000

use anyhow::{Context, Result};
use clap::Parser;
use nexus_license_devserver::{build_router, LicenseRegistry};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "nexus-license-devserver")]
#[command(about = "In-memory Nexus licensing API for local development")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let registry = Arc::new(LicenseRegistry::seeded());
    let addr = format!("{}:{}", args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Licensing API listening on http://{}/api", addr);

    println!("\n========================================");
    println!("  Nexus Licensing Dev Server");
    println!("========================================");
    println!("  API base: http://{}/api", addr);
    println!("\n  Test licenses:");
    for license in registry.list() {
        let state = if !license.is_active {
            "deactivated".to_string()
        } else if let Some(exp) = &license.expires_at {
            format!("expires {exp}")
        } else {
            "no expiry".to_string()
        };
        println!(
            "  {}  max {}  {}",
            license.license_key, license.max_activations, state
        );
    }
    println!("========================================\n");

    axum::serve(listener, build_router(registry))
        .await
        .context("HTTP server failed")
}
