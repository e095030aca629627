//! Thingbus store server
//!
//! Owns the durable redb store and serves it over TCP, so the things
//! service and every protocol adapter share one set of keys, streams and
//! consumer groups.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use thingbus_common::Config;
use thingbus_store::{RedbStore, StoreServer};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "thingbus-stored")]
#[command(about = "Thingbus shared store server")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/thingbus/stored.toml")]
    config: String,

    /// Store database file
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// Listen address
    #[arg(long)]
    listen: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config file if it exists, then let CLI flags take precedence
    let mut config = Config::load(&args.config)?;
    if let Some(path) = args.store_path {
        config.store.path = path;
    }
    if let Some(listen) = args.listen {
        config.store.address = listen;
    }
    config.validate()?;
    let log_level = if args.log_level == "info" {
        config.logging.level.clone()
    } else {
        args.log_level
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Thingbus store server");
    info!("Config file: {}", args.config);
    info!("Store: {}", config.store.path.display());

    let store = match RedbStore::open(&config.store.path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to open store {}: {}", config.store.path.display(), e);
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(&config.store.address).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", config.store.address, e);
            std::process::exit(1);
        }
    };

    let server = tokio::spawn(Arc::new(StoreServer::new(store)).serve(listener));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    server.abort();

    info!("Store server shut down gracefully");
    Ok(())
}
