//! Thingbus LoRa adapter
//!
//! This binary runs the lifecycle subscription that keeps the LoRa route
//! maps current. The network transport embeds `thingbus_lora::LoraAdapter`
//! over the same store to translate ids. With `store.backend = "remote"`
//! the store lives in a shared `thingbus-stored` process.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use thingbus_common::{Config, StoreBackend};
use thingbus_events::{RouteProjection, Subscription, SubscriptionOptions};
use thingbus_lora::open_store;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "thingbus-lora")]
#[command(about = "Thingbus LoRa protocol adapter")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/thingbus/lora.toml")]
    config: String,

    /// Store database file (embedded backend)
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// Store server address; selects the remote backend
    #[arg(long, env = "THINGBUS_STORE_ADDRESS")]
    store_address: Option<String>,

    /// Consumer group name
    #[arg(long)]
    group: Option<String>,

    /// Deployment instance tag, appended to the consumer name
    #[arg(long, env = "THINGBUS_LORA_INSTANCE")]
    instance: Option<String>,

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
    if let Some(address) = args.store_address {
        config.store.backend = StoreBackend::Remote;
        config.store.address = address;
    }
    if let Some(group) = args.group {
        config.events.group = group;
    }
    if let Some(instance) = args.instance {
        config.events.instance = instance;
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

    info!("Starting Thingbus LoRa adapter");
    info!("Config file: {}", args.config);

    let stores = match open_store(&config.store) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open store {}: {}", config.store.path.display(), e);
            std::process::exit(1);
        }
    };

    let projection = RouteProjection::new(stores.kv, &config.route_map);

    let mut subscription = Subscription::new(
        stores.streams,
        config.events.stream.clone(),
        SubscriptionOptions::from(&config.events),
        Arc::new(projection),
    )
    .spawn();
    info!(
        "Following {} as {}",
        config.events.stream,
        config.events.consumer_name()
    );

    // Returns `None` on ctrl-c
    let ended = tokio::select! {
        result = subscription.wait() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match ended {
        Some(Ok(())) => warn!("Lifecycle subscription ended"),
        Some(Err(e)) => {
            error!("Lifecycle subscription failed: {}", e);
            std::process::exit(1);
        }
        None => {
            info!("Shutting down...");
            subscription.shutdown().await?;
        }
    }

    info!("LoRa adapter shut down gracefully");
    Ok(())
}
