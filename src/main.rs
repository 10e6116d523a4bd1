// Copyright 2025 RADAR-base
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use radar_rest_producer::config::{load_config_with_env, LoggingConfig};
use radar_rest_producer::{
    ConnectionPool, ConnectionState, HttpSchemaRegistryClient, RestSender, SchemaRetriever,
};

/// REST proxy producer - check and monitor proxy connectivity
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    /// Check the proxy once and exit
    #[arg(long)]
    once: bool,
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config_with_env(&args.config)?;
    init_logging(&config.logging)?;

    info!("Starting REST producer");
    info!("Loaded configuration from: {:?}", args.config);
    info!("REST proxy: {}", config.rest.url);
    info!("Schema registry: {}", config.schema_registry.url);

    let pool = Arc::new(ConnectionPool::new(config.rest.tls));
    let registry = HttpSchemaRegistryClient::new(&config.schema_registry, &pool)?;
    let schemas = Arc::new(SchemaRetriever::with_validity(
        Arc::new(registry),
        config.schema_registry.cache_validity(),
    ));
    let state = Arc::new(ConnectionState::new(config.connection.timeout())?);
    let sender = RestSender::new(&config.rest, &pool, schemas, state)?;

    match sender.reset_connection().await {
        Ok(true) => info!("REST proxy {} is reachable", sender.base_url()),
        Ok(false) => warn!("REST proxy {} is not reachable", sender.base_url()),
        Err(e) => error!("REST proxy {} rejected the connection check: {}", sender.base_url(), e),
    }

    if args.once {
        return Ok(());
    }

    let heartbeat = match config.connection.heartbeat_interval() {
        Some(interval) => {
            info!("Probing REST proxy every {:?}", interval);
            Some(sender.spawn_heartbeat(interval))
        }
        None => {
            info!("Heartbeat disabled");
            None
        }
    };

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    if let Some(heartbeat) = heartbeat {
        heartbeat.abort();
    }
    info!(
        "REST producer shut down (last state {})",
        sender.connection_state().current_state()
    );

    Ok(())
}
