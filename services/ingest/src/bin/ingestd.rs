//! Ingestion daemon: venue WebSocket consumers feeding the ingestion
//! manager, publishing to the in-process broker.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use broker::MemoryBroker;
use config::Settings;
use ingest::{adapter_for, IngestionManager, ManagerConfig, WsConsumer};

#[derive(Parser, Debug)]
#[command(name = "ingestd", about = "Tidemark market data ingestion daemon")]
struct Args {
    /// Path to the YAML settings file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// TLS certificate pin (hex SHA-256 of the peer cert DER).
    #[arg(long)]
    tls_pin: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => Settings::load(path).context("loading settings")?,
        None => Settings::default(),
    };

    let broker = Arc::new(MemoryBroker::new());
    let mut manager = IngestionManager::new(
        broker.clone(),
        ManagerConfig {
            topic: settings.ingestion.topic.clone(),
            ..ManagerConfig::default()
        },
    );

    let streams: Vec<(String, String)> = settings
        .ingestion
        .symbols
        .iter()
        .flat_map(|symbol| {
            settings
                .ingestion
                .timeframes
                .iter()
                .map(move |tf| (symbol.clone(), tf.clone()))
        })
        .collect();

    let mut handles = Vec::new();
    for venue in &settings.ingestion.exchanges {
        let adapter = adapter_for(venue)
            .with_context(|| format!("unknown venue in ingestion.exchanges: {venue}"))?;
        let consumer = Arc::new(WsConsumer::new(
            adapter,
            streams.clone(),
            settings.ingestion.ws.clone(),
            args.tls_pin.clone(),
        ));
        manager.register_source(consumer.queue());
        handles.push(consumer.clone().spawn());
        info!(venue = %venue, streams = streams.len(), "consumer started");
    }

    let shutdown = manager.shutdown_handle();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown requested");
        shutdown.store(true, Ordering::SeqCst);
    });

    manager.run().await;

    for handle in handles {
        handle.join().await;
    }
    info!("ingestd stopped");
    Ok(())
}
