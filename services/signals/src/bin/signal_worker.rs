//! Signal worker: replays archived normalized events through the feature
//! and scoring pipeline, publishing signals to the in-process broker with
//! JSONL fallback.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use broker::MemoryBroker;
use config::Settings;
use signals::{ModelRunner, SignalWorker, WorkerConfig};
use types::NormalizedEvent;

#[derive(Parser, Debug)]
#[command(name = "signal_worker", about = "Tidemark feature and signal worker")]
struct Args {
    /// Path to the YAML settings file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// JSONL files of normalized events to process, in order.
    #[arg(short, long, required = true)]
    input: Vec<String>,

    /// Model artifact (JSON); a constant 0.5 model is used when omitted.
    #[arg(long)]
    model: Option<String>,

    /// Starting account equity for the risk gate.
    #[arg(long, default_value_t = 100_000.0)]
    equity: f64,
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

    let model = match &args.model {
        Some(path) => ModelRunner::load(path).context("loading model artifact")?,
        None => ModelRunner::constant(0.5),
    };

    let broker = Arc::new(MemoryBroker::new());
    let mut worker = SignalWorker::new(broker.clone(), &settings, model, WorkerConfig::default());
    worker
        .risk_mut()
        .update_equity(args.equity, chrono::Utc::now().timestamp_millis());

    let mut processed = 0usize;
    let mut emitted = 0usize;
    for path in &args.input {
        let file = std::fs::File::open(path).with_context(|| format!("opening {path}"))?;
        for line in std::io::BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event: NormalizedEvent = match serde_json::from_str(&line) {
                Ok(ev) => ev,
                Err(e) => {
                    warn!(error = %e, "skipping undecodable line");
                    continue;
                }
            };
            processed += 1;
            match worker.process_event(&event).await {
                Ok(Some(_)) => emitted += 1,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "row skipped"),
            }
        }
    }

    info!(
        processed,
        emitted,
        broker_signals = broker.len(&settings.signals.topic),
        "signal worker finished"
    );
    Ok(())
}
