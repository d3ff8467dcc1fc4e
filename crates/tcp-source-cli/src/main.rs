//! tcp-source binary
//!
//! Drives a [`TcpSource`] the way a pull-based scheduler would and writes
//! the produced blocks to a file or stdout.

mod cli;
mod pump;

use anyhow::{Context, Result};
use cli::Cli;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use tcp_source::{ShutdownSignal, TcpSource};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize tracing; stdout may carry the data stream
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    let config = cli.source_config()?;
    tracing::info!(
        "tcp-source starting as {} on {}:{}",
        config.role,
        config.host,
        config.port
    );

    let shutdown = ShutdownSignal::new();
    let mut source = TcpSource::with_shutdown(&config, shutdown.clone())?;

    let mut writer: Box<dyn Write + Send> = if cli.output == "-" {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        let file = File::create(&cli.output)
            .with_context(|| format!("failed to create output {}", cli.output))?;
        Box::new(BufWriter::new(file))
    };

    // Handle Ctrl+C for graceful shutdown
    let signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        signal.trigger();
    });

    let items_per_call = cli.items_per_call;
    let format = cli.format;
    let stats = tokio::task::spawn_blocking(move || {
        pump::pump(&mut source, &mut writer, items_per_call, format)
    })
    .await
    .context("pump task panicked")??;

    tracing::info!("Stream finished: {}", serde_json::to_string(&stats)?);
    Ok(())
}
