//! CLI argument parsing for tcp-source

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tcp_source::{Role, SourceConfig};

/// How produced blocks are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Bytes exactly as received
    Raw,
    /// One hex-encoded block per line
    Hex,
}

/// Receive fixed-size blocks from a TCP peer and write them out
#[derive(Parser, Debug, Clone)]
#[command(name = "tcp-source")]
#[command(about = "Receive fixed-size blocks from a TCP peer")]
#[command(version)]
pub struct Cli {
    /// TOML configuration file; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Connection role (client or server)
    #[arg(long)]
    pub mode: Option<Role>,

    /// Remote host (client mode)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to connect to or listen on
    #[arg(long)]
    pub port: Option<String>,

    /// Bytes per item
    #[arg(long)]
    pub item_size: Option<usize>,

    /// Items per transfer unit
    #[arg(long)]
    pub vector_length: Option<usize>,

    /// Items requested per produce call
    #[arg(long, default_value = "1024")]
    pub items_per_call: usize,

    /// Output file, "-" for stdout
    #[arg(long, default_value = "-")]
    pub output: String,

    /// Output encoding
    #[arg(long, value_enum, default_value = "raw")]
    pub format: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Build the source configuration from the file (if any) and flags
    pub fn source_config(&self) -> Result<SourceConfig> {
        let mut config = match &self.config {
            Some(path) => SourceConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => {
                let (Some(item_size), Some(port)) = (self.item_size, &self.port) else {
                    bail!("--item-size and --port are required without --config");
                };
                SourceConfig::new(item_size, 1, "", port, self.mode.unwrap_or(Role::Server))
            }
        };

        if let Some(mode) = self.mode {
            config.role = mode;
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if let Some(item_size) = self.item_size {
            config.item_size = item_size;
        }
        if let Some(vector_length) = self.vector_length {
            config.vector_length = vector_length;
        }
        if self.items_per_call == 0 {
            bail!("--items-per-call must be positive");
        }

        config.validate()?;
        Ok(config)
    }
}
