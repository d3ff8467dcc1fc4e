//! Pull loop standing in for the dataflow engine scheduler

use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use std::io::Write;
use tcp_source::{Produced, SourceStats, TcpSource};
use tracing::debug;

/// Call `produce` until end of stream, writing every produced block.
///
/// Returns the source counters at the end of the stream.
pub fn pump<W: Write>(
    source: &mut TcpSource,
    writer: &mut W,
    items_per_call: usize,
    format: OutputFormat,
) -> Result<SourceStats> {
    let block_size = source.geometry().block_size();
    let capacity = source.geometry().demand_bytes(items_per_call)?;
    let mut buffer = vec![0u8; capacity];

    loop {
        match source.produce(items_per_call, &mut buffer)? {
            Produced::Items(0) => debug!("No items this call"),
            Produced::Items(n) => {
                let bytes = &buffer[..n * block_size];
                let written = match format {
                    OutputFormat::Raw => writer.write_all(bytes),
                    OutputFormat::Hex => bytes
                        .chunks(block_size)
                        .try_for_each(|block| writeln!(writer, "{}", hex::encode(block))),
                };
                written.context("failed to write output")?;
                writer.flush().context("failed to flush output")?;
            }
            Produced::EndOfStream => break,
        }
    }

    Ok(source.stats())
}
