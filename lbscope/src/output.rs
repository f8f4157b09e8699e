//! JSON rendering of captured records.
//!
//! The dump is a single array with one element per captured slot: `null` for
//! a slot that held nothing decodable, otherwise the `rebalance_domains()`
//! record with enums as their kernel symbols.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use lbscope_common::RdLogMsg;
use log::info;
use serde_json::Value;

pub fn render(records: &[Option<RdLogMsg>]) -> serde_json::Result<Value> {
    serde_json::to_value(records)
}

pub fn write_dump(path: &Path, records: &[Option<RdLogMsg>]) -> Result<()> {
    let dump = render(records).context("Failed to render records")?;
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &dump)
        .with_context(|| format!("Failed to write records to {}", path.display()))?;
    writeln!(writer)?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;

    info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}
