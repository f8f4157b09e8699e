//! Load-balancer telemetry reconstructed from a live kernel over gdb.
//!
//! The kernel under test keeps a per-runqueue ring of load-balance log
//! records. `lbscope` drives a gdb remote session against it, waits for every
//! CPU to come up, then decodes those records through plain `print` queries
//! and writes them out as one JSON array.

use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use log::info;

pub mod capture;
pub mod coordinator;
pub mod decode;
pub mod error;
pub mod output;
pub mod settings;
pub mod target;

use crate::capture::{CaptureConfig, CaptureController};
use crate::coordinator::Coordinator;
use crate::settings::Settings;
use crate::target::GdbMi;

static SHUTDOWN: once_cell::sync::Lazy<Arc<AtomicBool>> =
    once_cell::sync::Lazy::new(|| Arc::new(AtomicBool::new(false)));

pub fn shutdown_flag() -> Arc<AtomicBool> {
    SHUTDOWN.clone()
}

/// Asks a running capture to stop at the next target stop and write what it
/// has so far.
pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

pub struct LbScopeEngine {
    pub settings: Settings,
    output: PathBuf,
    config: CaptureConfig,
    coordinator: Coordinator,
}

impl LbScopeEngine {
    pub fn new(settings: Settings) -> Result<Self> {
        let output = settings
            .output
            .clone()
            .context("No output file given (positional argument or OUTPUT)")?;
        let config = settings
            .capture_config()
            .context("Invalid capture configuration")?;
        let coordinator = settings.coordinator().context("Invalid coordinator")?;
        Ok(Self {
            settings,
            output,
            config,
            coordinator,
        })
    }

    /// Starts the debugger the capture will drive.
    pub fn spawn_debugger(&self) -> Result<GdbMi> {
        GdbMi::spawn(&self.settings.gdb.path)
            .with_context(|| format!("Failed to start {}", self.settings.gdb.path))
    }

    /// Runs a whole capture session on a fresh debugger. Blocks until the
    /// capture is done.
    pub fn run(self) -> Result<()> {
        let gdb = self.spawn_debugger()?;
        self.capture(gdb)
    }

    /// Runs a capture session on `gdb`. Blocks until the capture is done.
    pub fn capture(self, gdb: GdbMi) -> Result<()> {
        info!(
            "Capturing {:?} mode on {} cores from {}",
            self.config.mode, self.config.cores, self.config.endpoint
        );

        let controller = CaptureController::new(gdb, self.config, self.coordinator, shutdown_flag());
        let records = controller.run().context("Capture failed")?;

        output::write_dump(&self.output, &records)
    }
}
