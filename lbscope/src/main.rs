use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lbscope::{
    LbScopeEngine, capture::CaptureMode, request_shutdown, settings::Settings,
};
use log::{info, warn};
use tokio::signal;

#[derive(Debug, Parser)]
#[command(name = "lbscope")]
#[command(about = "Capture load-balancer logs from a gdb-attached kernel as JSON")]
struct Cli {
    /// File to write the JSON dump to
    #[arg(env = "OUTPUT")]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Stop after this many captures
    #[arg(long)]
    iters: Option<u64>,

    /// Capture mode, overrides CAPTURE__MODE
    #[arg(long, value_enum)]
    mode: Option<CaptureMode>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "info" } else { "warn" }),
    )
    .init();

    let mut settings = Settings::new().context("Failed to load settings")?;
    if cli.output.is_some() {
        settings.output = cli.output;
    }
    if cli.iters.is_some() {
        settings.iters = cli.iters;
    }
    if let Some(mode) = cli.mode {
        settings.capture.mode = mode;
    }

    let engine = LbScopeEngine::new(settings)?;
    let gdb = engine.spawn_debugger()?;
    let interrupter = gdb.interrupter();
    let mut capture = tokio::task::spawn_blocking(move || engine.capture(gdb));

    tokio::select! {
        result = &mut capture => return result?,
        _ = signal::ctrl_c() => {
            info!("Ctrl-C received, finishing capture...");
            request_shutdown();
            if let Err(e) = interrupter.interrupt() {
                warn!("Failed to interrupt gdb: {}", e);
            }
        }
    }

    tokio::select! {
        result = &mut capture => result?,
        _ = signal::ctrl_c() => {
            warn!("Second Ctrl-C, exiting without writing a dump");
            std::process::exit(130);
        }
    }
}
