//! Breakpoint-driven capture state machine.
//!
//! Every CPU first reports in at the readiness breakpoint. Only once all of
//! them have is the capture mode armed: either the per-site breakpoints that
//! decode the slot at the write cursor, or the wraparound breakpoint that
//! drains the whole ring.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::ValueEnum;
use lbscope_common::RdLogMsg;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::coordinator::Coordinator;
use crate::decode::{RingWalker, SchemaDecoder};
use crate::error::{CaptureError, ChannelError, InvalidSite};
use crate::target::{BreakpointId, ControlChannel, StopEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Decode the slot at the write cursor on every capture-site hit.
    #[default]
    Single,
    /// Decode every slot when the ring wraps around.
    Drain,
}

/// A breakpoint location plus the `struct rq *` expression valid there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub location: String,
    pub rq: String,
}

impl FromStr for Site {
    type Err = InvalidSite;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('@') {
            Some((location, rq)) if !location.is_empty() && !rq.is_empty() => Ok(Site {
                location: location.to_string(),
                rq: rq.to_string(),
            }),
            _ => Err(InvalidSite(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub cores: usize,
    pub symbols: PathBuf,
    pub endpoint: String,
    pub mode: CaptureMode,
    pub ready: String,
    pub sites: Vec<Site>,
    pub wraparound: Site,
    pub iterations: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Init,
    AwaitingReady,
    Armed,
    Capturing,
    Done,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Init => "init",
            CaptureState::AwaitingReady => "awaiting-ready",
            CaptureState::Armed => "armed",
            CaptureState::Capturing => "capturing",
            CaptureState::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
enum Handler {
    Readiness,
    SingleEntry { rq: String },
    FullDrain { rq: String },
}

pub struct CaptureController<C: ControlChannel> {
    channel: C,
    config: CaptureConfig,
    coordinator: Coordinator,
    shutdown: Arc<AtomicBool>,
    state: CaptureState,
    handlers: HashMap<BreakpointId, Handler>,
    ready_bp: Option<BreakpointId>,
    capture_bps: Vec<BreakpointId>,
    ready_count: usize,
    captures: u64,
    records: Vec<Option<RdLogMsg>>,
}

impl<C: ControlChannel> CaptureController<C> {
    pub fn new(
        channel: C,
        config: CaptureConfig,
        coordinator: Coordinator,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            channel,
            config,
            coordinator,
            shutdown,
            state: CaptureState::Init,
            handlers: HashMap::new(),
            ready_bp: None,
            capture_bps: Vec::new(),
            ready_count: 0,
            captures: 0,
            records: Vec::new(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn records(&self) -> &[Option<RdLogMsg>] {
        &self.records
    }

    /// Drives the target until the iteration limit or a shutdown request and
    /// returns every captured slot in capture order.
    pub fn run(mut self) -> Result<Vec<Option<RdLogMsg>>, CaptureError> {
        self.init()?;
        while self.state != CaptureState::Done {
            if self.shutdown_requested() {
                info!("Shutdown requested, not resuming the target");
                self.transition(CaptureState::Done);
                break;
            }
            let stop = match self.channel.resume() {
                Ok(stop) => stop,
                // every record so far is complete, so they are still written out
                Err(e) if self.shutdown_requested() => {
                    warn!("Debugger failed after shutdown request: {}", e);
                    self.transition(CaptureState::Done);
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            self.handle_stop(stop)?;
        }
        info!("Capture finished with {} records", self.records.len());
        Ok(self.records)
    }

    fn transition(&mut self, next: CaptureState) {
        if self.state != next {
            info!("Capture state {} -> {}", self.state, next);
            self.state = next;
        }
    }

    pub fn init(&mut self) -> Result<(), CaptureError> {
        info!("Loading symbols from {}", self.config.symbols.display());
        self.channel.load_symbols(&self.config.symbols)?;
        info!("Connecting to {}", self.config.endpoint);
        self.channel.connect(&self.config.endpoint)?;

        let ready = self.channel.set_breakpoint(&self.config.ready)?;
        info!("Readiness breakpoint {} at {}", ready, self.config.ready);
        self.handlers.insert(ready, Handler::Readiness);
        self.ready_bp = Some(ready);

        let sites = match self.config.mode {
            CaptureMode::Single => self.config.sites.clone(),
            CaptureMode::Drain => vec![self.config.wraparound.clone()],
        };
        for site in sites {
            let id = self.channel.set_breakpoint(&site.location)?;
            self.channel.disable(id)?;
            info!(
                "Capture breakpoint {} at {} (rq: {}), disabled until ready",
                id, site.location, site.rq
            );
            let handler = match self.config.mode {
                CaptureMode::Single => Handler::SingleEntry { rq: site.rq },
                CaptureMode::Drain => Handler::FullDrain { rq: site.rq },
            };
            self.handlers.insert(id, handler);
            self.capture_bps.push(id);
        }

        self.transition(CaptureState::AwaitingReady);
        Ok(())
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn handle_stop(&mut self, stop: StopEvent) -> Result<(), CaptureError> {
        if self.shutdown_requested() {
            info!("Shutdown requested at {:?}", stop);
            self.transition(CaptureState::Done);
            return Ok(());
        }

        let id = match stop {
            StopEvent::Breakpoint(id) => id,
            StopEvent::Exited(code) => return Err(ChannelError::TargetExited(code).into()),
            StopEvent::Signal(signal) => {
                warn!("Target stopped by {}, resuming", signal);
                return Ok(());
            }
            StopEvent::Other(reason) => {
                warn!("Target stopped ({}), resuming", reason);
                return Ok(());
            }
        };

        let Some(handler) = self.handlers.get(&id).cloned() else {
            warn!("Ignoring stop at unknown breakpoint {}", id);
            return Ok(());
        };

        match (handler, self.state) {
            (Handler::Readiness, CaptureState::AwaitingReady) => self.on_ready(),
            (Handler::SingleEntry { rq }, CaptureState::Armed | CaptureState::Capturing) => {
                self.capture_single(&rq)
            }
            (Handler::FullDrain { rq }, CaptureState::Armed | CaptureState::Capturing) => {
                self.capture_drain(&rq)
            }
            (handler, state) => {
                warn!("Ignoring {:?} stop at {} while {}", handler, id, state);
                Ok(())
            }
        }
    }

    fn on_ready(&mut self) -> Result<(), CaptureError> {
        self.ready_count += 1;
        info!("CPU ready ({}/{})", self.ready_count, self.config.cores);
        if self.ready_count >= self.config.cores {
            self.arm()?;
        }
        Ok(())
    }

    fn arm(&mut self) -> Result<(), CaptureError> {
        if let Some(ready) = self.ready_bp {
            self.channel.disable(ready)?;
        }
        for &id in &self.capture_bps {
            self.channel.enable(id)?;
        }
        self.transition(CaptureState::Armed);
        self.coordinator.signal_start()?;
        self.check_limit();
        Ok(())
    }

    fn capture_single(&mut self, rq: &str) -> Result<(), CaptureError> {
        let walker = RingWalker::new(rq);
        let mut decoder = SchemaDecoder::new(&mut self.channel, self.config.cores);

        let sd_count = walker.sd_count(decoder.values())?;
        let slot = walker.slot(decoder.values(), None)?;
        let record = decoder.decode_slot(&slot, sd_count)?;
        debug!("Captured {} from {}", slot, rq);

        self.records.push(record.and_then(|r| r.payload));
        self.finish_capture();
        Ok(())
    }

    fn capture_drain(&mut self, rq: &str) -> Result<(), CaptureError> {
        let walker = RingWalker::new(rq);
        let mut decoder = SchemaDecoder::new(&mut self.channel, self.config.cores);

        let capacity = walker.capacity(decoder.values())?;
        let sd_count = walker.sd_count(decoder.values())?;
        info!("Draining {} slots from {} (sd_count {})", capacity, rq, sd_count);
        for index in 0..capacity {
            let record = decoder.decode_slot(&walker.slot_expr(index), sd_count)?;
            self.records.push(record.and_then(|r| r.payload));
        }

        self.finish_capture();
        Ok(())
    }

    fn finish_capture(&mut self) {
        self.captures += 1;
        info!(
            "Capture {} done, {} records so far",
            self.captures,
            self.records.len()
        );
        self.transition(CaptureState::Capturing);
        self.check_limit();
    }

    fn check_limit(&mut self) {
        if let Some(limit) = self.config.iterations {
            if self.captures >= limit {
                info!("Reached iteration limit {}", limit);
                self.transition(CaptureState::Done);
            }
        }
    }

    #[cfg(test)]
    fn channel(&self) -> &C {
        &self.channel
    }
}
