use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::capture::{CaptureConfig, CaptureMode, Site};
use crate::coordinator::Coordinator;

/// Names an optional YAML file layered under the environment.
pub const CONFIG_FILE_ENV: &str = "LBSCOPE_CONFIG";

const DEFAULT_SITES: [&str; 2] = ["rebalance_domains:out@rq", "newidle_balance:out@this_rq"];

#[derive(Debug, Deserialize, Clone)]
pub struct GdbSettings {
    pub path: String,
    pub host: String,
    pub port: u16,
    pub symbols: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureSettings {
    pub mode: CaptureMode,
    /// Readiness breakpoint location.
    pub ready: String,
    /// Single-entry capture sites, `location@rq-expression`.
    pub sites: Vec<String>,
    pub wraparound: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Topology descriptor such as `4-8`; the leading number is the core count.
    pub topology: String,
    pub output: Option<PathBuf>,
    pub iters: Option<u64>,
    pub coordinator_pid: Option<i32>,
    pub gdb: GdbSettings,
    pub capture: CaptureSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = Config::builder()
            .set_default("topology", "2")?
            .set_default("gdb.path", "gdb")?
            .set_default("gdb.host", "localhost")?
            .set_default("gdb.port", 1234_i64)?
            .set_default("gdb.symbols", "vmlinux")?
            .set_default("capture.mode", "single")?
            .set_default("capture.ready", "lb_log_cpu_ready")?
            .set_default("capture.sites", DEFAULT_SITES.to_vec())?
            .set_default("capture.wraparound", "lb_log_wrapped@rq")?;

        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(File::new(&path, FileFormat::Yaml).required(true));
        }

        let s = builder
            .add_source(
                Environment::default()
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("capture.sites")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    pub fn cores(&self) -> Result<usize, ConfigError> {
        core_count(&self.topology)
    }

    pub fn coordinator(&self) -> Result<Coordinator, ConfigError> {
        Coordinator::new(self.coordinator_pid)
    }

    pub fn capture_config(&self) -> Result<CaptureConfig, ConfigError> {
        let parse_site = |s: &str| {
            s.parse::<Site>()
                .map_err(|e| ConfigError::Message(e.to_string()))
        };

        Ok(CaptureConfig {
            cores: self.cores()?,
            symbols: self.gdb.symbols.clone(),
            endpoint: format!("{}:{}", self.gdb.host, self.gdb.port),
            mode: self.capture.mode,
            ready: self.capture.ready.clone(),
            sites: self
                .capture
                .sites
                .iter()
                .map(|s| parse_site(s))
                .collect::<Result<_, _>>()?,
            wraparound: parse_site(&self.capture.wraparound)?,
            iterations: self.iters,
        })
    }
}

/// Core count of a topology descriptor: its leading integer, so `4-8` has 4.
pub fn core_count(topology: &str) -> Result<usize, ConfigError> {
    topology
        .split('-')
        .next()
        .and_then(|lead| lead.trim().parse::<usize>().ok())
        .filter(|&cores| cores > 0)
        .ok_or_else(|| {
            ConfigError::Message(format!(
                "invalid topology `{topology}`: expected a leading core count"
            ))
        })
}
