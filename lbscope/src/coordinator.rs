//! Start signal for the external workload driver.
//!
//! The driver waits for `SIGUSR1` before it starts the workload, so the
//! workload only runs once every capture breakpoint is armed.

use config::ConfigError;
use log::info;

use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, Default)]
pub struct Coordinator {
    pid: Option<i32>,
}

impl Coordinator {
    /// `kill(2)` reads a pid of zero or below as a process group or as every
    /// process, so only positive pids are accepted.
    pub fn new(pid: Option<i32>) -> Result<Self, ConfigError> {
        match pid {
            Some(pid) if pid <= 0 => Err(ConfigError::Message(format!(
                "invalid coordinator pid {pid}: must be a positive process id"
            ))),
            pid => Ok(Self { pid }),
        }
    }

    pub fn signal_start(&self) -> Result<(), CaptureError> {
        let Some(pid) = self.pid else {
            return Ok(());
        };

        let ret = unsafe { libc::kill(pid, libc::SIGUSR1) };
        if ret != 0 {
            return Err(CaptureError::Coordinator {
                pid,
                source: std::io::Error::last_os_error(),
            });
        }
        info!("Signalled coordinator (pid {}) to start the workload", pid);
        Ok(())
    }
}
