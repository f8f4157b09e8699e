//! Control channel to the stopped target.
//!
//! Everything the decoder and the capture controller know about the target
//! goes through [`ControlChannel`]: textual expression evaluation, breakpoint
//! management, and blocking resume.

use std::{fmt, path::Path};

use crate::error::ChannelError;

pub mod gdb;
#[cfg(test)]
pub mod script;

pub use gdb::{GdbInterrupter, GdbMi};

/// Debugger-assigned breakpoint number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(pub u32);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why the target stopped after a resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopEvent {
    Breakpoint(BreakpointId),
    Signal(String),
    Exited(Option<i32>),
    Other(String),
}

/// Radix the debugger should print a value in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintFormat {
    Natural,
    Binary,
}

impl PrintFormat {
    /// The `print` command for this format, e.g. `print/t`.
    pub fn command(self) -> &'static str {
        match self {
            PrintFormat::Natural => "print",
            PrintFormat::Binary => "print/t",
        }
    }
}

pub trait ControlChannel {
    fn load_symbols(&mut self, path: &Path) -> Result<(), ChannelError>;

    fn connect(&mut self, endpoint: &str) -> Result<(), ChannelError>;

    fn set_breakpoint(&mut self, location: &str) -> Result<BreakpointId, ChannelError>;

    fn enable(&mut self, id: BreakpointId) -> Result<(), ChannelError>;

    fn disable(&mut self, id: BreakpointId) -> Result<(), ChannelError>;

    /// Resumes the target and blocks until it stops again.
    fn resume(&mut self) -> Result<StopEvent, ChannelError>;

    /// Evaluates `expression` in the current stop context and returns the
    /// debugger's reply text verbatim, e.g. `$3 = 42`.
    fn evaluate(&mut self, expression: &str, format: PrintFormat)
    -> Result<String, ChannelError>;
}
