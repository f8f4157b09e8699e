//! In-memory [`ControlChannel`] that answers from a script, for tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{BreakpointId, ControlChannel, PrintFormat, StopEvent};
use crate::error::ChannelError;

enum Reply {
    /// Rendered as `$N = value` with a fresh history number.
    Value(String),
    Raw(String),
}

#[derive(Default)]
pub struct ScriptedChannel {
    replies: HashMap<String, Reply>,
    stops: VecDeque<StopEvent>,
    /// Every evaluated command in order, e.g. `print rq->cpu`.
    pub queries: Vec<String>,
    /// `(id, location, enabled)` in creation order.
    pub breakpoints: Vec<(BreakpointId, String, bool)>,
    pub symbols: Option<PathBuf>,
    pub endpoint: Option<String>,
    history: u32,
    /// Raised when a resume finds no scripted stop left, like a shutdown
    /// request arriving while the target runs.
    exhausted: Option<Arc<AtomicBool>>,
}

fn key(expression: &str, format: PrintFormat) -> String {
    format!("{} {}", format.command(), expression)
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `print expr` with `$N = value`.
    pub fn value(&mut self, expr: &str, value: impl ToString) -> &mut Self {
        self.replies
            .insert(key(expr, PrintFormat::Natural), Reply::Value(value.to_string()));
        self
    }

    /// Answers `print expr` with a typed pointer, `$N = (ty *) addr`.
    pub fn pointer(&mut self, expr: &str, ty: &str, addr: u64) -> &mut Self {
        self.value(expr, format!("({ty} *) {addr:#x}"))
    }

    pub fn null(&mut self, expr: &str, ty: &str) -> &mut Self {
        self.pointer(expr, ty, 0)
    }

    /// Answers `print/t expr` with `$N = value`.
    pub fn binary(&mut self, expr: &str, value: impl ToString) -> &mut Self {
        self.replies
            .insert(key(expr, PrintFormat::Binary), Reply::Value(value.to_string()));
        self
    }

    /// Answers `print expr` with exactly `reply`.
    pub fn raw(&mut self, expr: &str, reply: &str) -> &mut Self {
        self.replies
            .insert(key(expr, PrintFormat::Natural), Reply::Raw(reply.to_string()));
        self
    }

    pub fn push_stop(&mut self, stop: StopEvent) -> &mut Self {
        self.stops.push_back(stop);
        self
    }

    pub fn raise_when_exhausted(&mut self, flag: Arc<AtomicBool>) -> &mut Self {
        self.exhausted = Some(flag);
        self
    }

    pub fn was_queried(&self, expr: &str) -> bool {
        self.queries.iter().any(|q| q == &key(expr, PrintFormat::Natural))
    }

    pub fn position(&self, expr: &str) -> Option<usize> {
        self.queries
            .iter()
            .position(|q| q == &key(expr, PrintFormat::Natural))
    }

    pub fn is_enabled(&self, location: &str) -> bool {
        self.breakpoints
            .iter()
            .any(|(_, loc, enabled)| loc == location && *enabled)
    }

    pub fn id_of(&self, location: &str) -> BreakpointId {
        self.breakpoints
            .iter()
            .find(|(_, loc, _)| loc == location)
            .map(|(id, _, _)| *id)
            .unwrap_or_else(|| panic!("no breakpoint at {location}"))
    }

    fn set_enabled(&mut self, id: BreakpointId, enabled: bool) -> Result<(), ChannelError> {
        let entry = self
            .breakpoints
            .iter_mut()
            .find(|(bp, _, _)| *bp == id)
            .ok_or_else(|| ChannelError::Rejected {
                command: format!("enable {}", id.0),
                message: format!("No breakpoint number {}.", id.0),
            })?;
        entry.2 = enabled;
        Ok(())
    }
}

impl ControlChannel for ScriptedChannel {
    fn load_symbols(&mut self, path: &Path) -> Result<(), ChannelError> {
        self.symbols = Some(path.to_path_buf());
        Ok(())
    }

    fn connect(&mut self, endpoint: &str) -> Result<(), ChannelError> {
        self.endpoint = Some(endpoint.to_string());
        Ok(())
    }

    fn set_breakpoint(&mut self, location: &str) -> Result<BreakpointId, ChannelError> {
        let id = BreakpointId(self.breakpoints.len() as u32 + 1);
        self.breakpoints.push((id, location.to_string(), true));
        Ok(id)
    }

    fn enable(&mut self, id: BreakpointId) -> Result<(), ChannelError> {
        self.set_enabled(id, true)
    }

    fn disable(&mut self, id: BreakpointId) -> Result<(), ChannelError> {
        self.set_enabled(id, false)
    }

    fn resume(&mut self) -> Result<StopEvent, ChannelError> {
        let stop = self.stops.pop_front();
        if stop.is_none() {
            if let Some(flag) = &self.exhausted {
                flag.store(true, Ordering::Relaxed);
            }
        }
        stop.ok_or(ChannelError::Closed)
    }

    fn evaluate(
        &mut self,
        expression: &str,
        format: PrintFormat,
    ) -> Result<String, ChannelError> {
        let command = key(expression, format);
        self.queries.push(command.clone());
        match self.replies.get(&command) {
            Some(Reply::Value(value)) => {
                self.history += 1;
                Ok(format!("${} = {}", self.history, value))
            }
            Some(Reply::Raw(reply)) => Ok(reply.clone()),
            None => Err(ChannelError::Rejected {
                command,
                message: "No symbol in current context.".to_string(),
            }),
        }
    }
}
