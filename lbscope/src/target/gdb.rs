//! [`ControlChannel`] backed by a `gdb --interpreter=mi2` child process.
//!
//! Commands are written token-prefixed on gdb's stdin; the reply is the
//! result record carrying the same token. Console stream output seen before
//! that record is the human-readable reply (`$1 = 42`) that the value
//! channel parses.

use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use super::{BreakpointId, ControlChannel, PrintFormat, StopEvent};
use crate::error::ChannelError;

pub struct GdbMi {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_token: u64,
    interrupter: GdbInterrupter,
}

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    interrupted: bool,
}

/// Stops a target that a [`GdbMi`] on another thread is blocked resuming.
///
/// gdb runs in its own process group so a terminal Ctrl-C only reaches us;
/// the interrupt is forwarded as `SIGINT` while the target runs, which gdb
/// turns into a `*stopped` record. An interrupt that lands while the target
/// is stopped keeps the next resume from running it at all.
#[derive(Debug, Clone)]
pub struct GdbInterrupter {
    pid: i32,
    state: Arc<Mutex<RunState>>,
}

impl GdbInterrupter {
    fn new(pid: i32) -> Self {
        Self {
            pid,
            state: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn interrupt(&self) -> io::Result<()> {
        let mut state = self.lock();
        state.interrupted = true;
        if !state.running {
            return Ok(());
        }

        let ret = unsafe { libc::kill(self.pid, libc::SIGINT) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        info!("Interrupted gdb (pid {})", self.pid);
        Ok(())
    }

    pub fn is_interrupted(&self) -> bool {
        self.lock().interrupted
    }
}

/// A successful result record.
#[derive(Debug)]
struct Response {
    results: String,
    console: String,
}

impl GdbMi {
    pub fn spawn(gdb: impl AsRef<OsStr>) -> Result<Self, ChannelError> {
        let gdb = gdb.as_ref();
        let mut child = Command::new(gdb)
            .args(["--nx", "--quiet", "--interpreter=mi2"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .process_group(0)
            .spawn()?;

        let stdin = child.stdin.take().ok_or(ChannelError::Closed)?;
        let stdout = child.stdout.take().ok_or(ChannelError::Closed)?;
        let pid = i32::try_from(child.id())
            .map_err(|_| io::Error::other(format!("pid {} out of range", child.id())))?;
        info!("Spawned {} (pid {})", gdb.to_string_lossy(), pid);

        let mut mi = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            next_token: 0,
            interrupter: GdbInterrupter::new(pid),
        };
        mi.command("-gdb-set pagination off")?;
        mi.command("-gdb-set confirm off")?;
        mi.command("-gdb-set print pretty off")?;
        Ok(mi)
    }

    pub fn interrupter(&self) -> GdbInterrupter {
        self.interrupter.clone()
    }

    fn wait_for_stop(&mut self) -> Result<StopEvent, ChannelError> {
        loop {
            let line = self.read_line()?;
            match parse_record(&line) {
                Record::Exec {
                    class: "stopped",
                    rest,
                } => return Ok(stop_event(rest)),
                Record::Console(text) => info!("gdb: {}", text.trim_end()),
                Record::Target(text) => info!("target: {}", text.trim_end()),
                _ => {}
            }
        }
    }

    fn read_line(&mut self) -> Result<String, ChannelError> {
        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Err(ChannelError::Closed);
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        debug!("gdb <- {}", line);
        Ok(line)
    }

    fn command(&mut self, command: &str) -> Result<Response, ChannelError> {
        self.next_token += 1;
        let token = self.next_token;
        debug!("gdb -> {}{}", token, command);
        writeln!(self.stdin, "{token}{command}")?;
        self.stdin.flush()?;

        let mut console = String::new();
        loop {
            let line = self.read_line()?;
            match parse_record(&line) {
                Record::Result {
                    token: Some(t),
                    class,
                    rest,
                } if t == token => {
                    return match class {
                        "done" | "running" | "connected" => Ok(Response {
                            results: rest.to_string(),
                            console,
                        }),
                        "error" => Err(ChannelError::Rejected {
                            command: command.to_string(),
                            message: field(rest, "msg").unwrap_or_else(|| rest.to_string()),
                        }),
                        "exit" => Err(ChannelError::Closed),
                        _ => Err(ChannelError::Protocol {
                            command: command.to_string(),
                            line: line.clone(),
                        }),
                    };
                }
                Record::Console(text) => console.push_str(&text),
                Record::Log(text) => debug!("gdb: {}", text.trim_end()),
                Record::Target(text) => info!("target: {}", text.trim_end()),
                _ => {}
            }
        }
    }
}

impl ControlChannel for GdbMi {
    fn load_symbols(&mut self, path: &Path) -> Result<(), ChannelError> {
        self.command(&format!(
            "-file-exec-and-symbols {}",
            quote(&path.to_string_lossy())
        ))?;
        Ok(())
    }

    fn connect(&mut self, endpoint: &str) -> Result<(), ChannelError> {
        self.command(&format!("-target-select remote {endpoint}"))?;
        Ok(())
    }

    fn set_breakpoint(&mut self, location: &str) -> Result<BreakpointId, ChannelError> {
        let command = format!("-break-insert {location}");
        let response = self.command(&command)?;
        field(&response.results, "number")
            .and_then(|n| n.parse().ok())
            .map(BreakpointId)
            .ok_or(ChannelError::Protocol {
                command,
                line: response.results,
            })
    }

    fn enable(&mut self, id: BreakpointId) -> Result<(), ChannelError> {
        self.command(&format!("-break-enable {}", id.0))?;
        Ok(())
    }

    fn disable(&mut self, id: BreakpointId) -> Result<(), ChannelError> {
        self.command(&format!("-break-disable {}", id.0))?;
        Ok(())
    }

    fn resume(&mut self) -> Result<StopEvent, ChannelError> {
        let interrupter = self.interrupter.clone();
        {
            // held until gdb reports `^running` so a SIGINT never races the command
            let mut state = interrupter.lock();
            if state.interrupted {
                info!("Interrupt pending, not resuming the target");
                return Ok(StopEvent::Signal("SIGINT".to_string()));
            }
            self.command("-exec-continue")?;
            state.running = true;
        }

        let stop = self.wait_for_stop();
        interrupter.lock().running = false;
        stop
    }

    fn evaluate(
        &mut self,
        expression: &str,
        format: PrintFormat,
    ) -> Result<String, ChannelError> {
        let print = format!("{} {}", format.command(), expression);
        let response = self.command(&format!("-interpreter-exec console {}", quote(&print)))?;
        Ok(response.console.trim_end().to_string())
    }
}

impl Drop for GdbMi {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "-target-detach");
        let _ = writeln!(self.stdin, "-gdb-exit");
        let _ = self.stdin.flush();
        match self.child.wait() {
            Ok(status) => debug!("gdb exited with {}", status),
            Err(e) => warn!("Failed to reap gdb: {}", e),
        }
    }
}

/// One line of MI output.
#[derive(Debug, PartialEq)]
enum Record<'a> {
    Result {
        token: Option<u64>,
        class: &'a str,
        rest: &'a str,
    },
    Exec {
        class: &'a str,
        rest: &'a str,
    },
    Notify(&'a str),
    Console(String),
    Log(String),
    Target(String),
    Prompt,
    Unknown(&'a str),
}

fn parse_record(line: &str) -> Record<'_> {
    if line.trim_end() == "(gdb)" {
        return Record::Prompt;
    }

    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    let token = line[..digits].parse().ok();
    let body = &line[digits..];

    let stream = |text: &str| parse_cstring(text).map(|(s, _)| s);
    let mut chars = body.chars();
    match chars.next() {
        Some('^') => {
            let (class, rest) = split_class(chars.as_str());
            Record::Result { token, class, rest }
        }
        Some('*') => {
            let (class, rest) = split_class(chars.as_str());
            Record::Exec { class, rest }
        }
        Some('=') => Record::Notify(chars.as_str()),
        Some('~') => stream(chars.as_str()).map_or(Record::Unknown(line), Record::Console),
        Some('&') => stream(chars.as_str()).map_or(Record::Unknown(line), Record::Log),
        Some('@') => stream(chars.as_str()).map_or(Record::Unknown(line), Record::Target),
        _ => Record::Unknown(line),
    }
}

fn split_class(s: &str) -> (&str, &str) {
    s.split_once(',').unwrap_or((s, ""))
}

/// Decodes a C string literal at the start of `s`, returning its value and
/// the number of bytes consumed including both quotes.
fn parse_cstring(s: &str) -> Option<(String, usize)> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'"') {
        return None;
    }

    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => return Some((String::from_utf8_lossy(&out).into_owned(), i + 1)),
            b'\\' => {
                let escaped = *bytes.get(i + 1)?;
                i += 2;
                match escaped {
                    b'n' => out.push(b'\n'),
                    b't' => out.push(b'\t'),
                    b'r' => out.push(b'\r'),
                    b'0'..=b'7' => {
                        let start = i - 1;
                        let end = (start..bytes.len().min(start + 3))
                            .take_while(|&j| (b'0'..=b'7').contains(&bytes[j]))
                            .last()?
                            + 1;
                        out.push(u8::from_str_radix(&s[start..end], 8).ok()?);
                        i = end;
                    }
                    other => out.push(other),
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    None
}

/// Value of the first `name="..."` result in a MI result list.
fn field(results: &str, name: &str) -> Option<String> {
    let needle = format!("{name}=\"");
    let mut from = 0;
    while let Some(pos) = results[from..].find(&needle) {
        let at = from + pos;
        let bounded = at == 0 || matches!(results.as_bytes()[at - 1], b',' | b'{' | b'[');
        if bounded {
            return parse_cstring(&results[at + name.len() + 1..]).map(|(s, _)| s);
        }
        from = at + needle.len();
    }
    None
}

fn stop_event(results: &str) -> StopEvent {
    match field(results, "reason").as_deref() {
        Some("breakpoint-hit") => match field(results, "bkptno").and_then(|n| n.parse().ok()) {
            Some(n) => StopEvent::Breakpoint(BreakpointId(n)),
            None => StopEvent::Other("breakpoint-hit".to_string()),
        },
        Some("signal-received") => {
            StopEvent::Signal(field(results, "signal-name").unwrap_or_default())
        }
        Some("exited-normally") => StopEvent::Exited(Some(0)),
        // gdb reports the exit code in octal.
        Some("exited") => StopEvent::Exited(
            field(results, "exit-code").and_then(|c| i32::from_str_radix(&c, 8).ok()),
        ),
        Some("exited-signalled") => StopEvent::Exited(None),
        Some(other) => StopEvent::Other(other.to_string()),
        None => StopEvent::Other(String::new()),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
