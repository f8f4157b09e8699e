use thiserror::Error;

/// Failures of the debugger control channel itself.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("debugger closed the channel")]
    Closed,

    #[error("debugger rejected `{command}`: {message}")]
    Rejected { command: String, message: String },

    #[error("unexpected debugger output for `{command}`: {line}")]
    Protocol { command: String, line: String },

    #[error("target exited (code {0:?})")]
    TargetExited(Option<i32>),
}

/// Failures while turning target state into records. Every variant aborts the
/// capture run.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("malformed reply to `{expr}`: {reply:?}")]
    MalformedReply { expr: String, reply: String },

    #[error("cannot read `{expr}` as {ty}: {text:?}")]
    BadScalar {
        expr: String,
        ty: &'static str,
        text: String,
    },

    #[error("unknown {kind} symbol `{name}` from `{expr}`")]
    UnknownSymbol {
        kind: &'static str,
        name: String,
        expr: String,
    },

    #[error("cpumask `{expr}` has cpu {cpu} set but only {cores} cores are configured")]
    MaskTooWide {
        expr: String,
        cpu: usize,
        cores: usize,
    },

    #[error("bad extent for `{list}`: next={next:#x} base={base:#x} stride={stride}")]
    BadExtent {
        list: String,
        next: u64,
        base: u64,
        stride: u64,
    },

    #[error("write cursor {index} of `{ring}` is outside its {capacity} slots")]
    SlotOutOfRange {
        ring: String,
        index: u64,
        capacity: u64,
    },

    #[error("checkpoint `{checkpoint}` visited out of order")]
    CheckpointOrder { checkpoint: &'static str },
}

impl DecodeError {
    pub fn malformed(expr: &str, reply: &str) -> Self {
        Self::MalformedReply {
            expr: expr.to_string(),
            reply: reply.to_string(),
        }
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Failures that end a capture run.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("failed to signal coordinator (pid {pid}): {source}")]
    Coordinator {
        pid: i32,
        #[source]
        source: std::io::Error,
    },
}

impl From<ChannelError> for CaptureError {
    fn from(err: ChannelError) -> Self {
        Self::Decode(DecodeError::Channel(err))
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid capture site `{0}`, expected `location@rq-expression`")]
pub struct InvalidSite(pub String);
