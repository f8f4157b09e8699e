//! Scalar reads against the stopped target.
//!
//! Every reply has the debugger's value-history shape, `$N = value`. Typed
//! pointers print as `$N = (struct rq *) 0xffff888...`; for those the address
//! literal is the value.

use std::str::FromStr;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DecodeError, DecodeResult};
use crate::target::{ControlChannel, PrintFormat};

static POINTER_REPLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\d+ = \([^)]*\*\) (0x[0-9a-fA-F]+)").unwrap());
static HISTORY_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$\d+$").unwrap());

pub const NULL_ADDRESS: &str = "0x0";

pub struct ValueChannel<'c, C: ControlChannel + ?Sized> {
    channel: &'c mut C,
    queries: u64,
}

impl<'c, C: ControlChannel + ?Sized> ValueChannel<'c, C> {
    pub fn new(channel: &'c mut C) -> Self {
        Self {
            channel,
            queries: 0,
        }
    }

    /// Number of expressions evaluated through this channel so far.
    pub fn queries(&self) -> u64 {
        self.queries
    }

    pub(crate) fn evaluate(&mut self, expr: &str, format: PrintFormat) -> DecodeResult<String> {
        self.queries += 1;
        let reply = self.channel.evaluate(expr, format)?;
        debug!("[q{}] {} {} => {}", self.queries, format.command(), expr, reply);
        Ok(reply)
    }

    pub fn read_value(&mut self, expr: &str) -> DecodeResult<String> {
        let reply = self.evaluate(expr, PrintFormat::Natural)?;
        parse_value(expr, &reply)
    }

    pub fn read_int<T: FromStr>(&mut self, expr: &str) -> DecodeResult<T> {
        let text = self.read_value(expr)?;
        text.parse().map_err(|_| DecodeError::BadScalar {
            expr: expr.to_string(),
            ty: std::any::type_name::<T>(),
            text,
        })
    }

    pub fn read_bool(&mut self, expr: &str) -> DecodeResult<bool> {
        let text = self.read_value(expr)?;
        Ok(!matches!(text.as_str(), "false" | "False" | "0"))
    }

    pub fn read_pointer(&mut self, expr: &str) -> DecodeResult<u64> {
        let text = self.read_value(expr)?;
        parse_address(&text).ok_or(DecodeError::BadScalar {
            expr: expr.to_string(),
            ty: "pointer",
            text,
        })
    }

    pub fn is_null(&mut self, expr: &str) -> DecodeResult<bool> {
        Ok(self.read_value(expr)? == NULL_ADDRESS)
    }

    /// Decodes the object `expr` points to, or `None` for a null pointer.
    ///
    /// `decode` receives the dereferenced expression `(*(expr))` and is never
    /// called for a null pointer.
    pub fn read_if_not_null<T>(
        &mut self,
        expr: &str,
        decode: impl FnOnce(&mut Self, &str) -> DecodeResult<T>,
    ) -> DecodeResult<Option<T>> {
        if self.is_null(expr)? {
            return Ok(None);
        }
        decode(self, &deref(expr)).map(Some)
    }
}

pub fn deref(expr: &str) -> String {
    format!("(*({expr}))")
}

fn parse_value(expr: &str, reply: &str) -> DecodeResult<String> {
    if let Some(captures) = POINTER_REPLY.captures(reply) {
        return Ok(captures[1].to_string());
    }

    let mut tokens = reply.split_whitespace();
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(history), Some("="), Some(value)) if HISTORY_REF.is_match(history) => {
            Ok(value.to_string())
        }
        _ => Err(DecodeError::malformed(expr, reply)),
    }
}

fn parse_address(text: &str) -> Option<u64> {
    let hex = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))?;
    u64::from_str_radix(hex, 16).ok()
}
