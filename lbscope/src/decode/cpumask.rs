//! `struct cpumask` decoding.
//!
//! `print/t` renders a mask as its array of unsigned longs in binary, e.g.
//! `{bits = {1011}}` or `{bits = {101, 0 <repeats 127 times>}}`, with
//! `bits[0]` holding CPUs 0..63 and leading zeros of every word dropped.

use lbscope_common::CpuMask;

use super::ValueChannel;
use crate::error::{DecodeError, DecodeResult};
use crate::target::{ControlChannel, PrintFormat};

const WORD_BITS: usize = 64;

impl<C: ControlChannel + ?Sized> ValueChannel<'_, C> {
    /// Reads the mask at `expr` as a bit string exactly `cores` wide.
    pub fn read_cpumask(&mut self, expr: &str, cores: usize) -> DecodeResult<CpuMask> {
        let reply = self.evaluate(expr, PrintFormat::Binary)?;
        let bits = mask_words(&reply)
            .and_then(|words| assemble(&words))
            .ok_or_else(|| DecodeError::malformed(expr, &reply))?;

        let padded = fit_to_cores(&bits, cores).map_err(|cpu| DecodeError::MaskTooWide {
            expr: expr.to_string(),
            cpu,
            cores,
        })?;
        CpuMask::from_padded(padded).ok_or_else(|| DecodeError::malformed(expr, &reply))
    }
}

/// Binary words of a `print/t` reply, `bits[0]` first.
fn mask_words(reply: &str) -> Option<Vec<String>> {
    let (history, value) = reply.split_once(" = ")?;
    if !history.starts_with('$') {
        return None;
    }
    let inner = match value.rfind('{') {
        Some(open) => {
            let rest = &value[open + 1..];
            &rest[..rest.find('}')?]
        }
        None => value.trim(),
    };

    let mut words = Vec::new();
    for item in inner.split(',').map(str::trim) {
        let (word, repeat) = match item.split_once(" <repeats ") {
            Some((word, tail)) => (word, tail.strip_suffix(" times>")?.parse().ok()?),
            None => (item, 1),
        };
        if word.is_empty() || !word.bytes().all(|b| b == b'0' || b == b'1') {
            return None;
        }
        words.extend(std::iter::repeat_n(word.to_string(), repeat));
    }
    Some(words)
}

/// Concatenates words most significant first. Only the leading word keeps its
/// printed width; every other word is zero-padded to a full unsigned long.
fn assemble(words: &[String]) -> Option<String> {
    let mut bits = String::with_capacity(words.len() * WORD_BITS);
    for (i, word) in words.iter().rev().enumerate() {
        if word.len() > WORD_BITS {
            return None;
        }
        if i == 0 {
            bits.push_str(word);
        } else {
            bits.push_str(&format!("{word:0>WORD_BITS$}"));
        }
    }
    Some(bits)
}

/// Left-pads `bits` to `cores`, or returns the highest set CPU if it does not
/// fit.
fn fit_to_cores(bits: &str, cores: usize) -> Result<String, usize> {
    let significant = bits.trim_start_matches('0');
    if significant.len() > cores {
        return Err(significant.len() - 1);
    }
    Ok(format!("{significant:0>cores$}"))
}
