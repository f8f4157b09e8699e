use std::fmt;

use serde::{Deserialize, Serialize};

/// A CPU bitset rendered as a binary string, most significant CPU first.
///
/// The string is always exactly as wide as the configured core count, so
/// CPU 0 is the last character.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CpuMask(String);

impl CpuMask {
    /// Builds a mask from an already padded bit string.
    ///
    /// Returns `None` if `bits` contains anything other than `0`/`1`.
    pub fn from_padded(bits: impl Into<String>) -> Option<Self> {
        let bits = bits.into();
        bits.bytes()
            .all(|b| b == b'0' || b == b'1')
            .then_some(Self(bits))
    }

    pub fn width(&self) -> usize {
        self.0.len()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn contains(&self, cpu: usize) -> bool {
        cpu < self.width() && self.0.as_bytes()[self.width() - 1 - cpu] == b'1'
    }

    /// Set CPUs in ascending order.
    pub fn cpus(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.width()).filter(|&cpu| self.contains(cpu))
    }
}

impl fmt::Display for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
