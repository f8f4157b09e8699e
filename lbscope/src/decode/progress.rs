//! How far a kernel function got while filling a log record.
//!
//! A stage record carries a `has_<checkpoint>` flag per section. The kernel
//! sets them in declaration order and may abandon the record at any point,
//! so a section whose prerequisite was never reached is closed without
//! asking the target.

use crate::error::{DecodeError, DecodeResult};

pub trait Checkpoint: Copy + PartialEq + 'static {
    /// Every checkpoint of the record, in the order the kernel reaches them.
    const ORDER: &'static [Self];

    fn name(self) -> &'static str;

    fn requires(self) -> Option<Self> {
        None
    }
}

pub struct Progress<K: Checkpoint> {
    next: usize,
    reached: Vec<K>,
}

impl<K: Checkpoint> Default for Progress<K> {
    fn default() -> Self {
        Self {
            next: 0,
            reached: Vec::with_capacity(K::ORDER.len()),
        }
    }
}

impl<K: Checkpoint> Progress<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides whether the section behind `checkpoint` is present.
    ///
    /// `read_flag` is given the flag member name (`has_<checkpoint>`) and is
    /// only called when the prerequisite was reached.
    pub fn admit(
        &mut self,
        checkpoint: K,
        read_flag: impl FnOnce(&str) -> DecodeResult<bool>,
    ) -> DecodeResult<bool> {
        let out_of_order = || DecodeError::CheckpointOrder {
            checkpoint: checkpoint.name(),
        };
        let pos = K::ORDER
            .iter()
            .position(|&k| k == checkpoint)
            .ok_or_else(out_of_order)?;
        if pos < self.next {
            return Err(out_of_order());
        }
        self.next = pos + 1;

        if let Some(prerequisite) = checkpoint.requires() {
            if !self.reached(prerequisite) {
                return Ok(false);
            }
        }

        let reached = read_flag(&format!("has_{}", checkpoint.name()))?;
        if reached {
            self.reached.push(checkpoint);
        }
        Ok(reached)
    }

    pub fn reached(&self, checkpoint: K) -> bool {
        self.reached.contains(&checkpoint)
    }
}
