//! Addressing inside the per-runqueue load-balance log.
//!
//! ```text
//! struct lb_log_buf {
//!         struct lb_log   *entries[N];
//!         unsigned int    head;
//!         unsigned int    sd_count;
//! };
//! ```
//!
//! Sizes always come from the target so the walker never bakes in a build
//! constant.

use super::ValueChannel;
use crate::error::{DecodeError, DecodeResult};
use crate::target::ControlChannel;

pub struct RingWalker {
    buf: String,
}

impl RingWalker {
    /// `rq` is any expression of type `struct rq *` valid at the stop.
    pub fn new(rq: &str) -> Self {
        Self {
            buf: format!("({rq})->lb_log_buf"),
        }
    }

    /// Pointer-typed expression for slot `index`.
    pub fn slot_expr(&self, index: u64) -> String {
        format!("*({}.entries + {index})", self.buf)
    }

    pub fn capacity_expr(&self) -> String {
        format!(
            "sizeof({buf}.entries) / sizeof({buf}.entries[0])",
            buf = self.buf
        )
    }

    pub fn head_expr(&self) -> String {
        format!("{}.head", self.buf)
    }

    pub fn sd_count_expr(&self) -> String {
        format!("{}.sd_count", self.buf)
    }

    pub fn capacity<C: ControlChannel + ?Sized>(
        &self,
        values: &mut ValueChannel<'_, C>,
    ) -> DecodeResult<u64> {
        values.read_int(&self.capacity_expr())
    }

    pub fn sd_count<C: ControlChannel + ?Sized>(
        &self,
        values: &mut ValueChannel<'_, C>,
    ) -> DecodeResult<usize> {
        values.read_int(&self.sd_count_expr())
    }

    /// Slot `index`, or the slot at the write cursor when `index` is `None`.
    /// A cursor outside the ring is an error rather than a read past its end.
    pub fn slot<C: ControlChannel + ?Sized>(
        &self,
        values: &mut ValueChannel<'_, C>,
        index: Option<u64>,
    ) -> DecodeResult<String> {
        let index = match index {
            Some(index) => index,
            None => {
                let head = values.read_int(&self.head_expr())?;
                let capacity = self.capacity(values)?;
                if head >= capacity {
                    return Err(DecodeError::SlotOutOfRange {
                        ring: self.buf.clone(),
                        index: head,
                        capacity,
                    });
                }
                head
            }
        };
        Ok(self.slot_expr(index))
    }
}

/// Number of filled elements of the array member `list` of the record at
/// `base`. The kernel keeps `<list>_next` pointing one past the last element,
/// and leaves it null when the stage ended before the list was started.
pub fn list_len<C: ControlChannel + ?Sized>(
    values: &mut ValueChannel<'_, C>,
    base: &str,
    list: &str,
) -> DecodeResult<usize> {
    let next = values.read_pointer(&format!("{base}.{list}_next"))?;
    if next == 0 {
        return Ok(0);
    }
    let start = values.read_pointer(&format!("&{base}.{list}[0]"))?;
    let stride = values.read_int(&format!("sizeof({base}.{list}[0])"))?;
    extent(&format!("{base}.{list}"), next, start, stride)
}

pub fn list_entry(base: &str, list: &str, index: usize) -> String {
    format!("{base}.{list}[{index}]")
}

fn extent(list: &str, next: u64, base: u64, stride: u64) -> DecodeResult<usize> {
    let bad = || DecodeError::BadExtent {
        list: list.to_string(),
        next,
        base,
        stride,
    };
    let bytes = next.checked_sub(base).ok_or_else(bad)?;
    if stride == 0 || bytes % stride != 0 {
        return Err(bad());
    }
    usize::try_from(bytes / stride).map_err(|_| bad())
}
