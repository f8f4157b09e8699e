//! Record schema shared by the lbscope decoder and anything that consumes its
//! dumps.
//!
//! Every type here is a plain data snapshot of a scheduler load-balance log
//! entry as it was found in the target kernel. Enumerations serialize as the
//! kernel's own symbol names, absent optional fields as `null`.

pub mod cpumask;
pub mod enums;
pub mod records;

pub use cpumask::CpuMask;
pub use enums::{Codepath, CpuIdleType, FbqType, GroupType, KernelEnum, MigrationType};
pub use records::*;
