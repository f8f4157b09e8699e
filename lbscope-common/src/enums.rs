//! Closed sets of kernel enumeration constants.
//!
//! The target prints enum values by their C symbol. Each Rust enum here keeps
//! the exact symbol table of the kernel build the decoder was written
//! against; a symbol outside the table means the two have drifted apart.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// A kernel enumeration with a fixed, ordered symbol table.
pub trait KernelEnum: Sized + Copy + 'static {
    /// C type name, used in error messages.
    const KIND: &'static str;
    /// Every constant, in kernel declaration order.
    const VARIANTS: &'static [Self];

    fn symbol(self) -> &'static str;

    fn from_symbol(name: &str) -> Option<Self> {
        Self::VARIANTS.iter().copied().find(|v| v.symbol() == name)
    }
}

macro_rules! kernel_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident = $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $symbol:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl KernelEnum for $name {
            const KIND: &'static str = $kind;
            const VARIANTS: &'static [Self] = &[$($name::$variant),+];

            fn symbol(self) -> &'static str {
                match self {
                    $($name::$variant => $symbol),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.symbol())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.symbol())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let name = String::deserialize(deserializer)?;
                Self::from_symbol(&name)
                    .ok_or_else(|| de::Error::unknown_variant(&name, &[$($symbol),+]))
            }
        }
    };
}

kernel_enum! {
    /// Which scheduler operation wrote a log slot.
    pub enum Codepath = "lb_log_codepath" {
        Unset => "LB_LOG_NONE",
        RebalanceDomains => "LB_LOG_REBALANCE_DOMAINS",
        NewidleBalance => "LB_LOG_NEWIDLE_BALANCE",
    }
}

kernel_enum! {
    pub enum CpuIdleType = "cpu_idle_type" {
        Idle => "CPU_IDLE",
        NotIdle => "__CPU_NOT_IDLE",
        NewlyIdle => "CPU_NEWLY_IDLE",
    }
}

kernel_enum! {
    /// Group classification, ordered by pulling priority.
    pub enum GroupType = "group_type" {
        HasSpare => "group_has_spare",
        FullyBusy => "group_fully_busy",
        MisfitTask => "group_misfit_task",
        SmtBalance => "group_smt_balance",
        AsymPacking => "group_asym_packing",
        Imbalanced => "group_imbalanced",
        Overloaded => "group_overloaded",
    }
}

kernel_enum! {
    /// Run queue classification used when searching for the busiest queue.
    pub enum FbqType = "fbq_type" {
        Regular => "regular",
        Remote => "remote",
        All => "all",
    }
}

kernel_enum! {
    pub enum MigrationType = "migration_type" {
        Load => "migrate_load",
        Util => "migrate_util",
        Task => "migrate_task",
        Misfit => "migrate_misfit",
    }
}
