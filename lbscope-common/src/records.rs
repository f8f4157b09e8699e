//! Decoded load-balance log records.
//!
//! Field names match the members of the kernel-side log structures. An
//! `Option` field is `None` when the kernel had not reached the point that
//! fills it (its progress flag was clear) or when a reference was null.

use serde::{Deserialize, Serialize};

use crate::{Codepath, CpuIdleType, CpuMask, FbqType, GroupType, MigrationType};

/// One slot of a per-CPU load-balance log ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub codepath: Codepath,
    /// Only present for [`Codepath::RebalanceDomains`].
    pub payload: Option<RdLogMsg>,
}

/// One `rebalance_domains()` invocation on one CPU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RdLogMsg {
    pub cpu: u32,
    pub idle: CpuIdleType,
    pub sched_idle_cpu: bool,
    /// One entry per scheduling domain level, lowest level first.
    pub entries: Vec<RdEntryLogMsg>,
}

/// One scheduling domain level visited by `rebalance_domains()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RdEntryLogMsg {
    pub max_cost: u64,
    pub interval: u64,
    pub continue_balancing: bool,
    pub need_serialize: bool,
    /// Present iff `load_balance()` actually ran at this level.
    pub lb: Option<LbLogMsg>,
    pub new_idle: CpuIdleType,
    pub new_busy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LbLogMsg {
    pub env: LbEnv,
    pub swb: SwbLogMsg,
    pub fbg: FbgLogMsg,
    pub fbq: FbqLogMsg,
}

/// Snapshot of `struct lb_env`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LbEnv {
    pub sd: Option<DomainRef>,
    pub src_cpu: u32,
    pub src_rq: Option<QueueRef>,
    pub dst_cpu: u32,
    pub dst_rq: Option<QueueRef>,
    pub dst_grpmask: Option<CpuMask>,
    pub cpus: Option<CpuMask>,
    pub new_dst_cpu: u32,
    pub idle: CpuIdleType,
    pub imbalance: i64,
    pub flags: u32,
    #[serde(rename = "loop")]
    pub loops: u32,
    pub loop_break: u32,
    pub loop_max: u32,
    pub fbq_type: FbqType,
    pub migration_type: MigrationType,
}

/// Identity of a scheduling domain. Not an owned copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRef {
    pub level: u32,
    pub span_weight: u32,
}

/// Identity of a run queue. Not an owned copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRef {
    pub cpu: u32,
}

/// Snapshot of `struct sg_lb_stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgLbStats {
    pub avg_load: u64,
    pub group_load: u64,
    pub group_capacity: u64,
    pub group_util: u64,
    pub group_runnable: u64,
    pub sum_nr_running: u32,
    pub sum_h_nr_running: u32,
    pub idle_cpus: u32,
    pub group_weight: u32,
    pub group_type: GroupType,
    pub group_misfit_task_load: u64,
}

/// `should_we_balance()` telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwbLogMsg {
    pub dst_cpu_allowed: bool,
    pub newly_idle: Option<SwbNewlyIdle>,
    pub group_scan: Option<SwbGroupScan>,
    pub cpus: Vec<SwbPerCpuLogMsg>,
    pub result: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwbNewlyIdle {
    pub dst_nr_running: u32,
    pub dst_ttwu_pending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwbGroupScan {
    pub swb_cpus: CpuMask,
    pub group_balance_cpu: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwbPerCpuLogMsg {
    pub cpu: u32,
    pub idle_cpu: bool,
    pub is_core_idle: Option<bool>,
}

/// `find_busiest_group()` telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbgLogMsg {
    pub smt_active: bool,
    pub asym_cpucapacity: bool,
    pub asym_packing: bool,
    pub stats: Option<FbgStats>,
    pub groups: Vec<FbgGroupLogMsg>,
    pub energy: Option<FbgEnergy>,
    pub busiest: Option<SgLbStats>,
    pub compared: Option<FbgCompared>,
    pub imbalance: Option<FbgImbalance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbgStats {
    pub local: SgLbStats,
    pub total_load: u64,
    pub total_capacity: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbgGroupLogMsg {
    pub group_balance_cpu: u32,
    pub span: Option<CpuMask>,
    pub stats: SgLbStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbgEnergy {
    pub rd_overutilized: bool,
    pub rd_pd_overlap: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbgCompared {
    pub sd_avg_load: u64,
    pub imbalance_pct: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbgImbalance {
    pub imbalance: i64,
    pub migration_type: MigrationType,
}

/// `find_busiest_queue()` telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbqLogMsg {
    pub busiest_load: u64,
    pub busiest_capacity: u64,
    pub busiest_util: u64,
    pub busiest_nr: u32,
    pub cpus: Vec<FbqPerCpuLogMsg>,
    pub finished: Option<FbqOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbqOutcome {
    pub busiest: Option<QueueRef>,
}

/// One candidate CPU examined by `find_busiest_queue()`.
///
/// The optional groups are filled strictly in order: a later group is only
/// ever present when every earlier one is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbqPerCpuLogMsg {
    pub cpu: u32,
    pub rq_type: FbqType,
    pub h_nr_running: Option<u32>,
    pub capacity: Option<u64>,
    pub dst_capacity: Option<u64>,
    pub asym_cpu_priority_value: Option<u64>,
    pub migration: Option<FbqMigrationLogMsg>,
}

/// The migration-type specific part of [`FbqPerCpuLogMsg`].
///
/// Exactly one field set is populated, selected by `migration_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbqMigrationLogMsg {
    pub migration_type: MigrationType,
    // migrate_load
    pub cpu_load: Option<u64>,
    pub cpu_capacity: Option<u64>,
    pub arch_scale_cpu_capacity: Option<u64>,
    pub imbalance_pct: Option<u32>,
    // migrate_util
    pub util_cfs_boost: Option<u64>,
    // migrate_misfit
    pub misfit_task_load: Option<u64>,
}
