//! Record decoders, one per log structure.
//!
//! Every decoder takes the target expression of the record (an lvalue of the
//! struct type, not a pointer) and reads its members by name. Members that
//! are always written come first; sections behind a progress flag follow in
//! the order the kernel fills them.

use lbscope_common::{
    Codepath, CpuIdleType, CpuMask, DomainRef, FbgCompared, FbgEnergy, FbgGroupLogMsg,
    FbgImbalance, FbgLogMsg, FbgStats, FbqLogMsg, FbqMigrationLogMsg, FbqOutcome,
    FbqPerCpuLogMsg, LbEnv, LbLogMsg, LogRecord, MigrationType, QueueRef, RdEntryLogMsg,
    RdLogMsg, SgLbStats, SwbGroupScan, SwbLogMsg, SwbNewlyIdle, SwbPerCpuLogMsg,
};
use log::debug;

use super::progress::{Checkpoint, Progress};
use super::ring::{list_entry, list_len};
use super::value::{ValueChannel, deref};
use crate::error::DecodeResult;
use crate::target::ControlChannel;

macro_rules! checkpoints {
    (@requires $name:ident) => { None };
    (@requires $name:ident $req:ident) => { Some($name::$req) };
    (
        $(#[$meta:meta])*
        enum $name:ident {
            $($variant:ident => $flag:literal $(after $req:ident)?),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        enum $name {
            $($variant),+
        }

        impl Checkpoint for $name {
            const ORDER: &'static [Self] = &[$($name::$variant),+];

            fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $flag),+
                }
            }

            fn requires(self) -> Option<Self> {
                match self {
                    $($name::$variant => checkpoints!(@requires $name $($req)?)),+
                }
            }
        }
    };
}

checkpoints! {
    /// `should_we_balance()`. The newly idle path decides without scanning.
    enum Swb {
        NewlyIdle => "newly_idle",
        GroupScan => "group_scan",
        Decided => "decided",
    }
}

checkpoints! {
    /// `find_busiest_group()`.
    enum Fbg {
        Stats => "stats",
        Energy => "energy" after Stats,
        Busiest => "busiest" after Stats,
        Compared => "compared" after Busiest,
        Imbalance => "imbalance" after Busiest,
    }
}

checkpoints! {
    /// `find_busiest_queue()`.
    enum Fbq {
        Finished => "finished",
    }
}

checkpoints! {
    /// One iteration of the `find_busiest_queue()` CPU loop.
    enum FbqCpu {
        NrRunning => "nr_running",
        Capacity => "capacity" after NrRunning,
        AsymCapacity => "asym_capacity" after Capacity,
        AsymPrio => "asym_prio" after AsymCapacity,
        Migration => "migration" after AsymPrio,
    }
}

fn member(base: &str, name: &str) -> String {
    format!("{base}.{name}")
}

pub struct SchemaDecoder<'c, C: ControlChannel + ?Sized> {
    values: ValueChannel<'c, C>,
    cores: usize,
}

impl<'c, C: ControlChannel + ?Sized> SchemaDecoder<'c, C> {
    pub fn new(channel: &'c mut C, cores: usize) -> Self {
        Self {
            values: ValueChannel::new(channel),
            cores,
        }
    }

    pub fn values(&mut self) -> &mut ValueChannel<'c, C> {
        &mut self.values
    }

    /// Decodes the log entry `slot` points to. A null slot was never written
    /// and yields `None` without touching the target again.
    pub fn decode_slot(&mut self, slot: &str, sd_count: usize) -> DecodeResult<Option<LogRecord>> {
        if self.values.is_null(slot)? {
            return Ok(None);
        }
        let log = deref(slot);

        let codepath: Codepath = self.values.read_enum(&member(&log, "codepath"))?;
        let payload = match codepath {
            Codepath::RebalanceDomains => Some(self.decode_rd(&member(&log, "rd"), sd_count)?),
            Codepath::Unset | Codepath::NewidleBalance => None,
        };
        debug!("{} -> {} ({} queries)", slot, codepath, self.values.queries());

        Ok(Some(LogRecord { codepath, payload }))
    }

    pub fn decode_rd(&mut self, base: &str, sd_count: usize) -> DecodeResult<RdLogMsg> {
        let cpu = self.values.read_int(&member(base, "cpu"))?;
        let idle = self.values.read_enum(&member(base, "idle"))?;
        let sched_idle_cpu = self.values.read_bool(&member(base, "sched_idle_cpu"))?;
        let entries = (0..sd_count)
            .map(|level| self.decode_rd_entry(&list_entry(base, "entries", level)))
            .collect::<DecodeResult<Vec<_>>>()?;

        Ok(RdLogMsg {
            cpu,
            idle,
            sched_idle_cpu,
            entries,
        })
    }

    fn decode_rd_entry(&mut self, base: &str) -> DecodeResult<RdEntryLogMsg> {
        let max_cost = self.values.read_int(&member(base, "max_cost"))?;
        let interval = self.values.read_int(&member(base, "interval"))?;
        let continue_balancing = self.values.read_bool(&member(base, "continue_balancing"))?;
        let need_serialize = self.values.read_bool(&member(base, "need_serialize"))?;
        let new_idle: CpuIdleType = self.values.read_enum(&member(base, "new_idle"))?;
        let new_busy = self.values.read_bool(&member(base, "new_busy"))?;

        let lb = if self.values.read_bool(&member(base, "has_lb"))? {
            Some(self.decode_lb(&member(base, "lb"))?)
        } else {
            None
        };

        Ok(RdEntryLogMsg {
            max_cost,
            interval,
            continue_balancing,
            need_serialize,
            lb,
            new_idle,
            new_busy,
        })
    }

    fn decode_lb(&mut self, base: &str) -> DecodeResult<LbLogMsg> {
        Ok(LbLogMsg {
            env: self.decode_env(&member(base, "env"))?,
            swb: self.decode_swb(&member(base, "swb"))?,
            fbg: self.decode_fbg(&member(base, "fbg"))?,
            fbq: self.decode_fbq(&member(base, "fbq"))?,
        })
    }

    fn decode_env(&mut self, base: &str) -> DecodeResult<LbEnv> {
        let sd = self.values.read_if_not_null(&member(base, "sd"), |v, sd| {
            Ok(DomainRef {
                level: v.read_int(&member(sd, "level"))?,
                span_weight: v.read_int(&member(sd, "span_weight"))?,
            })
        })?;

        Ok(LbEnv {
            sd,
            src_cpu: self.values.read_int(&member(base, "src_cpu"))?,
            src_rq: self.read_queue_ref(&member(base, "src_rq"))?,
            dst_cpu: self.values.read_int(&member(base, "dst_cpu"))?,
            dst_rq: self.read_queue_ref(&member(base, "dst_rq"))?,
            dst_grpmask: self.read_mask_ref(&member(base, "dst_grpmask"))?,
            cpus: self.read_mask_ref(&member(base, "cpus"))?,
            new_dst_cpu: self.values.read_int(&member(base, "new_dst_cpu"))?,
            idle: self.values.read_enum(&member(base, "idle"))?,
            imbalance: self.values.read_int(&member(base, "imbalance"))?,
            flags: self.values.read_int(&member(base, "flags"))?,
            loops: self.values.read_int(&member(base, "loop"))?,
            loop_break: self.values.read_int(&member(base, "loop_break"))?,
            loop_max: self.values.read_int(&member(base, "loop_max"))?,
            fbq_type: self.values.read_enum(&member(base, "fbq_type"))?,
            migration_type: self.values.read_enum(&member(base, "migration_type"))?,
        })
    }

    fn read_queue_ref(&mut self, expr: &str) -> DecodeResult<Option<QueueRef>> {
        self.values.read_if_not_null(expr, |v, rq| {
            Ok(QueueRef {
                cpu: v.read_int(&member(rq, "cpu"))?,
            })
        })
    }

    fn read_mask_ref(&mut self, expr: &str) -> DecodeResult<Option<CpuMask>> {
        let cores = self.cores;
        self.values
            .read_if_not_null(expr, |v, mask| v.read_cpumask(mask, cores))
    }

    fn reached<K: Checkpoint>(
        &mut self,
        progress: &mut Progress<K>,
        base: &str,
        checkpoint: K,
    ) -> DecodeResult<bool> {
        progress.admit(checkpoint, |flag| self.values.read_bool(&member(base, flag)))
    }

    fn decode_sg_stats(&mut self, base: &str) -> DecodeResult<SgLbStats> {
        Ok(SgLbStats {
            avg_load: self.values.read_int(&member(base, "avg_load"))?,
            group_load: self.values.read_int(&member(base, "group_load"))?,
            group_capacity: self.values.read_int(&member(base, "group_capacity"))?,
            group_util: self.values.read_int(&member(base, "group_util"))?,
            group_runnable: self.values.read_int(&member(base, "group_runnable"))?,
            sum_nr_running: self.values.read_int(&member(base, "sum_nr_running"))?,
            sum_h_nr_running: self.values.read_int(&member(base, "sum_h_nr_running"))?,
            idle_cpus: self.values.read_int(&member(base, "idle_cpus"))?,
            group_weight: self.values.read_int(&member(base, "group_weight"))?,
            group_type: self.values.read_enum(&member(base, "group_type"))?,
            group_misfit_task_load: self.values.read_int(&member(base, "group_misfit_task_load"))?,
        })
    }

    fn decode_swb(&mut self, base: &str) -> DecodeResult<SwbLogMsg> {
        let dst_cpu_allowed = self.values.read_bool(&member(base, "dst_cpu_allowed"))?;
        let mut progress = Progress::new();

        let newly_idle = if self.reached(&mut progress, base, Swb::NewlyIdle)? {
            Some(SwbNewlyIdle {
                dst_nr_running: self.values.read_int(&member(base, "dst_nr_running"))?,
                dst_ttwu_pending: self.values.read_bool(&member(base, "dst_ttwu_pending"))?,
            })
        } else {
            None
        };

        let group_scan = if self.reached(&mut progress, base, Swb::GroupScan)? {
            Some(SwbGroupScan {
                swb_cpus: self.values.read_cpumask(&member(base, "swb_cpus"), self.cores)?,
                group_balance_cpu: self.values.read_int(&member(base, "group_balance_cpu"))?,
            })
        } else {
            None
        };

        let count = list_len(&mut self.values, base, "cpus")?;
        let mut cpus = Vec::with_capacity(count);
        for i in 0..count {
            let entry = list_entry(base, "cpus", i);
            let cpu = self.values.read_int(&member(&entry, "cpu"))?;
            let idle_cpu = self.values.read_bool(&member(&entry, "idle_cpu"))?;
            let is_core_idle = if self.values.read_bool(&member(&entry, "has_core_idle"))? {
                Some(self.values.read_bool(&member(&entry, "is_core_idle"))?)
            } else {
                None
            };
            cpus.push(SwbPerCpuLogMsg {
                cpu,
                idle_cpu,
                is_core_idle,
            });
        }

        let result = if self.reached(&mut progress, base, Swb::Decided)? {
            Some(self.values.read_bool(&member(base, "result"))?)
        } else {
            None
        };

        Ok(SwbLogMsg {
            dst_cpu_allowed,
            newly_idle,
            group_scan,
            cpus,
            result,
        })
    }

    fn decode_fbg(&mut self, base: &str) -> DecodeResult<FbgLogMsg> {
        let smt_active = self.values.read_bool(&member(base, "smt_active"))?;
        let asym_cpucapacity = self.values.read_bool(&member(base, "asym_cpucapacity"))?;
        let asym_packing = self.values.read_bool(&member(base, "asym_packing"))?;
        let mut progress = Progress::new();

        let stats = if self.reached(&mut progress, base, Fbg::Stats)? {
            Some(FbgStats {
                local: self.decode_sg_stats(&member(base, "local"))?,
                total_load: self.values.read_int(&member(base, "total_load"))?,
                total_capacity: self.values.read_int(&member(base, "total_capacity"))?,
            })
        } else {
            None
        };

        let count = list_len(&mut self.values, base, "groups")?;
        let mut groups = Vec::with_capacity(count);
        for i in 0..count {
            let entry = list_entry(base, "groups", i);
            groups.push(FbgGroupLogMsg {
                group_balance_cpu: self.values.read_int(&member(&entry, "group_balance_cpu"))?,
                span: self.read_mask_ref(&member(&entry, "span"))?,
                stats: self.decode_sg_stats(&member(&entry, "stats"))?,
            });
        }

        let energy = if self.reached(&mut progress, base, Fbg::Energy)? {
            Some(FbgEnergy {
                rd_overutilized: self.values.read_bool(&member(base, "rd_overutilized"))?,
                rd_pd_overlap: self.values.read_bool(&member(base, "rd_pd_overlap"))?,
            })
        } else {
            None
        };

        let busiest = if self.reached(&mut progress, base, Fbg::Busiest)? {
            Some(self.decode_sg_stats(&member(base, "busiest"))?)
        } else {
            None
        };

        let compared = if self.reached(&mut progress, base, Fbg::Compared)? {
            Some(FbgCompared {
                sd_avg_load: self.values.read_int(&member(base, "sd_avg_load"))?,
                imbalance_pct: self.values.read_int(&member(base, "imbalance_pct"))?,
            })
        } else {
            None
        };

        let imbalance = if self.reached(&mut progress, base, Fbg::Imbalance)? {
            Some(FbgImbalance {
                imbalance: self.values.read_int(&member(base, "imbalance"))?,
                migration_type: self.values.read_enum(&member(base, "migration_type"))?,
            })
        } else {
            None
        };

        Ok(FbgLogMsg {
            smt_active,
            asym_cpucapacity,
            asym_packing,
            stats,
            groups,
            energy,
            busiest,
            compared,
            imbalance,
        })
    }

    fn decode_fbq(&mut self, base: &str) -> DecodeResult<FbqLogMsg> {
        let busiest_load = self.values.read_int(&member(base, "busiest_load"))?;
        let busiest_capacity = self.values.read_int(&member(base, "busiest_capacity"))?;
        let busiest_util = self.values.read_int(&member(base, "busiest_util"))?;
        let busiest_nr = self.values.read_int(&member(base, "busiest_nr"))?;
        let mut progress = Progress::new();

        let count = list_len(&mut self.values, base, "cpus")?;
        let cpus = (0..count)
            .map(|i| self.decode_fbq_cpu(&list_entry(base, "cpus", i)))
            .collect::<DecodeResult<Vec<_>>>()?;

        let finished = if self.reached(&mut progress, base, Fbq::Finished)? {
            Some(FbqOutcome {
                busiest: self.read_queue_ref(&member(base, "busiest"))?,
            })
        } else {
            None
        };

        Ok(FbqLogMsg {
            busiest_load,
            busiest_capacity,
            busiest_util,
            busiest_nr,
            cpus,
            finished,
        })
    }

    pub(crate) fn decode_fbq_cpu(&mut self, base: &str) -> DecodeResult<FbqPerCpuLogMsg> {
        let cpu = self.values.read_int(&member(base, "cpu"))?;
        let rq_type = self.values.read_enum(&member(base, "rq_type"))?;
        let mut progress = Progress::new();

        let h_nr_running = if self.reached(&mut progress, base, FbqCpu::NrRunning)? {
            Some(self.values.read_int(&member(base, "h_nr_running"))?)
        } else {
            None
        };
        let capacity = if self.reached(&mut progress, base, FbqCpu::Capacity)? {
            Some(self.values.read_int(&member(base, "capacity"))?)
        } else {
            None
        };
        let dst_capacity = if self.reached(&mut progress, base, FbqCpu::AsymCapacity)? {
            Some(self.values.read_int(&member(base, "dst_capacity"))?)
        } else {
            None
        };
        let asym_cpu_priority_value = if self.reached(&mut progress, base, FbqCpu::AsymPrio)? {
            Some(self.values.read_int(&member(base, "asym_cpu_priority_value"))?)
        } else {
            None
        };
        let migration = if self.reached(&mut progress, base, FbqCpu::Migration)? {
            Some(self.decode_fbq_migration(base)?)
        } else {
            None
        };

        Ok(FbqPerCpuLogMsg {
            cpu,
            rq_type,
            h_nr_running,
            capacity,
            dst_capacity,
            asym_cpu_priority_value,
            migration,
        })
    }

    fn decode_fbq_migration(&mut self, base: &str) -> DecodeResult<FbqMigrationLogMsg> {
        let migration_type = self.values.read_enum(&member(base, "migration_type"))?;
        let mut msg = FbqMigrationLogMsg {
            migration_type,
            cpu_load: None,
            cpu_capacity: None,
            arch_scale_cpu_capacity: None,
            imbalance_pct: None,
            util_cfs_boost: None,
            misfit_task_load: None,
        };

        match migration_type {
            MigrationType::Load => {
                msg.cpu_load = Some(self.values.read_int(&member(base, "cpu_load"))?);
                msg.cpu_capacity = Some(self.values.read_int(&member(base, "cpu_capacity"))?);
                msg.arch_scale_cpu_capacity =
                    Some(self.values.read_int(&member(base, "arch_scale_cpu_capacity"))?);
                msg.imbalance_pct = Some(self.values.read_int(&member(base, "imbalance_pct"))?);
            }
            MigrationType::Util => {
                msg.util_cfs_boost = Some(self.values.read_int(&member(base, "util_cfs_boost"))?);
            }
            MigrationType::Task => {}
            MigrationType::Misfit => {
                msg.misfit_task_load =
                    Some(self.values.read_int(&member(base, "misfit_task_load"))?);
            }
        }
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use lbscope_common::{FbqType, GroupType};

    use super::*;
    use crate::decode::RingWalker;
    use crate::target::script::ScriptedChannel;

    const CORES: usize = 4;

    fn script_list(channel: &mut ScriptedChannel, base: &str, list: &str, len: u64) {
        let start = 0xffff_8880_0010_0000;
        let stride = 32;
        channel
            .pointer(&format!("{base}.{list}_next"), "void", start + len * stride)
            .pointer(&format!("&{base}.{list}[0]"), "void", start)
            .value(&format!("sizeof({base}.{list}[0])"), stride);
    }

    fn script_sg_stats(channel: &mut ScriptedChannel, base: &str, avg_load: u64) {
        for (name, value) in [
            ("avg_load", avg_load),
            ("group_load", 2048),
            ("group_capacity", 2048),
            ("group_util", 700),
            ("group_runnable", 900),
            ("sum_nr_running", 3),
            ("sum_h_nr_running", 3),
            ("idle_cpus", 0),
            ("group_weight", 2),
            ("group_misfit_task_load", 0),
        ] {
            channel.value(&member(base, name), value);
        }
        channel.value(&member(base, "group_type"), "group_overloaded");
    }

    fn script_fbq_cpu_prefix(channel: &mut ScriptedChannel, base: &str) {
        channel
            .value(&member(base, "cpu"), 2)
            .value(&member(base, "rq_type"), "regular")
            .value(&member(base, "has_nr_running"), 1)
            .value(&member(base, "h_nr_running"), 3)
            .value(&member(base, "has_capacity"), 1)
            .value(&member(base, "capacity"), 1024)
            .value(&member(base, "has_asym_capacity"), 1)
            .value(&member(base, "dst_capacity"), 1024)
            .value(&member(base, "has_asym_prio"), 1)
            .value(&member(base, "asym_cpu_priority_value"), 0)
            .value(&member(base, "has_migration"), 1);
    }

    /// A load_balance() that gave up right after filling in its environment.
    fn script_early_lb(channel: &mut ScriptedChannel, base: &str) {
        let env = member(base, "env");
        channel
            .pointer(&member(&env, "sd"), "struct sched_domain", 0xffff_8880_0200_0000)
            .value(&member(&deref(&member(&env, "sd")), "level"), 1)
            .value(&member(&deref(&member(&env, "sd")), "span_weight"), 4)
            .value(&member(&env, "src_cpu"), 3)
            .pointer(&member(&env, "src_rq"), "struct rq", 0xffff_8880_7dd2_b2c0)
            .value(&member(&deref(&member(&env, "src_rq")), "cpu"), 3)
            .value(&member(&env, "dst_cpu"), 0)
            .null(&member(&env, "dst_rq"), "struct rq")
            .null(&member(&env, "dst_grpmask"), "struct cpumask")
            .pointer(&member(&env, "cpus"), "struct cpumask", 0xffff_8880_0300_0000)
            .binary(&deref(&member(&env, "cpus")), "{bits = {1111}}")
            .value(&member(&env, "new_dst_cpu"), 0)
            .value(&member(&env, "idle"), "CPU_IDLE")
            .value(&member(&env, "imbalance"), 0)
            .value(&member(&env, "flags"), 0)
            .value(&member(&env, "loop"), 0)
            .value(&member(&env, "loop_break"), 32)
            .value(&member(&env, "loop_max"), 0)
            .value(&member(&env, "fbq_type"), "all")
            .value(&member(&env, "migration_type"), "migrate_load");

        let swb = member(base, "swb");
        channel
            .value(&member(&swb, "dst_cpu_allowed"), "true")
            .value(&member(&swb, "has_newly_idle"), 0)
            .value(&member(&swb, "has_group_scan"), 0)
            .value(&member(&swb, "has_decided"), 1)
            .value(&member(&swb, "result"), "false");
        script_list(channel, &swb, "cpus", 0);

        let fbg = member(base, "fbg");
        channel
            .value(&member(&fbg, "smt_active"), "false")
            .value(&member(&fbg, "asym_cpucapacity"), "false")
            .value(&member(&fbg, "asym_packing"), "false")
            .value(&member(&fbg, "has_stats"), 0);
        script_list(channel, &fbg, "groups", 0);

        let fbq = member(base, "fbq");
        for field in ["busiest_load", "busiest_capacity", "busiest_util", "busiest_nr"] {
            channel.value(&member(&fbq, field), 0);
        }
        channel.value(&member(&fbq, "has_finished"), 0);
        script_list(channel, &fbq, "cpus", 0);
    }

    fn script_rd_entry(channel: &mut ScriptedChannel, base: &str, has_lb: bool) {
        channel
            .value(&member(base, "max_cost"), 15000)
            .value(&member(base, "interval"), 8)
            .value(&member(base, "continue_balancing"), 1)
            .value(&member(base, "need_serialize"), 0)
            .value(&member(base, "new_idle"), "__CPU_NOT_IDLE")
            .value(&member(base, "new_busy"), 0)
            .value(&member(base, "has_lb"), u8::from(has_lb));
    }

    #[test]
    fn test_null_slot_decodes_to_none_without_further_queries() {
        let walker = RingWalker::new("rq");
        let slot = walker.slot_expr(0);

        let mut channel = ScriptedChannel::new();
        channel.null(&slot, "struct lb_log");

        let mut decoder = SchemaDecoder::new(&mut channel, CORES);
        assert_eq!(decoder.decode_slot(&slot, 2).unwrap(), None);
        assert_eq!(channel.queries, vec![format!("print {slot}")]);
    }

    #[test]
    fn test_other_codepaths_carry_no_payload() {
        let walker = RingWalker::new("rq");
        let slot = walker.slot_expr(1);
        let log = deref(&slot);

        let mut channel = ScriptedChannel::new();
        channel
            .pointer(&slot, "struct lb_log", 0xffff_8880_0400_0000)
            .value(&member(&log, "codepath"), "LB_LOG_NEWIDLE_BALANCE");

        let mut decoder = SchemaDecoder::new(&mut channel, CORES);
        let record = decoder.decode_slot(&slot, 2).unwrap().unwrap();
        assert_eq!(record.codepath, Codepath::NewidleBalance);
        assert_eq!(record.payload, None);
        assert_eq!(channel.queries.len(), 2);
    }

    #[test]
    fn test_rebalance_domains_record() {
        let mut channel = ScriptedChannel::new();
        channel
            .value("log.rd.cpu", 0)
            .value("log.rd.idle", "CPU_IDLE")
            .value("log.rd.sched_idle_cpu", "false");
        script_rd_entry(&mut channel, "log.rd.entries[0]", false);
        script_rd_entry(&mut channel, "log.rd.entries[1]", true);
        script_early_lb(&mut channel, "log.rd.entries[1].lb");

        let mut decoder = SchemaDecoder::new(&mut channel, CORES);
        let rd = decoder.decode_rd("log.rd", 2).unwrap();

        assert_eq!(rd.idle, CpuIdleType::Idle);
        assert_eq!(rd.entries.len(), 2);
        assert_eq!(rd.entries[0].lb, None);
        assert_eq!(rd.entries[0].new_idle, CpuIdleType::NotIdle);

        let lb = rd.entries[1].lb.as_ref().unwrap();
        assert_eq!(
            lb.env.sd,
            Some(DomainRef {
                level: 1,
                span_weight: 4
            })
        );
        assert_eq!(lb.env.src_rq, Some(QueueRef { cpu: 3 }));
        assert_eq!(lb.env.dst_rq, None);
        assert_eq!(lb.env.dst_grpmask, None);
        assert_eq!(lb.env.cpus.as_ref().map(CpuMask::as_str), Some("1111"));
        assert_eq!(lb.env.fbq_type, FbqType::All);
        assert_eq!(lb.env.loop_break, 32);

        assert_eq!(lb.swb.newly_idle, None);
        assert_eq!(lb.swb.group_scan, None);
        assert!(lb.swb.cpus.is_empty());
        assert_eq!(lb.swb.result, Some(false));

        assert_eq!(lb.fbg.stats, None);
        assert!(lb.fbg.groups.is_empty());
        assert_eq!(lb.fbq.finished, None);

        assert!(!channel.was_queried("log.rd.entries[2].max_cost"));
        assert!(!channel.was_queried("log.rd.entries[0].lb.env.src_cpu"));
        assert!(!channel.was_queried("log.rd.entries[1].lb.swb.dst_nr_running"));
    }

    #[test]
    fn test_unreached_stats_closes_dependent_sections() {
        let mut channel = ScriptedChannel::new();
        script_early_lb(&mut channel, "lb");

        let mut decoder = SchemaDecoder::new(&mut channel, CORES);
        let fbg = decoder.decode_fbg("lb.fbg").unwrap();
        assert_eq!(fbg.energy, None);
        assert_eq!(fbg.busiest, None);
        assert_eq!(fbg.compared, None);
        assert_eq!(fbg.imbalance, None);

        for flag in ["has_energy", "has_busiest", "has_compared", "has_imbalance"] {
            assert!(!channel.was_queried(&format!("lb.fbg.{flag}")), "{flag}");
        }
    }

    #[test]
    fn test_busiest_group_sections() {
        let mut channel = ScriptedChannel::new();
        channel
            .value("fbg.smt_active", "true")
            .value("fbg.asym_cpucapacity", "false")
            .value("fbg.asym_packing", "false")
            .value("fbg.has_stats", 1)
            .value("fbg.total_load", 3072)
            .value("fbg.total_capacity", 4096)
            .value("fbg.groups[0].group_balance_cpu", 0)
            .null("fbg.groups[0].span", "struct cpumask")
            .value("fbg.groups[1].group_balance_cpu", 2)
            .pointer("fbg.groups[1].span", "struct cpumask", 0xffff_8880_0500_0000)
            .binary("(*(fbg.groups[1].span))", "{bits = {1100}}")
            .value("fbg.has_energy", 0)
            .value("fbg.has_busiest", 1)
            .value("fbg.has_compared", 0)
            .value("fbg.has_imbalance", 1)
            .value("fbg.imbalance", 1)
            .value("fbg.migration_type", "migrate_task");
        script_sg_stats(&mut channel, "fbg.local", 512);
        script_sg_stats(&mut channel, "fbg.groups[0].stats", 512);
        script_sg_stats(&mut channel, "fbg.groups[1].stats", 1536);
        script_sg_stats(&mut channel, "fbg.busiest", 1536);
        script_list(&mut channel, "fbg", "groups", 2);

        let mut decoder = SchemaDecoder::new(&mut channel, CORES);
        let fbg = decoder.decode_fbg("fbg").unwrap();

        assert_eq!(fbg.stats.as_ref().unwrap().local.avg_load, 512);
        assert_eq!(fbg.groups.len(), 2);
        assert_eq!(fbg.groups[0].span, None);
        assert_eq!(fbg.groups[1].span.as_ref().map(CpuMask::as_str), Some("1100"));
        assert_eq!(fbg.groups[1].stats.group_type, GroupType::Overloaded);
        assert_eq!(fbg.energy, None);
        assert_eq!(fbg.busiest.as_ref().unwrap().avg_load, 1536);
        assert_eq!(fbg.compared, None);
        assert_eq!(
            fbg.imbalance,
            Some(FbgImbalance {
                imbalance: 1,
                migration_type: MigrationType::Task
            })
        );
        assert!(!channel.was_queried("fbg.sd_avg_load"));
    }

    #[test]
    fn test_should_we_balance_per_cpu_entries() {
        let mut channel = ScriptedChannel::new();
        channel
            .value("swb.dst_cpu_allowed", "true")
            .value("swb.has_newly_idle", 0)
            .value("swb.has_group_scan", 1)
            .binary("swb.swb_cpus", "{bits = {11}}")
            .value("swb.group_balance_cpu", 0)
            .value("swb.cpus[0].cpu", 0)
            .value("swb.cpus[0].idle_cpu", 0)
            .value("swb.cpus[0].has_core_idle", 0)
            .value("swb.cpus[1].cpu", 1)
            .value("swb.cpus[1].idle_cpu", 1)
            .value("swb.cpus[1].has_core_idle", 1)
            .value("swb.cpus[1].is_core_idle", "true")
            .value("swb.has_decided", 1)
            .value("swb.result", 1);
        script_list(&mut channel, "swb", "cpus", 2);

        let mut decoder = SchemaDecoder::new(&mut channel, CORES);
        let swb = decoder.decode_swb("swb").unwrap();

        assert_eq!(swb.newly_idle, None);
        assert_eq!(swb.group_scan.as_ref().unwrap().swb_cpus.as_str(), "0011");
        assert_eq!(
            swb.cpus,
            vec![
                SwbPerCpuLogMsg {
                    cpu: 0,
                    idle_cpu: false,
                    is_core_idle: None
                },
                SwbPerCpuLogMsg {
                    cpu: 1,
                    idle_cpu: true,
                    is_core_idle: Some(true)
                },
            ]
        );
        assert_eq!(swb.result, Some(true));
        assert!(!channel.was_queried("swb.dst_nr_running"));
        assert!(!channel.was_queried("swb.cpus[0].is_core_idle"));
    }

    #[test]
    fn test_newly_idle_balance_skips_group_scan() {
        let mut channel = ScriptedChannel::new();
        channel
            .value("swb.dst_cpu_allowed", "true")
            .value("swb.has_newly_idle", 1)
            .value("swb.dst_nr_running", 0)
            .value("swb.dst_ttwu_pending", "false")
            .value("swb.has_group_scan", 0)
            .value("swb.has_decided", 1)
            .value("swb.result", "true");
        script_list(&mut channel, "swb", "cpus", 0);

        let mut decoder = SchemaDecoder::new(&mut channel, CORES);
        let swb = decoder.decode_swb("swb").unwrap();

        assert_eq!(
            swb.newly_idle,
            Some(SwbNewlyIdle {
                dst_nr_running: 0,
                dst_ttwu_pending: false
            })
        );
        assert_eq!(swb.group_scan, None);
        assert_eq!(swb.result, Some(true));
        assert!(!channel.was_queried("swb.group_balance_cpu"));
        assert!(!channel.queries.iter().any(|q| q.ends_with("swb.swb_cpus")));
    }

    #[test]
    fn test_energy_and_compared_sections() {
        let mut channel = ScriptedChannel::new();
        channel
            .value("fbg.smt_active", "false")
            .value("fbg.asym_cpucapacity", "true")
            .value("fbg.asym_packing", "false")
            .value("fbg.has_stats", 1)
            .value("fbg.total_load", 2048)
            .value("fbg.total_capacity", 4096)
            .value("fbg.has_energy", 1)
            .value("fbg.rd_overutilized", "true")
            .value("fbg.rd_pd_overlap", "false")
            .value("fbg.has_busiest", 1)
            .value("fbg.has_compared", 1)
            .value("fbg.sd_avg_load", 1280)
            .value("fbg.imbalance_pct", 117)
            .value("fbg.has_imbalance", 0);
        script_sg_stats(&mut channel, "fbg.local", 256);
        script_sg_stats(&mut channel, "fbg.busiest", 1792);
        script_list(&mut channel, "fbg", "groups", 0);

        let mut decoder = SchemaDecoder::new(&mut channel, CORES);
        let fbg = decoder.decode_fbg("fbg").unwrap();

        assert_eq!(
            fbg.energy,
            Some(FbgEnergy {
                rd_overutilized: true,
                rd_pd_overlap: false
            })
        );
        assert_eq!(fbg.busiest.as_ref().unwrap().avg_load, 1792);
        assert_eq!(
            fbg.compared,
            Some(FbgCompared {
                sd_avg_load: 1280,
                imbalance_pct: 117
            })
        );
        assert_eq!(fbg.imbalance, None);
        assert!(!channel.was_queried("fbg.imbalance"));
        assert!(!channel.was_queried("fbg.migration_type"));
    }

    #[test]
    fn test_fbq_cpu_migrate_util() {
        let mut channel = ScriptedChannel::new();
        script_fbq_cpu_prefix(&mut channel, "c");
        channel
            .value("c.migration_type", "migrate_util")
            .value("c.util_cfs_boost", 612);

        let mut decoder = SchemaDecoder::new(&mut channel, CORES);
        let migration = decoder.decode_fbq_cpu("c").unwrap().migration.unwrap();

        assert_eq!(migration.migration_type, MigrationType::Util);
        assert_eq!(migration.util_cfs_boost, Some(612));
        assert_eq!(migration.cpu_load, None);
        assert_eq!(migration.cpu_capacity, None);
        assert_eq!(migration.arch_scale_cpu_capacity, None);
        assert_eq!(migration.imbalance_pct, None);
        assert_eq!(migration.misfit_task_load, None);
        for field in ["cpu_load", "misfit_task_load"] {
            assert!(!channel.was_queried(&format!("c.{field}")), "{field}");
        }
    }

    #[test]
    fn test_fbq_cpu_migrate_task_reads_nothing_more() {
        let mut channel = ScriptedChannel::new();
        script_fbq_cpu_prefix(&mut channel, "c");
        channel.value("c.migration_type", "migrate_task");

        let mut decoder = SchemaDecoder::new(&mut channel, CORES);
        let migration = decoder.decode_fbq_cpu("c").unwrap().migration.unwrap();

        assert_eq!(
            migration,
            FbqMigrationLogMsg {
                migration_type: MigrationType::Task,
                cpu_load: None,
                cpu_capacity: None,
                arch_scale_cpu_capacity: None,
                imbalance_pct: None,
                util_cfs_boost: None,
                misfit_task_load: None,
            }
        );
        assert_eq!(
            channel.queries.last().map(String::as_str),
            Some("print c.migration_type")
        );
    }

    #[test]
    fn test_fbq_cpu_migrate_load() {
        let mut channel = ScriptedChannel::new();
        script_fbq_cpu_prefix(&mut channel, "c");
        channel
            .value("c.migration_type", "migrate_load")
            .value("c.cpu_load", 2048)
            .value("c.cpu_capacity", 1024)
            .value("c.arch_scale_cpu_capacity", 1024)
            .value("c.imbalance_pct", 117);

        let mut decoder = SchemaDecoder::new(&mut channel, CORES);
        let cpu = decoder.decode_fbq_cpu("c").unwrap();

        assert_eq!(cpu.rq_type, FbqType::Regular);
        assert_eq!(cpu.h_nr_running, Some(3));
        let migration = cpu.migration.unwrap();
        assert_eq!(migration.migration_type, MigrationType::Load);
        assert_eq!(migration.cpu_load, Some(2048));
        assert_eq!(migration.cpu_capacity, Some(1024));
        assert_eq!(migration.arch_scale_cpu_capacity, Some(1024));
        assert_eq!(migration.imbalance_pct, Some(117));
        assert_eq!(migration.util_cfs_boost, None);
        assert_eq!(migration.misfit_task_load, None);
        assert!(!channel.was_queried("c.misfit_task_load"));
    }

    #[test]
    fn test_fbq_cpu_migrate_misfit() {
        let mut channel = ScriptedChannel::new();
        script_fbq_cpu_prefix(&mut channel, "c");
        channel
            .value("c.migration_type", "migrate_misfit")
            .value("c.misfit_task_load", 733);

        let mut decoder = SchemaDecoder::new(&mut channel, CORES);
        let migration = decoder.decode_fbq_cpu("c").unwrap().migration.unwrap();

        assert_eq!(migration.misfit_task_load, Some(733));
        assert_eq!(migration.cpu_load, None);
        assert_eq!(migration.cpu_capacity, None);
        assert_eq!(migration.arch_scale_cpu_capacity, None);
        assert_eq!(migration.imbalance_pct, None);
        assert_eq!(migration.util_cfs_boost, None);
        assert!(!channel.was_queried("c.cpu_load"));
    }

    #[test]
    fn test_fbq_cpu_stops_at_first_unreached_group() {
        let mut channel = ScriptedChannel::new();
        channel
            .value("c.cpu", 1)
            .value("c.rq_type", "remote")
            .value("c.has_nr_running", 1)
            .value("c.h_nr_running", 0)
            .value("c.has_capacity", 0);

        let mut decoder = SchemaDecoder::new(&mut channel, CORES);
        let cpu = decoder.decode_fbq_cpu("c").unwrap();

        assert_eq!(cpu.h_nr_running, Some(0));
        assert_eq!(cpu.capacity, None);
        assert_eq!(cpu.dst_capacity, None);
        assert_eq!(cpu.asym_cpu_priority_value, None);
        assert_eq!(cpu.migration, None);
        for flag in ["has_asym_capacity", "has_asym_prio", "has_migration"] {
            assert!(!channel.was_queried(&format!("c.{flag}")), "{flag}");
        }
    }

    #[test]
    fn test_fbq_finished_with_null_busiest() {
        let mut channel = ScriptedChannel::new();
        channel
            .value("fbq.busiest_load", 0)
            .value("fbq.busiest_capacity", 0)
            .value("fbq.busiest_util", 0)
            .value("fbq.busiest_nr", 0)
            .value("fbq.has_finished", 1)
            .null("fbq.busiest", "struct rq");
        script_list(&mut channel, "fbq", "cpus", 0);

        let mut decoder = SchemaDecoder::new(&mut channel, CORES);
        let fbq = decoder.decode_fbq("fbq").unwrap();
        assert_eq!(fbq.finished, Some(FbqOutcome { busiest: None }));
        assert!(fbq.cpus.is_empty());
    }
}
