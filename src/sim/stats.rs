use std::io::{self, Write};

use serde::Serialize;

use crate::cache::dcache::CacheStats;
use crate::mem::controller::ControllerStats;
use crate::tick::Tick;

#[derive(Debug, Clone, Serialize)]
pub struct CoreSummary {
    pub core_id: usize,
    pub retired: u64,
    pub loads: u64,
    pub stores: u64,
    pub pages_allocated: u64,
    pub cache: CacheStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerSummary {
    pub channel_id: usize,
    pub stats: ControllerStats,
}

/// End-of-run summary. Emitted as `key = value` lines; the same struct
/// serializes to JSON for offline tooling.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryStats {
    pub workload: String,
    pub mem_controller_type: String,
    pub exe_ticks: Tick,
    pub num_cores: usize,
    pub per_core: Vec<CoreSummary>,
    pub controllers: Vec<ControllerSummary>,
    pub total_energy_pj: f64,
    pub avg_power_watts: f64,
    pub rapl: Option<f64>,
}

impl SummaryStats {
    pub fn write_kv<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "workload = {}", self.workload)?;
        writeln!(out, "mem_controller_type = {}", self.mem_controller_type)?;
        writeln!(out, "exe_ticks = {}", self.exe_ticks)?;
        writeln!(out, "num_cores = {}", self.num_cores)?;
        for core in &self.per_core {
            let id = core.core_id;
            writeln!(out, "core_{id}_retired = {}", core.retired)?;
            writeln!(out, "core_{id}_loads = {}", core.loads)?;
            writeln!(out, "core_{id}_stores = {}", core.stores)?;
            writeln!(out, "core_{id}_pages_allocated = {}", core.pages_allocated)?;
            writeln!(out, "core_{id}_cache_accesses = {}", core.cache.accesses)?;
            writeln!(out, "core_{id}_cache_coalesced = {}", core.cache.coalesced)?;
        }
        for ctrl in &self.controllers {
            let id = ctrl.channel_id;
            let s = &ctrl.stats;
            writeln!(out, "controller_{id}_reads_served = {}", s.reads_served)?;
            writeln!(out, "controller_{id}_writes_served = {}", s.writes_served)?;
            writeln!(out, "controller_{id}_discharges = {}", s.discharges)?;
            writeln!(out, "controller_{id}_total_idle = {}", s.total_idle)?;
            writeln!(out, "controller_{id}_total_ps_aging = {}", s.total_ps_aging)?;
            writeln!(out, "controller_{id}_total_vl_aging = {}", s.total_vl_aging)?;
            writeln!(out, "controller_{id}_total_sa_aging = {}", s.total_sa_aging)?;
            writeln!(out, "controller_{id}_read_cp_on_ticks = {}", s.read_cp_on_ticks)?;
            writeln!(out, "controller_{id}_write_cp_on_ticks = {}", s.write_cp_on_ticks)?;
            writeln!(out, "controller_{id}_energy_pj = {}", s.energy_pj)?;
        }
        writeln!(out, "total_energy_pj = {}", self.total_energy_pj)?;
        writeln!(out, "avg_power_watts = {}", self.avg_power_watts)?;
        if let Some(rapl) = self.rapl {
            writeln!(out, "rapl_watts = {rapl}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_output_is_line_per_stat() {
        let summary = SummaryStats {
            workload: "w".to_string(),
            mem_controller_type: "LASER-2".to_string(),
            exe_ticks: 100,
            num_cores: 1,
            per_core: vec![CoreSummary {
                core_id: 0,
                retired: 10,
                loads: 4,
                stores: 2,
                pages_allocated: 1,
                cache: CacheStats::default(),
            }],
            controllers: vec![],
            total_energy_pj: 1.5,
            avg_power_watts: 0.1,
            rapl: None,
        };
        let mut buf = Vec::new();
        summary.write_kv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("exe_ticks = 100"));
        assert!(text.contains("core_0_retired = 10"));
        assert!(!text.contains("rapl_watts"));
        for line in text.lines() {
            assert!(line.contains(" = "), "not key = value: {line}");
        }
    }

    #[test]
    fn serializes_to_json() {
        let summary = SummaryStats {
            workload: "w".to_string(),
            mem_controller_type: "FCFS".to_string(),
            exe_ticks: 1,
            num_cores: 0,
            per_core: vec![],
            controllers: vec![],
            total_energy_pj: 0.0,
            avg_power_watts: 0.0,
            rapl: Some(40.0),
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"exe_ticks\":1"));
    }
}
