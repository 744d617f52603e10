use crate::cache::dcache::DataCache;
use crate::mem::controller::{ControllerParams, PcmController};
use crate::mem::decode::{AddrDecoder, Level};
use crate::mem::request::{ReqKind, Request};
use crate::proc::core::Core;
use crate::proc::mmu::Mmu;
use crate::sim::config::{CacheLevel, SimConfig};
use crate::sim::stats::{ControllerSummary, CoreSummary, SummaryStats};
use crate::sim::trace::Trace;
use crate::tick::{Addr, Tick};

/// All channel controllers plus the address decoder that routes to them.
pub struct MemSystem {
    decoder: AddrDecoder,
    pub controllers: Vec<PcmController>,
    completions: Vec<(usize, Addr)>,
}

impl MemSystem {
    pub fn new(cfg: &SimConfig) -> Self {
        let params = ControllerParams::from_config(cfg);
        let controllers = (0..cfg.num_of_channels as usize)
            .map(|id| PcmController::new(id, params.clone()))
            .collect();
        Self {
            decoder: AddrDecoder::new(cfg),
            controllers,
            completions: Vec::new(),
        }
    }

    /// Decode, route to the owning channel, enqueue. False on a full queue.
    pub fn send(&mut self, kind: ReqKind, addr: Addr, core_id: usize, eip: Addr) -> bool {
        let addr_vec = self.decoder.decode(addr);
        let channel = addr_vec[Level::Channel as usize] as usize;
        self.controllers[channel].send(Request::new(kind, addr, addr_vec, core_id, eip))
    }

    pub fn tick(&mut self) {
        for ctrl in self.controllers.iter_mut() {
            ctrl.tick();
            self.completions.extend(ctrl.take_completions());
        }
    }

    pub fn take_completions(&mut self) -> Vec<(usize, Addr)> {
        std::mem::take(&mut self.completions)
    }

    pub fn pending_requests(&self) -> usize {
        self.controllers.iter().map(|c| c.pending_requests()).sum()
    }

    pub fn finish(&mut self) {
        for ctrl in self.controllers.iter_mut() {
            ctrl.finish();
        }
    }
}

/// The whole simulated machine. Components tick in fixed dependency order
/// within one global cycle: cores, then caches, then the memory system;
/// completion tokens are routed back before the cycle ends.
pub struct System {
    cfg: SimConfig,
    clk: Tick,
    cores: Vec<Core>,
    caches: Vec<DataCache>,
    pub mem: MemSystem,
    mmu: Mmu,
}

impl System {
    pub fn new(cfg: SimConfig, traces: Vec<Trace>, seed: u64) -> Self {
        let num_cores = traces.len();
        let l1d = *cfg.cache(CacheLevel::L1d);
        let mmu = Mmu::new(num_cores, cfg.pcm_size_bytes(), seed);
        let mem = MemSystem::new(&cfg);
        let cores = traces
            .into_iter()
            .enumerate()
            .map(|(id, trace)| Core::new(id, trace, cfg.block_size))
            .collect();
        let caches = (0..num_cores)
            .map(|id| DataCache::new(id, l1d.num_mshrs, l1d.tag_latency))
            .collect();
        Self {
            cfg,
            clk: 0,
            cores,
            caches,
            mem,
            mmu,
        }
    }

    pub fn clk(&self) -> Tick {
        self.clk
    }

    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    pub fn set_instrs_per_phase(&mut self, instrs: i64) {
        for core in self.cores.iter_mut() {
            core.num_instrs_per_phase(instrs);
        }
    }

    pub fn tick(&mut self) {
        self.clk += 1;

        let mem = &mut self.mem;
        for (core, cache) in self.cores.iter_mut().zip(self.caches.iter_mut()) {
            cache.tick(self.clk, |kind, addr, core_id, eip| {
                mem.send(kind, addr, core_id, eip)
            });
            core.tick(cache, &mut self.mmu);
        }

        self.mem.tick();

        for (core_id, addr) in self.mem.take_completions() {
            self.caches[core_id].complete(addr);
        }
        for (core, cache) in self.cores.iter_mut().zip(self.caches.iter_mut()) {
            for addr in cache.take_completions() {
                core.complete(addr);
            }
        }

        // Phase barrier: when every core has finished its phase, record and
        // resume; the MMU is told so a placement policy could react.
        if self.cores.iter().any(|c| c.phase_enabled())
            && self.cores.iter().all(|c| c.end_of_phase())
        {
            for core in self.cores.iter_mut() {
                core.record_phase(&mut self.mmu);
            }
        }
    }

    pub fn done(&self) -> bool {
        self.cores.iter().all(|c| c.issuing_done())
            && self.caches.iter().all(|c| c.pending_requests() == 0)
            && self.mem.pending_requests() == 0
    }

    /// Run to completion (or the tick limit) and return the final tick.
    pub fn run(&mut self, timeout: Tick) -> Tick {
        while !self.done() && self.clk < timeout {
            self.tick();
        }
        self.mem.finish();
        self.clk
    }

    pub fn summary(&self) -> SummaryStats {
        let per_core: Vec<CoreSummary> = self
            .cores
            .iter()
            .zip(self.caches.iter())
            .map(|(core, cache)| CoreSummary {
                core_id: core.core_id(),
                retired: core.retired(),
                loads: core.num_loads(),
                stores: core.num_stores(),
                pages_allocated: self.mmu.pages_allocated(core.core_id()),
                cache: *cache.stats(),
            })
            .collect();
        let controllers: Vec<ControllerSummary> = self
            .mem
            .controllers
            .iter()
            .map(|ctrl| ControllerSummary {
                channel_id: ctrl.id(),
                stats: *ctrl.stats(),
            })
            .collect();

        let total_energy_pj: f64 = controllers.iter().map(|c| c.stats.energy_pj).sum();
        let seconds = self.clk as f64 / (self.cfg.on_chip_frequency * 1e6);
        let avg_power_watts = if seconds > 0.0 {
            total_energy_pj * 1e-12 / seconds
        } else {
            0.0
        };

        SummaryStats {
            workload: self.cfg.workload.clone(),
            mem_controller_type: self.cfg.mem_controller_type.name().to_string(),
            exe_ticks: self.clk,
            num_cores: self.cores.len(),
            per_core,
            controllers,
            total_energy_pj,
            avg_power_watts,
            rapl: self.cfg.power_limit_enabled.then_some(self.cfg.rapl),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::config::ControllerKind;
    use std::io::Cursor;

    fn small_config(kind: ControllerKind) -> SimConfig {
        let mut cfg = SimConfig::default();
        cfg.mem_controller_type = kind;
        cfg.num_of_channels = 1;
        cfg.num_of_ranks = 1;
        cfg.num_of_banks = 8;
        cfg.workload = "unit".to_string();
        cfg
    }

    fn trace(text: &str) -> Trace {
        Trace::from_reader("mem".to_string(), Cursor::new(text.to_string()))
    }

    #[test]
    fn single_core_runs_to_completion() {
        let cfg = small_config(ControllerKind::Laser2);
        let mut sys = System::new(cfg, vec![trace("L 1 4096\nE 2\nS 3 8192\n")], 1);
        let ticks = sys.run(100_000);
        assert!(sys.done(), "did not drain by tick {ticks}");
        assert_eq!(sys.cores()[0].retired(), 3);
        let summary = sys.summary();
        assert_eq!(summary.per_core[0].loads, 1);
        assert_eq!(summary.per_core[0].stores, 1);
        assert!(summary.total_energy_pj > 0.0);
    }

    #[test]
    fn two_cores_with_shared_controller_are_isolated() {
        // Scenario: two cores, independent traces, one shared channel.
        let cfg = small_config(ControllerKind::Laser2);
        let t0 = "L 1 4096\nL 2 8192\nE 3\nE 4\n";
        let t1 = "S 1 4096\nL 2 12288\nE 3\n";
        let mut sys = System::new(cfg, vec![trace(t0), trace(t1)], 1);
        sys.run(100_000);
        assert!(sys.done());
        assert_eq!(sys.cores()[0].retired(), 4);
        assert_eq!(sys.cores()[1].retired(), 3);
        // Each core touched its own pages.
        assert!(sys.mmu().pages_allocated(0) >= 2);
        assert!(sys.mmu().pages_allocated(1) >= 2);
    }

    #[test]
    fn fcfs_and_cp_static_complete_the_same_trace() {
        let text = "L 1 4096\nL 2 8192\nS 3 4096\nL 4 12288\nE 5\n";
        let mut fcfs = System::new(small_config(ControllerKind::Fcfs), vec![trace(text)], 1);
        let mut stat = System::new(small_config(ControllerKind::CpStatic), vec![trace(text)], 1);
        fcfs.run(100_000);
        stat.run(100_000);
        assert!(fcfs.done() && stat.done());
        assert_eq!(fcfs.cores()[0].retired(), stat.cores()[0].retired());
    }

    #[test]
    fn same_seed_is_deterministic() {
        let text = "L 1 4096\nS 2 8192\nL 3 16384\nE 4\n";
        let mut a = System::new(small_config(ControllerKind::Laser1), vec![trace(text)], 9);
        let mut b = System::new(small_config(ControllerKind::Laser1), vec![trace(text)], 9);
        assert_eq!(a.run(100_000), b.run(100_000));
        assert_eq!(
            a.mem.controllers[0].stats().reads_served,
            b.mem.controllers[0].stats().reads_served
        );
    }
}
