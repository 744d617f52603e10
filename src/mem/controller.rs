use serde::Serialize;

use crate::mem::array::Array;
use crate::mem::cp_log::{CpAnalysisLog, CpEvent};
use crate::mem::pump::{BankState, CpKind, CpStatus};
use crate::mem::request::{ReqKind, Request};
use crate::sim::config::{ControllerKind, SimConfig};
use crate::tick::{Addr, Tick};

/// Everything the controller needs to know at construction time. Kept as a
/// plain struct so tests can pin latencies directly instead of going through
/// the config-derived formulas.
#[derive(Debug, Clone)]
pub struct ControllerParams {
    pub kind: ControllerKind,
    pub num_ranks: usize,
    pub num_banks: usize,
    pub queue_size: usize,
    pub wr_high_watermark: f64,
    pub wr_low_watermark: f64,
    pub back_logging_threshold: i64,
    pub single_read_latency: Tick,
    pub single_write_latency: Tick,
    pub channel_delay: Tick,
    /// Charge (= discharge) time of the read pump.
    pub nclks_rcp: Tick,
    /// Charge (= discharge) time of the write pump; dominates when both
    /// pumps charge in parallel.
    pub nclks_wcp: Tick,
    pub pj_read: f64,
    pub pj_write: f64,
}

impl ControllerParams {
    pub fn from_config(cfg: &SimConfig) -> Self {
        let bits = (cfg.block_size * 8) as f64;
        Self {
            kind: cfg.mem_controller_type,
            num_ranks: cfg.num_of_ranks as usize,
            num_banks: cfg.num_of_banks as usize,
            queue_size: cfg.queue_size,
            wr_high_watermark: cfg.wr_high_watermark,
            wr_low_watermark: cfg.wr_low_watermark,
            back_logging_threshold: cfg.back_logging_threshold(),
            single_read_latency: cfg.single_read_latency(),
            single_write_latency: cfg.single_write_latency(),
            channel_delay: cfg.channel_delay(),
            nclks_rcp: cfg.single_read_latency() / 10,
            nclks_wcp: cfg.single_write_latency() / 10,
            pj_read: cfg.pj_bit_rd * bits,
            pj_write: (cfg.pj_bit_set + cfg.pj_bit_reset) / 2.0 * bits,
        }
    }

    pub fn nclks(&self, cp: CpKind) -> Tick {
        match cp {
            CpKind::Rcp => self.nclks_rcp,
            CpKind::Wcp => self.nclks_wcp,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ControllerStats {
    pub reads_served: u64,
    pub writes_served: u64,
    pub discharges: u64,
    pub total_idle: u64,
    pub total_ps_aging: f64,
    pub total_vl_aging: f64,
    pub total_sa_aging: f64,
    pub read_cp_on_ticks: u64,
    pub write_cp_on_ticks: u64,
    pub energy_pj: f64,
}

/// PCM channel controller. One instance per channel; the scheduler policy
/// (FCFS / CP-Static / LASER-1 / LASER-2) is selected by `params.kind` and
/// lives in `scheduler.rs`.
pub struct PcmController {
    pub(crate) id: usize,
    pub(crate) clk: Tick,
    pub(crate) params: ControllerParams,
    pub(crate) array: Array,
    pub(crate) banks: Vec<BankState>,

    pub(crate) readq: Vec<Request>,
    pub(crate) writeq: Vec<Request>,
    pub(crate) pending: Vec<Request>,
    pub(crate) write_mode: bool,

    /// Queued (not yet dispatched) requests per bank, by kind. Kept
    /// incrementally so the discharge policy can ask "any more reads/writes
    /// for this bank?" without scanning.
    pub(crate) queued_reads: Vec<u32>,
    pub(crate) queued_writes: Vec<u32>,

    pub(crate) discharge_enabled: bool,
    pub(crate) stats: ControllerStats,
    pub(crate) cp_log: Option<CpAnalysisLog>,
    completions: Vec<(usize, Addr)>,
}

impl PcmController {
    pub fn new(id: usize, params: ControllerParams) -> Self {
        let num_banks = params.num_ranks * params.num_banks;
        Self {
            id,
            clk: 0,
            array: Array::new(params.num_ranks, params.num_banks),
            banks: vec![BankState::default(); num_banks],
            readq: Vec::new(),
            writeq: Vec::new(),
            pending: Vec::new(),
            write_mode: false,
            queued_reads: vec![0; num_banks],
            queued_writes: vec![0; num_banks],
            discharge_enabled: true,
            stats: ControllerStats::default(),
            cp_log: None,
            completions: Vec::new(),
            params,
        }
    }

    pub fn set_cp_log(&mut self, log: CpAnalysisLog) {
        self.cp_log = Some(log);
    }

    pub fn set_discharge_enabled(&mut self, enabled: bool) {
        self.discharge_enabled = enabled;
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn clk(&self) -> Tick {
        self.clk
    }

    pub fn write_mode(&self) -> bool {
        self.write_mode
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    pub fn array(&self) -> &Array {
        &self.array
    }

    pub fn bank_state(&self, rank: usize, bank: usize) -> &BankState {
        &self.banks[self.bank_idx(rank, bank)]
    }

    pub fn queue_len(&self, kind: ReqKind) -> usize {
        match kind {
            ReqKind::Read => self.readq.len(),
            ReqKind::Write => self.writeq.len(),
        }
    }

    pub fn inflight(&self) -> usize {
        self.pending.len()
    }

    /// Requests the controller is still responsible for, in any queue.
    pub fn pending_requests(&self) -> usize {
        self.readq.len() + self.writeq.len() + self.pending.len()
    }

    pub(crate) fn bank_idx(&self, rank: usize, bank: usize) -> usize {
        debug_assert!(bank < self.params.num_banks);
        rank * self.params.num_banks + bank
    }

    pub(crate) fn bank_uid(&self, rank: usize, bank: usize) -> u64 {
        (self.id * self.params.num_ranks * self.params.num_banks) as u64
            + self.bank_idx(rank, bank) as u64
    }

    /// Enqueue a request; false when the target queue is full.
    pub fn send(&mut self, req: Request) -> bool {
        let idx = self.bank_idx(req.rank(), req.bank());
        match req.kind {
            ReqKind::Read => {
                if self.readq.len() >= self.params.queue_size {
                    return false;
                }
                self.queued_reads[idx] += 1;
                self.readq.push(req);
            }
            ReqKind::Write => {
                if self.writeq.len() >= self.params.queue_size {
                    return false;
                }
                self.queued_writes[idx] += 1;
                self.writeq.push(req);
            }
        }
        true
    }

    /// Completion tokens (core id, block address) produced since the last
    /// call. The system routes them back through the owning cache.
    pub fn take_completions(&mut self) -> Vec<(usize, Addr)> {
        std::mem::take(&mut self.completions)
    }

    /// One controller cycle; the step order is a sequential transaction.
    pub fn tick(&mut self) {
        self.clk += 1;
        self.array.update(self.clk);

        if self.params.kind.uses_pumps() {
            self.update_bank_counters();
            if self.discharge_enabled {
                self.discharge_open_banks();
            }
        }

        self.serve_pending();
        self.update_write_mode();
        self.schedule();
    }

    /// End-of-run accounting: close out every pump still on. Never affects
    /// timing; safe to skip entirely.
    pub fn finish(&mut self) {
        if !self.params.kind.uses_pumps() {
            return;
        }
        for rank in 0..self.params.num_ranks {
            for bank in 0..self.params.num_banks {
                let idx = self.bank_idx(rank, bank);
                match self.banks[idx].cp_status {
                    CpStatus::BothOn => self.record_cp_event(None, rank, bank),
                    CpStatus::RcpOn => self.record_cp_event(Some(CpKind::Rcp), rank, bank),
                    CpStatus::WcpOn => self.record_cp_event(Some(CpKind::Wcp), rank, bank),
                    CpStatus::BothOff => continue,
                }
                self.banks[idx].cp_status = CpStatus::BothOff;
                self.banks[idx].reset_window();
            }
        }
        if let Some(log) = &mut self.cp_log {
            log.flush();
        }
    }

    /// Working/idle bookkeeping, done once per tick before discharging.
    fn update_bank_counters(&mut self) {
        for rank in 0..self.params.num_ranks {
            for bank in 0..self.params.num_banks {
                let idx = self.bank_idx(rank, bank);
                let status = self.banks[idx].cp_status;
                if status.rcp_on() {
                    self.stats.read_cp_on_ticks += 1;
                    if !self.array.is_bank_free(rank, bank) {
                        self.banks[idx].working_ticks += 1;
                    } else {
                        self.banks[idx].idle_ticks += 1;
                    }
                }
                if status.wcp_on() {
                    self.stats.write_cp_on_ticks += 1;
                }
            }
        }
    }

    fn serve_pending(&mut self) {
        let clk = self.clk;
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].end_exe <= clk {
                let req = self.pending.swap_remove(i);
                let idx = self.bank_idx(req.rank(), req.bank());
                self.banks[idx].busy_cp = None;
                self.completions.push((req.core_id, req.addr));
            } else {
                i += 1;
            }
        }
    }

    /// Watermark hysteresis: batch writes to amortize pump charging, but
    /// never while reads are waiting and the backlog is small.
    fn update_write_mode(&mut self) {
        let max = self.params.queue_size as f64;
        if !self.write_mode {
            let high = (self.params.wr_high_watermark * max) as usize;
            if self.writeq.len() > high || self.readq.is_empty() {
                self.write_mode = true;
            }
        } else {
            let low = (self.params.wr_low_watermark * max) as usize;
            if self.writeq.len() < low && !self.readq.is_empty() {
                self.write_mode = false;
            }
        }
    }

    fn schedule(&mut self) {
        use crate::mem::scheduler::Pick;

        let Some(pick) = self.get_head() else { return };
        let (mut req, from_write) = match pick {
            Pick::FromRead(at) => (self.readq.remove(at), false),
            Pick::FromWrite(at) => (self.writeq.remove(at), true),
        };
        let idx = self.bank_idx(req.rank(), req.bank());
        match req.kind {
            ReqKind::Read => self.queued_reads[idx] -= 1,
            ReqKind::Write => self.queued_writes[idx] -= 1,
        }

        self.channel_access(&mut req);
        self.pending.push(req);

        // Back-logging: reads age on every dispatch so a backlogged read
        // can eventually preempt a write batch; writes age only while the
        // write queue is active.
        for waiting in self.readq.iter_mut() {
            waiting.order_id -= 1;
        }
        if from_write {
            for waiting in self.writeq.iter_mut() {
                waiting.order_id -= 1;
            }
        }
    }

    pub(crate) fn record_cp_event(&mut self, cp: Option<CpKind>, rank: usize, bank: usize) {
        let idx = self.bank_idx(rank, bank);
        let state = &self.banks[idx];

        let (pump, begin_charge, end_charge, discharge_clks) = match cp {
            Some(CpKind::Rcp) => (
                "RCP",
                state.read_cp_charge_begin,
                state.read_cp_charge_end,
                self.params.nclks_rcp,
            ),
            Some(CpKind::Wcp) => (
                "WCP",
                state.write_cp_charge_begin,
                state.write_cp_charge_end,
                self.params.nclks_wcp,
            ),
            None => (
                "Both",
                state.write_cp_charge_begin,
                state.write_cp_charge_end,
                self.params.nclks_wcp,
            ),
        };

        let ev = CpEvent {
            pump,
            bank_uid: self.bank_uid(rank, bank),
            begin_charge,
            end_charge,
            begin_discharge: self.clk,
            end_discharge: self.clk + discharge_clks,
            idle_ticks: state.idle_ticks,
            ps_aging: state.ps_aging(),
            vl_aging: state.vl_aging(),
            sa_aging: state.sa_aging(),
        };

        self.stats.discharges += 1;
        self.stats.total_idle += ev.idle_ticks;
        self.stats.total_ps_aging += ev.ps_aging;
        self.stats.total_vl_aging += ev.vl_aging;
        self.stats.total_sa_aging += ev.sa_aging;

        if let Some(log) = &mut self.cp_log {
            log.record(&ev);
        }
    }
}
