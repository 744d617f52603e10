use crate::mem::controller::PcmController;
use crate::mem::pump::{CpKind, CpStatus, AGING_LIMIT, DESTRESS_TICKS};
use crate::mem::request::{ReqKind, Request};
use crate::sim::config::ControllerKind;
use crate::tick::Tick;

/// Which queue the scheduler picked from, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pick {
    FromRead(usize),
    FromWrite(usize),
}

impl PcmController {
    fn issueable(&self, req: &Request) -> bool {
        self.array.is_free(req.rank(), req.bank())
    }

    /// The only policy-varying selection point. FCFS and CP-Static are
    /// strictly FIFO on the active queue; the LASER variants may reorder,
    /// subject to the critical-read override.
    pub(crate) fn get_head(&self) -> Option<Pick> {
        match self.params.kind {
            ControllerKind::Fcfs | ControllerKind::CpStatic => {
                let (queue, pick): (&[Request], fn(usize) -> Pick) = if self.write_mode {
                    (&self.writeq, Pick::FromWrite)
                } else {
                    (&self.readq, Pick::FromRead)
                };
                let head = queue.first()?;
                self.issueable(head).then(|| pick(0))
            }
            ControllerKind::Laser1 | ControllerKind::Laser2 => self.get_head_laser(),
        }
    }

    fn get_head_laser(&self) -> Option<Pick> {
        // Step one: a read that has aged past the back-logging threshold is
        // dispatched next, even out of write mode, and nothing may overtake
        // it. This bounds read tail latency.
        if let Some(oldest) = self.readq.first() {
            if oldest.order_id <= self.params.back_logging_threshold {
                return self.issueable(oldest).then_some(Pick::FromRead(0));
            }
        }

        let (queue, pick): (&[Request], fn(usize) -> Pick) = if self.write_mode {
            (&self.writeq, Pick::FromWrite)
        } else {
            (&self.readq, Pick::FromRead)
        };
        if queue.is_empty() {
            return None;
        }

        // Step two: prefer a free bank whose pumps already support the
        // request kind; among those, take the bank idle the longest to
        // spread wear.
        let mut most_idle: Option<(usize, Tick)> = None;
        for (i, req) in queue.iter().enumerate() {
            let state = &self.banks[self.bank_idx(req.rank(), req.bank())];
            let charged = match req.kind {
                ReqKind::Read => state.cp_status.rcp_on(),
                ReqKind::Write => state.cp_status == CpStatus::BothOn,
            };
            if charged && self.issueable(req) {
                let idle = state.idle_ticks;
                if most_idle.map_or(true, |(_, best)| idle > best) {
                    most_idle = Some((i, idle));
                }
            }
        }
        if let Some((i, _)) = most_idle {
            return Some(pick(i));
        }

        // Step three: fall back to plain FCFS.
        self.issueable(&queue[0]).then(|| pick(0))
    }

    /// Dispatch one request: update pump state, derive the charging latency
    /// from the transition taken, stamp timestamps and occupy the array.
    pub(crate) fn channel_access(&mut self, req: &mut Request) {
        req.begin_exe = self.clk;
        let (rank, bank) = (req.rank(), req.bank());
        let idx = self.bank_idx(rank, bank);

        let mut charging: Tick = 0;
        match self.params.kind {
            ControllerKind::Fcfs => {}
            ControllerKind::CpStatic | ControllerKind::Laser1 => {
                // Both pumps charge in parallel; the write pump dominates.
                if self.banks[idx].cp_status == CpStatus::BothOff {
                    self.banks[idx].cp_status = CpStatus::BothOn;
                    charging = self.params.nclks_wcp;
                    self.banks[idx].write_cp_charge_begin = self.clk;
                    self.banks[idx].write_cp_charge_end = self.clk + charging;
                }
                assert_eq!(self.banks[idx].cp_status, CpStatus::BothOn);
            }
            ControllerKind::Laser2 => match req.kind {
                ReqKind::Read => match self.banks[idx].cp_status {
                    CpStatus::BothOff => {
                        self.banks[idx].cp_status = CpStatus::RcpOn;
                        charging = self.params.nclks_rcp;
                        self.banks[idx].read_cp_charge_begin = self.clk;
                        self.banks[idx].read_cp_charge_end = self.clk + charging;
                    }
                    CpStatus::WcpOn => {
                        self.banks[idx].cp_status = CpStatus::BothOn;
                        charging = self.params.nclks_rcp;
                        self.banks[idx].read_cp_charge_begin = self.clk;
                        self.banks[idx].read_cp_charge_end = self.clk + charging;
                    }
                    _ => {}
                },
                ReqKind::Write => match self.banks[idx].cp_status {
                    CpStatus::BothOff | CpStatus::RcpOn => {
                        self.banks[idx].cp_status = CpStatus::BothOn;
                        charging = self.params.nclks_wcp;
                        self.banks[idx].write_cp_charge_begin = self.clk;
                        self.banks[idx].write_cp_charge_end = self.clk + charging;
                    }
                    CpStatus::WcpOn => {
                        // Only the read pump is missing.
                        self.banks[idx].cp_status = CpStatus::BothOn;
                        charging = self.params.nclks_rcp;
                        self.banks[idx].read_cp_charge_begin = self.clk;
                        self.banks[idx].read_cp_charge_end = self.clk + charging;
                    }
                    CpStatus::BothOn => {}
                },
            },
        }

        if self.params.kind.uses_pumps() {
            let status = self.banks[idx].cp_status;
            match req.kind {
                ReqKind::Read => assert!(
                    status.rcp_on(),
                    "READ dispatched to ({rank}, {bank}) without a charged read pump"
                ),
                ReqKind::Write => assert_eq!(
                    status,
                    CpStatus::BothOn,
                    "WRITE dispatched to ({rank}, {bank}) without both pumps on"
                ),
            }
            self.banks[idx].busy_cp = Some(match req.kind {
                ReqKind::Read => CpKind::Rcp,
                ReqKind::Write => CpKind::Wcp,
            });
        }

        let op_latency = match req.kind {
            ReqKind::Read => {
                self.banks[idx].reads_served += 1;
                self.stats.reads_served += 1;
                self.stats.energy_pj += self.params.pj_read;
                self.params.single_read_latency
            }
            ReqKind::Write => {
                self.banks[idx].writes_served += 1;
                self.stats.writes_served += 1;
                self.stats.energy_pj += self.params.pj_write;
                self.params.single_write_latency
            }
        };

        let req_latency = charging + op_latency;
        req.end_exe = req.begin_exe + req_latency;
        self.array
            .post_access(rank, bank, self.params.channel_delay, req_latency);
    }

    /// Variant-specific discharge pass, run each tick before scheduling.
    pub(crate) fn discharge_open_banks(&mut self) {
        match self.params.kind {
            ControllerKind::Fcfs => {}
            ControllerKind::CpStatic => self.discharge_cp_static(),
            ControllerKind::Laser1 => self.discharge_laser1(),
            ControllerKind::Laser2 => self.discharge_laser2(),
        }
    }

    /// CP-Static tears a bank down after any write batch, or when the
    /// coarse on-time counter runs out.
    fn discharge_cp_static(&mut self) {
        for rank in 0..self.params.num_ranks {
            for bank in 0..self.params.num_banks {
                let idx = self.bank_idx(rank, bank);
                if self.banks[idx].cp_status != CpStatus::BothOn {
                    continue;
                }
                if self.banks[idx].writes_served > 0
                    || self.banks[idx].total_aging() >= AGING_LIMIT as Tick
                {
                    self.discharge_bank(rank, bank);
                }
            }
        }
    }

    fn discharge_laser1(&mut self) {
        for rank in 0..self.params.num_ranks {
            for bank in 0..self.params.num_banks {
                let idx = self.bank_idx(rank, bank);
                if self.banks[idx].cp_status != CpStatus::BothOn {
                    continue;
                }
                let aged = self.banks[idx].ps_aging() > AGING_LIMIT
                    || self.banks[idx].sa_aging() > AGING_LIMIT;
                let no_requests =
                    self.queued_reads[idx] == 0 && self.queued_writes[idx] == 0;
                if aged || no_requests {
                    self.discharge_bank(rank, bank);
                }
            }
        }
    }

    /// LASER-2 manages each pump on its own: the write pump keys on
    /// pump-stress aging, the read pump on sense-amp aging.
    fn discharge_laser2(&mut self) {
        for rank in 0..self.params.num_ranks {
            for bank in 0..self.params.num_banks {
                let idx = self.bank_idx(rank, bank);

                let state = &self.banks[idx];
                if state.cp_status.wcp_on()
                    && (state.ps_aging() > AGING_LIMIT || self.queued_writes[idx] == 0)
                {
                    self.discharge_pump(CpKind::Wcp, rank, bank);
                }

                let state = &self.banks[idx];
                if state.cp_status.rcp_on()
                    && (state.sa_aging() > AGING_LIMIT || self.queued_reads[idx] == 0)
                {
                    self.discharge_pump(CpKind::Rcp, rank, bank);
                }
            }
        }
    }

    /// Discharge both pumps of a bank together (CP-Static, LASER-1). The
    /// bank must not be serving; a busy bank is retried next tick.
    fn discharge_bank(&mut self, rank: usize, bank: usize) {
        if !self.array.is_bank_free(rank, bank) {
            return;
        }
        self.record_cp_event(None, rank, bank);

        let idx = self.bank_idx(rank, bank);
        let mut dt = DESTRESS_TICKS + self.params.nclks_wcp;
        let reqs_left = self.queued_reads[idx] + self.queued_writes[idx];
        if reqs_left > 0 {
            // Requests are still queued for this bank: charge right back.
            self.banks[idx].write_cp_charge_begin = self.clk + dt;
            self.banks[idx].write_cp_charge_end = self.clk + dt + self.params.nclks_wcp;
            dt += self.params.nclks_wcp;
            self.banks[idx].cp_status = CpStatus::BothOn;
        } else {
            self.banks[idx].cp_status = CpStatus::BothOff;
        }
        self.banks[idx].reset_window();

        self.array.add_bank_latency(rank, bank, dt);
        assert!(!self.array.is_bank_free(rank, bank));
    }

    /// Discharge a single pump (LASER-2). The currently busy pump may not
    /// be discharged until its access completes.
    fn discharge_pump(&mut self, cp: CpKind, rank: usize, bank: usize) {
        let idx = self.bank_idx(rank, bank);
        let busy = self.banks[idx].busy_cp == Some(cp);
        if busy && !self.array.is_bank_free(rank, bank) {
            return;
        }
        self.record_cp_event(Some(cp), rank, bank);

        let nclks = self.params.nclks(cp);
        let mut dt = DESTRESS_TICKS + nclks;
        let reqs_left = match cp {
            CpKind::Rcp => self.queued_reads[idx],
            CpKind::Wcp => self.queued_writes[idx],
        };
        if reqs_left > 0 {
            // Charge back immediately; the pump stays on.
            match cp {
                CpKind::Rcp => {
                    self.banks[idx].read_cp_charge_begin = self.clk + dt;
                    self.banks[idx].read_cp_charge_end = self.clk + dt + nclks;
                }
                CpKind::Wcp => {
                    self.banks[idx].write_cp_charge_begin = self.clk + dt;
                    self.banks[idx].write_cp_charge_end = self.clk + dt + nclks;
                }
            }
            dt += nclks;
        } else {
            self.banks[idx].cp_status = match (cp, self.banks[idx].cp_status) {
                (CpKind::Rcp, CpStatus::BothOn) => CpStatus::WcpOn,
                (CpKind::Rcp, CpStatus::RcpOn) => CpStatus::BothOff,
                (CpKind::Wcp, CpStatus::BothOn) => CpStatus::RcpOn,
                (CpKind::Wcp, CpStatus::WcpOn) => CpStatus::BothOff,
                (cp, status) => panic!("discharging {cp:?} while pump is off ({status:?})"),
            };
        }
        self.banks[idx].reset_window();

        // Occupy the bank for the discharge only when that does not rewind
        // an in-flight access of the other pump.
        if self.array.is_bank_free(rank, bank) {
            self.array.add_bank_latency(rank, bank, dt);
        }
    }
}
