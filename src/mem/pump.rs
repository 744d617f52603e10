use crate::tick::Tick;

/// Aging beyond this forces a discharge to de-stress the device.
pub const AGING_LIMIT: f64 = 1000.0;

/// Extra cycles every pump gets to de-stress during a discharge.
pub const DESTRESS_TICKS: Tick = 10;

/// Which pumps are powered for a bank. A read needs the RCP, a write needs
/// both pumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpStatus {
    BothOff,
    RcpOn,
    WcpOn,
    BothOn,
}

impl CpStatus {
    pub fn rcp_on(self) -> bool {
        matches!(self, CpStatus::RcpOn | CpStatus::BothOn)
    }

    pub fn wcp_on(self) -> bool {
        matches!(self, CpStatus::WcpOn | CpStatus::BothOn)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpKind {
    Rcp,
    Wcp,
}

/// Per-(rank, bank) charge-pump record: pump status, which pump is serving
/// the in-flight access, and the aging window since the last discharge.
#[derive(Debug, Clone)]
pub struct BankState {
    pub cp_status: CpStatus,
    pub busy_cp: Option<CpKind>,

    /// Ticks the bank was serving a request while a pump was on.
    pub working_ticks: Tick,
    /// Ticks a pump was on but the bank sat free.
    pub idle_ticks: Tick,

    pub reads_served: u64,
    pub writes_served: u64,

    pub read_cp_charge_begin: Tick,
    pub read_cp_charge_end: Tick,
    pub write_cp_charge_begin: Tick,
    pub write_cp_charge_end: Tick,
}

impl Default for BankState {
    fn default() -> Self {
        Self {
            cp_status: CpStatus::BothOff,
            busy_cp: None,
            working_ticks: 0,
            idle_ticks: 0,
            reads_served: 0,
            writes_served: 0,
            read_cp_charge_begin: 0,
            read_cp_charge_end: 0,
            write_cp_charge_begin: 0,
            write_cp_charge_end: 0,
        }
    }
}

impl BankState {
    /// Pump-stress aging; dominated by writes.
    pub fn ps_aging(&self) -> f64 {
        1.82 * self.reads_served as f64
            + 580.95 * self.writes_served as f64
            + 0.03 * self.idle_ticks as f64
    }

    /// Sense-amp aging; dominated by reads.
    pub fn sa_aging(&self) -> f64 {
        59.63 * self.reads_served as f64
            + 5.22 * self.writes_served as f64
            + 0.03 * self.idle_ticks as f64
    }

    /// Voltage-limiter aging.
    pub fn vl_aging(&self) -> f64 {
        1.82 * self.reads_served as f64
            + 171.26 * self.writes_served as f64
            + 0.03 * self.idle_ticks as f64
    }

    /// CP-Static's coarse counter: every tick a pump spent on.
    pub fn total_aging(&self) -> Tick {
        self.working_ticks + self.idle_ticks
    }

    /// Clears the aging window after a discharge. Pump status and charge
    /// timestamps are managed by the discharge itself.
    pub fn reset_window(&mut self) {
        self.working_ticks = 0;
        self.idle_ticks = 0;
        self.reads_served = 0;
        self.writes_served = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_both_off() {
        let b = BankState::default();
        assert_eq!(b.cp_status, CpStatus::BothOff);
        assert!(b.busy_cp.is_none());
        assert_eq!(b.total_aging(), 0);
    }

    #[test]
    fn status_predicates() {
        assert!(CpStatus::RcpOn.rcp_on());
        assert!(CpStatus::BothOn.rcp_on());
        assert!(!CpStatus::WcpOn.rcp_on());
        assert!(CpStatus::WcpOn.wcp_on());
        assert!(CpStatus::BothOn.wcp_on());
        assert!(!CpStatus::BothOff.wcp_on());
    }

    #[test]
    fn aging_formulas_match_the_model() {
        let mut b = BankState::default();
        b.reads_served = 10;
        b.writes_served = 2;
        b.idle_ticks = 100;
        assert!((b.ps_aging() - (18.2 + 1161.9 + 3.0)).abs() < 1e-9);
        assert!((b.sa_aging() - (596.3 + 10.44 + 3.0)).abs() < 1e-9);
        assert!((b.vl_aging() - (18.2 + 342.52 + 3.0)).abs() < 1e-9);
    }

    #[test]
    fn two_writes_exceed_ps_limit() {
        let mut b = BankState::default();
        b.writes_served = 2;
        assert!(b.ps_aging() > AGING_LIMIT);
    }

    #[test]
    fn reset_window_clears_counters_only() {
        let mut b = BankState {
            cp_status: CpStatus::BothOn,
            working_ticks: 5,
            idle_ticks: 7,
            reads_served: 3,
            writes_served: 1,
            ..BankState::default()
        };
        b.reset_window();
        assert_eq!(b.cp_status, CpStatus::BothOn);
        assert_eq!(b.total_aging(), 0);
        assert_eq!(b.reads_served, 0);
        assert_eq!(b.writes_served, 0);
    }
}
