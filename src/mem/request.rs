use crate::mem::decode::{AddrVec, Level};
use crate::tick::{Addr, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReqKind {
    Read,
    Write,
}

impl ReqKind {
    pub fn is_read(self) -> bool {
        matches!(self, ReqKind::Read)
    }
}

/// One memory access moving through the controller. A request lives in
/// exactly one place at a time: the read queue, the write queue, or the
/// pending-completion list; it is moved, never shared.
#[derive(Debug, Clone)]
pub struct Request {
    pub kind: ReqKind,
    pub addr: Addr,
    pub addr_vec: AddrVec,
    pub core_id: usize,
    pub eip: Addr,
    /// Starts at 0 and is decremented each tick the request stays queued;
    /// more negative means older.
    pub order_id: i64,
    pub begin_exe: Tick,
    pub end_exe: Tick,
}

impl Request {
    pub fn new(kind: ReqKind, addr: Addr, addr_vec: AddrVec, core_id: usize, eip: Addr) -> Self {
        Self {
            kind,
            addr,
            addr_vec,
            core_id,
            eip,
            order_id: 0,
            begin_exe: 0,
            end_exe: 0,
        }
    }

    pub fn rank(&self) -> usize {
        self.addr_vec[Level::Rank as usize] as usize
    }

    pub fn bank(&self) -> usize {
        self.addr_vec[Level::Bank as usize] as usize
    }

    pub fn channel(&self) -> usize {
        self.addr_vec[Level::Channel as usize] as usize
    }
}
