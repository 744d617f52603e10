use std::collections::HashMap;

use serde::Serialize;

use crate::cache::queue::CacheQueue;
use crate::mem::request::ReqKind;
use crate::tick::{Addr, Tick};

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub accesses: u64,
    pub coalesced: u64,
    pub misses: u64,
    pub full_rejects: u64,
    pub completed: u64,
}

#[derive(Debug, Clone, Copy)]
struct MshrInfo {
    kind: ReqKind,
    eip: Addr,
}

/// Thin per-core data cache: an outstanding-address queue in front of the
/// memory system. No data moves and no hit latency is modeled beyond the
/// tag lookup; a block is outstanding from `send` until `complete`.
pub struct DataCache {
    core_id: usize,
    tag_latency: Tick,
    queue: CacheQueue,
    info: HashMap<Addr, MshrInfo>,
    completions: Vec<Addr>,
    stats: CacheStats,
}

impl DataCache {
    pub fn new(core_id: usize, num_mshrs: usize, tag_latency: Tick) -> Self {
        Self {
            core_id,
            tag_latency,
            queue: CacheQueue::new(num_mshrs),
            info: HashMap::new(),
            completions: Vec::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn core_id(&self) -> usize {
        self.core_id
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Accept a block-aligned access, coalescing onto an outstanding entry
    /// when possible. False means the MSHRs are full and the core must
    /// retry.
    pub fn send(&mut self, clk: Tick, kind: ReqKind, addr: Addr, eip: Addr) -> bool {
        self.stats.accesses += 1;
        if self.queue.is_in_queue(addr) {
            self.stats.coalesced += 1;
            return true;
        }
        if self.queue.is_full() {
            self.stats.full_rejects += 1;
            return false;
        }
        self.queue.allocate(addr, clk + self.tag_latency);
        self.info.insert(addr, MshrInfo { kind, eip });
        self.stats.misses += 1;
        true
    }

    /// Forward ready entries downstream, oldest first, stopping at the
    /// first rejection so ordering stays FCFS.
    pub fn tick<F>(&mut self, clk: Tick, mut forward: F)
    where
        F: FnMut(ReqKind, Addr, usize, Addr) -> bool,
    {
        while let Some(addr) = self.queue.get_entry(clk) {
            let info = self.info[&addr];
            if forward(info.kind, addr, self.core_id, info.eip) {
                self.queue.entry_on_board(addr);
            } else {
                break;
            }
        }
    }

    /// Called when the memory system finishes the block. Surfaces the
    /// address to the owning core.
    pub fn complete(&mut self, addr: Addr) {
        self.queue.de_allocate(addr, true);
        self.info.remove(&addr);
        self.stats.completed += 1;
        self.completions.push(addr);
    }

    pub fn take_completions(&mut self) -> Vec<Addr> {
        std::mem::take(&mut self.completions)
    }

    pub fn pending_requests(&self) -> usize {
        self.queue.num_entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesces_repeated_blocks() {
        let mut c = DataCache::new(0, 2, 1);
        assert!(c.send(0, ReqKind::Write, 0x40, 1));
        assert!(c.send(0, ReqKind::Read, 0x40, 2));
        assert_eq!(c.pending_requests(), 1);
        assert_eq!(c.stats().coalesced, 1);
    }

    #[test]
    fn rejects_when_mshrs_full() {
        let mut c = DataCache::new(0, 1, 1);
        assert!(c.send(0, ReqKind::Read, 0x40, 1));
        assert!(!c.send(0, ReqKind::Read, 0x80, 2));
        assert_eq!(c.stats().full_rejects, 1);
    }

    #[test]
    fn forwards_after_tag_latency_in_order() {
        let mut c = DataCache::new(0, 4, 2);
        c.send(0, ReqKind::Read, 0x40, 1);
        c.send(0, ReqKind::Write, 0x80, 2);

        let mut seen = Vec::new();
        c.tick(1, |_, addr, _, _| {
            seen.push(addr);
            true
        });
        assert!(seen.is_empty(), "nothing ready before the tag lookup");

        c.tick(2, |kind, addr, core, _| {
            seen.push(addr);
            if addr == 0x40 {
                assert_eq!(kind, ReqKind::Read);
            }
            assert_eq!(core, 0);
            true
        });
        assert_eq!(seen, vec![0x40, 0x80]);
    }

    #[test]
    fn rejection_stops_the_forward_loop() {
        let mut c = DataCache::new(0, 4, 0);
        c.send(0, ReqKind::Read, 0x40, 1);
        c.send(0, ReqKind::Read, 0x80, 2);
        let mut calls = 0;
        c.tick(1, |_, _, _, _| {
            calls += 1;
            false
        });
        assert_eq!(calls, 1);
        // Entry was not marked on board, so it is offered again.
        c.tick(2, |_, addr, _, _| {
            assert_eq!(addr, 0x40);
            true
        });
    }

    #[test]
    fn completion_surfaces_the_block() {
        let mut c = DataCache::new(0, 4, 0);
        c.send(0, ReqKind::Read, 0x40, 1);
        c.tick(1, |_, _, _, _| true);
        c.complete(0x40);
        assert_eq!(c.take_completions(), vec![0x40]);
        assert_eq!(c.pending_requests(), 0);
        assert!(c.take_completions().is_empty());
    }
}
