use log::info;

use crate::cache::dcache::DataCache;
use crate::mem::request::ReqKind;
use crate::proc::mmu::Mmu;
use crate::proc::window::Window;
use crate::sim::trace::{Instruction, Op, Trace};
use crate::tick::{Addr, Tick};

#[derive(Debug, Clone, Copy)]
struct PhaseTracking {
    instrs_per_phase: u64,
    in_phase: u64,
    phase_end: bool,
    num_phases: u64,
}

/// One in-order core replaying a trace: retire up to IPC window entries,
/// then fill the window with up to IPC new instructions, pushing memory
/// operations into the data cache.
pub struct Core {
    core_id: usize,
    trace: Trace,
    cycles: Tick,
    retired: u64,
    num_loads: u64,
    num_stores: u64,
    window: Window,
    block_mask: Addr,
    cur_inst: Option<Instruction>,
    phase: Option<PhaseTracking>,
}

impl Core {
    pub fn new(core_id: usize, mut trace: Trace, block_size: u64) -> Self {
        let cur_inst = trace.next_instruction();
        Self {
            core_id,
            trace,
            cycles: 0,
            retired: 0,
            num_loads: 0,
            num_stores: 0,
            window: Window::new(block_size),
            block_mask: block_size - 1,
            cur_inst,
            phase: None,
        }
    }

    pub fn core_id(&self) -> usize {
        self.core_id
    }

    pub fn retired(&self) -> u64 {
        self.retired
    }

    pub fn num_loads(&self) -> u64 {
        self.num_loads
    }

    pub fn num_stores(&self) -> u64 {
        self.num_stores
    }

    /// Completion notification from the memory side, block-aligned.
    pub fn complete(&mut self, addr: Addr) {
        self.window.mark_ready(addr);
    }

    /// Instruction issuing is finished; outstanding cache requests are
    /// accounted separately by the owner of the cache.
    pub fn issuing_done(&self) -> bool {
        self.cur_inst.is_none() && self.window.is_empty()
    }

    pub fn tick(&mut self, cache: &mut DataCache, mmu: &mut Mmu) {
        self.cycles += 1;

        let retired_now = self.window.retire() as u64;
        self.retired += retired_now;
        if let Some(phase) = &mut self.phase {
            phase.in_phase += retired_now;
        }

        if self.cycles % 1_000_000 == 0 {
            info!(
                "core {} has done {} instructions",
                self.core_id, self.retired
            );
        }

        if self.cur_inst.is_none() {
            return;
        }
        if let Some(phase) = &mut self.phase {
            if phase.in_phase >= phase.instrs_per_phase {
                phase.phase_end = true;
                return;
            }
        }

        let mut inserted = 0;
        while inserted < Window::IPC && !self.window.is_full() {
            let Some(inst) = self.cur_inst.as_mut() else {
                break;
            };

            if inst.op == Op::Exe {
                let mut inst = self.cur_inst.take().unwrap();
                inst.ready_to_commit = true;
                self.window.insert(inst);
                inserted += 1;
                self.cur_inst = self.trace.next_instruction();
                continue;
            }

            if !inst.already_translated {
                inst.target_paddr = mmu.va2pa(self.core_id, inst.target_vaddr);
            }
            let block_addr = inst.target_paddr & !self.block_mask;
            let kind = match inst.op {
                Op::Load => ReqKind::Read,
                Op::Store => ReqKind::Write,
                Op::Exe => unreachable!(),
            };

            if cache.send(self.cycles, kind, block_addr, inst.eip) {
                let mut inst = self.cur_inst.take().unwrap();
                match inst.op {
                    Op::Store => {
                        self.num_stores += 1;
                        inst.ready_to_commit = true;
                    }
                    Op::Load => self.num_loads += 1,
                    Op::Exe => unreachable!(),
                }
                self.window.insert(inst);
                inserted += 1;
                self.cur_inst = self.trace.next_instruction();
            } else {
                // Keep the translation so the retry skips the MMU.
                inst.already_translated = true;
                break;
            }
        }
    }

    /// Enable phase-by-phase execution; non-positive disables it.
    pub fn num_instrs_per_phase(&mut self, instrs: i64) {
        if instrs <= 0 {
            self.phase = None;
            return;
        }
        self.phase = Some(PhaseTracking {
            instrs_per_phase: instrs as u64,
            in_phase: 0,
            phase_end: false,
            num_phases: 0,
        });
    }

    pub fn end_of_phase(&self) -> bool {
        self.phase.map_or(true, |p| p.phase_end)
    }

    pub fn phase_enabled(&self) -> bool {
        self.phase.is_some()
    }

    pub fn record_phase(&mut self, mmu: &mut Mmu) {
        let Some(phase) = &mut self.phase else { return };
        phase.num_phases += 1;
        phase.phase_end = false;
        phase.in_phase = 0;
        mmu.phase_done();
    }
}
