//! Cycle-accurate execution engine
//!
//! Fetches one instruction per cycle, issues it to the first idle
//! functional unit of the matching class, and commits completed
//! instructions in issue order once their latency elapses. Operands
//! are read at commit, not at issue, so the final architectural state
//! matches the functional engine for any well-formed program.
//!
//! Per-tick order: commit completed units first, then fetch, check
//! the predicate against the committed state, and issue. An
//! instruction that finds no idle unit stalls: the fetch is undone and
//! retried next tick. A fetched HALT waits for every unit to drain
//! before retiring, so in-flight loads and stores always reach memory.

use tracing::debug;

use crate::bus::{Bus, BusError};
use crate::exec;
use crate::functional::{CoreError, DEFAULT_ENTRY};
use crate::fu::{FuClass, FunctionalUnit, Issued};
use crate::instr::decode::{decode_at, Decoded, Instr};
use crate::registers::RegFile;
use crate::trace::{TraceRecord, TraceSink};

pub struct CycleCore {
    pub regs: RegFile,
    pub pc: u32,
    pub cycle: u64,
    pub bus: Bus,
    alus: Vec<FunctionalUnit>,
    lsus: Vec<FunctionalUnit>,
    vecs: Vec<FunctionalUnit>,
    next_issue: u64,
    next_commit: u64,
    halted: bool,
    trace: Option<Box<dyn TraceSink>>,
}

impl Default for CycleCore {
    fn default() -> Self {
        Self::with_bus(Bus::default())
    }
}

impl CycleCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bus(bus: Bus) -> Self {
        Self {
            regs: RegFile::new(),
            pc: DEFAULT_ENTRY,
            cycle: 0,
            bus,
            alus: vec![
                FunctionalUnit::new("ALU0", FuClass::Alu, 1),
                FunctionalUnit::new("ALU1", FuClass::Alu, 1),
            ],
            lsus: vec![FunctionalUnit::new("LSU0", FuClass::Lsu, 3)],
            vecs: vec![FunctionalUnit::vector("VEC0", 2, 4)],
            next_issue: 0,
            next_commit: 0,
            halted: false,
            trace: None,
        }
    }

    pub fn set_trace(&mut self, sink: Box<dyn TraceSink>) {
        self.trace = Some(sink);
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn load_words(&mut self, addr: u32, words: &[u32]) -> Result<(), BusError> {
        self.bus.load_words(addr, words)
    }

    pub fn load_blob(&mut self, addr: u32, data: &[u8]) -> Result<(), BusError> {
        self.bus.load_blob(addr, data)
    }

    fn units_mut(&mut self) -> impl Iterator<Item = &mut FunctionalUnit> {
        self.alus
            .iter_mut()
            .chain(self.lsus.iter_mut())
            .chain(self.vecs.iter_mut())
    }

    fn any_busy(&self) -> bool {
        self.alus
            .iter()
            .chain(self.lsus.iter())
            .chain(self.vecs.iter())
            .any(FunctionalUnit::busy)
    }

    /// Commit every completed instruction, oldest first. Stops at the
    /// first in-flight instruction whose latency has not elapsed.
    fn commit_completed(&mut self) -> Result<(), CoreError> {
        loop {
            let (seq, cycle) = (self.next_commit, self.cycle);
            let Some(issued) = self
                .units_mut()
                .find_map(|fu| fu.take_if_finished(seq, cycle))
            else {
                return Ok(());
            };
            self.commit_one(issued.decoded)?;
            self.next_commit += 1;
        }
    }

    fn commit_one(&mut self, d: Decoded) -> Result<(), CoreError> {
        let before = self.regs.snapshot();
        let effects =
            exec::commit(&d, &mut self.regs, &mut self.bus).map_err(|source| CoreError::Exec {
                pc: d.pc,
                source,
            })?;
        if let Some(target) = effects.jump {
            debug!(pc = d.pc, target, cycle = self.cycle, "jump committed");
            self.pc = target;
        }
        if effects.halt {
            self.halted = true;
        }
        if let Some(sink) = self.trace.as_mut() {
            let after = self.regs.snapshot();
            sink.emit(&TraceRecord::commit(
                self.cycle,
                &d,
                &before,
                &after,
                effects.memops,
            ));
        }
        Ok(())
    }

    /// Advance the machine by one cycle. Returns false once halted;
    /// further calls are no-ops.
    pub fn step(&mut self) -> Result<bool, CoreError> {
        if self.halted {
            return Ok(false);
        }

        // Commit phase precedes fetch, so values written by a
        // completing load are visible to the instruction issued in the
        // same cycle
        self.commit_completed()?;

        let fetch_pc = self.pc;
        let word = self
            .bus
            .read32(fetch_pc)
            .map_err(|source| CoreError::FetchFault {
                pc: fetch_pc,
                source,
            })?;
        self.pc = fetch_pc.wrapping_add(4);
        let d = decode_at(word, fetch_pc).map_err(|source| CoreError::Decode {
            pc: fetch_pc,
            source,
        })?;

        // Predicate check against the committed state only
        if let Some(k) = d.pred {
            if !self.regs.read_pred(k) {
                debug!(pc = fetch_pc, pred = k, cycle = self.cycle, "predicate false");
                if let Some(sink) = self.trace.as_mut() {
                    sink.emit(&TraceRecord::skip(self.cycle, &d));
                }
                self.cycle += 1;
                return Ok(true);
            }
        }

        if matches!(d.instr, Instr::Halt) {
            if self.any_busy() {
                // Drain in-flight work before retiring the halt
                self.pc = fetch_pc;
                self.cycle += 1;
                return Ok(true);
            }
            self.commit_one(d)?;
            self.cycle += 1;
            return Ok(false);
        }

        let class = FuClass::for_instr(&d.instr);
        let cycle = self.cycle;
        let units = match class {
            FuClass::Alu => &mut self.alus,
            FuClass::Lsu => &mut self.lsus,
            FuClass::Vec => &mut self.vecs,
        };
        match units.iter_mut().find(|fu| fu.can_accept(cycle)) {
            Some(fu) => {
                debug!(pc = fetch_pc, unit = fu.name, cycle, "issue");
                fu.start(
                    Issued {
                        seq: self.next_issue,
                        decoded: d,
                    },
                    cycle,
                );
                self.next_issue += 1;
            }
            None => {
                // Structural stall: undo the fetch and retry next tick
                debug!(pc = fetch_pc, cycle, "issue stall");
                self.pc = fetch_pc;
            }
        }
        self.cycle += 1;
        Ok(true)
    }

    /// Run until HALT commits, a fatal error occurs, or the optional
    /// cycle budget is exhausted.
    pub fn run(&mut self, entry: Option<u32>, max_cycles: Option<u64>) -> Result<(), CoreError> {
        if let Some(entry) = entry {
            self.pc = entry;
        }
        loop {
            if let Some(limit) = max_cycles {
                if self.cycle >= limit {
                    return Err(CoreError::CycleBudgetExceeded { limit });
                }
            }
            if !self.step()? {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::instr::encode::*;
    use crate::instr::opcodes::*;
    use crate::trace::Recorder;

    fn run_program(words: &[u32]) -> CycleCore {
        let mut core = CycleCore::new();
        core.load_words(DEFAULT_ENTRY, words).unwrap();
        core.run(None, Some(1000)).unwrap();
        core
    }

    #[test]
    fn check_addi_basic() {
        let core = run_program(&[enc_ri(MAJ_ADDI, 1, 0, 123, None, true).unwrap(), enc_halt()]);
        assert_eq!(core.regs.read(1), 123);
    }

    #[test]
    fn check_load_latency_respected() {
        // The LD takes 3 cycles; the HALT fetched behind it must wait
        // for it to drain
        let mut core = CycleCore::new();
        core.bus.write32(0x2000, 77).unwrap();
        core.regs.write(5, 0x2000);
        core.load_words(
            DEFAULT_ENTRY,
            &[enc_ri(MAJ_LD, 6, 5, 0, None, true).unwrap(), enc_halt()],
        )
        .unwrap();
        core.run(None, Some(100)).unwrap();
        assert_eq!(core.regs.read(6), 77);
        // Issue at cycle 0, commit at cycle 3, halt at cycle 3
        assert!(core.cycle >= 4);
    }

    #[test]
    fn check_load_result_visible_to_dependent_add() {
        // Read-at-commit plus in-order retirement: the ADD must see
        // the loaded value even though its unit finishes first
        let mut core = CycleCore::new();
        core.bus.write32(0x2000, 40).unwrap();
        core.regs.write(5, 0x2000);
        core.regs.write(1, 2);
        core.load_words(
            DEFAULT_ENTRY,
            &[
                enc_ri(MAJ_LD, 6, 5, 0, None, true).unwrap(),
                enc_3r(MAJ_ADD, 7, 6, 1, None, true),
                enc_halt(),
            ],
        )
        .unwrap();
        core.run(None, Some(100)).unwrap();
        assert_eq!(core.regs.read(7), 42);
    }

    #[test]
    fn check_back_to_back_loads_stall() {
        let mut core = CycleCore::new();
        core.bus.write32(0x2000, 1).unwrap();
        core.bus.write32(0x2004, 2).unwrap();
        core.regs.write(5, 0x2000);
        core.load_words(
            DEFAULT_ENTRY,
            &[
                enc_ri(MAJ_LD, 6, 5, 0, None, true).unwrap(),
                enc_ri(MAJ_LD, 7, 5, 4, None, true).unwrap(),
                enc_halt(),
            ],
        )
        .unwrap();
        core.run(None, Some(100)).unwrap();
        assert_eq!(core.regs.read(6), 1);
        assert_eq!(core.regs.read(7), 2);
        // Second load cannot issue until the single LSU frees at
        // cycle 3; it then commits at cycle 6
        assert!(core.cycle >= 7);
    }

    #[test]
    fn check_store_drains_before_halt() {
        let mut core = CycleCore::new();
        core.regs.write(5, 0x2004);
        core.regs.write(6, 0xdead_beef);
        core.load_words(DEFAULT_ENTRY, &[enc_st(5, 6, None, true), enc_halt()])
            .unwrap();
        core.run(None, Some(100)).unwrap();
        assert_eq!(core.bus.read32(0x2004).unwrap(), 0xdead_beef);
    }

    #[test]
    fn check_jump_updates_pc_at_commit() {
        let core = run_program(&[
            enc_ri(MAJ_ADDI, 1, 0, 100, None, true).unwrap(),
            enc_i(MAJ_J, 2, None, true).unwrap(),
            enc_ri(MAJ_ADDI, 1, 0, 200, None, true).unwrap(),
            enc_halt(),
            enc_ri(MAJ_ADDI, 2, 0, 50, None, true).unwrap(),
            enc_halt(),
        ]);
        assert_eq!(core.regs.read(1), 100);
        assert_eq!(core.regs.read(2), 50);
    }

    #[test]
    fn check_predicate_read_after_cmpi_commits() {
        let core = run_program(&[
            enc_cmpi(1, 0, 0, CmpOp::Gt, None, true).unwrap(),
            enc_ri(MAJ_ADDI, 2, 0, 9, Some(1), true).unwrap(),
            enc_ri(MAJ_ADDI, 3, 0, 4, None, true).unwrap(),
            enc_halt(),
        ]);
        // P1 went false before the predicated ADDI was fetched
        assert_eq!(core.regs.read(2), 0);
        assert_eq!(core.regs.read(3), 4);
    }

    #[test]
    fn check_halt_is_sticky() {
        let mut core = run_program(&[enc_halt()]);
        assert!(core.halted());
        assert!(!core.step().unwrap());
    }

    #[test]
    fn check_cycle_budget_exceeded() {
        let mut core = CycleCore::new();
        core.load_words(DEFAULT_ENTRY, &[enc_i(MAJ_J, -1, None, true).unwrap()])
            .unwrap();
        let result = core.run(None, Some(50));
        assert!(matches!(
            result,
            Err(CoreError::CycleBudgetExceeded { limit: 50 })
        ));
    }

    #[test]
    fn check_trace_commit_cycles_reflect_latency() {
        let recorder = Recorder::new();
        let mut core = CycleCore::new();
        core.set_trace(Box::new(recorder.clone()));
        core.regs.write(5, 0x2000);
        core.load_words(
            DEFAULT_ENTRY,
            &[enc_ri(MAJ_LD, 6, 5, 0, None, true).unwrap(), enc_halt()],
        )
        .unwrap();
        core.run(None, Some(100)).unwrap();
        let records = recorder.take();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].op, "LD");
        assert_eq!(records[0].cycle, 3);
        assert_eq!(records[1].op, "HALT");
        assert_eq!(records[0].memops.len(), 1);
    }
}
