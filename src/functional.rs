//! Functional (fast) execution engine
//!
//! Executes one instruction per tick and is authoritative for
//! architectural results: the cycle engine must reach the same final
//! register, predicate and memory state for any valid program.
//!
//! Each tick fetches the word at PC, advances PC by 4 *before*
//! dispatch (so jumps are relative to the next instruction), checks
//! the predicate guard, and commits the instruction atomically.

use thiserror::Error;
use tracing::debug;

use crate::bus::{Bus, BusError};
use crate::exec::{self, ExecError};
use crate::instr::decode::{decode_at, DecodeError};
use crate::registers::RegFile;
use crate::trace::{TraceRecord, TraceSink};

/// Default entry PC and load base
pub const DEFAULT_ENTRY: u32 = 0x1000;

/// Fatal engine conditions. The engine preserves its state for
/// inspection; a new engine is needed for another run.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("fetch fault at pc 0x{pc:08x}: {source}")]
    FetchFault { pc: u32, source: BusError },
    #[error("decode failed at pc 0x{pc:08x}: {source}")]
    Decode { pc: u32, source: DecodeError },
    #[error("execution failed at pc 0x{pc:08x}: {source}")]
    Exec { pc: u32, source: ExecError },
    #[error("cycle budget of {limit} exceeded before HALT")]
    CycleBudgetExceeded { limit: u64 },
}

pub struct FunctionalCore {
    pub regs: RegFile,
    pub pc: u32,
    pub cycle_count: u64,
    pub bus: Bus,
    halted: bool,
    trace: Option<Box<dyn TraceSink>>,
}

impl Default for FunctionalCore {
    fn default() -> Self {
        Self::with_bus(Bus::default())
    }
}

impl FunctionalCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bus(bus: Bus) -> Self {
        Self {
            regs: RegFile::new(),
            pc: DEFAULT_ENTRY,
            cycle_count: 0,
            bus,
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

    /// Execute one instruction. Returns false once the engine has
    /// halted; further calls are no-ops.
    pub fn step(&mut self) -> Result<bool, CoreError> {
        if self.halted {
            return Ok(false);
        }
        let fetch_pc = self.pc;
        let word = self
            .bus
            .read32(fetch_pc)
            .map_err(|source| CoreError::FetchFault {
                pc: fetch_pc,
                source,
            })?;
        self.pc = fetch_pc.wrapping_add(4);
        let tick = self.cycle_count;
        self.cycle_count += 1;

        let d = decode_at(word, fetch_pc).map_err(|source| CoreError::Decode {
            pc: fetch_pc,
            source,
        })?;

        if let Some(k) = d.pred {
            if !self.regs.read_pred(k) {
                debug!(pc = fetch_pc, pred = k, "predicate false, skipping");
                if let Some(sink) = self.trace.as_mut() {
                    sink.emit(&TraceRecord::skip(tick, &d));
                }
                return Ok(true);
            }
        }

        let before = self.regs.snapshot();
        let effects =
            exec::commit(&d, &mut self.regs, &mut self.bus).map_err(|source| CoreError::Exec {
                pc: fetch_pc,
                source,
            })?;
        if let Some(target) = effects.jump {
            debug!(pc = fetch_pc, target, "jump committed");
            self.pc = target;
        }
        if effects.halt {
            debug!(cycles = self.cycle_count, "halt committed");
            self.halted = true;
        }
        if let Some(sink) = self.trace.as_mut() {
            let after = self.regs.snapshot();
            sink.emit(&TraceRecord::commit(tick, &d, &before, &after, effects.memops));
        }
        Ok(!self.halted)
    }

    /// Run until HALT, a fatal error, or the optional cycle budget is
    /// exhausted. `entry`, when given, overrides the current PC.
    pub fn run(&mut self, entry: Option<u32>, max_cycles: Option<u64>) -> Result<(), CoreError> {
        if let Some(entry) = entry {
            self.pc = entry;
        }
        let mut executed = 0u64;
        loop {
            if let Some(limit) = max_cycles {
                if executed >= limit {
                    return Err(CoreError::CycleBudgetExceeded { limit });
                }
            }
            if !self.step()? {
                return Ok(());
            }
            executed += 1;
        }
    }
}
