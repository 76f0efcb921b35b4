//! Commit semantics shared by both engines
//!
//! The functional engine commits at fetch; the cycle engine commits
//! when a functional unit completes. Both call [`commit`], which reads
//! operands, applies the architectural effects atomically and reports
//! any control-flow or halt outcome. Reading operands here (at commit
//! rather than issue) is what keeps the two engines' final states
//! identical.

use thiserror::Error;

use crate::bus::{Bus, BusError};
use crate::instr::decode::{Decoded, Instr};
use crate::instr::opcodes::BinOp;
use crate::registers::RegFile;
use crate::trace::MemOp;
use crate::utils::{interpret_i32_as_unsigned, interpret_u32_as_signed};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("data access failed: {0}")]
    Mem(#[from] BusError),
}

/// Architectural outcome of one committed instruction
#[derive(Debug, Default)]
pub struct Effects {
    /// New PC, if the instruction was a taken jump
    pub jump: Option<u32>,
    /// True when a HALT committed
    pub halt: bool,
    /// Memory accesses performed, for tracing
    pub memops: Vec<MemOp>,
}

/// Apply one instruction's architectural effects. The predicate guard
/// has already been checked by the caller.
pub fn commit(d: &Decoded, regs: &mut RegFile, bus: &mut Bus) -> Result<Effects, ExecError> {
    let mut effects = Effects::default();
    match d.instr {
        Instr::RegReg { op, rd, rs1, rs2 } => {
            let a = regs.read(rs1);
            let b = regs.read(rs2);
            let value = match op {
                BinOp::Add => a.wrapping_add(b),
                BinOp::Sub => a.wrapping_sub(b),
                BinOp::And => a & b,
                BinOp::Or => a | b,
                BinOp::Xor => a ^ b,
                BinOp::Shl => a << (b & 0x1f),
                BinOp::Shr => a >> (b & 0x1f),
                BinOp::Mul => a.wrapping_mul(b),
                BinOp::Mac => regs.read(rd).wrapping_add(a.wrapping_mul(b)),
            };
            regs.write(rd, value);
        }
        Instr::Not { rd, rs1 } => {
            regs.write(rd, !regs.read(rs1));
        }
        Instr::AddImm { rd, rs1, imm } => {
            let value = regs.read(rs1).wrapping_add(interpret_i32_as_unsigned(imm));
            regs.write(rd, value);
        }
        Instr::Load { rd, base, offset } => {
            let addr = regs
                .read(base)
                .wrapping_add(interpret_i32_as_unsigned(offset));
            let value = bus.read32(addr)?;
            regs.write(rd, value);
            effects.memops.push(MemOp::load(addr, value));
        }
        Instr::Store { base, src } => {
            let addr = regs.read(base);
            let value = regs.read(src);
            bus.write32(addr, value)?;
            effects.memops.push(MemOp::store(addr, value));
        }
        Instr::Jump { offset } => {
            // The target is expressed in 4-byte units relative to the
            // next instruction's address
            let next = d.pc.wrapping_add(4);
            effects.jump = Some(next.wrapping_add(interpret_i32_as_unsigned(offset << 2)));
        }
        Instr::JumpReg { base } => {
            effects.jump = Some(regs.read(base));
        }
        Instr::CmpImm { op, pdst, src, imm } => {
            let lhs = interpret_u32_as_signed(regs.read(src));
            regs.write_pred(pdst, op.holds(lhs, imm));
        }
        Instr::Halt => {
            effects.halt = true;
        }
    }
    Ok(effects)
}
