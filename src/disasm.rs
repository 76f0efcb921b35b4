//! Disassembler
//!
//! Renders decoded words back into assembler syntax, one line per
//! word. Words that do not decode are kept as raw `.word` directives
//! so a listing never fails part-way through an image.

use std::fmt;

use crate::instr::decode::{decode_at, Decoded, Instr};

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.instr {
            Instr::RegReg { op, rd, rs1, rs2 } => {
                write!(f, "{} R{rd}, R{rs1}, R{rs2}", op.mnemonic())?
            }
            Instr::Not { rd, rs1 } => write!(f, "NOT R{rd}, R{rs1}")?,
            Instr::AddImm { rd, rs1, imm } => write!(f, "ADDI R{rd}, R{rs1}, #{imm}")?,
            Instr::Load { rd, base, offset } => {
                if offset == 0 {
                    write!(f, "LD R{rd}, [R{base}]")?
                } else if offset > 0 {
                    write!(f, "LD R{rd}, [R{base}+{offset}]")?
                } else {
                    write!(f, "LD R{rd}, [R{base}{offset}]")?
                }
            }
            Instr::Store { base, src } => write!(f, "ST [R{base}], R{src}")?,
            Instr::Jump { offset } => write!(f, "J #{offset}")?,
            Instr::JumpReg { base } => write!(f, "JR R{base}")?,
            Instr::CmpImm { op, pdst, src, imm } => {
                write!(f, "CMPI.{} P{pdst}, R{src}, #{imm}", op.mnemonic())?
            }
            Instr::Halt => write!(f, "HALT")?,
        }
        if let Some(k) = self.pred {
            write!(f, " @P{k}")?;
        }
        Ok(())
    }
}

/// Produce one listing line per word: address, raw word, assembly
pub fn disassemble(words: &[u32], base: u32) -> Vec<String> {
    words
        .iter()
        .enumerate()
        .map(|(i, &word)| {
            let addr = base + 4 * i as u32;
            match decode_at(word, addr) {
                Ok(d) => format!("{addr:0>8x}  {word:0>8x}  # {d}"),
                Err(_) => format!("{addr:0>8x}  {word:0>8x}  # .word 0x{word:08x}"),
            }
        })
        .collect()
}
