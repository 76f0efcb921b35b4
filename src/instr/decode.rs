//! Instruction decoding
//!
//! This is where a u32 instruction word is converted into the [`Instr`]
//! sum type, which holds the operand fields in a more easily
//! accessible format ready for execution. Every variant carries only
//! the fields its format defines; the execution engines match
//! exhaustively over the sum.
//!
//! `MAJ=0xF` is shared between CMPI and HALT. The rule adopted here:
//! the word decodes as HALT iff `rd`, `rs1`, `cmpcode` and the split
//! immediate are all zero; any other bit pattern is CMPI. One
//! consequence is that `CMPI.EQ P0, R0, #0` cannot be encoded (the
//! assembler rejects it).

use thiserror::Error;

use super::fields;
use super::opcodes::{BinOp, CmpOp, MAJ_ADDI, MAJ_CMPI, MAJ_J, MAJ_JR, MAJ_LD, MAJ_NOT, MAJ_ST};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("got invalid or unimplemented major opcode 0x{major:x} in word 0x{word:08x}")]
    UnknownMajor { major: u32, word: u32 },
    #[error("got invalid compare relation code 0x{code:x} in word 0x{word:08x}")]
    BadCmpCode { code: u32, word: u32 },
    #[error("compare targets predicate {index}, but only P0..P3 exist (word 0x{word:08x})")]
    BadPredicateTarget { index: u8, word: u32 },
}

/// A decoded instruction, tagged by opcode kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    /// Three-register ALU operation (`op rd, rs1, rs2`)
    RegReg { op: BinOp, rd: u8, rs1: u8, rs2: u8 },
    /// Bitwise complement (`NOT rd, rs1`)
    Not { rd: u8, rs1: u8 },
    /// Add immediate (`ADDI rd, rs1, #imm`)
    AddImm { rd: u8, rs1: u8, imm: i32 },
    /// Word load (`LD rd, [base+offset]`)
    Load { rd: u8, base: u8, offset: i32 },
    /// Word store (`ST [base], src`); the offset is always zero
    Store { base: u8, src: u8 },
    /// PC-relative jump; `offset` is in 4-byte units relative to the
    /// address of the next instruction
    Jump { offset: i32 },
    /// Indirect jump (`JR base`)
    JumpReg { base: u8 },
    /// Compare-immediate (`CMPI.op Pdst, src, #imm`)
    CmpImm { op: CmpOp, pdst: u8, src: u8, imm: i32 },
    /// Stop the engine
    Halt,
}

/// An instruction as fetched: the decoded kind plus the predicate
/// guard, end-of-packet marker, raw word and fetch PC (for tracing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub instr: Instr,
    pub pred: Option<u8>,
    pub end_of_packet: bool,
    pub raw: u32,
    pub pc: u32,
}

/// Decode a 32-bit word into an instruction kind
pub fn decode(word: u32) -> Result<Instr, DecodeError> {
    let maj = fields::major(word);
    if let Some(op) = BinOp::from_major(maj) {
        return Ok(Instr::RegReg {
            op,
            rd: fields::rd(word),
            rs1: fields::rs1(word),
            rs2: fields::rs2(word),
        });
    }
    match maj {
        MAJ_NOT => Ok(Instr::Not {
            rd: fields::rd(word),
            rs1: fields::rs1(word),
        }),
        MAJ_ADDI => Ok(Instr::AddImm {
            rd: fields::rd(word),
            rs1: fields::rs1(word),
            imm: fields::imm14(word),
        }),
        MAJ_LD => Ok(Instr::Load {
            rd: fields::rd(word),
            base: fields::rs1(word),
            offset: fields::imm14(word),
        }),
        MAJ_ST => Ok(Instr::Store {
            base: fields::rs1(word),
            src: fields::rs2(word),
        }),
        MAJ_J => Ok(Instr::Jump {
            offset: fields::imm14(word),
        }),
        MAJ_JR => Ok(Instr::JumpReg {
            base: fields::rs1(word),
        }),
        MAJ_CMPI => decode_cmpi_or_halt(word),
        _ => Err(DecodeError::UnknownMajor { major: maj, word }),
    }
}

fn decode_cmpi_or_halt(word: u32) -> Result<Instr, DecodeError> {
    let pdst = fields::rd(word);
    let src = fields::rs1(word);
    let code = fields::cmp_code(word);
    let imm = fields::cmp_imm10(word);
    if pdst == 0 && src == 0 && code == 0 && imm == 0 {
        return Ok(Instr::Halt);
    }
    let op = CmpOp::from_code(code).ok_or(DecodeError::BadCmpCode { code, word })?;
    if pdst > 3 {
        return Err(DecodeError::BadPredicateTarget { index: pdst, word });
    }
    Ok(Instr::CmpImm { op, pdst, src, imm })
}

/// Decode a fetched word, attaching the predicate guard, end-of-packet
/// marker and the PC the word was fetched from.
pub fn decode_at(word: u32, pc: u32) -> Result<Decoded, DecodeError> {
    let instr = decode(word)?;
    let pred = fields::predicated(word).then(|| fields::pred_index(word));
    Ok(Decoded {
        instr,
        pred,
        end_of_packet: fields::end_of_packet(word),
        raw: word,
        pc,
    })
}

impl Instr {
    /// Printable mnemonic, including the compare relation suffix
    pub fn mnemonic(&self) -> String {
        match self {
            Self::RegReg { op, .. } => op.mnemonic().to_string(),
            Self::Not { .. } => "NOT".to_string(),
            Self::AddImm { .. } => "ADDI".to_string(),
            Self::Load { .. } => "LD".to_string(),
            Self::Store { .. } => "ST".to_string(),
            Self::Jump { .. } => "J".to_string(),
            Self::JumpReg { .. } => "JR".to_string(),
            Self::CmpImm { op, .. } => format!("CMPI.{}", op.mnemonic()),
            Self::Halt => "HALT".to_string(),
        }
    }

    /// Destination register field, where the format has one (the CMPI
    /// destination is a predicate, reported by [`Instr::pdst`])
    pub fn rd(&self) -> Option<u8> {
        match self {
            Self::RegReg { rd, .. } | Self::Not { rd, .. } | Self::AddImm { rd, .. } => Some(*rd),
            Self::Load { rd, .. } => Some(*rd),
            _ => None,
        }
    }

    pub fn rs1(&self) -> Option<u8> {
        match self {
            Self::RegReg { rs1, .. } | Self::Not { rs1, .. } | Self::AddImm { rs1, .. } => {
                Some(*rs1)
            }
            Self::Load { base, .. } | Self::Store { base, .. } | Self::JumpReg { base } => {
                Some(*base)
            }
            Self::CmpImm { src, .. } => Some(*src),
            _ => None,
        }
    }

    pub fn rs2(&self) -> Option<u8> {
        match self {
            Self::RegReg { rs2, .. } => Some(*rs2),
            Self::Store { src, .. } => Some(*src),
            _ => None,
        }
    }

    pub fn imm(&self) -> Option<i32> {
        match self {
            Self::AddImm { imm, .. } | Self::CmpImm { imm, .. } => Some(*imm),
            Self::Load { offset, .. } | Self::Jump { offset } => Some(*offset),
            _ => None,
        }
    }

    pub fn pdst(&self) -> Option<u8> {
        match self {
            Self::CmpImm { pdst, .. } => Some(*pdst),
            _ => None,
        }
    }
}
