//! Major opcode map
//!
//! The 4-bit major opcode fully selects the instruction, except for
//! `MAJ_CMPI`/`MAJ_HALT` which share 0xF and are told apart by the
//! remaining fields (see [`crate::instr::decode`]).

pub const MAJ_ADD: u32 = 0x0;
pub const MAJ_ADDI: u32 = 0x1;
pub const MAJ_SUB: u32 = 0x2;
pub const MAJ_AND: u32 = 0x3;
pub const MAJ_OR: u32 = 0x4;
pub const MAJ_XOR: u32 = 0x5;
pub const MAJ_SHL: u32 = 0x6;
pub const MAJ_SHR: u32 = 0x7;
pub const MAJ_MUL: u32 = 0x8;
pub const MAJ_MAC: u32 = 0x9;
pub const MAJ_NOT: u32 = 0xa;
pub const MAJ_LD: u32 = 0xb;
pub const MAJ_ST: u32 = 0xc;
pub const MAJ_J: u32 = 0xd;
pub const MAJ_JR: u32 = 0xe;
pub const MAJ_CMPI: u32 = 0xf;
pub const MAJ_HALT: u32 = 0xf;

/// Three-register ALU operations (plus MAC, which also reads its
/// destination).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Mul,
    Mac,
}

impl BinOp {
    pub fn major(self) -> u32 {
        match self {
            Self::Add => MAJ_ADD,
            Self::Sub => MAJ_SUB,
            Self::And => MAJ_AND,
            Self::Or => MAJ_OR,
            Self::Xor => MAJ_XOR,
            Self::Shl => MAJ_SHL,
            Self::Shr => MAJ_SHR,
            Self::Mul => MAJ_MUL,
            Self::Mac => MAJ_MAC,
        }
    }

    pub fn from_major(maj: u32) -> Option<Self> {
        match maj {
            MAJ_ADD => Some(Self::Add),
            MAJ_SUB => Some(Self::Sub),
            MAJ_AND => Some(Self::And),
            MAJ_OR => Some(Self::Or),
            MAJ_XOR => Some(Self::Xor),
            MAJ_SHL => Some(Self::Shl),
            MAJ_SHR => Some(Self::Shr),
            MAJ_MUL => Some(Self::Mul),
            MAJ_MAC => Some(Self::Mac),
            _ => None,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Shl => "SHL",
            Self::Shr => "SHR",
            Self::Mul => "MUL",
            Self::Mac => "MAC",
        }
    }
}

/// Compare relation selected by the 4-bit `cmpcode` field of CMPI.
///
/// All relations compare `R[rs1]` as a signed 32-bit integer against
/// the sign-extended immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Le,
    Gt,
}

impl CmpOp {
    pub fn code(self) -> u32 {
        match self {
            Self::Eq => 0,
            Self::Ne => 1,
            Self::Lt => 2,
            Self::Ge => 3,
            Self::Le => 4,
            Self::Gt => 5,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Eq),
            1 => Some(Self::Ne),
            2 => Some(Self::Lt),
            3 => Some(Self::Ge),
            4 => Some(Self::Le),
            5 => Some(Self::Gt),
            _ => None,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Lt => "LT",
            Self::Ge => "GE",
            Self::Le => "LE",
            Self::Gt => "GT",
        }
    }

    /// Evaluate the relation over signed operands
    pub fn holds(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Ge => lhs >= rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
        }
    }
}
