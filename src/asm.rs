//! Text assembler
//!
//! Line-oriented: `;` starts a comment, a line ending in `:` defines a
//! label, otherwise one instruction per line. Operands are registers
//! (`R0`..`R31`), immediates (`#imm`, bare integers, `0x` hex, or
//! labels) and memory operands (`[Rn]`, `[Rn+imm]`, `[Rn-imm]`). A
//! trailing `@Pk` predicates the instruction on `Pk`.
//!
//! Labels resolve to their byte offset from the start of the program.
//! A `J` to a label encodes the word distance from the following
//! instruction, so jumps stay correct wherever the image is loaded.
//! Assembly errors never reach the engines; they carry the offending
//! line number and token.

use std::collections::HashMap;

use thiserror::Error;

use crate::instr::encode::{enc_3r, enc_cmpi, enc_i, enc_jr, enc_ri, enc_st, EncodeError};
use crate::instr::opcodes::{BinOp, CmpOp, MAJ_ADDI, MAJ_HALT, MAJ_J, MAJ_LD, MAJ_NOT};

#[derive(Debug, Error)]
pub enum AsmError {
    #[error("line {line}: bad register token '{token}'")]
    BadRegister { line: usize, token: String },
    #[error("line {line}: register out of range '{token}'")]
    RegisterOutOfRange { line: usize, token: String },
    #[error("line {line}: bad immediate '{token}'")]
    BadImmediate { line: usize, token: String },
    #[error("line {line}: bad memory operand '{token}'")]
    BadMemOperand { line: usize, token: String },
    #[error("line {line}: bad predicate '{token}'")]
    BadPredicate { line: usize, token: String },
    #[error("line {line}: bad label name '{name}'")]
    BadLabel { line: usize, name: String },
    #[error("line {line}: label multiply defined '{name}'")]
    DuplicateLabel { line: usize, name: String },
    #[error("line {line}: unknown mnemonic '{mnemonic}'")]
    UnknownMnemonic { line: usize, mnemonic: String },
    #[error("line {line}: {mnemonic} needs {expected}")]
    WrongOperands {
        line: usize,
        mnemonic: String,
        expected: &'static str,
    },
    #[error("line {line}: store offset must be zero (fold it into the base with ADDI)")]
    StoreOffsetNotZero { line: usize },
    #[error("line {line}: {source}")]
    Encode { line: usize, source: EncodeError },
}

fn parse_reg(token: &str, line: usize) -> Result<u8, AsmError> {
    let t = token.trim();
    let bad = || AsmError::BadRegister {
        line,
        token: token.to_string(),
    };
    let digits = t
        .strip_prefix('R')
        .or_else(|| t.strip_prefix('r'))
        .ok_or_else(bad)?;
    let n: u32 = digits.parse().map_err(|_| bad())?;
    if n >= 32 {
        return Err(AsmError::RegisterOutOfRange {
            line,
            token: token.to_string(),
        });
    }
    Ok(n as u8)
}

fn parse_pred_reg(token: &str, line: usize) -> Result<u8, AsmError> {
    let t = token.trim();
    let bad = || AsmError::BadPredicate {
        line,
        token: token.to_string(),
    };
    let digits = t
        .strip_prefix('P')
        .or_else(|| t.strip_prefix('p'))
        .ok_or_else(bad)?;
    let k: u32 = digits.parse().map_err(|_| bad())?;
    if k > 3 {
        return Err(bad());
    }
    Ok(k as u8)
}

fn parse_imm(token: &str, labels: &HashMap<String, u32>, line: usize) -> Result<i32, AsmError> {
    let mut t = token.trim();
    t = t.strip_prefix('#').unwrap_or(t);
    if let Some(addr) = labels.get(t) {
        return Ok(*addr as i32);
    }
    let bad = || AsmError::BadImmediate {
        line,
        token: token.to_string(),
    };
    let (digits, sign) = match t.strip_prefix('-') {
        Some(rest) => (rest, -1i64),
        None => (t, 1i64),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).map_err(|_| bad())?
    } else {
        digits.parse::<i64>().map_err(|_| bad())?
    };
    i32::try_from(sign * value).map_err(|_| bad())
}

/// Parse `[Rn]`, `[Rn+imm]` or `[Rn-imm]` into (base, offset)
fn parse_mem(
    token: &str,
    labels: &HashMap<String, u32>,
    line: usize,
) -> Result<(u8, i32), AsmError> {
    let t = token.trim();
    let bad = || AsmError::BadMemOperand {
        line,
        token: token.to_string(),
    };
    let inner = t
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(bad)?
        .trim();
    if let Some((base, off)) = inner.split_once('+') {
        return Ok((parse_reg(base, line)?, parse_imm(off, labels, line)?));
    }
    if let Some((base, off)) = inner.split_once('-') {
        let off = parse_imm(off, labels, line)?;
        return Ok((parse_reg(base, line)?, -off));
    }
    Ok((parse_reg(inner, line)?, 0))
}

fn label_name_valid(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn strip_comment(line: &str) -> &str {
    line.split(';').next().unwrap_or("").trim()
}

/// Split a trailing `@Pk` predicate suffix off the instruction text
fn split_predicate(s: &str, line: usize) -> Result<(String, Option<u8>), AsmError> {
    let Some(at) = s.find('@') else {
        return Ok((s.to_string(), None));
    };
    let head = &s[..at];
    let tail = &s[at + 1..];
    let token: String = tail.chars().take_while(|c| !c.is_whitespace()).collect();
    let rest = &tail[token.len()..];
    let pred = parse_pred_reg(&token, line)?;
    Ok((format!("{head}{rest}"), Some(pred)))
}

/// First pass: collect label addresses (byte offsets from the start of
/// the program)
fn first_pass(lines: &[&str]) -> Result<HashMap<String, u32>, AsmError> {
    let mut labels = HashMap::new();
    let mut pc = 0;
    for (i, raw) in lines.iter().enumerate() {
        let line = i + 1;
        let s = strip_comment(raw);
        if s.is_empty() {
            continue;
        }
        if let Some(name) = s.strip_suffix(':') {
            let name = name.trim();
            if !label_name_valid(name) {
                return Err(AsmError::BadLabel {
                    line,
                    name: name.to_string(),
                });
            }
            if labels.contains_key(name) {
                return Err(AsmError::DuplicateLabel {
                    line,
                    name: name.to_string(),
                });
            }
            labels.insert(name.to_string(), pc);
        } else {
            pc += 4;
        }
    }
    Ok(labels)
}

fn binop_for(mnemonic: &str) -> Option<BinOp> {
    match mnemonic {
        "ADD" => Some(BinOp::Add),
        "SUB" => Some(BinOp::Sub),
        "AND" => Some(BinOp::And),
        "OR" => Some(BinOp::Or),
        "XOR" => Some(BinOp::Xor),
        "SHL" => Some(BinOp::Shl),
        "SHR" => Some(BinOp::Shr),
        "MUL" => Some(BinOp::Mul),
        "MAC" => Some(BinOp::Mac),
        _ => None,
    }
}

fn cmpop_for(spec: &str) -> Option<CmpOp> {
    match spec {
        "EQ" => Some(CmpOp::Eq),
        "NE" => Some(CmpOp::Ne),
        "LT" => Some(CmpOp::Lt),
        "GE" => Some(CmpOp::Ge),
        "LE" => Some(CmpOp::Le),
        "GT" => Some(CmpOp::Gt),
        _ => None,
    }
}

/// Assemble a program into 32-bit instruction words
pub fn assemble(source: &str) -> Result<Vec<u32>, AsmError> {
    let lines: Vec<&str> = source.lines().collect();
    let labels = first_pass(&lines)?;
    let mut words = Vec::new();
    let mut pc: u32 = 0;

    for (i, raw) in lines.iter().enumerate() {
        let line = i + 1;
        let s = strip_comment(raw);
        if s.is_empty() || s.ends_with(':') {
            continue;
        }
        let (text, pred) = split_predicate(s, line)?;
        let text = text.trim();
        let (op, args_text) = match text.split_once(char::is_whitespace) {
            Some((op, rest)) => (op, rest),
            None => (text, ""),
        };
        let op = op.to_uppercase();
        let args: Vec<&str> = args_text
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .collect();

        let wrong = |expected| AsmError::WrongOperands {
            line,
            mnemonic: op.clone(),
            expected,
        };
        let encode_err = |source| AsmError::Encode { line, source };

        let word = if let Some(binop) = binop_for(&op) {
            if args.len() != 3 {
                return Err(wrong("rd, rs1, rs2"));
            }
            let rd = parse_reg(args[0], line)?;
            let rs1 = parse_reg(args[1], line)?;
            let rs2 = parse_reg(args[2], line)?;
            enc_3r(binop.major(), rd, rs1, rs2, pred, true)
        } else if op == "NOT" {
            if args.len() != 2 {
                return Err(wrong("rd, rs1"));
            }
            let rd = parse_reg(args[0], line)?;
            let rs1 = parse_reg(args[1], line)?;
            enc_3r(MAJ_NOT, rd, rs1, 0, pred, true)
        } else if op == "ADDI" {
            if args.len() != 3 {
                return Err(wrong("rd, rs1, imm"));
            }
            let rd = parse_reg(args[0], line)?;
            let rs1 = parse_reg(args[1], line)?;
            let imm = parse_imm(args[2], &labels, line)?;
            enc_ri(MAJ_ADDI, rd, rs1, imm, pred, true).map_err(encode_err)?
        } else if op == "LD" {
            if args.len() != 2 {
                return Err(wrong("rd, [mem]"));
            }
            let rd = parse_reg(args[0], line)?;
            let (base, offset) = parse_mem(args[1], &labels, line)?;
            enc_ri(MAJ_LD, rd, base, offset, pred, true).map_err(encode_err)?
        } else if op == "ST" {
            if args.len() != 2 {
                return Err(wrong("[mem], rs"));
            }
            let (base, offset) = parse_mem(args[0], &labels, line)?;
            if offset != 0 {
                return Err(AsmError::StoreOffsetNotZero { line });
            }
            let src = parse_reg(args[1], line)?;
            enc_st(base, src, pred, true)
        } else if op == "J" {
            if args.len() != 1 {
                return Err(wrong("imm_or_label"));
            }
            let trimmed = args[0].trim();
            let target = trimmed.strip_prefix('#').unwrap_or(trimmed);
            let offset = if let Some(addr) = labels.get(target) {
                // Word distance from the next instruction
                ((*addr as i64 - (pc as i64 + 4)) >> 2) as i32
            } else {
                parse_imm(target, &labels, line)?
            };
            enc_i(MAJ_J, offset, pred, true).map_err(encode_err)?
        } else if op == "JR" {
            if args.len() != 1 {
                return Err(wrong("rs1"));
            }
            enc_jr(parse_reg(args[0], line)?, pred, true)
        } else if let Some(spec) = op.strip_prefix("CMPI.") {
            let cmp = cmpop_for(spec).ok_or_else(|| AsmError::UnknownMnemonic {
                line,
                mnemonic: op.clone(),
            })?;
            if args.len() != 3 {
                return Err(wrong("Pdst, rs1, imm"));
            }
            let pdst = parse_pred_reg(args[0], line)?;
            let rs1 = parse_reg(args[1], line)?;
            let imm = parse_imm(args[2], &labels, line)?;
            enc_cmpi(pdst, rs1, imm, cmp, pred, true).map_err(encode_err)?
        } else if op == "HALT" {
            if !args.is_empty() {
                return Err(wrong("no operands"));
            }
            enc_i(MAJ_HALT, 0, pred, true).map_err(encode_err)?
        } else {
            return Err(AsmError::UnknownMnemonic {
                line,
                mnemonic: op.clone(),
            });
        };

        words.push(word);
        pc += 4;
    }
    Ok(words)
}
