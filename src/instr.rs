//! Instruction word format
//!
//! A program is a stream of 32-bit words. Each word carries a 4-bit
//! major opcode in its top nibble, an optional predicate guard, an
//! end-of-packet marker, and whatever operand fields its format
//! defines. The submodules split the concern three ways: `opcodes`
//! holds the fixed major-opcode map, `fields` pulls raw bit fields out
//! of a word, and `decode`/`encode` convert between words and the
//! [`Instr`](decode::Instr) sum type.

pub mod decode;
pub mod encode;
pub mod fields;
pub mod opcodes;
