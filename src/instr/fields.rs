//! Raw bit-field accessors for the 32-bit instruction word
//!
//! Field layout (big-end-first):
//!
//! ```text
//! 31..28  MAJ      major opcode
//! 27      P?       1 if the instruction is predicated
//! 26..25  Pidx     predicate index, valid only when P? is set
//! 24      EOP      end-of-packet marker
//! 23..19  rd       destination register (Pdst for CMPI)
//! 18..14  rs1      first source register
//! 13..9   rs2      second source register (3R forms)
//! 13..0   imm14    14-bit signed immediate (RI and I forms)
//! 8..5    cmpcode  compare relation (CMPI only)
//! ```
//!
//! For CMPI the 14-bit immediate slot would overlap `cmpcode`, so the
//! CMPI immediate is a narrowed 10-bit signed field split across bits
//! 13..9 (high part) and 4..0 (low part).

use crate::utils::{extract_field, interpret_u32_as_signed, sign_extend};

pub fn major(word: u32) -> u32 {
    extract_field(word, 31, 28)
}

pub fn predicated(word: u32) -> bool {
    extract_field(word, 27, 27) != 0
}

pub fn pred_index(word: u32) -> u8 {
    extract_field(word, 26, 25) as u8
}

pub fn end_of_packet(word: u32) -> bool {
    extract_field(word, 24, 24) != 0
}

pub fn rd(word: u32) -> u8 {
    extract_field(word, 23, 19) as u8
}

pub fn rs1(word: u32) -> u8 {
    extract_field(word, 18, 14) as u8
}

pub fn rs2(word: u32) -> u8 {
    extract_field(word, 13, 9) as u8
}

/// Sign-extended 14-bit immediate (RI and I forms)
pub fn imm14(word: u32) -> i32 {
    interpret_u32_as_signed(sign_extend(extract_field(word, 13, 0), 13))
}

pub fn cmp_code(word: u32) -> u32 {
    extract_field(word, 8, 5)
}

/// Sign-extended split 10-bit immediate (CMPI form): bits 13..9 hold
/// imm[9:5] and bits 4..0 hold imm[4:0].
pub fn cmp_imm10(word: u32) -> i32 {
    let high = extract_field(word, 13, 9);
    let low = extract_field(word, 4, 0);
    interpret_u32_as_signed(sign_extend(high << 5 | low, 9))
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn check_header_fields() {
        // MAJ=0xb, P?=1, Pidx=2, EOP=1, rd=6, rs1=5, imm14=4
        let word = 0xb << 28 | 1 << 27 | 2 << 25 | 1 << 24 | 6 << 19 | 5 << 14 | 4;
        assert_eq!(major(word), 0xb);
        assert!(predicated(word));
        assert_eq!(pred_index(word), 2);
        assert!(end_of_packet(word));
        assert_eq!(rd(word), 6);
        assert_eq!(rs1(word), 5);
        assert_eq!(imm14(word), 4);
    }

    #[test]
    fn check_imm14_sign_extension() {
        assert_eq!(imm14(0x3fff), -1);
        assert_eq!(imm14(0x2000), -8192);
        assert_eq!(imm14(0x1fff), 8191);
    }

    #[test]
    fn check_cmp_imm10_split_field() {
        // imm = -1 -> high 0b11111 in 13..9, low 0b11111 in 4..0
        let word = 0x1f << 9 | 0x1f;
        assert_eq!(cmp_imm10(word), -1);
        // imm = 33 = 0b00001_00001
        let word = 1 << 9 | 1;
        assert_eq!(cmp_imm10(word), 33);
    }

    #[test]
    fn check_cmp_code_does_not_leak_into_imm10() {
        // cmpcode occupies 8..5 and must not affect the split immediate
        let word = 0xf << 5;
        assert_eq!(cmp_imm10(word), 0);
        assert_eq!(cmp_code(word), 0xf);
    }
}
