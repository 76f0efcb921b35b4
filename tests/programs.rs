//! End-to-end programs assembled from text and run on both engines.
//!
//! Every program is executed on the functional engine and on the
//! cycle engine, and the final architectural state (registers,
//! predicates, and a data-memory window) must agree.

use dspsim::asm::assemble;
use dspsim::bus::{Bus, CharConsole};
use dspsim::cycle::CycleCore;
use dspsim::functional::{FunctionalCore, DEFAULT_ENTRY};
use dspsim::registers::RegFile;

/// Data window compared between the two engines
const DATA_BASE: u32 = 0x2000;
const DATA_LEN: u32 = 0x100;

fn run_both(source: &str, setup: impl Fn(&mut RegFile, &mut Bus)) -> (FunctionalCore, CycleCore) {
    let words = assemble(source).expect("program should assemble");

    let mut fast = FunctionalCore::new();
    setup(&mut fast.regs, &mut fast.bus);
    fast.load_words(DEFAULT_ENTRY, &words).unwrap();
    fast.run(None, Some(10_000)).expect("fast engine should halt");

    let mut cycle = CycleCore::new();
    setup(&mut cycle.regs, &mut cycle.bus);
    cycle.load_words(DEFAULT_ENTRY, &words).unwrap();
    cycle
        .run(None, Some(100_000))
        .expect("cycle engine should halt");

    assert_eq!(fast.regs, cycle.regs, "engines disagree on final state");
    for addr in (DATA_BASE..DATA_BASE + DATA_LEN).step_by(4) {
        assert_eq!(
            fast.bus.read32(addr).unwrap(),
            cycle.bus.read32(addr).unwrap(),
            "engines disagree on memory at 0x{addr:x}"
        );
    }
    (fast, cycle)
}

#[test]
fn addi_basic() {
    let (fast, _) = run_both("ADDI R1, R0, #123\nHALT\n", |_, _| ());
    assert_eq!(fast.regs.read(1), 123);
}

#[test]
fn add_three_reg() {
    let (fast, _) = run_both("ADD R2, R0, R1\nHALT\n", |regs, _| {
        regs.write(0, 2);
        regs.write(1, 3);
    });
    assert_eq!(fast.regs.read(2), 5);
}

#[test]
fn and_or_bitwise() {
    let (fast, _) = run_both("AND R2, R0, R1\nOR R3, R0, R1\nHALT\n", |regs, _| {
        regs.write(0, 0xf0f0_f0f0);
        regs.write(1, 0x00ff_ff00);
    });
    assert_eq!(fast.regs.read(2), 0x00f0_f000);
    assert_eq!(fast.regs.read(3), 0xf0ff_fff0);
}

#[test]
fn forward_jump_skips_code() {
    let source = "\
ADDI R1, R0, #100
J TARGET
ADDI R1, R0, #200
HALT
TARGET:
ADDI R2, R0, #50
HALT
";
    let (fast, _) = run_both(source, |_, _| ());
    assert_eq!(fast.regs.read(1), 100);
    assert_eq!(fast.regs.read(2), 50);
}

#[test]
fn ld_st_roundtrip() {
    let source = "\
LD R6, [R5]
ADDI R5, R5, #4
ST [R5], R6
HALT
";
    let (mut fast, _) = run_both(source, |regs, bus| {
        regs.write(5, 0x2000);
        bus.write32(0x2000, 0xdead_beef).unwrap();
    });
    assert_eq!(fast.regs.read(6), 0xdead_beef);
    assert_eq!(fast.bus.read32(0x2004).unwrap(), 0xdead_beef);
}

#[test]
fn predicate_gates_execution() {
    let source = "\
CMPI.LT P1, R0, #1
ADDI R2, R0, #7 @P1
CMPI.GT P1, R0, #0
ADDI R2, R0, #9 @P1
HALT
";
    let (fast, _) = run_both(source, |_, _| ());
    assert_eq!(fast.regs.read(2), 7);
}

#[test]
fn sum_of_squares_loop() {
    // Sums v[i]^2 with MAC over a 4-element vector at 0x2000
    let source = "\
; R5 = data pointer, R1 = loop count, R4 = accumulator
ADDI R5, R0, #0x1000
ADDI R6, R0, #1
SHL R5, R5, R6      ; 0x2000
ADDI R1, R0, #4
ADDI R4, R0, #0
LOOP:
LD R2, [R5]
MAC R4, R2, R2
ADDI R5, R5, #4
ADDI R1, R1, #-1
CMPI.GT P1, R1, #0
J LOOP @P1
HALT
";
    let (fast, _) = run_both(source, |_, bus| {
        bus.load_words(0x2000, &[1, 2, 3, 4]).unwrap();
    });
    assert_eq!(fast.regs.read(4), 1 + 4 + 9 + 16);
    assert_eq!(fast.regs.read(1), 0);
}

#[test]
fn jr_returns_through_register() {
    // Build 0x1014 (the HALT) in R7, then jump to it through JR
    let source = "\
ADDI R7, R0, #0x1014
JR R7
ADDI R1, R0, #200
HALT
ADDI R1, R0, #100
HALT
";
    // 0x1000 ADDI, 0x1004 JR, 0x1008 ADDI(200), 0x100c HALT,
    // 0x1010 ADDI(100), 0x1014 HALT -- jump over everything
    let (fast, _) = run_both(source, |_, _| ());
    assert_eq!(fast.regs.read(1), 0);
}

#[test]
fn console_device_observed_by_both_engines() {
    // 0xffff0000 = ~0xffff; the store's low byte reaches the console
    let source = "\
ADDI R6, R0, #1
ADDI R7, R0, #16
SHL R6, R6, R7
ADDI R6, R6, #-1    ; 0xffff
NOT R7, R6          ; 0xffff0000
ADDI R8, R0, #72    ; 'H'
ST [R7], R8
ADDI R8, R0, #105   ; 'i'
ST [R7], R8
HALT
";
    let words = assemble(source).unwrap();

    let fast_console = CharConsole::new();
    let mut fast = FunctionalCore::new();
    fast.bus
        .map_device(0xffff_0000, 4, Box::new(fast_console.clone()))
        .unwrap();
    fast.load_words(DEFAULT_ENTRY, &words).unwrap();
    fast.run(None, Some(100)).unwrap();
    assert_eq!(fast_console.flush(), "Hi");

    let cycle_console = CharConsole::new();
    let mut cycle = CycleCore::new();
    cycle
        .bus
        .map_device(0xffff_0000, 4, Box::new(cycle_console.clone()))
        .unwrap();
    cycle.load_words(DEFAULT_ENTRY, &words).unwrap();
    cycle.run(None, Some(1000)).unwrap();
    assert_eq!(cycle_console.flush(), "Hi");
}
