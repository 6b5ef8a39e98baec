//! Whole-program execution tests for the PPU
//!
//! Small hand-assembled big-endian programs are written into guest memory
//! and run to completion; final register state is checked against
//! expectations.

use std::sync::Arc;

use ic_lv2::SyscallDispatcher;
use ic_memory::constants::MAIN_MEM_BASE;
use ic_memory::MemoryManager;
use ic_ppu::{PpuInterpreter, PpuThread};

struct TestProgram {
    entry: u64,
    code: Vec<u32>,
    initial_regs: Vec<(usize, u64)>,
    expected_regs: Vec<(usize, u64)>,
}

impl TestProgram {
    fn run(&self) {
        let memory = MemoryManager::new().unwrap();
        let syscalls = Arc::new(SyscallDispatcher::new(memory.clone()));
        let interpreter = PpuInterpreter::new(memory.clone(), syscalls);
        let mut thread = PpuThread::new(0);

        for (i, word) in self.code.iter().enumerate() {
            memory.write_u32(self.entry + i as u64 * 4, *word).unwrap();
        }
        for &(reg, value) in &self.initial_regs {
            thread.set_gpr(reg, value);
        }
        thread.set_pc(self.entry);

        let code_end = self.entry + self.code.len() as u64 * 4;
        for _ in 0..10_000 {
            if thread.pc() >= code_end || thread.is_halted() {
                break;
            }
            if interpreter.step(&mut thread).is_err() {
                break;
            }
        }

        for &(reg, expected) in &self.expected_regs {
            assert_eq!(
                thread.gpr(reg),
                expected,
                "r{} mismatch: expected 0x{:016x}, got 0x{:016x}",
                reg,
                expected,
                thread.gpr(reg)
            );
        }
    }
}

#[test]
fn test_simple_add() {
    TestProgram {
        entry: MAIN_MEM_BASE,
        code: vec![
            0x3880_000A, // addi r4, r0, 10
            0x38A0_0014, // addi r5, r0, 20
            0x7C64_2A14, // add r3, r4, r5
        ],
        initial_regs: vec![],
        expected_regs: vec![(3, 30), (4, 10), (5, 20)],
    }
    .run();
}

#[test]
fn test_branch_skips_instruction() {
    TestProgram {
        entry: MAIN_MEM_BASE,
        code: vec![
            0x4800_0008, // b +8
            0x3860_0063, // addi r3, r0, 99 (skipped)
            0x3860_002A, // addi r3, r0, 42
        ],
        initial_regs: vec![],
        expected_regs: vec![(3, 42)],
    }
    .run();
}

#[test]
fn test_store_then_load() {
    TestProgram {
        entry: MAIN_MEM_BASE,
        code: vec![
            0x3CA0_2000, // addis r5, r0, 0x2000
            0x60A5_1000, // ori r5, r5, 0x1000
            0x3880_1234, // addi r4, r0, 0x1234
            0x9085_0000, // stw r4, 0(r5)
            0x8065_0000, // lwz r3, 0(r5)
        ],
        initial_regs: vec![],
        expected_regs: vec![(3, 0x1234), (4, 0x1234)],
    }
    .run();
}

#[test]
fn test_logical_chain() {
    TestProgram {
        entry: MAIN_MEM_BASE,
        code: vec![
            0x7C84_2B78, // or r4, r4, r5
            0x7C84_3039, // and. r4, r4, r6
            0x7C63_3A78, // xor r3, r3, r7
        ],
        initial_regs: vec![
            (4, 0xF0F0),
            (5, 0x0F0F),
            (6, 0x00FF),
            (3, 0xAAAA),
            (7, 0xFFFF),
        ],
        expected_regs: vec![(4, 0x00FF), (3, 0x5555)],
    }
    .run();
}

#[test]
fn test_countdown_loop() {
    // r3 accumulates r4 in a CTR-driven loop.
    TestProgram {
        entry: MAIN_MEM_BASE,
        code: vec![
            0x3880_0003, // addi r4, r0, 3
            0x38A0_000A, // addi r5, r0, 10
            0x7CA9_03A6, // mtctr r5
            0x7C63_2214, // add r3, r3, r4
            0x4200_FFFC, // bdnz -4
        ],
        initial_regs: vec![],
        expected_regs: vec![(3, 30)],
    }
    .run();
}

#[test]
fn test_function_call_and_return() {
    // bl to a leaf that doubles r3, then blr back.
    TestProgram {
        entry: MAIN_MEM_BASE,
        code: vec![
            0x3860_0015, // addi r3, r0, 21
            0x4800_000D, // bl +12
            0x3863_0001, // addi r3, r3, 1  (after return)
            0x4800_000C, // b +12 (to end)
            0x7C63_1A14, // add r3, r3, r3  (leaf body)
            0x4E80_0020, // blr
        ],
        initial_regs: vec![],
        expected_regs: vec![(3, 43)],
    }
    .run();
}

#[test]
fn test_memory_size_syscall_program() {
    TestProgram {
        entry: MAIN_MEM_BASE,
        code: vec![
            0x3800_00CD, // addi r0, r0, 205
            0x4400_0002, // sc
        ],
        initial_regs: vec![],
        expected_regs: vec![(3, 0x1000_0000)],
    }
    .run();
}
