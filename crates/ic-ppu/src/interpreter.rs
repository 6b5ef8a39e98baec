//! PPU interpreter implementation
//!
//! The fetch/decode/execute cycle follows the architecture: fetch the
//! big-endian word at PC, advance PC, decode by primary opcode, execute.
//! Data-access faults read zero or drop the write and keep going; the
//! interpreter halts only on fetch failure or an unknown opcode.

use std::sync::Arc;

use ic_core::error::PpuError;
use ic_lv2::{SyscallContext, SyscallDispatcher};
use ic_memory::MemoryManager;
use tracing::{debug, error, trace, warn};

use crate::decoder::{bits, InstructionForm, PpuDecoder};
use crate::thread::PpuThread;
use crate::vmx;

/// PPU interpreter. Holds non-owning handles to memory and the syscall
/// dispatcher; the register context lives in [`PpuThread`].
pub struct PpuInterpreter {
    memory: Arc<MemoryManager>,
    syscalls: Arc<SyscallDispatcher>,
}

impl PpuInterpreter {
    pub fn new(memory: Arc<MemoryManager>, syscalls: Arc<SyscallDispatcher>) -> Self {
        Self { memory, syscalls }
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Execute a single instruction
    pub fn step(&self, thread: &mut PpuThread) -> Result<(), PpuError> {
        if thread.is_halted() {
            return Ok(());
        }

        let pc = thread.pc();
        let instr = match self.memory.read_u32(pc) {
            Ok(word) => word,
            Err(e) => {
                error!(target: "ppu", "fetch failed at 0x{:08x}: {}", pc, e);
                thread.halt();
                return Err(PpuError::FetchFailed { addr: pc });
            }
        };

        thread.advance_pc();
        thread.instructions_retired += 1;

        let decoded = PpuDecoder::decode(instr);
        match decoded.form {
            InstructionForm::D => self.execute_d_form(thread, instr, decoded.op),
            InstructionForm::DS => self.execute_ds_form(thread, instr, decoded.op),
            InstructionForm::I => self.execute_i_form(thread, instr),
            InstructionForm::B => self.execute_b_form(thread, instr),
            InstructionForm::X => self.execute_ext31(thread, instr),
            InstructionForm::XL => self.execute_xl_form(thread, instr, decoded.xo),
            InstructionForm::M => self.execute_m_form(thread, instr, decoded.op),
            InstructionForm::SC => self.execute_sc(thread),
            InstructionForm::Fp => self.execute_fp(thread, instr),
            InstructionForm::VX => self.execute_vector(thread, instr),
            InstructionForm::Unknown => {
                error!(
                    target: "ppu",
                    "unknown instruction 0x{:08x} at 0x{:08x}, halting",
                    instr, pc
                );
                thread.halt();
                return Err(PpuError::IllegalInstruction {
                    addr: pc,
                    opcode: instr,
                });
            }
        }

        Ok(())
    }

    /// Execute up to `max` instructions or until halted. Returns the number
    /// actually executed.
    pub fn execute_block(&self, thread: &mut PpuThread, max: u32) -> u32 {
        let mut executed = 0;
        while executed < max && !thread.is_halted() {
            if self.step(thread).is_err() {
                break;
            }
            executed += 1;
        }
        executed
    }

    fn effective_address(thread: &PpuThread, ra: u8, d: i64) -> u64 {
        if ra == 0 {
            d as u64
        } else {
            thread.gpr(ra as usize).wrapping_add(d as u64)
        }
    }

    /// Faulting loads read zero; the manager already materializes reads to
    /// undeclared space on demand.
    fn load_or_zero<T: Into<u64>>(
        &self,
        ea: u64,
        read: impl Fn(&MemoryManager, u64) -> Result<T, ic_core::error::MemoryError>,
    ) -> u64 {
        match read(&self.memory, ea) {
            Ok(v) => v.into(),
            Err(e) => {
                warn!(target: "ppu", "load fault at 0x{:08x}: {}", ea, e);
                0
            }
        }
    }

    /// Faulting stores are dropped.
    fn store_or_drop(&self, ea: u64, result: Result<(), ic_core::error::MemoryError>) {
        if let Err(e) = result {
            warn!(target: "ppu", "store fault at 0x{:08x}: {}", ea, e);
        }
    }

    fn execute_d_form(&self, thread: &mut PpuThread, instr: u32, op: u8) {
        let (rt, ra, d) = PpuDecoder::d_form(instr);
        let rt = rt as usize;
        let ra_idx = ra as usize;
        let simm = d as i64;
        let uimm = (instr & 0xFFFF) as u64;

        match op {
            // mulli
            7 => {
                let value = (thread.gpr(ra_idx) as i64).wrapping_mul(simm) as u64;
                thread.set_gpr(rt, value);
            }
            // subfic
            8 => {
                let a = thread.gpr(ra_idx);
                let imm = simm as u64;
                thread.set_gpr(rt, imm.wrapping_sub(a));
                thread.set_xer_ca(imm >= a);
            }
            // cmpli
            10 => {
                let (bf, wide) = Self::cmp_operands(rt as u8);
                let a = if wide {
                    thread.gpr(ra_idx)
                } else {
                    thread.gpr(ra_idx) as u32 as u64
                };
                self.set_compare_field(thread, bf, unsigned_compare(a, uimm));
            }
            // cmpi
            11 => {
                let (bf, wide) = Self::cmp_operands(rt as u8);
                let a = if wide {
                    thread.gpr(ra_idx) as i64
                } else {
                    thread.gpr(ra_idx) as i32 as i64
                };
                self.set_compare_field(thread, bf, signed_compare(a, simm));
            }
            // addic
            12 => {
                let (value, carry) = thread.gpr(ra_idx).overflowing_add(simm as u64);
                thread.set_gpr(rt, value);
                thread.set_xer_ca(carry);
            }
            // addic.
            13 => {
                let (value, carry) = thread.gpr(ra_idx).overflowing_add(simm as u64);
                thread.set_gpr(rt, value);
                thread.set_xer_ca(carry);
                self.update_cr0(thread, value);
            }
            // addi
            14 => {
                let value = if ra == 0 {
                    simm as u64
                } else {
                    thread.gpr(ra_idx).wrapping_add(simm as u64)
                };
                thread.set_gpr(rt, value);
            }
            // addis
            15 => {
                let value = if ra == 0 {
                    (simm << 16) as u64
                } else {
                    thread.gpr(ra_idx).wrapping_add((simm << 16) as u64)
                };
                thread.set_gpr(rt, value);
            }
            // ori
            24 => thread.set_gpr(ra_idx, thread.gpr(rt) | uimm),
            // oris
            25 => thread.set_gpr(ra_idx, thread.gpr(rt) | (uimm << 16)),
            // xori
            26 => thread.set_gpr(ra_idx, thread.gpr(rt) ^ uimm),
            // xoris
            27 => thread.set_gpr(ra_idx, thread.gpr(rt) ^ (uimm << 16)),
            // andi.
            28 => {
                let value = thread.gpr(rt) & uimm;
                thread.set_gpr(ra_idx, value);
                self.update_cr0(thread, value);
            }
            // andis.
            29 => {
                let value = thread.gpr(rt) & (uimm << 16);
                thread.set_gpr(ra_idx, value);
                self.update_cr0(thread, value);
            }
            32..=45 => self.execute_load_store(thread, op, rt, ra, simm),
            _ => {
                warn!(target: "ppu", "unimplemented D-form op {}", op);
            }
        }
    }

    fn execute_load_store(&self, thread: &mut PpuThread, op: u8, rt: usize, ra: u8, d: i64) {
        let ea = Self::effective_address(thread, ra, d);
        let update = matches!(op, 33 | 35 | 37 | 39 | 41 | 43 | 45);

        match op {
            // lwz, lwzu
            32 | 33 => {
                let value = self.load_or_zero(ea, |m, a| m.read_u32(a));
                thread.set_gpr(rt, value);
            }
            // lbz, lbzu
            34 | 35 => {
                let value = self.load_or_zero(ea, |m, a| m.read_u8(a));
                thread.set_gpr(rt, value);
            }
            // stw, stwu
            36 | 37 => {
                self.store_or_drop(ea, self.memory.write_u32(ea, thread.gpr(rt) as u32));
            }
            // stb, stbu
            38 | 39 => {
                self.store_or_drop(ea, self.memory.write_u8(ea, thread.gpr(rt) as u8));
            }
            // lhz, lhzu
            40 | 41 => {
                let value = self.load_or_zero(ea, |m, a| m.read_u16(a));
                thread.set_gpr(rt, value);
            }
            // lha, lhau: sign-extend the halfword
            42 | 43 => {
                let value = self.load_or_zero(ea, |m, a| m.read_u16(a));
                thread.set_gpr(rt, value as u16 as i16 as i64 as u64);
            }
            // sth, sthu
            44 | 45 => {
                self.store_or_drop(ea, self.memory.write_u16(ea, thread.gpr(rt) as u16));
            }
            _ => unreachable!(),
        }

        if update {
            thread.set_gpr(ra as usize, ea);
        }
    }

    fn execute_ds_form(&self, thread: &mut PpuThread, instr: u32, op: u8) {
        let (rt, ra, d) = PpuDecoder::ds_form(instr);
        let rt = rt as usize;
        let xop = instr & 0x3;
        let ea = Self::effective_address(thread, ra, d);

        match (op, xop) {
            // ld
            (58, 0) => {
                let value = self.load_or_zero(ea, |m, a| m.read_u64(a));
                thread.set_gpr(rt, value);
            }
            // ldu
            (58, 1) => {
                let value = self.load_or_zero(ea, |m, a| m.read_u64(a));
                thread.set_gpr(rt, value);
                thread.set_gpr(ra as usize, ea);
            }
            // std
            (62, 0) => {
                self.store_or_drop(ea, self.memory.write_u64(ea, thread.gpr(rt)));
            }
            // stdu
            (62, 1) => {
                self.store_or_drop(ea, self.memory.write_u64(ea, thread.gpr(rt)));
                thread.set_gpr(ra as usize, ea);
            }
            _ => {
                warn!(target: "ppu", "unimplemented DS-form op {} xop {}", op, xop);
            }
        }
    }

    fn execute_i_form(&self, thread: &mut PpuThread, instr: u32) {
        let (li, aa, lk) = PpuDecoder::i_form(instr);
        let cia = thread.pc() - 4;

        if lk {
            thread.regs.lr = thread.pc();
        }

        let target = if aa {
            li as i64 as u64
        } else {
            cia.wrapping_add(li as i64 as u64)
        };
        thread.set_pc(target);
    }

    fn execute_b_form(&self, thread: &mut PpuThread, instr: u32) {
        let (bo, bi, bd, aa, lk) = PpuDecoder::b_form(instr);
        let cia = thread.pc() - 4;

        if self.check_condition(thread, bo, bi) {
            if lk {
                thread.regs.lr = thread.pc();
            }
            let target = if aa {
                bd as i64 as u64
            } else {
                cia.wrapping_add(bd as i64 as u64)
            };
            thread.set_pc(target);
        }
    }

    fn execute_xl_form(&self, thread: &mut PpuThread, instr: u32, xo: u16) {
        let bo = bits(instr, 6, 10) as u8;
        let bi = bits(instr, 11, 15) as u8;
        let lk = instr & 1 != 0;

        match xo {
            // bclr
            16 => {
                if self.check_condition(thread, bo, bi) {
                    let target = thread.regs.lr & !3;
                    if lk {
                        thread.regs.lr = thread.pc();
                    }
                    thread.set_pc(target);
                }
            }
            // bcctr; the CTR-decrement BO forms are invalid here
            528 => {
                let cond_ok = (bo & 0x10) != 0
                    || Self::cr_bit(thread, bi) == ((bo >> 3) & 1) as u32;
                if cond_ok {
                    let target = thread.regs.ctr & !3;
                    if lk {
                        thread.regs.lr = thread.pc();
                    }
                    thread.set_pc(target);
                }
            }
            _ => {
                warn!(target: "ppu", "unimplemented XL-form xo {}", xo);
            }
        }
    }

    /// `checkCondition(BO, BI)`: decrement CTR unless BO_2, test the CTR
    /// against BO_3, test CR bit BI against BO_1 unless BO_0, AND the two.
    fn check_condition(&self, thread: &mut PpuThread, bo: u8, bi: u8) -> bool {
        let ctr_ok = if bo & 0x04 != 0 {
            true
        } else {
            thread.regs.ctr = thread.regs.ctr.wrapping_sub(1);
            (thread.regs.ctr != 0) ^ ((bo & 0x02) != 0)
        };

        let cond_ok = bo & 0x10 != 0 || Self::cr_bit(thread, bi) == ((bo >> 3) & 1) as u32;

        ctr_ok && cond_ok
    }

    #[inline]
    fn cr_bit(thread: &PpuThread, bi: u8) -> u32 {
        (thread.regs.cr >> (31 - bi)) & 1
    }

    fn execute_ext31(&self, thread: &mut PpuThread, instr: u32) {
        let (rt, ra, rb, rc) = PpuDecoder::x_form(instr);
        let rt_idx = rt as usize;
        let ra_idx = ra as usize;
        let rb_idx = rb as usize;
        let xo10 = ((instr >> 1) & 0x3FF) as u16;

        match xo10 {
            // cmp
            0 => {
                let (bf, wide) = Self::cmp_operands(rt);
                let (a, b) = if wide {
                    (thread.gpr(ra_idx) as i64, thread.gpr(rb_idx) as i64)
                } else {
                    (
                        thread.gpr(ra_idx) as i32 as i64,
                        thread.gpr(rb_idx) as i32 as i64,
                    )
                };
                self.set_compare_field(thread, bf, signed_compare(a, b));
                return;
            }
            // cmpl
            32 => {
                let (bf, wide) = Self::cmp_operands(rt);
                let (a, b) = if wide {
                    (thread.gpr(ra_idx), thread.gpr(rb_idx))
                } else {
                    (
                        thread.gpr(ra_idx) as u32 as u64,
                        thread.gpr(rb_idx) as u32 as u64,
                    )
                };
                self.set_compare_field(thread, bf, unsigned_compare(a, b));
                return;
            }
            // lwzx
            23 => {
                let ea = Self::indexed_address(thread, ra, rb);
                let value = self.load_or_zero(ea, |m, a| m.read_u32(a));
                thread.set_gpr(rt_idx, value);
                return;
            }
            // stwx
            151 => {
                let ea = Self::indexed_address(thread, ra, rb);
                self.store_or_drop(ea, self.memory.write_u32(ea, thread.gpr(rt_idx) as u32));
                return;
            }
            // slw
            24 => {
                let sh = (thread.gpr(rb_idx) & 0x3F) as u32;
                let value = if sh < 32 {
                    ((thread.gpr(rt_idx) as u32) << sh) as u64
                } else {
                    0
                };
                thread.set_gpr(ra_idx, value);
                if rc {
                    self.update_cr0(thread, value);
                }
                return;
            }
            // srw
            536 => {
                let sh = (thread.gpr(rb_idx) & 0x3F) as u32;
                let value = if sh < 32 {
                    ((thread.gpr(rt_idx) as u32) >> sh) as u64
                } else {
                    0
                };
                thread.set_gpr(ra_idx, value);
                if rc {
                    self.update_cr0(thread, value);
                }
                return;
            }
            // sraw
            792 => {
                let sh = (thread.gpr(rb_idx) & 0x3F) as u32;
                self.shift_right_algebraic(thread, rt_idx, ra_idx, sh, rc);
                return;
            }
            // srawi
            824 => {
                self.shift_right_algebraic(thread, rt_idx, ra_idx, rb as u32, rc);
                return;
            }
            // and
            28 => {
                let value = thread.gpr(rt_idx) & thread.gpr(rb_idx);
                thread.set_gpr(ra_idx, value);
                if rc {
                    self.update_cr0(thread, value);
                }
                return;
            }
            // andc
            60 => {
                let value = thread.gpr(rt_idx) & !thread.gpr(rb_idx);
                thread.set_gpr(ra_idx, value);
                if rc {
                    self.update_cr0(thread, value);
                }
                return;
            }
            // nor
            124 => {
                let value = !(thread.gpr(rt_idx) | thread.gpr(rb_idx));
                thread.set_gpr(ra_idx, value);
                if rc {
                    self.update_cr0(thread, value);
                }
                return;
            }
            // eqv
            284 => {
                let value = !(thread.gpr(rt_idx) ^ thread.gpr(rb_idx));
                thread.set_gpr(ra_idx, value);
                if rc {
                    self.update_cr0(thread, value);
                }
                return;
            }
            // xor
            316 => {
                let value = thread.gpr(rt_idx) ^ thread.gpr(rb_idx);
                thread.set_gpr(ra_idx, value);
                if rc {
                    self.update_cr0(thread, value);
                }
                return;
            }
            // or
            444 => {
                let value = thread.gpr(rt_idx) | thread.gpr(rb_idx);
                thread.set_gpr(ra_idx, value);
                if rc {
                    self.update_cr0(thread, value);
                }
                return;
            }
            // nand
            476 => {
                let value = !(thread.gpr(rt_idx) & thread.gpr(rb_idx));
                thread.set_gpr(ra_idx, value);
                if rc {
                    self.update_cr0(thread, value);
                }
                return;
            }
            // mfspr
            339 => {
                let spr = ((rb as u16) << 5) | (ra as u16);
                let value = match spr {
                    1 => thread.regs.xer as u64,
                    8 => thread.regs.lr,
                    9 => thread.regs.ctr,
                    _ => {
                        warn!(target: "ppu", "mfspr from unimplemented SPR {}", spr);
                        0
                    }
                };
                thread.set_gpr(rt_idx, value);
                return;
            }
            // mtspr
            467 => {
                let spr = ((rb as u16) << 5) | (ra as u16);
                let value = thread.gpr(rt_idx);
                match spr {
                    1 => thread.regs.xer = value as u32,
                    8 => thread.regs.lr = value,
                    9 => thread.regs.ctr = value,
                    _ => warn!(target: "ppu", "mtspr to unimplemented SPR {}", spr),
                }
                return;
            }
            // mftb: the time base counts retired instructions here
            371 => {
                let tbr = ((rb as u16) << 5) | (ra as u16);
                let tb = thread.instructions_retired;
                let value = match tbr {
                    268 => tb,
                    269 => tb >> 32,
                    _ => {
                        warn!(target: "ppu", "mftb from unimplemented TBR {}", tbr);
                        0
                    }
                };
                thread.set_gpr(rt_idx, value);
                return;
            }
            _ => {}
        }

        // XO-form arithmetic carries the OE bit inside the 10-bit field,
        // so match on the low 9 bits.
        let (_, _, _, oe, _) = PpuDecoder::xo_form(instr);
        let xo9 = ((instr >> 1) & 0x1FF) as u16;
        match xo9 {
            // subfc
            8 => {
                let a = thread.gpr(ra_idx);
                let b = thread.gpr(rb_idx);
                let value = b.wrapping_sub(a);
                thread.set_gpr(rt_idx, value);
                thread.set_xer_ca(a <= b);
                if rc {
                    self.update_cr0(thread, value);
                }
            }
            // addc
            10 => {
                let (value, carry) = thread.gpr(ra_idx).overflowing_add(thread.gpr(rb_idx));
                thread.set_gpr(rt_idx, value);
                thread.set_xer_ca(carry);
                if rc {
                    self.update_cr0(thread, value);
                }
            }
            // mulhwu
            11 => {
                let a = thread.gpr(ra_idx) as u32 as u64;
                let b = thread.gpr(rb_idx) as u32 as u64;
                let value = (a * b) >> 32;
                thread.set_gpr(rt_idx, value);
                if rc {
                    self.update_cr0(thread, value);
                }
            }
            // subf
            40 => {
                let a = thread.gpr(ra_idx);
                let b = thread.gpr(rb_idx);
                let value = b.wrapping_sub(a);
                thread.set_gpr(rt_idx, value);
                if oe {
                    let overflow = (b as i64).overflowing_sub(a as i64).1;
                    thread.set_xer_ov(overflow);
                    if overflow {
                        thread.set_xer_so(true);
                    }
                }
                if rc {
                    self.update_cr0(thread, value);
                }
            }
            // mullw
            235 => {
                let a = thread.gpr(ra_idx) as i32 as i64;
                let b = thread.gpr(rb_idx) as i32 as i64;
                let value = a.wrapping_mul(b) as u64;
                thread.set_gpr(rt_idx, value);
                if rc {
                    self.update_cr0(thread, value);
                }
            }
            // add
            266 => {
                let a = thread.gpr(ra_idx);
                let b = thread.gpr(rb_idx);
                let value = a.wrapping_add(b);
                thread.set_gpr(rt_idx, value);
                if oe {
                    let overflow = (a as i64).overflowing_add(b as i64).1;
                    thread.set_xer_ov(overflow);
                    if overflow {
                        thread.set_xer_so(true);
                    }
                }
                if rc {
                    self.update_cr0(thread, value);
                }
            }
            // divw
            491 => {
                let a = thread.gpr(ra_idx) as i32;
                let b = thread.gpr(rb_idx) as i32;
                let value = if b != 0 && !(a == i32::MIN && b == -1) {
                    (a / b) as i64 as u64
                } else {
                    if oe {
                        thread.set_xer_ov(true);
                        thread.set_xer_so(true);
                    }
                    0
                };
                thread.set_gpr(rt_idx, value);
                if rc {
                    self.update_cr0(thread, value);
                }
            }
            _ => {
                warn!(target: "ppu", "unimplemented opcode-31 xo {} (xo9 {})", xo10, xo9);
            }
        }
    }

    fn shift_right_algebraic(
        &self,
        thread: &mut PpuThread,
        rs: usize,
        ra: usize,
        sh: u32,
        rc: bool,
    ) {
        let operand = thread.gpr(rs) as i32;
        let (value, carry) = if sh >= 32 {
            ((operand >> 31) as i64 as u64, operand < 0)
        } else {
            let shifted_out = sh != 0 && ((operand as u32) << (32 - sh)) != 0;
            ((operand >> sh) as i64 as u64, operand < 0 && shifted_out)
        };
        thread.set_gpr(ra, value);
        thread.set_xer_ca(carry);
        if rc {
            self.update_cr0(thread, value);
        }
    }

    fn execute_m_form(&self, thread: &mut PpuThread, instr: u32, op: u8) {
        let (rs, ra, rb_sh, mb, me, rc) = PpuDecoder::m_form(instr);
        let value = thread.gpr(rs as usize) as u32;
        let mask = Self::generate_mask_32(mb, me);

        let result = match op {
            // rlwimi
            20 => {
                let rotated = value.rotate_left(rb_sh as u32);
                ((rotated & mask) | (thread.gpr(ra as usize) as u32 & !mask)) as u64
            }
            // rlwinm
            21 => (value.rotate_left(rb_sh as u32) & mask) as u64,
            // rlwnm
            23 => {
                let sh = (thread.gpr(rb_sh as usize) & 0x1F) as u32;
                (value.rotate_left(sh) & mask) as u64
            }
            _ => {
                warn!(target: "ppu", "unimplemented M-form op {}", op);
                return;
            }
        };

        thread.set_gpr(ra as usize, result);
        if rc {
            self.update_cr0(thread, result);
        }
    }

    /// System call: the call number rides in r0, arguments in r3..r10.
    /// A handled call lands its return value in r3; an unhandled call is
    /// logged and leaves r3 untouched.
    fn execute_sc(&self, thread: &mut PpuThread) {
        let call = thread.gpr(0);
        let mut ctx = SyscallContext {
            r3: thread.gpr(3),
            r4: thread.gpr(4),
            r5: thread.gpr(5),
            r6: thread.gpr(6),
            r7: thread.gpr(7),
            r8: thread.gpr(8),
            r9: thread.gpr(9),
            r10: thread.gpr(10),
            ..Default::default()
        };

        trace!(target: "ppu", "sc {} at 0x{:08x}", call, thread.pc() - 4);

        match self.syscalls.handle(call, &mut ctx) {
            Ok(()) => thread.set_gpr(3, ctx.return_value),
            Err(e) => debug!(target: "ppu", "{}", e),
        }
    }

    fn execute_fp(&self, thread: &mut PpuThread, instr: u32) {
        let (frt, fra, frb, frc) = PpuDecoder::a_form(instr);
        let frt = frt as usize;

        // X-form fmr sits alongside the A-form arithmetic.
        let xo10 = (instr >> 1) & 0x3FF;
        if xo10 == 72 {
            thread.set_fpr(frt, thread.fpr(frb as usize));
            return;
        }

        let a = thread.fpr(fra as usize);
        let b = thread.fpr(frb as usize);
        let c = thread.fpr(frc as usize);

        match (instr >> 1) & 0x1F {
            // fdiv: left alone when the divisor is exactly zero
            18 => {
                if b != 0.0 {
                    thread.set_fpr(frt, a / b);
                }
            }
            // fsub
            20 => thread.set_fpr(frt, a - b),
            // fadd
            21 => thread.set_fpr(frt, a + b),
            // fmul
            25 => thread.set_fpr(frt, a * c),
            xo => {
                warn!(target: "ppu", "unimplemented FP xo {}", xo);
            }
        }
    }

    fn execute_vector(&self, thread: &mut PpuThread, instr: u32) {
        let vrt = bits(instr, 6, 10) as usize;
        let vra = bits(instr, 11, 15) as usize;
        let vrb = bits(instr, 16, 20) as usize;
        let a = thread.vr(vra);
        let b = thread.vr(vrb);

        let result = match instr & 0x7FF {
            // vaddfp
            10 => vmx::add_f32x4(a, b),
            // vsubfp
            74 => vmx::sub_f32x4(a, b),
            // vmulfp: element-wise multiply
            34 => vmx::mul_f32x4(a, b),
            // vand
            1028 => vmx::and_u128(a, b),
            // vor
            1156 => vmx::or_u128(a, b),
            // vxor
            1220 => vmx::xor_u128(a, b),
            xo => {
                warn!(target: "ppu", "unimplemented vector xo {}", xo);
                return;
            }
        };

        thread.set_vr(vrt, result);
    }

    #[inline]
    fn indexed_address(thread: &PpuThread, ra: u8, rb: u8) -> u64 {
        if ra == 0 {
            thread.gpr(rb as usize)
        } else {
            thread
                .gpr(ra as usize)
                .wrapping_add(thread.gpr(rb as usize))
        }
    }

    /// The rt field of compare instructions packs BF and the width bit.
    #[inline]
    fn cmp_operands(rt_field: u8) -> (usize, bool) {
        (((rt_field >> 2) & 7) as usize, rt_field & 1 != 0)
    }

    fn set_compare_field(&self, thread: &mut PpuThread, bf: usize, c: u32) {
        let c = c | u32::from(thread.xer_so());
        thread.set_cr_field(bf, c);
    }

    /// CR0 after Rc=1: LT/GT/EQ from the signed 64-bit result, SO from XER.
    fn update_cr0(&self, thread: &mut PpuThread, value: u64) {
        let c = signed_compare(value as i64, 0) | u32::from(thread.xer_so());
        thread.set_cr_field(0, c);
    }

    /// Generate a 32-bit mask from mb..me (PowerPC bit numbering),
    /// wrapping when mb > me.
    fn generate_mask_32(mb: u8, me: u8) -> u32 {
        let mb = mb as u32;
        let me = me as u32;
        if mb <= me {
            (u32::MAX >> mb) & (u32::MAX << (31 - me))
        } else {
            (u32::MAX >> mb) | (u32::MAX << (31 - me))
        }
    }
}

#[inline]
fn signed_compare(a: i64, b: i64) -> u32 {
    match a.cmp(&b) {
        std::cmp::Ordering::Less => 0b1000,
        std::cmp::Ordering::Greater => 0b0100,
        std::cmp::Ordering::Equal => 0b0010,
    }
}

#[inline]
fn unsigned_compare(a: u64, b: u64) -> u32 {
    match a.cmp(&b) {
        std::cmp::Ordering::Less => 0b1000,
        std::cmp::Ordering::Greater => 0b0100,
        std::cmp::Ordering::Equal => 0b0010,
    }
}
