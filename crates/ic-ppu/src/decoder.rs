//! PPU instruction decoder
//!
//! Bit fields follow PowerPC notation throughout: bit 0 is the most
//! significant bit of the 32-bit word, bit 31 the least.

/// Extract an inclusive PowerPC-numbered bit range
#[inline]
pub fn bits(value: u32, start: u32, end: u32) -> u32 {
    let count = end - start + 1;
    (value >> (31 - end)) & (((1u64 << count) - 1) as u32)
}

/// Decoded PPU instruction
#[derive(Debug, Clone, Copy)]
pub struct DecodedInstruction {
    /// Raw instruction word (host-native after the fetch byte-swap)
    pub opcode: u32,
    /// Primary opcode (bits 0-5)
    pub op: u8,
    /// Extended opcode where the form carries one
    pub xo: u16,
    /// Instruction form
    pub form: InstructionForm,
}

/// PPU instruction forms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionForm {
    /// I-Form: unconditional branch
    I,
    /// B-Form: conditional branch
    B,
    /// SC-Form: system call
    SC,
    /// D-Form: immediates and load/store with displacement
    D,
    /// DS-Form: 64-bit load/store with scaled displacement
    DS,
    /// X/XO-Form under primary opcode 31
    X,
    /// XL-Form: branch to LR/CTR
    XL,
    /// M-Form: rotate and mask
    M,
    /// FP arithmetic under primary opcodes 59/63
    Fp,
    /// VX-Form vector ops under primary opcode 4
    VX,
    /// Unknown form
    Unknown,
}

/// PPU instruction decoder
pub struct PpuDecoder;

impl PpuDecoder {
    /// Classify a 32-bit instruction word
    pub fn decode(opcode: u32) -> DecodedInstruction {
        let op = bits(opcode, 0, 5) as u8;

        let (form, xo) = match op {
            4 => (InstructionForm::VX, (opcode & 0x7FF) as u16),

            18 => (InstructionForm::I, 0),
            16 => (InstructionForm::B, 0),
            17 => (InstructionForm::SC, 0),
            19 => (InstructionForm::XL, ((opcode >> 1) & 0x3FF) as u16),

            // Immediates, compares, logical immediates, load/store
            7..=15 | 24..=29 | 32..=45 => (InstructionForm::D, 0),

            // Rotate and mask
            20 | 21 | 23 => (InstructionForm::M, 0),

            // Extended arithmetic/logical/load-store
            31 => (InstructionForm::X, ((opcode >> 1) & 0x3FF) as u16),

            // 64-bit load/store with scaled displacement
            58 | 62 => (InstructionForm::DS, (opcode & 0x3) as u16),

            59 | 63 => (InstructionForm::Fp, ((opcode >> 1) & 0x1F) as u16),

            _ => (InstructionForm::Unknown, 0),
        };

        DecodedInstruction {
            opcode,
            op,
            xo,
            form,
        }
    }

    /// Extract D-form fields: (rt, ra, d)
    #[inline]
    pub fn d_form(opcode: u32) -> (u8, u8, i16) {
        let rt = bits(opcode, 6, 10) as u8;
        let ra = bits(opcode, 11, 15) as u8;
        let d = (opcode & 0xFFFF) as i16;
        (rt, ra, d)
    }

    /// Extract X-form fields: (rt, ra, rb, rc)
    #[inline]
    pub fn x_form(opcode: u32) -> (u8, u8, u8, bool) {
        let rt = bits(opcode, 6, 10) as u8;
        let ra = bits(opcode, 11, 15) as u8;
        let rb = bits(opcode, 16, 20) as u8;
        let rc = (opcode & 1) != 0;
        (rt, ra, rb, rc)
    }

    /// Extract XO-form fields: (rt, ra, rb, oe, rc)
    #[inline]
    pub fn xo_form(opcode: u32) -> (u8, u8, u8, bool, bool) {
        let rt = bits(opcode, 6, 10) as u8;
        let ra = bits(opcode, 11, 15) as u8;
        let rb = bits(opcode, 16, 20) as u8;
        let oe = bits(opcode, 21, 21) != 0;
        let rc = (opcode & 1) != 0;
        (rt, ra, rb, oe, rc)
    }

    /// Extract I-form fields: (li, aa, lk); li is sign-extended and scaled
    #[inline]
    pub fn i_form(opcode: u32) -> (i32, bool, bool) {
        let li = (opcode & 0x03FF_FFFC) as i32;
        let li = (li << 6) >> 6;
        let aa = (opcode >> 1) & 1 != 0;
        let lk = opcode & 1 != 0;
        (li, aa, lk)
    }

    /// Extract B-form fields: (bo, bi, bd, aa, lk); bd sign-extended, scaled
    #[inline]
    pub fn b_form(opcode: u32) -> (u8, u8, i32, bool, bool) {
        let bo = bits(opcode, 6, 10) as u8;
        let bi = bits(opcode, 11, 15) as u8;
        let bd = (opcode & 0xFFFC) as i32;
        let bd = (bd << 16) >> 16;
        let aa = (opcode >> 1) & 1 != 0;
        let lk = opcode & 1 != 0;
        (bo, bi, bd, aa, lk)
    }

    /// Extract M-form fields: (rs, ra, rb_or_sh, mb, me, rc)
    #[inline]
    pub fn m_form(opcode: u32) -> (u8, u8, u8, u8, u8, bool) {
        let rs = bits(opcode, 6, 10) as u8;
        let ra = bits(opcode, 11, 15) as u8;
        let rb = bits(opcode, 16, 20) as u8;
        let mb = bits(opcode, 21, 25) as u8;
        let me = bits(opcode, 26, 30) as u8;
        let rc = (opcode & 1) != 0;
        (rs, ra, rb, mb, me, rc)
    }

    /// Extract DS-form fields: (rt, ra, displacement); low two bits of the
    /// offset field are the sub-opcode, the rest is the scaled displacement
    #[inline]
    pub fn ds_form(opcode: u32) -> (u8, u8, i64) {
        let rt = bits(opcode, 6, 10) as u8;
        let ra = bits(opcode, 11, 15) as u8;
        let d = ((opcode & 0xFFFC) as i16) as i64;
        (rt, ra, d)
    }

    /// Extract A-form FP fields: (frt, fra, frb, frc)
    #[inline]
    pub fn a_form(opcode: u32) -> (u8, u8, u8, u8) {
        let frt = bits(opcode, 6, 10) as u8;
        let fra = bits(opcode, 11, 15) as u8;
        let frb = bits(opcode, 16, 20) as u8;
        let frc = bits(opcode, 21, 25) as u8;
        (frt, fra, frb, frc)
    }
}
