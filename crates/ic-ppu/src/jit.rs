//! PPU JIT block cache
//!
//! Basic blocks are discovered from guest memory (up to 100 instructions,
//! stopping at and including the first branch), lowered through a
//! [`BlockCompiler`] and cached by start PC. Compilation failure is not an
//! error: the block simply stays on the interpreter path. The interpreter
//! remains the source of truth, so a block containing any instruction the
//! compiler does not understand falls back entirely.
//!
//! Self-modifying code is unsupported: the cache never observes guest
//! writes. Callers that rewrite code must [`PpuJit::clear`] the cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use ic_memory::MemoryManager;
use tracing::{debug, trace};

use crate::decoder::bits;
use crate::interpreter::PpuInterpreter;
use crate::thread::PpuThread;

/// Upper bound on block length in instructions
pub const MAX_BLOCK_INSTRUCTIONS: usize = 100;

/// Signature every compiled block conforms to: register arrays by
/// reference, PC and LR by value, CR writable for the compare subset.
/// Returns the post-block PC.
pub type BlockFn = Box<
    dyn Fn(&mut [u64; 32], &mut [f64; 32], &mut [[u32; 4]; 32], u64, u64, &mut u32) -> u64
        + Send
        + Sync,
>;

/// A compiler capability. Implementations are selectable at init; falling
/// back to the interpreter is always valid.
pub trait BlockCompiler: Send {
    /// Human-readable backend name for diagnostics
    fn name(&self) -> &'static str;

    /// Compile a discovered block. `None` means the block contains
    /// something outside the supported subset and must stay interpreted.
    fn compile(&self, start_pc: u64, instructions: &[u32]) -> Option<BlockFn>;
}

/// One cached block
pub struct JitBlock {
    /// First instruction address; the cache key
    pub start_pc: u64,
    /// Number of instructions covered
    pub instruction_count: u32,
    /// Compiled entry, when compilation succeeded
    pub native: Option<BlockFn>,
    /// Times this block was dispatched
    pub call_count: u64,
    /// When compilation was attempted
    pub compiled_at: Instant,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default)]
pub struct JitStats {
    pub compilations: u64,
    pub hits: u64,
    pub misses: u64,
}

/// The JIT block cache: discovery, compilation, dispatch and fallback.
pub struct PpuJit {
    memory: Arc<MemoryManager>,
    compiler: Box<dyn BlockCompiler>,
    blocks: HashMap<u64, JitBlock>,
    stats: JitStats,
}

impl PpuJit {
    pub fn new(memory: Arc<MemoryManager>, compiler: Box<dyn BlockCompiler>) -> Self {
        debug!(target: "ppu", "JIT initialized with {} backend", compiler.name());
        Self {
            memory,
            compiler,
            blocks: HashMap::new(),
            stats: JitStats::default(),
        }
    }

    pub fn stats(&self) -> JitStats {
        self.stats
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Flush every cached block
    pub fn clear(&mut self) {
        debug!(
            target: "ppu",
            "JIT cache cleared ({} blocks, {} compilations, {} hits, {} misses)",
            self.blocks.len(),
            self.stats.compilations,
            self.stats.hits,
            self.stats.misses
        );
        self.blocks.clear();
        self.stats = JitStats::default();
    }

    /// Read a block of instruction words from memory, stopping at and
    /// including the first branch.
    fn discover(&self, pc: u64) -> Vec<u32> {
        let mut words = Vec::new();
        let mut addr = pc;
        for _ in 0..MAX_BLOCK_INSTRUCTIONS {
            let Ok(word) = self.memory.read_u32(addr) else {
                break;
            };
            words.push(word);
            addr += 4;
            let primary = bits(word, 0, 5);
            if primary == 16 || primary == 18 || primary == 19 {
                break;
            }
        }
        words
    }

    fn ensure_block(&mut self, pc: u64) {
        if self.blocks.contains_key(&pc) {
            return;
        }

        self.stats.misses += 1;
        let words = self.discover(pc);
        let native = if words.is_empty() {
            None
        } else {
            self.compiler.compile(pc, &words)
        };
        self.stats.compilations += 1;

        if native.is_some() {
            trace!(
                target: "ppu",
                "compiled block at 0x{:08x} ({} instructions)",
                pc,
                words.len()
            );
        }

        self.blocks.insert(
            pc,
            JitBlock {
                start_pc: pc,
                instruction_count: words.len() as u32,
                native,
                call_count: 0,
                compiled_at: Instant::now(),
            },
        );
    }

    /// Advance the thread by up to `budget` instructions, dispatching
    /// compiled blocks where available and deferring to the interpreter
    /// otherwise. Returns the number of instructions executed.
    pub fn execute(
        &mut self,
        interpreter: &PpuInterpreter,
        thread: &mut PpuThread,
        budget: u32,
    ) -> u32 {
        let mut executed = 0;

        while executed < budget && !thread.is_halted() {
            let pc = thread.pc();
            self.ensure_block(pc);
            let block = self.blocks.get_mut(&pc).unwrap();
            block.call_count += 1;

            match &block.native {
                Some(native) => {
                    self.stats.hits += 1;
                    let count = block.instruction_count;
                    let regs = &mut thread.regs;
                    let next_pc = native(
                        &mut regs.gpr,
                        &mut regs.fpr,
                        &mut regs.vr,
                        pc,
                        regs.lr,
                        &mut regs.cr,
                    );
                    thread.set_pc(next_pc);
                    thread.instructions_retired += count as u64;
                    executed += count;
                }
                None => {
                    let count = block.instruction_count.max(1);
                    executed += interpreter.execute_block(thread, count);
                    if thread.is_halted() {
                        break;
                    }
                }
            }
        }

        executed
    }
}

/// The shipped compiler: lowers a subset of PPU semantics into an internal
/// IR and wraps it in a native closure. Supported: addi/addis/ori,
/// register add/subf/and/or/xor, cmp on CR field 0, and an unconditional
/// non-linking branch terminating the block.
pub struct IrBlockCompiler;

#[derive(Debug, Clone, Copy)]
enum IrOp {
    /// addi / li
    AddImm { rt: u8, ra: u8, simm: i32 },
    /// addis / lis
    AddImmShifted { rt: u8, ra: u8, simm: i32 },
    /// ori
    OrImm { ra: u8, rs: u8, uimm: u32 },
    /// add
    Add { rt: u8, ra: u8, rb: u8 },
    /// subf
    Subf { rt: u8, ra: u8, rb: u8 },
    /// and
    And { ra: u8, rs: u8, rb: u8 },
    /// or (also the canonical register move)
    Or { ra: u8, rs: u8, rb: u8 },
    /// xor
    Xor { ra: u8, rs: u8, rb: u8 },
    /// cmp crf0
    CmpCr0 { ra: u8, rb: u8, wide: bool },
}

#[derive(Debug, Clone, Copy)]
enum BlockExit {
    /// Fall through past the last instruction
    FallThrough,
    /// Unconditional branch target
    Branch(u64),
}

impl IrBlockCompiler {
    fn lower(start_pc: u64, instructions: &[u32]) -> Option<(Vec<IrOp>, BlockExit)> {
        let mut ops = Vec::with_capacity(instructions.len());
        let mut exit = BlockExit::FallThrough;

        for (i, &word) in instructions.iter().enumerate() {
            let primary = bits(word, 0, 5);
            let rt = bits(word, 6, 10) as u8;
            let ra = bits(word, 11, 15) as u8;
            let rb = bits(word, 16, 20) as u8;
            let last = i == instructions.len() - 1;

            match primary {
                14 => ops.push(IrOp::AddImm {
                    rt,
                    ra,
                    simm: (word & 0xFFFF) as i16 as i32,
                }),
                15 => ops.push(IrOp::AddImmShifted {
                    rt,
                    ra,
                    simm: (word & 0xFFFF) as i16 as i32,
                }),
                24 => ops.push(IrOp::OrImm {
                    ra,
                    rs: rt,
                    uimm: word & 0xFFFF,
                }),
                31 => {
                    let rc = word & 1 != 0;
                    let xo10 = (word >> 1) & 0x3FF;
                    let xo9 = (word >> 1) & 0x1FF;
                    let oe = bits(word, 21, 21) != 0;
                    // Rc and OE forms touch CR0-from-XER and XER itself;
                    // those stay on the interpreter.
                    match (xo10, xo9) {
                        (0, _) if !rc => {
                            // cmp: only CR field 0 is in the subset
                            if (rt >> 2) & 7 != 0 {
                                return None;
                            }
                            ops.push(IrOp::CmpCr0 {
                                ra,
                                rb,
                                wide: rt & 1 != 0,
                            });
                        }
                        (28, _) if !rc => ops.push(IrOp::And { ra, rs: rt, rb }),
                        (316, _) if !rc => ops.push(IrOp::Xor { ra, rs: rt, rb }),
                        (444, _) if !rc => ops.push(IrOp::Or { ra, rs: rt, rb }),
                        (_, 266) if !rc && !oe => ops.push(IrOp::Add { rt, ra, rb }),
                        (_, 40) if !rc && !oe => ops.push(IrOp::Subf { rt, ra, rb }),
                        _ => return None,
                    }
                }
                18 if last => {
                    let aa = (word >> 1) & 1 != 0;
                    let lk = word & 1 != 0;
                    if lk {
                        return None;
                    }
                    let li = (((word & 0x03FF_FFFC) as i32) << 6) >> 6;
                    let pc_of_branch = start_pc + i as u64 * 4;
                    let target = if aa {
                        li as i64 as u64
                    } else {
                        pc_of_branch.wrapping_add(li as i64 as u64)
                    };
                    exit = BlockExit::Branch(target);
                }
                _ => return None,
            }
        }

        Some((ops, exit))
    }
}

impl BlockCompiler for IrBlockCompiler {
    fn name(&self) -> &'static str {
        "ir"
    }

    fn compile(&self, start_pc: u64, instructions: &[u32]) -> Option<BlockFn> {
        let (ops, exit) = Self::lower(start_pc, instructions)?;
        let fallthrough = start_pc + instructions.len() as u64 * 4;

        Some(Box::new(move |gpr, _fpr, _vr, _pc, _lr, cr| {
            for op in &ops {
                match *op {
                    IrOp::AddImm { rt, ra, simm } => {
                        let base = if ra == 0 { 0 } else { gpr[ra as usize] };
                        gpr[rt as usize] = base.wrapping_add(simm as i64 as u64);
                    }
                    IrOp::AddImmShifted { rt, ra, simm } => {
                        let base = if ra == 0 { 0 } else { gpr[ra as usize] };
                        gpr[rt as usize] = base.wrapping_add(((simm as i64) << 16) as u64);
                    }
                    IrOp::OrImm { ra, rs, uimm } => {
                        gpr[ra as usize] = gpr[rs as usize] | uimm as u64;
                    }
                    IrOp::Add { rt, ra, rb } => {
                        gpr[rt as usize] = gpr[ra as usize].wrapping_add(gpr[rb as usize]);
                    }
                    IrOp::Subf { rt, ra, rb } => {
                        gpr[rt as usize] = gpr[rb as usize].wrapping_sub(gpr[ra as usize]);
                    }
                    IrOp::And { ra, rs, rb } => {
                        gpr[ra as usize] = gpr[rs as usize] & gpr[rb as usize];
                    }
                    IrOp::Or { ra, rs, rb } => {
                        gpr[ra as usize] = gpr[rs as usize] | gpr[rb as usize];
                    }
                    IrOp::Xor { ra, rs, rb } => {
                        gpr[ra as usize] = gpr[rs as usize] ^ gpr[rb as usize];
                    }
                    IrOp::CmpCr0 { ra, rb, wide } => {
                        let (a, b) = if wide {
                            (gpr[ra as usize] as i64, gpr[rb as usize] as i64)
                        } else {
                            (gpr[ra as usize] as i32 as i64, gpr[rb as usize] as i32 as i64)
                        };
                        let c = match a.cmp(&b) {
                            std::cmp::Ordering::Less => 0b1000,
                            std::cmp::Ordering::Greater => 0b0100,
                            std::cmp::Ordering::Equal => 0b0010,
                        };
                        // OE forms never compile, so XER.SO cannot change
                        // inside a block; carry the field's current SO bit.
                        let so = (*cr >> 28) & 1;
                        *cr = (*cr & 0x0FFF_FFFF) | ((c | so) << 28);
                    }
                }
            }

            match exit {
                BlockExit::FallThrough => fallthrough,
                BlockExit::Branch(target) => target,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ic_lv2::SyscallDispatcher;
    use ic_memory::constants::MAIN_MEM_BASE;

    fn setup() -> (Arc<MemoryManager>, PpuInterpreter, PpuJit) {
        let memory = MemoryManager::new().unwrap();
        let syscalls = Arc::new(SyscallDispatcher::new(memory.clone()));
        let interpreter = PpuInterpreter::new(memory.clone(), syscalls);
        let jit = PpuJit::new(memory.clone(), Box::new(IrBlockCompiler));
        (memory, interpreter, jit)
    }

    fn load_program(memory: &MemoryManager, addr: u64, words: &[u32]) {
        for (i, word) in words.iter().enumerate() {
            memory.write_u32(addr + i as u64 * 4, *word).unwrap();
        }
    }

    #[test]
    fn test_discovery_stops_at_branch() {
        let (memory, _interp, jit) = setup();
        let pc = MAIN_MEM_BASE + 0x100;
        load_program(
            &memory,
            pc,
            &[
                0x3860_0001, // addi r3, r0, 1
                0x3880_0002, // addi r4, r0, 2
                0x4800_0010, // b +16
                0x38A0_0003, // addi r5, r0, 3 (next block)
            ],
        );

        let words = jit.discover(pc);
        assert_eq!(words.len(), 3);
        assert_eq!(words[2], 0x4800_0010);
    }

    #[test]
    fn test_compile_and_execute_block() {
        let (memory, interp, mut jit) = setup();
        let pc = MAIN_MEM_BASE + 0x200;
        load_program(
            &memory,
            pc,
            &[
                0x3860_000A, // addi r3, r0, 10
                0x3880_0014, // addi r4, r0, 20
                0x7CA3_2214, // add r5, r3, r4
                0x4800_0010, // b +16
            ],
        );

        let mut thread = PpuThread::new(0);
        thread.set_pc(pc);
        let executed = jit.execute(&interp, &mut thread, 4);

        assert_eq!(executed, 4);
        assert_eq!(thread.gpr(5), 30);
        assert_eq!(thread.pc(), pc + 12 + 0x10);
        assert_eq!(jit.stats().hits, 1);
        assert_eq!(jit.block_count(), 1);
    }

    #[test]
    fn test_unsupported_block_falls_back() {
        let (memory, interp, mut jit) = setup();
        let pc = MAIN_MEM_BASE + 0x300;
        load_program(
            &memory,
            pc,
            &[
                0x3860_0005, // addi r3, r0, 5
                0x9064_0000, // stw r3, 0(r4) -- outside the compiled subset
                0x4800_0008, // b +8
            ],
        );

        let mut thread = PpuThread::new(0);
        thread.set_pc(pc);
        thread.set_gpr(4, MAIN_MEM_BASE + 0x1000);
        let executed = jit.execute(&interp, &mut thread, 3);

        assert_eq!(executed, 3);
        assert_eq!(jit.stats().hits, 0);
        // The interpreter still ran the block correctly.
        assert_eq!(memory.read_u32(MAIN_MEM_BASE + 0x1000).unwrap(), 5);
        assert_eq!(thread.pc(), pc + 8 + 8);
    }

    #[test]
    fn test_interpreter_jit_equivalence() {
        let (memory, interp, mut jit) = setup();
        let pc = MAIN_MEM_BASE + 0x400;
        let program = [
            0x3860_0007, // addi r3, r0, 7
            0x3C80_1234, // addis r4, r0, 0x1234
            0x6084_0042, // ori r4, r4, 0x42
            0x7CA3_2214, // add r5, r3, r4
            0x7CC4_1850, // subf r6, r4, r3
            0x7CA7_2B78, // mr r7, r5
            0x7C03_2000, // cmp cr0, 0, r3, r4
            0x4800_0100, // b +256
        ];
        load_program(&memory, pc, &program);

        let mut reference = PpuThread::new(0);
        reference.set_pc(pc);
        for _ in 0..program.len() {
            interp.step(&mut reference).unwrap();
        }

        let mut jitted = PpuThread::new(1);
        jitted.set_pc(pc);
        let executed = jit.execute(&interp, &mut jitted, program.len() as u32);

        assert_eq!(executed, program.len() as u32);
        assert!(jit.stats().hits > 0, "block should have compiled");
        assert_eq!(reference.regs.gpr, jitted.regs.gpr);
        assert_eq!(reference.regs.cr, jitted.regs.cr);
        assert_eq!(reference.regs.lr, jitted.regs.lr);
        assert_eq!(reference.pc(), jitted.pc());
    }

    #[test]
    fn test_bl_does_not_compile() {
        let (memory, _interp, jit) = setup();
        let pc = MAIN_MEM_BASE + 0x500;
        load_program(&memory, pc, &[0x3860_0001, 0x4800_0011]); // addi; bl

        let words = jit.discover(pc);
        assert!(IrBlockCompiler.compile(pc, &words).is_none());
    }

    #[test]
    fn test_clear_resets_cache() {
        let (memory, interp, mut jit) = setup();
        let pc = MAIN_MEM_BASE + 0x600;
        load_program(&memory, pc, &[0x3860_0001, 0x4800_0010]);

        let mut thread = PpuThread::new(0);
        thread.set_pc(pc);
        jit.execute(&interp, &mut thread, 2);
        assert_eq!(jit.block_count(), 1);

        jit.clear();
        assert_eq!(jit.block_count(), 0);
        assert_eq!(jit.stats().hits, 0);
    }

    #[test]
    fn test_two_pcs_never_share_an_entry() {
        let (memory, interp, mut jit) = setup();
        let pc_a = MAIN_MEM_BASE + 0x700;
        let pc_b = MAIN_MEM_BASE + 0x800;
        load_program(&memory, pc_a, &[0x3860_0001, 0x4800_0010]);
        load_program(&memory, pc_b, &[0x3860_0002, 0x4800_0010]);

        let mut thread = PpuThread::new(0);
        thread.set_pc(pc_a);
        jit.execute(&interp, &mut thread, 2);
        thread.set_pc(pc_b);
        jit.execute(&interp, &mut thread, 2);

        assert_eq!(jit.block_count(), 2);
    }
}
