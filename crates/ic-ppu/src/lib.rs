//! PPU (PowerPC Processing Unit) emulation for ironcell
//!
//! The Cell BE PPU is a 64-bit big-endian PowerPC core with VMX/AltiVec.
//! The interpreter is the correctness reference; the JIT block cache in
//! [`jit`] is an optimization layered on top of it.

pub mod decoder;
pub mod interpreter;
pub mod jit;
pub mod thread;
pub mod vmx;

pub use decoder::PpuDecoder;
pub use interpreter::PpuInterpreter;
pub use jit::{BlockCompiler, IrBlockCompiler, JitBlock, PpuJit};
pub use thread::{PpuRegisters, PpuThread};
