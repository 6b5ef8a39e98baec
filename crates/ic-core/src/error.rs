//! Error taxonomy for the emulator core
//!
//! Each subsystem reports through its own enum; `EmulatorError` is the
//! umbrella surfaced at API boundaries. The core never panics on guest
//! misbehavior: runtime faults halt only the faulting processor.

use thiserror::Error;

/// Memory subsystem errors
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Address falls into no mapped region
    #[error("unmapped address 0x{addr:08x}")]
    Unmapped { addr: u64 },

    /// Region flags forbid the access
    #[error("protection violation at 0x{addr:08x} ({access})")]
    Protection { addr: u64, access: &'static str },

    /// Access starts inside a region but runs past its end
    #[error("out-of-bounds access at 0x{addr:08x} len {len}")]
    OutOfBounds { addr: u64, len: usize },

    /// New mapping collides with an existing region
    #[error("mapping at 0x{base:08x} overlaps region at 0x{existing:08x}")]
    MapOverlap { base: u64, existing: u64 },

    /// Zero-sized or wrapping range
    #[error("invalid range base=0x{base:08x} size=0x{size:x}")]
    InvalidRange { base: u64, size: u64 },
}

/// Executable loader errors
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("truncated header ({0} bytes)")]
    TruncatedHeader(usize),

    #[error("bad magic 0x{0:08x}")]
    BadMagic(u32),

    #[error("wrong architecture (machine {0}, expected PPC64)")]
    WrongArchitecture(u16),

    #[error("encrypted section and no decryptor attached")]
    UnsupportedEncryption,

    #[error("failed to map segment: {0}")]
    MemoryMapFailed(#[from] MemoryError),

    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// PPU execution errors
#[derive(Debug, Error)]
pub enum PpuError {
    #[error("illegal instruction 0x{opcode:08x} at 0x{addr:08x}")]
    IllegalInstruction { addr: u64, opcode: u32 },

    #[error("instruction fetch failed at 0x{addr:08x}")]
    FetchFailed { addr: u64 },
}

/// SPU execution errors
#[derive(Debug, Error)]
pub enum SpuError {
    #[error("SPU{id} illegal instruction 0x{opcode:08x} at 0x{addr:05x}")]
    IllegalInstruction { id: u32, addr: u32, opcode: u32 },

    #[error("SPU{id} program counter 0x{addr:05x} outside local store")]
    PcOutOfRange { id: u32, addr: u32 },
}

/// LV1/LV2 kernel errors
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("unhandled syscall {0}")]
    UnhandledSyscall(u64),
}

/// RSX errors
#[derive(Debug, Error)]
pub enum RsxError {
    #[error("command buffer overflow (method 0x{method:04x}, {needed} bytes needed)")]
    BufferOverflow { method: u16, needed: usize },
}

/// Top-level emulator error
#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("memory: {0}")]
    Memory(#[from] MemoryError),

    #[error("loader: {0}")]
    Loader(#[from] LoaderError),

    #[error("ppu: {0}")]
    Ppu(#[from] PpuError),

    #[error("spu: {0}")]
    Spu(#[from] SpuError),

    #[error("kernel: {0}")]
    Kernel(#[from] KernelError),

    #[error("rsx: {0}")]
    Rsx(#[from] RsxError),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("{component} initialization failed: {reason}")]
    InitFailed {
        component: &'static str,
        reason: String,
    },
}

/// Convenience result alias used across the workspace
pub type Result<T> = std::result::Result<T, EmulatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MemoryError::Unmapped { addr: 0xDEAD0000 };
        assert_eq!(err.to_string(), "unmapped address 0xdead0000");

        let err = EmulatorError::from(KernelError::UnhandledSyscall(999));
        assert!(err.to_string().contains("999"));
    }

    #[test]
    fn test_loader_error_from_memory() {
        let err: LoaderError = MemoryError::MapOverlap {
            base: 0x10000,
            existing: 0x10000,
        }
        .into();
        assert!(matches!(err, LoaderError::MemoryMapFailed(_)));
    }
}
