//! LV1/LV2 system call handling for ironcell

pub mod syscall;

pub use syscall::{SyscallContext, SyscallDispatcher};
