//! System call dispatcher
//!
//! One entry point serves both rings: numbers below 512 are LV2
//! (operating-system level), 512 and up are LV1 (hypervisor level) after
//! subtracting the base.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ic_core::error::KernelError;
use ic_memory::constants::USER_MEM_BASE;
use ic_memory::MemoryManager;
use tracing::{debug, info, warn};

/// First LV1 call number; everything below is LV2
const LV1_BASE: u64 = 512;

/// Reported user memory pool size (256 MB)
const USER_MEMORY_SIZE: u64 = 0x1000_0000;

/// Reported firmware version (4.81)
const FIRMWARE_VERSION: u64 = 0x0004_B001;

/// Argument and result window for one system call.
///
/// The PPU fills the argument slots from r3..r10 before dispatch and
/// copies `return_value` back into r3 when the call was handled.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallContext {
    pub r3: u64,
    pub r4: u64,
    pub r5: u64,
    pub r6: u64,
    pub r7: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    /// Written by the handler; lands in guest r3
    pub return_value: u64,
    /// Set once a handler accepted the call
    pub handled: bool,
}

/// Decodes call numbers and routes them to handlers
pub struct SyscallDispatcher {
    memory: Arc<MemoryManager>,
    next_memory_handle: AtomicU64,
    names: HashMap<u64, &'static str>,
}

impl SyscallDispatcher {
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        let mut names = HashMap::new();
        names.insert(1, "exit");
        names.insert(6, "process_getpid");
        names.insert(82, "process_prx_load_module");
        names.insert(83, "process_prx_start_module");
        names.insert(202, "sys_memory_allocate");
        names.insert(203, "sys_memory_free");
        names.insert(205, "sys_memory_get_user_memory_size");
        names.insert(348, "sys_process_exit");
        names.insert(LV1_BASE + 1, "lv1_get_version");

        Self {
            memory,
            next_memory_handle: AtomicU64::new(1),
            names,
        }
    }

    /// Diagnostic name for a call number
    pub fn syscall_name(&self, call: u64) -> String {
        match self.names.get(&call) {
            Some(name) => (*name).to_string(),
            None => format!("unknown_{call}"),
        }
    }

    /// Dispatch one system call. Handlers read `ctx.r3..r10`, may touch
    /// guest memory, and write `ctx.return_value`. Unhandled numbers are
    /// reported, never fatal.
    pub fn handle(&self, call: u64, ctx: &mut SyscallContext) -> Result<(), KernelError> {
        debug!(target: "kernel", "syscall {} ({})", call, self.syscall_name(call));

        let handled = if call < LV1_BASE {
            self.handle_lv2(call, ctx)
        } else {
            self.handle_lv1(call - LV1_BASE, ctx)
        };

        if handled {
            ctx.handled = true;
            Ok(())
        } else {
            warn!(target: "kernel", "unhandled syscall {}", call);
            Err(KernelError::UnhandledSyscall(call))
        }
    }

    fn handle_lv2(&self, call: u64, ctx: &mut SyscallContext) -> bool {
        match call {
            // exit
            1 => {
                info!(target: "kernel", "exit({})", ctx.r3 as i64);
                ctx.return_value = 0;
                true
            }
            // process_getpid
            6 => {
                ctx.return_value = 1;
                true
            }
            // process_prx_load_module: r3 = path ptr, r4 = flags, r5 = opts
            82 => {
                debug!(target: "kernel", "prx load module (path ptr 0x{:x})", ctx.r3);
                ctx.return_value = 1; // module id
                true
            }
            // process_prx_start_module: r3 = module id
            83 => {
                debug!(target: "kernel", "prx start module {}", ctx.r3);
                ctx.return_value = 0;
                true
            }
            // sys_memory_allocate: r3 = size, r4 = flags, r5 = out ptr
            202 => {
                let handle = self.next_memory_handle.fetch_add(1, Ordering::Relaxed);
                let addr = USER_MEM_BASE + (handle << 20);
                debug!(
                    target: "kernel",
                    "sys_memory_allocate(size=0x{:x}) -> 0x{:08x}",
                    ctx.r3, addr
                );
                if ctx.r5 != 0 {
                    if let Err(e) = self.memory.write_u64(ctx.r5, addr) {
                        warn!(target: "kernel", "allocate out-pointer write failed: {}", e);
                    }
                }
                ctx.return_value = addr;
                true
            }
            // sys_memory_free: r3 = addr
            203 => {
                debug!(target: "kernel", "sys_memory_free(0x{:x})", ctx.r3);
                ctx.return_value = 0;
                true
            }
            // sys_memory_get_user_memory_size
            205 => {
                ctx.return_value = USER_MEMORY_SIZE;
                true
            }
            // sys_process_exit
            348 => {
                info!(target: "kernel", "process exit({})", ctx.r3 as i64);
                ctx.return_value = 0;
                true
            }
            _ => false,
        }
    }

    fn handle_lv1(&self, call: u64, ctx: &mut SyscallContext) -> bool {
        match call {
            // lv1_get_version
            1 => {
                ctx.return_value = FIRMWARE_VERSION;
                true
            }
            _ => false,
        }
    }
}
