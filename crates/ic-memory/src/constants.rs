//! Cell memory map constants

/// Main memory base address
pub const MAIN_MEM_BASE: u64 = 0x0001_0000;
/// Main memory size (256 MB)
pub const MAIN_MEM_SIZE: u64 = 0x1000_0000;

/// User pool base address
pub const USER_MEM_BASE: u64 = 0x2000_0000;
/// User pool size (256 MB)
pub const USER_MEM_SIZE: u64 = 0x1000_0000;

/// Graphics memory base address
pub const VIDEO_MEM_BASE: u64 = 0xC000_0000;
/// Graphics memory size (256 MB)
pub const VIDEO_MEM_SIZE: u64 = 0x1000_0000;

/// Commit granularity for lazily backed regions (1 MB)
pub const CHUNK_SIZE: u64 = 0x10_0000;

/// Alignment for on-demand regions (1 MB)
pub const ON_DEMAND_ALIGN: u64 = 0x10_0000;

/// Size of an on-demand region (1 MB)
pub const ON_DEMAND_SIZE: u64 = 0x10_0000;
