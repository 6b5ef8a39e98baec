//! The guest memory manager

use std::collections::BTreeMap;
use std::sync::Arc;

use ic_core::error::MemoryError;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::constants::*;
use crate::region::{MemoryRegion, RegionFlags};

type MemoryResult<T> = std::result::Result<T, MemoryError>;

/// Big-endian guest address space with named regions and on-demand backing.
///
/// Handed out as `Arc<MemoryManager>`; all access goes through `&self`.
/// Typed accessors byte-swap between the big-endian guest and host-native
/// values; bulk `read`/`write` move raw bytes.
pub struct MemoryManager {
    regions: RwLock<BTreeMap<u64, MemoryRegion>>,
}

impl MemoryManager {
    /// Create the manager with the architectural memory map declared but
    /// not backed. Backing commits lazily as the guest touches pages.
    pub fn new() -> MemoryResult<Arc<Self>> {
        let manager = Arc::new(Self {
            regions: RwLock::new(BTreeMap::new()),
        });

        manager.map(MAIN_MEM_BASE, MAIN_MEM_SIZE, RegionFlags::RWX)?;
        manager.map(USER_MEM_BASE, USER_MEM_SIZE, RegionFlags::RW)?;
        manager.map(VIDEO_MEM_BASE, VIDEO_MEM_SIZE, RegionFlags::RW)?;

        debug!(target: "memory", "memory map declared (lazy backing)");
        Ok(manager)
    }

    /// Create an empty manager with no regions declared. Used by loader
    /// tests that want full control over the map.
    pub fn new_bare() -> Arc<Self> {
        Arc::new(Self {
            regions: RwLock::new(BTreeMap::new()),
        })
    }

    /// Declare a region. Backing is deferred until first touch.
    pub fn map(&self, base: u64, size: u64, flags: RegionFlags) -> MemoryResult<()> {
        if size == 0 || base.checked_add(size).is_none() {
            return Err(MemoryError::InvalidRange { base, size });
        }

        let mut regions = self.regions.write();
        for region in regions.values() {
            if base < region.end() && region.base < base + size {
                return Err(MemoryError::MapOverlap {
                    base,
                    existing: region.base,
                });
            }
        }

        debug!(
            target: "memory",
            "mapped region 0x{:08x}..0x{:08x} flags={:?}",
            base,
            base + size,
            flags
        );
        regions.insert(base, MemoryRegion::new(base, size, flags));
        Ok(())
    }

    /// Remove a region declared at `base`. Returns whether one existed.
    pub fn unmap(&self, base: u64) -> bool {
        self.regions.write().remove(&base).is_some()
    }

    fn region_base_for(regions: &BTreeMap<u64, MemoryRegion>, vaddr: u64) -> Option<u64> {
        regions
            .range(..=vaddr)
            .next_back()
            .filter(|(_, r)| r.contains(vaddr))
            .map(|(base, _)| *base)
    }

    /// If `vaddr` falls into no declared region, declare a 1 MB RW region
    /// aligned down to a 1 MB boundary. Typed reads use this to tolerate
    /// stubs poking at undeclared addresses.
    pub fn materialize_on_demand(&self, vaddr: u64) -> MemoryResult<()> {
        {
            let regions = self.regions.read();
            if Self::region_base_for(&regions, vaddr).is_some() {
                return Ok(());
            }
        }

        let base = vaddr & !(ON_DEMAND_ALIGN - 1);
        debug!(
            target: "memory",
            "materializing on-demand region at 0x{:08x} for access to 0x{:08x}",
            base, vaddr
        );
        match self.map(base, ON_DEMAND_SIZE, RegionFlags::RW) {
            Ok(()) => Ok(()),
            // A racing materialization of the same page is fine.
            Err(MemoryError::MapOverlap { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Read raw bytes. The range must stay within one region.
    pub fn read(&self, vaddr: u64, dst: &mut [u8]) -> MemoryResult<()> {
        let regions = self.regions.read();
        let base = Self::region_base_for(&regions, vaddr)
            .ok_or(MemoryError::Unmapped { addr: vaddr })?;
        let region = &regions[&base];

        if !region.flags.contains(RegionFlags::READ) {
            return Err(MemoryError::Protection {
                addr: vaddr,
                access: "read",
            });
        }

        let offset = vaddr - region.base;
        if offset + dst.len() as u64 > region.size {
            return Err(MemoryError::OutOfBounds {
                addr: vaddr,
                len: dst.len(),
            });
        }

        region.read_at(offset, dst);
        Ok(())
    }

    /// Write raw bytes. The range must stay within one region; writes to
    /// unmapped addresses fail rather than materializing (loader-fed data
    /// must pre-declare its region).
    pub fn write(&self, vaddr: u64, src: &[u8]) -> MemoryResult<()> {
        let mut regions = self.regions.write();
        let base = Self::region_base_for(&regions, vaddr)
            .ok_or(MemoryError::Unmapped { addr: vaddr })?;
        let region = regions.get_mut(&base).unwrap();

        if !region.flags.contains(RegionFlags::WRITE) {
            return Err(MemoryError::Protection {
                addr: vaddr,
                access: "write",
            });
        }

        let offset = vaddr - region.base;
        if offset + src.len() as u64 > region.size {
            return Err(MemoryError::OutOfBounds {
                addr: vaddr,
                len: src.len(),
            });
        }

        region.write_at(offset, src);
        Ok(())
    }

    /// Read a byte
    pub fn read_u8(&self, vaddr: u64) -> MemoryResult<u8> {
        let mut buf = [0u8; 1];
        self.read_with_materialize(vaddr, &mut buf)?;
        Ok(buf[0])
    }

    /// Read a big-endian u16 as a host-native value
    pub fn read_u16(&self, vaddr: u64) -> MemoryResult<u16> {
        let mut buf = [0u8; 2];
        self.read_with_materialize(vaddr, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Read a big-endian u32 as a host-native value
    pub fn read_u32(&self, vaddr: u64) -> MemoryResult<u32> {
        let mut buf = [0u8; 4];
        self.read_with_materialize(vaddr, &mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Read a big-endian u64 as a host-native value
    pub fn read_u64(&self, vaddr: u64) -> MemoryResult<u64> {
        let mut buf = [0u8; 8];
        self.read_with_materialize(vaddr, &mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Write a byte
    pub fn write_u8(&self, vaddr: u64, value: u8) -> MemoryResult<()> {
        self.write(vaddr, &[value])
    }

    /// Write a host-native u16 as big-endian guest bytes
    pub fn write_u16(&self, vaddr: u64, value: u16) -> MemoryResult<()> {
        self.write(vaddr, &value.to_be_bytes())
    }

    /// Write a host-native u32 as big-endian guest bytes
    pub fn write_u32(&self, vaddr: u64, value: u32) -> MemoryResult<()> {
        self.write(vaddr, &value.to_be_bytes())
    }

    /// Write a host-native u64 as big-endian guest bytes
    pub fn write_u64(&self, vaddr: u64, value: u64) -> MemoryResult<()> {
        self.write(vaddr, &value.to_be_bytes())
    }

    /// Typed reads fall back to on-demand materialization when the address
    /// is completely undeclared.
    fn read_with_materialize(&self, vaddr: u64, dst: &mut [u8]) -> MemoryResult<()> {
        match self.read(vaddr, dst) {
            Err(MemoryError::Unmapped { .. }) => {
                self.materialize_on_demand(vaddr)?;
                self.read(vaddr, dst)
            }
            other => other,
        }
    }

    /// Total declared bytes across all regions
    pub fn total_mapped(&self) -> u64 {
        self.regions.read().values().map(|r| r.size).sum()
    }

    /// Total backing bytes actually committed
    pub fn total_committed(&self) -> u64 {
        self.regions
            .read()
            .values()
            .map(|r| r.committed_bytes())
            .sum()
    }

    /// Log the region table for diagnostics
    pub fn dump_regions(&self) {
        let regions = self.regions.read();
        debug!(target: "memory", "{} regions:", regions.len());
        for region in regions.values() {
            debug!(
                target: "memory",
                "  0x{:08x}..0x{:08x} ({} MB declared, {} KB committed) flags={:?}",
                region.base,
                region.end(),
                region.size / (1024 * 1024),
                region.committed_bytes() / 1024,
                region.flags
            );
        }
    }

    /// Snapshot of (base, size, flags) for test harnesses
    pub fn region_table(&self) -> Vec<(u64, u64, RegionFlags)> {
        self.regions
            .read()
            .values()
            .map(|r| (r.base, r.size, r.flags))
            .collect()
    }
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        let committed = self.total_committed();
        if committed > 0 {
            warn!(
                target: "memory",
                "releasing {} KB of committed guest memory",
                committed / 1024
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endian_round_trip() {
        let mem = MemoryManager::new().unwrap();

        mem.write_u32(MAIN_MEM_BASE, 0xDEADBEEF).unwrap();
        assert_eq!(mem.read_u32(MAIN_MEM_BASE).unwrap(), 0xDEADBEEF);

        // Guest bytes are big-endian at rest.
        let mut raw = [0u8; 4];
        mem.read(MAIN_MEM_BASE, &mut raw).unwrap();
        assert_eq!(raw, [0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_typed_widths() {
        let mem = MemoryManager::new().unwrap();
        let addr = MAIN_MEM_BASE + 0x1000;

        mem.write_u16(addr, 0x1234).unwrap();
        assert_eq!(mem.read_u16(addr).unwrap(), 0x1234);

        mem.write_u64(addr + 8, 0xDEADBEEF_CAFEBABE).unwrap();
        assert_eq!(mem.read_u64(addr + 8).unwrap(), 0xDEADBEEF_CAFEBABE);

        mem.write_u8(addr + 16, 0x42).unwrap();
        assert_eq!(mem.read_u8(addr + 16).unwrap(), 0x42);
    }

    #[test]
    fn test_overlap_rejected() {
        let mem = MemoryManager::new().unwrap();
        let err = mem
            .map(MAIN_MEM_BASE + 0x1000, 0x1000, RegionFlags::RW)
            .unwrap_err();
        match err {
            MemoryError::MapOverlap { existing, .. } => assert_eq!(existing, MAIN_MEM_BASE),
            other => panic!("expected overlap, got {other:?}"),
        }
    }

    #[test]
    fn test_write_to_unmapped_fails() {
        let mem = MemoryManager::new().unwrap();
        // The gap between main RAM and the user pool is undeclared.
        let err = mem.write_u32(0x1800_0000, 1).unwrap_err();
        assert!(matches!(err, MemoryError::Unmapped { .. }));
    }

    #[test]
    fn test_read_materializes_on_demand() {
        let mem = MemoryManager::new().unwrap();
        let addr = 0x1812_3456u64;

        assert_eq!(mem.read_u32(addr).unwrap(), 0);

        // The new region is 1 MB, aligned down, and writable.
        let base = addr & !(ON_DEMAND_ALIGN - 1);
        mem.write_u32(addr, 0xCAFE_F00D).unwrap();
        assert_eq!(mem.read_u32(addr).unwrap(), 0xCAFE_F00D);
        assert!(mem
            .region_table()
            .iter()
            .any(|&(b, s, _)| b == base && s == ON_DEMAND_SIZE));
    }

    #[test]
    fn test_unaligned_access() {
        let mem = MemoryManager::new().unwrap();
        let addr = MAIN_MEM_BASE + 1;

        mem.write_u32(addr, 0x12345678).unwrap();
        assert_eq!(mem.read_u32(addr).unwrap(), 0x12345678);

        mem.write_u64(addr, 0xDEADBEEF_CAFEBABE).unwrap();
        assert_eq!(mem.read_u64(addr).unwrap(), 0xDEADBEEF_CAFEBABE);
    }

    #[test]
    fn test_out_of_bounds() {
        let mem = MemoryManager::new_bare();
        mem.map(0x1000, 0x100, RegionFlags::RW).unwrap();

        let err = mem.write_u32(0x10FE, 1).unwrap_err();
        assert!(matches!(err, MemoryError::OutOfBounds { .. }));
    }

    #[test]
    fn test_protection() {
        let mem = MemoryManager::new_bare();
        mem.map(0x1000, 0x1000, RegionFlags::READ).unwrap();

        let err = mem.write_u32(0x1000, 1).unwrap_err();
        assert!(matches!(err, MemoryError::Protection { .. }));
        assert_eq!(mem.read_u32(0x1000).unwrap(), 0);
    }

    #[test]
    fn test_unmap() {
        let mem = MemoryManager::new_bare();
        mem.map(0x1000, 0x1000, RegionFlags::RW).unwrap();
        assert!(mem.unmap(0x1000));
        assert!(!mem.unmap(0x1000));
    }

    #[test]
    fn test_lazy_commit_accounting() {
        let mem = MemoryManager::new().unwrap();
        assert_eq!(mem.total_committed(), 0);

        mem.write_u32(MAIN_MEM_BASE, 1).unwrap();
        assert_eq!(mem.total_committed(), CHUNK_SIZE);

        // Writing a second location in the same chunk commits nothing new.
        mem.write_u32(MAIN_MEM_BASE + 0x100, 2).unwrap();
        assert_eq!(mem.total_committed(), CHUNK_SIZE);
    }

    #[test]
    fn test_sequential_scalar_writes_ordered() {
        let mem = MemoryManager::new().unwrap();
        let addr = MAIN_MEM_BASE + 0x2000;

        mem.write_u32(addr, 0xAABBCCDD).unwrap();
        mem.write_u16(addr, 0x1122).unwrap();
        assert_eq!(mem.read_u32(addr).unwrap(), 0x1122CCDD);
    }
}
