//! Memory regions and protection flags

use bitflags::bitflags;

use crate::constants::CHUNK_SIZE;

bitflags! {
    /// Region protection and attribute flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RegionFlags: u32 {
        /// Region is readable
        const READ    = 0b001;
        /// Region is writable
        const WRITE   = 0b010;
        /// Region is executable (advisory, used by loaders)
        const EXECUTE = 0b100;

        /// Read and write access
        const RW  = Self::READ.bits() | Self::WRITE.bits();
        /// Read, write, and execute access
        const RWX = Self::READ.bits() | Self::WRITE.bits() | Self::EXECUTE.bits();
        /// Read and execute access
        const RX  = Self::READ.bits() | Self::EXECUTE.bits();
    }
}

impl Default for RegionFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl RegionFlags {
    /// Build flags from ELF `p_flags` (PF_X=1, PF_W=2, PF_R=4)
    pub fn from_elf(p_flags: u32) -> Self {
        let mut flags = Self::empty();
        if p_flags & 0x4 != 0 {
            flags |= Self::READ;
        }
        if p_flags & 0x2 != 0 {
            flags |= Self::WRITE;
        }
        if p_flags & 0x1 != 0 {
            flags |= Self::EXECUTE;
        }
        flags
    }
}

/// A declared span of guest address space.
///
/// Backing storage is committed in `CHUNK_SIZE` pieces the first time a
/// chunk is touched, so declaring a 256 MB region costs nothing until the
/// guest actually uses it.
pub struct MemoryRegion {
    /// Guest base address
    pub base: u64,
    /// Region size in bytes
    pub size: u64,
    /// Protection flags
    pub flags: RegionFlags,
    /// Lazily committed backing chunks
    chunks: Vec<Option<Box<[u8]>>>,
}

impl MemoryRegion {
    /// Declare a region without committing any backing storage
    pub fn new(base: u64, size: u64, flags: RegionFlags) -> Self {
        let chunk_count = size.div_ceil(CHUNK_SIZE) as usize;
        Self {
            base,
            size,
            flags,
            chunks: (0..chunk_count).map(|_| None).collect(),
        }
    }

    /// Guest address one past the end of the region
    pub fn end(&self) -> u64 {
        self.base + self.size
    }

    /// Whether the address falls inside this region
    pub fn contains(&self, vaddr: u64) -> bool {
        vaddr >= self.base && vaddr < self.end()
    }

    /// Number of committed backing chunks
    pub fn committed_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    /// Bytes of backing storage actually committed
    pub fn committed_bytes(&self) -> u64 {
        self.chunks
            .iter()
            .filter_map(|c| c.as_ref().map(|b| b.len() as u64))
            .sum()
    }

    fn chunk_len(&self, index: usize) -> usize {
        let start = index as u64 * CHUNK_SIZE;
        (self.size - start).min(CHUNK_SIZE) as usize
    }

    fn chunk_mut(&mut self, index: usize) -> &mut [u8] {
        if self.chunks[index].is_none() {
            let len = self.chunk_len(index);
            self.chunks[index] = Some(vec![0u8; len].into_boxed_slice());
        }
        self.chunks[index].as_mut().unwrap()
    }

    /// Copy out of the region. `offset` is relative to `base`; the caller
    /// has already bounds-checked `offset + dst.len() <= size`.
    /// Uncommitted chunks read as zero.
    pub fn read_at(&self, offset: u64, dst: &mut [u8]) {
        let mut pos = 0usize;
        while pos < dst.len() {
            let off = offset + pos as u64;
            let index = (off / CHUNK_SIZE) as usize;
            let within = (off % CHUNK_SIZE) as usize;
            let avail = self.chunk_len(index) - within;
            let take = avail.min(dst.len() - pos);
            match &self.chunks[index] {
                Some(chunk) => dst[pos..pos + take].copy_from_slice(&chunk[within..within + take]),
                None => dst[pos..pos + take].fill(0),
            }
            pos += take;
        }
    }

    /// Copy into the region, committing chunks as needed. Bounds are the
    /// caller's responsibility, as with `read_at`.
    pub fn write_at(&mut self, offset: u64, src: &[u8]) {
        let mut pos = 0usize;
        while pos < src.len() {
            let off = offset + pos as u64;
            let index = (off / CHUNK_SIZE) as usize;
            let within = (off % CHUNK_SIZE) as usize;
            let avail = self.chunk_len(index) - within;
            let take = avail.min(src.len() - pos);
            self.chunk_mut(index)[within..within + take].copy_from_slice(&src[pos..pos + take]);
            pos += take;
        }
    }
}
