//! ELF64 big-endian PPC64 loader

use std::path::Path;

use ic_core::error::LoaderError;
use ic_memory::{MemoryManager, RegionFlags};
use tracing::{debug, info};

/// ELF magic bytes
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// 64-bit class in `e_ident[4]`
const ELFCLASS64: u8 = 2;
/// Big-endian data in `e_ident[5]`
const ELFDATA2MSB: u8 = 2;
/// PowerPC 64 machine type
const EM_PPC64: u16 = 21;

/// Program header types
pub mod pt {
    pub const NULL: u32 = 0;
    pub const LOAD: u32 = 1;
    pub const DYNAMIC: u32 = 2;
    pub const INTERP: u32 = 3;
    pub const NOTE: u32 = 4;
}

/// ELF file header (64-bit)
#[derive(Debug, Clone, Copy, Default)]
pub struct Elf64Header {
    pub e_ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

/// ELF program header (64-bit)
#[derive(Debug, Clone, Copy, Default)]
pub struct Elf64Phdr {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

/// Record of one materialized PT_LOAD segment, kept for diagnostics
#[derive(Debug, Clone)]
pub struct LoadedSegment {
    pub vaddr: u64,
    pub memsz: u64,
    pub filesz: u64,
    pub flags: RegionFlags,
}

fn be16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn be32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn be64(data: &[u8], offset: usize) -> u64 {
    u64::from_be_bytes(data[offset..offset + 8].try_into().unwrap())
}

/// Parses plain ELF images and populates guest memory
pub struct ElfLoader {
    entry_point: u64,
    segments: Vec<LoadedSegment>,
}

impl ElfLoader {
    pub fn new() -> Self {
        Self {
            entry_point: 0,
            segments: Vec::new(),
        }
    }

    /// Entry point from the last successful load
    pub fn entry_point(&self) -> u64 {
        self.entry_point
    }

    /// Segments materialized by the last successful load
    pub fn segments(&self) -> &[LoadedSegment] {
        &self.segments
    }

    /// Load an ELF file from disk into guest memory
    pub fn load(
        &mut self,
        path: impl AsRef<Path>,
        memory: &MemoryManager,
    ) -> Result<u64, LoaderError> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|_| LoaderError::NotFound(path.display().to_string()))?;
        self.load_bytes(&data, memory)
    }

    /// Load an in-memory ELF image into guest memory. Returns the entry
    /// point.
    pub fn load_bytes(
        &mut self,
        data: &[u8],
        memory: &MemoryManager,
    ) -> Result<u64, LoaderError> {
        let header = Self::parse_header(data)?;

        let phoff = header.e_phoff as usize;
        let phentsize = header.e_phentsize as usize;

        self.segments.clear();
        for i in 0..header.e_phnum as usize {
            let offset = phoff + i * phentsize;
            let phdr = Self::parse_phdr(data, offset)?;
            if phdr.p_type != pt::LOAD {
                continue;
            }

            debug!(
                target: "loader",
                "LOAD segment vaddr=0x{:08x} filesz=0x{:x} memsz=0x{:x} flags=0x{:x}",
                phdr.p_vaddr, phdr.p_filesz, phdr.p_memsz, phdr.p_flags
            );

            let flags = RegionFlags::from_elf(phdr.p_flags);
            self.map_segment(memory, &phdr, flags)?;

            // Copy the file-resident prefix; the memsz tail stays zero.
            if phdr.p_filesz > 0 {
                let start = phdr.p_offset as usize;
                let end = start + phdr.p_filesz as usize;
                if end > data.len() {
                    return Err(LoaderError::InvalidImage(format!(
                        "segment {} data out of bounds",
                        i
                    )));
                }
                memory.write(phdr.p_vaddr, &data[start..end])?;
            }

            self.segments.push(LoadedSegment {
                vaddr: phdr.p_vaddr,
                memsz: phdr.p_memsz,
                filesz: phdr.p_filesz,
                flags,
            });
        }

        if self.segments.is_empty() {
            return Err(LoaderError::InvalidImage(
                "no PT_LOAD segments".to_string(),
            ));
        }

        self.entry_point = header.e_entry;
        info!(
            target: "loader",
            "ELF loaded: entry=0x{:08x}, {} segments",
            self.entry_point,
            self.segments.len()
        );
        Ok(self.entry_point)
    }

    /// Map a segment, tolerating overlap with an already-declared
    /// architectural region (segments load into main RAM, which the
    /// memory map pre-declares).
    fn map_segment(
        &self,
        memory: &MemoryManager,
        phdr: &Elf64Phdr,
        flags: RegionFlags,
    ) -> Result<(), LoaderError> {
        use ic_core::error::MemoryError;

        match memory.map(phdr.p_vaddr, phdr.p_memsz, flags | RegionFlags::WRITE) {
            Ok(()) | Err(MemoryError::MapOverlap { .. }) => Ok(()),
            Err(e) => Err(LoaderError::MemoryMapFailed(e)),
        }
    }

    /// Parse and validate the ELF header. All multi-byte fields are
    /// big-endian on disk.
    pub fn parse_header(data: &[u8]) -> Result<Elf64Header, LoaderError> {
        if data.len() < 64 {
            return Err(LoaderError::TruncatedHeader(data.len()));
        }

        let mut header = Elf64Header::default();
        header.e_ident.copy_from_slice(&data[0..16]);

        if header.e_ident[0..4] != ELF_MAGIC {
            return Err(LoaderError::BadMagic(be32(data, 0)));
        }
        if header.e_ident[4] != ELFCLASS64 {
            return Err(LoaderError::InvalidImage("not a 64-bit ELF".to_string()));
        }
        if header.e_ident[5] != ELFDATA2MSB {
            return Err(LoaderError::InvalidImage("not big-endian".to_string()));
        }

        header.e_type = be16(data, 16);
        header.e_machine = be16(data, 18);
        header.e_version = be32(data, 20);
        header.e_entry = be64(data, 24);
        header.e_phoff = be64(data, 32);
        header.e_shoff = be64(data, 40);
        header.e_flags = be32(data, 48);
        header.e_ehsize = be16(data, 52);
        header.e_phentsize = be16(data, 54);
        header.e_phnum = be16(data, 56);
        header.e_shentsize = be16(data, 58);
        header.e_shnum = be16(data, 60);
        header.e_shstrndx = be16(data, 62);

        if header.e_machine != EM_PPC64 {
            return Err(LoaderError::WrongArchitecture(header.e_machine));
        }

        Ok(header)
    }

    fn parse_phdr(data: &[u8], offset: usize) -> Result<Elf64Phdr, LoaderError> {
        if offset + 56 > data.len() {
            return Err(LoaderError::InvalidImage(
                "program header out of bounds".to_string(),
            ));
        }

        Ok(Elf64Phdr {
            p_type: be32(data, offset),
            p_flags: be32(data, offset + 4),
            p_offset: be64(data, offset + 8),
            p_vaddr: be64(data, offset + 16),
            p_paddr: be64(data, offset + 24),
            p_filesz: be64(data, offset + 32),
            p_memsz: be64(data, offset + 40),
            p_align: be64(data, offset + 48),
        })
    }
}

impl Default for ElfLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a minimal big-endian PPC64 ELF image in memory. Shared by the
/// loader tests and the SELF tests.
#[cfg(any(test, feature = "testutil"))]
pub fn build_test_elf(entry: u64, vaddr: u64, code: &[u8]) -> Vec<u8> {
    let mut image = vec![0u8; 64 + 56];

    // e_ident
    image[0..4].copy_from_slice(&ELF_MAGIC);
    image[4] = ELFCLASS64;
    image[5] = ELFDATA2MSB;
    image[6] = 1; // EV_CURRENT

    image[16..18].copy_from_slice(&2u16.to_be_bytes()); // ET_EXEC
    image[18..20].copy_from_slice(&EM_PPC64.to_be_bytes());
    image[20..24].copy_from_slice(&1u32.to_be_bytes());
    image[24..32].copy_from_slice(&entry.to_be_bytes());
    image[32..40].copy_from_slice(&64u64.to_be_bytes()); // e_phoff
    image[52..54].copy_from_slice(&64u16.to_be_bytes()); // e_ehsize
    image[54..56].copy_from_slice(&56u16.to_be_bytes()); // e_phentsize
    image[56..58].copy_from_slice(&1u16.to_be_bytes()); // e_phnum

    let file_offset = image.len() as u64;
    let phdr_base = 64;
    let memsz = (code.len() as u64).max(0x1000);
    image[phdr_base..phdr_base + 4].copy_from_slice(&pt::LOAD.to_be_bytes());
    image[phdr_base + 4..phdr_base + 8].copy_from_slice(&0x7u32.to_be_bytes()); // RWX
    image[phdr_base + 8..phdr_base + 16].copy_from_slice(&file_offset.to_be_bytes());
    image[phdr_base + 16..phdr_base + 24].copy_from_slice(&vaddr.to_be_bytes());
    image[phdr_base + 32..phdr_base + 40].copy_from_slice(&(code.len() as u64).to_be_bytes());
    image[phdr_base + 40..phdr_base + 48].copy_from_slice(&memsz.to_be_bytes());

    image.extend_from_slice(code);
    image
}
