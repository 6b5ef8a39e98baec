//! SELF (signed ELF) loader
//!
//! Parses the container, runs each section through the optional decryptor
//! and the zlib decompressor, assembles a plain ELF image and hands it to
//! the ELF path. Key material never lives in this crate: decryption is a
//! collaborator behind [`SelfDecryptor`].

use std::io::Read;
use std::path::Path;

use flate2::read::ZlibDecoder;
use ic_core::error::LoaderError;
use ic_memory::MemoryManager;
use tracing::{debug, info};

use crate::elf::ElfLoader;

/// SELF magic: 'SELF' as a big-endian u32
pub const SELF_MAGIC: u32 = 0x53454C46;

/// Fixed header size floor
const MIN_HEADER_SIZE: u32 = 40;

/// Section flag bit 0: encrypted
const SECTION_ENCRYPTED: u32 = 0x1;
/// Section flag bit 1: compressed
const SECTION_COMPRESSED: u32 = 0x2;

/// SELF container header
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfHeader {
    pub magic: u32,
    pub version: u32,
    pub flags: u32,
    pub header_size: u32,
    pub sec_header_size: u32,
    pub sec_header_count: u16,
    pub key_revision: u16,
    pub content_size: u64,
    pub self_offset: u64,
}

/// One section descriptor (32 bytes on disk)
#[derive(Debug, Clone, Copy)]
pub struct SelfSectionInfo {
    pub offset: u64,
    pub size: u64,
    pub flags: u32,
    pub index: u32,
}

impl SelfSectionInfo {
    pub fn is_encrypted(&self) -> bool {
        self.flags & SECTION_ENCRYPTED != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & SECTION_COMPRESSED != 0
    }
}

/// Trailing AES key/IV metadata, when present
#[derive(Debug, Clone, Copy)]
pub struct SelfMetadata {
    pub aes_key: [u8; 16],
    pub aes_iv: [u8; 16],
}

/// External decryption collaborator: `(cipher, key, iv) -> plaintext`
pub trait SelfDecryptor {
    fn decrypt(
        &self,
        cipher: &[u8],
        key: &[u8; 16],
        iv: &[u8; 16],
    ) -> Result<Vec<u8>, LoaderError>;
}

/// SELF container loader
pub struct SelfLoader {
    header: SelfHeader,
    sections: Vec<SelfSectionInfo>,
    metadata: Option<SelfMetadata>,
    decryptor: Option<Box<dyn SelfDecryptor>>,
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

impl SelfLoader {
    pub fn new() -> Self {
        Self {
            header: SelfHeader::default(),
            sections: Vec::new(),
            metadata: None,
            decryptor: None,
        }
    }

    /// Attach a decryption collaborator for encrypted sections
    pub fn with_decryptor(mut self, decryptor: Box<dyn SelfDecryptor>) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    pub fn header(&self) -> &SelfHeader {
        &self.header
    }

    pub fn sections(&self) -> &[SelfSectionInfo] {
        &self.sections
    }

    pub fn metadata(&self) -> Option<&SelfMetadata> {
        self.metadata.as_ref()
    }

    /// Whether a buffer starts with the SELF magic
    pub fn is_self(data: &[u8]) -> bool {
        data.len() >= 4 && be32(data, 0) == SELF_MAGIC
    }

    /// Load a SELF file from disk, assemble the embedded ELF and load it
    /// into guest memory. Returns the entry point.
    pub fn load(
        &mut self,
        path: impl AsRef<Path>,
        memory: &MemoryManager,
        elf_loader: &mut ElfLoader,
    ) -> Result<u64, LoaderError> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|_| LoaderError::NotFound(path.display().to_string()))?;
        let elf_image = self.extract_elf(&data)?;
        elf_loader.load_bytes(&elf_image, memory)
    }

    /// Parse the container and assemble the plain ELF image
    pub fn extract_elf(&mut self, data: &[u8]) -> Result<Vec<u8>, LoaderError> {
        self.parse_header(data)?;
        self.parse_sections(data)?;
        self.parse_metadata(data);

        info!(
            target: "loader",
            "SELF: version=0x{:x} sections={} key_revision={}",
            self.header.version, self.header.sec_header_count, self.header.key_revision
        );

        let mut elf_image = Vec::new();
        for section in &self.sections {
            let start = section.offset as usize;
            let end = start + section.size as usize;
            if end > data.len() {
                return Err(LoaderError::InvalidImage(format!(
                    "section {} extends beyond file",
                    section.index
                )));
            }
            let raw = &data[start..end];

            let decrypted = if section.is_encrypted() {
                let decryptor = self
                    .decryptor
                    .as_ref()
                    .ok_or(LoaderError::UnsupportedEncryption)?;
                let metadata = self
                    .metadata
                    .as_ref()
                    .ok_or(LoaderError::UnsupportedEncryption)?;
                decryptor.decrypt(raw, &metadata.aes_key, &metadata.aes_iv)?
            } else {
                raw.to_vec()
            };

            let plain = if section.is_compressed() {
                let mut decoder = ZlibDecoder::new(&decrypted[..]);
                let mut decompressed = Vec::new();
                decoder.read_to_end(&mut decompressed).map_err(|e| {
                    LoaderError::InvalidImage(format!(
                        "section {} decompression failed: {}",
                        section.index, e
                    ))
                })?;
                decompressed
            } else {
                decrypted
            };

            debug!(
                target: "loader",
                "section {}: {} bytes (encrypted={}, compressed={})",
                section.index,
                plain.len(),
                section.is_encrypted(),
                section.is_compressed()
            );
            elf_image.extend_from_slice(&plain);
        }

        if elf_image.len() < 4 || elf_image[0..4] != crate::elf::ELF_MAGIC {
            return Err(LoaderError::InvalidImage(
                "assembled image is not an ELF".to_string(),
            ));
        }

        info!(target: "loader", "assembled {} byte ELF from SELF", elf_image.len());
        Ok(elf_image)
    }

    fn parse_header(&mut self, data: &[u8]) -> Result<(), LoaderError> {
        if data.len() < MIN_HEADER_SIZE as usize {
            return Err(LoaderError::TruncatedHeader(data.len()));
        }

        let magic = be32(data, 0);
        if magic != SELF_MAGIC {
            return Err(LoaderError::BadMagic(magic));
        }

        self.header = SelfHeader {
            magic,
            version: be32(data, 4),
            flags: be32(data, 8),
            header_size: be32(data, 12),
            sec_header_size: be32(data, 16),
            sec_header_count: be16(data, 20),
            key_revision: be16(data, 22),
            content_size: be64(data, 24),
            self_offset: be64(data, 32),
        };

        if self.header.header_size < MIN_HEADER_SIZE {
            return Err(LoaderError::InvalidImage(format!(
                "header size {} below minimum",
                self.header.header_size
            )));
        }

        Ok(())
    }

    fn parse_sections(&mut self, data: &[u8]) -> Result<(), LoaderError> {
        self.sections.clear();

        let mut offset = self.header.header_size as usize;
        for i in 0..self.header.sec_header_count {
            if offset + 32 > data.len() {
                return Err(LoaderError::InvalidImage(format!(
                    "section descriptor {} out of bounds",
                    i
                )));
            }

            let section = SelfSectionInfo {
                offset: be64(data, offset),
                size: be64(data, offset + 8),
                flags: be32(data, offset + 16),
                index: be32(data, offset + 20),
            };
            debug!(
                target: "loader",
                "section {}: offset=0x{:x} size=0x{:x} flags=0x{:x}",
                i, section.offset, section.size, section.flags
            );
            self.sections.push(section);
            offset += 32;
        }

        Ok(())
    }

    /// Key/IV metadata sits after the section table when present
    fn parse_metadata(&mut self, data: &[u8]) {
        let offset =
            self.header.header_size as usize + self.header.sec_header_count as usize * 32;

        if offset + 32 <= data.len() {
            let mut aes_key = [0u8; 16];
            let mut aes_iv = [0u8; 16];
            aes_key.copy_from_slice(&data[offset..offset + 16]);
            aes_iv.copy_from_slice(&data[offset + 16..offset + 32]);
            self.metadata = Some(SelfMetadata { aes_key, aes_iv });
            debug!(target: "loader", "key/IV metadata found at 0x{:x}", offset);
        } else {
            self.metadata = None;
            debug!(target: "loader", "no key/IV metadata present");
        }
    }
}

impl Default for SelfLoader {
    fn default() -> Self {
        Self::new()
    }
}
