//! Executable loaders for ironcell
//!
//! Plain big-endian PPC64 ELF and signed SELF containers. The SELF path
//! assembles a plain ELF image and feeds it back through the ELF loader;
//! decryption is an external collaborator reached through
//! [`self_file::SelfDecryptor`].

pub mod elf;
pub mod self_file;

pub use elf::{ElfLoader, LoadedSegment};
pub use self_file::{SelfDecryptor, SelfLoader};
