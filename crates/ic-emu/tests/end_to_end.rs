//! End-to-end emulator scenarios

use ic_core::Config;
use ic_emu::{Emulator, EmulatorState};
use ic_loader::elf::build_test_elf;
use ic_rsx::methods;

fn write_temp(name: &str, data: &[u8]) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(name);
    std::fs::write(&path, data).unwrap();
    path
}

#[test]
fn test_memory_round_trip_through_emulator() {
    let emu = Emulator::new(Config::default()).unwrap();
    let memory = emu.memory();

    memory.write_u32(0x0001_0000, 0xDEADBEEF).unwrap();
    assert_eq!(memory.read_u32(0x0001_0000).unwrap(), 0xDEADBEEF);

    let mut raw = [0u8; 4];
    memory.read(0x0001_0000, &mut raw).unwrap();
    assert_eq!(raw, [0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn test_load_elf_and_execute() {
    // addi r3, r0, 42; sc(205) would need r0; keep it simple:
    // addi r3, r0, 42 then loop on itself.
    let entry = 0x0001_0000u64;
    let code: Vec<u8> = [
        0x3860_002Au32, // addi r3, r0, 42
        0x4800_0000u32, // b 0 (spin)
    ]
    .iter()
    .flat_map(|w| w.to_be_bytes())
    .collect();

    let image = build_test_elf(entry, entry, &code);
    let path = write_temp("ironcell_e2e.elf", &image);

    let mut emu = Emulator::new(Config::default()).unwrap();
    emu.load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(emu.state(), EmulatorState::Running);
    assert_eq!(emu.ppu().pc(), entry);
    // The first instruction of the segment is readable at the entry.
    assert_eq!(emu.memory().read_u32(entry).unwrap(), 0x3860_002A);

    emu.run_frame();
    assert_eq!(emu.ppu().gpr(3), 42);
    // The spin keeps the PC parked on the branch.
    assert_eq!(emu.ppu().pc(), entry + 4);
    assert!(!emu.ppu().is_halted());
}

#[test]
fn test_self_container_load() {
    let entry = 0x0001_0000u64;
    let code: Vec<u8> = 0x3860_0007u32.to_be_bytes().to_vec();
    let elf = build_test_elf(entry, entry, &code);

    // Wrap the ELF in a one-section unencrypted SELF container.
    let mut container = Vec::new();
    container.extend_from_slice(&0x53454C46u32.to_be_bytes()); // 'SELF'
    container.extend_from_slice(&1u32.to_be_bytes()); // version
    container.extend_from_slice(&0u32.to_be_bytes()); // flags
    container.extend_from_slice(&40u32.to_be_bytes()); // header_size
    container.extend_from_slice(&32u32.to_be_bytes()); // sec_header_size
    container.extend_from_slice(&1u16.to_be_bytes()); // sec_header_count
    container.extend_from_slice(&0u16.to_be_bytes()); // key_revision
    container.extend_from_slice(&(elf.len() as u64).to_be_bytes()); // content_size
    container.extend_from_slice(&0u64.to_be_bytes()); // self_offset
    let payload_offset = 40u64 + 32 + 32; // header + table + key metadata
    container.extend_from_slice(&payload_offset.to_be_bytes());
    container.extend_from_slice(&(elf.len() as u64).to_be_bytes());
    container.extend_from_slice(&0u32.to_be_bytes()); // flags: plain
    container.extend_from_slice(&0u32.to_be_bytes()); // index
    container.extend_from_slice(&0u64.to_be_bytes()); // padding
    container.extend_from_slice(&[0u8; 32]); // key + IV metadata
    container.extend_from_slice(&elf);

    let path = write_temp("ironcell_e2e.self", &container);
    let mut emu = Emulator::new(Config::default()).unwrap();
    emu.load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(emu.ppu().pc(), entry);
    emu.run_frame();
    assert_eq!(emu.ppu().gpr(3), 7);
}

#[test]
fn test_rsx_stream_drained_per_frame() {
    let mut emu = Emulator::new(Config::default()).unwrap();

    emu.rsx_stream_mut()
        .write(methods::CLEAR_COLOR, &[0xFF0000FF])
        .unwrap();
    emu.run_frame();

    assert_eq!(emu.rsx().state().clear_color, 0xFF0000FF);
    assert!(emu.rsx_stream_mut().is_empty());
}

#[test]
fn test_spu_fleet_ticks_in_frame() {
    let mut emu = Emulator::new(Config::default()).unwrap();

    // il r1, 0x42 on SPU0
    let il = (0x20u32 << 24) | (1 << 19) | 0x42;
    emu.spus_mut().unit_mut(0).ls_write_u32(0, il);
    emu.run_frame();

    assert_eq!(emu.spus().unit(0).reg(1), [0x42, 0, 0, 0]);
}

#[test]
fn test_parallel_spu_config() {
    let mut config = Config::default();
    config.spu_parallel = true;
    let mut emu = Emulator::new(config).unwrap();

    let il = (0x20u32 << 24) | (2 << 19) | 0x99;
    for i in 0..6 {
        emu.spus_mut().unit_mut(i).ls_write_u32(0, il);
    }
    emu.run_frame();

    for i in 0..6 {
        assert_eq!(emu.spus().unit(i).reg(2), [0x99, 0, 0, 0]);
    }
}

#[test]
fn test_jit_engages_across_frames() {
    let entry = 0x0001_0000u64;
    let code: Vec<u8> = [
        0x3863_0001u32, // addi r3, r3, 1
        0x4BFF_FFFCu32, // b -4
    ]
    .iter()
    .flat_map(|w| w.to_be_bytes())
    .collect();

    let image = build_test_elf(entry, entry, &code);
    let path = write_temp("ironcell_jit.elf", &image);

    let mut config = Config::default();
    config.ppu_instructions_per_frame = 100;
    let mut emu = Emulator::new(config).unwrap();
    emu.load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    emu.run_frame();
    emu.run_frame();

    // The two-instruction loop block compiles and is dispatched hot.
    let stats = emu.jit().stats();
    assert!(stats.hits > 0, "expected JIT hits, got {:?}", stats);
    assert!(emu.ppu().gpr(3) >= 50);
}
