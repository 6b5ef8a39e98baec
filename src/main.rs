//! ironcell - Cell Broadband Engine emulator
//!
//! CLI test harness: brings the core up, optionally loads a guest
//! executable, runs a bounded number of frames and reports state.
//! Exits 0 on success and 1 on initialization failure; load failures are
//! reported but do not abort the process.

use std::process::ExitCode;

use anyhow::Context;
use ic_core::Config;
use ic_emu::Emulator;
use tracing::{error, info};

fn main() -> ExitCode {
    let config = Config::default();
    ic_core::logging::init(&config);

    info!("starting ironcell");

    let mut emulator = match Emulator::new(config).context("emulator initialization") {
        Ok(emulator) => emulator,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(1);
        }
    };

    let mut args = std::env::args().skip(1);
    if let Some(path) = args.next() {
        match emulator.load(&path) {
            Ok(()) => info!("loaded {}", path),
            Err(e) => error!("failed to load {}: {}", path, e),
        }
    } else {
        // No guest: exercise the core so a bare run still proves the build.
        let memory = emulator.memory();
        memory
            .write_u32(0x0001_0000, 0xDEADBEEF)
            .expect("main memory must accept writes");
        assert_eq!(memory.read_u32(0x0001_0000).unwrap(), 0xDEADBEEF);
        info!("memory self-test passed");
    }

    let frames: u32 = args
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(60);

    for _ in 0..frames {
        let delay_ms = emulator.tick_frame();
        if emulator.ppu().is_halted() {
            info!("PPU halted at 0x{:08x}", emulator.ppu().pc());
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(delay_ms as u64));
    }

    info!(
        "done: {} PPU instructions retired, {} JIT blocks cached",
        emulator.ppu().instructions_retired,
        emulator.jit().block_count()
    );
    emulator.shutdown();
    ExitCode::SUCCESS
}
