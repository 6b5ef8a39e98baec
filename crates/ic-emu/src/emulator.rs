//! The emulator orchestrator
//!
//! Owns memory, the syscall dispatcher, the PPU (interpreter + JIT), the
//! SPU fleet, the RSX processor and the frame pacer, and ticks them in
//! order each frame. Construction is ordered and each failure names the
//! component that caused it; destruction runs in reverse field order.

use std::path::Path;
use std::sync::Arc;

use ic_core::error::{EmulatorError, Result};
use ic_core::Config;
use ic_loader::{ElfLoader, SelfLoader};
use ic_lv2::SyscallDispatcher;
use ic_memory::MemoryManager;
use ic_ppu::{IrBlockCompiler, PpuInterpreter, PpuJit, PpuThread};
use ic_rsx::{CommandStream, NullRenderer, Renderer, RsxProcessor, SurfaceHandle};
use ic_spu::SpuFleet;
use tracing::{info, warn};

use crate::pacer::FramePacer;

/// Emulator run state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulatorState {
    /// No guest loaded or execution stopped
    Stopped,
    /// Frames are being ticked
    Running,
    /// Execution suspended, state retained
    Paused,
}

/// The emulator: every core component behind one handle.
pub struct Emulator {
    config: Config,
    state: EmulatorState,
    memory: Arc<MemoryManager>,
    syscalls: Arc<SyscallDispatcher>,
    interpreter: PpuInterpreter,
    ppu_thread: PpuThread,
    jit: PpuJit,
    spus: SpuFleet,
    rsx: RsxProcessor,
    stream: CommandStream,
    elf_loader: ElfLoader,
    pacer: FramePacer,
}

impl Emulator {
    /// Bring up every component with the default null renderer.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_renderer(config, Box::new(NullRenderer::new()))
    }

    /// Bring up every component against the given renderer. Order:
    /// memory, syscalls, PPU, SPUs, renderer/RSX, pacer.
    pub fn with_renderer(config: Config, renderer: Box<dyn Renderer>) -> Result<Self> {
        let memory = MemoryManager::new().map_err(|e| EmulatorError::InitFailed {
            component: "memory",
            reason: e.to_string(),
        })?;
        memory.dump_regions();

        let syscalls = Arc::new(SyscallDispatcher::new(memory.clone()));
        let interpreter = PpuInterpreter::new(memory.clone(), syscalls.clone());
        let ppu_thread = PpuThread::new(0);
        let jit = PpuJit::new(memory.clone(), Box::new(IrBlockCompiler));
        let spus = SpuFleet::new();
        let rsx = RsxProcessor::new(renderer);

        let mut pacer = FramePacer::new();
        pacer.set_target_fps(config.target_fps);

        info!(target: "emu", "emulator initialized");
        Ok(Self {
            config,
            state: EmulatorState::Stopped,
            memory,
            syscalls,
            interpreter,
            ppu_thread,
            jit,
            spus,
            rsx,
            stream: CommandStream::new(),
            elf_loader: ElfLoader::new(),
            pacer,
        })
    }

    pub fn state(&self) -> EmulatorState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load a guest executable. PKG and ISO containers are rejected;
    /// `.self` goes through the SELF path, anything else is plain ELF.
    /// On success the PPU starts from the image's entry point.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!(target: "emu", "loading {}", path.display());

        let lower = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if lower == "pkg" || lower == "iso" {
            return Err(EmulatorError::UnsupportedFormat(lower));
        }

        let entry = if lower == "self" {
            let mut self_loader = SelfLoader::new();
            self_loader.load(path, &self.memory, &mut self.elf_loader)?
        } else {
            self.elf_loader.load(path, &self.memory)?
        };

        self.ppu_thread.reset();
        self.ppu_thread.set_pc(entry);
        self.ppu_thread.start();
        self.jit.clear();
        self.state = EmulatorState::Running;

        info!(target: "emu", "guest entry point 0x{:08x}", entry);
        Ok(())
    }

    /// Run one frame: PPU (JIT-first), SPU fleet, RSX drain, present.
    pub fn run_frame(&mut self) {
        if self.state == EmulatorState::Paused {
            return;
        }

        self.jit.execute(
            &self.interpreter,
            &mut self.ppu_thread,
            self.config.ppu_instructions_per_frame,
        );

        let spu_budget = self.config.spu_instructions_per_frame;
        if self.config.spu_parallel {
            self.spus.execute_all_parallel(spu_budget);
        } else {
            self.spus.execute_all(spu_budget);
        }

        self.rsx.process(&mut self.stream);
        self.rsx.renderer_mut().draw_frame();
    }

    /// Run one paced frame; returns the suggested delay in milliseconds
    /// before the next call.
    pub fn tick_frame(&mut self) -> u32 {
        self.pacer.begin_frame();
        self.run_frame();
        self.pacer.end_frame_and_suggest_delay_ms()
    }

    pub fn start(&mut self) {
        self.state = EmulatorState::Running;
        info!(target: "emu", "started");
    }

    pub fn pause(&mut self) {
        if self.state == EmulatorState::Running {
            self.state = EmulatorState::Paused;
            info!(target: "emu", "paused");
        }
    }

    pub fn resume(&mut self) {
        if self.state == EmulatorState::Paused {
            self.state = EmulatorState::Running;
            info!(target: "emu", "resumed");
        }
    }

    /// Stop execution and report final statistics.
    pub fn shutdown(&mut self) {
        let stats = self.jit.stats();
        info!(
            target: "emu",
            "shutdown: {} PPU instructions, JIT {} hits / {} misses",
            self.ppu_thread.instructions_retired,
            stats.hits,
            stats.misses
        );
        self.state = EmulatorState::Stopped;
    }

    pub fn is_running(&self) -> bool {
        self.state == EmulatorState::Running
    }

    /// Hand the renderer a native surface
    pub fn attach_surface(&mut self, handle: SurfaceHandle) -> bool {
        self.rsx.renderer_mut().attach_surface(handle)
    }

    pub fn set_target_fps(&mut self, fps: u32) {
        self.config.target_fps = fps;
        self.pacer.set_target_fps(fps);
    }

    pub fn set_clear_color(&mut self, r: f32, g: f32, b: f32) {
        self.rsx.renderer_mut().set_clear_color(r, g, b);
    }

    pub fn set_vsync(&mut self, enabled: bool) {
        self.config.vsync = enabled;
        // Present-mode selection is the renderer's concern; the flag is
        // recorded for backends that query it at surface attach.
        if !enabled {
            warn!(target: "emu", "vsync off: frame pacing falls back to the pacer alone");
        }
    }

    // Component accessors for embedders and test harnesses

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn syscalls(&self) -> &Arc<SyscallDispatcher> {
        &self.syscalls
    }

    pub fn ppu(&self) -> &PpuThread {
        &self.ppu_thread
    }

    pub fn ppu_mut(&mut self) -> &mut PpuThread {
        &mut self.ppu_thread
    }

    pub fn jit(&self) -> &PpuJit {
        &self.jit
    }

    pub fn spus(&self) -> &SpuFleet {
        &self.spus
    }

    pub fn spus_mut(&mut self) -> &mut SpuFleet {
        &mut self.spus
    }

    pub fn rsx(&self) -> &RsxProcessor {
        &self.rsx
    }

    pub fn rsx_mut(&mut self) -> &mut RsxProcessor {
        &mut self.rsx
    }

    pub fn rsx_stream_mut(&mut self) -> &mut CommandStream {
        &mut self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emulator_init() {
        let emu = Emulator::new(Config::default()).unwrap();
        assert_eq!(emu.state(), EmulatorState::Stopped);
        assert_eq!(emu.memory().region_table().len(), 3);
    }

    #[test]
    fn test_state_transitions() {
        let mut emu = Emulator::new(Config::default()).unwrap();
        emu.start();
        assert!(emu.is_running());
        emu.pause();
        assert_eq!(emu.state(), EmulatorState::Paused);
        emu.resume();
        assert!(emu.is_running());
        emu.shutdown();
        assert_eq!(emu.state(), EmulatorState::Stopped);
    }

    #[test]
    fn test_rejects_pkg_and_iso() {
        let mut emu = Emulator::new(Config::default()).unwrap();
        assert!(matches!(
            emu.load("game.pkg"),
            Err(EmulatorError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            emu.load("disc.ISO"),
            Err(EmulatorError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_missing_file_surfaces_loader_error() {
        let mut emu = Emulator::new(Config::default()).unwrap();
        assert!(matches!(
            emu.load("/nonexistent.elf"),
            Err(EmulatorError::Loader(_))
        ));
        // A failed load leaves the emulator usable.
        assert_eq!(emu.state(), EmulatorState::Stopped);
        emu.run_frame();
    }

    #[test]
    fn test_run_frame_without_guest() {
        let mut emu = Emulator::new(Config::default()).unwrap();
        // Nothing loaded: the PPU halts on the empty entry page, SPUs
        // idle, the frame still presents.
        emu.run_frame();
        emu.run_frame();
    }

    #[test]
    fn test_tick_frame_returns_delay() {
        let mut emu = Emulator::new(Config::default()).unwrap();
        let delay = emu.tick_frame();
        assert!(delay <= 1000);
    }

    #[test]
    fn test_attach_surface_and_config() {
        let mut emu = Emulator::new(Config::default()).unwrap();
        assert!(emu.attach_surface(SurfaceHandle(0xBEEF)));
        emu.set_target_fps(30);
        assert_eq!(emu.config().target_fps, 30);
        emu.set_clear_color(0.1, 0.2, 0.3);
        emu.set_vsync(false);
        assert!(!emu.config().vsync);
    }
}
