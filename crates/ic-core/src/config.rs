//! Emulator configuration
//!
//! Persistence and file plumbing live outside the core; embedders build a
//! `Config` and hand it in.

/// Log verbosity selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Emulator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Log verbosity
    pub log_level: LogLevel,
    /// Step the SPU fleet on worker threads instead of sequentially
    pub spu_parallel: bool,
    /// Target frame rate handed to the pacer
    pub target_fps: u32,
    /// Request vsync from the renderer
    pub vsync: bool,
    /// PPU instruction budget per frame
    pub ppu_instructions_per_frame: u32,
    /// Per-unit SPU instruction budget per frame
    pub spu_instructions_per_frame: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            spu_parallel: false,
            target_fps: 60,
            vsync: true,
            ppu_instructions_per_frame: 1000,
            spu_instructions_per_frame: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.target_fps, 60);
        assert_eq!(config.ppu_instructions_per_frame, 1000);
        assert_eq!(config.spu_instructions_per_frame, 500);
        assert!(!config.spu_parallel);
    }
}
