//! Emulator orchestration for ironcell
//!
//! [`Emulator`] owns every core component and ticks them per frame;
//! [`FramePacer`] turns measured frame times into suggested delays.

pub mod emulator;
pub mod pacer;

pub use emulator::{Emulator, EmulatorState};
pub use pacer::FramePacer;
