//! RSX method IDs (subset)

pub const NOTIFY: u16 = 0x0104;
pub const CLEAR_COLOR: u16 = 0x0A0C;
pub const VIEWPORT_HORIZONTAL: u16 = 0x0A20;
pub const VIEWPORT_VERTICAL: u16 = 0x0A24;
pub const BEGIN_END: u16 = 0x0ABC;
pub const BLEND_FUNC: u16 = 0x0B04;
pub const BLEND_EQUATION: u16 = 0x0B0C;
pub const CULL_FACE: u16 = 0x0B44;
pub const SCISSOR_HORIZONTAL: u16 = 0x0C90;
pub const SCISSOR_VERTICAL: u16 = 0x0C94;
pub const WAIT_FOR_IDLE: u16 = 0x1DFC;

/// Cull-face value that disables culling entirely (front-and-back)
pub const CULL_FRONT_AND_BACK: u32 = 0x0404;
