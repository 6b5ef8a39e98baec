//! RSX (Reality Synthesizer) emulation for ironcell
//!
//! The guest produces a FIFO of method-tagged 32-bit words; the processor
//! drains it, tracks draw state and talks to an abstract [`Renderer`].

pub mod backend;
pub mod command;
pub mod methods;
pub mod processor;
pub mod stream;

pub use backend::{NullRenderer, Renderer, SurfaceHandle};
pub use command::RsxCommand;
pub use processor::{DrawState, Primitive, RsxProcessor, Vertex};
pub use stream::CommandStream;
