//! Null backend for headless runs and tests
//!
//! Records every call so tests can assert on what the processor emitted.

use super::{Renderer, SurfaceHandle};
use crate::processor::{Primitive, Vertex};

/// Renderer that draws nothing and remembers everything
#[derive(Debug, Default)]
pub struct NullRenderer {
    /// Last clear color set, as (r, g, b)
    pub clear_color: (f32, f32, f32),
    /// Every geometry submission, in order
    pub draws: Vec<(Primitive, Vec<Vertex>)>,
    /// Frames presented
    pub frames_drawn: u64,
    /// Attached surface, if any
    pub surface: Option<SurfaceHandle>,
    /// Current output size
    pub size: (u32, u32),
}

impl NullRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total vertices submitted across all draw calls
    pub fn vertices_submitted(&self) -> usize {
        self.draws.iter().map(|(_, v)| v.len()).sum()
    }
}

impl Renderer for NullRenderer {
    fn set_clear_color(&mut self, r: f32, g: f32, b: f32) {
        self.clear_color = (r, g, b);
    }

    fn draw_vertices(&mut self, vertices: &[Vertex], primitive: Primitive) {
        self.draws.push((primitive, vertices.to_vec()));
    }

    fn draw_frame(&mut self) {
        self.frames_drawn += 1;
    }

    fn attach_surface(&mut self, handle: SurfaceHandle) -> bool {
        self.surface = Some(handle);
        true
    }

    fn resize(&mut self, width: u32, height: u32) -> bool {
        self.size = (width, height);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_renderer_records_calls() {
        let mut renderer = NullRenderer::new();
        renderer.set_clear_color(1.0, 0.5, 0.0);
        renderer.draw_frame();
        renderer.draw_frame();
        assert!(renderer.attach_surface(SurfaceHandle(0x1234)));
        assert!(renderer.resize(1280, 720));

        assert_eq!(renderer.clear_color, (1.0, 0.5, 0.0));
        assert_eq!(renderer.frames_drawn, 2);
        assert_eq!(renderer.surface, Some(SurfaceHandle(0x1234)));
        assert_eq!(renderer.size, (1280, 720));
    }

    #[test]
    fn test_null_renderer_records_geometry() {
        let mut renderer = NullRenderer::new();
        let vertices = [
            Vertex {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                color: 0xFF0000FF,
            },
            Vertex {
                x: 1.0,
                y: 0.0,
                z: 0.0,
                color: 0xFF0000FF,
            },
            Vertex {
                x: 0.0,
                y: 1.0,
                z: 0.0,
                color: 0xFF0000FF,
            },
        ];
        renderer.draw_vertices(&vertices, Primitive::Triangles);

        assert_eq!(renderer.draws.len(), 1);
        assert_eq!(renderer.draws[0].0, Primitive::Triangles);
        assert_eq!(renderer.draws[0].1.len(), 3);
        assert_eq!(renderer.vertices_submitted(), 3);
    }
}
