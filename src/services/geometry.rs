use crate::events::WindowShape;
use parking_lot::RwLock;
use std::sync::Arc;

/// GeometrySource provides the live geometry of the current context.
///
/// Responsibilities (strict):
/// - Report where this context's window is right now.
/// - Do NOT cache or diff; change detection belongs to WindowRegistry.
pub trait GeometrySource: Send {
    fn current_shape(&mut self) -> WindowShape;
}

/// Geometry handle that a host (or a test) moves from the outside.
///
/// Clones share the same underlying shape.
#[derive(Clone, Default)]
pub struct SharedGeometry {
    shape: Arc<RwLock<WindowShape>>,
}

impl SharedGeometry {
    pub fn new(shape: WindowShape) -> Self {
        Self {
            shape: Arc::new(RwLock::new(shape)),
        }
    }

    pub fn get(&self) -> WindowShape {
        *self.shape.read()
    }

    pub fn set(&self, shape: WindowShape) {
        *self.shape.write() = shape;
    }

    pub fn move_to(&self, x: i32, y: i32) {
        let mut shape = self.shape.write();
        shape.x = x;
        shape.y = y;
    }
}

impl GeometrySource for SharedGeometry {
    fn current_shape(&mut self) -> WindowShape {
        self.get()
    }
}

/// Scripted geometry for emulated windows: cycles through `shapes`,
/// advancing to the next one every `frames_per_step` reads.
pub struct ScriptedGeometry {
    shapes: Vec<WindowShape>,
    frames_per_step: u32,
    frame: u32,
    index: usize,
}

impl ScriptedGeometry {
    pub fn new(shapes: Vec<WindowShape>, frames_per_step: u32) -> Self {
        Self {
            shapes,
            frames_per_step: frames_per_step.max(1),
            frame: 0,
            index: 0,
        }
    }

    /// Square path around `base`: right, down, left, up
    pub fn orbit(base: WindowShape, step_px: i32, frames_per_step: u32) -> Self {
        let shapes = vec![
            base,
            base.translated(step_px, 0),
            base.translated(step_px, step_px),
            base.translated(0, step_px),
        ];
        Self::new(shapes, frames_per_step)
    }
}

impl GeometrySource for ScriptedGeometry {
    fn current_shape(&mut self) -> WindowShape {
        let Some(&shape) = self.shapes.get(self.index) else {
            return WindowShape::default();
        };

        self.frame += 1;
        if self.frame >= self.frames_per_step {
            self.frame = 0;
            self.index = (self.index + 1) % self.shapes.len();
        }
        shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_geometry_is_shared_between_clones() {
        let geometry = SharedGeometry::new(WindowShape::new(0, 0, 800, 600));
        let mut source = geometry.clone();

        geometry.move_to(100, -20);
        assert_eq!(source.current_shape(), WindowShape::new(100, -20, 800, 600));
    }

    #[test]
    fn scripted_geometry_advances_every_n_frames() {
        let base = WindowShape::new(0, 0, 100, 100);
        let mut source = ScriptedGeometry::orbit(base, 10, 2);

        assert_eq!(source.current_shape(), base);
        assert_eq!(source.current_shape(), base);
        assert_eq!(source.current_shape(), base.translated(10, 0));
        assert_eq!(source.current_shape(), base.translated(10, 0));
        assert_eq!(source.current_shape(), base.translated(10, 10));
        source.current_shape();
        source.current_shape();
        source.current_shape();
        // Полный круг
        assert_eq!(source.current_shape(), base);
    }

    #[test]
    fn empty_script_yields_default() {
        let mut source = ScriptedGeometry::new(Vec::new(), 1);
        assert_eq!(source.current_shape(), WindowShape::default());
    }
}
