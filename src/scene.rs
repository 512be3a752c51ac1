//! Headless scene model driven by the window registry.
//!
//! Every known window is represented by a cube centred on that window. The
//! whole scene is shifted by the negated position of the current window, so
//! each context "looks" at the shared desktop from its own place on screen.

use crate::events::{RegistryEvent, WindowRecord, WindowShape};
use std::fmt;

/// Доля оставшегося расстояния, проходимая за один кадр
pub const FALLOFF: f64 = 0.05;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn eased_towards(self, target: Point, falloff: f64) -> Point {
        Point {
            x: self.x + (target.x - self.x) * falloff,
            y: self.y + (target.y - self.y) * falloff,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// Куб, изображающий одно окно
#[derive(Debug, Clone, PartialEq)]
pub struct CubeState {
    pub window_id: String,
    pub hue: f64,
    pub size: f64,
    pub position: Point,
    pub target: Point,
    /// Поворот вокруг осей X и Y в радианах
    pub rotation: (f64, f64),
}

impl CubeState {
    fn for_window(index: usize, record: &WindowRecord) -> Self {
        let center = center_of(&record.shape);
        Self {
            window_id: record.id.clone(),
            hue: index as f64 * 0.1,
            size: 100.0 + index as f64 * 50.0,
            position: center,
            target: center,
            rotation: (0.0, 0.0),
        }
    }

    /// Цвет куба: HSL(hue, 1.0, 0.5) в RGB
    pub fn rgb(&self) -> [u8; 3] {
        hsl_to_rgb(self.hue, 1.0, 0.5)
    }
}

fn center_of(shape: &WindowShape) -> Point {
    let (x, y) = shape.center();
    Point::new(x, y)
}

/// Состояние сцены одного контекста
#[derive(Debug, Clone, Default)]
pub struct SceneState {
    offset: Point,
    offset_target: Point,
    cubes: Vec<CubeState>,
}

impl SceneState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Геометрия текущего окна изменилась. Без сглаживания смещение сцены
    /// применяется сразу.
    pub fn on_shape_changed(&mut self, this_shape: &WindowShape, easing: bool) {
        self.offset_target = Point::new(-(this_shape.x as f64), -(this_shape.y as f64));
        if !easing {
            self.offset = self.offset_target;
        }
    }

    /// Набор окон изменился: пересобираем кубы
    pub fn on_windows_changed(&mut self, windows: &[WindowRecord]) {
        self.cubes = windows
            .iter()
            .enumerate()
            .map(|(index, record)| CubeState::for_window(index, record))
            .collect();
    }

    /// Применить событие реестра
    pub fn apply(&mut self, event: RegistryEvent, this_shape: Option<&WindowShape>, windows: &[WindowRecord]) {
        match event {
            RegistryEvent::ShapeChanged { easing } => {
                if let Some(shape) = this_shape {
                    self.on_shape_changed(shape, easing);
                }
            }
            RegistryEvent::WindowsChanged => self.on_windows_changed(windows),
        }
    }

    /// Шаг анимации одного кадра. `elapsed_secs` - время с начала анимации
    pub fn step(&mut self, windows: &[WindowRecord], elapsed_secs: f64) {
        // Набор мог измениться без WindowsChanged: реестр сам вернул свою запись
        if !self.tracks(windows) {
            self.on_windows_changed(windows);
        }

        self.offset = self.offset.eased_towards(self.offset_target, FALLOFF);

        for (cube, record) in self.cubes.iter_mut().zip(windows) {
            cube.target = center_of(&record.shape);
            cube.position = cube.position.eased_towards(cube.target, FALLOFF);
            cube.rotation = (elapsed_secs * 0.5, elapsed_secs * 0.3);
        }
    }

    /// Кубы построены ровно по этому списку окон и в том же порядке
    fn tracks(&self, windows: &[WindowRecord]) -> bool {
        self.cubes.len() == windows.len()
            && self
                .cubes
                .iter()
                .zip(windows)
                .all(|(cube, record)| cube.window_id == record.id)
    }

    pub fn offset(&self) -> Point {
        self.offset
    }

    pub fn offset_target(&self) -> Point {
        self.offset_target
    }

    pub fn cubes(&self) -> &[CubeState] {
        &self.cubes
    }

    /// Положение куба внутри области отображения текущего окна
    pub fn viewport_position(&self, cube: &CubeState) -> Point {
        Point::new(cube.position.x + self.offset.x, cube.position.y + self.offset.y)
    }
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> [u8; 3] {
    let h = h.rem_euclid(1.0);
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h * 6.0;
    let x = c * (1.0 - (hp.rem_euclid(2.0) - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [channel(r), channel(g), channel(b)]
}
