//! Geometry Kernel - Canvas Space
//!
//! All element geometry lives in a fixed logical canvas (A4 landscape ratio).
//! Pointer positions measured against a scaled on-screen canvas are converted
//! here, and only here.

use serde::{Deserialize, Serialize};

/// A4 landscape: 297mm x 210mm
pub const CANVAS_RATIO: f64 = 297.0 / 210.0;
pub const CANVAS_WIDTH: f64 = 1000.0;
pub const CANVAS_HEIGHT: f64 = CANVAS_WIDTH / CANVAS_RATIO;

/// Largest surface edge, in pixels, the renderer will allocate.
pub const MAX_SURFACE_EXTENT: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Inclusive containment: edges count as inside.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x
            && p.x <= self.x + self.width
            && p.y >= self.y
            && p.y <= self.y + self.height
    }
}

/// Where the canvas element is displayed on screen, in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    /// A display rect that shows the canvas 1:1 at the origin.
    pub fn unscaled() -> Self {
        Self::new(0.0, 0.0, CANVAS_WIDTH, CANVAS_HEIGHT)
    }
}

/// Convert a screen pointer position into canvas-space coordinates.
///
/// A degenerate display rect (zero, negative or non-finite size) is treated
/// as unscaled on that axis.
pub fn to_canvas_space(pointer_x: f64, pointer_y: f64, display: &DisplayRect) -> Point {
    to_canvas_space_sized(pointer_x, pointer_y, display, CANVAS_WIDTH, CANVAS_HEIGHT)
}

/// `to_canvas_space` for a canvas authored at `canvas_width` x `canvas_height`.
pub fn to_canvas_space_sized(
    pointer_x: f64,
    pointer_y: f64,
    display: &DisplayRect,
    canvas_width: f64,
    canvas_height: f64,
) -> Point {
    let scale_x = axis_scale(canvas_width, display.width);
    let scale_y = axis_scale(canvas_height, display.height);
    Point {
        x: (pointer_x - display.left) * scale_x,
        y: (pointer_y - display.top) * scale_y,
    }
}

fn axis_scale(logical: f64, displayed: f64) -> f64 {
    if displayed.is_finite() && displayed > 0.0 {
        logical / displayed
    } else {
        1.0
    }
}

/// Clamp a box origin so the box stays inside `(0, 0, limit_w, limit_h)`.
///
/// A box larger than the canvas on some axis pins to 0 on that axis.
pub fn clamp_to_canvas(origin: Point, width: f64, height: f64, limit_w: f64, limit_h: f64) -> Point {
    Point {
        x: clamp_axis(origin.x, width, limit_w),
        y: clamp_axis(origin.y, height, limit_h),
    }
}

fn clamp_axis(value: f64, extent: f64, limit: f64) -> f64 {
    let max = (limit - extent).max(0.0);
    if !value.is_finite() || !max.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, max)
}
