use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_positive(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    pub fn scaled(&self, factor: f32) -> Size {
        Size::new(self.width * factor, self.height * factor)
    }

    pub(crate) fn require_positive(&self, what: &str) -> Result<(), EngineError> {
        if self.is_positive() {
            Ok(())
        } else {
            Err(EngineError::geometry(format!(
                "{what} must be positive, got {}x{}",
                self.width, self.height
            )))
        }
    }
}

/// Axis-aligned rectangle; `origin` is the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub fn new(origin: Point, size: Size) -> Self {
        Self { origin, size }
    }

    pub fn from_size(size: Size) -> Self {
        Self::new(Point::ORIGIN, size)
    }

    /// Grows the rectangle by `margin_x` on the left and right and `margin_y`
    /// on the top and bottom.
    pub fn expanded(&self, margin_x: f32, margin_y: f32) -> Rect {
        Rect {
            origin: Point::new(self.origin.x - margin_x, self.origin.y - margin_y),
            size: Size::new(
                self.size.width + margin_x * 2.0,
                self.size.height + margin_y * 2.0,
            ),
        }
    }
}

/// Uniform fit of a source space into a destination space. Never upscales.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitTransform {
    pub scale: f32,
    pub offset: Point,
}

impl FitTransform {
    pub fn fit(src: Size, dest: Size) -> Result<Self, EngineError> {
        let scale = fit_scale(src, dest)?;
        let offset = Point::new(
            (dest.width - src.width * scale) * 0.5,
            (dest.height - src.height * scale) * 0.5,
        );
        Ok(Self { scale, offset })
    }

    pub fn apply(&self, point: Point) -> Point {
        Point::new(
            point.x * self.scale + self.offset.x,
            point.y * self.scale + self.offset.y,
        )
    }

    /// Scales without the centering offset.
    pub fn apply_uncentered(&self, point: Point) -> Point {
        Point::new(point.x * self.scale, point.y * self.scale)
    }

    pub fn apply_size(&self, size: Size) -> Size {
        size.scaled(self.scale)
    }
}

pub fn fit_scale(src: Size, dest: Size) -> Result<f32, EngineError> {
    src.require_positive("source size")?;
    dest.require_positive("destination size")?;
    Ok((dest.width / src.width)
        .min(dest.height / src.height)
        .min(1.0))
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

pub fn lerp_point(a: Point, b: Point, t: f32) -> Point {
    Point::new(lerp(a.x, b.x, t), lerp(a.y, b.y, t))
}

pub fn lerp_size(a: Size, b: Size, t: f32) -> Size {
    Size::new(lerp(a.width, b.width, t), lerp(a.height, b.height, t))
}
