//! Conversions between native image pixels and the display surface.
//!
//! The crop box lives on the same surface as the displayed image, so crop-box
//! space and display space share units and origin.

use crate::geometry::{PixelRect, Point, Rect, Size};

pub const DEFAULT_VIEWPORT_BUDGET: f64 = 0.9;

/// How the native image is placed on the display surface.
///
/// The image is drawn at `native_size * scale` with its top-left corner at
/// `(offset_x, offset_y)`. `scale` is always finite and positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayTransform {
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl Default for DisplayTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl DisplayTransform {
    pub const fn identity() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    /// Returns `None` unless `scale` is finite and positive and both offsets are finite.
    pub fn new(scale: f64, offset_x: f64, offset_y: f64) -> Option<Self> {
        if !(scale.is_finite() && scale > 0.0 && offset_x.is_finite() && offset_y.is_finite()) {
            return None;
        }
        Some(Self {
            scale,
            offset_x,
            offset_y,
        })
    }

    /// Fits `native` into `budget` of `viewport` and centers it.
    ///
    /// Images smaller than the budget are shown at 1:1; they are never upscaled.
    pub fn fit(native: Size, viewport: Size, budget: f64) -> Self {
        if !native.is_positive() || !viewport.is_positive() {
            return Self::identity();
        }
        let budget = if budget.is_finite() && budget > 0.0 {
            budget.min(1.0)
        } else {
            DEFAULT_VIEWPORT_BUDGET
        };
        let scale = (viewport.width * budget / native.width)
            .min(viewport.height * budget / native.height)
            .min(1.0);
        let offset_x = (viewport.width - native.width * scale) / 2.0;
        let offset_y = (viewport.height - native.height * scale) / 2.0;
        Self::new(scale, offset_x, offset_y).unwrap_or_default()
    }

    pub const fn scale(&self) -> f64 {
        self.scale
    }

    pub const fn offset(&self) -> Point {
        Point::new(self.offset_x, self.offset_y)
    }

    pub fn to_display(&self, native: Point) -> Point {
        Point::new(
            native.x * self.scale + self.offset_x,
            native.y * self.scale + self.offset_y,
        )
    }

    pub fn to_native(&self, display: Point) -> Point {
        Point::new(
            (display.x - self.offset_x) / self.scale,
            (display.y - self.offset_y) / self.scale,
        )
    }

    pub fn rect_to_display(&self, native: Rect) -> Rect {
        let origin = self.to_display(Point::new(native.left, native.top));
        Rect::new(
            origin.x,
            origin.y,
            native.width * self.scale,
            native.height * self.scale,
        )
    }

    pub fn rect_to_native(&self, display: Rect) -> Rect {
        let origin = self.to_native(Point::new(display.left, display.top));
        Rect::new(
            origin.x,
            origin.y,
            display.width / self.scale,
            display.height / self.scale,
        )
    }

    /// Where the whole image sits on the display surface.
    pub fn image_bounds(&self, native: Size) -> Rect {
        self.rect_to_display(Rect::from_size(native))
    }

    /// Moves a display rect captured under `previous` so it covers the same
    /// native region under `self`.
    pub fn remap_from(&self, previous: &DisplayTransform, display: Rect) -> Rect {
        self.rect_to_display(previous.rect_to_native(display))
    }
}

/// Snaps a native-space rect to whole pixels inside a `width` x `height` image.
///
/// Edges are rounded to the nearest pixel boundary and clamped to the image, so
/// sub-pixel noise from the display round trip never shifts the crop by a pixel.
pub fn snap_to_pixels(native: Rect, width: u32, height: u32) -> PixelRect {
    let snap = |value: f64, max: u32| -> u32 {
        if !value.is_finite() {
            return 0;
        }
        value.round().clamp(0.0, f64::from(max)) as u32
    };
    let left = snap(native.left, width);
    let top = snap(native.top, height);
    let right = snap(native.right(), width);
    let bottom = snap(native.bottom(), height);
    PixelRect::new(
        left,
        top,
        right.saturating_sub(left),
        bottom.saturating_sub(top),
    )
}
