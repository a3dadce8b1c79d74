//! Crop box model, aspect presets and handle hit testing.

pub mod solver;

use crate::geometry::{Point, Rect, Size};

pub use solver::{
    apply_aspect_ratio, constrain, constrain_update, initial_crop_box, move_by, move_to,
    resize_from_handle, ChangedDimension, CropLimits, NOOP_EPSILON,
};

/// Minimum crop size in native pixels when nothing is configured.
pub const DEFAULT_MIN_CROP_SIZE: Size = Size::new(100.0, 100.0);

/// Ratios are compared with this tolerance after every mutation.
pub const ASPECT_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropPreset {
    Free,
    Ratio16x9,
    Ratio4x3,
    Ratio1x1,
    Ratio9x16,
    Original,
}

impl CropPreset {
    pub const ALL: [CropPreset; 6] = [
        Self::Free,
        Self::Ratio16x9,
        Self::Ratio4x3,
        Self::Ratio1x1,
        Self::Ratio9x16,
        Self::Original,
    ];

    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Ratio16x9 => "16:9",
            Self::Ratio4x3 => "4:3",
            Self::Ratio1x1 => "1:1",
            Self::Ratio9x16 => "9:16",
            Self::Original => "Original",
        }
    }

    pub const fn ratio(self) -> Option<(u32, u32)> {
        match self {
            Self::Free | Self::Original => None,
            Self::Ratio16x9 => Some((16, 9)),
            Self::Ratio4x3 => Some((4, 3)),
            Self::Ratio1x1 => Some((1, 1)),
            Self::Ratio9x16 => Some((9, 16)),
        }
    }

    /// Returns the width/height ratio this preset locks to.
    ///
    /// `Original` follows the native image dimensions, `Free` returns `None`.
    pub fn resolve_ratio(self, image_width: u32, image_height: u32) -> Option<f64> {
        let (numerator, denominator) = match self {
            Self::Free => return None,
            Self::Original => (image_width.max(1), image_height.max(1)),
            _ => self.ratio()?,
        };
        Some(f64::from(numerator) / f64::from(denominator))
    }
}

/// Optional aspect-ratio lock carried by a crop box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AspectLock {
    pub locked: bool,
    pub ratio: f64,
}

impl AspectLock {
    pub const fn free() -> Self {
        Self {
            locked: false,
            ratio: 0.0,
        }
    }

    /// A lock on `ratio`; non-finite or non-positive ratios yield a free lock.
    pub fn locked(ratio: f64) -> Self {
        Self::from_ratio(Some(ratio))
    }

    pub fn from_ratio(ratio: Option<f64>) -> Self {
        match ratio {
            Some(ratio) if ratio.is_finite() && ratio > 0.0 => Self {
                locked: true,
                ratio,
            },
            _ => Self::free(),
        }
    }

    pub fn active_ratio(&self) -> Option<f64> {
        (self.locked && self.ratio.is_finite() && self.ratio > 0.0).then_some(self.ratio)
    }
}

/// The user-manipulated selection, in display-space units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub aspect: AspectLock,
}

impl CropBox {
    pub const fn new(left: f64, top: f64, width: f64, height: f64, aspect: AspectLock) -> Self {
        Self {
            left,
            top,
            width,
            height,
            aspect,
        }
    }

    pub fn from_rect(rect: Rect, aspect: AspectLock) -> Self {
        Self::new(rect.left, rect.top, rect.width, rect.height, aspect)
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.left, self.top, self.width, self.height)
    }

    pub fn with_rect(self, rect: Rect) -> Self {
        Self::from_rect(rect, self.aspect)
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center(&self) -> Point {
        self.rect().center()
    }

    /// True when every field differs by less than `epsilon`.
    pub fn approx_eq(&self, other: &CropBox, epsilon: f64) -> bool {
        (self.left - other.left).abs() < epsilon
            && (self.top - other.top).abs() < epsilon
            && (self.width - other.width).abs() < epsilon
            && (self.height - other.height).abs() < epsilon
            && self.aspect.locked == other.aspect.locked
            && (!self.aspect.locked
                || (self.aspect.ratio - other.aspect.ratio).abs() < f64::EPSILON)
    }

    pub fn ratio_holds(&self) -> bool {
        match self.aspect.active_ratio() {
            Some(ratio) => {
                self.height > 0.0 && (self.width / self.height - ratio).abs() < ASPECT_TOLERANCE
            }
            None => true,
        }
    }

    /// Locked boxes only expose corner handles, so a drag can always move both dimensions.
    pub fn supports_corner_handles_only(&self) -> bool {
        self.aspect.locked
    }

    pub fn handle_position(&self, handle: ResizeHandle) -> Point {
        let (fx, fy) = handle.edge_factors();
        Point::new(
            self.left + self.width * fx,
            self.top + self.height * fy,
        )
    }

    /// Finds what a pointer at `point` would grab.
    ///
    /// Handles win over the body; each handle is a square of `handle_size` centered on its anchor.
    pub fn hit_test(&self, point: Point, handle_size: f64) -> Option<CropHit> {
        let reach = (handle_size / 2.0).max(1.0);
        let handles = if self.supports_corner_handles_only() {
            &ResizeHandle::CORNERS[..]
        } else {
            &ResizeHandle::ALL[..]
        };
        for &handle in handles {
            let anchor = self.handle_position(handle);
            if (point.x - anchor.x).abs() <= reach && (point.y - anchor.y).abs() <= reach {
                return Some(CropHit::Handle(handle));
            }
        }
        self.rect().contains(point).then_some(CropHit::Body)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResizeHandle {
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
}

impl ResizeHandle {
    pub const ALL: [ResizeHandle; 8] = [
        Self::TopLeft,
        Self::Top,
        Self::TopRight,
        Self::Right,
        Self::BottomRight,
        Self::Bottom,
        Self::BottomLeft,
        Self::Left,
    ];

    pub const CORNERS: [ResizeHandle; 4] = [
        Self::TopLeft,
        Self::TopRight,
        Self::BottomRight,
        Self::BottomLeft,
    ];

    /// Position of the handle as fractions of the box extent.
    pub const fn edge_factors(self) -> (f64, f64) {
        match self {
            Self::TopLeft => (0.0, 0.0),
            Self::Top => (0.5, 0.0),
            Self::TopRight => (1.0, 0.0),
            Self::Right => (1.0, 0.5),
            Self::BottomRight => (1.0, 1.0),
            Self::Bottom => (0.5, 1.0),
            Self::BottomLeft => (0.0, 1.0),
            Self::Left => (0.0, 0.5),
        }
    }

    pub const fn moves_horizontally(self) -> bool {
        !matches!(self, Self::Top | Self::Bottom)
    }

    pub const fn moves_vertically(self) -> bool {
        !matches!(self, Self::Left | Self::Right)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropHit {
    Handle(ResizeHandle),
    Body,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_preset_label_returns_expected_strings() {
        assert_eq!(CropPreset::Free.label(), "Free");
        assert_eq!(CropPreset::Ratio16x9.label(), "16:9");
        assert_eq!(CropPreset::Ratio4x3.label(), "4:3");
        assert_eq!(CropPreset::Ratio1x1.label(), "1:1");
        assert_eq!(CropPreset::Ratio9x16.label(), "9:16");
        assert_eq!(CropPreset::Original.label(), "Original");
    }

    #[test]
    fn crop_preset_all_has_no_duplicates() {
        for (i, a) in CropPreset::ALL.iter().enumerate() {
            for (j, b) in CropPreset::ALL.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "ALL has duplicate at indices {i} and {j}");
                }
            }
        }
    }

    #[test]
    fn resolve_ratio_handles_fixed_original_and_free() {
        assert_eq!(CropPreset::Ratio16x9.resolve_ratio(800, 600), Some(16.0 / 9.0));
        assert_eq!(CropPreset::Ratio1x1.resolve_ratio(800, 600), Some(1.0));
        assert_eq!(CropPreset::Original.resolve_ratio(1920, 1080), Some(1920.0 / 1080.0));
        assert_eq!(CropPreset::Original.resolve_ratio(0, 0), Some(1.0));
        assert_eq!(CropPreset::Free.resolve_ratio(800, 600), None);
    }

    #[test]
    fn aspect_lock_rejects_invalid_ratios() {
        assert_eq!(AspectLock::locked(0.0), AspectLock::free());
        assert_eq!(AspectLock::locked(f64::NAN), AspectLock::free());
        assert_eq!(AspectLock::from_ratio(None).active_ratio(), None);
        assert_eq!(AspectLock::locked(1.5).active_ratio(), Some(1.5));
    }

    #[test]
    fn hit_test_prefers_handles_over_body() {
        let crop = CropBox::new(100.0, 100.0, 200.0, 100.0, AspectLock::free());
        assert_eq!(
            crop.hit_test(Point::new(102.0, 99.0), 12.0),
            Some(CropHit::Handle(ResizeHandle::TopLeft))
        );
        assert_eq!(
            crop.hit_test(Point::new(200.0, 200.0), 12.0),
            Some(CropHit::Handle(ResizeHandle::Bottom))
        );
        assert_eq!(crop.hit_test(Point::new(150.0, 150.0), 12.0), Some(CropHit::Body));
        assert_eq!(crop.hit_test(Point::new(20.0, 20.0), 12.0), None);
    }

    #[test]
    fn locked_box_only_exposes_corner_handles() {
        let crop = CropBox::new(0.0, 0.0, 200.0, 200.0, AspectLock::locked(1.0));
        assert_eq!(crop.hit_test(Point::new(100.0, 0.0), 12.0), Some(CropHit::Body));
        assert_eq!(
            crop.hit_test(Point::new(200.0, 200.0), 12.0),
            Some(CropHit::Handle(ResizeHandle::BottomRight))
        );
    }
}
