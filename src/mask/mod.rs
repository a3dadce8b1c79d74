//! Dimmed overlay outside the crop box.
//!
//! The mask is a pure function of the crop box and the canvas size. The
//! compositor caches the last geometry together with the box revision it was
//! built from, so callers can tell whether a repaint would show a stale mask.

#[cfg(feature = "gtk")]
mod cairo;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::crop::CropBox;
use crate::geometry::{Color, Point, Rect, RgbaColor, Size};

pub const DEFAULT_MASK_OPACITY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaskMode {
    /// Four bands around the box.
    #[default]
    Bands,
    /// One canvas-sized path with the box cut out (even-odd fill).
    Cutout,
}

/// Top, bottom, left and right bands around the box. Bands never have negative size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskBands {
    pub top: Rect,
    pub bottom: Rect,
    pub left: Rect,
    pub right: Rect,
}

impl MaskBands {
    pub fn around(hole: Rect, canvas: Size) -> Self {
        let canvas_width = canvas.width.max(0.0);
        let canvas_height = canvas.height.max(0.0);
        let hole_top = hole.top.clamp(0.0, canvas_height);
        let hole_bottom = hole.bottom().clamp(hole_top, canvas_height);
        let hole_left = hole.left.clamp(0.0, canvas_width);
        let hole_right = hole.right().clamp(hole_left, canvas_width);
        let band_height = hole_bottom - hole_top;

        Self {
            top: Rect::new(0.0, 0.0, canvas_width, hole_top),
            bottom: Rect::new(0.0, hole_bottom, canvas_width, canvas_height - hole_bottom),
            left: Rect::new(0.0, hole_top, hole_left, band_height),
            right: Rect::new(hole_right, hole_top, canvas_width - hole_right, band_height),
        }
    }

    pub fn as_array(&self) -> [Rect; 4] {
        [self.top, self.bottom, self.left, self.right]
    }

    /// Bands worth drawing; collapsed ones are skipped.
    pub fn visible(&self) -> impl Iterator<Item = Rect> {
        self.as_array().into_iter().filter(|band| !band.is_empty())
    }
}

/// Outer canvas rectangle with the crop box as a hole.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutoutPath {
    pub outer: Rect,
    pub hole: Rect,
}

impl CutoutPath {
    pub fn new(hole: Rect, canvas: Size) -> Self {
        Self {
            outer: Rect::from_size(Size::new(canvas.width.max(0.0), canvas.height.max(0.0))),
            hole,
        }
    }

    /// Even-odd rule: inside when the point is in exactly one of the two subpaths.
    pub fn covers(&self, point: Point) -> bool {
        self.outer.contains(point) != self.hole.contains(point)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaskGeometry {
    Bands(MaskBands),
    Cutout(CutoutPath),
}

impl MaskGeometry {
    pub fn build(mode: MaskMode, hole: Rect, canvas: Size) -> Self {
        match mode {
            MaskMode::Bands => Self::Bands(MaskBands::around(hole, canvas)),
            MaskMode::Cutout => Self::Cutout(CutoutPath::new(hole, canvas)),
        }
    }

    /// Whether `point` is dimmed. Used for painting, never for hit testing.
    pub fn covers(&self, point: Point) -> bool {
        match self {
            Self::Bands(bands) => bands.as_array().iter().any(|band| band.contains(point)),
            Self::Cutout(path) => path.covers(point),
        }
    }
}

/// Something the mask can be painted on.
pub trait MaskSurface {
    fn fill_rect(&mut self, rect: Rect, color: RgbaColor);

    /// Fills `outer` minus `hole`. Surfaces without path support fall back to bands.
    fn fill_even_odd(&mut self, outer: Rect, hole: Rect, color: RgbaColor) {
        for band in MaskBands::around(hole, outer.size()).visible() {
            self.fill_rect(band, color);
        }
    }
}

impl MaskSurface for RgbaImage {
    fn fill_rect(&mut self, rect: Rect, color: RgbaColor) {
        if rect.is_empty() || color.opacity <= 0.0 {
            return;
        }
        let x0 = pixel_edge(rect.left, self.width());
        let y0 = pixel_edge(rect.top, self.height());
        let x1 = pixel_edge(rect.right(), self.width());
        let y1 = pixel_edge(rect.bottom(), self.height());
        for y in y0..y1 {
            for x in x0..x1 {
                let pixel = self.get_pixel_mut(x, y);
                *pixel = blend(*pixel, color);
            }
        }
    }
}

fn pixel_edge(value: f64, max: u32) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, f64::from(max)) as u32
}

fn blend(pixel: Rgba<u8>, color: RgbaColor) -> Rgba<u8> {
    let (r, g, b) = color.color.rgb();
    let mix = |under: u8, over: u8| -> u8 {
        let value = f64::from(under) * (1.0 - color.opacity) + f64::from(over) * color.opacity;
        value.round().clamp(0.0, 255.0) as u8
    };
    Rgba([mix(pixel[0], r), mix(pixel[1], g), mix(pixel[2], b), pixel[3]])
}

/// Keeps the mask in lockstep with the crop box.
#[derive(Debug, Clone)]
pub struct MaskCompositor {
    mode: MaskMode,
    color: RgbaColor,
    canvas: Size,
    geometry: Option<MaskGeometry>,
    revision: Option<u64>,
}

impl MaskCompositor {
    pub fn new(mode: MaskMode, color: RgbaColor, canvas: Size) -> Self {
        Self {
            mode,
            color,
            canvas,
            geometry: None,
            revision: None,
        }
    }

    pub fn with_defaults(canvas: Size) -> Self {
        Self::new(
            MaskMode::default(),
            Color::BLACK.with_opacity(DEFAULT_MASK_OPACITY),
            canvas,
        )
    }

    pub const fn mode(&self) -> MaskMode {
        self.mode
    }

    pub const fn canvas(&self) -> Size {
        self.canvas
    }

    pub fn geometry(&self) -> Option<&MaskGeometry> {
        self.geometry.as_ref()
    }

    pub const fn revision(&self) -> Option<u64> {
        self.revision
    }

    /// True when the cached geometry was built from box revision `revision`.
    pub fn is_current(&self, revision: u64) -> bool {
        self.revision == Some(revision)
    }

    /// Rebuilds the geometry for `crop_box`. Must run after every accepted box change.
    pub fn rebuild(&mut self, crop_box: &CropBox, revision: u64) {
        self.geometry = Some(MaskGeometry::build(self.mode, crop_box.rect(), self.canvas));
        self.revision = Some(revision);
        tracing::trace!(revision, mode = ?self.mode, "mask rebuilt");
    }

    /// Canvas resizes invalidate the geometry until the next rebuild.
    pub fn set_canvas(&mut self, canvas: Size) {
        if self.canvas != canvas {
            self.canvas = canvas;
            self.geometry = None;
            self.revision = None;
        }
    }

    pub fn clear(&mut self) {
        self.geometry = None;
        self.revision = None;
    }

    pub fn paint<S: MaskSurface + ?Sized>(&self, surface: &mut S) {
        match self.geometry {
            Some(MaskGeometry::Bands(bands)) => {
                for band in bands.visible() {
                    surface.fill_rect(band, self.color);
                }
            }
            Some(MaskGeometry::Cutout(path)) => {
                surface.fill_even_odd(path.outer, path.hole, self.color);
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::AspectLock;

    #[test]
    fn bands_surround_the_box() {
        let bands =
            MaskBands::around(Rect::new(100.0, 50.0, 200.0, 100.0), Size::new(400.0, 300.0));
        assert_eq!(bands.top, Rect::new(0.0, 0.0, 400.0, 50.0));
        assert_eq!(bands.bottom, Rect::new(0.0, 150.0, 400.0, 150.0));
        assert_eq!(bands.left, Rect::new(0.0, 50.0, 100.0, 100.0));
        assert_eq!(bands.right, Rect::new(300.0, 50.0, 100.0, 100.0));
    }

    #[test]
    fn bands_collapse_when_box_touches_edges() {
        let bands = MaskBands::around(Rect::new(0.0, 0.0, 400.0, 300.0), Size::new(400.0, 300.0));
        for band in bands.as_array() {
            assert!(band.width >= 0.0 && band.height >= 0.0, "{band:?} has negative size");
            assert!(band.is_empty());
        }
        assert_eq!(bands.visible().count(), 0);
    }

    #[test]
    fn bands_never_go_negative_for_box_outside_canvas() {
        let bands =
            MaskBands::around(Rect::new(-50.0, 280.0, 600.0, 100.0), Size::new(400.0, 300.0));
        for band in bands.as_array() {
            assert!(band.width >= 0.0 && band.height >= 0.0, "{band:?} has negative size");
        }
    }

    #[test]
    fn both_forms_dim_the_same_points() {
        let hole = Rect::new(120.0, 80.0, 160.0, 90.0);
        let canvas = Size::new(400.0, 300.0);
        let bands = MaskGeometry::build(MaskMode::Bands, hole, canvas);
        let cutout = MaskGeometry::build(MaskMode::Cutout, hole, canvas);
        for y in (0..300).step_by(7) {
            for x in (0..400).step_by(7) {
                let point = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                assert_eq!(bands.covers(point), cutout.covers(point), "disagree at {point:?}");
                assert_eq!(bands.covers(point), !hole.contains(point));
            }
        }
    }

    #[test]
    fn compositor_tracks_revision_of_last_rebuild() {
        let mut compositor = MaskCompositor::with_defaults(Size::new(400.0, 300.0));
        assert!(!compositor.is_current(0));

        let crop = CropBox::new(10.0, 10.0, 100.0, 100.0, AspectLock::free());
        compositor.rebuild(&crop, 1);
        assert!(compositor.is_current(1));
        assert!(!compositor.is_current(2));

        compositor.set_canvas(Size::new(500.0, 300.0));
        assert!(compositor.geometry().is_none());
        assert!(!compositor.is_current(1));
    }

    #[test]
    fn painting_dims_only_outside_the_box() {
        let mut surface = RgbaImage::from_pixel(40, 30, Rgba([200, 200, 200, 255]));
        let mut compositor = MaskCompositor::new(
            MaskMode::Cutout,
            Color::BLACK.with_opacity(0.5),
            Size::new(40.0, 30.0),
        );
        compositor.rebuild(&CropBox::new(10.0, 5.0, 20.0, 10.0, AspectLock::free()), 7);
        compositor.paint(&mut surface);

        assert_eq!(*surface.get_pixel(0, 0), Rgba([100, 100, 100, 255]));
        assert_eq!(*surface.get_pixel(39, 29), Rgba([100, 100, 100, 255]));
        assert_eq!(*surface.get_pixel(10, 5), Rgba([200, 200, 200, 255]));
        assert_eq!(*surface.get_pixel(29, 14), Rgba([200, 200, 200, 255]));
        assert_eq!(*surface.get_pixel(30, 14), Rgba([100, 100, 100, 255]));
    }
}
