//! Keeps the crop box valid under interactive edits.
//!
//! Every entry point returns a box that lies inside the image bounds, is at
//! least the minimum size and, when locked, holds its aspect ratio. The solver
//! never fails: degenerate proposals are replaced by the minimum size.

use super::{AspectLock, CropBox, ResizeHandle};
use crate::geometry::{Point, Rect, Size};

/// Results closer than this to the previous box in every field are dropped.
pub const NOOP_EPSILON: f64 = 0.1;

/// Smallest crop edge in display pixels, whatever the configured minimum.
const MIN_EDGE_PX: f64 = 1.0;

/// Slack for float noise when checking a locked box against its limits.
const LIMIT_TOLERANCE: f64 = 1e-9;

/// Which dimension a gesture changed; the other one is derived when locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangedDimension {
    Width,
    Height,
}

/// Image bounds and minimum size, both in display space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropLimits {
    pub image_bounds: Rect,
    pub min_size: Size,
}

impl CropLimits {
    pub const fn new(image_bounds: Rect, min_size: Size) -> Self {
        Self {
            image_bounds,
            min_size,
        }
    }

    /// The minimum that can actually be honored inside `available`.
    ///
    /// An image smaller than the configured minimum caps the minimum at the image size.
    fn effective_min(&self, available: Size) -> Size {
        let clip = |min: f64, extent: f64| -> f64 {
            let extent = extent.max(0.0);
            let min = if min.is_finite() { min } else { 0.0 };
            min.max(MIN_EDGE_PX).min(extent)
        };
        Size::new(
            clip(self.min_size.width, available.width),
            clip(self.min_size.height, available.height),
        )
    }
}

/// Corrects `proposed` so it satisfies every crop-box invariant.
pub fn constrain(proposed: CropBox, limits: &CropLimits, changed: ChangedDimension) -> CropBox {
    let available = limits.image_bounds.size();
    let (width, height) = constrain_size(&proposed, limits, available, changed);
    clamp_position(
        CropBox::new(proposed.left, proposed.top, width, height, proposed.aspect),
        limits,
    )
}

/// Like [`constrain`], but the corrected size stays centered on `center`
/// until the position clamp.
fn constrain_centered(
    proposed: CropBox,
    center: Point,
    limits: &CropLimits,
    changed: ChangedDimension,
) -> CropBox {
    let available = limits.image_bounds.size();
    let (width, height) = constrain_size(&proposed, limits, available, changed);
    let rect = Rect::centered_at(center, width, height);
    clamp_position(CropBox::from_rect(rect, proposed.aspect), limits)
}

/// Like [`constrain`], but returns `None` when the result is within
/// [`NOOP_EPSILON`] of `previous` so callers can skip redraw and history.
pub fn constrain_update(
    previous: &CropBox,
    proposed: CropBox,
    limits: &CropLimits,
    changed: ChangedDimension,
) -> Option<CropBox> {
    let next = constrain(proposed, limits, changed);
    if next.approx_eq(previous, NOOP_EPSILON) {
        None
    } else {
        Some(next)
    }
}

/// Steps 1 to 4: ratio, width clamp, height clamp, then the locked-ratio fallback.
fn constrain_size(
    proposed: &CropBox,
    limits: &CropLimits,
    available: Size,
    changed: ChangedDimension,
) -> (f64, f64) {
    let min = limits.effective_min(available);
    let max_width = available.width.max(min.width);
    let max_height = available.height.max(min.height);
    let ratio = proposed.aspect.active_ratio();

    let mut width = positive_or(proposed.width, min.width);
    let mut height = positive_or(proposed.height, min.height);

    if let Some(ratio) = ratio {
        match changed {
            ChangedDimension::Width => height = width / ratio,
            ChangedDimension::Height => width = height * ratio,
        }
    }

    width = width.clamp(min.width, max_width);
    if let Some(ratio) = ratio {
        height = width / ratio;
    }

    let clamped_height = height.clamp(min.height, max_height);
    if clamped_height != height {
        height = clamped_height;
        if let Some(ratio) = ratio {
            width = height * ratio;
        }
    }

    if let Some(ratio) = ratio {
        let fits = width >= min.width - LIMIT_TOLERANCE
            && width <= max_width + LIMIT_TOLERANCE
            && height >= min.height - LIMIT_TOLERANCE
            && height <= max_height + LIMIT_TOLERANCE;
        if !fits {
            // Anchor on the limiting dimension. When no width satisfies both the
            // minimum and the bounds at this ratio, the bounds win.
            let lowest = min.width.max(min.height * ratio);
            let highest = max_width.min(max_height * ratio);
            width = if lowest <= highest {
                width.clamp(lowest, highest)
            } else {
                highest
            };
            height = width / ratio;
        }
    }

    (width, height)
}

/// Step 5: slide the box back inside the image without resizing it.
fn clamp_position(crop: CropBox, limits: &CropLimits) -> CropBox {
    let bounds = limits.image_bounds;
    let left = clamp_span(crop.left, bounds.left, bounds.right() - crop.width);
    let top = clamp_span(crop.top, bounds.top, bounds.bottom() - crop.height);
    CropBox::new(left, top, crop.width, crop.height, crop.aspect)
}

fn clamp_span(value: f64, low: f64, high: f64) -> f64 {
    if !value.is_finite() || high < low {
        return low;
    }
    value.clamp(low, high)
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

/// Moves the box so its top-left corner lands on `(left, top)`, clamped to the image.
pub fn move_to(crop: &CropBox, left: f64, top: f64, limits: &CropLimits) -> CropBox {
    clamp_position(
        CropBox::new(left, top, crop.width, crop.height, crop.aspect),
        limits,
    )
}

pub fn move_by(crop: &CropBox, dx: f64, dy: f64, limits: &CropLimits) -> CropBox {
    move_to(crop, crop.left + dx, crop.top + dy, limits)
}

/// Drags `handle` to `pointer` while the opposite edge or corner stays put.
///
/// Edges only change their own axis. On a locked box an edge drag keeps the
/// perpendicular axis centered. A pointer that crosses the anchored edge
/// collapses the box to its minimum rather than flipping it.
pub fn resize_from_handle(
    crop: &CropBox,
    handle: ResizeHandle,
    pointer: Point,
    limits: &CropLimits,
) -> CropBox {
    let bounds = limits.image_bounds;
    let (fx, fy) = handle.edge_factors();
    let center = crop.center();

    let (width, anchor_x, available_width) = if handle.moves_horizontally() {
        if fx == 0.0 {
            let anchor = crop.left + crop.width;
            (anchor - pointer.x, anchor, anchor - bounds.left)
        } else {
            let anchor = crop.left;
            (pointer.x - anchor, anchor, bounds.right() - anchor)
        }
    } else {
        let half = (center.x - bounds.left).min(bounds.right() - center.x);
        (crop.width, center.x, half * 2.0)
    };
    let (height, anchor_y, available_height) = if handle.moves_vertically() {
        if fy == 0.0 {
            let anchor = crop.top + crop.height;
            (anchor - pointer.y, anchor, anchor - bounds.top)
        } else {
            let anchor = crop.top;
            (pointer.y - anchor, anchor, bounds.bottom() - anchor)
        }
    } else {
        let half = (center.y - bounds.top).min(bounds.bottom() - center.y);
        (crop.height, center.y, half * 2.0)
    };

    let changed = match handle {
        ResizeHandle::Top | ResizeHandle::Bottom => ChangedDimension::Height,
        ResizeHandle::Left | ResizeHandle::Right => ChangedDimension::Width,
        _ => dominant_change(crop, width, height),
    };

    // Free edges keep the untouched axis as-is; only a locked box rescales it.
    let available = Size::new(
        if handle.moves_horizontally() || crop.aspect.locked {
            available_width
        } else {
            bounds.width
        },
        if handle.moves_vertically() || crop.aspect.locked {
            available_height
        } else {
            bounds.height
        },
    );
    let proposed = CropBox::new(crop.left, crop.top, width, height, crop.aspect);
    let (width, height) = constrain_size(&proposed, limits, available, changed);

    let left = if !handle.moves_horizontally() {
        if crop.aspect.locked {
            anchor_x - width / 2.0
        } else {
            crop.left
        }
    } else if fx == 0.0 {
        anchor_x - width
    } else {
        anchor_x
    };
    let top = if !handle.moves_vertically() {
        if crop.aspect.locked {
            anchor_y - height / 2.0
        } else {
            crop.top
        }
    } else if fy == 0.0 {
        anchor_y - height
    } else {
        anchor_y
    };

    clamp_position(CropBox::new(left, top, width, height, crop.aspect), limits)
}

/// For corner drags, the dimension that moved the most relative to its size drives the ratio.
fn dominant_change(crop: &CropBox, width: f64, height: f64) -> ChangedDimension {
    let relative = |next: f64, current: f64| -> f64 {
        if current > 0.0 {
            ((next - current) / current).abs()
        } else {
            f64::INFINITY
        }
    };
    if relative(height, crop.height) > relative(width, crop.width) {
        ChangedDimension::Height
    } else {
        ChangedDimension::Width
    }
}

/// Switches the box to a new aspect ratio (or back to free form with `None`).
///
/// The new box keeps the old center. It is the largest box of that ratio that
/// fits the image, unless the old selection was smaller, in which case the old
/// area is kept so small selections do not jump to full size.
pub fn apply_aspect_ratio(crop: &CropBox, ratio: Option<f64>, limits: &CropLimits) -> CropBox {
    let aspect = AspectLock::from_ratio(ratio);
    let Some(ratio) = aspect.active_ratio() else {
        return constrain(
            CropBox::new(crop.left, crop.top, crop.width, crop.height, aspect),
            limits,
            ChangedDimension::Width,
        );
    };

    let bounds = limits.image_bounds;
    let max_width = bounds.width.min(bounds.height * ratio);
    let max_height = max_width / ratio;
    let area = crop.width * crop.height;
    let (width, height) = if area.is_finite() && area > 0.0 && area < max_width * max_height {
        let width = (area * ratio).sqrt();
        (width, width / ratio)
    } else {
        (max_width, max_height)
    };

    let center = crop.center();
    let rect = Rect::centered_at(center, width, height);
    constrain_centered(CropBox::from_rect(rect, aspect), center, limits, ChangedDimension::Width)
}

/// The box a session starts with: centered, `fraction` of the image extent,
/// optionally capped per side, then fitted to `ratio`.
pub fn initial_crop_box(
    limits: &CropLimits,
    ratio: Option<f64>,
    fraction: f64,
    cap: Option<f64>,
) -> CropBox {
    let bounds = limits.image_bounds;
    let fraction = if fraction.is_finite() && fraction > 0.0 {
        fraction.min(1.0)
    } else {
        1.0
    };
    let mut width = bounds.width * fraction;
    let mut height = bounds.height * fraction;
    if let Some(cap) = cap.filter(|cap| cap.is_finite() && *cap > 0.0) {
        width = width.min(cap);
        height = height.min(cap);
    }

    let aspect = AspectLock::from_ratio(ratio);
    if let Some(ratio) = aspect.active_ratio() {
        width = width.min(height * ratio);
        height = width / ratio;
    }

    let center = bounds.center();
    let rect = Rect::centered_at(center, width, height);
    constrain_centered(CropBox::from_rect(rect, aspect), center, limits, ChangedDimension::Width)
}
