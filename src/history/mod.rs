//! Bounded linear undo/redo over crop-box snapshots.

pub mod coalesce;

use std::collections::VecDeque;

use crate::crop::CropBox;
use crate::geometry::Point;
use crate::mapping::DisplayTransform;

pub use coalesce::{Debouncer, FrameThrottle};

pub const DEFAULT_HISTORY_CAPACITY: usize = 10;
pub const MAX_HISTORY_CAPACITY: usize = 50;

/// A crop box plus the display placement it was captured under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub crop_box: CropBox,
    pub image_scale_x: f64,
    pub image_scale_y: f64,
    pub image_origin: Point,
}

impl HistoryEntry {
    pub fn capture(crop_box: CropBox, transform: &DisplayTransform) -> Self {
        Self {
            crop_box,
            image_scale_x: transform.scale(),
            image_scale_y: transform.scale(),
            image_origin: transform.offset(),
        }
    }

    /// The stored box expressed under `current`, remapped when the display moved since capture.
    pub fn restore_under(&self, current: &DisplayTransform) -> CropBox {
        let same_scale =
            self.image_scale_x == current.scale() && self.image_scale_y == current.scale();
        if same_scale && self.image_origin == current.offset() {
            return self.crop_box;
        }
        let rect = self.crop_box.rect();
        let native_left = (rect.left - self.image_origin.x) / self.image_scale_x;
        let native_top = (rect.top - self.image_origin.y) / self.image_scale_y;
        let native_width = rect.width / self.image_scale_x;
        let native_height = rect.height / self.image_scale_y;
        let origin = current.to_display(Point::new(native_left, native_top));
        CropBox::new(
            origin.x,
            origin.y,
            native_width * current.scale(),
            native_height * current.scale(),
            self.crop_box.aspect,
        )
    }
}

/// Fixed-capacity history with a cursor on the current entry.
///
/// `save` drops any redo branch, appends, evicts the oldest entry past
/// capacity and moves the cursor to the new top. `undo`/`redo` return `None`
/// at either end and leave the cursor alone.
#[derive(Debug, Clone)]
pub struct CropHistory {
    entries: VecDeque<HistoryEntry>,
    cursor: usize,
    capacity: usize,
}

impl Default for CropHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl CropHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_HISTORY_CAPACITY);
        Self {
            entries: VecDeque::with_capacity(capacity),
            cursor: 0,
            capacity,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.cursor)
    }

    /// Drops everything and makes `entry` the only, current entry.
    pub fn set_initial(&mut self, entry: HistoryEntry) {
        self.entries.clear();
        self.entries.push_back(entry);
        self.cursor = 0;
    }

    pub fn save(&mut self, entry: HistoryEntry) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len() - 1;
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn undo(&mut self) -> Option<HistoryEntry> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor).copied()
    }

    pub fn redo(&mut self) -> Option<HistoryEntry> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor).copied()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }
}
