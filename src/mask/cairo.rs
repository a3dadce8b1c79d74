use gtk4::cairo::{Context, FillRule};

use super::MaskSurface;
use crate::geometry::{Rect, RgbaColor};

impl MaskSurface for Context {
    fn fill_rect(&mut self, rect: Rect, color: RgbaColor) {
        if rect.is_empty() {
            return;
        }
        let (r, g, b, a) = color.to_unit_rgba();
        self.set_source_rgba(r, g, b, a);
        self.rectangle(rect.left, rect.top, rect.width, rect.height);
        if let Err(err) = self.fill() {
            tracing::warn!(?err, "cairo mask band fill failed");
        }
    }

    fn fill_even_odd(&mut self, outer: Rect, hole: Rect, color: RgbaColor) {
        let (r, g, b, a) = color.to_unit_rgba();
        let previous_rule = self.fill_rule();
        self.set_source_rgba(r, g, b, a);
        self.set_fill_rule(FillRule::EvenOdd);
        self.rectangle(outer.left, outer.top, outer.width, outer.height);
        self.rectangle(hole.left, hole.top, hole.width, hole.height);
        if let Err(err) = self.fill() {
            tracing::warn!(?err, "cairo mask cutout fill failed");
        }
        self.set_fill_rule(previous_rule);
    }
}
