//! Page-relative geometry for selections and highlight overlays.
//!
//! Two coordinate spaces matter here: viewer coordinates (relative to the
//! scrolling container holding the stacked page surfaces) and page coordinates
//! (relative to one page's top-left corner, in render-scale pixels). Persisted
//! highlight rectangles additionally use native units (scale 1.0) so they stay
//! meaningful when the same document is re-rendered at a different width.

use serde::{Deserialize, Serialize};

use crate::view::PageSurface;

/// Rendering never zooms past 1.5x native; narrower containers fit exactly.
pub const MAX_FIT_SCALE: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageRect {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
}

impl PageRect {
    pub fn new(top: f32, left: f32, width: f32, height: f32) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// Convert a render-scale rect into native (scale 1.0) units.
    pub fn to_native(&self, scale: f32) -> PageRect {
        if scale <= 0.0 || !scale.is_finite() {
            return *self;
        }
        PageRect {
            top: self.top / scale,
            left: self.left / scale,
            width: self.width / scale,
            height: self.height / scale,
        }
    }

    /// Convert a native-unit rect back into render-scale pixels.
    pub fn at_scale(&self, scale: f32) -> PageRect {
        PageRect {
            top: self.top * scale,
            left: self.left * scale,
            width: self.width * scale,
            height: self.height * scale,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left
            && point.x <= self.left + self.width
            && point.y >= self.top
            && point.y <= self.top + self.height
    }

    pub fn is_valid(&self) -> bool {
        self.top.is_finite()
            && self.left.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width >= 0.0
            && self.height >= 0.0
    }
}

/// A live text selection in viewer coordinates. Transient input; never persisted.
#[derive(Debug, Clone)]
pub struct Selection {
    pub text: String,
    /// Bounding box of the selected range.
    pub bounds: PageRect,
    /// Position of the selection anchor, used to resolve the owning page.
    pub anchor: Point,
}

/// The anchored form of a selection: page number plus a page-relative rect in
/// render-scale pixels. Lives only between selection and commit/cancel.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionContext {
    pub text: String,
    pub page_number: u32,
    pub rect: PageRect,
}

/// Scale that fits a native page width into the container, capped at 1.5x.
pub fn fit_scale(container_width: f32, native_width: f32) -> f32 {
    if container_width <= 0.0 || native_width <= 0.0 {
        return 1.0;
    }
    (container_width / native_width).min(MAX_FIT_SCALE)
}

/// Resolve a selection to the page surface enclosing its anchor and produce the
/// page-relative rectangle. Returns `None` when the selection is empty or the
/// anchor lies outside every page, in which case the caller shows nothing.
pub fn anchor_selection(
    selection: &Selection,
    surfaces: &[PageSurface],
) -> Option<SelectionContext> {
    let text = selection.text.trim();
    if text.is_empty() {
        return None;
    }

    let surface = surfaces.iter().find(|s| s.contains(selection.anchor))?;
    let rect = PageRect {
        top: selection.bounds.top - surface.origin.y,
        left: selection.bounds.left - surface.origin.x,
        width: selection.bounds.width.max(0.0),
        height: selection.bounds.height.max(0.0),
    };

    Some(SelectionContext {
        text: text.to_owned(),
        page_number: surface.number,
        rect,
    })
}

/// Where the floating action bar goes: centered above the selection bounds.
pub fn action_bar_anchor(bounds: &PageRect) -> Point {
    Point {
        x: bounds.left + bounds.width / 2.0,
        y: bounds.top,
    }
}
