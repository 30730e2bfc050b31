//! Headless view model for rendered pages: positioned text spans standing in
//! for the PDF text layer, and highlight overlay boxes keyed by the owning
//! highlight's timestamp so a later deletion needs no page re-render.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{PageRect, Point};

/// How long a citation flash stays before reverting, and its fade-out.
pub const FLASH_DURATION_MS: u64 = 2000;
pub const FLASH_FADE_MS: u64 = 300;

/// Default highlight fill, matching the memo color used in the sidebar.
pub const HIGHLIGHT_COLOR: &str = "rgba(250, 204, 21, 0.4)";

/// One run of text in a page's text layer, page-relative render-scale pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub rect: PageRect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayBox {
    pub rect: PageRect,
    pub color: String,
}

/// A rendered page: raster dimensions, scale, text layer, and live overlays.
#[derive(Debug, Clone)]
pub struct PageSurface {
    /// 1-based page number.
    pub number: u32,
    /// Top-left corner in viewer coordinates; pages stack vertically.
    pub origin: Point,
    pub width: f32,
    pub height: f32,
    pub scale: f32,
    pub spans: Vec<TextSpan>,
    overlays: BTreeMap<String, OverlayBox>,
}

impl PageSurface {
    pub fn new(number: u32, origin: Point, width: f32, height: f32, scale: f32) -> Self {
        Self {
            number,
            origin,
            width,
            height,
            scale,
            spans: Vec::new(),
            overlays: BTreeMap::new(),
        }
    }

    /// The page's frame in viewer coordinates.
    pub fn frame(&self) -> PageRect {
        PageRect::new(self.origin.y, self.origin.x, self.width, self.height)
    }

    pub fn contains(&self, point: Point) -> bool {
        self.frame().contains(point)
    }

    pub fn place_overlay(&mut self, timestamp: &str, rect: PageRect, color: &str) {
        self.overlays.insert(
            timestamp.to_owned(),
            OverlayBox {
                rect,
                color: color.to_owned(),
            },
        );
    }

    pub fn remove_overlay(&mut self, timestamp: &str) -> bool {
        self.overlays.remove(timestamp).is_some()
    }

    pub fn overlay(&self, timestamp: &str) -> Option<&OverlayBox> {
        self.overlays.get(timestamp)
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }
}

/// Reference to one span within the document's text layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanRef {
    pub page: u32,
    pub index: usize,
}

/// Side effects the embedding UI performs on behalf of the engine. Scrolls are
/// centered and smooth; flashes revert after [`FLASH_DURATION_MS`] with a
/// [`FLASH_FADE_MS`] transition out.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEffect {
    ScrollToSpan(SpanRef),
    FlashSpan(SpanRef),
    ScrollToReference { ordinal: usize },
    FlashReference { ordinal: usize },
    ShowActionBar { at: Point },
    HideActionBar,
    BackControl { visible: bool },
    Alert(String),
}

impl UiEffect {
    /// Hold and fade-out durations in milliseconds for flash effects; `None`
    /// for effects that do not flash.
    pub fn flash_timing(&self) -> Option<(u64, u64)> {
        match self {
            UiEffect::FlashSpan(_) | UiEffect::FlashReference { .. } => {
                Some((FLASH_DURATION_MS, FLASH_FADE_MS))
            }
            _ => None,
        }
    }
}
