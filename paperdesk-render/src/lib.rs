//! pdfium-backed implementation of the core rendering seams.
//!
//! Documents arrive as owned byte buffers (the backend ships them base64 over
//! the wire; the session controller hands us the decoded bytes), so pdfium
//! parses from memory rather than from a path. Pages render at the viewer's
//! fit scale; the text layer comes back as positioned spans in top-left
//! render-pixel coordinates, converted from pdfium's bottom-left point space.

use std::mem;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{instrument, warn};

use paperdesk_core::{
    DocumentPages, DocumentProvider, PageRect, RenderImage, RenderedPage, TextSpan,
};

pub struct PdfiumRenderService {
    pdfium: Arc<Pdfium>,
}

impl PdfiumRenderService {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumRenderService {
    async fn decode(&self, bytes: Vec<u8>) -> Result<Arc<dyn DocumentPages>> {
        let document = PdfiumPages::new(Arc::clone(&self.pdfium), bytes)?;
        Ok(Arc::new(document))
    }
}

struct PdfiumPages {
    // Declared before pdfium so the cached document drops first; it borrows
    // the bindings owned by the Arc below.
    document: Mutex<PdfDocument<'static>>,
    #[allow(dead_code)]
    pdfium: Arc<Pdfium>,
    page_count: usize,
}

impl PdfiumPages {
    fn new(pdfium: Arc<Pdfium>, bytes: Vec<u8>) -> Result<Self> {
        let document = pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .context("failed to parse PDF document")?;
        // SAFETY: the returned PdfDocument borrows the Pdfium bindings owned by
        // the Arc stored alongside it. The Arc is never dropped or replaced
        // while the document exists: struct fields drop in declaration order,
        // so `document` is gone before `pdfium`, and neither field is ever
        // moved out individually.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        let page_count = usize::from(document.pages().len());
        Ok(Self {
            document: Mutex::new(document),
            pdfium,
            page_count,
        })
    }

    fn with_page<R, F>(&self, page_number: u32, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        let index: PdfPageIndex = page_number
            .checked_sub(1)
            .and_then(|i| i.try_into().ok())
            .ok_or_else(|| anyhow!("page {page_number} is out of supported range"))?;
        let document = self.document.lock();
        let page = document
            .pages()
            .get(index)
            .with_context(|| format!("page {page_number} out of range"))?;
        f(&page)
    }
}

impl DocumentPages for PdfiumPages {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn native_size(&self, page_number: u32) -> Result<(f32, f32)> {
        self.with_page(page_number, |page| {
            Ok((page.width().value, page.height().value))
        })
    }

    #[instrument(skip(self))]
    fn render_page(&self, page_number: u32, scale: f32) -> Result<RenderedPage> {
        self.with_page(page_number, |page| {
            let config = PdfRenderConfig::new().scale_page_by_factor(scale.max(0.1));
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {page_number}"))?;
            let rgba = bitmap.as_image().to_rgba8();
            let (width, height) = (rgba.width(), rgba.height());
            let pixels = rgba.into_raw();

            let spans = match extract_spans(page, width as f32, height as f32) {
                Ok(spans) => spans,
                Err(err) => {
                    // A page with no usable text layer still renders; citation
                    // clicks just find nothing on it.
                    warn!(?err, page = page_number, "failed to extract text layer");
                    Vec::new()
                }
            };

            Ok(RenderedPage {
                image: RenderImage {
                    width,
                    height,
                    pixels,
                },
                spans,
            })
        })
    }
}

/// Walk the page's text segments and place each one in top-left render-pixel
/// coordinates. pdfium reports bounds in points with the origin at the page's
/// bottom-left corner.
fn extract_spans(page: &PdfPage<'_>, render_width: f32, render_height: f32) -> Result<Vec<TextSpan>> {
    let page_width = page.width().value;
    let page_height = page.height().value;
    if page_width <= 0.0 || page_height <= 0.0 {
        return Ok(Vec::new());
    }
    let scale_x = render_width / page_width;
    let scale_y = render_height / page_height;

    let text = page.text().context("failed to open page text")?;
    let mut spans = Vec::new();
    for segment in text.segments().iter() {
        let content = segment.text();
        if content.trim().is_empty() {
            continue;
        }
        let bounds = segment.bounds();
        let left = bounds.left().value * scale_x;
        let top = (page_height - bounds.top().value) * scale_y;
        let width = (bounds.right().value - bounds.left().value) * scale_x;
        let height = (bounds.top().value - bounds.bottom().value) * scale_y;
        let rect = PageRect::new(top, left, width.max(0.0), height.max(0.0));
        if !rect.is_valid() {
            continue;
        }
        spans.push(TextSpan {
            text: content,
            rect,
        });
    }
    Ok(spans)
}

const LIBRARY_PATH_VAR: &str = "PAPERDESK_PDFIUM_LIBRARY_PATH";

/// Runtime escape hatch: point this at a pdfium shared library when the system
/// search paths do not have one.
fn library_path_hint() -> Option<String> {
    match std::env::var(LIBRARY_PATH_VAR) {
        Ok(path) if !path.is_empty() => Some(path),
        _ => None,
    }
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    let path = library_path_hint()?;
    match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!("failed to load Pdfium from {LIBRARY_PATH_VAR}={path}: {err}");
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; ensure it is installed ({})",
                errors.join(", ")
            ))
        }
    }
}
