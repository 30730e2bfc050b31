//! Document session orchestration.
//!
//! All mutable viewer state lives in one place: the active [`Session`], the
//! navigation history, and the paper catalog, owned by a [`SessionController`]
//! and replaced atomically on every document switch. Page rendering is pumped
//! cooperatively, one page at a time in ascending order, and every render plan
//! carries the generation of the session that seeded it so a plan outliving
//! its session degrades to a no-op instead of scribbling over the new one.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::citation::{self, Bibliography};
use crate::geometry::{self, fit_scale, Point, Selection, SelectionContext};
use crate::graph::{resolve_panel, ReferenceEdges, ReferencePanel};
use crate::highlight::{Highlight, HighlightStore};
use crate::history::NavigationHistory;
use crate::papers::PaperCatalog;
use crate::service::{DocumentBundle, DocumentPages, DocumentProvider, PaperService};
use crate::view::{PageSurface, SpanRef, UiEffect, HIGHLIGHT_COLOR};

/// Vertical spacing between stacked page surfaces, in viewer pixels.
pub const PAGE_GAP: f32 = 16.0;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DocumentOpened { filepath: PathBuf },
    PageRendered { page: u32 },
    RenderFinished { generation: u64 },
    HighlightCommitted { timestamp: String },
    HighlightSaveFailed { timestamp: String },
    HighlightRemoved { timestamp: String },
    CatalogRefreshed,
    Effect(UiEffect),
}

/// The currently open document and everything derived from it. Exactly one
/// session is active at a time; opening another document replaces it whole.
pub struct Session {
    pub filepath: PathBuf,
    pub filename: String,
    pub document: Arc<dyn DocumentPages>,
    pub bibliography: Bibliography,
    pub edges: ReferenceEdges,
    pub highlights: HighlightStore,
    pub surfaces: Vec<PageSurface>,
    pub generation: u64,
}

/// A sequential render pass over one session's pages. Stale plans (generation
/// no longer matching the controller's) step to a no-op.
#[derive(Debug, Clone, Copy)]
pub struct RenderPlan {
    generation: u64,
    next_page: u32,
    page_count: u32,
}

impl RenderPlan {
    pub fn is_done(&self) -> bool {
        self.next_page > self.page_count
    }
}

#[derive(Debug, Clone)]
pub enum OpenRequest {
    /// Open via the backend's file picker.
    Dialog,
    Path(PathBuf),
}

pub struct SessionController {
    service: Arc<dyn PaperService>,
    provider: Arc<dyn DocumentProvider>,
    /// Width of the page container; drives the fit scale for every render.
    container_width: f32,
    session: Option<Session>,
    plan: Option<RenderPlan>,
    pending_selection: Option<SelectionContext>,
    history: NavigationHistory,
    catalog: PaperCatalog,
    generation: u64,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl SessionController {
    pub fn new(
        service: Arc<dyn PaperService>,
        provider: Arc<dyn DocumentProvider>,
        container_width: f32,
    ) -> Self {
        Self {
            service,
            provider,
            container_width,
            session: None,
            plan: None,
            pending_selection: None,
            history: NavigationHistory::new(),
            catalog: PaperCatalog::new(),
            generation: 0,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn take_events(&self) -> Vec<SessionEvent> {
        self.events.lock().drain(..).collect()
    }

    fn push_event(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }

    fn push_effect(&self, effect: UiEffect) {
        self.push_event(SessionEvent::Effect(effect));
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn history(&self) -> &NavigationHistory {
        &self.history
    }

    pub fn catalog(&self) -> &PaperCatalog {
        &self.catalog
    }

    /// The cites/cited-by panel for the active document.
    pub fn reference_panel(&self) -> ReferencePanel {
        self.session
            .as_ref()
            .map(|session| resolve_panel(&session.edges, &self.catalog))
            .unwrap_or_default()
    }

    /// Open a document. Returns whether a new session was installed; benign
    /// failures (picker dismissed) and surfaced errors both leave the current
    /// session untouched and return `false`.
    pub async fn open(&mut self, request: OpenRequest) -> Result<bool> {
        self.open_inner(request, false).await
    }

    /// Pop the history stack and reopen, without recording the transition.
    pub async fn go_back(&mut self) -> Result<bool> {
        let Some(path) = self.history.go_back() else {
            self.push_effect(UiEffect::BackControl { visible: false });
            return Ok(false);
        };
        self.push_effect(UiEffect::BackControl {
            visible: self.history.back_visible(),
        });
        self.open_inner(OpenRequest::Path(path), true).await
    }

    #[instrument(skip(self), fields(back = is_back))]
    async fn open_inner(&mut self, request: OpenRequest, is_back: bool) -> Result<bool> {
        let outcome = match &request {
            OpenRequest::Dialog => self.service.open_pdf().await,
            OpenRequest::Path(path) => self.service.open_specific_pdf(path).await,
        };

        let payload = match outcome {
            Ok(payload) => payload,
            Err(err) if err.is_benign() => {
                debug!("open request abandoned: {err}");
                return Ok(false);
            }
            Err(err) => {
                warn!(error = %err, "failed to open document");
                self.push_effect(UiEffect::Alert(format!("Error: {err}")));
                return Ok(false);
            }
        };

        let bundle = match payload.into_bundle() {
            Ok(bundle) => bundle,
            Err(err) => {
                warn!(error = %err, "failed to decode open payload");
                self.push_effect(UiEffect::Alert(format!("Error: {err}")));
                return Ok(false);
            }
        };
        let DocumentBundle {
            filename,
            filepath,
            bytes,
            references,
            edges,
            sidecar,
        } = bundle;

        let document = match self.provider.decode(bytes).await {
            Ok(document) => document,
            Err(err) => {
                warn!(error = %err, path = %filepath.display(), "failed to decode document");
                self.push_effect(UiEffect::Alert(format!("Error: {err}")));
                return Ok(false);
            }
        };

        self.history.record_if_needed(
            self.session.as_ref().map(|s| s.filepath.as_path()),
            &filepath,
            is_back,
        );
        self.push_effect(UiEffect::BackControl {
            visible: self.history.back_visible(),
        });

        // Atomic swap: nothing from the previous session survives past here.
        self.generation += 1;
        let mut highlights = HighlightStore::new();
        highlights.replace_all(sidecar.highlights);
        let page_count = document.page_count() as u32;
        self.session = Some(Session {
            filepath: filepath.clone(),
            filename,
            document,
            bibliography: Bibliography::new(references),
            edges,
            highlights,
            surfaces: Vec::new(),
            generation: self.generation,
        });
        self.pending_selection = None;
        self.plan = Some(RenderPlan {
            generation: self.generation,
            next_page: 1,
            page_count,
        });
        self.push_effect(UiEffect::HideActionBar);
        self.push_event(SessionEvent::DocumentOpened { filepath });
        Ok(true)
    }

    /// The render plan seeded by the most recent open, if not yet taken.
    pub fn take_render_plan(&mut self) -> Option<RenderPlan> {
        self.plan.take()
    }

    /// Render the plan's next page: raster, text layer, and replay of the
    /// stored overlays for that page. Returns `false` when the plan is done or
    /// stale; a stale step touches nothing.
    pub fn render_step(&mut self, plan: &mut RenderPlan) -> Result<bool> {
        if plan.generation != self.generation {
            debug!(
                plan_generation = plan.generation,
                active_generation = self.generation,
                "dropping stale render step"
            );
            return Ok(false);
        }
        if plan.is_done() {
            return Ok(false);
        }
        let page = plan.next_page;

        {
            let Some(session) = self.session.as_mut() else {
                return Ok(false);
            };
            let (native_width, _) = session.document.native_size(page)?;
            let scale = fit_scale(self.container_width, native_width);
            let rendered = session.document.render_page(page, scale)?;

            let origin_y = session
                .surfaces
                .last()
                .map(|s| s.origin.y + s.height + PAGE_GAP)
                .unwrap_or(0.0);
            let mut surface = PageSurface::new(
                page,
                Point { x: 0.0, y: origin_y },
                rendered.image.width as f32,
                rendered.image.height as f32,
                scale,
            );
            surface.spans = rendered.spans;
            for highlight in session.highlights.for_page(page) {
                surface.place_overlay(
                    &highlight.timestamp,
                    highlight.rect.at_scale(scale),
                    &highlight.color,
                );
            }
            session.surfaces.push(surface);
        }

        plan.next_page += 1;
        self.push_event(SessionEvent::PageRendered { page });
        if plan.is_done() {
            self.push_event(SessionEvent::RenderFinished {
                generation: plan.generation,
            });
        }
        Ok(true)
    }

    /// Run the pending render plan to completion, pages in ascending order.
    pub fn render_all(&mut self) -> Result<()> {
        let Some(mut plan) = self.take_render_plan() else {
            return Ok(());
        };
        while self.render_step(&mut plan)? {}
        Ok(())
    }

    /// Anchor a live selection. `None` (no page encloses the anchor, or the
    /// selection is empty) aborts with no visible effect.
    pub fn begin_selection(&mut self, selection: &Selection) -> Option<SelectionContext> {
        let session = self.session.as_ref()?;
        let context = geometry::anchor_selection(selection, &session.surfaces)?;
        self.push_effect(UiEffect::ShowActionBar {
            at: geometry::action_bar_anchor(&selection.bounds),
        });
        self.pending_selection = Some(context.clone());
        Some(context)
    }

    /// Clear the pending selection (cancel button, or the selection emptied).
    pub fn cancel_selection(&mut self) {
        if self.pending_selection.take().is_some() {
            self.push_effect(UiEffect::HideActionBar);
        }
    }

    /// Commit the pending selection as a highlight: optimistic local insert
    /// and overlay first, persistence after. A failed save keeps the local
    /// record but marks it so the UI can flag or retry it.
    #[instrument(skip(self))]
    pub async fn commit_selection(&mut self) -> Result<Option<String>> {
        let Some(context) = self.pending_selection.take() else {
            return Ok(None);
        };
        let (filepath, highlight) = {
            let Some(session) = self.session.as_mut() else {
                return Ok(None);
            };
            let scale = session
                .surfaces
                .iter()
                .find(|s| s.number == context.page_number)
                .map(|s| s.scale)
                .unwrap_or(1.0);
            let highlight = Highlight::new(
                context.text.clone(),
                context.page_number,
                context.rect.to_native(scale),
                HIGHLIGHT_COLOR,
            );
            if let Some(surface) = session
                .surfaces
                .iter_mut()
                .find(|s| s.number == context.page_number)
            {
                surface.place_overlay(&highlight.timestamp, context.rect, &highlight.color);
            }
            session.highlights.insert_pending(highlight.clone());
            (session.filepath.clone(), highlight)
        };
        let timestamp = highlight.timestamp.clone();
        self.push_event(SessionEvent::HighlightCommitted {
            timestamp: timestamp.clone(),
        });
        self.push_effect(UiEffect::HideActionBar);

        match self.service.save_highlight(&filepath, &highlight).await {
            Ok(()) => {
                if let Some(session) = self.session.as_mut() {
                    session.highlights.mark_saved(&timestamp);
                }
            }
            Err(err) => {
                warn!(error = %err, timestamp, "failed to persist highlight");
                if let Some(session) = self.session.as_mut() {
                    session.highlights.mark_failed(&timestamp);
                }
                self.push_event(SessionEvent::HighlightSaveFailed {
                    timestamp: timestamp.clone(),
                });
            }
        }

        // Memo badge counts in the sidebar may have moved.
        if let Err(err) = self.refresh_papers().await {
            debug!(error = %err, "paper list refresh failed after commit");
        }
        Ok(Some(timestamp))
    }

    /// Delete a highlight. Local state only changes once the backend confirms;
    /// on failure the record and its overlay stay exactly as they were.
    pub async fn delete_highlight(&mut self, timestamp: &str) -> Result<bool> {
        let Some(filepath) = self.session.as_ref().map(|s| s.filepath.clone()) else {
            return Ok(false);
        };
        if let Err(err) = self.service.delete_highlight(&filepath, timestamp).await {
            warn!(error = %err, timestamp, "failed to delete highlight; keeping local copy");
            return Ok(false);
        }

        let removed = {
            let Some(session) = self.session.as_mut() else {
                return Ok(false);
            };
            if session.highlights.remove(timestamp) {
                for surface in &mut session.surfaces {
                    if surface.remove_overlay(timestamp) {
                        break;
                    }
                }
                true
            } else {
                false
            }
        };
        if removed {
            self.push_event(SessionEvent::HighlightRemoved {
                timestamp: timestamp.to_owned(),
            });
            if let Err(err) = self.refresh_papers().await {
                debug!(error = %err, "paper list refresh failed after delete");
            }
        }
        Ok(removed)
    }

    /// Reverse citation direction: a click on a text-layer span. When the span
    /// is an in-range marker, scrolls and flashes the bibliography entry.
    pub fn click_span(&mut self, span: SpanRef) -> Option<usize> {
        let ordinal = {
            let session = self.session.as_ref()?;
            let surface = session.surfaces.iter().find(|s| s.number == span.page)?;
            let text = &surface.spans.get(span.index)?.text;
            citation::resolve_marker_click(text, session.bibliography.len())?
        };
        self.push_effect(UiEffect::ScrollToReference { ordinal });
        self.push_effect(UiEffect::FlashReference { ordinal });
        Some(ordinal)
    }

    /// Forward citation direction: a click on a bibliography entry. Searches
    /// the text layers for the entry's marker and scrolls/flashes the hit.
    pub fn click_reference(&mut self, ordinal: usize) -> Option<SpanRef> {
        let found = {
            let session = self.session.as_ref()?;
            if ordinal >= session.bibliography.len() {
                return None;
            }
            citation::find_marker_span(&session.surfaces, ordinal)
        };
        match found {
            Some(span) => {
                self.push_effect(UiEffect::ScrollToSpan(span));
                self.push_effect(UiEffect::FlashSpan(span));
                Some(span)
            }
            None => {
                debug!(ordinal, "citation marker not found in text layer");
                None
            }
        }
    }

    /// Direct-open action for a bibliography entry whose paper is local.
    pub async fn open_reference(&mut self, ordinal: usize) -> Result<bool> {
        let target = self
            .session
            .as_ref()
            .and_then(|s| s.bibliography.get(ordinal))
            .and_then(|entry| entry.local_path.clone());
        match target {
            Some(path) => self.open(OpenRequest::Path(path)).await,
            None => Ok(false),
        }
    }

    /// Navigate to a resolved graph node; unresolved nodes go nowhere.
    pub async fn open_graph_node(&mut self, node: &crate::graph::GraphNode) -> Result<bool> {
        match node.target() {
            Some(path) => self.open(OpenRequest::Path(path.to_path_buf())).await,
            None => Ok(false),
        }
    }

    /// One poll tick of the local paper list. Identical content is a no-op;
    /// only an actual change rebuilds the catalog and emits an event.
    pub async fn refresh_papers(&mut self) -> Result<bool> {
        let papers = self
            .service
            .get_local_papers()
            .await
            .map_err(anyhow::Error::from)?;
        let changed = self.catalog.update(papers)?;
        if changed {
            self.push_event(SessionEvent::CatalogRefreshed);
        }
        Ok(changed)
    }
}
