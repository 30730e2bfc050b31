pub mod citation;
pub mod geometry;
pub mod graph;
pub mod highlight;
pub mod history;
pub mod papers;
pub mod service;
pub mod session;
pub mod view;

use std::path::Path;

use once_cell::sync::Lazy;
use uuid::Uuid;

pub use citation::{Bibliography, BibliographyEntry};
pub use geometry::{PageRect, Point, Selection, SelectionContext};
pub use graph::{GraphNode, ReferenceEdges, ReferencePanel};
pub use highlight::{Highlight, HighlightStore, PersistStatus};
pub use history::NavigationHistory;
pub use papers::{PaperCatalog, PaperSummary};
pub use service::{
    DocumentBundle, DocumentPages, DocumentProvider, OpenPayload, PaperService, RenderImage,
    RenderedPage, ServiceError, Sidecar,
};
pub use session::{OpenRequest, Session, SessionController, SessionEvent};
pub use view::{OverlayBox, PageSurface, SpanRef, TextSpan, UiEffect};

pub type DocumentId = Uuid;

static PAPER_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f6a1de4-20c1-5b77-9d43-8a21c04be9d1").expect("valid namespace UUID")
});

/// Stable identity for a locally stored paper, derived from its resolved path.
/// Used as the join key between the reference graph and the local paper catalog;
/// the filename is only a display fallback.
pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&PAPER_NAMESPACE, rendered.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn document_id_is_stable_for_same_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sample.pdf");
        std::fs::write(&file_path, b"dummy").unwrap();

        assert_eq!(
            document_id_for_path(&file_path),
            document_id_for_path(&file_path)
        );
    }

    #[test]
    fn document_id_differs_across_paths() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("b.pdf");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        assert_ne!(document_id_for_path(&a), document_id_for_path(&b));
    }
}
