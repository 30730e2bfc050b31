//! Collaborator boundaries: the backend document service and the PDF
//! rendering service. Both are consumed as opaque request/response seams; the
//! engine never owns a wire protocol or file format of its own.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::citation::BibliographyEntry;
use crate::graph::ReferenceEdges;
use crate::highlight::Highlight;
use crate::papers::PaperSummary;
use crate::view::TextSpan;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The user dismissed the picker; not an error worth surfacing.
    #[error("no file selected")]
    NoFileSelected,
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("no document open")]
    NoDocumentOpen,
    #[error("highlight {0} not found")]
    HighlightNotFound(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl ServiceError {
    /// Benign failures abort the operation silently instead of alerting.
    pub fn is_benign(&self) -> bool {
        matches!(self, ServiceError::NoFileSelected)
    }
}

/// Auxiliary persisted data riding alongside a document's own bytes.
/// Unrecognized keys survive a load/save round trip untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sidecar {
    #[serde(default)]
    pub highlights: Vec<Highlight>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Wire shape of a successful open call. `data` carries the document bytes
/// base64-encoded; the client decodes before handing them to the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPayload {
    pub filename: String,
    pub filepath: PathBuf,
    pub data: String,
    #[serde(default)]
    pub references: Vec<BibliographyEntry>,
    #[serde(default)]
    pub index_data: ReferenceEdges,
    #[serde(default)]
    pub sidecar: Sidecar,
}

/// A decoded open payload, ready for the session controller.
#[derive(Debug, Clone)]
pub struct DocumentBundle {
    pub filename: String,
    pub filepath: PathBuf,
    pub bytes: Vec<u8>,
    pub references: Vec<BibliographyEntry>,
    pub edges: ReferenceEdges,
    pub sidecar: Sidecar,
}

impl OpenPayload {
    pub fn into_bundle(self) -> Result<DocumentBundle, ServiceError> {
        let bytes = BASE64
            .decode(self.data.as_bytes())
            .map_err(|err| anyhow::anyhow!("invalid base64 document payload: {err}"))?;
        Ok(DocumentBundle {
            filename: self.filename,
            filepath: self.filepath,
            bytes,
            references: self.references,
            edges: self.index_data,
            sidecar: self.sidecar,
        })
    }
}

/// Backend document service: metadata index, sidecar persistence, file picking.
#[async_trait]
pub trait PaperService: Send + Sync {
    /// Open via the platform file picker. `NoFileSelected` when dismissed.
    async fn open_pdf(&self) -> Result<OpenPayload, ServiceError>;
    async fn open_specific_pdf(&self, path: &Path) -> Result<OpenPayload, ServiceError>;
    async fn get_local_papers(&self) -> Result<Vec<PaperSummary>, ServiceError>;
    async fn save_highlight(
        &self,
        document: &Path,
        highlight: &Highlight,
    ) -> Result<(), ServiceError>;
    async fn delete_highlight(&self, document: &Path, timestamp: &str)
        -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// One page's render output: the raster plus its text layer.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub image: RenderImage,
    pub spans: Vec<TextSpan>,
}

/// A decoded document held by the rendering collaborator.
pub trait DocumentPages: Send + Sync {
    fn page_count(&self) -> usize;
    /// Native (scale 1.0) page size in pixels, width then height. 1-based page.
    fn native_size(&self, page_number: u32) -> Result<(f32, f32)>;
    /// Raster and text layer at the given scale. 1-based page.
    fn render_page(&self, page_number: u32, scale: f32) -> Result<RenderedPage>;
}

/// PDF rendering service entry point.
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn decode(&self, bytes: Vec<u8>) -> Result<Arc<dyn DocumentPages>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_decodes_base64_data() {
        let payload = OpenPayload {
            filename: "a.pdf".to_owned(),
            filepath: PathBuf::from("/papers/a.pdf"),
            data: BASE64.encode(b"%PDF-1.7 fake"),
            references: Vec::new(),
            index_data: ReferenceEdges::default(),
            sidecar: Sidecar::default(),
        };

        let bundle = payload.into_bundle().unwrap();
        assert_eq!(bundle.bytes, b"%PDF-1.7 fake");
    }

    #[test]
    fn corrupt_payload_is_a_backend_error() {
        let payload = OpenPayload {
            filename: "a.pdf".to_owned(),
            filepath: PathBuf::from("/papers/a.pdf"),
            data: "not base64!!".to_owned(),
            references: Vec::new(),
            index_data: ReferenceEdges::default(),
            sidecar: Sidecar::default(),
        };

        let err = payload.into_bundle().unwrap_err();
        assert!(!err.is_benign());
    }

    #[test]
    fn sidecar_defaults_to_empty_highlights() {
        let sidecar: Sidecar = serde_json::from_str("{}").unwrap();
        assert!(sidecar.highlights.is_empty());
    }
}
