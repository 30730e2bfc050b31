//! Filesystem-backed paper service.
//!
//! A papers directory holds the PDFs, one optional `.json` sidecar per PDF
//! (highlights and other personal data), and a `papers_index.json` written by
//! the external indexer. This crate only ever reads the index; sidecars are
//! the one thing it writes, atomically via a temp file and rename.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, instrument, warn};

use paperdesk_core::{
    BibliographyEntry, Highlight, OpenPayload, PaperService, PaperSummary, ReferenceEdges,
    ServiceError, Sidecar,
};

const INDEX_FILENAME: &str = "papers_index.json";

/// Platform file-picker seam. The desktop shell supplies a real dialog; the
/// default picker selects nothing, which surfaces as the benign
/// `NoFileSelected` outcome.
pub trait FilePicker: Send + Sync {
    fn pick_pdf(&self) -> Option<PathBuf>;
}

/// Picker for headless contexts; never selects anything.
pub struct NullPicker;

impl FilePicker for NullPicker {
    fn pick_pdf(&self) -> Option<PathBuf> {
        None
    }
}

/// One paper's record in `papers_index.json`, keyed by filename.
#[derive(Debug, Clone, Default, Deserialize)]
struct IndexEntry {
    #[serde(default)]
    filepath: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default, deserialize_with = "year_from_any")]
    year: String,
    #[serde(default)]
    references: Vec<IndexReference>,
    #[serde(default)]
    cites: Vec<String>,
    #[serde(default)]
    cited_by: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct IndexReference {
    #[serde(default)]
    text: String,
    #[serde(default)]
    title: String,
}

// The indexer writes the year as a bare number when it came from the paper
// metadata and as a string otherwise.
fn year_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

pub struct FsPaperStore {
    papers_dir: PathBuf,
    picker: Box<dyn FilePicker>,
}

impl FsPaperStore {
    pub fn new(papers_dir: PathBuf, picker: Box<dyn FilePicker>) -> Result<Self, ServiceError> {
        fs::create_dir_all(&papers_dir).map_err(|err| {
            ServiceError::Backend(anyhow::anyhow!(
                "failed to create papers directory {:?}: {err}",
                papers_dir
            ))
        })?;
        Ok(Self { papers_dir, picker })
    }

    pub fn papers_dir(&self) -> &Path {
        &self.papers_dir
    }

    /// Sidecar sits next to the PDF with the extension swapped for `.json`.
    fn sidecar_path(pdf_path: &Path) -> PathBuf {
        pdf_path.with_extension("json")
    }

    fn load_sidecar(pdf_path: &Path) -> Result<Sidecar, ServiceError> {
        let path = Self::sidecar_path(pdf_path);
        if !path.exists() {
            return Ok(Sidecar::default());
        }
        let raw = fs::read_to_string(&path).map_err(|err| {
            ServiceError::Backend(anyhow::anyhow!("failed to read sidecar {:?}: {err}", path))
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            ServiceError::Backend(anyhow::anyhow!("failed to decode sidecar {:?}: {err}", path))
        })
    }

    fn save_sidecar(pdf_path: &Path, sidecar: &Sidecar) -> Result<(), ServiceError> {
        let path = Self::sidecar_path(pdf_path);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(sidecar)
            .map_err(|err| ServiceError::Backend(anyhow::anyhow!("failed to encode sidecar: {err}")))?;
        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(payload.as_bytes())?;
            file.flush()?;
            fs::rename(&tmp, &path)
        };
        write().map_err(|err| {
            ServiceError::Backend(anyhow::anyhow!("failed to write sidecar {:?}: {err}", path))
        })
    }

    /// Missing or unreadable index degrades to an empty one; papers still open,
    /// just without graph data.
    fn load_index(&self) -> BTreeMap<String, IndexEntry> {
        let path = self.papers_dir.join(INDEX_FILENAME);
        if !path.exists() {
            return BTreeMap::new();
        }
        match fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(anyhow::Error::from))
        {
            Ok(index) => index,
            Err(err) => {
                warn!(?err, path = %path.display(), "failed to load paper index");
                BTreeMap::new()
            }
        }
    }

    fn entry_filepath(&self, filename: &str, entry: &IndexEntry) -> PathBuf {
        if entry.filepath.is_empty() {
            self.papers_dir.join(filename)
        } else {
            PathBuf::from(&entry.filepath)
        }
    }

    /// Attach local paths to reference entries: a reference whose title matches
    /// (case-insensitively) one of the cited local papers gets that paper's
    /// path, enabling a direct-open action in the reference list.
    fn format_references(
        &self,
        entry: &IndexEntry,
        index: &BTreeMap<String, IndexEntry>,
    ) -> Vec<BibliographyEntry> {
        entry
            .references
            .iter()
            .map(|reference| {
                let title = reference.title.to_lowercase();
                let local_path = if title.is_empty() {
                    None
                } else {
                    entry.cites.iter().find_map(|cited_filename| {
                        let cited = index.get(cited_filename)?;
                        (cited.title.to_lowercase() == title)
                            .then(|| self.entry_filepath(cited_filename, cited))
                    })
                };
                BibliographyEntry {
                    text: reference.text.clone(),
                    local_path,
                }
            })
            .collect()
    }
}

#[async_trait]
impl PaperService for FsPaperStore {
    async fn open_pdf(&self) -> Result<OpenPayload, ServiceError> {
        let path = self.picker.pick_pdf().ok_or(ServiceError::NoFileSelected)?;
        self.open_specific_pdf(&path).await
    }

    #[instrument(skip(self))]
    async fn open_specific_pdf(&self, path: &Path) -> Result<OpenPayload, ServiceError> {
        if !path.exists() {
            return Err(ServiceError::NotFound(path.to_path_buf()));
        }
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = fs::read(path).map_err(|err| {
            ServiceError::Backend(anyhow::anyhow!("failed to read {:?}: {err}", path))
        })?;
        let sidecar = Self::load_sidecar(path)?;

        let index = self.load_index();
        let (references, index_data) = match index.get(&filename) {
            Some(entry) => (
                self.format_references(entry, &index),
                ReferenceEdges {
                    cites: entry.cites.clone(),
                    cited_by: entry.cited_by.clone(),
                },
            ),
            None => {
                debug!(filename, "paper not present in index");
                (Vec::new(), ReferenceEdges::default())
            }
        };

        Ok(OpenPayload {
            filename,
            filepath: path.to_path_buf(),
            data: BASE64.encode(&bytes),
            references,
            index_data,
            sidecar,
        })
    }

    async fn get_local_papers(&self) -> Result<Vec<PaperSummary>, ServiceError> {
        let index = self.load_index();
        let mut papers = Vec::with_capacity(index.len());
        for (filename, entry) in &index {
            let filepath = self.entry_filepath(filename, entry);
            // Memo counts come from the personal sidecar, not the shared index.
            let memos_count = match Self::load_sidecar(&filepath) {
                Ok(sidecar) => sidecar.highlights.len(),
                Err(err) => {
                    warn!(?err, filename, "unreadable sidecar; counting no memos");
                    0
                }
            };
            papers.push(PaperSummary {
                filename: filename.clone(),
                filepath,
                title: if entry.title.is_empty() {
                    filename.clone()
                } else {
                    entry.title.clone()
                },
                authors: format_authors(&entry.authors),
                year: entry.year.clone(),
                cites_count: entry.cites.len(),
                cited_by_count: entry.cited_by.len(),
                memos_count,
            });
        }
        Ok(papers)
    }

    #[instrument(skip(self, highlight), fields(timestamp = %highlight.timestamp))]
    async fn save_highlight(
        &self,
        document: &Path,
        highlight: &Highlight,
    ) -> Result<(), ServiceError> {
        let mut sidecar = Self::load_sidecar(document)?;
        sidecar.highlights.push(highlight.clone());
        Self::save_sidecar(document, &sidecar)?;
        debug!(path = %document.display(), "saved highlight");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_highlight(&self, document: &Path, timestamp: &str) -> Result<(), ServiceError> {
        let mut sidecar = Self::load_sidecar(document)?;
        let before = sidecar.highlights.len();
        sidecar.highlights.retain(|h| h.timestamp != timestamp);
        if sidecar.highlights.len() == before {
            return Err(ServiceError::HighlightNotFound(timestamp.to_owned()));
        }
        Self::save_sidecar(document, &sidecar)?;
        debug!(path = %document.display(), "deleted highlight");
        Ok(())
    }
}

/// Sidebar author line: first two names, then "et al." when more follow.
fn format_authors(authors: &[String]) -> String {
    let mut line = authors
        .iter()
        .take(2)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if authors.len() > 2 {
        line.push_str(" et al.");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperdesk_core::PageRect;
    use tempfile::{tempdir, TempDir};

    fn store() -> (TempDir, FsPaperStore) {
        let dir = tempdir().unwrap();
        let store = FsPaperStore::new(dir.path().to_path_buf(), Box::new(NullPicker)).unwrap();
        (dir, store)
    }

    fn write_pdf(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"%PDF-1.7 stub").unwrap();
        path
    }

    fn highlight(timestamp: &str) -> Highlight {
        Highlight {
            text: "quoted".to_owned(),
            page: 1,
            rect: PageRect::new(10.0, 10.0, 80.0, 12.0),
            color: "rgba(250, 204, 21, 0.4)".to_owned(),
            timestamp: timestamp.to_owned(),
        }
    }

    struct StaticPicker(PathBuf);

    impl FilePicker for StaticPicker {
        fn pick_pdf(&self) -> Option<PathBuf> {
            Some(self.0.clone())
        }
    }

    #[tokio::test]
    async fn sidecar_round_trips_through_save_and_open() {
        let (dir, store) = store();
        let pdf = write_pdf(&dir, "a.pdf");

        store.save_highlight(&pdf, &highlight("t1")).await.unwrap();
        store.save_highlight(&pdf, &highlight("t2")).await.unwrap();

        assert!(dir.path().join("a.json").exists());
        let payload = store.open_specific_pdf(&pdf).await.unwrap();
        assert_eq!(payload.sidecar.highlights.len(), 2);
        assert_eq!(payload.sidecar.highlights[0].timestamp, "t1");
        assert_eq!(
            BASE64.decode(payload.data.as_bytes()).unwrap(),
            b"%PDF-1.7 stub"
        );
    }

    #[tokio::test]
    async fn delete_is_keyed_by_timestamp() {
        let (dir, store) = store();
        let pdf = write_pdf(&dir, "a.pdf");
        store.save_highlight(&pdf, &highlight("t1")).await.unwrap();

        let missing = store.delete_highlight(&pdf, "t9").await.unwrap_err();
        assert!(matches!(missing, ServiceError::HighlightNotFound(_)));

        store.delete_highlight(&pdf, "t1").await.unwrap();
        let payload = store.open_specific_pdf(&pdf).await.unwrap();
        assert!(payload.sidecar.highlights.is_empty());
    }

    #[tokio::test]
    async fn unknown_sidecar_keys_survive_a_save() {
        let (dir, store) = store();
        let pdf = write_pdf(&dir, "a.pdf");
        fs::write(
            dir.path().join("a.json"),
            r#"{"highlights": [], "memos": ["keep me"]}"#,
        )
        .unwrap();

        store.save_highlight(&pdf, &highlight("t1")).await.unwrap();

        let raw = fs::read_to_string(dir.path().join("a.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["memos"][0], "keep me");
        assert_eq!(value["highlights"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_pdf_is_not_found() {
        let (dir, store) = store();
        let err = store
            .open_specific_pdf(&dir.path().join("missing.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(!err.is_benign());
    }

    #[tokio::test]
    async fn null_picker_is_benign() {
        let (_dir, store) = store();
        let err = store.open_pdf().await.unwrap_err();
        assert!(err.is_benign());
    }

    #[tokio::test]
    async fn picker_selection_opens_the_file() {
        let dir = tempdir().unwrap();
        let pdf = dir.path().join("picked.pdf");
        fs::write(&pdf, b"%PDF").unwrap();
        let store = FsPaperStore::new(
            dir.path().to_path_buf(),
            Box::new(StaticPicker(pdf.clone())),
        )
        .unwrap();

        let payload = store.open_pdf().await.unwrap();
        assert_eq!(payload.filename, "picked.pdf");
        assert_eq!(payload.filepath, pdf);
    }

    fn write_index(dir: &TempDir, json: &str) {
        fs::write(dir.path().join(INDEX_FILENAME), json).unwrap();
    }

    #[tokio::test]
    async fn paper_list_merges_index_and_sidecar() {
        let (dir, store) = store();
        let pdf = write_pdf(&dir, "smith.pdf");
        write_pdf(&dir, "doe.pdf");
        store.save_highlight(&pdf, &highlight("t1")).await.unwrap();

        write_index(
            &dir,
            &format!(
                r#"{{
                    "smith.pdf": {{
                        "filename": "smith.pdf",
                        "filepath": "{smith}",
                        "title": "Paper One",
                        "authors": ["Ada Smith", "Bob Jones", "Cho Lee"],
                        "year": 2020,
                        "cites": ["doe.pdf"],
                        "cited_by": []
                    }},
                    "doe.pdf": {{
                        "filename": "doe.pdf",
                        "title": "Paper Two",
                        "authors": ["Dana Doe"],
                        "year": "2021",
                        "cites": [],
                        "cited_by": ["smith.pdf"]
                    }}
                }}"#,
                smith = pdf.display()
            ),
        );

        let papers = store.get_local_papers().await.unwrap();
        assert_eq!(papers.len(), 2);

        let smith = papers.iter().find(|p| p.filename == "smith.pdf").unwrap();
        assert_eq!(smith.title, "Paper One");
        assert_eq!(smith.authors, "Ada Smith, Bob Jones et al.");
        assert_eq!(smith.year, "2020");
        assert_eq!(smith.cites_count, 1);
        assert_eq!(smith.memos_count, 1);

        let doe = papers.iter().find(|p| p.filename == "doe.pdf").unwrap();
        assert_eq!(doe.authors, "Dana Doe");
        // Missing filepath falls back to the papers directory.
        assert_eq!(doe.filepath, dir.path().join("doe.pdf"));
        assert_eq!(doe.cited_by_count, 1);
        assert_eq!(doe.memos_count, 0);
    }

    #[tokio::test]
    async fn references_gain_local_paths_by_title_match() {
        let (dir, store) = store();
        let pdf = write_pdf(&dir, "smith.pdf");
        write_pdf(&dir, "doe.pdf");

        write_index(
            &dir,
            r#"{
                "smith.pdf": {
                    "filename": "smith.pdf",
                    "title": "Paper One",
                    "references": [
                        {"text": "D. Doe (2021). Paper Two", "title": "Paper TWO"},
                        {"text": "Unknown, elsewhere (2019)"}
                    ],
                    "cites": ["doe.pdf"],
                    "cited_by": []
                },
                "doe.pdf": {
                    "filename": "doe.pdf",
                    "title": "Paper Two",
                    "cites": [],
                    "cited_by": ["smith.pdf"]
                }
            }"#,
        );

        let payload = store.open_specific_pdf(&pdf).await.unwrap();
        assert_eq!(payload.references.len(), 2);
        assert_eq!(
            payload.references[0].local_path,
            Some(dir.path().join("doe.pdf"))
        );
        assert_eq!(payload.references[1].local_path, None);
        assert_eq!(payload.index_data.cites, vec!["doe.pdf".to_owned()]);
        assert_eq!(payload.index_data.cited_by, Vec::<String>::new());
    }

    #[tokio::test]
    async fn corrupt_index_degrades_to_empty_graph() {
        let (dir, store) = store();
        let pdf = write_pdf(&dir, "a.pdf");
        write_index(&dir, "not json {");

        let payload = store.open_specific_pdf(&pdf).await.unwrap();
        assert!(payload.references.is_empty());
        assert!(payload.index_data.is_empty());
        assert!(store.get_local_papers().await.unwrap().is_empty());
    }
}
