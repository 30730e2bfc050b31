//! The local paper collection as seen by the sidebar: enriched summaries from
//! the backend index, cached and refreshed by an idempotent poll.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{document_id_for_path, DocumentId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperSummary {
    pub filename: String,
    pub filepath: PathBuf,
    pub title: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub cites_count: usize,
    #[serde(default)]
    pub cited_by_count: usize,
    #[serde(default)]
    pub memos_count: usize,
}

impl PaperSummary {
    /// Total graph connectivity, shown as the link badge.
    pub fn link_count(&self) -> usize {
        self.cites_count + self.cited_by_count
    }
}

/// Cached collection of locally indexed papers.
///
/// `update` deduplicates poll ticks by comparing the serialized snapshot with
/// the previous one; identical content is a no-op, so overlapping polls can
/// never churn the rendered list. Lookups go through the path-derived document
/// id first, with the filename kept as a display-level fallback.
#[derive(Debug, Default)]
pub struct PaperCatalog {
    papers: Vec<PaperSummary>,
    by_id: HashMap<DocumentId, usize>,
    by_filename: HashMap<String, usize>,
    snapshot: String,
}

impl PaperCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a freshly polled paper list. Returns whether anything changed.
    pub fn update(&mut self, papers: Vec<PaperSummary>) -> Result<bool> {
        let snapshot = serde_json::to_string(&papers)?;
        if snapshot == self.snapshot {
            return Ok(false);
        }

        self.by_id = papers
            .iter()
            .enumerate()
            .map(|(index, paper)| (document_id_for_path(&paper.filepath), index))
            .collect();
        self.by_filename = papers
            .iter()
            .enumerate()
            .map(|(index, paper)| (paper.filename.clone(), index))
            .collect();
        self.papers = papers;
        self.snapshot = snapshot;
        Ok(true)
    }

    pub fn papers(&self) -> &[PaperSummary] {
        &self.papers
    }

    pub fn by_path(&self, path: &Path) -> Option<&PaperSummary> {
        let id = document_id_for_path(path);
        self.by_id.get(&id).map(|&index| &self.papers[index])
    }

    pub fn by_filename(&self, filename: &str) -> Option<&PaperSummary> {
        self.by_filename
            .get(filename)
            .map(|&index| &self.papers[index])
    }

    /// Resolve a graph key: stable id when the key is a known path, filename
    /// otherwise.
    pub fn resolve(&self, key: &str) -> Option<&PaperSummary> {
        self.by_path(Path::new(key))
            .or_else(|| self.by_filename(key))
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(filename: &str, title: &str) -> PaperSummary {
        PaperSummary {
            filename: filename.to_owned(),
            filepath: PathBuf::from(format!("/papers/{filename}")),
            title: title.to_owned(),
            authors: "Smith, Doe".to_owned(),
            year: "2020".to_owned(),
            cites_count: 1,
            cited_by_count: 2,
            memos_count: 0,
        }
    }

    #[test]
    fn identical_polls_are_no_ops() {
        let mut catalog = PaperCatalog::new();
        let papers = vec![paper("a.pdf", "Paper A"), paper("b.pdf", "Paper B")];

        assert!(catalog.update(papers.clone()).unwrap());
        assert!(!catalog.update(papers.clone()).unwrap());
        assert_eq!(catalog.len(), 2);

        let mut changed = papers;
        changed[0].memos_count = 3;
        assert!(catalog.update(changed).unwrap());
        assert_eq!(catalog.by_filename("a.pdf").unwrap().memos_count, 3);
    }

    #[test]
    fn first_empty_poll_still_counts_as_a_change() {
        let mut catalog = PaperCatalog::new();
        assert!(catalog.update(Vec::new()).unwrap());
        assert!(!catalog.update(Vec::new()).unwrap());
    }

    #[test]
    fn lookup_by_filename_and_path() {
        let mut catalog = PaperCatalog::new();
        catalog.update(vec![paper("a.pdf", "Paper A")]).unwrap();

        assert_eq!(catalog.by_filename("a.pdf").unwrap().title, "Paper A");
        assert!(catalog.by_filename("missing.pdf").is_none());
        assert_eq!(
            catalog.by_path(Path::new("/papers/a.pdf")).unwrap().title,
            "Paper A"
        );
        assert_eq!(catalog.resolve("a.pdf").unwrap().title, "Paper A");
        assert_eq!(catalog.resolve("/papers/a.pdf").unwrap().title, "Paper A");
    }

    #[test]
    fn link_badge_sums_both_directions() {
        assert_eq!(paper("a.pdf", "A").link_count(), 3);
    }
}
