//! Highlight ("memo") model and the per-session store.
//!
//! A highlight's identity is its creation timestamp; there is no other id. The
//! store keeps records in commit order and tracks each record's persistence
//! status so an optimistic local insert that never reached the backend is
//! distinguishable from a durably saved one.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::geometry::PageRect;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub text: String,
    /// 1-based page number.
    pub page: u32,
    /// Stored in native (scale 1.0) units; convert with the surface scale when drawing.
    pub rect: PageRect,
    pub color: String,
    /// RFC 3339 creation time, the primary key for deletion.
    pub timestamp: String,
}

impl Highlight {
    pub fn new(text: impl Into<String>, page: u32, rect: PageRect, color: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page,
            rect,
            color: color.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Where a record stands relative to the persistence collaborator. Never
/// serialized; sidecar records arrive `Confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct StoredHighlight {
    pub highlight: Highlight,
    pub status: PersistStatus,
}

#[derive(Debug, Default)]
pub struct HighlightStore {
    items: Vec<StoredHighlight>,
}

impl HighlightStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session swap: drop everything and adopt the sidecar's records.
    pub fn replace_all(&mut self, highlights: Vec<Highlight>) {
        self.items = highlights
            .into_iter()
            .map(|highlight| StoredHighlight {
                highlight,
                status: PersistStatus::Confirmed,
            })
            .collect();
    }

    /// Optimistic commit; the backend save settles the status later.
    pub fn insert_pending(&mut self, highlight: Highlight) {
        self.items.push(StoredHighlight {
            highlight,
            status: PersistStatus::Pending,
        });
    }

    pub fn mark_saved(&mut self, timestamp: &str) {
        self.set_status(timestamp, PersistStatus::Confirmed);
    }

    pub fn mark_failed(&mut self, timestamp: &str) {
        self.set_status(timestamp, PersistStatus::Failed);
    }

    fn set_status(&mut self, timestamp: &str, status: PersistStatus) {
        if let Some(item) = self
            .items
            .iter_mut()
            .find(|item| item.highlight.timestamp == timestamp)
        {
            item.status = status;
        }
    }

    /// Remove a record. Callers only invoke this after the backend confirmed
    /// the deletion; a failed backend delete must leave the store untouched.
    pub fn remove(&mut self, timestamp: &str) -> bool {
        let before = self.items.len();
        self.items
            .retain(|item| item.highlight.timestamp != timestamp);
        self.items.len() < before
    }

    pub fn get(&self, timestamp: &str) -> Option<&StoredHighlight> {
        self.items
            .iter()
            .find(|item| item.highlight.timestamp == timestamp)
    }

    pub fn for_page(&self, page: u32) -> impl Iterator<Item = &Highlight> {
        self.items
            .iter()
            .filter(move |item| item.highlight.page == page)
            .map(|item| &item.highlight)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredHighlight> {
        self.items.iter()
    }

    /// Records whose save never settled successfully, candidates for retry.
    pub fn unsettled(&self) -> impl Iterator<Item = &StoredHighlight> {
        self.items
            .iter()
            .filter(|item| item.status != PersistStatus::Confirmed)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: &str, page: u32) -> Highlight {
        Highlight {
            text: "quoted".to_owned(),
            page,
            rect: PageRect::new(10.0, 10.0, 80.0, 12.0),
            color: crate::view::HIGHLIGHT_COLOR.to_owned(),
            timestamp: timestamp.to_owned(),
        }
    }

    #[test]
    fn sidecar_records_arrive_confirmed() {
        let mut store = HighlightStore::new();
        store.replace_all(vec![sample("t1", 1), sample("t2", 3)]);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("t1").unwrap().status, PersistStatus::Confirmed);
        assert_eq!(store.for_page(3).count(), 1);
    }

    #[test]
    fn optimistic_insert_settles_on_save_outcome() {
        let mut store = HighlightStore::new();
        store.insert_pending(sample("t1", 1));
        assert_eq!(store.get("t1").unwrap().status, PersistStatus::Pending);

        store.mark_failed("t1");
        assert_eq!(store.get("t1").unwrap().status, PersistStatus::Failed);
        assert_eq!(store.unsettled().count(), 1);

        store.mark_saved("t1");
        assert_eq!(store.get("t1").unwrap().status, PersistStatus::Confirmed);
        assert_eq!(store.unsettled().count(), 0);
    }

    #[test]
    fn remove_is_keyed_by_timestamp() {
        let mut store = HighlightStore::new();
        store.replace_all(vec![sample("t1", 1), sample("t2", 1)]);

        assert!(store.remove("t1"));
        assert!(!store.remove("t1"));
        assert_eq!(store.len(), 1);
        assert!(store.get("t2").is_some());
    }

    #[test]
    fn timestamps_are_rfc3339() {
        let highlight = Highlight::new("x", 1, PageRect::new(0.0, 0.0, 1.0, 1.0), "c");
        assert!(chrono::DateTime::parse_from_rfc3339(&highlight.timestamp).is_ok());
    }
}
