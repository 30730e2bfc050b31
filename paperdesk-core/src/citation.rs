//! Inline citation marker resolution.
//!
//! A bibliography entry's identity is its 1-based ordinal; inline markers like
//! "[3]" join against that ordinal in both directions. PDF text layers are
//! unreliable about how a marker lands in spans ("[ 3 ]", "[3" + "]", bare
//! "3"), so the forward search runs three tiers of decreasing strictness and
//! stops at the first hit.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::view::{PageSurface, SpanRef};

static MARKER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\[\s*(\d+)\s*\]\s*$").expect("valid marker pattern"));

/// One reference-list entry. `local_path` is set when the cited paper is
/// available in the local collection, enabling a direct-open action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BibliographyEntry {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct Bibliography {
    entries: Vec<BibliographyEntry>,
}

impl Bibliography {
    pub fn new(entries: Vec<BibliographyEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[BibliographyEntry] {
        &self.entries
    }

    /// Zero-based ordinal lookup.
    pub fn get(&self, ordinal: usize) -> Option<&BibliographyEntry> {
        self.entries.get(ordinal)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The literal marker string for an entry, e.g. ordinal 2 -> "[3]".
    pub fn marker_for(ordinal: usize) -> String {
        format!("[{}]", ordinal + 1)
    }
}

/// Reverse direction: span text -> zero-based ordinal, if the text is a marker.
pub fn marker_ordinal(text: &str) -> Option<usize> {
    let captures = MARKER_PATTERN.captures(text)?;
    let number: usize = captures[1].parse().ok()?;
    number.checked_sub(1)
}

/// Reverse direction with range check: out-of-range ordinals resolve to nothing.
pub fn resolve_marker_click(text: &str, bibliography_len: usize) -> Option<usize> {
    marker_ordinal(text).filter(|&ordinal| ordinal < bibliography_len)
}

/// Forward direction: find the span carrying the marker for `ordinal`.
///
/// Tier 1: exact trimmed text equality with "[n]".
/// Tier 2: equality after removing all internal whitespace ("[ 3 ]").
/// Tier 3: the bare number, or "[n" when the closing bracket was split off.
/// Within a tier the first span in document order wins; later tiers only run
/// when every earlier one found nothing.
pub fn find_marker_span(surfaces: &[PageSurface], ordinal: usize) -> Option<SpanRef> {
    let marker = Bibliography::marker_for(ordinal);
    let bare = (ordinal + 1).to_string();
    let truncated = format!("[{}", ordinal + 1);

    first_span(surfaces, |text| text.trim() == marker)
        .or_else(|| {
            first_span(surfaces, |text| {
                text.chars()
                    .filter(|c| !c.is_whitespace())
                    .eq(marker.chars())
            })
        })
        .or_else(|| {
            first_span(surfaces, |text| {
                let trimmed = text.trim();
                trimmed == bare || trimmed == truncated
            })
        })
}

fn first_span<F>(surfaces: &[PageSurface], mut matches: F) -> Option<SpanRef>
where
    F: FnMut(&str) -> bool,
{
    for surface in surfaces {
        for (index, span) in surface.spans.iter().enumerate() {
            if matches(&span.text) {
                return Some(SpanRef {
                    page: surface.number,
                    index,
                });
            }
        }
    }
    None
}
