//! Cites / cited-by panel for the current document.
//!
//! Edge lists arrive as filenames from the externally computed index and are
//! resolved best-effort against the cached paper catalog: a hit renders with
//! its title and navigates to its filepath, a miss displays the bare filename
//! and goes nowhere.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::papers::PaperCatalog;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEdges {
    #[serde(default)]
    pub cites: Vec<String>,
    #[serde(default)]
    pub cited_by: Vec<String>,
}

impl ReferenceEdges {
    pub fn is_empty(&self) -> bool {
        self.cites.is_empty() && self.cited_by.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPaper {
    pub title: String,
    pub filepath: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub filename: String,
    pub resolved: Option<ResolvedPaper>,
}

impl GraphNode {
    pub fn label(&self) -> &str {
        self.resolved
            .as_ref()
            .map(|paper| paper.title.as_str())
            .unwrap_or(&self.filename)
    }

    pub fn is_navigable(&self) -> bool {
        self.resolved.is_some()
    }

    pub fn target(&self) -> Option<&Path> {
        self.resolved.as_ref().map(|paper| paper.filepath.as_path())
    }
}

/// The rendered panel. Hidden when both edge lists are empty; otherwise shown,
/// with an empty side rendering an explicit empty-state placeholder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferencePanel {
    pub visible: bool,
    pub cites: Vec<GraphNode>,
    pub cited_by: Vec<GraphNode>,
}

pub fn resolve_panel(edges: &ReferenceEdges, catalog: &PaperCatalog) -> ReferencePanel {
    if edges.is_empty() {
        return ReferencePanel::default();
    }

    ReferencePanel {
        visible: true,
        cites: resolve_side(&edges.cites, catalog),
        cited_by: resolve_side(&edges.cited_by, catalog),
    }
}

fn resolve_side(filenames: &[String], catalog: &PaperCatalog) -> Vec<GraphNode> {
    filenames
        .iter()
        .map(|filename| GraphNode {
            filename: filename.clone(),
            resolved: catalog.resolve(filename).map(|paper| ResolvedPaper {
                title: paper.title.clone(),
                filepath: paper.filepath.clone(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::papers::PaperSummary;

    fn catalog_with(filename: &str, title: &str) -> PaperCatalog {
        let mut catalog = PaperCatalog::new();
        catalog
            .update(vec![PaperSummary {
                filename: filename.to_owned(),
                filepath: PathBuf::from(format!("/papers/{filename}")),
                title: title.to_owned(),
                ..Default::default()
            }])
            .unwrap();
        catalog
    }

    #[test]
    fn known_filename_resolves_to_navigable_node() {
        let catalog = catalog_with("doe.pdf", "Doe 2021");
        let edges = ReferenceEdges {
            cites: vec!["doe.pdf".to_owned()],
            cited_by: Vec::new(),
        };

        let panel = resolve_panel(&edges, &catalog);
        assert!(panel.visible);
        assert_eq!(panel.cites[0].label(), "Doe 2021");
        assert!(panel.cites[0].is_navigable());
        assert_eq!(
            panel.cites[0].target(),
            Some(Path::new("/papers/doe.pdf"))
        );
        assert!(panel.cited_by.is_empty());
    }

    #[test]
    fn unknown_filename_displays_as_itself_without_navigation() {
        let catalog = catalog_with("doe.pdf", "Doe 2021");
        let edges = ReferenceEdges {
            cites: Vec::new(),
            cited_by: vec!["mystery.pdf".to_owned()],
        };

        let panel = resolve_panel(&edges, &catalog);
        assert!(panel.visible);
        assert_eq!(panel.cited_by[0].label(), "mystery.pdf");
        assert!(!panel.cited_by[0].is_navigable());
        assert_eq!(panel.cited_by[0].target(), None);
    }

    #[test]
    fn panel_collapses_only_when_both_sides_are_empty() {
        let catalog = PaperCatalog::new();
        assert!(!resolve_panel(&ReferenceEdges::default(), &catalog).visible);

        let one_sided = ReferenceEdges {
            cites: vec!["a.pdf".to_owned()],
            cited_by: Vec::new(),
        };
        assert!(resolve_panel(&one_sided, &catalog).visible);
    }
}
