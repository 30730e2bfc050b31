//! Back-navigation history across document switches.

use std::path::{Path, PathBuf};

/// Stack of previously open document paths. A path is pushed only when a
/// document was actually open, the new path differs, and the switch was not
/// itself a back navigation; popping and reopening therefore never grows the
/// stack.
#[derive(Debug, Default)]
pub struct NavigationHistory {
    stack: Vec<PathBuf>,
}

impl NavigationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `current` was pushed.
    pub fn record_if_needed(&mut self, current: Option<&Path>, next: &Path, is_back: bool) -> bool {
        match current {
            Some(current) if !is_back && current != next => {
                self.stack.push(current.to_path_buf());
                true
            }
            _ => false,
        }
    }

    pub fn go_back(&mut self) -> Option<PathBuf> {
        self.stack.pop()
    }

    /// The back control is shown iff this is true.
    pub fn back_visible(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_a_b_c_then_back_twice_yields_b_then_a() {
        let mut history = NavigationHistory::new();
        let (a, b, c) = (Path::new("a.pdf"), Path::new("b.pdf"), Path::new("c.pdf"));

        assert!(!history.record_if_needed(None, a, false));
        assert!(history.record_if_needed(Some(a), b, false));
        assert!(history.record_if_needed(Some(b), c, false));
        assert!(history.back_visible());

        assert_eq!(history.go_back().as_deref(), Some(b));
        assert_eq!(history.go_back().as_deref(), Some(a));
        assert_eq!(history.go_back(), None);
        assert!(!history.back_visible());
    }

    #[test]
    fn reopening_the_same_path_does_not_push() {
        let mut history = NavigationHistory::new();
        let a = Path::new("a.pdf");
        assert!(!history.record_if_needed(Some(a), a, false));
        assert!(history.is_empty());
    }

    #[test]
    fn back_navigation_does_not_push() {
        let mut history = NavigationHistory::new();
        let (a, b) = (Path::new("a.pdf"), Path::new("b.pdf"));
        assert!(!history.record_if_needed(Some(b), a, true));
        assert!(history.is_empty());
    }
}
