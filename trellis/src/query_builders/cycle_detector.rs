use std::collections::HashSet;

use crate::types::{Result, TrellisError};

/// Tracks the navigation segments of the descent in progress.
///
/// A segment that is already on the active stack, or a full dotted path that
/// was already entered, would loop. Segment names compare ASCII
/// case-insensitively, matching how navigations are looked up.
#[derive(Debug, Clone, Default)]
pub struct CycleDetector {
    stack: Vec<String>,
    visited: HashSet<String>,
}

impl CycleDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn would_create_cycle(&self, segment: &str) -> bool {
        let segment = normalize(segment);
        self.stack.iter().any(|s| s.eq_ignore_ascii_case(&segment))
            || self.visited.contains(&self.candidate(&segment).to_ascii_lowercase())
    }

    pub fn enter_path(&mut self, segment: &str) -> Result<()> {
        let segment = normalize(segment);
        if self.would_create_cycle(&segment) {
            return Err(TrellisError::cycle(self.candidate(&segment), segment));
        }
        self.stack.push(segment);
        self.visited.insert(self.current_path().to_ascii_lowercase());
        Ok(())
    }

    /// Leave the innermost segment, returning it
    pub fn exit_path(&mut self) -> Option<String> {
        self.stack.pop()
    }

    pub fn reset(&mut self) {
        self.stack.clear();
        self.visited.clear();
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn current_path(&self) -> String {
        self.stack.join(".")
    }

    pub fn has_visited(&self, path: &str) -> bool {
        self.visited.contains(&normalize(path).to_ascii_lowercase())
    }

    fn candidate(&self, segment: &str) -> String {
        if self.stack.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", self.current_path(), segment)
        }
    }
}

fn normalize(segment: &str) -> String {
    segment.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_then_exit_restores_depth() {
        let mut detector = CycleDetector::new();
        detector.enter_path("Orders").unwrap();
        let depth = detector.depth();
        assert!(!detector.has_visited("Orders.Lines"));

        detector.enter_path("Lines").unwrap();
        assert_eq!(detector.exit_path().as_deref(), Some("Lines"));

        assert_eq!(detector.depth(), depth);
        assert!(detector.has_visited("Orders"));
        assert!(detector.has_visited("Orders.Lines"));
        assert!(!detector.has_visited("Customer"));
    }

    #[test]
    fn test_active_segment_cannot_be_reentered() {
        let mut detector = CycleDetector::new();
        detector.enter_path("Customer").unwrap();
        detector.enter_path("Orders").unwrap();
        assert!(detector.would_create_cycle("Customer"));
        assert!(detector.would_create_cycle(" customer "));

        match detector.enter_path("Customer") {
            Err(TrellisError::Cycle { path, segment }) => {
                assert_eq!(path, "Customer.Orders.Customer");
                assert_eq!(segment, "Customer");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(detector.depth(), 2);
    }

    #[test]
    fn test_visited_paths_are_not_reentered_until_reset() {
        let mut detector = CycleDetector::new();
        detector.enter_path("Orders").unwrap();
        detector.exit_path();
        assert!(detector.would_create_cycle("Orders"));

        detector.reset();
        assert_eq!(detector.depth(), 0);
        assert!(!detector.would_create_cycle("Orders"));
    }

    #[test]
    fn test_whitespace_is_ignored() {
        let mut detector = CycleDetector::new();
        detector.enter_path("  Orders ").unwrap();
        assert_eq!(detector.current_path(), "Orders");
    }
}
