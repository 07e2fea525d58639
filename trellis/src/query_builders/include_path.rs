use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::config::CompilerOptions;
use crate::types::{Result, TrellisError};

static SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

/// SQL fragments that never belong in a navigation path
const BLACKLIST: &[&str] = &[
    "select", "insert", "delete", "drop", "union", "truncate", "exec", "xp_", "--", "/*", "*/", ";",
];

/// Paths longer than this are checked for repeated segments
const REPETITION_MIN_SEGMENTS: usize = 4;
const REPETITION_MAX_OCCURRENCES: usize = 2;

/// Checks dotted include paths before any metadata lookup.
///
/// Accepted paths are remembered, so validating the same string again is
/// free.
#[derive(Debug, Clone)]
pub struct IncludePathValidator {
    max_path_length: usize,
    max_segment_length: usize,
    accepted: HashSet<String>,
}

impl IncludePathValidator {
    pub fn new(options: &CompilerOptions) -> Self {
        Self {
            max_path_length: options.max_path_length,
            max_segment_length: options.max_segment_length,
            accepted: HashSet::new(),
        }
    }

    pub fn validate(&mut self, path: &str) -> Result<()> {
        if self.accepted.contains(path) {
            return Ok(());
        }
        if let Err(err) = self.check(path) {
            log::warn!("rejected include path '{}': {}", path, err);
            return Err(err);
        }
        self.accepted.insert(path.to_string());
        Ok(())
    }

    fn check(&self, path: &str) -> Result<()> {
        let reject = |reason: String| Err(TrellisError::validation(path, reason));

        if path.trim().is_empty() {
            return reject("path is empty".into());
        }
        if path.len() > self.max_path_length {
            return reject(format!(
                "path is longer than {} characters",
                self.max_path_length
            ));
        }
        if path.contains("..") || path.contains("//") {
            return reject("path contains '..' or '//'".into());
        }

        let segments: Vec<&str> = path.split('.').collect();
        for segment in &segments {
            if segment.is_empty() {
                return reject("path contains an empty segment".into());
            }
            if segment.len() > self.max_segment_length {
                return reject(format!(
                    "segment '{}' is longer than {} characters",
                    segment, self.max_segment_length
                ));
            }
            if !SEGMENT.is_match(segment) {
                return reject(format!("segment '{}' is not a valid identifier", segment));
            }
        }

        let lowered = path.to_ascii_lowercase();
        if let Some(fragment) = BLACKLIST.iter().find(|f| lowered.contains(*f)) {
            return reject(format!("path contains forbidden fragment '{}'", fragment));
        }

        if segments.len() > REPETITION_MIN_SEGMENTS {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for segment in &segments {
                *counts.entry(*segment).or_default() += 1;
            }
            if let Some((segment, _)) = counts
                .iter()
                .find(|(_, count)| **count > REPETITION_MAX_OCCURRENCES)
            {
                return reject(format!("segment '{}' repeats too often", segment));
            }
        }

        Ok(())
    }
}

impl Default for IncludePathValidator {
    fn default() -> Self {
        Self::new(&CompilerOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejects(path: &str) -> bool {
        matches!(
            IncludePathValidator::default().validate(path),
            Err(TrellisError::Validation { .. })
        )
    }

    #[test]
    fn test_accepts_dotted_identifiers() {
        let mut validator = IncludePathValidator::default();
        assert!(validator.validate("Customer").is_ok());
        assert!(validator.validate("Orders.Lines._Product2").is_ok());
        // memoized
        assert!(validator.validate("Customer").is_ok());
    }

    #[test]
    fn test_rejects_malformed_paths() {
        assert!(rejects(""));
        assert!(rejects("   "));
        assert!(rejects("a..b"));
        assert!(rejects("a//b"));
        assert!(rejects("a."));
        assert!(rejects(".a"));
        assert!(rejects("1abc"));
        assert!(rejects("a-b"));
        assert!(rejects("Customer Orders"));
    }

    #[test]
    fn test_length_limits() {
        let segment = "a".repeat(64);
        assert!(IncludePathValidator::default().validate(&segment).is_ok());
        assert!(rejects(&"a".repeat(65)));

        let long_path = vec!["abcdefghij"; 46].join(".");
        assert!(long_path.len() > 500);
        assert!(rejects(&long_path));
    }

    #[test]
    fn test_path_length_boundary() {
        let mut segments: Vec<String> = (0..9).map(|i| format!("n{}{}", i, "a".repeat(48))).collect();
        segments.push(format!("z{}", "a".repeat(40)));
        let path = segments.join(".");
        assert_eq!(path.len(), 500);
        assert!(IncludePathValidator::default().validate(&path).is_ok());

        let over = format!("{}b", path);
        assert_eq!(over.len(), 501);
        match IncludePathValidator::default().validate(&over) {
            Err(TrellisError::Validation { reason, .. }) => assert!(reason.contains("500")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_sql_fragments_case_insensitively() {
        assert!(rejects("Orders.SelectedItems"));
        assert!(rejects("DROP_table"));
        assert!(rejects("xp_cmdshell"));
        assert!(rejects("Orders;"));
    }

    #[test]
    fn test_rejects_repetitive_long_paths() {
        assert!(rejects("A.B.A.C.A"));
        assert!(IncludePathValidator::default().validate("A.B.A.C.D").is_ok());
        // short paths are left to the cycle detector
        assert!(IncludePathValidator::default().validate("A.A.A").is_ok());
    }

    #[test]
    fn test_options_tighten_limits() {
        let options = CompilerOptions {
            max_path_length: 10,
            max_segment_length: 4,
            ..CompilerOptions::default()
        };
        let mut validator = IncludePathValidator::new(&options);
        assert!(validator.validate("Abcd.Efg").is_ok());
        assert!(validator.validate("Abcde").is_err());
        assert!(validator.validate("Abcd.Efgh.I").is_err());
    }
}
