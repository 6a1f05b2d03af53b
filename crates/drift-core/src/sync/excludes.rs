//! Exclude pattern matching

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{Error, Result};

/// Compiled glob exclusion rules for one sync folder.
///
/// A relative path is excluded when any of its segments (basename or
/// directory names) matches a pattern, or the full relative path does.
#[derive(Debug)]
pub struct ExcludeRules {
    set: GlobSet,
    patterns: Vec<String>,
}

impl ExcludeRules {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let trimmed = pattern.trim_end_matches('/');
            let glob = Glob::new(trimmed).map_err(|source| Error::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| Error::Pattern {
            pattern: patterns.join(","),
            source,
        })?;
        Ok(Self {
            set,
            patterns: patterns.to_vec(),
        })
    }

    /// Whether a `/`-separated relative path should be skipped.
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        if self.set.is_match(relative_path) {
            return true;
        }
        relative_path
            .split('/')
            .any(|segment| !segment.is_empty() && self.set.is_match(segment))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(patterns: &[&str]) -> ExcludeRules {
        let owned: Vec<String> = patterns.iter().map(|p| (*p).to_string()).collect();
        ExcludeRules::new(&owned).unwrap()
    }

    #[test]
    fn empty_rules_exclude_nothing() {
        let rules = rules(&[]);
        assert!(!rules.is_excluded("anything/at/all.txt"));
    }

    #[test]
    fn basename_patterns_match() {
        let rules = rules(&["*.tmp", ".DS_Store"]);
        assert!(rules.is_excluded("a/b/scratch.tmp"));
        assert!(rules.is_excluded(".DS_Store"));
        assert!(rules.is_excluded("photos/.DS_Store"));
        assert!(!rules.is_excluded("a/b/keep.txt"));
    }

    #[test]
    fn directory_segment_patterns_match() {
        let rules = rules(&["node_modules/", ".git"]);
        assert!(rules.is_excluded("node_modules/lodash/index.js"));
        assert!(rules.is_excluded("app/node_modules/x.js"));
        assert!(rules.is_excluded(".git/HEAD"));
        assert!(!rules.is_excluded("src/git_helpers.rs"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = ExcludeRules::new(&["[unclosed".to_string()]);
        assert!(matches!(err, Err(Error::Pattern { .. })));
    }
}
