//! Exclude patterns.
//!
//! Patterns are glob-like lines where `*` matches any run of characters.
//! Each is turned into a regular expression by replacing `*` with `.*`
//! (the rest of the line is taken as regex syntax) and matched unanchored
//! against the full path. Directories are tested with a trailing `/`, so
//! `*/.git/*` prunes every `.git` directory without descending into it.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

/// Errors while building an [`ExcludeMatcher`].
#[derive(thiserror::Error, Debug)]
pub enum ExcludeError {
    /// The pattern file could not be read.
    #[error("Cannot read exclude file {path}: {source}")]
    Read {
        /// Pattern file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A pattern did not compile.
    #[error("Invalid exclude pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Pattern as written
        pattern: String,
        /// Compile error
        #[source]
        source: regex::Error,
    },
}

/// Compiled exclude patterns.
#[derive(Debug, Clone, Default)]
pub struct ExcludeMatcher {
    patterns: Vec<Regex>,
}

impl ExcludeMatcher {
    /// A matcher that excludes nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile a list of patterns. Blank entries are ignored.
    ///
    /// # Errors
    ///
    /// [`ExcludeError::InvalidPattern`] for the first pattern that fails.
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self, ExcludeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            let regex = Regex::new(&pattern.replace('*', ".*")).map_err(|source| {
                ExcludeError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                }
            })?;
            log::debug!("Loaded exclude pattern: {pattern}");
            compiled.push(regex);
        }
        Ok(Self { patterns: compiled })
    }

    /// Load one pattern per line. Lines starting with `#` are comments.
    ///
    /// # Errors
    ///
    /// [`ExcludeError::Read`] if the file cannot be read, or
    /// [`ExcludeError::InvalidPattern`].
    pub fn from_file(path: &Path) -> Result<Self, ExcludeError> {
        let content = fs::read_to_string(path).map_err(|source| ExcludeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_patterns(
            content
                .lines()
                .filter(|line| !line.trim_start().starts_with('#')),
        )
    }

    /// Append the patterns of `other`.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.patterns.extend(other.patterns);
        self
    }

    /// Number of compiled patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no patterns are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `path` matches any pattern.
    #[must_use]
    pub fn should_exclude(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let path = path.to_string_lossy();
        self.patterns.iter().any(|re| re.is_match(&path))
    }

    /// Whether a directory matches; tested with a trailing separator.
    #[must_use]
    pub fn should_exclude_dir(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let mut path = path.to_string_lossy().into_owned();
        if !path.ends_with('/') {
            path.push('/');
        }
        self.patterns.iter().any(|re| re.is_match(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_git_pattern_matches_dir_and_contents() {
        let m = ExcludeMatcher::from_patterns(["*/.git/*"]).unwrap();
        assert!(m.should_exclude_dir(Path::new("/root/project/.git")));
        assert!(m.should_exclude(Path::new("/root/project/.git/config")));
        assert!(!m.should_exclude(Path::new("/root/project/src/main.rs")));
        assert!(!m.should_exclude_dir(Path::new("/root/project/.github")));
    }

    #[test]
    fn test_unanchored_match() {
        let m = ExcludeMatcher::from_patterns(["node_modules"]).unwrap();
        assert!(m.should_exclude(Path::new("/a/node_modules/x.js")));
    }

    #[test]
    fn test_empty_matcher_excludes_nothing() {
        let m = ExcludeMatcher::empty();
        assert!(m.is_empty());
        assert!(!m.should_exclude(Path::new("/anything")));
        assert!(!m.should_exclude_dir(Path::new("/anything")));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = ExcludeMatcher::from_patterns(["foo(["]).unwrap_err();
        assert!(matches!(err, ExcludeError::InvalidPattern { .. }));
    }

    #[test]
    fn test_from_file_skips_comments_and_blanks() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# caches").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "*/.cache/*").unwrap();
        writeln!(file, "*.tmp").unwrap();

        let m = ExcludeMatcher::from_file(file.path()).unwrap();
        assert_eq!(m.len(), 2);
        assert!(m.should_exclude(Path::new("/x/y.tmp")));
    }

    #[test]
    fn test_from_missing_file() {
        let err = ExcludeMatcher::from_file(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, ExcludeError::Read { .. }));
    }

    #[test]
    fn test_merge_keeps_both_sets() {
        let a = ExcludeMatcher::from_patterns(["*.tmp"]).unwrap();
        let b = ExcludeMatcher::from_patterns(["*/.git/*"]).unwrap();
        let m = a.merge(b);
        assert_eq!(m.len(), 2);
        assert!(m.should_exclude(Path::new("/x/a.tmp")));
        assert!(m.should_exclude_dir(Path::new("/x/.git")));
    }
}
