//! File filtering for creation events.
//!
//! Filtering happens on the watcher thread before the stability wait, so a
//! file that doesn't match never costs a poll.
//!
//! # Examples
//!
//! ```
//! use ag_watcher::{FileFilter, PatternFilter};
//! use camino::Utf8Path;
//!
//! let filter = PatternFilter::new(r".*\.jpe?g$").unwrap();
//!
//! assert!(filter.should_process(Utf8Path::new("/srv/cam1/img1.jpg")));
//! assert!(!filter.should_process(Utf8Path::new("/srv/cam1/img1.jpg.part")));
//! ```

use camino::Utf8Path;
use regex::Regex;

use crate::error::WatchError;

/// A filter for determining which created files to process.
///
/// # Thread Safety
///
/// Filters must be [`Send`] and [`Sync`] because they are used from the
/// blocking watcher thread, and `'static` to be moved into it.
///
/// # Examples
///
/// ```
/// use ag_watcher::FileFilter;
/// use camino::Utf8Path;
///
/// struct NoHidden;
///
/// impl FileFilter for NoHidden {
///     fn should_process(&self, path: &Utf8Path) -> bool {
///         !path.file_name().is_some_and(|name| name.starts_with('.'))
///     }
/// }
///
/// assert!(!NoHidden.should_process(Utf8Path::new("/srv/.tmp123")));
/// ```
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if the file at the given path should be processed.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// A filter that accepts all files.
///
/// Used for directories without a configured `regexp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl FileFilter for AcceptAllFilter {
    #[inline]
    fn should_process(&self, _path: &Utf8Path) -> bool {
        true
    }
}

/// A filter backed by a regular expression.
///
/// The expression is searched (unanchored) in the full path, so a pattern
/// may constrain the directory part as well as the file name. Anchor it
/// with `^`/`$` for an exact match.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    pattern: Regex,
}

impl PatternFilter {
    /// Compiles a pattern filter.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidPattern`] if `pattern` doesn't compile.
    pub fn new(pattern: &str) -> Result<Self, WatchError> {
        let compiled = Regex::new(pattern).map_err(|source| WatchError::InvalidPattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        Ok(Self { pattern: compiled })
    }

    /// Returns the pattern source.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

impl FileFilter for PatternFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        self.pattern.is_match(path.as_str())
    }
}

/// Builds the filter for an optional configured pattern.
///
/// # Errors
///
/// Returns [`WatchError::InvalidPattern`] if the pattern doesn't compile.
pub fn filter_for(pattern: Option<&str>) -> Result<Box<dyn FileFilter>, WatchError> {
    match pattern {
        Some(pattern) => Ok(Box::new(PatternFilter::new(pattern)?)),
        None => Ok(Box::new(AcceptAllFilter)),
    }
}

// Implement FileFilter for boxed filters
impl<F: FileFilter + ?Sized> FileFilter for Box<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_all_filter() {
        let filter = AcceptAllFilter;
        assert!(filter.should_process(Utf8Path::new("anything.txt")));
        assert!(filter.should_process(Utf8Path::new("")));
    }

    #[test]
    fn test_pattern_filter_matches_suffix() {
        let filter = PatternFilter::new(r".*\.jpg$").expect("valid pattern");
        assert!(filter.should_process(Utf8Path::new("/srv/cam1/a.jpg")));
        assert!(!filter.should_process(Utf8Path::new("/srv/cam1/a.png")));
        assert!(!filter.should_process(Utf8Path::new("/srv/cam1/a.jpg.tmp")));
    }

    #[test]
    fn test_pattern_filter_is_unanchored() {
        let filter = PatternFilter::new("snapshot").expect("valid pattern");
        assert!(filter.should_process(Utf8Path::new("/srv/cam1/snapshot-001.jpg")));
        assert!(!filter.should_process(Utf8Path::new("/srv/cam1/motion-001.jpg")));
    }

    #[test]
    fn test_pattern_filter_rejects_invalid_regex() {
        let err = PatternFilter::new("[unclosed").expect_err("invalid pattern");
        assert!(matches!(err, WatchError::InvalidPattern { .. }));
    }

    #[test]
    fn test_filter_for_optional_pattern() {
        let all = filter_for(None).expect("accept all");
        assert!(all.should_process(Utf8Path::new("x.bin")));

        let jpg = filter_for(Some(r"\.jpg$")).expect("valid pattern");
        assert!(!jpg.should_process(Utf8Path::new("x.bin")));
        assert!(jpg.should_process(Utf8Path::new("x.jpg")));
    }

    #[test]
    fn test_boxed_filter_is_a_filter() {
        fn accepts<F: FileFilter>(filter: &F, path: &str) -> bool {
            filter.should_process(Utf8Path::new(path))
        }

        let boxed = filter_for(Some(r"\.png$")).expect("valid pattern");
        assert!(accepts(&boxed, "/srv/cam1/a.png"));
        assert!(!accepts(&boxed, "/srv/cam1/a.jpg"));
    }
}
