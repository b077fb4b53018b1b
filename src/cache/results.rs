//! Operation Results
//!
//! Outcomes of manager operations. Batch operations never abort on a single
//! failing item; they collect an [`OperationError`] per item instead.

use std::time::Duration;

use regex::Regex;
use serde::Serialize;

use super::entry::{CacheKey, CacheType};
use crate::error::{Error, Result};

/// Failure of one item inside a batch operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationError {
    /// Key the failure belongs to, when there is one
    pub key: Option<String>,
    pub message: String,
}

impl OperationError {
    pub fn for_key(key: &CacheKey, error: &Error) -> Self {
        Self {
            key: Some(key.to_string()),
            message: error.to_string(),
        }
    }

    pub fn general(error: &Error) -> Self {
        Self {
            key: None,
            message: error.to_string(),
        }
    }
}

/// Outcome of a successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheWrite {
    /// Logical bytes now accounted for the entry
    pub logical_size: u64,
    /// Payload bytes stored
    pub stored_size: u64,
    pub compressed: bool,
    /// Entries evicted to make room
    pub evicted: usize,
    /// The write replaced an existing entry under the same key
    pub replaced: bool,
}

/// Outcome of [`cache_all`](super::CacheManager::cache_all)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BatchCacheResult {
    Success { stored: usize },
    PartialSuccess { stored: usize, errors: Vec<OperationError> },
    Failure { errors: Vec<OperationError> },
}

impl BatchCacheResult {
    pub(crate) fn from_parts(stored: usize, errors: Vec<OperationError>) -> Self {
        match (stored, errors.is_empty()) {
            (_, true) => BatchCacheResult::Success { stored },
            (0, false) => BatchCacheResult::Failure { errors },
            (_, false) => BatchCacheResult::PartialSuccess { stored, errors },
        }
    }

    pub fn stored(&self) -> usize {
        match self {
            BatchCacheResult::Success { stored } | BatchCacheResult::PartialSuccess { stored, .. } => {
                *stored
            }
            BatchCacheResult::Failure { .. } => 0,
        }
    }

    pub fn errors(&self) -> &[OperationError] {
        match self {
            BatchCacheResult::Success { .. } => &[],
            BatchCacheResult::PartialSuccess { errors, .. } | BatchCacheResult::Failure { errors } => {
                errors
            }
        }
    }
}

/// Selects the entries removed by an invalidation
#[derive(Debug, Clone)]
pub enum InvalidationPattern {
    /// Every entry of one type
    ByType(CacheType),
    /// Identifier prefix, within one type or across all of them
    ByPrefix {
        cache_type: Option<CacheType>,
        prefix: String,
    },
    /// Identifier regex, across all types
    ByRegex(Regex),
    All,
}

impl InvalidationPattern {
    pub fn by_type(cache_type: CacheType) -> Self {
        InvalidationPattern::ByType(cache_type)
    }

    /// Prefix scoped to one type
    pub fn by_prefix(cache_type: CacheType, prefix: impl Into<String>) -> Self {
        InvalidationPattern::ByPrefix {
            cache_type: Some(cache_type),
            prefix: prefix.into(),
        }
    }

    /// Prefix across all types
    pub fn by_prefix_any(prefix: impl Into<String>) -> Self {
        InvalidationPattern::ByPrefix {
            cache_type: None,
            prefix: prefix.into(),
        }
    }

    /// Compile a regex pattern
    pub fn by_regex(pattern: &str) -> Result<Self> {
        Ok(InvalidationPattern::ByRegex(Regex::new(pattern)?))
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            InvalidationPattern::ByType(t) => key.cache_type() == *t,
            InvalidationPattern::ByPrefix { cache_type, prefix } => {
                cache_type.map_or(true, |t| key.cache_type() == t)
                    && key.identifier().starts_with(prefix.as_str())
            }
            InvalidationPattern::ByRegex(re) => re.is_match(key.identifier()),
            InvalidationPattern::All => true,
        }
    }
}

impl std::fmt::Display for InvalidationPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationPattern::ByType(t) => write!(f, "type={t}"),
            InvalidationPattern::ByPrefix {
                cache_type: Some(t),
                prefix,
            } => write!(f, "type={t},prefix={prefix}"),
            InvalidationPattern::ByPrefix {
                cache_type: None,
                prefix,
            } => write!(f, "prefix={prefix}"),
            InvalidationPattern::ByRegex(re) => write!(f, "regex={}", re.as_str()),
            InvalidationPattern::All => write!(f, "all"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationResult {
    pub removed: usize,
    /// Logical bytes released
    pub bytes_freed: u64,
    pub errors: Vec<OperationError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreloadResult {
    pub loaded: usize,
    /// Already cached, unknown to the source, or no room without evicting
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<OperationError>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearResult {
    pub removed: usize,
    pub bytes_freed: u64,
    pub errors: Vec<OperationError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptimizationResult {
    pub expired_removed: usize,
    pub corrupted_removed: usize,
    /// Entries moved into a compacted table
    pub entries_compacted: usize,
    /// Table capacity released, in bytes
    pub bytes_freed: u64,
    pub elapsed: Duration,
    pub errors: Vec<OperationError>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_pattern_matching() {
        let note = CacheKey::new(CacheType::NoteContent, "user1/note-7");
        let search = CacheKey::new(CacheType::SearchResults, "user1/q=milk");

        assert!(InvalidationPattern::by_type(CacheType::NoteContent).matches(&note));
        assert!(!InvalidationPattern::by_type(CacheType::NoteContent).matches(&search));

        let scoped = InvalidationPattern::by_prefix(CacheType::SearchResults, "user1/");
        assert!(scoped.matches(&search));
        assert!(!scoped.matches(&note));

        let global = InvalidationPattern::by_prefix_any("user1/");
        assert!(global.matches(&search) && global.matches(&note));

        let re = InvalidationPattern::by_regex(r"note-\d+$").unwrap();
        assert!(re.matches(&note));
        assert!(!re.matches(&search));

        assert!(InvalidationPattern::All.matches(&note));
    }

    #[test]
    fn test_bad_regex() {
        assert_matches!(
            InvalidationPattern::by_regex("("),
            Err(Error::InvalidPattern(_))
        );
    }

    #[test]
    fn test_batch_result_classification() {
        let err = OperationError::general(&Error::Internal("x".into()));

        assert_matches!(
            BatchCacheResult::from_parts(3, vec![]),
            BatchCacheResult::Success { stored: 3 }
        );
        assert_matches!(
            BatchCacheResult::from_parts(0, vec![]),
            BatchCacheResult::Success { stored: 0 }
        );
        let partial = BatchCacheResult::from_parts(2, vec![err.clone()]);
        assert_matches!(partial, BatchCacheResult::PartialSuccess { stored: 2, .. });
        assert_eq!(partial.errors().len(), 1);

        let failure = BatchCacheResult::from_parts(0, vec![err]);
        assert_eq!(failure.stored(), 0);
        assert_matches!(failure, BatchCacheResult::Failure { .. });
    }

    #[test]
    fn test_pattern_display() {
        assert_eq!(
            InvalidationPattern::by_prefix(CacheType::NoteContent, "a").to_string(),
            "type=note_content,prefix=a"
        );
        assert_eq!(InvalidationPattern::All.to_string(), "all");
    }
}
