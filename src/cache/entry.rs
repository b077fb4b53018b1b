//! Cache Keys and Entries
//!
//! Composite keys partitioned by content type, per-value access metadata and
//! the internal entry record owned by the manager's store.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::compression::CompressionAlgorithm;
use super::policy::{CachePolicy, EvictionCandidate};

/// Namespace of a cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    NoteContent,
    NoteMetadata,
    SearchResults,
    AiProcessingResult,
    AudioTranscription,
    UserPreferences,
    AnalyticsData,
}

impl CacheType {
    /// All cache types
    pub const ALL: [CacheType; 7] = [
        CacheType::NoteContent,
        CacheType::NoteMetadata,
        CacheType::SearchResults,
        CacheType::AiProcessingResult,
        CacheType::AudioTranscription,
        CacheType::UserPreferences,
        CacheType::AnalyticsData,
    ];

    /// Get the stable name used in logs and metric labels
    pub fn name(&self) -> &'static str {
        match self {
            CacheType::NoteContent => "note_content",
            CacheType::NoteMetadata => "note_metadata",
            CacheType::SearchResults => "search_results",
            CacheType::AiProcessingResult => "ai_processing_result",
            CacheType::AudioTranscription => "audio_transcription",
            CacheType::UserPreferences => "user_preferences",
            CacheType::AnalyticsData => "analytics_data",
        }
    }
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Cache key - composite of type, identifier and schema version.
///
/// Two keys are equal only if all three parts match, so entries written under
/// different versions of the same identifier never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    cache_type: CacheType,
    identifier: String,
    version: u32,
}

impl CacheKey {
    /// Version used by [`CacheKey::new`]
    pub const DEFAULT_VERSION: u32 = 1;

    /// Create a key at the default version
    pub fn new(cache_type: CacheType, identifier: impl Into<String>) -> Self {
        Self::versioned(cache_type, identifier, Self::DEFAULT_VERSION)
    }

    /// Create a key at an explicit version
    pub fn versioned(cache_type: CacheType, identifier: impl Into<String>, version: u32) -> Self {
        Self {
            cache_type,
            identifier: identifier.into(),
            version,
        }
    }

    #[inline]
    pub fn cache_type(&self) -> CacheType {
        self.cache_type
    }

    #[inline]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}@v{}", self.cache_type, self.identifier, self.version)
    }
}

/// Access metadata carried by every cacheable value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessMetadata {
    last_accessed: DateTime<Utc>,
    access_count: u32,
}

impl AccessMetadata {
    /// Fresh metadata: never accessed, stamped now
    pub fn new() -> Self {
        Self {
            last_accessed: Utc::now(),
            access_count: 0,
        }
    }

    /// Metadata with explicit values
    pub fn with_values(last_accessed: DateTime<Utc>, access_count: u32) -> Self {
        Self {
            last_accessed,
            access_count,
        }
    }

    /// Record an access and return the new count
    pub fn record_access(&mut self) -> u32 {
        self.last_accessed = Utc::now();
        self.access_count = self.access_count.saturating_add(1);
        self.access_count
    }

    /// Copy of this metadata with one more access recorded
    pub fn advanced(&self) -> Self {
        let mut next = *self;
        next.record_access();
        next
    }

    #[inline]
    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    #[inline]
    pub fn access_count(&self) -> u32 {
        self.access_count
    }
}

impl Default for AccessMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Fast non-cryptographic hash (FxHash algorithm) used for payload integrity
#[inline]
pub(crate) fn fx_hash(bytes: &[u8]) -> u64 {
    const SEED: u64 = 0x517cc1b727220a95;
    let mut hash = SEED;
    for &byte in bytes {
        hash = hash.rotate_left(5) ^ (byte as u64);
        hash = hash.wrapping_mul(SEED);
    }
    hash
}

/// A stored entry. Owned exclusively by the manager's store.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    /// Tagged, possibly compressed payload
    pub payload: Vec<u8>,
    /// Hash of `payload` at insertion
    pub content_hash: u64,
    /// Logical (uncompressed text) size, used for budget accounting
    pub logical_size: u64,
    /// Policy attached at write time
    pub policy: CachePolicy,
    /// Access metadata of the stored value
    pub access: AccessMetadata,
    /// Wall-clock insertion time
    pub inserted_at: Instant,
    /// `None` when the TTL does not fit in an `Instant`
    pub expires_at: Option<Instant>,
    /// Store clock at insertion, unique per insert
    pub insert_tick: u64,
    /// Store clock at last access
    pub access_tick: u64,
}

impl CacheEntry {
    pub fn new(
        payload: Vec<u8>,
        logical_size: u64,
        policy: CachePolicy,
        access: AccessMetadata,
        tick: u64,
    ) -> Self {
        let inserted_at = Instant::now();
        Self {
            content_hash: fx_hash(&payload),
            expires_at: inserted_at.checked_add(policy.ttl),
            payload,
            logical_size,
            policy,
            access,
            inserted_at,
            insert_tick: tick,
            access_tick: tick,
        }
    }

    /// Bytes actually held for this entry
    #[inline]
    pub fn physical_size(&self) -> u64 {
        self.payload.len() as u64
    }

    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Time left before expiry; zero once expired
    pub fn remaining_ttl(&self, now: Instant) -> Duration {
        match self.expires_at {
            Some(at) => at.saturating_duration_since(now),
            None => Duration::MAX,
        }
    }

    pub fn record_access(&mut self, tick: u64) -> AccessMetadata {
        self.access.record_access();
        self.access_tick = tick;
        self.access
    }

    pub fn compression(&self) -> Option<CompressionAlgorithm> {
        CompressionAlgorithm::of(&self.payload).ok()
    }

    pub fn verify_integrity(&self) -> bool {
        fx_hash(&self.payload) == self.content_hash
    }

    pub fn candidate<'a>(&self, key: &'a CacheKey, now: Instant) -> EvictionCandidate<'a> {
        EvictionCandidate {
            key,
            priority: self.policy.priority,
            access_count: self.access.access_count(),
            access_tick: self.access_tick,
            insert_tick: self.insert_tick,
            remaining_ttl: self.remaining_ttl(now),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_cache_key_equality() {
        let key1 = CacheKey::new(CacheType::NoteContent, "42");
        let key2 = CacheKey::new(CacheType::NoteContent, "42");
        let other_type = CacheKey::new(CacheType::NoteMetadata, "42");
        let other_version = CacheKey::versioned(CacheType::NoteContent, "42", 2);

        assert_eq!(key1, key2);
        assert_ne!(key1, other_type);
        assert_ne!(key1, other_version);
    }

    #[test]
    fn test_cache_key_versions_do_not_collide() {
        let mut set = HashSet::new();
        set.insert(CacheKey::versioned(CacheType::AiProcessingResult, "abc", 1));
        set.insert(CacheKey::versioned(CacheType::AiProcessingResult, "abc", 2));
        set.insert(CacheKey::versioned(CacheType::AiProcessingResult, "abc", 1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_cache_key_display() {
        let key = CacheKey::versioned(CacheType::SearchResults, "q:groceries", 3);
        assert_eq!(key.to_string(), "search_results:q:groceries@v3");
    }

    #[test]
    fn test_access_metadata_tracking() {
        let mut meta = AccessMetadata::new();
        assert_eq!(meta.access_count(), 0);

        assert_eq!(meta.record_access(), 1);
        assert_eq!(meta.record_access(), 2);

        let next = meta.advanced();
        assert_eq!(next.access_count(), 3);
        assert!(next.last_accessed() >= meta.last_accessed());
        assert_eq!(meta.access_count(), 2);
    }

    #[test]
    fn test_entry_expiry() {
        let policy = CachePolicy::default().with_ttl(Duration::from_millis(5));
        let entry = CacheEntry::new(vec![0, 1, 2], 2, policy, AccessMetadata::new(), 1);

        let now = Instant::now();
        assert!(!entry.is_expired_at(entry.inserted_at));
        assert!(entry.is_expired_at(now + Duration::from_millis(10)));
        assert_eq!(entry.remaining_ttl(now + Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn test_entry_without_representable_expiry_never_expires() {
        let policy = CachePolicy::default().with_ttl(Duration::MAX);
        let entry = CacheEntry::new(vec![0], 0, policy, AccessMetadata::new(), 1);

        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired_at(Instant::now() + Duration::from_secs(86_400 * 365)));
    }

    #[test]
    fn test_entry_integrity() {
        let mut entry =
            CacheEntry::new(vec![0, 10, 20, 30], 3, CachePolicy::default(), AccessMetadata::new(), 1);
        assert!(entry.verify_integrity());
        assert_eq!(entry.compression(), Some(CompressionAlgorithm::None));

        entry.payload[2] ^= 0xff;
        assert!(!entry.verify_integrity());
    }

    #[test]
    fn test_entry_access_tick() {
        let mut entry =
            CacheEntry::new(vec![0], 0, CachePolicy::default(), AccessMetadata::new(), 7);
        let meta = entry.record_access(12);

        assert_eq!(meta.access_count(), 1);
        assert_eq!(entry.insert_tick, 7);
        assert_eq!(entry.access_tick, 12);
    }
}
