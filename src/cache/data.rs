//! Cacheable Values
//!
//! Every cached payload implements [`CacheableData`]: it knows its logical
//! size and access metadata, and converts to and from a compact tagged byte
//! stream. The closed set of value kinds the manager stores is [`CachedValue`].
//!
//! # Size Accounting
//!
//! `size()` is the *logical* size: the total UTF-8 byte length of the value's
//! text fields. The manager budgets on this figure, not on the compressed
//! payload it actually stores; the physical figure is reported separately in
//! the metrics as the compression ratio.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::codec::{DataKind, FrameReader, FrameWriter};
use super::compression::CompressionManager;
use super::entry::AccessMetadata;
use crate::error::{Error, Result};

/// Capability contract of a cacheable value
pub trait CacheableData: Sized + Send + Sync + 'static {
    /// Logical size in bytes
    fn size(&self) -> u64;

    /// Access metadata
    fn access(&self) -> &AccessMetadata;

    /// Replace the access metadata
    fn with_access(self, access: AccessMetadata) -> Self;

    /// Kind written into the frame header
    fn kind(&self) -> DataKind;

    /// Write the structural fields (not the access metadata)
    fn write_fields(&self, w: &mut FrameWriter);

    /// Read the structural fields of a frame of `kind`
    fn read_fields(kind: DataKind, r: &mut FrameReader<'_>, access: AccessMetadata) -> Result<Self>;

    fn last_accessed(&self) -> DateTime<Utc> {
        self.access().last_accessed()
    }

    fn access_count(&self) -> u32 {
        self.access().access_count()
    }

    /// Uncompressed, deterministic frame
    fn to_frame(&self) -> Result<Vec<u8>> {
        let mut w = FrameWriter::new(self.kind());
        self.write_fields(&mut w);
        w.finish()
    }

    /// Rebuild from a frame, carrying `access` unchanged
    fn from_frame(frame: &[u8], access: AccessMetadata) -> Result<Self> {
        let (kind, mut r) = FrameReader::open(frame)?;
        let value = Self::read_fields(kind, &mut r, access)?;
        r.finish()?;
        Ok(value)
    }

    /// Compress to a tagged payload with default settings
    fn compress(&self) -> Result<Vec<u8>> {
        self.compress_with(&CompressionManager::default(), true)
    }

    /// Compress to a tagged payload with the given codec
    fn compress_with(&self, codec: &CompressionManager, enabled: bool) -> Result<Vec<u8>> {
        codec.pack(&self.to_frame()?, enabled)
    }

    /// Rebuild an equivalent value from a payload produced by [`compress`].
    ///
    /// Decompression counts as an access: the result carries this value's
    /// metadata advanced by one.
    ///
    /// [`compress`]: CacheableData::compress
    fn decompress(&self, payload: &[u8]) -> Result<Self> {
        Self::restore(&CompressionManager::default(), payload, self.access())
    }

    /// Rebuild from a payload given the metadata of the previous access
    fn restore(codec: &CompressionManager, payload: &[u8], previous: &AccessMetadata) -> Result<Self> {
        let frame = codec.unpack(payload)?;
        Self::from_frame(&frame, previous.advanced())
    }
}

fn expect_kind(expected: DataKind, actual: DataKind) -> Result<()> {
    if expected != actual {
        return Err(Error::InvalidFormat(format!(
            "expected {expected:?} frame, found {actual:?}"
        )));
    }
    Ok(())
}

fn text_len(s: &str) -> u64 {
    s.len() as u64
}

// =============================================================================
// Note
// =============================================================================

/// A voice note as held by the note repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(id: i64, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            content: content.into(),
            summary: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Total length of the text fields
    pub fn text_size(&self) -> u64 {
        text_len(&self.title)
            + text_len(&self.content)
            + self.summary.as_deref().map_or(0, text_len)
            + self.tags.iter().map(|t| text_len(t)).sum::<u64>()
    }

    fn write(&self, w: &mut FrameWriter) {
        w.put_i64(self.id);
        w.put_str(&self.title);
        w.put_str(&self.content);
        w.put_opt_str(self.summary.as_deref());
        w.put_str_list(&self.tags);
        w.put_timestamp(&self.created_at);
        w.put_timestamp(&self.updated_at);
    }

    fn read(r: &mut FrameReader<'_>) -> Result<Self> {
        Ok(Self {
            id: r.get_i64()?,
            title: r.get_str()?,
            content: r.get_str()?,
            summary: r.get_opt_str()?,
            tags: r.get_str_list()?,
            created_at: r.get_timestamp()?,
            updated_at: r.get_timestamp()?,
        })
    }
}

/// Cached note body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheableNote {
    pub note: Note,
    access: AccessMetadata,
}

impl CacheableNote {
    pub fn new(note: Note) -> Self {
        Self {
            note,
            access: AccessMetadata::new(),
        }
    }
}

impl CacheableData for CacheableNote {
    fn size(&self) -> u64 {
        self.note.text_size()
    }

    fn access(&self) -> &AccessMetadata {
        &self.access
    }

    fn with_access(mut self, access: AccessMetadata) -> Self {
        self.access = access;
        self
    }

    fn kind(&self) -> DataKind {
        DataKind::Note
    }

    fn write_fields(&self, w: &mut FrameWriter) {
        self.note.write(w);
    }

    fn read_fields(kind: DataKind, r: &mut FrameReader<'_>, access: AccessMetadata) -> Result<Self> {
        expect_kind(DataKind::Note, kind)?;
        Ok(Self {
            note: Note::read(r)?,
            access,
        })
    }
}

// =============================================================================
// Search Results
// =============================================================================

/// Cached result bundle of a note search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheableSearchResults {
    pub query: String,
    pub results: Vec<Note>,
    /// Matches in the full result set; `results` may be a page of it
    pub total_matches: u64,
    pub searched_at: DateTime<Utc>,
    access: AccessMetadata,
}

impl CacheableSearchResults {
    pub fn new(query: impl Into<String>, results: Vec<Note>) -> Self {
        let total_matches = results.len() as u64;
        Self {
            query: query.into(),
            results,
            total_matches,
            searched_at: Utc::now(),
            access: AccessMetadata::new(),
        }
    }

    pub fn with_total_matches(mut self, total: u64) -> Self {
        self.total_matches = total;
        self
    }
}

impl CacheableData for CacheableSearchResults {
    fn size(&self) -> u64 {
        text_len(&self.query) + self.results.iter().map(Note::text_size).sum::<u64>()
    }

    fn access(&self) -> &AccessMetadata {
        &self.access
    }

    fn with_access(mut self, access: AccessMetadata) -> Self {
        self.access = access;
        self
    }

    fn kind(&self) -> DataKind {
        DataKind::SearchResults
    }

    fn write_fields(&self, w: &mut FrameWriter) {
        w.put_str(&self.query);
        w.put_u64(self.total_matches);
        w.put_timestamp(&self.searched_at);
        w.put_len(self.results.len(), "search results");
        for note in &self.results {
            note.write(w);
        }
    }

    fn read_fields(kind: DataKind, r: &mut FrameReader<'_>, access: AccessMetadata) -> Result<Self> {
        expect_kind(DataKind::SearchResults, kind)?;
        let query = r.get_str()?;
        let total_matches = r.get_u64()?;
        let searched_at = r.get_timestamp()?;
        let count = r.get_u32()? as usize;
        let mut results = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            results.push(Note::read(r)?);
        }
        Ok(Self {
            query,
            results,
            total_matches,
            searched_at,
            access,
        })
    }
}

// =============================================================================
// AI Result
// =============================================================================

/// Cached output of the AI note-structuring pipeline.
///
/// `input_hash` is opaque; the pipeline computes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheableAiResult {
    pub input_hash: String,
    pub result: String,
    pub processing_time: Duration,
    pub model_name: String,
    access: AccessMetadata,
}

impl CacheableAiResult {
    pub fn new(
        input_hash: impl Into<String>,
        result: impl Into<String>,
        processing_time: Duration,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            input_hash: input_hash.into(),
            result: result.into(),
            processing_time,
            model_name: model_name.into(),
            access: AccessMetadata::new(),
        }
    }
}

impl CacheableData for CacheableAiResult {
    fn size(&self) -> u64 {
        text_len(&self.input_hash) + text_len(&self.result) + text_len(&self.model_name)
    }

    fn access(&self) -> &AccessMetadata {
        &self.access
    }

    fn with_access(mut self, access: AccessMetadata) -> Self {
        self.access = access;
        self
    }

    fn kind(&self) -> DataKind {
        DataKind::AiResult
    }

    fn write_fields(&self, w: &mut FrameWriter) {
        w.put_str(&self.input_hash);
        w.put_str(&self.result);
        w.put_duration(self.processing_time);
        w.put_str(&self.model_name);
    }

    fn read_fields(kind: DataKind, r: &mut FrameReader<'_>, access: AccessMetadata) -> Result<Self> {
        expect_kind(DataKind::AiResult, kind)?;
        Ok(Self {
            input_hash: r.get_str()?,
            result: r.get_str()?,
            processing_time: r.get_duration()?,
            model_name: r.get_str()?,
            access,
        })
    }
}

// =============================================================================
// Closed Set
// =============================================================================

/// Any value the cache stores
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Note(CacheableNote),
    SearchResults(CacheableSearchResults),
    AiResult(CacheableAiResult),
}

impl CachedValue {
    pub fn as_note(&self) -> Option<&CacheableNote> {
        match self {
            CachedValue::Note(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_search_results(&self) -> Option<&CacheableSearchResults> {
        match self {
            CachedValue::SearchResults(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ai_result(&self) -> Option<&CacheableAiResult> {
        match self {
            CachedValue::AiResult(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_note(self) -> Option<CacheableNote> {
        match self {
            CachedValue::Note(n) => Some(n),
            _ => None,
        }
    }
}

impl CacheableData for CachedValue {
    fn size(&self) -> u64 {
        match self {
            CachedValue::Note(v) => v.size(),
            CachedValue::SearchResults(v) => v.size(),
            CachedValue::AiResult(v) => v.size(),
        }
    }

    fn access(&self) -> &AccessMetadata {
        match self {
            CachedValue::Note(v) => v.access(),
            CachedValue::SearchResults(v) => v.access(),
            CachedValue::AiResult(v) => v.access(),
        }
    }

    fn with_access(self, access: AccessMetadata) -> Self {
        match self {
            CachedValue::Note(v) => CachedValue::Note(v.with_access(access)),
            CachedValue::SearchResults(v) => CachedValue::SearchResults(v.with_access(access)),
            CachedValue::AiResult(v) => CachedValue::AiResult(v.with_access(access)),
        }
    }

    fn kind(&self) -> DataKind {
        match self {
            CachedValue::Note(v) => v.kind(),
            CachedValue::SearchResults(v) => v.kind(),
            CachedValue::AiResult(v) => v.kind(),
        }
    }

    fn write_fields(&self, w: &mut FrameWriter) {
        match self {
            CachedValue::Note(v) => v.write_fields(w),
            CachedValue::SearchResults(v) => v.write_fields(w),
            CachedValue::AiResult(v) => v.write_fields(w),
        }
    }

    fn read_fields(kind: DataKind, r: &mut FrameReader<'_>, access: AccessMetadata) -> Result<Self> {
        Ok(match kind {
            DataKind::Note => CachedValue::Note(CacheableNote::read_fields(kind, r, access)?),
            DataKind::SearchResults => {
                CachedValue::SearchResults(CacheableSearchResults::read_fields(kind, r, access)?)
            }
            DataKind::AiResult => {
                CachedValue::AiResult(CacheableAiResult::read_fields(kind, r, access)?)
            }
        })
    }
}

impl From<CacheableNote> for CachedValue {
    fn from(v: CacheableNote) -> Self {
        CachedValue::Note(v)
    }
}

impl From<CacheableSearchResults> for CachedValue {
    fn from(v: CacheableSearchResults) -> Self {
        CachedValue::SearchResults(v)
    }
}

impl From<CacheableAiResult> for CachedValue {
    fn from(v: CacheableAiResult) -> Self {
        CachedValue::AiResult(v)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sample_note() -> Note {
        let mut note = Note::new(42, "Groceries", "milk | eggs || bread\u{1f35e}");
        note.summary = Some("weekly shopping".into());
        note.tags = vec!["home".into(), "todo|urgent".into()];
        note
    }

    #[test]
    fn test_note_size_is_text_length() {
        let note = sample_note();
        let expected = "Groceries".len()
            + "milk | eggs || bread\u{1f35e}".len()
            + "weekly shopping".len()
            + "home".len()
            + "todo|urgent".len();
        assert_eq!(CacheableNote::new(note).size(), expected as u64);
    }

    #[test]
    fn test_note_roundtrip_advances_access() {
        let original = CacheableNote::new(sample_note());
        let payload = original.compress().unwrap();

        let restored = original.decompress(&payload).unwrap();
        assert_eq!(restored.note, original.note);
        assert_eq!(restored.access_count(), original.access_count() + 1);
        assert!(restored.last_accessed() >= original.last_accessed());
    }

    #[test]
    fn test_search_results_roundtrip() {
        let original = CacheableSearchResults::new("eggs", vec![sample_note(), Note::new(7, "", "")])
            .with_total_matches(12);
        let restored = original.decompress(&original.compress().unwrap()).unwrap();

        assert_eq!(restored.query, "eggs");
        assert_eq!(restored.results, original.results);
        assert_eq!(restored.total_matches, 12);
        assert_eq!(restored.searched_at, original.searched_at);
    }

    #[test]
    fn test_ai_result_roundtrip() {
        let original = CacheableAiResult::new(
            "9f86d081",
            "## Summary\n- buy milk",
            Duration::from_millis(1834),
            "claude-haiku",
        );
        let restored = original.decompress(&original.compress().unwrap()).unwrap();

        assert_eq!(restored.input_hash, original.input_hash);
        assert_eq!(restored.result, original.result);
        assert_eq!(restored.processing_time, original.processing_time);
        assert_eq!(restored.model_name, original.model_name);
        assert_eq!(original.size(), (8 + 21 + 12) as u64);
    }

    #[test]
    fn test_cached_value_dispatches_on_kind() {
        let value: CachedValue = CacheableAiResult::new("h", "r", Duration::ZERO, "m").into();
        let payload = value.compress().unwrap();

        let restored = CachedValue::restore(&CompressionManager::default(), &payload, value.access())
            .unwrap();
        assert_matches!(restored, CachedValue::AiResult(_));
        assert_eq!(restored.kind(), DataKind::AiResult);
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let note = CacheableNote::new(sample_note());
        let payload = note.compress().unwrap();

        let result = CacheableAiResult::restore(
            &CompressionManager::default(),
            &payload,
            &AccessMetadata::new(),
        );
        assert_matches!(result, Err(Error::InvalidFormat(_)));
    }

    #[test]
    fn test_corrupted_payload_is_invalid_format() {
        let note = CacheableNote::new(sample_note());
        let mut payload = note.compress_with(&CompressionManager::default(), false).unwrap();
        payload.truncate(payload.len() - 4);

        assert_matches!(note.decompress(&payload), Err(Error::InvalidFormat(_)));
    }

    #[test]
    fn test_compression_is_deterministic() {
        let note = sample_note();
        let a = CacheableNote::new(note.clone()).compress().unwrap();
        let b = CacheableNote::new(note).compress().unwrap();
        assert_eq!(a, b);
    }
}
