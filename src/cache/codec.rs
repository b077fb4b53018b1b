//! Frame Codec
//!
//! Deterministic, self-describing binary frames for cached values.
//!
//! ```text
//! ┌───────┬─────────┬──────┬──────────────────────────────────────┐
//! │ "VNC" │ version │ kind │ fields ...                           │
//! │ 3B    │ u8      │ u8   │ u32-BE length prefix per text field  │
//! └───────┴─────────┴──────┴──────────────────────────────────────┘
//! ```
//!
//! Free text is length-prefixed, never delimited, so user content may contain
//! any byte sequence. Integers are big-endian. A frame must be consumed
//! exactly; trailing bytes are a format error. Lengths and counts are
//! limited to [`MAX_FIELD_LEN`]; a longer field fails the whole frame.

use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Frame magic
pub const FRAME_MAGIC: &[u8; 3] = b"VNC";

/// Current frame layout version
pub const FRAME_VERSION: u8 = 1;

/// Largest length or count a frame can carry
pub const MAX_FIELD_LEN: usize = u32::MAX as usize;

/// Kind of value carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// A single note
    Note,
    /// A search-result bundle
    SearchResults,
    /// An AI processing result
    AiResult,
}

impl DataKind {
    fn tag(&self) -> u8 {
        match self {
            DataKind::Note => 1,
            DataKind::SearchResults => 2,
            DataKind::AiResult => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(DataKind::Note),
            2 => Ok(DataKind::SearchResults),
            3 => Ok(DataKind::AiResult),
            other => Err(Error::InvalidFormat(format!("unknown data kind {other}"))),
        }
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Builds a frame
#[derive(Debug)]
pub struct FrameWriter {
    buf: BytesMut,
    /// First field that did not fit its length prefix
    overflow: Option<String>,
}

impl FrameWriter {
    /// Start a frame of the given kind
    pub fn new(kind: DataKind) -> Self {
        let mut buf = BytesMut::with_capacity(128);
        buf.put_slice(FRAME_MAGIC);
        buf.put_u8(FRAME_VERSION);
        buf.put_u8(kind.tag());
        Self {
            buf,
            overflow: None,
        }
    }

    /// Write a u32 length or count prefix
    pub fn put_len(&mut self, len: usize, what: &str) {
        match u32::try_from(len) {
            Ok(len) => self.buf.put_u32(len),
            Err(_) => {
                if self.overflow.is_none() {
                    self.overflow = Some(format!(
                        "{what} of length {len} exceeds the limit of {MAX_FIELD_LEN}"
                    ));
                }
                self.buf.put_u32(u32::MAX);
            }
        }
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    pub fn put_str(&mut self, value: &str) {
        self.put_len(value.len(), "string");
        self.buf.put_slice(value.as_bytes());
    }

    pub fn put_opt_str(&mut self, value: Option<&str>) {
        match value {
            Some(s) => {
                self.buf.put_u8(1);
                self.put_str(s);
            }
            None => self.buf.put_u8(0),
        }
    }

    pub fn put_str_list(&mut self, values: &[String]) {
        self.put_len(values.len(), "string list");
        for v in values {
            self.put_str(v);
        }
    }

    /// Timestamps keep full nanosecond precision
    pub fn put_timestamp(&mut self, value: &DateTime<Utc>) {
        self.buf.put_i64(value.timestamp());
        self.buf.put_u32(value.timestamp_subsec_nanos());
    }

    pub fn put_duration(&mut self, value: Duration) {
        self.buf.put_u64(value.as_secs());
        self.buf.put_u32(value.subsec_nanos());
    }

    /// Finish the frame; fails if any field overflowed its length prefix
    pub fn finish(self) -> Result<Vec<u8>> {
        match self.overflow {
            Some(reason) => Err(Error::InvalidFormat(reason)),
            None => Ok(self.buf.to_vec()),
        }
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Reads a frame produced by [`FrameWriter`]
#[derive(Debug)]
pub struct FrameReader<'a> {
    buf: &'a [u8],
}

impl<'a> FrameReader<'a> {
    /// Validate the header and return the reader with the frame's kind
    pub fn open(frame: &'a [u8]) -> Result<(DataKind, Self)> {
        let mut buf = frame;
        if buf.remaining() < FRAME_MAGIC.len() + 2 {
            return Err(Error::InvalidFormat("frame shorter than header".into()));
        }
        if &buf[..FRAME_MAGIC.len()] != FRAME_MAGIC {
            return Err(Error::InvalidFormat("bad frame magic".into()));
        }
        buf.advance(FRAME_MAGIC.len());

        let version = buf.get_u8();
        if version != FRAME_VERSION {
            return Err(Error::InvalidFormat(format!(
                "unsupported frame version {version}"
            )));
        }
        let kind = DataKind::from_tag(buf.get_u8())?;
        Ok((kind, Self { buf }))
    }

    fn need(&self, n: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(Error::InvalidFormat(format!(
                "truncated {what}: need {n} bytes, have {}",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        self.need(1, "u8")?;
        Ok(self.buf.get_u8())
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.need(4, "u32")?;
        Ok(self.buf.get_u32())
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        self.need(8, "u64")?;
        Ok(self.buf.get_u64())
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        self.need(8, "i64")?;
        Ok(self.buf.get_i64())
    }

    pub fn get_str(&mut self) -> Result<String> {
        let len = self.get_u32()? as usize;
        self.need(len, "string")?;
        let s = std::str::from_utf8(&self.buf[..len])
            .map_err(|e| Error::InvalidFormat(format!("invalid UTF-8: {e}")))?
            .to_owned();
        self.buf.advance(len);
        Ok(s)
    }

    pub fn get_opt_str(&mut self) -> Result<Option<String>> {
        match self.get_u8()? {
            0 => Ok(None),
            1 => self.get_str().map(Some),
            other => Err(Error::InvalidFormat(format!("bad option flag {other}"))),
        }
    }

    pub fn get_str_list(&mut self) -> Result<Vec<String>> {
        let count = self.get_u32()? as usize;
        // Every string costs at least its 4-byte length prefix
        self.need(count.saturating_mul(4), "string list")?;
        (0..count).map(|_| self.get_str()).collect()
    }

    pub fn get_timestamp(&mut self) -> Result<DateTime<Utc>> {
        let secs = self.get_i64()?;
        let nanos = self.get_u32()?;
        DateTime::from_timestamp(secs, nanos)
            .ok_or_else(|| Error::InvalidFormat(format!("timestamp out of range: {secs}.{nanos}")))
    }

    pub fn get_duration(&mut self) -> Result<Duration> {
        let secs = self.get_u64()?;
        let nanos = self.get_u32()?;
        if nanos >= 1_000_000_000 {
            return Err(Error::InvalidFormat(format!("duration nanos out of range: {nanos}")));
        }
        Ok(Duration::new(secs, nanos))
    }

    /// Fail unless the whole frame was consumed
    pub fn finish(self) -> Result<()> {
        if self.buf.has_remaining() {
            return Err(Error::InvalidFormat(format!(
                "{} trailing bytes",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_fields_roundtrip() {
        let now = Utc::now();
        let mut w = FrameWriter::new(DataKind::Note);
        w.put_u32(7);
        w.put_str("a|b||c\n");
        w.put_opt_str(None);
        w.put_opt_str(Some(""));
        w.put_str_list(&["x".into(), "|||".into()]);
        w.put_timestamp(&now);
        w.put_duration(Duration::from_nanos(1_500_000_001));
        let frame = w.finish().unwrap();

        let (kind, mut r) = FrameReader::open(&frame).unwrap();
        assert_eq!(kind, DataKind::Note);
        assert_eq!(r.get_u32().unwrap(), 7);
        assert_eq!(r.get_str().unwrap(), "a|b||c\n");
        assert_eq!(r.get_opt_str().unwrap(), None);
        assert_eq!(r.get_opt_str().unwrap(), Some(String::new()));
        assert_eq!(r.get_str_list().unwrap(), vec!["x".to_string(), "|||".to_string()]);
        assert_eq!(r.get_timestamp().unwrap(), now);
        assert_eq!(r.get_duration().unwrap(), Duration::from_nanos(1_500_000_001));
        r.finish().unwrap();
    }

    #[test]
    fn test_header_validation() {
        assert_matches!(FrameReader::open(b"VN"), Err(Error::InvalidFormat(_)));
        assert_matches!(FrameReader::open(b"XYZ\x01\x01"), Err(Error::InvalidFormat(_)));
        assert_matches!(FrameReader::open(b"VNC\x02\x01"), Err(Error::InvalidFormat(_)));
        assert_matches!(FrameReader::open(b"VNC\x01\x09"), Err(Error::InvalidFormat(_)));
    }

    #[test]
    fn test_truncated_string() {
        let mut w = FrameWriter::new(DataKind::AiResult);
        w.put_str("hello world");
        let mut frame = w.finish().unwrap();
        frame.truncate(frame.len() - 3);

        let (_, mut r) = FrameReader::open(&frame).unwrap();
        assert_matches!(r.get_str(), Err(Error::InvalidFormat(_)));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut w = FrameWriter::new(DataKind::Note);
        w.put_u64(1);
        let mut frame = w.finish().unwrap();
        frame.push(0);

        let (_, mut r) = FrameReader::open(&frame).unwrap();
        r.get_u64().unwrap();
        assert_matches!(r.finish(), Err(Error::InvalidFormat(_)));
    }

    #[test]
    fn test_huge_list_count_rejected() {
        let mut w = FrameWriter::new(DataKind::Note);
        w.put_u32(u32::MAX);
        let frame = w.finish().unwrap();

        let (_, mut r) = FrameReader::open(&frame).unwrap();
        assert_matches!(r.get_str_list(), Err(Error::InvalidFormat(_)));
    }

    #[test]
    fn test_frames_are_deterministic() {
        let build = || {
            let mut w = FrameWriter::new(DataKind::SearchResults);
            w.put_str("query");
            w.put_u64(3);
            w.finish().unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_oversized_length_fails_frame() {
        let mut w = FrameWriter::new(DataKind::SearchResults);
        w.put_str("query");
        w.put_len(MAX_FIELD_LEN + 1, "search results");
        w.put_u64(1);

        assert_matches!(w.finish(), Err(Error::InvalidFormat(reason)) if reason.contains("search results"));
    }

    #[test]
    fn test_max_length_accepted() {
        let mut w = FrameWriter::new(DataKind::Note);
        w.put_len(MAX_FIELD_LEN, "count");
        let frame = w.finish().unwrap();

        let (_, mut r) = FrameReader::open(&frame).unwrap();
        assert_eq!(r.get_u32().unwrap(), u32::MAX);
    }
}
