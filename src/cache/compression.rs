//! Payload Compression
//!
//! LZ4 block compression for cached payloads with fallback to the raw frame.
//!
//! Every packed payload starts with a one-byte algorithm tag, so a payload is
//! self-describing and can be unpacked without consulting the entry that
//! holds it.
//!
//! # Example
//!
//! ```
//! use voicenote_cache::cache::compression::{CompressionAlgorithm, CompressionManager};
//!
//! let manager = CompressionManager::new();
//!
//! let frame = b"Meeting notes: meeting notes about the meeting notes format".repeat(8);
//! let payload = manager.pack(&frame, true).unwrap();
//! assert_eq!(CompressionAlgorithm::of(&payload).unwrap(), CompressionAlgorithm::Lz4);
//!
//! let restored = manager.unpack(&payload).unwrap();
//! assert_eq!(restored.as_ref(), frame.as_slice());
//! ```

use std::borrow::Cow;

use crate::error::{Error, Result};

// =============================================================================
// Compression Algorithm
// =============================================================================

/// Supported compression algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionAlgorithm {
    /// Raw frame
    None,
    /// LZ4 block with prepended length
    #[default]
    Lz4,
}

impl CompressionAlgorithm {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Lz4 => "lz4",
        }
    }

    /// Tag byte written in front of a packed payload
    pub fn tag(&self) -> u8 {
        match self {
            CompressionAlgorithm::None => 0x00,
            CompressionAlgorithm::Lz4 => 0x01,
        }
    }

    /// Parse a tag byte
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0x00 => Ok(CompressionAlgorithm::None),
            0x01 => Ok(CompressionAlgorithm::Lz4),
            other => Err(Error::InvalidFormat(format!(
                "unknown compression tag 0x{other:02x}"
            ))),
        }
    }

    /// Algorithm used by a packed payload
    pub fn of(payload: &[u8]) -> Result<Self> {
        match payload.first() {
            Some(tag) => Self::from_tag(*tag),
            None => Err(Error::InvalidFormat("empty payload".into())),
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Compression Configuration
// =============================================================================

/// Configuration for payload compression
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionConfig {
    /// Frames smaller than this are stored raw even when compression is enabled
    pub min_size_bytes: usize,
    /// LZ4 high-compression level
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            min_size_bytes: 64,
            level: 4,
        }
    }
}

// =============================================================================
// Compressor Trait
// =============================================================================

/// Trait for compression implementations
pub trait Compressor: Send + Sync {
    /// Get the algorithm identifier
    fn algorithm(&self) -> CompressionAlgorithm;

    /// Compress data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress data
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// LZ4 compressor
pub struct Lz4Compressor {
    level: i32,
}

impl Lz4Compressor {
    /// Create with custom compression level
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for Lz4Compressor {
    fn default() -> Self {
        Self::with_level(CompressionConfig::default().level)
    }
}

impl Compressor for Lz4Compressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(self.level)),
            true,
        )
        .map_err(|e| Error::CompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::decompress(data, None).map_err(|e| Error::DecompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }
}

// =============================================================================
// Compression Manager
// =============================================================================

/// Packs frames into tagged payloads and back
pub struct CompressionManager {
    config: CompressionConfig,
    lz4: Lz4Compressor,
}

impl CompressionManager {
    /// Create a new compression manager with default config
    pub fn new() -> Self {
        Self::with_config(CompressionConfig::default())
    }

    /// Create with custom config
    pub fn with_config(config: CompressionConfig) -> Self {
        Self {
            lz4: Lz4Compressor::with_level(config.level),
            config,
        }
    }

    /// Pack a frame into a tagged payload.
    ///
    /// With `compress` set the frame is LZ4-compressed unless it is below the
    /// minimum size or compression would not make it smaller; in both cases the
    /// raw frame is stored instead.
    pub fn pack(&self, frame: &[u8], compress: bool) -> Result<Vec<u8>> {
        if compress && frame.len() >= self.config.min_size_bytes {
            let compressed = self.lz4.compress(frame)?;
            if compressed.len() < frame.len() {
                let mut payload = Vec::with_capacity(compressed.len() + 1);
                payload.push(CompressionAlgorithm::Lz4.tag());
                payload.extend_from_slice(&compressed);
                return Ok(payload);
            }
            tracing::trace!(
                frame = frame.len(),
                compressed = compressed.len(),
                "LZ4 did not shrink frame, storing raw"
            );
        }

        let mut payload = Vec::with_capacity(frame.len() + 1);
        payload.push(CompressionAlgorithm::None.tag());
        payload.extend_from_slice(frame);
        Ok(payload)
    }

    /// Unpack a tagged payload back into its frame
    pub fn unpack<'a>(&self, payload: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let algorithm = CompressionAlgorithm::of(payload)?;
        let body = &payload[1..];
        match algorithm {
            CompressionAlgorithm::None => Ok(Cow::Borrowed(body)),
            CompressionAlgorithm::Lz4 => Ok(Cow::Owned(self.lz4.decompress(body)?)),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }
}

impl Default for CompressionManager {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const TEST_DATA: &[u8] = b"Hello, this is test data that should compress well. \
        It has some repetition: Hello, this is test data that should compress well.";

    #[test]
    fn test_lz4_roundtrip() {
        let compressor = Lz4Compressor::default();

        let compressed = compressor.compress(TEST_DATA).unwrap();
        assert!(compressed.len() < TEST_DATA.len());

        let decompressed = compressor.decompress(&compressed).unwrap();
        assert_eq!(decompressed, TEST_DATA);
    }

    #[test]
    fn test_pack_compresses_large_frames() {
        let manager = CompressionManager::new();

        let payload = manager.pack(TEST_DATA, true).unwrap();
        assert_eq!(CompressionAlgorithm::of(&payload).unwrap(), CompressionAlgorithm::Lz4);
        assert!(payload.len() < TEST_DATA.len());
        assert_eq!(manager.unpack(&payload).unwrap().as_ref(), TEST_DATA);
    }

    #[test]
    fn test_pack_disabled_stores_raw() {
        let manager = CompressionManager::new();

        let payload = manager.pack(TEST_DATA, false).unwrap();
        assert_eq!(CompressionAlgorithm::of(&payload).unwrap(), CompressionAlgorithm::None);
        assert_eq!(&payload[1..], TEST_DATA);
        assert_matches!(manager.unpack(&payload).unwrap(), Cow::Borrowed(_));
    }

    #[test]
    fn test_small_frames_stay_raw() {
        let manager = CompressionManager::new();

        let payload = manager.pack(b"tiny", true).unwrap();
        assert_eq!(CompressionAlgorithm::of(&payload).unwrap(), CompressionAlgorithm::None);
        assert_eq!(manager.unpack(&payload).unwrap().as_ref(), b"tiny");
    }

    #[test]
    fn test_incompressible_frame_falls_back() {
        let manager = CompressionManager::with_config(CompressionConfig {
            min_size_bytes: 0,
            level: 4,
        });

        // Short, non-repeating input grows under LZ4
        let data: Vec<u8> = (0..32u8).collect();
        let payload = manager.pack(&data, true).unwrap();
        assert_eq!(CompressionAlgorithm::of(&payload).unwrap(), CompressionAlgorithm::None);
        assert_eq!(payload.len(), data.len() + 1);
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        let manager = CompressionManager::new();

        assert_matches!(manager.unpack(&[]), Err(Error::InvalidFormat(_)));
        assert_matches!(manager.unpack(&[0x7f, 1, 2, 3]), Err(Error::InvalidFormat(_)));
        assert_matches!(
            manager.unpack(&[0x01, 0x10, 0x00, 0x00, 0x00, 0xff]),
            Err(Error::DecompressionFailed { .. })
        );
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(CompressionAlgorithm::None.name(), "none");
        assert_eq!(CompressionAlgorithm::Lz4.name(), "lz4");
        assert_eq!(CompressionAlgorithm::default(), CompressionAlgorithm::Lz4);
    }
}
