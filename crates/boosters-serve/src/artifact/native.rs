//! Native `.bsrv` container: a 32-byte header followed by the stored payload.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    Header (32 bytes)                        │
//! ├────────────────────────────────────────────────────────────┤
//! │          Payload (zstd-compressed postcard bytes)           │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The CRC32 covers the stored (compressed) payload, so corruption is
//! detected before any decompression work.

use super::ArtifactError;

// ============================================================================
// Constants
// ============================================================================

/// Magic bytes identifying a pipeline artifact.
pub const MAGIC: &[u8; 4] = b"BSRV";

pub const CURRENT_VERSION_MAJOR: u8 = 1;
pub const CURRENT_VERSION_MINOR: u8 = 0;

/// Size of the format header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Upper bound for both stored and decompressed payload sizes.
pub const MAX_PAYLOAD_SIZE: u32 = 1 << 30;

/// Default zstd level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

// ============================================================================
// Model Type
// ============================================================================

/// Model type identifier stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModelType {
    /// Target encoder plus boosted forest classifier.
    ClassificationPipeline = 0,
}

impl ModelType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::ClassificationPipeline),
            _ => None,
        }
    }
}

// ============================================================================
// Format Flags
// ============================================================================

/// Bitfield flags for format features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatFlags(u16);

impl FormatFlags {
    /// Payload is compressed with zstd.
    pub const COMPRESSED: u16 = 1 << 0;
    /// The feature contract contains categorical features.
    pub const HAS_CATEGORICAL: u16 = 1 << 1;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    pub fn set(&mut self, flag: u16) {
        self.0 |= flag;
    }
}

// ============================================================================
// Format Header
// ============================================================================

/// 32-byte artifact header.
///
/// # Layout
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     Magic ("BSRV")
/// 4       1     Version major
/// 5       1     Version minor
/// 6       1     Model type
/// 7       1     Reserved
/// 8       2     Flags (bitfield)
/// 10      2     Reserved
/// 12      4     Stored payload size (bytes)
/// 16      4     CRC32 of the stored payload
/// 20      4     Number of input features
/// 24      4     Number of classes
/// 28      4     Decompressed payload size (bytes)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub model_type: ModelType,
    pub flags: FormatFlags,
    pub payload_size: u32,
    pub checksum: u32,
    pub num_features: u32,
    pub num_classes: u32,
    pub raw_size: u32,
}

impl FormatHeader {
    pub fn new(model_type: ModelType, num_features: u32, num_classes: u32) -> Self {
        Self {
            version_major: CURRENT_VERSION_MAJOR,
            version_minor: CURRENT_VERSION_MINOR,
            model_type,
            flags: FormatFlags::empty(),
            payload_size: 0,
            checksum: 0,
            num_features,
            num_classes,
            raw_size: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = self.version_major;
        buf[5] = self.version_minor;
        buf[6] = self.model_type as u8;
        buf[8..10].copy_from_slice(&self.flags.bits().to_le_bytes());
        buf[12..16].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[16..20].copy_from_slice(&self.checksum.to_le_bytes());
        buf[20..24].copy_from_slice(&self.num_features.to_le_bytes());
        buf[24..28].copy_from_slice(&self.num_classes.to_le_bytes());
        buf[28..32].copy_from_slice(&self.raw_size.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, ArtifactError> {
        if &buf[0..4] != MAGIC {
            return Err(ArtifactError::NotAnArtifact);
        }

        let version_major = buf[4];
        let version_minor = buf[5];
        if version_major != CURRENT_VERSION_MAJOR {
            return Err(ArtifactError::UnsupportedVersion {
                major: version_major,
                minor: version_minor,
            });
        }

        let model_type = ModelType::from_u8(buf[6])
            .ok_or_else(|| ArtifactError::Corrupt(format!("unknown model type {}", buf[6])))?;

        let read_u32 = |offset: usize| {
            u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
        };

        Ok(Self {
            version_major,
            version_minor,
            model_type,
            flags: FormatFlags::from_bits(u16::from_le_bytes([buf[8], buf[9]])),
            payload_size: read_u32(12),
            checksum: read_u32(16),
            num_features: read_u32(20),
            num_classes: read_u32(24),
            raw_size: read_u32(28),
        })
    }
}

/// Compute CRC32 checksum of data.
pub fn compute_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

// ============================================================================
// Native Codec
// ============================================================================

/// Frames payload bytes with the artifact header.
#[derive(Debug, Clone)]
pub struct NativeCodec {
    /// zstd level (1-22).
    pub compression_level: i32,
}

impl Default for NativeCodec {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl NativeCodec {
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level.clamp(1, 22);
        self
    }

    /// Compress `payload` and prepend the completed header.
    pub fn encode(&self, mut header: FormatHeader, payload: &[u8]) -> Result<Vec<u8>, ArtifactError> {
        let raw_size = size_field(payload.len())?;
        let stored = zstd::bulk::compress(payload, self.compression_level).map_err(ArtifactError::Compression)?;

        header.flags.set(FormatFlags::COMPRESSED);
        header.raw_size = raw_size;
        header.payload_size = size_field(stored.len())?;
        header.checksum = compute_checksum(&stored);

        let mut output = Vec::with_capacity(HEADER_SIZE + stored.len());
        output.extend_from_slice(&header.to_bytes());
        output.extend_from_slice(&stored);
        Ok(output)
    }

    /// Parse only the header.
    pub fn read_header(&self, bytes: &[u8]) -> Result<FormatHeader, ArtifactError> {
        let header_bytes: &[u8; HEADER_SIZE] = bytes
            .get(..HEADER_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(ArtifactError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            })?;
        FormatHeader::from_bytes(header_bytes)
    }

    /// Verify and unpack the payload bytes.
    pub fn decode(&self, bytes: &[u8]) -> Result<(FormatHeader, Vec<u8>), ArtifactError> {
        let header = self.read_header(bytes)?;

        if header.payload_size > MAX_PAYLOAD_SIZE || header.raw_size > MAX_PAYLOAD_SIZE {
            return Err(ArtifactError::Corrupt(format!(
                "declared payload size exceeds {MAX_PAYLOAD_SIZE} bytes"
            )));
        }

        let expected = HEADER_SIZE + header.payload_size as usize;
        let stored = bytes.get(HEADER_SIZE..expected).ok_or(ArtifactError::Truncated {
            expected,
            actual: bytes.len(),
        })?;

        let actual = compute_checksum(stored);
        if actual != header.checksum {
            return Err(ArtifactError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        let payload = if header.flags.contains(FormatFlags::COMPRESSED) {
            let raw = zstd::bulk::decompress(stored, header.raw_size as usize)
                .map_err(ArtifactError::Decompression)?;
            if raw.len() != header.raw_size as usize {
                return Err(ArtifactError::Corrupt(format!(
                    "payload decompressed to {} bytes, header declares {}",
                    raw.len(),
                    header.raw_size
                )));
            }
            raw
        } else {
            stored.to_vec()
        };

        Ok((header, payload))
    }
}

fn size_field(len: usize) -> Result<u32, ArtifactError> {
    u32::try_from(len)
        .ok()
        .filter(|&size| size <= MAX_PAYLOAD_SIZE)
        .ok_or_else(|| ArtifactError::Corrupt(format!("payload of {len} bytes is too large")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(payload: &[u8]) -> Vec<u8> {
        let header = FormatHeader::new(ModelType::ClassificationPipeline, 13, 2);
        NativeCodec::default().encode(header, payload).unwrap()
    }

    #[test]
    fn header_roundtrip() {
        let header = FormatHeader {
            version_major: 1,
            version_minor: 0,
            model_type: ModelType::ClassificationPipeline,
            flags: FormatFlags::from_bits(FormatFlags::HAS_CATEGORICAL | FormatFlags::COMPRESSED),
            payload_size: 12345,
            checksum: 0xDEADBEEF,
            num_features: 13,
            num_classes: 2,
            raw_size: 54321,
        };
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], b"BSRV");
        assert_eq!(FormatHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn header_wrong_magic() {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(b"BSTR");
        assert!(matches!(FormatHeader::from_bytes(&buf), Err(ArtifactError::NotAnArtifact)));
    }

    #[test]
    fn header_unsupported_version() {
        let mut header = FormatHeader::new(ModelType::ClassificationPipeline, 1, 2);
        header.version_major = 9;
        assert!(matches!(
            FormatHeader::from_bytes(&header.to_bytes()),
            Err(ArtifactError::UnsupportedVersion { major: 9, .. })
        ));
    }

    #[test]
    fn codec_roundtrip() {
        let payload = b"pipeline payload ".repeat(64);
        let bytes = encoded(&payload);
        let (header, decoded) = NativeCodec::default().decode(&bytes).unwrap();
        assert_eq!(decoded, payload);
        assert!(header.flags.contains(FormatFlags::COMPRESSED));
        assert_eq!(header.raw_size as usize, payload.len());
        assert_eq!(header.num_features, 13);
        assert!(bytes.len() < HEADER_SIZE + payload.len());
    }

    #[test]
    fn codec_detects_corruption() {
        let mut bytes = encoded(b"some model data");
        bytes[HEADER_SIZE + 2] ^= 0xFF;
        assert!(matches!(
            NativeCodec::default().decode(&bytes),
            Err(ArtifactError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn codec_detects_truncation() {
        let bytes = encoded(b"some model data");
        let codec = NativeCodec::default();
        for len in [0, 10, HEADER_SIZE, bytes.len() - 1] {
            assert!(
                matches!(codec.decode(&bytes[..len]), Err(ArtifactError::Truncated { .. })),
                "length {len}"
            );
        }
    }

    #[test]
    fn oversized_declaration_is_rejected() {
        let mut bytes = encoded(b"x");
        bytes[28..32].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(NativeCodec::default().decode(&bytes), Err(ArtifactError::Corrupt(_))));
    }
}
