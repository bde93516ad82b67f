//! Segment descriptors and the virtual files built from them (spec §3).

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::byte_range::ByteRange;

/// An opaque, printable, globally-unique (per Usenet network) article
/// identifier, e.g. `<abc123@poster.example>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArticleId(Arc<str>);

impl ArticleId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ArticleId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ArticleId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// AES parameters for a container entry or virtual file that needs CBC
/// decryption (spec §3, `AesParams`; consumed by C10).
#[derive(Debug, Clone)]
pub struct AesParams {
    pub iv: [u8; 16],
    pub key: Vec<u8>,
    pub decoded_size: u64,
}

impl AesParams {
    pub fn new(iv: [u8; 16], key: Vec<u8>, decoded_size: u64) -> Result<Self, ModelError> {
        if key.len() != 16 && key.len() != 32 {
            return Err(ModelError::InvalidAesKeyLength(key.len()));
        }
        Ok(Self {
            iv,
            key,
            decoded_size,
        })
    }
}

/// One article's placement within the logical file it belongs to: the
/// article id, plus the byte range (from that article's yEnc header) that it
/// occupies in the reconstructed file.
#[derive(Debug, Clone)]
pub struct SegmentDescriptor {
    pub article_id: ArticleId,
    pub part_range: ByteRange,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("AES key must be 16 or 32 bytes, got {0}")]
    InvalidAesKeyLength(usize),
    #[error("virtual file segments are not a contiguous, strictly increasing cover of [0, {file_size}): {detail}")]
    InvalidSegmentCover { file_size: u64, detail: String },
    #[error("multipart virtual file parts do not abut without gap or overlap: {0}")]
    InvalidPartLayout(String),
    #[error("ciphertext length {0} is not a multiple of 16")]
    CiphertextNotBlockAligned(u64),
}

/// An ordered sequence of segments making up one logical file, plus its total
/// size and optional encryption parameters (spec §3, `VirtualFile`).
///
/// Invariant (checked at construction): `part_range`s are strictly increasing,
/// contiguous, and cover `[0, file_size)`.
#[derive(Debug, Clone)]
pub struct VirtualFile {
    segments: Vec<SegmentDescriptor>,
    file_size: u64,
    aes: Option<AesParams>,
}

impl VirtualFile {
    pub fn new(
        segments: Vec<SegmentDescriptor>,
        file_size: u64,
        aes: Option<AesParams>,
    ) -> Result<Self, ModelError> {
        Self::validate_cover(&segments, file_size)?;
        if let Some(aes) = &aes {
            if file_size % 16 != 0 {
                return Err(ModelError::CiphertextNotBlockAligned(file_size));
            }
            let _ = aes;
        }
        Ok(Self {
            segments,
            file_size,
            aes,
        })
    }

    fn validate_cover(segments: &[SegmentDescriptor], file_size: u64) -> Result<(), ModelError> {
        let mut expected_start = 0u64;
        for (idx, seg) in segments.iter().enumerate() {
            if seg.part_range.start != expected_start {
                return Err(ModelError::InvalidSegmentCover {
                    file_size,
                    detail: format!(
                        "segment {idx} starts at {} but expected {expected_start}",
                        seg.part_range.start
                    ),
                });
            }
            if seg.part_range.size() == 0 {
                return Err(ModelError::InvalidSegmentCover {
                    file_size,
                    detail: format!("segment {idx} has zero size"),
                });
            }
            expected_start = seg.part_range.end;
        }
        if expected_start != file_size {
            return Err(ModelError::InvalidSegmentCover {
                file_size,
                detail: format!("segments cover up to {expected_start}, not {file_size}"),
            });
        }
        Ok(())
    }

    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.segments
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn aes(&self) -> Option<&AesParams> {
        self.aes.as_ref()
    }

    pub fn byte_range(&self) -> ByteRange {
        ByteRange::new(0, self.file_size)
    }

    /// The whole-file byte range of the `i`-th segment, used directly as a
    /// cheap in-memory probe by C1 (no network round-trip needed once the
    /// segment list is loaded).
    pub fn segment_range(&self, i: u64) -> Option<ByteRange> {
        self.segments.get(i as usize).map(|s| s.part_range)
    }
}

/// One part of a [`MultipartVirtualFile`]: an underlying [`VirtualFile`] plus
/// the byte range it occupies within the whole multipart file.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub file: Arc<VirtualFile>,
    pub range_within_whole: ByteRange,
}

/// An ordered list of [`FilePart`]s that, concatenated, form one logical file
/// (spec §3, `MultipartVirtualFile`) — e.g. a RAR volume set, or a plain
/// `.001`/`.002`/... multipart file (spec §4.8).
#[derive(Debug, Clone)]
pub struct MultipartVirtualFile {
    parts: Vec<FilePart>,
    total_size: u64,
}

impl MultipartVirtualFile {
    pub fn new(parts: Vec<FilePart>) -> Result<Self, ModelError> {
        let mut expected_start = 0u64;
        for (idx, part) in parts.iter().enumerate() {
            if part.range_within_whole.start != expected_start {
                return Err(ModelError::InvalidPartLayout(format!(
                    "part {idx} starts at {} but expected {expected_start}",
                    part.range_within_whole.start
                )));
            }
            expected_start = part.range_within_whole.end;
        }
        Ok(Self {
            total_size: expected_start,
            parts,
        })
    }

    pub fn parts(&self) -> &[FilePart] {
        &self.parts
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn byte_range(&self) -> ByteRange {
        ByteRange::new(0, self.total_size)
    }

    pub fn part_range(&self, i: u64) -> Option<ByteRange> {
        self.parts.get(i as usize).map(|p| p.range_within_whole)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: u64, end: u64) -> SegmentDescriptor {
        SegmentDescriptor {
            article_id: ArticleId::new(format!("<{start}@poster>")),
            part_range: ByteRange::new(start, end),
        }
    }

    #[test]
    fn accepts_contiguous_cover() {
        let vf = VirtualFile::new(
            vec![seg(0, 1000), seg(1000, 2000), seg(2000, 2500)],
            2500,
            None,
        )
        .unwrap();
        assert_eq!(vf.file_size(), 2500);
        assert_eq!(vf.segments().len(), 3);
    }

    #[test]
    fn rejects_gap() {
        let err = VirtualFile::new(vec![seg(0, 1000), seg(1100, 2000)], 2000, None).unwrap_err();
        assert!(matches!(err, ModelError::InvalidSegmentCover { .. }));
    }

    #[test]
    fn rejects_short_total() {
        let err = VirtualFile::new(vec![seg(0, 1000)], 2000, None).unwrap_err();
        assert!(matches!(err, ModelError::InvalidSegmentCover { .. }));
    }
}
