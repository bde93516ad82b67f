//! Container entry metadata produced by the archive index extractors (C8) and
//! consumed by the container-backed virtual file (C9).

use time::OffsetDateTime;

use crate::byte_range::ByteRange;
use crate::segment::AesParams;

/// One file entry inside a RAR/7z/multipart container (spec §3,
/// `ContainerEntry`).
#[derive(Debug, Clone)]
pub struct ContainerEntry {
    pub path_within_archive: String,
    pub byte_range_within_archive: ByteRange,
    pub aes_params: Option<AesParams>,
    pub release_date: Option<OffsetDateTime>,
}

impl ContainerEntry {
    pub fn new(
        path_within_archive: impl Into<String>,
        byte_range_within_archive: ByteRange,
        aes_params: Option<AesParams>,
        release_date: Option<OffsetDateTime>,
    ) -> Self {
        Self {
            path_within_archive: path_within_archive.into(),
            byte_range_within_archive,
            aes_params,
            release_date,
        }
    }

    pub fn size(&self) -> u64 {
        self.byte_range_within_archive.size()
    }
}

/// Which container shape produced a set of [`ContainerEntry`]s (spec §4.8,
/// §9 "tagged variants of `ContainerKind`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Rar3,
    Rar5,
    SevenZip,
    /// Plain multipart files (`foo.mkv.001`, `foo.mkv.002`, ...), modeled as a
    /// trivial single-entry container.
    Multipart,
}
