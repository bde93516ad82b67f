//! Shared result types produced by every format-specific extractor (spec §4.8,
//! §4.9) and the `ContainerKind` dispatch table (spec §9).

use std::io::{Read, Seek};

use nzb_types::{ByteRange, ContainerEntry, ContainerKind};

use crate::error::ContainerError;

/// The portion of one archive volume that contributes real (store-only)
/// bytes to the archive's logical "data plane" — the coordinate space
/// `ContainerEntry::byte_range_within_archive` is expressed in.
///
/// Splitting the archive into header-stripped data regions like this is what
/// lets a `ContainerEntry` spanning several volumes stay a single contiguous
/// [`ByteRange`] even though the underlying volumes interleave small header
/// structures between their data payloads.
#[derive(Debug, Clone)]
pub struct VolumeDataRegion {
    pub volume_index: usize,
    pub range_in_volume: ByteRange,
    pub range_in_data_plane: ByteRange,
}

/// The output of indexing one archive (possibly spanning several volumes):
/// the entries found, and the data-plane layout needed to remap an entry's
/// archive-relative byte range back onto `(volume, byte range in that
/// volume)` pairs (spec §4.9 step 2).
#[derive(Debug, Clone)]
pub struct ArchiveIndex {
    pub kind: ContainerKind,
    pub entries: Vec<ContainerEntry>,
    pub data_plane: Vec<VolumeDataRegion>,
}

/// A volume's header/trailer bytes, seekable, as loaded into memory by the
/// caller (spec §4.8: "read the container's trailer/header structures
/// directly off a C6 stream" — `nzb-core` is responsible for fetching the
/// relevant byte ranges from the real segment-backed stream into a buffer
/// before calling into this crate; see `nzb-core::container_bridge`).
pub trait VolumeReader: Read + Seek {}
impl<T: Read + Seek> VolumeReader for T {}

/// Capability exposed by each supported container shape: given the volumes
/// making up one archive (in order) and an optional password, produce the
/// entry list and data-plane layout (spec §9 "`IndexExtractor` capability").
pub trait IndexExtractor {
    fn open(
        &self,
        volumes: &mut [Box<dyn VolumeReader>],
        password: Option<&str>,
    ) -> Result<ArchiveIndex, ContainerError>;
}
