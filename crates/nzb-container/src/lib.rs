//! Store-only container index extraction for RAR3, RAR5, 7z, and plain
//! multipart files (spec §4.8, §4.9, §9).
//!
//! This crate never decompresses anything; every extractor here either
//! reports exact, store-only byte ranges for each entry or refuses the
//! archive outright (solid blocks, unsupported coders) by returning
//! [`ContainerError::UnsupportedCompression`] or
//! [`ContainerError::SolidEncryptedArchive`]. Decompression is explicitly out
//! of scope for a streaming virtual filesystem: every supported container
//! must be readable by slicing bytes directly out of the volumes.

mod error;
mod index;
mod multipart;
mod rar3;
mod rar5;
mod rar_crypto;
mod sevenzip;

pub use error::ContainerError;
pub use index::{ArchiveIndex, IndexExtractor, VolumeDataRegion, VolumeReader};
pub use rar_crypto::{rar3_derive_key_iv, rar5_derive_key};

use nzb_types::ContainerKind;

/// Dispatches to the right extractor for `kind` (spec §9: "model as tagged
/// variants of `ContainerKind` with a dispatch table yielding an
/// `IndexExtractor` capability").
pub fn index_volumes(
    kind: ContainerKind,
    volumes: &mut [Box<dyn VolumeReader>],
    password: Option<&str>,
    plain_name: Option<&str>,
) -> Result<ArchiveIndex, ContainerError> {
    match kind {
        ContainerKind::Rar3 => rar3::index_rar3_volumes(volumes, password),
        ContainerKind::Rar5 => rar5::index_rar5_volumes(volumes, password),
        ContainerKind::SevenZip => sevenzip::index_sevenzip(volumes, password),
        ContainerKind::Multipart => {
            let name = plain_name.ok_or_else(|| ContainerError::Malformed {
                format: "multipart",
                detail: "plain multipart container requires a logical file name".into(),
            })?;
            multipart::index_plain_volumes(volumes, name)
        }
    }
}

const RAR3_SIGNATURE: [u8; 7] = [0x52, 0x61, 0x72, 0x21, 0x1a, 0x07, 0x00];
const RAR5_SIGNATURE: [u8; 8] = [0x52, 0x61, 0x72, 0x21, 0x1a, 0x07, 0x01, 0x00];

/// Coarse container detection by file name (spec §4.8's container detection
/// step, performed before any bytes are fetched): tells a `.rar` set apart
/// from `.7z` and from a plain multipart set. `.rar` volumes still need
/// [`sniff_rar_version`] once their first few header bytes are in hand, since
/// RAR3 and RAR5 share the same extension.
pub fn detect_container_kind(first_volume_name: &str) -> ContainerKind {
    let lower = first_volume_name.to_ascii_lowercase();
    if lower.ends_with(".rar") {
        ContainerKind::Rar3
    } else if lower.ends_with(".7z") || lower.ends_with(".7z.001") {
        ContainerKind::SevenZip
    } else {
        ContainerKind::Multipart
    }
}

/// Distinguishes RAR3 from RAR5 by the first bytes of the lead volume, which
/// carry different signatures despite the shared `.rar` extension.
pub fn sniff_rar_version(lead_bytes: &[u8]) -> Result<ContainerKind, ContainerError> {
    if lead_bytes.starts_with(&RAR5_SIGNATURE) {
        Ok(ContainerKind::Rar5)
    } else if lead_bytes.starts_with(&RAR3_SIGNATURE) {
        Ok(ContainerKind::Rar3)
    } else {
        Err(ContainerError::Malformed {
            format: "rar",
            detail: "unrecognized RAR signature".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_plain_multipart_by_default() {
        assert_eq!(detect_container_kind("movie.mkv.001"), ContainerKind::Multipart);
    }

    #[test]
    fn detects_sevenzip_by_extension() {
        assert_eq!(detect_container_kind("archive.7z"), ContainerKind::SevenZip);
    }
}
