//! Trivial container kind for plain multipart files (`foo.mkv.001`, `.002`,
//! ... with no archive framing at all) — spec §4.8's `ContainerKind::Multipart`
//! variant. There is exactly one entry, and it is the concatenation of every
//! volume in full; no header lives anywhere in the byte stream.

use std::io::{Seek, SeekFrom};

use nzb_types::{ByteRange, ContainerEntry, ContainerKind};

use crate::error::ContainerError;
use crate::index::{ArchiveIndex, VolumeDataRegion, VolumeReader};

/// Indexes a set of volumes that carry no container framing of their own.
pub fn index_plain_volumes(
    volumes: &mut [Box<dyn VolumeReader>],
    name: &str,
) -> Result<ArchiveIndex, ContainerError> {
    let mut data_plane = Vec::with_capacity(volumes.len());
    let mut cursor = 0u64;

    for (idx, reader) in volumes.iter_mut().enumerate() {
        let size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let region_end = cursor + size;
        data_plane.push(VolumeDataRegion {
            volume_index: idx,
            range_in_volume: ByteRange::new(0, size),
            range_in_data_plane: ByteRange::new(cursor, region_end),
        });
        cursor = region_end;
    }

    let entry = ContainerEntry::new(name.to_string(), ByteRange::new(0, cursor), None, None);

    Ok(ArchiveIndex {
        kind: ContainerKind::Multipart,
        entries: vec![entry],
        data_plane,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn concatenates_volume_sizes_into_one_entry() {
        let mut volumes: Vec<Box<dyn VolumeReader>> = vec![
            Box::new(Cursor::new(vec![0u8; 100])),
            Box::new(Cursor::new(vec![0u8; 50])),
        ];
        let index = index_plain_volumes(&mut volumes, "foo.mkv").unwrap();
        assert_eq!(index.entries.len(), 1);
        assert_eq!(index.entries[0].byte_range_within_archive, ByteRange::new(0, 150));
        assert_eq!(index.data_plane[1].range_in_data_plane, ByteRange::new(100, 150));
    }
}
