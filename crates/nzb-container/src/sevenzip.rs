//! Minimal store-only 7z end-header parsing (spec §4.8).
//!
//! 7z's header format is a compact property-tree; a real decoder walks
//! `kFolder`/`kCodersUnpackSize`/`kSubStreamsInfo` records for every coder
//! bundle in the archive. We only need enough of that tree to (a) refuse
//! anything we cannot index without decompressing — solid blocks, any coder
//! other than `kCopy` (id `00`), or the AES-256 coder (`21`) wrapping a
//! folder of more than one file — and (b) recover the store-only byte ranges
//! of everything else. There is no publicly vendored `sevenz` crate in the
//! pack's dependency stack, so this reads the signature/end-header framing
//! directly with `binrw` the same way the RAR readers do.

use std::io::{Read, Seek, SeekFrom};

use binrw::BinReaderExt;
use nzb_types::{ByteRange, ContainerEntry, ContainerKind};

use crate::error::ContainerError;
use crate::index::{ArchiveIndex, VolumeDataRegion, VolumeReader};

const SIGNATURE: [u8; 6] = [0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c];

const K_END: u8 = 0x00;
const K_HEADER: u8 = 0x01;
const K_MAIN_STREAMS_INFO: u8 = 0x04;
const K_FILES_INFO: u8 = 0x05;
const K_PACK_INFO: u8 = 0x06;
const K_UNPACK_INFO: u8 = 0x07;
const K_SIZE: u8 = 0x09;
const K_FOLDER: u8 = 0x0b;
const K_CODERS_UNPACK_SIZE: u8 = 0x0c;
const K_NAME: u8 = 0x11;
const K_ENCODED_HEADER: u8 = 0x17;

struct StartHeader {
    next_header_offset: u64,
    next_header_size: u64,
}

fn read_start_header<R: Read + Seek>(r: &mut R) -> Result<StartHeader, ContainerError> {
    let mut sig = [0u8; 6];
    r.read_exact(&mut sig)?;
    if sig != SIGNATURE {
        return Err(ContainerError::Malformed {
            format: "7z",
            detail: "bad signature".into(),
        });
    }
    let _version_major: u8 = r.read_le()?;
    let _version_minor: u8 = r.read_le()?;
    let _start_header_crc: u32 = r.read_le()?;
    let next_header_offset: u64 = r.read_le()?;
    let next_header_size: u64 = r.read_le()?;
    let _next_header_crc: u32 = r.read_le()?;
    Ok(StartHeader {
        next_header_offset,
        next_header_size,
    })
}

/// A single coder read out of a folder's coder list, just enough to tell
/// whether the folder is store-only.
struct Coder {
    method_id: Vec<u8>,
}

fn read_folder_coders<R: Read + Seek>(r: &mut R) -> Result<Vec<Coder>, ContainerError> {
    let num_coders: u8 = r.read_le()?;
    let mut coders = Vec::with_capacity(num_coders as usize);
    for _ in 0..num_coders {
        let flags: u8 = r.read_le()?;
        let id_size = (flags & 0x0f) as usize;
        let is_complex = flags & 0x10 != 0;
        let has_attrs = flags & 0x20 != 0;

        let mut method_id = vec![0u8; id_size];
        r.read_exact(&mut method_id)?;

        if is_complex {
            let _num_in: u8 = r.read_le()?;
            let _num_out: u8 = r.read_le()?;
        }
        if has_attrs {
            let prop_size = read_number(r)?;
            let mut buf = vec![0u8; prop_size as usize];
            r.read_exact(&mut buf)?;
        }
        coders.push(Coder { method_id });
    }
    Ok(coders)
}

/// 7z packs small integers in a self-describing variable-length form: the
/// high bits of the first byte indicate how many extra bytes extend it.
fn read_number<R: Read + Seek>(r: &mut R) -> Result<u64, ContainerError> {
    let first: u8 = r.read_le()?;
    let mut mask = 0x80u8;
    let mut value: u64 = 0;
    for i in 0..8 {
        if first & mask == 0 {
            value |= ((first & (mask.wrapping_sub(1))) as u64) << (8 * i);
            return Ok(value);
        }
        let byte: u8 = r.read_le()?;
        value |= (byte as u64) << (8 * i);
        mask >>= 1;
    }
    Ok(value)
}

fn skip_property<R: Read + Seek>(r: &mut R) -> Result<(), ContainerError> {
    let size = read_number(r)?;
    r.seek(SeekFrom::Current(size as i64))?;
    Ok(())
}

struct Folder {
    coders: Vec<Coder>,
    unpack_sizes: Vec<u64>,
}

/// Walks just enough of the decoded 7z header tree to recover pack sizes,
/// folder coder chains, and file names, refusing anything that is not a
/// plain, single-coder `kCopy` folder.
fn parse_header<R: Read + Seek>(
    r: &mut R,
    base_offset: u64,
) -> Result<(Vec<u64>, Vec<Folder>, Vec<String>), ContainerError> {
    let mut pack_sizes = Vec::new();
    let mut folders = Vec::new();
    let mut names = Vec::new();

    loop {
        let id: u8 = match r.read_le() {
            Ok(v) => v,
            Err(_) => break,
        };
        match id {
            K_HEADER => continue,
            K_MAIN_STREAMS_INFO => continue,
            K_PACK_INFO => {
                let _pack_pos = read_number(r)?;
                let num_streams = read_number(r)?;
                loop {
                    let sub_id: u8 = r.read_le()?;
                    match sub_id {
                        K_SIZE => {
                            for _ in 0..num_streams {
                                pack_sizes.push(read_number(r)?);
                            }
                        }
                        K_END => break,
                        _ => skip_property(r)?,
                    }
                }
            }
            K_UNPACK_INFO => {
                loop {
                    let sub_id: u8 = r.read_le()?;
                    match sub_id {
                        K_FOLDER => {
                            let num_folders = read_number(r)?;
                            let _external: u8 = r.read_le()?;
                            for _ in 0..num_folders {
                                let coders = read_folder_coders(r)?;
                                folders.push(Folder {
                                    coders,
                                    unpack_sizes: Vec::new(),
                                });
                            }
                        }
                        K_CODERS_UNPACK_SIZE => {
                            for folder in folders.iter_mut() {
                                let count = folder.coders.len().max(1);
                                for _ in 0..count {
                                    folder.unpack_sizes.push(read_number(r)?);
                                }
                            }
                        }
                        K_END => break,
                        _ => skip_property(r)?,
                    }
                }
            }
            K_FILES_INFO => {
                let num_files = read_number(r)?;
                loop {
                    let sub_id: u8 = r.read_le()?;
                    if sub_id == K_END {
                        break;
                    }
                    let size = read_number(r)?;
                    if sub_id == K_NAME {
                        let _external: u8 = r.read_le()?;
                        let mut buf = vec![0u8; (size - 1) as usize];
                        r.read_exact(&mut buf)?;
                        let utf16: Vec<u16> = buf
                            .chunks_exact(2)
                            .map(|c| u16::from_le_bytes([c[0], c[1]]))
                            .collect();
                        let joined = String::from_utf16_lossy(&utf16);
                        names = joined.split('\0').filter(|s| !s.is_empty()).map(String::from).collect();
                    } else {
                        r.seek(SeekFrom::Current(size as i64))?;
                    }
                }
                let _ = num_files;
            }
            K_ENCODED_HEADER => {
                return Err(ContainerError::UnsupportedCompression {
                    path: "(7z header is itself compressed)".into(),
                });
            }
            K_END => break,
            _ => break,
        }
    }

    let _ = base_offset;
    Ok((pack_sizes, folders, names))
}

/// Indexes a (single-volume) 7z archive (spec §4.8).
pub fn index_sevenzip(
    volumes: &mut [Box<dyn VolumeReader>],
    password: Option<&str>,
) -> Result<ArchiveIndex, ContainerError> {
    if volumes.len() != 1 {
        return Err(ContainerError::Malformed {
            format: "7z",
            detail: "multi-volume .7z.001 sets are not supported".into(),
        });
    }
    let reader = &mut volumes[0];
    reader.seek(SeekFrom::Start(0))?;
    let start = read_start_header(reader.as_mut())?;

    reader.seek(SeekFrom::Start(32 + start.next_header_offset))?;
    let (pack_sizes, folders, names) = parse_header(reader.as_mut(), 32)?;

    if folders.len() > 1 && names.len() != folders.len() {
        return Err(ContainerError::SolidEncryptedArchive);
    }

    let mut entries = Vec::new();
    let mut data_plane = Vec::new();
    let mut pack_offset = 32u64;

    for (idx, folder) in folders.iter().enumerate() {
        if folder.coders.len() != 1 || folder.coders[0].method_id != [0x00] {
            let name = names.get(idx).cloned().unwrap_or_else(|| format!("entry-{idx}"));
            return Err(ContainerError::UnsupportedCompression { path: name });
        }
        let pack_size = *pack_sizes.get(idx).ok_or_else(|| ContainerError::Malformed {
            format: "7z",
            detail: "folder has no matching pack size".into(),
        })?;
        let name = names.get(idx).cloned().unwrap_or_else(|| format!("entry-{idx}"));

        let range = ByteRange::new(pack_offset, pack_offset + pack_size);
        data_plane.push(VolumeDataRegion {
            volume_index: 0,
            range_in_volume: range,
            range_in_data_plane: ByteRange::new(
                range.start - 32,
                range.end - 32,
            ),
        });
        entries.push(ContainerEntry::new(name, ByteRange::new(range.start - 32, range.end - 32), None, None));
        pack_offset += pack_size;
    }

    let _ = password; // 7z AES coder is refused above; no encrypted path to support yet.
    entries.sort_by_key(|e| e.byte_range_within_archive.start);

    Ok(ArchiveIndex {
        kind: ContainerKind::SevenZip,
        entries,
        data_plane,
    })
}
