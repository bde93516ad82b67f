//! RAR5 store-only header parsing (spec §4.8).
//!
//! RAR5 headers are built from variable-length integers ("vint": 7 bits per
//! byte, high bit = more bytes follow, little-endian) rather than RAR3's
//! fixed-width fields.

use std::io::{Read, Seek, SeekFrom};

use binrw::BinReaderExt;
use nzb_types::{AesParams, ByteRange, ContainerEntry, ContainerKind};

use crate::error::ContainerError;
use crate::index::{ArchiveIndex, VolumeDataRegion, VolumeReader};
use crate::rar_crypto::rar5_derive_key;

const HEADER_TYPE_MAIN: u64 = 1;
const HEADER_TYPE_FILE: u64 = 2;
const HEADER_TYPE_ENCRYPTION: u64 = 4;

const HEADER_FLAG_EXTRA: u64 = 0x01;
const HEADER_FLAG_DATA: u64 = 0x02;

const FILE_FLAG_MTIME: u64 = 0x02;
const FILE_FLAG_CRC32: u64 = 0x04;

/// Encryption header flag: a password-check value follows the salt (spec
/// §4.8's RAR5 password validation).
const ENC_FLAG_PSWCHECK: u64 = 0x01;

fn read_vint<R: Read + Seek>(r: &mut R) -> Result<u64, ContainerError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte: u8 = r.read_le()?;
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 63 {
            return Err(ContainerError::Malformed {
                format: "rar5",
                detail: "vint too long".into(),
            });
        }
    }
    Ok(value)
}

struct EncryptionInfo {
    kdf_count: u8,
    salt: [u8; 16],
    check: Option<[u8; 4]>,
}

/// Indexes a set of RAR5 volumes (spec §4.8, §4.9).
pub fn index_rar5_volumes(
    volumes: &mut [Box<dyn VolumeReader>],
    password: Option<&str>,
) -> Result<ArchiveIndex, ContainerError> {
    // name -> (first-seen start, running end), so a file split across
    // volumes stitches back into one contiguous ContainerEntry.
    let mut open_entries: std::collections::HashMap<String, (u64, u64)> =
        std::collections::HashMap::new();
    let mut entries = Vec::new();
    let mut data_plane = Vec::new();
    let mut cursor = 0u64;
    let mut encryption: Option<EncryptionInfo> = None;

    for (vol_idx, reader) in volumes.iter_mut().enumerate() {
        reader.seek(SeekFrom::Start(0))?;
        // RAR5 signature: "Rar!\x1A\x07\x01\x00" (8 bytes).
        let mut sig = [0u8; 8];
        if reader.read_exact(&mut sig).is_err() {
            continue;
        }

        loop {
            let _header_start = match reader.stream_position() {
                Ok(p) => p,
                Err(_) => break,
            };
            let _crc32: u32 = match reader.read_le() {
                Ok(v) => v,
                Err(_) => break,
            };
            let header_size = read_vint(reader.as_mut())?;
            let header_body_start = reader.stream_position()?;
            let header_type = read_vint(reader.as_mut())?;
            let header_flags = read_vint(reader.as_mut())?;

            let extra_area_size = if header_flags & HEADER_FLAG_EXTRA != 0 {
                read_vint(reader.as_mut())?
            } else {
                0
            };
            let data_size = if header_flags & HEADER_FLAG_DATA != 0 {
                read_vint(reader.as_mut())?
            } else {
                0
            };

            match header_type {
                HEADER_TYPE_ENCRYPTION => {
                    let _version = read_vint(reader.as_mut())?;
                    let enc_flags = read_vint(reader.as_mut())?;
                    let kdf_count: u8 = reader.read_le()?;
                    let mut salt = [0u8; 16];
                    reader.read_exact(&mut salt)?;
                    let check = if enc_flags & ENC_FLAG_PSWCHECK != 0 {
                        let mut c = [0u8; 4];
                        reader.read_exact(&mut c)?;
                        Some(c)
                    } else {
                        None
                    };
                    encryption = Some(EncryptionInfo { kdf_count, salt, check });
                }
                HEADER_TYPE_FILE => {
                    let file_flags = read_vint(reader.as_mut())?;
                    let unpacked_size = read_vint(reader.as_mut())?;
                    let _attributes = read_vint(reader.as_mut())?;
                    if file_flags & FILE_FLAG_MTIME != 0 {
                        let _mtime: u32 = reader.read_le()?;
                    }
                    if file_flags & FILE_FLAG_CRC32 != 0 {
                        let _crc: u32 = reader.read_le()?;
                    }
                    let compression_info = read_vint(reader.as_mut())?;
                    let method = (compression_info >> 7) & 0x7;
                    let _host_os = read_vint(reader.as_mut())?;
                    let name_length = read_vint(reader.as_mut())?;
                    let mut name_buf = vec![0u8; name_length as usize];
                    reader.read_exact(&mut name_buf)?;
                    let name = String::from_utf8_lossy(&name_buf).into_owned();

                    // Skip any extra area (crypto parameters per-file, etc.)
                    // and land exactly at the data region.
                    let after_name = reader.stream_position()?;
                    let consumed_in_body = after_name - header_body_start;
                    if consumed_in_body < header_size {
                        reader.seek(SeekFrom::Current(
                            (header_size - consumed_in_body) as i64,
                        ))?;
                    }
                    let data_start = header_body_start + header_size;

                    if method != 0 {
                        return Err(ContainerError::UnsupportedCompression { path: name });
                    }

                    let region_start = cursor;
                    let region_end = cursor + data_size.max(unpacked_size);
                    data_plane.push(VolumeDataRegion {
                        volume_index: vol_idx,
                        range_in_volume: ByteRange::new(data_start, data_start + (region_end - region_start)),
                        range_in_data_plane: ByteRange::new(region_start, region_end),
                    });
                    cursor = region_end;
                    let acc = open_entries.entry(name).or_insert((region_start, region_start));
                    acc.1 = region_end;

                    reader.seek(SeekFrom::Start(data_start + data_size))?;
                    continue;
                }
                _ => {
                    reader.seek(SeekFrom::Start(header_body_start + header_size))?;
                }
            }

            let _ = extra_area_size;
            if header_type != HEADER_TYPE_MAIN && header_type != HEADER_TYPE_ENCRYPTION {
                // keep scanning
            }
        }
    }

    for (name, (start, end)) in open_entries {
        let range = ByteRange::new(start, end);

        let aes = match (&encryption, password) {
            (Some(enc), Some(pw)) => {
                let key = rar5_derive_key(pw, &enc.salt, enc.kdf_count, enc.check.as_ref())?;
                let iv = [0u8; 16];
                Some(AesParams::new(iv, key.to_vec(), range.size()).map_err(|e| {
                    ContainerError::Malformed {
                        format: "rar5",
                        detail: e.to_string(),
                    }
                })?)
            }
            (Some(_), None) => return Err(ContainerError::PasswordRequired(name)),
            (None, _) => None,
        };

        entries.push(ContainerEntry::new(name, range, aes, None));
    }
    entries.sort_by_key(|e| e.byte_range_within_archive.start);

    Ok(ArchiveIndex {
        kind: ContainerKind::Rar5,
        entries,
        data_plane,
    })
}
