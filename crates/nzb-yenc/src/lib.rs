//! Streaming yEnc article decoder (spec §4.5, C5).
//!
//! yEnc encodes each byte as `(byte + 42) mod 256`, with `=` as an escape char
//! that shifts the following byte by a further 64. Lines beginning with `=y`
//! carry control information (`=ybegin`, `=ypart`, `=yend`). The header is
//! parsed eagerly so callers (C6's seek path) can inspect `part_offset` /
//! `part_size` before paying the cost of decoding the body.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum YencError {
    #[error("article has no =ybegin line")]
    MissingBegin,
    #[error("malformed =ybegin/=ypart line: {0}")]
    MalformedHeader(String),
    #[error("required field `{0}` missing from yEnc header")]
    MissingField(&'static str),
    #[error("decoded body length {actual} does not match declared part size {expected}")]
    LengthMismatch { expected: u64, actual: u64 },
    #[error("decoded body CRC32 {actual:08x} does not match declared {expected:08x}")]
    CrcMismatch { expected: u32, actual: u32 },
}

/// The `(partOffset, partSize, crc32?)` header of one yEnc-encoded article
/// (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YencHeader {
    pub name: String,
    /// Offset of this part within the whole logical file, i.e. the part's
    /// `partByteRange.start` (spec §3, `SegmentDescriptor`).
    pub part_offset: u64,
    /// Number of decoded bytes this part contributes.
    pub part_size: u64,
    pub total_size: Option<u64>,
    pub crc32: Option<u32>,
}

/// Parses the header of a yEnc article and, on request, decodes its body.
/// Constructing this does not decode the body — only scans for the `=ybegin`
/// / `=ypart` / `=yend` control lines, matching the "header observable before
/// consuming body" contract C6 depends on.
pub struct YencArticle<'a> {
    header: YencHeader,
    body_lines: &'a [u8],
}

impl fmt::Debug for YencArticle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YencArticle")
            .field("header", &self.header)
            .finish()
    }
}

impl<'a> YencArticle<'a> {
    /// Parses the header from a raw article body (already dot-unstuffed by
    /// the NNTP transport layer). The returned value borrows `raw` until
    /// [`Self::decode_body`] is called.
    pub fn open(raw: &'a [u8]) -> Result<Self, YencError> {
        let mut begin_fields: Option<Vec<(String, String)>> = None;
        let mut part_fields: Option<Vec<(String, String)>> = None;
        let mut body_start = 0usize;
        let mut pos = 0usize;

        for line in raw.split(|&b| b == b'\n') {
            let line = strip_cr(line);
            let advance = line.len() + 1; // + the '\n' we split on
            if line.starts_with(b"=ybegin") {
                begin_fields = Some(parse_fields(line)?);
                pos += advance;
                continue;
            }
            if line.starts_with(b"=ypart") {
                part_fields = Some(parse_fields(line)?);
                pos += advance;
                body_start = pos;
                break;
            }
            if begin_fields.is_some() {
                // No =ypart line: body starts right after =ybegin.
                body_start = pos;
                break;
            }
            pos += advance;
        }

        let begin_fields = begin_fields.ok_or(YencError::MissingBegin)?;
        let find = |fields: &[(String, String)], key: &str| {
            fields
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };

        // The CRC lives on the =yend trailer line, not =ybegin/=ypart: a
        // single-part article carries `crc32=`; a multi-part one carries
        // this part's `pcrc32=` (and, only on the final part, the whole
        // file's `crc32=`). Scan ahead for it now so the header already
        // exposes it before decode_body runs.
        let mut end_fields: Option<Vec<(String, String)>> = None;
        for line in raw[body_start.min(raw.len())..].split(|&b| b == b'\n') {
            let line = strip_cr(line);
            if line.starts_with(b"=yend") {
                end_fields = Some(parse_fields(line)?);
                break;
            }
        }

        let name = find(&begin_fields, "name").unwrap_or_default();
        let total_size = find(&begin_fields, "size").and_then(|v| v.parse().ok());
        let crc32 = end_fields
            .as_ref()
            .and_then(|f| {
                if part_fields.is_some() {
                    find(f, "pcrc32").or_else(|| find(f, "crc32"))
                } else {
                    find(f, "crc32")
                }
            })
            .and_then(|v| u32::from_str_radix(v.trim_start_matches("0x"), 16).ok());

        let (part_offset, part_size) = if let Some(part_fields) = &part_fields {
            let begin: u64 = find(part_fields, "begin")
                .ok_or(YencError::MissingField("begin"))?
                .parse()
                .map_err(|_| YencError::MalformedHeader("begin not a number".into()))?;
            let end: u64 = find(part_fields, "end")
                .ok_or(YencError::MissingField("end"))?
                .parse()
                .map_err(|_| YencError::MalformedHeader("end not a number".into()))?;
            // yEnc `begin`/`end` are 1-based inclusive.
            (begin - 1, end - begin + 1)
        } else {
            let size = total_size.ok_or(YencError::MissingField("size"))?;
            (0, size)
        };

        Ok(Self {
            header: YencHeader {
                name,
                part_offset,
                part_size,
                total_size,
                crc32,
            },
            body_lines: &raw[body_start.min(raw.len())..],
        })
    }

    pub fn header(&self) -> &YencHeader {
        &self.header
    }

    /// Decodes the body, returning exactly `header().part_size` bytes.
    /// Verifies the declared CRC32 when present.
    pub fn decode_body(self) -> Result<Vec<u8>, YencError> {
        let mut out = Vec::with_capacity(self.header.part_size as usize);
        let mut escaped = false;

        for raw_line in self.body_lines.split(|&b| b == b'\n') {
            let line = strip_cr(raw_line);
            if line.starts_with(b"=yend") {
                break;
            }
            // NNTP dot-stuffing: a line consisting of a single '.' terminates
            // the response; a leading ".." is an escaped literal '.'.
            let line = if line.starts_with(b"..") { &line[1..] } else { line };

            for &byte in line {
                if escaped {
                    out.push(byte.wrapping_sub(42).wrapping_sub(64));
                    escaped = false;
                } else if byte == b'=' {
                    escaped = true;
                } else {
                    out.push(byte.wrapping_sub(42));
                }
            }
        }

        if out.len() as u64 != self.header.part_size {
            return Err(YencError::LengthMismatch {
                expected: self.header.part_size,
                actual: out.len() as u64,
            });
        }

        if let Some(expected) = self.header.crc32 {
            let actual = crc32fast::hash(&out);
            if actual != expected {
                return Err(YencError::CrcMismatch { expected, actual });
            }
        }

        Ok(out)
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    if line.last() == Some(&b'\r') {
        &line[..line.len() - 1]
    } else {
        line
    }
}

/// Parses the `key=value` pairs on a `=ybegin`/`=ypart`/`=yend` control line.
/// `name=` is special-cased because it may contain spaces and runs to the end
/// of the line.
fn parse_fields(line: &[u8]) -> Result<Vec<(String, String)>, YencError> {
    let line = String::from_utf8_lossy(line);
    let mut fields = Vec::new();
    let mut rest = line.splitn(2, ' ').nth(1).unwrap_or("").trim();

    while !rest.is_empty() {
        if let Some(name_val) = rest.strip_prefix("name=") {
            fields.push(("name".to_string(), name_val.trim().to_string()));
            break;
        }
        let Some(eq) = rest.find('=') else {
            break;
        };
        let key = &rest[..eq];
        let after = &rest[eq + 1..];
        let (val, remainder) = match after.find(' ') {
            Some(sp) => (&after[..sp], after[sp..].trim_start()),
            None => (after, ""),
        };
        fields.push((key.to_string(), val.to_string()));
        rest = remainder;
    }

    if fields.is_empty() {
        return Err(YencError::MalformedHeader(line.into_owned()));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for &b in bytes {
            let enc = b.wrapping_add(42);
            if matches!(enc, 0x00 | 0x0a | 0x0d | 0x3d) {
                out.push(b'=');
                out.push(enc.wrapping_add(64));
            } else {
                out.push(enc);
            }
        }
        out
    }

    #[test]
    fn decodes_single_part_article() {
        let payload = b"hello yenc world";
        let encoded = encode(payload);
        let crc = crc32fast::hash(payload);

        let mut raw = Vec::new();
        raw.extend_from_slice(format!("=ybegin line=128 size={} name=test.bin\r\n", payload.len()).as_bytes());
        raw.extend_from_slice(&encoded);
        raw.extend_from_slice(b"\r\n");
        raw.extend_from_slice(format!("=yend size={} crc32={:08x}\r\n", payload.len(), crc).as_bytes());

        let article = YencArticle::open(&raw).unwrap();
        assert_eq!(article.header().part_offset, 0);
        assert_eq!(article.header().part_size, payload.len() as u64);

        let decoded = article.decode_body().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn decodes_multipart_article_with_offset() {
        let payload = b"segment-two-bytes";
        let encoded = encode(payload);

        let mut raw = Vec::new();
        raw.extend_from_slice(b"=ybegin part=2 total=3 line=128 size=90 name=big.bin\r\n");
        raw.extend_from_slice(
            format!("=ypart begin=31 end={}\r\n", 30 + payload.len()).as_bytes(),
        );
        raw.extend_from_slice(&encoded);
        raw.extend_from_slice(b"\r\n=yend size=17\r\n");

        let article = YencArticle::open(&raw).unwrap();
        assert_eq!(article.header().part_offset, 30);
        assert_eq!(article.header().part_size, payload.len() as u64);
        assert_eq!(article.decode_body().unwrap(), payload);
    }

    #[test]
    fn rejects_crc_mismatch() {
        let payload = b"corrupt me";
        let encoded = encode(payload);
        let mut raw = Vec::new();
        raw.extend_from_slice(format!("=ybegin size={} name=x\r\n", payload.len()).as_bytes());
        raw.extend_from_slice(&encoded);
        raw.extend_from_slice(b"\r\n=yend crc32=deadbeef\r\n");

        let article = YencArticle::open(&raw).unwrap();
        assert!(matches!(
            article.decode_body(),
            Err(YencError::CrcMismatch { .. })
        ));
    }
}
