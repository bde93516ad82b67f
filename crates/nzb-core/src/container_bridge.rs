//! Bridges a segment-backed [`VirtualFile`] into the synchronous
//! `Read + Seek` buffers `nzb-container`'s extractors parse headers from
//! (spec §4.8: "read the container's trailer/header structures directly off
//! a C6 stream").
//!
//! Volumes posted to Usenet are bounded by per-post size conventions (a few
//! hundred MiB at most in practice), so the bridge simply drains the whole
//! volume into memory once and hands the extractor an in-memory cursor,
//! rather than servicing arbitrary `Seek` calls against the network on
//! demand. This is a deliberate simplification: a true on-demand seekable
//! bridge would need its own caching layer duplicating much of C6's seek
//! cache for no real benefit at container-volume sizes.

use std::io::Cursor;
use std::sync::Arc;

use nzb_net::UsenetClient;
use nzb_types::VirtualFile;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::segment_stream::SegmentStream;
use crate::stream::ByteStream;

/// Reads `file` to completion through C6 and returns an in-memory
/// [`nzb_container::VolumeReader`] over the decoded bytes.
pub async fn load_volume(
    file: Arc<VirtualFile>,
    client: Arc<UsenetClient>,
    concurrency: usize,
    cancel: CancellationToken,
) -> Result<Box<dyn nzb_container::VolumeReader>> {
    let mut stream = SegmentStream::new(file.clone(), client, concurrency, cancel);
    let mut buf = Vec::with_capacity(file.file_size() as usize);
    let mut chunk = vec![0u8; 256 * 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(Box::new(Cursor::new(buf)))
}

/// Loads every volume making up a multi-volume archive, in order, ready for
/// `nzb_container::index_volumes`.
pub async fn load_volumes(
    files: &[Arc<VirtualFile>],
    client: Arc<UsenetClient>,
    concurrency: usize,
    cancel: CancellationToken,
) -> Result<Vec<Box<dyn nzb_container::VolumeReader>>> {
    let mut out = Vec::with_capacity(files.len());
    for file in files {
        out.push(load_volume(file.clone(), client.clone(), concurrency, cancel.clone()).await?);
    }
    Ok(out)
}
