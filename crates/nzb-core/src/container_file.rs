//! Container-backed virtual file (spec §4.9, C9): maps a [`ContainerEntry`]'s
//! byte range onto slices of the [`MultipartVirtualFile`] holding the raw
//! archive bytes, and composes C6+C7 (and C10, when encrypted) to read them.

use std::sync::Arc;

use async_trait::async_trait;
use nzb_net::UsenetClient;
use nzb_types::{interpolation_search, ByteRange, ContainerEntry, MultipartVirtualFile, SeekError};
use tokio_util::sync::CancellationToken;

use crate::aes_stream::AesCbcStream;
use crate::concat_stream::{ConcatenatedStream, LengthLimitedStream, SubStreamFuture};
use crate::error::Result;
use crate::segment_stream::SegmentStream;
use crate::stream::{ByteStream, EmptyStream};

/// Opens a [`SegmentStream`] over `file`, seeks it to `range.start`, and caps
/// it at `range.size()` (spec §4.9 step 3).
async fn open_slice(
    file: Arc<nzb_types::VirtualFile>,
    client: Arc<UsenetClient>,
    range: ByteRange,
    concurrency: usize,
    cancel: CancellationToken,
) -> Result<Box<dyn ByteStream>> {
    let mut stream = SegmentStream::new(file, client, concurrency, cancel);
    stream.seek(range.start);
    // Force the first read to happen through SegmentStream so the discard
    // logic runs even if the caller only ever reads through the wrapping
    // LengthLimitedStream.
    Ok(Box::new(LengthLimitedStream::new(Box::new(stream), range.size())))
}

/// A single file living inside a container (RAR/7z/multipart), read
/// on-demand without decompression (spec §4.9).
pub struct ContainerVirtualFile {
    entry: ContainerEntry,
    archive: Arc<MultipartVirtualFile>,
    client: Arc<UsenetClient>,
    concurrency: usize,
    position: u64,
    live: Option<Box<dyn ByteStream>>,
    cancel: CancellationToken,
}

impl ContainerVirtualFile {
    pub fn new(
        entry: ContainerEntry,
        archive: Arc<MultipartVirtualFile>,
        client: Arc<UsenetClient>,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            entry,
            archive,
            client,
            concurrency,
            position: 0,
            live: None,
            cancel,
        }
    }

    pub fn len(&self) -> u64 {
        self.entry.size()
    }

    pub fn seek(&mut self, offset: u64) {
        if offset == self.position {
            return;
        }
        self.live = None;
        self.position = offset;
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.position >= self.entry.size() {
            return Ok(0);
        }
        if self.live.is_none() {
            self.live = Some(self.open_at(self.position).await?);
        }
        let stream = self.live.as_mut().expect("just opened above");
        let n = stream.read(buf).await?;
        self.position += n as u64;
        if n == 0 {
            self.live = None;
        }
        Ok(n)
    }

    /// Builds the slice list for reading from `offset` (inclusive) to the
    /// end of the entry, and wraps it in C10 if the entry is encrypted
    /// (spec §4.9 steps 1-4). Generalizes the spec's "read from the start"
    /// description to an arbitrary starting offset so a single
    /// `ContainerVirtualFile` supports random-access reads, not only a
    /// single linear pass.
    async fn open_at(&self, offset: u64) -> Result<Box<dyn ByteStream>> {
        if self.entry.size() == 0 {
            return Ok(Box::new(EmptyStream));
        }

        let archive_range = self.entry.byte_range_within_archive;
        let target = archive_range.start + offset;
        let last = archive_range.end - 1;

        let num_parts = self.archive.parts().len() as u64;
        let whole_range = self.archive.byte_range();

        let probe = |i: u64, archive: Arc<MultipartVirtualFile>, at: u64| async move {
            archive.part_range(i).ok_or(SeekError::SeekPositionNotFound {
                offset: at,
                searched: archive.byte_range(),
                index_lo: 0,
                index_hi: archive.parts().len() as u64,
            })
        };

        let archive = self.archive.clone();
        let (i0, _) = interpolation_search(target, 0, num_parts, whole_range, {
            let archive = archive.clone();
            move |i| probe(i, archive.clone(), target)
        })
        .await?;
        let (i1, _) = interpolation_search(last, 0, num_parts, whole_range, {
            let archive = archive.clone();
            move |i| probe(i, archive.clone(), last)
        })
        .await?;

        let mut futures: Vec<SubStreamFuture> = Vec::with_capacity((i1 - i0 + 1) as usize);
        for i in i0..=i1 {
            let part = &self.archive.parts()[i as usize];
            let part_whole_range = part.range_within_whole;
            let lo = target.max(part_whole_range.start);
            let hi = archive_range.end.min(part_whole_range.end);
            let inner_whole = ByteRange::new(lo, hi);
            let inner_local = inner_whole.translate_into(&part_whole_range);

            let file = part.file.clone();
            let client = self.client.clone();
            let concurrency = self.concurrency;
            let cancel = self.cancel.clone();
            futures.push(Box::pin(async move {
                open_slice(file, client, inner_local, concurrency, cancel).await
            }));
        }

        let total_len = archive_range.end - target;
        let concatenated = ConcatenatedStream::new(futures, self.concurrency, total_len, self.cancel.clone());

        match self.entry.aes_params.clone() {
            Some(aes) => {
                let file = self.archive.clone();
                let client = self.client.clone();
                let concurrency = self.concurrency;
                let cancel = self.cancel.clone();
                let entry_start = archive_range.start;
                let entry_end = archive_range.end;
                let opener = move |cipher_offset: u64| {
                    let archive = file.clone();
                    let client = client.clone();
                    let cancel = cancel.clone();
                    let at = entry_start + cipher_offset;
                    let end = entry_end;
                    Box::pin(async move {
                        open_archive_range(archive, client, ByteRange::new(at, end), concurrency, cancel).await
                    }) as SubStreamFuture
                };
                Ok(Box::new(AesCbcStream::new(aes, Box::new(opener), offset)) as Box<dyn ByteStream>)
            }
            None => Ok(Box::new(concatenated) as Box<dyn ByteStream>),
        }
    }
}

/// Opens the container's raw archive bytes over `range` (an absolute,
/// archive-relative byte range), used by C10's opener to re-seek the
/// ciphertext at arbitrary byte-aligned offsets.
async fn open_archive_range(
    archive: Arc<MultipartVirtualFile>,
    client: Arc<UsenetClient>,
    range: ByteRange,
    concurrency: usize,
    cancel: CancellationToken,
) -> Result<Box<dyn ByteStream>> {
    let num_parts = archive.parts().len() as u64;
    let whole_range = archive.byte_range();
    let last = range.end - 1;

    let probe = |i: u64, archive: Arc<MultipartVirtualFile>, at: u64| async move {
        archive.part_range(i).ok_or(SeekError::SeekPositionNotFound {
            offset: at,
            searched: archive.byte_range(),
            index_lo: 0,
            index_hi: archive.parts().len() as u64,
        })
    };

    let (i0, _) = interpolation_search(range.start, 0, num_parts, whole_range, {
        let archive = archive.clone();
        move |i| probe(i, archive.clone(), range.start)
    })
    .await?;
    let (i1, _) = interpolation_search(last, 0, num_parts, whole_range, {
        let archive = archive.clone();
        move |i| probe(i, archive.clone(), last)
    })
    .await?;

    let mut futures: Vec<SubStreamFuture> = Vec::with_capacity((i1 - i0 + 1) as usize);
    for i in i0..=i1 {
        let part = &archive.parts()[i as usize];
        let part_whole_range = part.range_within_whole;
        let lo = range.start.max(part_whole_range.start);
        let hi = range.end.min(part_whole_range.end);
        let inner_local = ByteRange::new(lo, hi).translate_into(&part_whole_range);

        let file = part.file.clone();
        let client = client.clone();
        let cancel = cancel.clone();
        futures.push(Box::pin(async move {
            open_slice(file, client, inner_local, concurrency, cancel).await
        }));
    }

    Ok(Box::new(ConcatenatedStream::new(futures, concurrency, range.size(), cancel)) as Box<dyn ByteStream>)
}

#[async_trait]
impl ByteStream for ContainerVirtualFile {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        ContainerVirtualFile::read(self, buf).await
    }

    fn len(&self) -> u64 {
        self.entry.size()
    }
}
