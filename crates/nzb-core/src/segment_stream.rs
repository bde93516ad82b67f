//! Random-access byte stream over a [`VirtualFile`]'s segment list (spec
//! §4.6, C6).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use nzb_net::UsenetClient;
use nzb_types::{interpolation_search, ByteRange, SeekError, VirtualFile};
use tokio_util::sync::CancellationToken;

use crate::concat_stream::{ConcatenatedStream, SubStreamFuture};
use crate::error::{Error, Result};
use crate::stream::{ByteStream, MemoryStream};

/// How many discard-chunks a seek-to-midstream prefix skip reads at once
/// (spec §4.6: "discard `p - S` bytes... via bulk-read-and-drop, buffered in
/// 256 KiB chunks").
const DISCARD_CHUNK: usize = 256 * 1024;

/// Bounded LRU mapping "segment start byte" -> `(index, range)`, consulted
/// before probing on every seek (spec §4.6 "Seek cache").
struct SeekCache {
    map: HashMap<u64, (u64, ByteRange)>,
    order: VecDeque<u64>,
    capacity: usize,
}

impl SeekCache {
    fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// The entry with the largest key `<= p` whose range contains `p`, if any.
    fn lookup(&self, p: u64) -> Option<(u64, ByteRange)> {
        self.map
            .iter()
            .filter(|(&start, _)| start <= p)
            .max_by_key(|(&start, _)| start)
            .and_then(|(_, &(idx, range))| range.contains(p).then_some((idx, range)))
    }

    fn insert(&mut self, start: u64, value: (u64, ByteRange)) {
        if !self.map.contains_key(&start) {
            if self.order.len() >= self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.map.remove(&oldest);
                }
            }
            self.order.push_back(start);
        }
        self.map.insert(start, value);
    }
}

const SEEK_CACHE_CAPACITY: usize = 512;

/// A seekable, read-only byte stream over one [`VirtualFile`] (spec §4.6).
/// Per-stream state is not thread-safe; callers must serialize access to a
/// given instance (spec §4.6 "Concurrency").
pub struct SegmentStream {
    file: Arc<VirtualFile>,
    client: Arc<UsenetClient>,
    concurrency: usize,
    position: u64,
    live: Option<ConcatenatedStream>,
    seek_cache: SeekCache,
    cancel: CancellationToken,
}

impl SegmentStream {
    pub fn new(
        file: Arc<VirtualFile>,
        client: Arc<UsenetClient>,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            file,
            client,
            concurrency,
            position: 0,
            live: None,
            seek_cache: SeekCache::new(SEEK_CACHE_CAPACITY),
            cancel,
        }
    }

    pub fn len(&self) -> u64 {
        self.file.file_size()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Seeks to `offset`; a no-op if already there. Never opens a
    /// connection itself — that happens lazily on the next [`Self::read`]
    /// (spec §4.6 "seek(offset)").
    pub fn seek(&mut self, offset: u64) {
        if offset == self.position {
            return;
        }
        self.live = None;
        self.position = offset;
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.position >= self.file.file_size() {
            return Ok(0);
        }
        if self.live.is_none() {
            self.open_at_position().await?;
        }
        let stream = self.live.as_mut().expect("just opened above");
        let n = stream.read(buf).await?;
        self.position += n as u64;
        if n == 0 {
            self.live = None;
        }
        Ok(n)
    }

    async fn locate(&mut self, p: u64) -> Result<(u64, ByteRange)> {
        if let Some(hit) = self.seek_cache.lookup(p) {
            return Ok(hit);
        }
        let file = self.file.clone();
        let num_segments = file.segments().len() as u64;
        let (idx, range) = interpolation_search(p, 0, num_segments, file.byte_range(), move |i| {
            let file = file.clone();
            async move {
                file.segment_range(i).ok_or(SeekError::SeekPositionNotFound {
                    offset: p,
                    searched: file.byte_range(),
                    index_lo: 0,
                    index_hi: num_segments,
                })
            }
        })
        .await?;
        self.seek_cache.insert(range.start, (idx, range));
        Ok((idx, range))
    }

    /// Builds the concatenated sub-stream starting at segment `i` (the one
    /// containing `self.position`) and discards the intra-segment prefix
    /// bytes via bulk read-and-drop (spec §4.6 "On first `read` after a seek
    /// to non-zero `p`").
    async fn open_at_position(&mut self) -> Result<()> {
        let p = self.position;
        let (start_idx, first_range) = self.locate(p).await?;

        let segments = self.file.segments();
        let mut futures: Vec<SubStreamFuture> = Vec::with_capacity(segments.len() - start_idx as usize);
        for seg in &segments[start_idx as usize..] {
            let article_id = seg.article_id.clone();
            let client = self.client.clone();
            let cancel = self.cancel.clone();
            futures.push(Box::pin(async move {
                let raw = client.fetch_body(&article_id, &cancel).await?;
                let article = nzb_yenc::YencArticle::open(&raw)?;
                let decoded = article.decode_body()?;
                Ok(Box::new(MemoryStream::new(decoded)) as Box<dyn ByteStream>)
            }));
        }

        let total_len = self.file.file_size() - first_range.start;
        let mut stream = ConcatenatedStream::new(futures, self.concurrency, total_len, self.cancel.clone());

        let discard = p - first_range.start;
        if discard > 0 {
            let mut scratch = vec![0u8; DISCARD_CHUNK];
            let mut remaining = discard;
            while remaining > 0 {
                let chunk = (remaining as usize).min(scratch.len());
                let n = stream.read(&mut scratch[..chunk]).await?;
                if n == 0 {
                    return Err(Error::OutOfBounds);
                }
                remaining -= n as u64;
            }
        }

        self.live = Some(stream);
        Ok(())
    }
}

#[async_trait]
impl ByteStream for SegmentStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        SegmentStream::read(self, buf).await
    }

    fn len(&self) -> u64 {
        self.file.file_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nzb_types::{ArticleId, SegmentDescriptor};

    fn seek_cache_basic() -> SeekCache {
        let mut cache = SeekCache::new(2);
        cache.insert(0, (0, ByteRange::new(0, 100)));
        cache.insert(100, (1, ByteRange::new(100, 200)));
        cache
    }

    #[test]
    fn seek_cache_finds_largest_key_leq_target() {
        let cache = seek_cache_basic();
        assert_eq!(cache.lookup(150), Some((1, ByteRange::new(100, 200))));
        assert_eq!(cache.lookup(50), Some((0, ByteRange::new(0, 100))));
        assert_eq!(cache.lookup(250), None);
    }

    #[test]
    fn seek_cache_evicts_oldest_on_overflow() {
        let mut cache = seek_cache_basic();
        cache.insert(200, (2, ByteRange::new(200, 300)));
        assert_eq!(cache.lookup(50), None);
        assert_eq!(cache.lookup(250), Some((2, ByteRange::new(200, 300))));
    }

    fn vf_three_segments() -> Arc<VirtualFile> {
        let seg = |start: u64, end: u64| SegmentDescriptor {
            article_id: ArticleId::new(format!("<{start}@poster>")),
            part_range: ByteRange::new(start, end),
        };
        Arc::new(
            VirtualFile::new(
                vec![seg(0, 1000), seg(1000, 2000), seg(2000, 2500)],
                2500,
                None,
            )
            .unwrap(),
        )
    }

    #[test]
    fn seek_to_same_position_is_noop() {
        let file = vf_three_segments();
        let client = Arc::new(UsenetClient::new(Vec::new(), None));
        let mut stream = SegmentStream::new(file, client, 4, CancellationToken::new());
        stream.seek(0);
        assert_eq!(stream.position(), 0);
    }
}
