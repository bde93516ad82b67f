//! Half-open byte range arithmetic (spec §3, `ByteRange`) and the interpolation
//! search used to locate a segment by byte offset (spec §4.1).

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// A half-open interval `[start, end)` over non-negative integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Builds a range, panicking if `start > end` — callers are expected to
    /// derive ranges from already-validated sources (yEnc headers, archive
    /// metadata); a malformed range here means upstream data is corrupt enough
    /// that continuing is not useful.
    pub fn new(start: u64, end: u64) -> Self {
        assert!(start <= end, "ByteRange start {start} > end {end}");
        Self { start, end }
    }

    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, x: u64) -> bool {
        x >= self.start && x < self.end
    }

    /// True if `self` lies entirely within `other`.
    pub fn is_contained_within(&self, other: &ByteRange) -> bool {
        self.start >= other.start && self.end <= other.end
    }

    /// The overlap between two ranges, or `None` if they don't intersect.
    pub fn intersect(&self, other: &ByteRange) -> Option<ByteRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then(|| ByteRange::new(start, end))
    }

    /// Re-expresses `self` relative to `origin.start`, i.e. as if `origin.start`
    /// were byte 0. `self` must be contained within `origin`.
    pub fn translate_into(&self, origin: &ByteRange) -> ByteRange {
        debug_assert!(self.is_contained_within(origin));
        ByteRange::new(self.start - origin.start, self.end - origin.start)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Error)]
pub enum SeekError {
    /// Interpolation search could not locate `offset` within `searched`: either
    /// the byte-space search interval ran dry, or the index-space search
    /// interval emptied, or a probe returned a range inconsistent with the
    /// current search bounds.
    #[error("offset {offset} not found while searching byte range {searched} (index range {index_lo}..{index_hi})")]
    SeekPositionNotFound {
        offset: u64,
        searched: ByteRange,
        index_lo: u64,
        index_hi: u64,
    },
}

/// The result of an interpolation-search probe: the byte span covered by the
/// i-th article/segment (per spec §4.1, this is the yEnc part range).
pub type ProbeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ByteRange, SeekError>> + Send + 'a>>;

/// Locates the segment index whose byte span contains `target`, using
/// interpolation search over `[index_lo, index_hi)` / `[byte_lo, byte_hi)`.
///
/// `probe(i)` must return the true byte span of segment `i`; it is assumed to
/// be a network round-trip, so the algorithm is built to minimize probe count
/// (spec §4.1): for roughly-equal-sized segments this converges in 1-3 probes.
pub async fn interpolation_search<'a, P, Fut>(
    target: u64,
    index_lo: u64,
    index_hi: u64,
    byte_range: ByteRange,
    mut probe: P,
) -> Result<(u64, ByteRange), SeekError>
where
    P: FnMut(u64) -> Fut + Send + 'a,
    Fut: Future<Output = Result<ByteRange, SeekError>> + Send + 'a,
{
    let mut lo = index_lo;
    let mut hi = index_hi;
    let mut b_lo = byte_range.start;
    let mut b_hi = byte_range.end;

    let fail = |lo: u64, hi: u64, b_lo: u64, b_hi: u64| SeekError::SeekPositionNotFound {
        offset: target,
        searched: ByteRange::new(b_lo.min(b_hi), b_hi.max(b_lo)),
        index_lo: lo,
        index_hi: hi,
    };

    if !ByteRange::new(b_lo, b_hi).contains(target) || lo >= hi {
        return Err(fail(lo, hi, b_lo, b_hi));
    }

    loop {
        if lo >= hi || b_lo >= b_hi || target < b_lo || target >= b_hi {
            return Err(fail(lo, hi, b_lo, b_hi));
        }

        let bytes_per_index = (b_hi - b_lo) / (hi - lo);
        let bytes_per_index = bytes_per_index.max(1);
        let guess = lo + (target - b_lo) / bytes_per_index;
        let i = guess.min(hi - 1);

        let range = probe(i).await?;
        if !range.is_contained_within(&ByteRange::new(b_lo, b_hi)) {
            return Err(fail(lo, hi, b_lo, b_hi));
        }

        if range.end <= target {
            lo = i + 1;
            b_lo = range.end;
        } else if range.start > target {
            hi = i;
            b_hi = range.start;
        } else {
            return Ok((i, range));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges() -> Vec<ByteRange> {
        vec![
            ByteRange::new(0, 1000),
            ByteRange::new(1000, 2000),
            ByteRange::new(2000, 2500),
        ]
    }

    async fn probe_from(ranges: &[ByteRange], i: u64) -> Result<ByteRange, SeekError> {
        ranges
            .get(i as usize)
            .copied()
            .ok_or(SeekError::SeekPositionNotFound {
                offset: 0,
                searched: ByteRange::new(0, 0),
                index_lo: 0,
                index_hi: ranges.len() as u64,
            })
    }

    #[tokio::test]
    async fn finds_mid_segment() {
        let r = ranges();
        let (idx, range) =
            interpolation_search(1500, 0, r.len() as u64, ByteRange::new(0, 2500), |i| {
                let r = r.clone();
                async move { probe_from(&r, i).await }
            })
            .await
            .unwrap();
        assert_eq!(idx, 1);
        assert_eq!(range, ByteRange::new(1000, 2000));
    }

    #[tokio::test]
    async fn is_idempotent() {
        let r = ranges();
        let probe = |i: u64| {
            let r = r.clone();
            async move { probe_from(&r, i).await }
        };
        let (i1, _) = interpolation_search(2200, 0, r.len() as u64, ByteRange::new(0, 2500), probe)
            .await
            .unwrap();
        let (i2, _) = interpolation_search(2200, 0, r.len() as u64, ByteRange::new(0, 2500), probe)
            .await
            .unwrap();
        assert_eq!(i1, i2);
        assert_eq!(i1, 2);
    }

    #[tokio::test]
    async fn out_of_bounds_fails() {
        let r = ranges();
        let err = interpolation_search(9999, 0, r.len() as u64, ByteRange::new(0, 2500), |i| {
            let r = r.clone();
            async move { probe_from(&r, i).await }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SeekError::SeekPositionNotFound { .. }));
    }

    #[test]
    fn contains_and_size() {
        let r = ByteRange::new(10, 20);
        assert_eq!(r.size(), 10);
        assert!(r.contains(10));
        assert!(!r.contains(20));
        assert!(ByteRange::new(12, 15).is_contained_within(&r));
        assert!(!ByteRange::new(5, 15).is_contained_within(&r));
    }
}
