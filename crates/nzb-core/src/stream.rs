//! The common capability every read-path layer (C6, C7, C9, C10) composes
//! over: an async, forward-only byte source of known total length.

use async_trait::async_trait;

use crate::error::Result;

/// A forward-only, asynchronously readable byte source. Implementors read
/// into the given buffer and report how many bytes were produced; `0` means
/// EOF. There is no seek on this trait itself — every layer that needs
/// random access (C6, C9) owns an explicit `seek`/seek-then-reopen contract
/// of its own instead, since the re-seek procedure differs by layer (C6
/// reopens a segment stream; C10 must additionally recover a CBC IV).
#[async_trait]
pub trait ByteStream: Send {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Total number of bytes this stream will ever yield.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reads into `buf` until it's full or the stream hits EOF early, treating
/// early EOF as [`crate::error::Error::OutOfBounds`]. Used by C10's deferred
/// re-seek, which depends on reading exactly one ciphertext block at a time.
pub async fn read_exact(stream: &mut dyn ByteStream, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(crate::error::Error::OutOfBounds);
        }
        filled += n;
    }
    Ok(())
}

/// A zero-length stream, used for empty container entries (spec §4.9 "Edge:
/// an entry of length 0 has no slices and returns EOF immediately").
pub struct EmptyStream;

#[async_trait]
impl ByteStream for EmptyStream {
    async fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn len(&self) -> u64 {
        0
    }
}

/// An already-materialized, in-memory byte source — what one decoded yEnc
/// article becomes before it's handed to the C7 concatenation.
pub struct MemoryStream {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryStream {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

#[async_trait]
impl ByteStream for MemoryStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = (self.data.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}
