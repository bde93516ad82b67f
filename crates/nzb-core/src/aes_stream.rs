//! AES-CBC decoder stream with deferred mid-stream seek (spec §4.10, C10).

use aes::{Aes128, Aes256};
use async_trait::async_trait;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use nzb_types::AesParams;

use crate::concat_stream::SubStreamFuture;
use crate::error::Result;
use crate::stream::{read_exact, ByteStream};

/// Lazily opens the raw ciphertext stream starting at a given byte offset
/// *within the encrypted region* (not the whole archive) — C10 needs this to
/// re-seek to an arbitrary, possibly block-unaligned, ciphertext position
/// without an already-open forward-only stream to work with.
pub type CipherOpener = Box<dyn Fn(u64) -> SubStreamFuture + Send + Sync>;

enum Decryptor {
    Aes128(cbc::Decryptor<Aes128>),
    Aes256(cbc::Decryptor<Aes256>),
}

impl Decryptor {
    fn new(key: &[u8], iv: &[u8; 16]) -> Self {
        match key.len() {
            16 => Decryptor::Aes128(
                cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
                    .expect("key/iv length already validated by AesParams::new"),
            ),
            32 => Decryptor::Aes256(
                cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
                    .expect("key/iv length already validated by AesParams::new"),
            ),
            other => unreachable!("AesParams::new already rejects key length {other}"),
        }
    }

    fn decrypt_block(&mut self, block: &mut [u8; 16]) {
        let generic = GenericArray::from_mut_slice(block);
        match self {
            Decryptor::Aes128(d) => d.decrypt_block_mut(generic),
            Decryptor::Aes256(d) => d.decrypt_block_mut(generic),
        }
    }
}

/// Decrypts a CBC ciphertext stream, supporting a deferred re-seek: `seek`
/// only records the new logical position, and the actual cipher
/// re-initialization (recovering the IV for the target block from the
/// preceding 16 ciphertext bytes) happens on the next `read` (spec §4.10).
pub struct AesCbcStream {
    key: Vec<u8>,
    base_iv: [u8; 16],
    decoded_size: u64,
    position: u64,
    opener: CipherOpener,
    cipher: Option<Box<dyn ByteStream>>,
    decryptor: Option<Decryptor>,
    scratch: Vec<u8>,
}

impl AesCbcStream {
    pub fn new(params: AesParams, opener: CipherOpener, start_position: u64) -> Self {
        Self {
            key: params.key,
            base_iv: params.iv,
            decoded_size: params.decoded_size,
            position: start_position,
            opener,
            cipher: None,
            decryptor: None,
            scratch: Vec::new(),
        }
    }

    pub fn seek(&mut self, offset: u64) {
        if offset == self.position {
            return;
        }
        self.cipher = None;
        self.decryptor = None;
        self.scratch.clear();
        self.position = offset;
    }

    /// Re-initializes the cipher state for a read beginning at `self.position`
    /// (spec §4.10 "Deferred seek procedure").
    async fn reinitialize(&mut self) -> Result<()> {
        let block = self.position / 16;
        let intra = (self.position % 16) as usize;
        let cipher_start = if block > 0 { (block - 1) * 16 } else { 0 };

        let mut stream = (self.opener)(cipher_start).await?;

        let iv = if block > 0 {
            let mut prev = [0u8; 16];
            read_exact(stream.as_mut(), &mut prev).await?;
            prev
        } else {
            self.base_iv
        };

        let mut decryptor = Decryptor::new(&self.key, &iv);

        if intra > 0 {
            let mut blk = [0u8; 16];
            read_exact(stream.as_mut(), &mut blk).await?;
            decryptor.decrypt_block(&mut blk);
            self.scratch = blk[intra..].to_vec();
        }

        self.cipher = Some(stream);
        self.decryptor = Some(decryptor);
        Ok(())
    }
}

#[async_trait]
impl ByteStream for AesCbcStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.position >= self.decoded_size {
            return Ok(0);
        }

        if !self.scratch.is_empty() {
            let n = self.scratch.len().min(buf.len());
            buf[..n].copy_from_slice(&self.scratch[..n]);
            self.scratch.drain(..n);
            self.position += n as u64;
            return Ok(n);
        }

        if self.cipher.is_none() {
            self.reinitialize().await?;
        }

        let mut block = [0u8; 16];
        let stream = self.cipher.as_mut().expect("reinitialize always sets cipher");
        read_exact(stream.as_mut(), &mut block).await?;
        self.decryptor
            .as_mut()
            .expect("reinitialize always sets decryptor")
            .decrypt_block(&mut block);

        let remaining_in_file = (self.decoded_size - self.position).min(16) as usize;
        let n = remaining_in_file.min(buf.len());
        buf[..n].copy_from_slice(&block[..n]);
        if n < remaining_in_file {
            self.scratch = block[n..remaining_in_file].to_vec();
        }
        self.position += n as u64;
        Ok(n)
    }

    fn len(&self) -> u64 {
        self.decoded_size.saturating_sub(self.position)
    }
}
