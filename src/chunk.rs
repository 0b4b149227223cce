//! Chunked body encryption with tag chaining.
//!
//! The body is a run of fixed-size chunks. Each chunk is encrypted under the
//! file's DEK with a nonce one higher than the previous one, and with the
//! previous chunk's tag as AAD (the header's tag for chunk 0). Dropping,
//! duplicating or reordering chunks therefore breaks authentication at the
//! first chunk after the change.
//!
//! The final chunk is zero-padded to the full chunk size, so every ciphertext
//! chunk has the same length. Its true length comes from the header.

use std::fs::File;
use std::io::{Read, Write};

use zeroize::Zeroizing;

use crate::crypto::{NONCE_LEN, TAG_LEN, increment_nonce, open_in_place, seal_in_place};
use crate::secret::Dek;
use crate::types::SealFileError;

/// Nonce and running AAD for the next chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkState {
    nonce: [u8; NONCE_LEN],
    aad: [u8; TAG_LEN],
}

impl ChunkState {
    /// Start the chain from the header: the header used its nonce, so chunk 0
    /// gets that nonce plus one, and the header's tag as AAD.
    pub fn from_header(header_nonce: &[u8; NONCE_LEN], header_tag: &[u8; TAG_LEN]) -> Self {
        let mut nonce = *header_nonce;
        increment_nonce(&mut nonce);
        Self {
            nonce,
            aad: *header_tag,
        }
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn aad(&self) -> &[u8; TAG_LEN] {
        &self.aad
    }

    fn advance(&mut self, tag: [u8; TAG_LEN]) {
        increment_nonce(&mut self.nonce);
        self.aad = tag;
    }
}

/// Shape of a chunk stream for a given plaintext length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLayout {
    pub chunk_size: usize,
    pub chunk_count: u64,
    pub last_chunk_len: u32,
}

impl BodyLayout {
    /// Layout for `plaintext_len` bytes. An empty plaintext still gets one chunk.
    pub fn for_plaintext(plaintext_len: u64, chunk_size: usize) -> Result<Self, SealFileError> {
        let size = chunk_size as u64;
        let chunk_count = plaintext_len.div_ceil(size).max(1);
        let last = plaintext_len - (chunk_count - 1) * size;
        Ok(Self {
            chunk_size,
            chunk_count,
            last_chunk_len: u32::try_from(last)
                .map_err(|_| SealFileError::Invalid("chunk_size too large"))?,
        })
    }

    /// Layout recovered from a body length and the header's last-chunk length.
    pub fn from_body(body_len: u64, chunk_size: usize, last_chunk_len: u32) -> Result<Self, SealFileError> {
        let ct_chunk = (chunk_size + TAG_LEN) as u64;
        if body_len == 0 || body_len % ct_chunk != 0 {
            return Err(SealFileError::Format("body is not a whole number of chunks"));
        }
        if last_chunk_len as usize > chunk_size {
            return Err(SealFileError::Format("last chunk length exceeds chunk size"));
        }
        let chunk_count = body_len / ct_chunk;
        if last_chunk_len == 0 && chunk_count != 1 {
            return Err(SealFileError::Format("empty last chunk in a multi-chunk body"));
        }
        Ok(Self {
            chunk_size,
            chunk_count,
            last_chunk_len,
        })
    }

    pub fn ciphertext_chunk_len(&self) -> usize {
        self.chunk_size + TAG_LEN
    }

    pub fn body_len(&self) -> u64 {
        self.chunk_count * self.ciphertext_chunk_len() as u64
    }

    pub fn plaintext_len(&self) -> u64 {
        (self.chunk_count - 1) * self.chunk_size as u64 + u64::from(self.last_chunk_len)
    }
}

/// Encrypt one chunk. Returns the ciphertext and the tag that becomes the next chunk's AAD.
pub fn encrypt_chunk(
    plaintext: &[u8],
    nonce: &[u8; NONCE_LEN],
    dek: &Dek,
    aad: &[u8; TAG_LEN],
) -> Result<(Vec<u8>, [u8; TAG_LEN]), SealFileError> {
    let mut buf = Vec::with_capacity(plaintext.len() + TAG_LEN);
    buf.extend_from_slice(plaintext);
    buf.resize(plaintext.len() + TAG_LEN, 0);
    let tag = seal_chunk_in_place(&mut buf, nonce, dek, aad)?;
    Ok((buf, tag))
}

/// Decrypt one chunk (ciphertext followed by its tag).
pub fn decrypt_chunk(
    ciphertext: &[u8],
    nonce: &[u8; NONCE_LEN],
    dek: &Dek,
    aad: &[u8; TAG_LEN],
) -> Result<Zeroizing<Vec<u8>>, SealFileError> {
    let mut out = Zeroizing::new(ciphertext.to_vec());
    open_chunk_in_place(&mut out, nonce, dek, aad)?;
    out.truncate(ciphertext.len() - TAG_LEN);
    Ok(out)
}

/// Seal `chunk[..len - TAG_LEN]` in place and store the tag in the last
/// `TAG_LEN` bytes.
fn seal_chunk_in_place(
    chunk: &mut [u8],
    nonce: &[u8; NONCE_LEN],
    dek: &Dek,
    aad: &[u8; TAG_LEN],
) -> Result<[u8; TAG_LEN], SealFileError> {
    let (body, tag_slot) = chunk.split_at_mut(chunk.len() - TAG_LEN);
    let tag = seal_in_place(dek.as_bytes(), nonce, aad, body)?;
    tag_slot.copy_from_slice(&tag);
    Ok(tag)
}

/// Open a `body ‖ tag` chunk in place. Returns the tag for chaining.
fn open_chunk_in_place(
    chunk: &mut [u8],
    nonce: &[u8; NONCE_LEN],
    dek: &Dek,
    aad: &[u8; TAG_LEN],
) -> Result<[u8; TAG_LEN], SealFileError> {
    if chunk.len() < TAG_LEN {
        return Err(SealFileError::Authentication);
    }
    let (body, tag_bytes) = chunk.split_at_mut(chunk.len() - TAG_LEN);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(tag_bytes);
    if !open_in_place(dek.as_bytes(), nonce, aad, body, &tag) {
        return Err(SealFileError::Authentication);
    }
    Ok(tag)
}

/// Stream `reader` through the chunk cipher into `writer`.
///
/// `trailer` (the obfuscated file name, possibly empty) is appended to the
/// plaintext. The reader must yield exactly `layout.plaintext_len() - trailer.len()`
/// bytes; anything else means the input changed underneath us.
pub fn encrypt_body<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    dek: &Dek,
    mut state: ChunkState,
    layout: &BodyLayout,
    trailer: &[u8],
) -> Result<(), SealFileError> {
    let mut source = reader.chain(trailer);
    let mut buf = Zeroizing::new(vec![0u8; layout.chunk_size + TAG_LEN]);

    for index in 0..layout.chunk_count {
        let is_last = index + 1 == layout.chunk_count;
        let want = if is_last {
            layout.last_chunk_len as usize
        } else {
            layout.chunk_size
        };

        let got = read_full(&mut source, &mut buf[..want])?;
        if got != want {
            return Err(SealFileError::Invalid("input changed size during encryption"));
        }
        buf[want..layout.chunk_size].fill(0);

        let tag = seal_chunk_in_place(&mut buf, state.nonce(), dek, state.aad())?;
        writer.write_all(&buf)?;
        state.advance(tag);
    }

    let mut probe = [0u8; 1];
    if source.read(&mut probe)? != 0 {
        return Err(SealFileError::Invalid("input changed size during encryption"));
    }
    tracing::debug!(chunks = layout.chunk_count, "encrypted body");
    Ok(())
}

/// Decrypt a chunk stream into `output`, then cut the file to its true length.
///
/// Returns the plaintext length. On `Authentication` the caller must discard
/// `output`: everything after a failed chunk is untrustworthy, and so is
/// what came before it.
pub fn decrypt_body<R: Read>(
    reader: &mut R,
    output: &mut File,
    dek: &Dek,
    mut state: ChunkState,
    layout: &BodyLayout,
) -> Result<u64, SealFileError> {
    let ct_len = layout.ciphertext_chunk_len();
    let mut buf = Zeroizing::new(vec![0u8; ct_len]);
    let mut written: u64 = 0;

    // streaming
    for index in 0..layout.chunk_count {
        let got = read_full(reader, &mut buf)?;
        if got != ct_len {
            return Err(SealFileError::Authentication);
        }
        let tag = open_chunk_in_place(&mut buf, state.nonce(), dek, state.aad())
            .inspect_err(|_| tracing::debug!(chunk = index, "chunk failed authentication"))?;
        output.write_all(&buf[..layout.chunk_size])?;
        written += layout.chunk_size as u64;
        state.advance(tag);
    }

    // finalizing
    let true_len = written - layout.chunk_size as u64 + u64::from(layout.last_chunk_len);
    output.flush()?;
    output.set_len(true_len)?;
    tracing::debug!(chunks = layout.chunk_count, bytes = true_len, "decrypted body");
    Ok(true_len)
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, SealFileError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
