//! Header encryption: wraps the DEK and length metadata under a KEK.

use crate::crypto::{NONCE_LEN, TAG_LEN, open_in_place, seal_in_place};
use crate::exchange::PUBLIC_KEY_LEN;
use crate::format::{ENCRYPTED_HEADER_LEN, MAGIC, METADATA_LEN, VERSION};
use crate::secret::{Dek, KEY_LEN, Kek};
use crate::types::SealFileError;

/// Decrypted contents of one header record.
#[derive(Debug)]
pub struct Metadata {
    /// Plaintext bytes in the final chunk (1..=chunk_size, or 0 for an empty stream).
    pub last_chunk_len: u32,
    /// Length of the original file name appended to the plaintext, 0 if none.
    pub name_len: u32,
    pub dek: Dek,
}

impl Metadata {
    fn to_block(&self) -> zeroize::Zeroizing<[u8; METADATA_LEN]> {
        let mut block = zeroize::Zeroizing::new([0u8; METADATA_LEN]);
        block[..4].copy_from_slice(&self.last_chunk_len.to_le_bytes());
        block[4..8].copy_from_slice(&self.name_len.to_le_bytes());
        block[8..].copy_from_slice(self.dek.as_bytes());
        block
    }

    fn from_block(block: &[u8; METADATA_LEN]) -> Self {
        let mut dek = Dek::zeroed();
        dek.as_mut_bytes().copy_from_slice(&block[8..8 + KEY_LEN]);
        Self {
            last_chunk_len: u32::from_le_bytes([block[0], block[1], block[2], block[3]]),
            name_len: u32::from_le_bytes([block[4], block[5], block[6], block[7]]),
            dek,
        }
    }
}

/// Header AAD: magic ‖ version ‖ record count ‖ chunk-stream length ‖ this record's key slot.
pub fn header_aad(
    record_count: u16,
    body_len: u64,
    ephemeral_public: &[u8; PUBLIC_KEY_LEN],
) -> [u8; 8 + 2 + 2 + 8 + PUBLIC_KEY_LEN] {
    let mut aad = [0u8; 8 + 2 + 2 + 8 + PUBLIC_KEY_LEN];
    aad[..8].copy_from_slice(MAGIC);
    aad[8..10].copy_from_slice(&VERSION.to_le_bytes());
    aad[10..12].copy_from_slice(&record_count.to_le_bytes());
    aad[12..20].copy_from_slice(&body_len.to_le_bytes());
    aad[20..].copy_from_slice(ephemeral_public);
    aad
}

/// Encrypt a metadata block; the result is ciphertext followed by the tag.
pub fn encrypt_header(
    metadata: &Metadata,
    nonce: &[u8; NONCE_LEN],
    kek: &Kek,
    aad: &[u8],
) -> Result<[u8; ENCRYPTED_HEADER_LEN], SealFileError> {
    let mut block = metadata.to_block();
    let tag = seal_in_place(kek.as_bytes(), nonce, aad, block.as_mut())?;
    let mut out = [0u8; ENCRYPTED_HEADER_LEN];
    out[..METADATA_LEN].copy_from_slice(block.as_ref());
    out[METADATA_LEN..].copy_from_slice(&tag);
    Ok(out)
}

/// Decrypt a metadata block.
///
/// `None` means the tag did not verify: wrong credential or a modified file,
/// deliberately indistinguishable.
pub fn decrypt_header(
    ciphertext: &[u8; ENCRYPTED_HEADER_LEN],
    nonce: &[u8; NONCE_LEN],
    kek: &Kek,
    aad: &[u8],
) -> Option<Metadata> {
    let mut block = zeroize::Zeroizing::new([0u8; METADATA_LEN]);
    block.copy_from_slice(&ciphertext[..METADATA_LEN]);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&ciphertext[METADATA_LEN..]);
    if !open_in_place(kek.as_bytes(), nonce, aad, block.as_mut(), &tag) {
        return None;
    }
    Some(Metadata::from_block(&block))
}
