//! Core AEAD and randomness primitives.
//!
//! Everything in the format is XChaCha20-Poly1305 with a detached 16-byte tag,
//! so header records and chunks can keep a fixed layout.

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{Tag, XChaCha20Poly1305, XNonce};

use crate::secret::KEY_LEN;
use crate::types::SealFileError;

/// AEAD authentication tag length.
pub const TAG_LEN: usize = 16;

/// XChaCha20-Poly1305 nonce length.
pub const NONCE_LEN: usize = 24;

/// Password-hash salt length.
pub const SALT_LEN: usize = 16;

/// Fill `buf` from the OS CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> Result<(), SealFileError> {
    getrandom::fill(buf).map_err(|_| SealFileError::Rng)
}

/// Generate a cryptographically secure random nonce.
pub fn generate_nonce() -> Result<[u8; NONCE_LEN], SealFileError> {
    let mut nonce = [0u8; NONCE_LEN];
    fill_random(&mut nonce)?;
    Ok(nonce)
}

/// Generate a cryptographically secure random salt.
pub fn generate_salt() -> Result<[u8; SALT_LEN], SealFileError> {
    let mut salt = [0u8; SALT_LEN];
    fill_random(&mut salt)?;
    Ok(salt)
}

/// Increment a nonce by one, treating it as a little-endian counter.
pub fn increment_nonce(nonce: &mut [u8; NONCE_LEN]) {
    for byte in nonce.iter_mut() {
        let (next, carry) = byte.overflowing_add(1);
        *byte = next;
        if !carry {
            break;
        }
    }
}

/// Encrypt `buffer` in place and return the detached tag.
pub fn seal_in_place(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    buffer: &mut [u8],
) -> Result<[u8; TAG_LEN], SealFileError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let tag = cipher
        .encrypt_in_place_detached(XNonce::from_slice(nonce), aad, buffer)
        .map_err(|_| SealFileError::Invalid("aead: message too long"))?;
    let mut out = [0u8; TAG_LEN];
    out.copy_from_slice(&tag);
    Ok(out)
}

/// Decrypt `buffer` in place after verifying `tag`.
///
/// Returns `false` if the tag does not verify; `buffer` is then left as ciphertext.
#[must_use]
pub fn open_in_place(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    buffer: &mut [u8],
    tag: &[u8; TAG_LEN],
) -> bool {
    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .decrypt_in_place_detached(XNonce::from_slice(nonce), aad, buffer, Tag::from_slice(tag))
        .is_ok()
}
