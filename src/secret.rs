//! Owned secret buffers that wipe themselves on drop.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of every symmetric key in the format (KEK, DEK, keyfile digest).
pub const KEY_LEN: usize = 32;

/// Fixed-size secret bytes, zeroized on drop.
///
/// Deliberately neither `Clone` nor `Copy`, and `Debug` is redacted.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> SecretBytes<N> {
    pub fn from_bytes(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    /// All-zero buffer to be filled in place (e.g. by a KDF).
    pub fn zeroed() -> Self {
        Self { bytes: [0u8; N] }
    }

    /// Fresh buffer from the OS CSPRNG.
    pub fn random() -> Result<Self, crate::SealFileError> {
        let mut out = Self::zeroed();
        getrandom::fill(&mut out.bytes).map_err(|_| crate::SealFileError::Rng)?;
        Ok(out)
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8; N] {
        &mut self.bytes
    }
}

impl<const N: usize> std::fmt::Debug for SecretBytes<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBytes")
            .field("len", &N)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Key-encryption key: wraps the DEK inside a header record.
pub type Kek = SecretBytes<KEY_LEN>;

/// Data-encryption key: encrypts the chunk stream of one file.
pub type Dek = SecretBytes<KEY_LEN>;
