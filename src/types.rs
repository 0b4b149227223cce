//! Core types, options and the library error type for seal_file.

use thiserror::Error;

/// Default chunk size for the body stream (16 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Smallest accepted chunk size (1 KiB).
pub const MIN_CHUNK_SIZE: usize = 1024;

/// Largest accepted chunk size (64 MiB).
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Extension appended to encrypted files.
pub const ENCRYPTED_EXTENSION: &str = "enc";

/// Tunable Argon2id parameters (mem_kib in KiB).
///
/// These are not stored in the container: decryption must use the same values
/// that were used for encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub t_cost: u32,
    pub mem_kib: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            t_cost: 3,
            mem_kib: 256 * 1024,
            parallelism: 1,
        }
    }
}

/// Options for encryption.
#[derive(Debug, Clone)]
pub struct EncryptOptions {
    pub kdf_params: KdfParams,
    /// Plaintext bytes per chunk. Must match on decryption.
    pub chunk_size: usize,
    /// Give the output a random name and carry the original name inside the ciphertext.
    pub obfuscate_names: bool,
    /// Remove the plaintext input once the container has been promoted.
    pub overwrite_input: bool,
    /// When `true`, allow overwriting existing output file paths.
    pub force: bool,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            kdf_params: KdfParams::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            obfuscate_names: false,
            overwrite_input: false,
            force: false,
        }
    }
}

impl EncryptOptions {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf_params = params;
        self
    }
}

/// Options for decryption.
#[derive(Debug, Clone)]
pub struct DecryptOptions {
    pub kdf_params: KdfParams,
    /// Plaintext bytes per chunk used when the file was written.
    pub chunk_size: usize,
    /// Remove the container once the plaintext has been promoted.
    pub overwrite_input: bool,
    /// When `true`, allow overwriting existing output file paths.
    pub force: bool,
}

impl Default for DecryptOptions {
    fn default() -> Self {
        Self {
            kdf_params: KdfParams::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            overwrite_input: false,
            force: false,
        }
    }
}

impl DecryptOptions {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf_params = params;
        self
    }
}

impl From<&EncryptOptions> for DecryptOptions {
    fn from(opts: &EncryptOptions) -> Self {
        Self {
            kdf_params: opts.kdf_params,
            chunk_size: opts.chunk_size,
            overwrite_input: opts.overwrite_input,
            force: opts.force,
        }
    }
}

/// Library error type (no panics for expected failures).
///
/// `Authentication` is returned for a wrong credential and for a tampered file
/// alike; callers cannot and should not tell the two apart.
#[derive(Error, Debug)]
pub enum SealFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed file: {0}")]
    Format(&'static str),
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),
    #[error("authentication failed: wrong credential or tampered file")]
    Authentication,
    #[error("key derivation failed: {0}")]
    KeyDerivation(&'static str),
    #[error("malformed key: {0}")]
    KeyFormat(&'static str),
    #[error("invalid key: key exchange produced a low-order point")]
    InvalidKey,
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    #[error("random number generation failed")]
    Rng,
}

impl SealFileError {
    /// `true` for I/O and permission failures, `false` for content and key errors.
    pub fn is_file_access(&self) -> bool {
        matches!(self, SealFileError::Io(_))
    }
}

pub(crate) fn validate_chunk_size(chunk_size: usize) -> Result<(), SealFileError> {
    if chunk_size < MIN_CHUNK_SIZE {
        return Err(SealFileError::Invalid("chunk_size must be at least 1 KiB"));
    }
    if chunk_size > MAX_CHUNK_SIZE {
        return Err(SealFileError::Invalid("chunk_size must be at most 64 MiB"));
    }
    Ok(())
}
