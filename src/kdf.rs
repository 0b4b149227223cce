//! Key derivation from passwords and keyfiles.
//!
//! Passwords go through Argon2id with the record's salt. Keyfiles are reduced to
//! a 32-byte digest with BLAKE3 in key-derivation mode and then bound to the salt
//! with a keyed BLAKE3 hash. When both are present the password is hashed,
//! mixed with the keyfile digest, and the result is fed to Argon2id as its
//! secret input, so neither credential alone is enough.
//!
//! Derived keys are returned as [`Kek`] values which wipe themselves on drop.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::crypto::SALT_LEN;
use crate::secret::{KEY_LEN, Kek, SecretBytes};
use crate::types::{KdfParams, SealFileError};

/// Minimum memory cost for Argon2id (8 MiB).
pub const MIN_MEMORY_COST_KIB: u32 = 8 * 1024;

/// Minimum time cost for Argon2id.
pub const MIN_TIME_COST: u32 = 1;

/// Maximum parallelism accepted.
pub const MAX_PARALLELISM: u32 = 16;

/// Number of leading keyfile bytes that are hashed.
pub const KEYFILE_PREFIX_LEN: usize = 64;

const KEYFILE_CONTEXT: &str = "seal_file 2026-10 keyfile v1";

/// Digest of a keyfile's leading bytes. This is what callers hold on to,
/// never the raw keyfile contents.
pub type KeyfileDigest = SecretBytes<KEY_LEN>;

fn validate_params(params: &KdfParams) -> Result<Params, SealFileError> {
    if params.mem_kib < MIN_MEMORY_COST_KIB {
        return Err(SealFileError::KeyDerivation(
            "kdf: memory cost must be at least 8 MiB",
        ));
    }
    if params.t_cost < MIN_TIME_COST {
        return Err(SealFileError::KeyDerivation(
            "kdf: time cost must be at least 1",
        ));
    }
    if params.parallelism == 0 || params.parallelism > MAX_PARALLELISM {
        return Err(SealFileError::KeyDerivation(
            "kdf: parallelism must be between 1 and 16",
        ));
    }
    Params::new(
        params.mem_kib,
        params.t_cost,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|_| SealFileError::KeyDerivation("kdf: invalid Argon2 params"))
}

fn argon2id(
    password: &[u8],
    secret: Option<&[u8]>,
    salt: &[u8; SALT_LEN],
    params: &KdfParams,
) -> Result<Kek, SealFileError> {
    let argon_params = validate_params(params)?;
    let argon2 = match secret {
        Some(s) => Argon2::new_with_secret(s, Algorithm::Argon2id, Version::V0x13, argon_params)
            .map_err(|_| SealFileError::KeyDerivation("kdf: invalid Argon2 secret"))?,
        None => Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params),
    };

    let mut out = Kek::zeroed();
    argon2
        .hash_password_into(password, salt, out.as_mut_bytes())
        .map_err(|_| SealFileError::KeyDerivation("kdf: Argon2id failed"))?;
    Ok(out)
}

/// Derive a KEK from a password and salt using Argon2id.
///
/// # Errors
///
/// Returns `SealFileError::KeyDerivation` if any parameter is out of bounds:
/// - memory cost below 8 MiB
/// - time cost below 1
/// - parallelism outside 1..=16
pub fn derive_from_password(
    password: &SecretString,
    salt: &[u8; SALT_LEN],
    params: &KdfParams,
) -> Result<Kek, SealFileError> {
    argon2id(password.expose_secret().as_bytes(), None, salt, params)
}

/// Derive a KEK from a keyfile digest and salt with keyed BLAKE3.
pub fn derive_from_keyfile(keyfile: &KeyfileDigest, salt: &[u8; SALT_LEN]) -> Kek {
    let hash = blake3::keyed_hash(keyfile.as_bytes(), salt);
    Kek::from_bytes(*hash.as_bytes())
}

/// Mix a password with a keyfile digest.
///
/// The password is hashed first, then the hash is run through keyed BLAKE3 under
/// the keyfile digest. The result is used as the Argon2id secret input.
pub fn combine_password_and_keyfile(
    password: &SecretString,
    keyfile: &KeyfileDigest,
) -> SecretBytes<KEY_LEN> {
    let pw_hash = Zeroizing::new(*blake3::hash(password.expose_secret().as_bytes()).as_bytes());
    let mixed = blake3::keyed_hash(keyfile.as_bytes(), pw_hash.as_ref());
    SecretBytes::from_bytes(*mixed.as_bytes())
}

/// Derive a KEK from a password and keyfile together.
pub fn derive_from_password_and_keyfile(
    password: &SecretString,
    keyfile: &KeyfileDigest,
    salt: &[u8; SALT_LEN],
    params: &KdfParams,
) -> Result<Kek, SealFileError> {
    let secret = combine_password_and_keyfile(password, keyfile);
    argon2id(
        password.expose_secret().as_bytes(),
        Some(secret.as_bytes()),
        salt,
        params,
    )
}

/// Hash the leading bytes of a keyfile already in memory.
pub fn keyfile_digest(contents: &[u8]) -> Result<KeyfileDigest, SealFileError> {
    if contents.len() < KEYFILE_PREFIX_LEN {
        return Err(SealFileError::KeyFormat("keyfile must be at least 64 bytes"));
    }
    Ok(KeyfileDigest::from_bytes(blake3::derive_key(
        KEYFILE_CONTEXT,
        &contents[..KEYFILE_PREFIX_LEN],
    )))
}

/// Read and hash a keyfile. Only the first 64 bytes are read, whatever the file size.
pub fn read_keyfile(path: &Path) -> Result<KeyfileDigest, SealFileError> {
    let mut prefix = Zeroizing::new([0u8; KEYFILE_PREFIX_LEN]);
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < KEYFILE_PREFIX_LEN {
        let n = file.read(&mut prefix[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    keyfile_digest(&prefix[..filled])
}

/// Write a fresh random keyfile of `KEYFILE_PREFIX_LEN` bytes (0600 on Unix).
pub fn generate_keyfile(path: &Path) -> Result<(), SealFileError> {
    let mut contents = Zeroizing::new([0u8; KEYFILE_PREFIX_LEN]);
    crate::crypto::fill_random(contents.as_mut())?;
    crate::file::write_all_atomic(path, contents.as_ref(), true, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams {
            t_cost: 1,
            mem_kib: MIN_MEMORY_COST_KIB,
            parallelism: 1,
        }
    }

    #[test]
    fn password_kdf_deterministic() {
        let pw = SecretString::from("test-passphrase-123");
        let salt = [1u8; SALT_LEN];
        let a = derive_from_password(&pw, &salt, &fast()).unwrap();
        let b = derive_from_password(&pw, &salt, &fast()).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn password_kdf_salt_sensitive() {
        let pw = SecretString::from("same");
        let a = derive_from_password(&pw, &[1u8; SALT_LEN], &fast()).unwrap();
        let b = derive_from_password(&pw, &[2u8; SALT_LEN], &fast()).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn rejects_low_memory_cost() {
        let pw = SecretString::from("pw");
        let params = KdfParams {
            mem_kib: 1024,
            ..fast()
        };
        let err = derive_from_password(&pw, &[0u8; SALT_LEN], &params).unwrap_err();
        assert!(matches!(err, SealFileError::KeyDerivation(m) if m.contains("memory cost")));
    }

    #[test]
    fn keyfile_requires_prefix_length() {
        assert!(matches!(
            keyfile_digest(&[0u8; 10]),
            Err(SealFileError::KeyFormat(_))
        ));
    }

    #[test]
    fn keyfile_ignores_bytes_past_prefix() {
        let mut a = vec![3u8; 200];
        let b = a.clone();
        a[150] = 4;
        let da = keyfile_digest(&a).unwrap();
        let db = keyfile_digest(&b).unwrap();
        assert_eq!(da.as_bytes(), db.as_bytes());
    }

    #[test]
    fn combined_needs_both_secrets() {
        let salt = [5u8; SALT_LEN];
        let pw = SecretString::from("pw");
        let kf1 = keyfile_digest(&[1u8; 64]).unwrap();
        let kf2 = keyfile_digest(&[2u8; 64]).unwrap();

        let both = derive_from_password_and_keyfile(&pw, &kf1, &salt, &fast()).unwrap();
        let pw_only = derive_from_password(&pw, &salt, &fast()).unwrap();
        let other_kf = derive_from_password_and_keyfile(&pw, &kf2, &salt, &fast()).unwrap();
        let kf_only = derive_from_keyfile(&kf1, &salt);

        assert_ne!(both.as_bytes(), pw_only.as_bytes());
        assert_ne!(both.as_bytes(), other_kf.as_bytes());
        assert_ne!(both.as_bytes(), kf_only.as_bytes());
    }
}
