//! Key pair generation and key material at rest.
//!
//! Public keys travel as Base64 text of a 2-byte algorithm prefix followed by
//! the curve point. Private keys are stored wrapped under a passphrase:
//!
//! ```text
//! [2: "X2"][2: version LE][16: salt][24: nonce][32: encrypted key][16: tag]
//! ```
//!
//! The prefix and version are authenticated as AAD.

use std::fs;
use std::path::{Path, PathBuf};

use base64::{Engine, engine::general_purpose};
use secrecy::SecretString;
use zeroize::Zeroizing;

use crate::armor::{armor_encode, dearmor_decode, looks_armored};
use crate::crypto::{NONCE_LEN, SALT_LEN, TAG_LEN, generate_nonce, generate_salt, open_in_place, seal_in_place};
use crate::exchange::{PRIVATE_KEY_LEN, PUBLIC_KEY_LEN, PrivateKey, PublicKey};
use crate::kdf::derive_from_password;
use crate::types::{KdfParams, SealFileError};

/// Algorithm prefix identifying X25519 key material.
pub const KEY_ALGORITHM_X25519: [u8; 2] = *b"X2";

/// Version of the wrapped private key layout.
pub const PRIVATE_KEY_VERSION: u16 = 1;

/// Encoded public key length (prefix + point).
pub const ENCODED_PUBLIC_KEY_LEN: usize = 2 + PUBLIC_KEY_LEN;

/// Wrapped private key length.
pub const WRAPPED_PRIVATE_KEY_LEN: usize = 2 + 2 + SALT_LEN + NONCE_LEN + PRIVATE_KEY_LEN + TAG_LEN;

/// File name of the public half written by [`save_key_pair`].
pub const PUBLIC_KEY_FILE: &str = "seal_file.public";

/// File name of the private half written by [`save_key_pair`].
pub const PRIVATE_KEY_FILE: &str = "seal_file.private";

/// Generate a fresh X25519 key pair.
pub fn generate_key_pair() -> Result<(PrivateKey, PublicKey), SealFileError> {
    let private = PrivateKey::generate()?;
    let public = private.public_key();
    Ok((private, public))
}

/// Encode a public key as single-line Base64 text.
pub fn encode_public_key(key: &PublicKey) -> String {
    let mut raw = [0u8; ENCODED_PUBLIC_KEY_LEN];
    raw[..2].copy_from_slice(&KEY_ALGORITHM_X25519);
    raw[2..].copy_from_slice(key.as_bytes());
    general_purpose::STANDARD.encode(raw)
}

/// Decode a public key produced by [`encode_public_key`].
pub fn decode_public_key(text: &str) -> Result<PublicKey, SealFileError> {
    let raw = general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|_| SealFileError::KeyFormat("public key is not valid Base64"))?;
    if raw.len() != ENCODED_PUBLIC_KEY_LEN {
        return Err(SealFileError::KeyFormat("public key has the wrong length"));
    }
    if raw[..2] != KEY_ALGORITHM_X25519 {
        return Err(SealFileError::KeyFormat("public key is not an X25519 key"));
    }
    let mut point = [0u8; PUBLIC_KEY_LEN];
    point.copy_from_slice(&raw[2..]);
    Ok(PublicKey::from_bytes(point))
}

fn private_key_aad() -> [u8; 4] {
    let mut aad = [0u8; 4];
    aad[..2].copy_from_slice(&KEY_ALGORITHM_X25519);
    aad[2..].copy_from_slice(&PRIVATE_KEY_VERSION.to_le_bytes());
    aad
}

/// Encrypt a private key under a passphrase-derived key.
pub fn wrap_private_key(
    key: &PrivateKey,
    passphrase: &SecretString,
    params: &KdfParams,
) -> Result<Vec<u8>, SealFileError> {
    let salt = generate_salt()?;
    let nonce = generate_nonce()?;
    let wrapping_key = derive_from_password(passphrase, &salt, params)?;

    let aad = private_key_aad();
    let mut body = Zeroizing::new(*key.to_secret_bytes().as_bytes());
    let tag = seal_in_place(wrapping_key.as_bytes(), &nonce, &aad, body.as_mut())?;

    let mut out = Vec::with_capacity(WRAPPED_PRIVATE_KEY_LEN);
    out.extend_from_slice(&aad);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(body.as_ref());
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Decrypt a wrapped private key.
///
/// # Errors
///
/// - `KeyFormat` if the blob has the wrong length, prefix or version.
/// - `Authentication` if the passphrase is wrong or the blob was modified.
pub fn unwrap_private_key(
    blob: &[u8],
    passphrase: &SecretString,
    params: &KdfParams,
) -> Result<PrivateKey, SealFileError> {
    if blob.len() != WRAPPED_PRIVATE_KEY_LEN {
        return Err(SealFileError::KeyFormat("wrapped private key has the wrong length"));
    }
    if blob[..2] != KEY_ALGORITHM_X25519 {
        return Err(SealFileError::KeyFormat("private key is not an X25519 key"));
    }
    if blob[2..4] != PRIVATE_KEY_VERSION.to_le_bytes() {
        return Err(SealFileError::KeyFormat("unsupported private key version"));
    }

    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    let mut body = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
    let mut tag = [0u8; TAG_LEN];
    let mut at = 4;
    salt.copy_from_slice(&blob[at..at + SALT_LEN]);
    at += SALT_LEN;
    nonce.copy_from_slice(&blob[at..at + NONCE_LEN]);
    at += NONCE_LEN;
    body.copy_from_slice(&blob[at..at + PRIVATE_KEY_LEN]);
    at += PRIVATE_KEY_LEN;
    tag.copy_from_slice(&blob[at..]);

    let wrapping_key = derive_from_password(passphrase, &salt, params)?;
    if !open_in_place(wrapping_key.as_bytes(), &nonce, &private_key_aad(), body.as_mut(), &tag) {
        return Err(SealFileError::Authentication);
    }
    Ok(PrivateKey::from_bytes(&body))
}

/// Write `seal_file.public` and `seal_file.private` into `dir`.
///
/// Refuses to overwrite an existing key pair. The private key file is 0600 on Unix.
pub fn save_key_pair(
    dir: &Path,
    key: &PrivateKey,
    passphrase: &SecretString,
    params: &KdfParams,
) -> Result<(PathBuf, PathBuf), SealFileError> {
    let public_path = dir.join(PUBLIC_KEY_FILE);
    let private_path = dir.join(PRIVATE_KEY_FILE);

    let wrapped = wrap_private_key(key, passphrase, params)?;
    let mut public_text = encode_public_key(&key.public_key());
    public_text.push('\n');

    crate::file::write_all_atomic(&private_path, armor_encode(&wrapped).as_bytes(), true, false)?;
    crate::file::write_all_atomic(&public_path, public_text.as_bytes(), false, false)?;
    tracing::info!(public = %public_path.display(), "saved key pair");
    Ok((public_path, private_path))
}

/// Read a public key from a file, or treat `arg` as the key text itself.
pub fn load_public_key(arg: &str) -> Result<PublicKey, SealFileError> {
    let path = Path::new(arg);
    if path.is_file() {
        let text = fs::read_to_string(path)?;
        decode_public_key(&text)
    } else {
        decode_public_key(arg)
    }
}

/// Read and unwrap an armored private key file.
pub fn load_private_key(
    path: &Path,
    passphrase: &SecretString,
    params: &KdfParams,
) -> Result<PrivateKey, SealFileError> {
    let text = Zeroizing::new(fs::read_to_string(path)?);
    if !looks_armored(&text) {
        return Err(SealFileError::KeyFormat("missing private key armor"));
    }
    let blob = Zeroizing::new(dearmor_decode(&text)?);
    unwrap_private_key(&blob, passphrase, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::MIN_MEMORY_COST_KIB;

    fn fast() -> KdfParams {
        KdfParams {
            t_cost: 1,
            mem_kib: MIN_MEMORY_COST_KIB,
            parallelism: 1,
        }
    }

    #[test]
    fn public_key_text_roundtrip() {
        let (_, public) = generate_key_pair().unwrap();
        let text = encode_public_key(&public);
        assert_eq!(decode_public_key(&text).unwrap(), public);
    }

    #[test]
    fn public_key_rejects_wrong_prefix() {
        let mut raw = [7u8; ENCODED_PUBLIC_KEY_LEN];
        raw[..2].copy_from_slice(b"Ed");
        let text = general_purpose::STANDARD.encode(raw);
        assert!(matches!(
            decode_public_key(&text),
            Err(SealFileError::KeyFormat(_))
        ));
        assert!(matches!(
            decode_public_key("not base64 !!"),
            Err(SealFileError::KeyFormat(_))
        ));
    }

    #[test]
    fn wrap_unwrap_and_wrong_passphrase() {
        let (private, public) = generate_key_pair().unwrap();
        let pass = SecretString::from("key passphrase");
        let blob = wrap_private_key(&private, &pass, &fast()).unwrap();
        assert_eq!(blob.len(), WRAPPED_PRIVATE_KEY_LEN);

        let back = unwrap_private_key(&blob, &pass, &fast()).unwrap();
        assert_eq!(back.public_key(), public);

        let wrong = SecretString::from("nope");
        assert!(matches!(
            unwrap_private_key(&blob, &wrong, &fast()),
            Err(SealFileError::Authentication)
        ));
    }

    #[test]
    fn save_and_load_key_pair() {
        let dir = tempfile::tempdir().unwrap();
        let (private, public) = generate_key_pair().unwrap();
        let pass = SecretString::from("pp");
        let (pub_path, priv_path) = save_key_pair(dir.path(), &private, &pass, &fast()).unwrap();

        let loaded_pub = load_public_key(pub_path.to_str().unwrap()).unwrap();
        assert_eq!(loaded_pub, public);
        let loaded_priv = load_private_key(&priv_path, &pass, &fast()).unwrap();
        assert_eq!(loaded_priv.public_key(), public);

        assert!(save_key_pair(dir.path(), &private, &pass, &fast()).is_err());
    }
}
