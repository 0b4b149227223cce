//! X25519 key exchange.
//!
//! Every encryption generates a fresh ephemeral key pair per header record, so
//! even "encrypt to myself" never reuses a shared secret across files. Shared
//! secrets that come out as all zeros (peer sent a low-order point) are refused.

use x25519_dalek::{PublicKey as DalekPublic, SharedSecret, StaticSecret};

use crate::crypto::SALT_LEN;
use crate::secret::{KEY_LEN, Kek, SecretBytes};
use crate::types::SealFileError;

/// Size of an X25519 public key in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Size of an X25519 private key in bytes.
pub const PRIVATE_KEY_LEN: usize = 32;

const KEK_CONTEXT: &str = "seal_file 2026-10 asymmetric kek v1";

/// An X25519 private key. The inner secret zeroizes itself on drop.
pub struct PrivateKey {
    secret: StaticSecret,
}

impl PrivateKey {
    /// Generate a new random private key.
    pub fn generate() -> Result<Self, SealFileError> {
        let bytes = SecretBytes::<PRIVATE_KEY_LEN>::random()?;
        Ok(Self::from_bytes(bytes.as_bytes()))
    }

    pub fn from_bytes(bytes: &[u8; PRIVATE_KEY_LEN]) -> Self {
        Self {
            secret: StaticSecret::from(*bytes),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(DalekPublic::from(&self.secret))
    }

    /// Raw scalar bytes, wrapped so they are wiped after use.
    pub fn to_secret_bytes(&self) -> SecretBytes<PRIVATE_KEY_LEN> {
        SecretBytes::from_bytes(self.secret.to_bytes())
    }

    fn agree(&self, peer: &PublicKey) -> Result<SharedSecret, SealFileError> {
        let shared = self.secret.diffie_hellman(&peer.0);
        if !shared.was_contributory() {
            return Err(SealFileError::InvalidKey);
        }
        Ok(shared)
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public", &self.public_key())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// An X25519 public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(DalekPublic);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(DalekPublic::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PublicKey")
            .field(&crate::keys::encode_public_key(self))
            .finish()
    }
}

/// Result of an exchange that generated an ephemeral key pair.
pub struct EphemeralAgreement {
    pub shared: SecretBytes<KEY_LEN>,
    pub ephemeral_public: PublicKey,
}

/// Encrypt-to-self: fresh ephemeral pair, agree with our own public key.
pub fn self_shared_secret(own: &PrivateKey) -> Result<EphemeralAgreement, SealFileError> {
    ephemeral_recipient_shared_secret(&own.public_key())
}

/// Static sender to recipient agreement.
pub fn recipient_shared_secret(
    sender: &PrivateKey,
    recipient: &PublicKey,
) -> Result<SecretBytes<KEY_LEN>, SealFileError> {
    let shared = sender.agree(recipient)?;
    Ok(SecretBytes::from_bytes(*shared.as_bytes()))
}

/// Fresh ephemeral pair agreeing with `recipient`.
pub fn ephemeral_recipient_shared_secret(
    recipient: &PublicKey,
) -> Result<EphemeralAgreement, SealFileError> {
    let ephemeral = PrivateKey::generate()?;
    let shared = ephemeral.agree(recipient)?;
    Ok(EphemeralAgreement {
        shared: SecretBytes::from_bytes(*shared.as_bytes()),
        ephemeral_public: ephemeral.public_key(),
    })
}

/// Recipient side of [`ephemeral_recipient_shared_secret`] and [`self_shared_secret`].
pub fn receive_ephemeral(
    own: &PrivateKey,
    ephemeral_public: &PublicKey,
) -> Result<SecretBytes<KEY_LEN>, SealFileError> {
    recipient_shared_secret(own, ephemeral_public)
}

/// Turn one or two shared secrets into a KEK bound to the salt and both public keys.
pub fn kek_from_shared_secrets(
    salt: &[u8; SALT_LEN],
    ephemeral_shared: &SecretBytes<KEY_LEN>,
    static_shared: Option<&SecretBytes<KEY_LEN>>,
    ephemeral_public: &PublicKey,
    recipient_public: &PublicKey,
) -> Kek {
    let mut hasher = blake3::Hasher::new_derive_key(KEK_CONTEXT);
    hasher.update(salt);
    hasher.update(ephemeral_shared.as_bytes());
    if let Some(s) = static_shared {
        hasher.update(s.as_bytes());
    }
    hasher.update(ephemeral_public.as_bytes());
    hasher.update(recipient_public.as_bytes());
    Kek::from_bytes(*hasher.finalize().as_bytes())
}
