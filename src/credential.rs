//! Credentials and KEK establishment for header records.

use secrecy::SecretString;

use crate::crypto::{SALT_LEN, fill_random, generate_salt};
use crate::exchange::{
    PUBLIC_KEY_LEN, PrivateKey, PublicKey, ephemeral_recipient_shared_secret,
    kek_from_shared_secrets, receive_ephemeral, recipient_shared_secret, self_shared_secret,
};
use crate::format::HeaderRecord;
use crate::kdf::{KeyfileDigest, derive_from_keyfile, derive_from_password, derive_from_password_and_keyfile};
use crate::secret::Kek;
use crate::types::{KdfParams, SealFileError};

/// What the user presents to encrypt or decrypt.
pub enum Credential {
    Password(SecretString),
    Keyfile(KeyfileDigest),
    PasswordAndKeyfile(SecretString, KeyfileDigest),
    /// Encrypt to yourself; on decryption also opens anonymous files sent to this key.
    PrivateKey(PrivateKey),
    /// Encrypt to one or more recipients. A sender key authenticates the origin.
    Recipients {
        sender: Option<PrivateKey>,
        recipients: Vec<PublicKey>,
    },
    /// Decrypt a file whose sender authenticated with their static key.
    FromSender {
        recipient: PrivateKey,
        sender: PublicKey,
    },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

impl Credential {
    /// Short label for logs. Never includes secret material.
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Password(_) => "password",
            Credential::Keyfile(_) => "keyfile",
            Credential::PasswordAndKeyfile(..) => "password+keyfile",
            Credential::PrivateKey(_) => "private-key",
            Credential::Recipients { .. } => "recipients",
            Credential::FromSender { .. } => "from-sender",
        }
    }

    /// Password and keyfile credentials share a KEK per salt; key-pair
    /// credentials derive a fresh one per record.
    pub fn is_symmetric(&self) -> bool {
        matches!(
            self,
            Credential::Password(_) | Credential::Keyfile(_) | Credential::PasswordAndKeyfile(..)
        )
    }
}

/// Derive the KEK for a symmetric credential and salt.
///
/// Key-pair credentials have no salt-only KEK; they fail with `Invalid`.
pub fn derive_kek(
    credential: &Credential,
    salt: &[u8; SALT_LEN],
    params: &KdfParams,
) -> Result<Kek, SealFileError> {
    match credential {
        Credential::Password(pw) => derive_from_password(pw, salt, params),
        Credential::Keyfile(kf) => Ok(derive_from_keyfile(kf, salt)),
        Credential::PasswordAndKeyfile(pw, kf) => {
            derive_from_password_and_keyfile(pw, kf, salt, params)
        }
        _ => Err(SealFileError::Invalid(
            "key-pair credentials derive a KEK per file",
        )),
    }
}

/// A KEK derived once and shared by every file of a directory batch.
pub(crate) struct SharedKek {
    pub salt: [u8; SALT_LEN],
    pub kek: Kek,
}

/// Key slot, salt and KEK for one header record about to be written.
pub(crate) struct RecordKeying {
    pub ephemeral_public: [u8; PUBLIC_KEY_LEN],
    pub salt: [u8; SALT_LEN],
    pub kek: Kek,
}

/// Establish one KEK per header record to write.
pub(crate) fn encryption_keyings(
    credential: &Credential,
    params: &KdfParams,
    shared: Option<&SharedKek>,
) -> Result<Vec<RecordKeying>, SealFileError> {
    match credential {
        Credential::Password(_) | Credential::Keyfile(_) | Credential::PasswordAndKeyfile(..) => {
            // random slot so symmetric files look like key-pair files
            let mut ephemeral_public = [0u8; PUBLIC_KEY_LEN];
            fill_random(&mut ephemeral_public)?;
            let (salt, kek) = match shared {
                Some(s) => (s.salt, Kek::from_bytes(*s.kek.as_bytes())),
                None => {
                    let salt = generate_salt()?;
                    let kek = derive_kek(credential, &salt, params)?;
                    (salt, kek)
                }
            };
            Ok(vec![RecordKeying {
                ephemeral_public,
                salt,
                kek,
            }])
        }
        Credential::PrivateKey(own) => {
            let agreement = self_shared_secret(own)?;
            let salt = generate_salt()?;
            let kek = kek_from_shared_secrets(
                &salt,
                &agreement.shared,
                None,
                &agreement.ephemeral_public,
                &own.public_key(),
            );
            Ok(vec![RecordKeying {
                ephemeral_public: *agreement.ephemeral_public.as_bytes(),
                salt,
                kek,
            }])
        }
        Credential::Recipients { sender, recipients } => {
            if recipients.is_empty() {
                return Err(SealFileError::Invalid("at least one recipient is required"));
            }
            recipients
                .iter()
                .map(|recipient| {
                    let agreement = ephemeral_recipient_shared_secret(recipient)?;
                    let static_shared = sender
                        .as_ref()
                        .map(|s| recipient_shared_secret(s, recipient))
                        .transpose()?;
                    let salt = generate_salt()?;
                    let kek = kek_from_shared_secrets(
                        &salt,
                        &agreement.shared,
                        static_shared.as_ref(),
                        &agreement.ephemeral_public,
                        recipient,
                    );
                    Ok(RecordKeying {
                        ephemeral_public: *agreement.ephemeral_public.as_bytes(),
                        salt,
                        kek,
                    })
                })
                .collect()
        }
        Credential::FromSender { .. } => Err(SealFileError::Invalid(
            "from-sender credentials can only decrypt",
        )),
    }
}

/// KEK for one record on the decryption side.
///
/// `shared` is used when its salt matches the record, which is how a
/// directory batch avoids re-running Argon2id for every file.
pub(crate) fn decryption_kek(
    credential: &Credential,
    record: &HeaderRecord,
    params: &KdfParams,
    shared: Option<&SharedKek>,
) -> Result<Kek, SealFileError> {
    match credential {
        Credential::Password(_) | Credential::Keyfile(_) | Credential::PasswordAndKeyfile(..) => {
            match shared {
                Some(s) if s.salt == record.salt => Ok(Kek::from_bytes(*s.kek.as_bytes())),
                _ => derive_kek(credential, &record.salt, params),
            }
        }
        Credential::PrivateKey(own) => {
            let ephemeral = PublicKey::from_bytes(record.ephemeral_public);
            let shared = receive_ephemeral(own, &ephemeral)?;
            Ok(kek_from_shared_secrets(
                &record.salt,
                &shared,
                None,
                &ephemeral,
                &own.public_key(),
            ))
        }
        Credential::FromSender { recipient, sender } => {
            let ephemeral = PublicKey::from_bytes(record.ephemeral_public);
            let eph_shared = receive_ephemeral(recipient, &ephemeral)?;
            let static_shared = recipient_shared_secret(recipient, sender)?;
            Ok(kek_from_shared_secrets(
                &record.salt,
                &eph_shared,
                Some(&static_shared),
                &ephemeral,
                &recipient.public_key(),
            ))
        }
        Credential::Recipients { .. } => Err(SealFileError::Invalid(
            "recipient lists can only encrypt",
        )),
    }
}
