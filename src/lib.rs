#![forbid(unsafe_code)]
//! # seal_file — authenticated encryption for files and directory trees.
//!
//! `seal_file` encrypts files under a password, a keyfile, both together, or
//! an X25519 key pair. Every file gets a fresh data-encryption key (DEK) which
//! is wrapped in a small header under a key-encryption key (KEK) derived from
//! the credential. The body is streamed through XChaCha20-Poly1305 in fixed
//! size chunks, each authenticated against the previous chunk's tag.
//!
//! ## Features
//! - **Password and keyfile credentials** via Argon2id and BLAKE3
//! - **Encrypt to yourself or to recipients** via X25519, with optional sender authentication
//! - **Multi-recipient files**: one body, one wrapped header per recipient
//! - **Tamper evidence**: any flipped bit, dropped, reordered or appended chunk fails
//! - **Directory batches** that run the password hash once per tree
//! - **File name obfuscation** with the original name stored inside the ciphertext
//!
//! ## Example: Encrypt and decrypt a file with a password
//! ```no_run
//! use seal_file::{Credential, DecryptOptions, EncryptOptions, decrypt_file, encrypt_file};
//! use secrecy::SecretString;
//! use std::path::Path;
//!
//! let cred = Credential::Password(SecretString::from("correct horse battery staple"));
//! // the plaintext is removed once the container is in place
//! let opts = EncryptOptions {
//!     overwrite_input: true,
//!     ..Default::default()
//! };
//!
//! let sealed = encrypt_file(Path::new("notes.txt"), None, &cred, &opts).unwrap();
//! let restored = decrypt_file(&sealed, None, &cred, &DecryptOptions::from(&opts)).unwrap();
//! assert_eq!(restored, Path::new("notes.txt"));
//! ```
//!
//! ## Example: Encrypt to a recipient
//! ```no_run
//! use seal_file::{Credential, EncryptOptions, encrypt_file, generate_key_pair};
//! use std::path::Path;
//!
//! let (_their_private, their_public) = generate_key_pair().unwrap();
//! let cred = Credential::Recipients { sender: None, recipients: vec![their_public] };
//! encrypt_file(Path::new("report.pdf"), None, &cred, &EncryptOptions::default()).unwrap();
//! ```
//!
//! Safety notes
//! - The crate is not audited or reviewed! Protects data at rest. Does not defend against compromised hosts/side channels.
//! - KDF parameters and chunk size are not stored in the file; decrypt with the values used to encrypt.

mod armor;
mod batch;
pub mod chunk;
mod credential;
mod crypto;
mod exchange;
mod file;
pub mod format;
pub mod header;
mod kdf;
mod keys;
mod secret;
mod types;

pub use types::*;
pub use secret::{Dek, KEY_LEN, Kek, SecretBytes};
pub use crypto::{NONCE_LEN, SALT_LEN, TAG_LEN};
pub use kdf::{
    KEYFILE_PREFIX_LEN, KeyfileDigest, MAX_PARALLELISM, MIN_MEMORY_COST_KIB, MIN_TIME_COST,
    combine_password_and_keyfile, derive_from_keyfile, derive_from_password,
    derive_from_password_and_keyfile, generate_keyfile, keyfile_digest, read_keyfile,
};
pub use exchange::{
    EphemeralAgreement, PUBLIC_KEY_LEN, PrivateKey, PublicKey, ephemeral_recipient_shared_secret,
    kek_from_shared_secrets, receive_ephemeral, recipient_shared_secret, self_shared_secret,
};
pub use keys::{
    PRIVATE_KEY_FILE, PUBLIC_KEY_FILE, decode_public_key, encode_public_key, generate_key_pair,
    load_private_key, load_public_key, save_key_pair, unwrap_private_key, wrap_private_key,
};
pub use credential::{Credential, derive_kek};
pub use file::{
    decrypt_file, default_decrypt_output_path, default_encrypt_output_path, encrypt_file,
    write_all_atomic,
};
pub use batch::{
    BatchReport, DirectoryNames, FileOutcome, KeepNames, SALT_FILE, decrypt_directory,
    encrypt_directory,
};
