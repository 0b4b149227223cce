//! Directory batches: one salt and one KEK for every file in a tree.
//!
//! Symmetric credentials run the expensive KDF once per directory. The salt is
//! persisted read-only as `seal_file.salt` next to the encrypted files and
//! removed only after a batch decrypts every file. Each container still
//! carries the salt in its own header record, so a single file can always be
//! decrypted on its own.
//!
//! Key-pair credentials need no shared salt; every file gets fresh ephemeral
//! keys and the batch only adds enumeration and reporting.

use std::fs;
use std::path::{Path, PathBuf};

use crate::credential::{Credential, SharedKek, derive_kek};
use crate::crypto::{SALT_LEN, generate_salt};
use crate::file::{decrypt_file_with, encrypt_file_with, is_encrypted_path, write_all_atomic};
use crate::types::{DecryptOptions, EncryptOptions, SealFileError};

/// Name of the per-directory salt file.
pub const SALT_FILE: &str = "seal_file.salt";

/// Renames a directory before encryption and restores it after a complete
/// decryption. Implementations own the naming scheme.
pub trait DirectoryNames {
    /// Called before enumeration; returns the directory to encrypt.
    fn obfuscate(&self, dir: &Path) -> Result<PathBuf, SealFileError>;
    /// Called once every file has decrypted; returns the restored directory.
    fn deobfuscate(&self, dir: &Path) -> Result<PathBuf, SealFileError>;
}

/// Leaves directory names untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepNames;

impl DirectoryNames for KeepNames {
    fn obfuscate(&self, dir: &Path) -> Result<PathBuf, SealFileError> {
        Ok(dir.to_path_buf())
    }

    fn deobfuscate(&self, dir: &Path) -> Result<PathBuf, SealFileError> {
        Ok(dir.to_path_buf())
    }
}

/// Result for one file of a batch.
#[derive(Debug)]
pub struct FileOutcome {
    pub input: PathBuf,
    /// The path written, or why this file was skipped.
    pub result: Result<PathBuf, SealFileError>,
}

/// What a batch did, file by file.
#[derive(Debug)]
pub struct BatchReport {
    /// Directory the batch ended up in, after any renaming.
    pub directory: PathBuf,
    pub total: usize,
    pub successful: usize,
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            total: 0,
            successful: 0,
            outcomes: Vec::new(),
        }
    }

    fn record(&mut self, input: PathBuf, result: Result<PathBuf, SealFileError>) {
        self.total += 1;
        match &result {
            Ok(out) => {
                self.successful += 1;
                tracing::debug!(input = %input.display(), output = %out.display(), "batch item done");
            }
            Err(e) => tracing::warn!(input = %input.display(), error = %e, "batch item failed"),
        }
        self.outcomes.push(FileOutcome { input, result });
    }

    /// `true` when every enumerated file succeeded.
    pub fn is_complete(&self) -> bool {
        self.successful == self.total
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

/// Encrypt every regular file under `dir`, recursively.
///
/// Files already carrying the `.enc` extension and the salt file are skipped.
/// One file failing never stops the batch; see [`BatchReport`].
///
/// # Errors
///
/// Only for batch-wide problems: `dir` is not a readable directory, the salt
/// file cannot be written or read, or key derivation fails.
pub fn encrypt_directory(
    dir: &Path,
    credential: &Credential,
    opts: &EncryptOptions,
    names: &dyn DirectoryNames,
) -> Result<BatchReport, SealFileError> {
    ensure_dir(dir)?;
    let dir = names.obfuscate(dir)?;

    let shared = if credential.is_symmetric() {
        let salt = load_or_create_salt(&dir)?;
        Some(SharedKek {
            salt,
            kek: derive_kek(credential, &salt, &opts.kdf_params)?,
        })
    } else {
        None
    };

    let mut report = BatchReport::new(dir.clone());
    for path in collect_files(&dir)? {
        if is_salt_file(&path) {
            continue;
        }
        if is_encrypted_path(&path) {
            tracing::warn!(path = %path.display(), "skipping already encrypted file");
            continue;
        }
        let result = encrypt_file_with(&path, None, credential, opts, shared.as_ref());
        report.record(path, result);
    }

    tracing::info!(
        dir = %dir.display(),
        successful = report.successful,
        total = report.total,
        "encrypted directory"
    );
    Ok(report)
}

/// Decrypt every `.enc` file under `dir`, recursively.
///
/// The salt file is deleted and the directory name restored only when every
/// file succeeded; otherwise both stay so the batch can be retried.
///
/// # Errors
///
/// Only for batch-wide problems: `dir` is not a readable directory, the salt
/// file is missing or malformed for a symmetric credential, or key derivation
/// fails.
pub fn decrypt_directory(
    dir: &Path,
    credential: &Credential,
    opts: &DecryptOptions,
    names: &dyn DirectoryNames,
) -> Result<BatchReport, SealFileError> {
    ensure_dir(dir)?;
    let salt_path = dir.join(SALT_FILE);

    let shared = if credential.is_symmetric() {
        let salt = read_salt(&salt_path)?;
        Some(SharedKek {
            salt,
            kek: derive_kek(credential, &salt, &opts.kdf_params)?,
        })
    } else {
        None
    };

    let mut report = BatchReport::new(dir.to_path_buf());
    for path in collect_files(dir)? {
        if !is_encrypted_path(&path) {
            continue;
        }
        let result = decrypt_file_with(&path, None, credential, opts, shared.as_ref());
        report.record(path, result);
    }

    if report.is_complete() {
        if salt_path.exists() {
            remove_salt_file(&salt_path)?;
        }
        report.directory = names.deobfuscate(dir)?;
    } else {
        tracing::warn!(
            dir = %dir.display(),
            failed = report.total - report.successful,
            "keeping salt file, batch incomplete"
        );
    }

    tracing::info!(
        dir = %report.directory.display(),
        successful = report.successful,
        total = report.total,
        "decrypted directory"
    );
    Ok(report)
}

fn ensure_dir(dir: &Path) -> Result<(), SealFileError> {
    if !fs::metadata(dir)?.is_dir() {
        return Err(SealFileError::Invalid("not a directory"));
    }
    Ok(())
}

fn is_salt_file(path: &Path) -> bool {
    path.file_name().is_some_and(|n| n == SALT_FILE)
}

/// Reuse an existing salt so a partially encrypted tree keeps a single salt.
fn load_or_create_salt(dir: &Path) -> Result<[u8; SALT_LEN], SealFileError> {
    let path = dir.join(SALT_FILE);
    if path.exists() {
        tracing::debug!(path = %path.display(), "reusing directory salt");
        return read_salt(&path);
    }
    let salt = generate_salt()?;
    write_all_atomic(&path, &salt, false, false)?;
    let mut perms = fs::metadata(&path)?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(&path, perms)?;
    tracing::debug!(path = %path.display(), "wrote directory salt");
    Ok(salt)
}

fn read_salt(path: &Path) -> Result<[u8; SALT_LEN], SealFileError> {
    let raw = fs::read(path)?;
    raw.as_slice()
        .try_into()
        .map_err(|_| SealFileError::Format("salt file has the wrong length"))
}

fn remove_salt_file(path: &Path) -> Result<(), SealFileError> {
    #[cfg(windows)]
    {
        let mut perms = fs::metadata(path)?.permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
    }
    fs::remove_file(path)?;
    Ok(())
}

/// Files under `dir`, sorted so batches run in a stable order.
///
/// Symlinks to directories are not followed. Any other symlink is listed, so
/// a dangling one shows up as a failed item instead of vanishing.
fn collect_files(dir: &Path) -> Result<Vec<PathBuf>, SealFileError> {
    let mut results = Vec::new();
    collect_files_inner(dir, &mut results)?;
    results.sort();
    Ok(results)
}

fn collect_files_inner(current: &Path, results: &mut Vec<PathBuf>) -> Result<(), SealFileError> {
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            collect_files_inner(&path, results)?;
        } else if file_type.is_file() || (file_type.is_symlink() && !path.is_dir()) {
            results.push(path);
        }
    }
    Ok(())
}
