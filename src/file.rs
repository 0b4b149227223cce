//! File-level encryption and decryption.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use base64::{Engine, engine::general_purpose};
use tempfile::NamedTempFile;
use zeroize::Zeroizing;

use crate::chunk::{BodyLayout, ChunkState, decrypt_body, encrypt_body};
use crate::credential::{Credential, SharedKek, decryption_kek, encryption_keyings};
use crate::crypto::{fill_random, generate_nonce};
use crate::format::{HeaderRecord, read_header, write_header};
use crate::header::{Metadata, decrypt_header, encrypt_header, header_aad};
use crate::secret::Dek;
use crate::types::{
    DecryptOptions, ENCRYPTED_EXTENSION, EncryptOptions, SealFileError, validate_chunk_size,
};

/// Random bytes behind an obfuscated name; 16 bytes encode to 22 Base64 characters.
const OBFUSCATED_NAME_BYTES: usize = 16;

/// Atomically write data to a file using a temporary file.
///
/// The temporary file lives in the target's directory and is renamed into
/// place only after everything has been written and synced.
///
/// # Arguments
///
/// * `path` - Target file path
/// * `data` - Data to write
/// * `mode_600` - Whether to set file permissions to 0o600 (Unix only)
/// * `force` - Replace an existing target instead of failing
pub fn write_all_atomic(
    path: &Path,
    data: &[u8],
    mode_600: bool,
    force: bool,
) -> Result<(), SealFileError> {
    let parent = parent_dir(path);
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    if mode_600 {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
        }
    }
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    promote(tmp, path, force)?;
    Ok(())
}

/// Move a finished temp file to `out`.
///
/// Without `force` the rename is exclusive, so a concurrent writer of the same
/// path makes this fail instead of being silently replaced.
fn promote(tmp: NamedTempFile, out: &Path, force: bool) -> Result<PathBuf, SealFileError> {
    let persisted = if force {
        tmp.persist(out)
    } else {
        tmp.persist_noclobber(out)
    };
    match persisted {
        Ok(_) => Ok(out.to_path_buf()),
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Err(
            SealFileError::Invalid("output exists; use --force to overwrite"),
        ),
        Err(e) => Err(SealFileError::Io(e.error)),
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn refuse_existing(out: &Path, force: bool) -> Result<(), SealFileError> {
    if out.exists() && !force {
        return Err(SealFileError::Invalid(
            "output exists; use --force to overwrite",
        ));
    }
    Ok(())
}

/// Default output path for encryption: `<input>.enc`, keeping any existing extension.
pub fn default_encrypt_output_path(input: &Path) -> PathBuf {
    let mut name = input
        .file_name()
        .unwrap_or_else(|| OsStr::new("out"))
        .to_os_string();
    name.push(".");
    name.push(ENCRYPTED_EXTENSION);
    input.with_file_name(name)
}

/// Determine the default output path for decryption operations.
///
/// - If the input file ends with ".enc", strip that extension
/// - Otherwise, append ".dec"
pub fn default_decrypt_output_path(in_path: &Path) -> PathBuf {
    let parent = in_path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = in_path.file_name().unwrap_or_else(|| OsStr::new("out"));

    if let Some(name) = file_name.to_str() {
        if let Some(stripped) = name.strip_suffix(".enc")
            && !stripped.is_empty()
        {
            return parent.join(stripped);
        }
        return parent.join(format!("{name}.dec"));
    }

    // Non-UTF-8 file name: just append ".dec"
    let mut os = file_name.to_os_string();
    os.push(".dec");
    parent.join(os)
}

/// `true` if the path carries the encrypted-file extension.
pub fn is_encrypted_path(path: &Path) -> bool {
    path.extension() == Some(OsStr::new(ENCRYPTED_EXTENSION))
}

fn obfuscated_file_name() -> Result<String, SealFileError> {
    let mut raw = [0u8; OBFUSCATED_NAME_BYTES];
    fill_random(&mut raw)?;
    Ok(format!(
        "{}.{ENCRYPTED_EXTENSION}",
        general_purpose::URL_SAFE_NO_PAD.encode(raw)
    ))
}

/// A bare file name that joins onto a directory without leaving it.
///
/// Only the exact names `.` and `..` are refused; `v1..2.txt` is fine.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// Check a file name recovered from a container before it is used as a path.
fn recovered_file_name(raw: &[u8]) -> Result<String, SealFileError> {
    let name = std::str::from_utf8(raw)
        .map_err(|_| SealFileError::Format("stored file name is not UTF-8"))?;
    if !is_plain_name(name) {
        return Err(SealFileError::Format("stored file name is not a plain name"));
    }
    Ok(name.to_owned())
}

/// Encrypt `input` into a sealed container.
///
/// Returns the path written. With `opts.obfuscate_names` and no explicit
/// `output`, the container gets a random name and the original name travels
/// inside the ciphertext.
///
/// # Errors
///
/// - `Invalid` for a bad chunk size, an existing output without `force`, or
///   an input that changes size while it is read.
/// - `KeyDerivation` for out-of-range KDF parameters.
/// - `Io` for file access problems; no partial output is left behind.
pub fn encrypt_file(
    input: &Path,
    output: Option<&Path>,
    credential: &Credential,
    opts: &EncryptOptions,
) -> Result<PathBuf, SealFileError> {
    encrypt_file_with(input, output, credential, opts, None)
}

pub(crate) fn encrypt_file_with(
    input: &Path,
    output: Option<&Path>,
    credential: &Credential,
    opts: &EncryptOptions,
    shared: Option<&SharedKek>,
) -> Result<PathBuf, SealFileError> {
    validate_chunk_size(opts.chunk_size)?;

    let mut infile = File::open(input)?;
    let in_meta = infile.metadata()?;
    if !in_meta.is_file() {
        return Err(SealFileError::Invalid("input is not a regular file"));
    }

    let original_name = if opts.obfuscate_names {
        input
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(SealFileError::Invalid("file name is not valid UTF-8"))?
    } else {
        ""
    };
    // a stored name must be one that decryption will restore
    if opts.obfuscate_names && !is_plain_name(original_name) {
        return Err(SealFileError::Invalid("file name cannot be restored on decryption"));
    }
    let trailer = original_name.as_bytes();

    let out_path = match output {
        Some(p) => p.to_path_buf(),
        None if opts.obfuscate_names => parent_dir(input).join(obfuscated_file_name()?),
        None => default_encrypt_output_path(input),
    };
    refuse_existing(&out_path, opts.force)?;

    let layout = BodyLayout::for_plaintext(in_meta.len() + trailer.len() as u64, opts.chunk_size)?;
    let keyings = encryption_keyings(credential, &opts.kdf_params, shared)?;
    let record_count = u16::try_from(keyings.len())
        .map_err(|_| SealFileError::Invalid("too many recipients"))?;

    let metadata = Metadata {
        last_chunk_len: layout.last_chunk_len,
        name_len: u32::try_from(trailer.len())
            .map_err(|_| SealFileError::Invalid("file name too long"))?,
        dek: Dek::random()?,
    };

    let mut records = Vec::with_capacity(keyings.len());
    for keying in &keyings {
        let nonce = generate_nonce()?;
        let aad = header_aad(record_count, layout.body_len(), &keying.ephemeral_public);
        records.push(HeaderRecord {
            ephemeral_public: keying.ephemeral_public,
            salt: keying.salt,
            nonce,
            encrypted_header: encrypt_header(&metadata, &nonce, &keying.kek, &aad)?,
        });
    }
    drop(keyings);

    let seed = &records[records.len() - 1];
    let state = ChunkState::from_header(&seed.nonce, &seed.tag());

    let parent = parent_dir(&out_path);
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    write_header(&mut tmp, &records)?;
    encrypt_body(&mut infile, &mut tmp, &metadata.dek, state, &layout, trailer)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    drop(infile);

    let out = promote(tmp, &out_path, opts.force)?;
    if opts.overwrite_input {
        fs::remove_file(input)?;
    }
    tracing::info!(
        input = %input.display(),
        output = %out.display(),
        credential = credential.kind(),
        records = records.len(),
        chunks = layout.chunk_count,
        "encrypted file"
    );
    Ok(out)
}

/// Decrypt a container produced by [`encrypt_file`].
///
/// A container carrying an original file name is restored under that name
/// next to `input`, unless `output` is given.
///
/// # Errors
///
/// - `Format` / `UnsupportedVersion` for a file that is not a container of
///   this version.
/// - `Authentication` for a wrong credential, wrong chunk size or KDF
///   parameters, and for any modification of the container. These cases are
///   not distinguished.
/// - `InvalidKey` if a key exchange yields a low-order point.
pub fn decrypt_file(
    input: &Path,
    output: Option<&Path>,
    credential: &Credential,
    opts: &DecryptOptions,
) -> Result<PathBuf, SealFileError> {
    decrypt_file_with(input, output, credential, opts, None)
}

pub(crate) fn decrypt_file_with(
    input: &Path,
    output: Option<&Path>,
    credential: &Credential,
    opts: &DecryptOptions,
    shared: Option<&SharedKek>,
) -> Result<PathBuf, SealFileError> {
    validate_chunk_size(opts.chunk_size)?;

    let mut infile = File::open(input)?;
    let total_len = infile.metadata()?.len();
    let header = read_header(&mut infile, total_len)?;
    let body_len = total_len - header.encoded_len() as u64;
    let record_count = header.records.len() as u16;

    let metadata = open_any_record(&header.records, record_count, body_len, credential, opts, shared)?
        .ok_or(SealFileError::Authentication)?;

    // the header authenticated, so a layout mismatch means the chunk size is wrong
    let layout = BodyLayout::from_body(body_len, opts.chunk_size, metadata.last_chunk_len)
        .map_err(|_| SealFileError::Authentication)?;
    let name_len = u64::from(metadata.name_len);
    if name_len > layout.plaintext_len() {
        return Err(SealFileError::Authentication);
    }

    let planned_out = match output {
        Some(p) => Some(p.to_path_buf()),
        None if name_len == 0 => Some(default_decrypt_output_path(input)),
        None => None,
    };
    if let Some(p) = &planned_out {
        refuse_existing(p, opts.force)?;
    }

    let seed = header.final_record();
    let state = ChunkState::from_header(&seed.nonce, &seed.tag());

    let parent = match &planned_out {
        Some(p) => parent_dir(p).to_path_buf(),
        None => parent_dir(input).to_path_buf(),
    };
    fs::create_dir_all(&parent)?;
    let mut tmp = NamedTempFile::new_in(&parent)?;
    let plain_len = decrypt_body(&mut infile, tmp.as_file_mut(), &metadata.dek, state, &layout)?;
    drop(metadata);
    drop(infile);

    let out_path = if name_len > 0 {
        let raw = take_trailing_name(tmp.as_file_mut(), plain_len, name_len)?;
        match planned_out {
            // the stored name is never used as a path here
            Some(p) => p,
            None => {
                let p = parent.join(recovered_file_name(&raw)?);
                refuse_existing(&p, opts.force)?;
                p
            }
        }
    } else {
        planned_out.unwrap_or_else(|| default_decrypt_output_path(input))
    };
    tmp.as_file_mut().sync_all()?;

    let out = promote(tmp, &out_path, opts.force)?;
    if opts.overwrite_input {
        fs::remove_file(input)?;
    }
    tracing::info!(
        input = %input.display(),
        output = %out.display(),
        credential = credential.kind(),
        chunks = layout.chunk_count,
        "decrypted file"
    );
    Ok(out)
}

/// Try every header record; the first that authenticates yields the metadata.
///
/// Symmetric credentials always write exactly one record, so anything else
/// fails before the password hash runs.
fn open_any_record(
    records: &[HeaderRecord],
    record_count: u16,
    body_len: u64,
    credential: &Credential,
    opts: &DecryptOptions,
    shared: Option<&SharedKek>,
) -> Result<Option<Metadata>, SealFileError> {
    if credential.is_symmetric() && records.len() != 1 {
        tracing::debug!(records = records.len(), "symmetric credential needs a single record");
        return Ok(None);
    }
    for (index, record) in records.iter().enumerate() {
        let kek = decryption_kek(credential, record, &opts.kdf_params, shared)?;
        let aad = header_aad(record_count, body_len, &record.ephemeral_public);
        if let Some(metadata) = decrypt_header(&record.encrypted_header, &record.nonce, &kek, &aad) {
            tracing::debug!(record = index, "header record authenticated");
            return Ok(Some(metadata));
        }
    }
    tracing::debug!(records = records.len(), "no header record authenticated");
    Ok(None)
}

/// Split the original file name off the end of the decrypted plaintext.
fn take_trailing_name(
    file: &mut File,
    plain_len: u64,
    name_len: u64,
) -> Result<Zeroizing<Vec<u8>>, SealFileError> {
    let content_len = plain_len - name_len;
    let mut raw = Zeroizing::new(vec![0u8; name_len as usize]);
    file.seek(SeekFrom::Start(content_len))?;
    file.read_exact(&mut raw)?;
    file.set_len(content_len)?;
    Ok(raw)
}
