//! On-disk container layout and constants.
//!
//! ```text
//! [8: magic "SEALFILE"][2: version LE][2: record count N LE]
//! N x [32: ephemeral public key slot][16: salt][24: nonce][56: encrypted header]
//! C x [chunk_size: ciphertext][16: tag]
//! ```
//!
//! Nothing variable-length sits in front of the chunk stream, so every field
//! lives at a fixed offset and can be read without buffering.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::crypto::{NONCE_LEN, SALT_LEN, TAG_LEN};
use crate::exchange::PUBLIC_KEY_LEN;
use crate::secret::KEY_LEN;
use crate::types::SealFileError;

pub const MAGIC: &[u8; 8] = b"SEALFILE";
pub const VERSION: u16 = 1;

/// Plaintext metadata inside each record: last-chunk length, name length, DEK.
pub const METADATA_LEN: usize = 4 + 4 + KEY_LEN;

/// Encrypted metadata block plus tag.
pub const ENCRYPTED_HEADER_LEN: usize = METADATA_LEN + TAG_LEN;

/// Bytes before the first header record.
pub const PREAMBLE_LEN: usize = MAGIC.len() + 2 + 2;

/// One header record.
pub const RECORD_LEN: usize = PUBLIC_KEY_LEN + SALT_LEN + NONCE_LEN + ENCRYPTED_HEADER_LEN;

/// Smallest valid header (one record).
pub const MIN_HEADER_LEN: usize = PREAMBLE_LEN + RECORD_LEN;

/// Upper bound on records, keeps a corrupted count from triggering huge reads.
pub const MAX_RECORDS: u16 = 1024;

/// One wrapped copy of the file's metadata, addressed to one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    pub ephemeral_public: [u8; PUBLIC_KEY_LEN],
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub encrypted_header: [u8; ENCRYPTED_HEADER_LEN],
}

impl HeaderRecord {
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        let mut at = 0;
        for field in [
            &self.ephemeral_public[..],
            &self.salt[..],
            &self.nonce[..],
            &self.encrypted_header[..],
        ] {
            out[at..at + field.len()].copy_from_slice(field);
            at += field.len();
        }
        out
    }

    pub fn decode(buf: &[u8; RECORD_LEN]) -> Self {
        let mut ephemeral_public = [0u8; PUBLIC_KEY_LEN];
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        let mut encrypted_header = [0u8; ENCRYPTED_HEADER_LEN];
        let mut at = 0;
        for field in [
            &mut ephemeral_public[..],
            &mut salt[..],
            &mut nonce[..],
            &mut encrypted_header[..],
        ] {
            let n = field.len();
            field.copy_from_slice(&buf[at..at + n]);
            at += n;
        }
        Self {
            ephemeral_public,
            salt,
            nonce,
            encrypted_header,
        }
    }

    /// The trailing Poly1305 tag of the encrypted header.
    pub fn tag(&self) -> [u8; TAG_LEN] {
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&self.encrypted_header[METADATA_LEN..]);
        tag
    }
}

/// Parsed container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u16,
    pub records: Vec<HeaderRecord>,
}

impl ContainerHeader {
    pub fn encoded_len(&self) -> usize {
        header_len(self.records.len())
    }

    /// The record whose nonce and tag seed the chunk chain.
    pub fn final_record(&self) -> &HeaderRecord {
        // read_header and write_header both refuse an empty record list
        &self.records[self.records.len() - 1]
    }
}

/// Total header length for `records` records.
pub fn header_len(records: usize) -> usize {
    PREAMBLE_LEN + records * RECORD_LEN
}

/// Fixed-position fields of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Magic,
    Version,
    RecordCount,
    EphemeralPublicKey(usize),
    Salt(usize),
    Nonce(usize),
    EncryptedHeader(usize),
}

impl Field {
    /// (offset, length) of the field.
    pub fn span(self) -> (usize, usize) {
        let record = |i: usize| PREAMBLE_LEN + i * RECORD_LEN;
        match self {
            Field::Magic => (0, MAGIC.len()),
            Field::Version => (MAGIC.len(), 2),
            Field::RecordCount => (MAGIC.len() + 2, 2),
            Field::EphemeralPublicKey(i) => (record(i), PUBLIC_KEY_LEN),
            Field::Salt(i) => (record(i) + PUBLIC_KEY_LEN, SALT_LEN),
            Field::Nonce(i) => (record(i) + PUBLIC_KEY_LEN + SALT_LEN, NONCE_LEN),
            Field::EncryptedHeader(i) => (
                record(i) + PUBLIC_KEY_LEN + SALT_LEN + NONCE_LEN,
                ENCRYPTED_HEADER_LEN,
            ),
        }
    }
}

/// Random-access read of one field.
///
/// Fails with `Format` if the input is shorter than the minimum header or than
/// the requested field.
pub fn read_field<R: Read + Seek>(input: &mut R, field: Field) -> Result<Vec<u8>, SealFileError> {
    let total = input.seek(SeekFrom::End(0))?;
    if total < MIN_HEADER_LEN as u64 {
        return Err(SealFileError::Format("file is shorter than the header"));
    }
    let (offset, len) = field.span();
    if (offset + len) as u64 > total {
        return Err(SealFileError::Format("field lies past the end of the file"));
    }
    input.seek(SeekFrom::Start(offset as u64))?;
    let mut out = vec![0u8; len];
    input.read_exact(&mut out)?;
    Ok(out)
}

/// Reject anything but an exact version match.
pub fn validate_version(file_version: u16, expected: u16) -> Result<(), SealFileError> {
    if file_version != expected {
        return Err(SealFileError::UnsupportedVersion(file_version));
    }
    Ok(())
}

/// Write magic, version, record count and every record, in order.
pub fn write_header<W: Write>(output: &mut W, records: &[HeaderRecord]) -> Result<(), SealFileError> {
    if records.is_empty() {
        return Err(SealFileError::Invalid("header needs at least one record"));
    }
    let count = u16::try_from(records.len())
        .ok()
        .filter(|c| *c <= MAX_RECORDS)
        .ok_or(SealFileError::Invalid("too many header records"))?;
    output.write_all(MAGIC)?;
    output.write_all(&VERSION.to_le_bytes())?;
    output.write_all(&count.to_le_bytes())?;
    for record in records {
        output.write_all(&record.encode())?;
    }
    Ok(())
}

/// Parse the header from the start of `input`, leaving it positioned at the chunk stream.
///
/// `total_len` is the full container length, used to reject a record count
/// that would run past the end of the file.
pub fn read_header<R: Read>(input: &mut R, total_len: u64) -> Result<ContainerHeader, SealFileError> {
    if total_len < MIN_HEADER_LEN as u64 {
        return Err(SealFileError::Format("file is shorter than the header"));
    }
    let mut preamble = [0u8; PREAMBLE_LEN];
    input.read_exact(&mut preamble)?;
    if &preamble[..MAGIC.len()] != MAGIC {
        return Err(SealFileError::Format("bad magic bytes"));
    }
    let version = u16::from_le_bytes([preamble[8], preamble[9]]);
    validate_version(version, VERSION)?;

    let count = u16::from_le_bytes([preamble[10], preamble[11]]);
    if count == 0 || count > MAX_RECORDS {
        return Err(SealFileError::Format("bad header record count"));
    }
    if header_len(count as usize) as u64 > total_len {
        return Err(SealFileError::Format("file is shorter than the header"));
    }

    let mut records = Vec::with_capacity(count as usize);
    let mut buf = [0u8; RECORD_LEN];
    for _ in 0..count {
        input.read_exact(&mut buf)?;
        records.push(HeaderRecord::decode(&buf));
    }
    Ok(ContainerHeader { version, records })
}
