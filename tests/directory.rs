use std::fs;
use std::path::{Path, PathBuf};

use seal_file::format::read_header;
use seal_file::header::{decrypt_header, header_aad};
use seal_file::{
    Credential, DecryptOptions, DirectoryNames, EncryptOptions, KdfParams, KeepNames,
    MIN_MEMORY_COST_KIB, SALT_FILE, SealFileError, decrypt_directory, derive_kek,
    encrypt_directory, generate_key_pair,
};
use secrecy::SecretString;

fn fast() -> KdfParams {
    KdfParams {
        t_cost: 1,
        mem_kib: MIN_MEMORY_COST_KIB,
        parallelism: 1,
    }
}

fn enc_opts() -> EncryptOptions {
    EncryptOptions {
        chunk_size: 1024,
        kdf_params: fast(),
        overwrite_input: true,
        ..Default::default()
    }
}

fn password() -> Credential {
    Credential::Password(SecretString::from("directory password"))
}

fn tree() -> (tempfile::TempDir, Vec<(PathBuf, Vec<u8>)>) {
    let td = tempfile::tempdir().unwrap();
    fs::create_dir(td.path().join("nested")).unwrap();
    let files = vec![
        (td.path().join("a.txt"), b"alpha".to_vec()),
        (td.path().join("b.bin"), vec![3u8; 3000]),
        (td.path().join("nested/c.md"), b"# gamma".to_vec()),
    ];
    for (p, data) in &files {
        fs::write(p, data).unwrap();
    }
    (td, files)
}

fn sealed_path(p: &Path) -> PathBuf {
    let mut s = p.as_os_str().to_os_string();
    s.push(".enc");
    PathBuf::from(s)
}

#[test]
fn one_salt_for_the_whole_tree() {
    let (td, files) = tree();
    let report = encrypt_directory(td.path(), &password(), &enc_opts(), &KeepNames).unwrap();
    assert_eq!((report.successful, report.total), (3, 3));
    assert!(report.is_complete());

    let salt_path = td.path().join(SALT_FILE);
    let salt: [u8; 16] = fs::read(&salt_path).unwrap().try_into().unwrap();
    assert!(fs::metadata(&salt_path).unwrap().permissions().readonly());

    let salt_files = walk(td.path())
        .into_iter()
        .filter(|p| p.file_name().unwrap() == SALT_FILE)
        .count();
    assert_eq!(salt_files, 1);

    let kek = derive_kek(&password(), &salt, &fast()).unwrap();
    for (plain, _) in &files {
        assert!(!plain.exists());
        let sealed = sealed_path(plain);
        let mut f = fs::File::open(&sealed).unwrap();
        let len = f.metadata().unwrap().len();
        let header = read_header(&mut f, len).unwrap();
        let record = &header.records[0];
        assert_eq!(record.salt, salt);

        let body_len = len - header.encoded_len() as u64;
        let aad = header_aad(1, body_len, &record.ephemeral_public);
        assert!(decrypt_header(&record.encrypted_header, &record.nonce, &kek, &aad).is_some());
    }
}

#[test]
fn full_decrypt_restores_files_and_removes_salt() {
    let (td, files) = tree();
    encrypt_directory(td.path(), &password(), &enc_opts(), &KeepNames).unwrap();

    let dec = DecryptOptions {
        overwrite_input: true,
        ..DecryptOptions::from(&enc_opts())
    };
    let report = decrypt_directory(td.path(), &password(), &dec, &KeepNames).unwrap();
    assert_eq!((report.successful, report.total), (3, 3));
    assert!(!td.path().join(SALT_FILE).exists());

    for (plain, data) in &files {
        assert_eq!(&fs::read(plain).unwrap(), data);
        assert!(!sealed_path(plain).exists());
    }
}

#[test]
fn partial_failure_keeps_salt() {
    let (td, files) = tree();
    encrypt_directory(td.path(), &password(), &enc_opts(), &KeepNames).unwrap();

    let broken = sealed_path(&files[1].0);
    let mut bytes = fs::read(&broken).unwrap();
    let n = bytes.len();
    bytes[n - 20] ^= 0x04;
    fs::write(&broken, &bytes).unwrap();

    let dec = DecryptOptions::from(&enc_opts());
    let report = decrypt_directory(td.path(), &password(), &dec, &KeepNames).unwrap();
    assert_eq!((report.successful, report.total), (2, 3));
    assert!(!report.is_complete());
    assert!(td.path().join(SALT_FILE).exists());

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].input, broken);
    assert!(matches!(failures[0].result, Err(SealFileError::Authentication)));
    assert!(broken.exists());
    assert!(!files[1].0.exists());
}

#[cfg(unix)]
#[test]
fn unreadable_entry_fails_alone_during_encryption() {
    let (td, files) = tree();
    let dangling = td.path().join("nested/gone.txt");
    std::os::unix::fs::symlink(td.path().join("nowhere.txt"), &dangling).unwrap();

    let report = encrypt_directory(td.path(), &password(), &enc_opts(), &KeepNames).unwrap();
    assert_eq!((report.successful, report.total), (3, 4));

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].input, dangling);
    assert!(matches!(failures[0].result, Err(SealFileError::Io(_))));
    assert!(failures[0].result.as_ref().unwrap_err().is_file_access());

    // the rest of the tree is sealed; nothing partial for the failed entry
    let mut left = walk(td.path());
    left.sort();
    let mut expected: Vec<PathBuf> = files.iter().map(|(p, _)| sealed_path(p)).collect();
    expected.push(td.path().join(SALT_FILE));
    expected.push(dangling);
    expected.sort();
    assert_eq!(left, expected);
}

#[test]
fn missing_salt_file_fails_the_batch() {
    let (td, _) = tree();
    encrypt_directory(td.path(), &password(), &enc_opts(), &KeepNames).unwrap();
    let salt_path = td.path().join(SALT_FILE);
    let mut perms = fs::metadata(&salt_path).unwrap().permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(&salt_path, perms).unwrap();
    fs::remove_file(&salt_path).unwrap();

    let res = decrypt_directory(
        td.path(),
        &password(),
        &DecryptOptions::from(&enc_opts()),
        &KeepNames,
    );
    assert!(matches!(res, Err(SealFileError::Io(_))));
}

#[test]
fn existing_salt_is_reused_and_sealed_files_skipped() {
    let (td, _) = tree();
    let opts = EncryptOptions {
        overwrite_input: false,
        ..enc_opts()
    };
    encrypt_directory(td.path(), &password(), &opts, &KeepNames).unwrap();
    let salt = fs::read(td.path().join(SALT_FILE)).unwrap();

    fs::write(td.path().join("late.txt"), b"added later").unwrap();
    let opts = EncryptOptions {
        force: true,
        ..opts
    };
    let report = encrypt_directory(td.path(), &password(), &opts, &KeepNames).unwrap();
    // 3 originals (forced over their containers) + late.txt; .enc files are skipped
    assert_eq!(report.total, 4);
    assert!(report.outcomes.iter().all(|o| !o.input.to_string_lossy().ends_with(".enc")));
    assert_eq!(fs::read(td.path().join(SALT_FILE)).unwrap(), salt);
}

#[test]
fn key_pair_batches_need_no_salt() {
    let (td, files) = tree();
    let (me, _) = generate_key_pair().unwrap();
    let key_bytes = *me.to_secret_bytes().as_bytes();
    let report = encrypt_directory(td.path(), &Credential::PrivateKey(me), &enc_opts(), &KeepNames)
        .unwrap();
    assert!(report.is_complete());
    assert!(!td.path().join(SALT_FILE).exists());

    let me = seal_file::PrivateKey::from_bytes(&key_bytes);
    let report = decrypt_directory(
        td.path(),
        &Credential::PrivateKey(me),
        &DecryptOptions::from(&enc_opts()),
        &KeepNames,
    )
    .unwrap();
    assert_eq!((report.successful, report.total), (3, 3));
    for (plain, data) in &files {
        assert_eq!(&fs::read(plain).unwrap(), data);
    }
}

#[test]
fn not_a_directory() {
    let td = tempfile::tempdir().unwrap();
    let file = td.path().join("f");
    fs::write(&file, b"x").unwrap();
    let res = encrypt_directory(&file, &password(), &enc_opts(), &KeepNames);
    assert!(matches!(res, Err(SealFileError::Invalid(_))));
}

/// Renames `<dir>` to `<dir>.sealed` and back.
struct Suffix;

impl DirectoryNames for Suffix {
    fn obfuscate(&self, dir: &Path) -> Result<PathBuf, SealFileError> {
        let mut name = dir.as_os_str().to_os_string();
        name.push(".sealed");
        let to = PathBuf::from(name);
        fs::rename(dir, &to)?;
        Ok(to)
    }

    fn deobfuscate(&self, dir: &Path) -> Result<PathBuf, SealFileError> {
        let s = dir.to_string_lossy();
        let to = PathBuf::from(s.strip_suffix(".sealed").unwrap_or(&s));
        fs::rename(dir, &to)?;
        Ok(to)
    }
}

#[test]
fn directory_names_collaborator_runs_around_the_batch() {
    let outer = tempfile::tempdir().unwrap();
    let dir = outer.path().join("photos");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("one.jpg"), b"jpeg").unwrap();

    let report = encrypt_directory(&dir, &password(), &enc_opts(), &Suffix).unwrap();
    let renamed = outer.path().join("photos.sealed");
    assert_eq!(report.directory, renamed);
    assert!(!dir.exists());
    assert!(renamed.join("one.jpg.enc").exists());

    let report = decrypt_directory(
        &renamed,
        &password(),
        &DecryptOptions::from(&enc_opts()),
        &Suffix,
    )
    .unwrap();
    assert_eq!(report.directory, dir);
    assert_eq!(fs::read(dir.join("one.jpg")).unwrap(), b"jpeg");
}

fn walk(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let p = entry.unwrap().path();
        if p.is_dir() {
            out.extend(walk(&p));
        } else {
            out.push(p);
        }
    }
    out
}
