use std::fs;

use seal_file::{
    Credential, EncryptOptions, KdfParams, MAX_PARALLELISM, MIN_MEMORY_COST_KIB, SALT_LEN,
    SealFileError, derive_from_keyfile, derive_from_password, derive_kek, encrypt_file,
    keyfile_digest, read_keyfile,
};
use secrecy::SecretString;

fn ok_params() -> KdfParams {
    KdfParams {
        t_cost: 1,
        mem_kib: MIN_MEMORY_COST_KIB,
        parallelism: 1,
    }
}

fn expect_kdf_error(params: KdfParams, needle: &str) {
    let pw = SecretString::from("pw");
    match derive_from_password(&pw, &[0u8; SALT_LEN], &params) {
        Err(SealFileError::KeyDerivation(msg)) => {
            assert!(msg.starts_with("kdf:"), "{msg}");
            assert!(msg.contains(needle), "{msg}");
        }
        other => panic!("expected KeyDerivation, got {other:?}"),
    }
}

#[test]
fn rejects_out_of_range_parameters() {
    expect_kdf_error(
        KdfParams {
            mem_kib: MIN_MEMORY_COST_KIB - 1,
            ..ok_params()
        },
        "memory cost",
    );
    expect_kdf_error(
        KdfParams {
            t_cost: 0,
            ..ok_params()
        },
        "time cost",
    );
    expect_kdf_error(
        KdfParams {
            parallelism: 0,
            ..ok_params()
        },
        "parallelism",
    );
    expect_kdf_error(
        KdfParams {
            parallelism: MAX_PARALLELISM + 1,
            ..ok_params()
        },
        "parallelism",
    );
}

#[test]
fn bad_parameters_leave_no_output() {
    let td = tempfile::tempdir().unwrap();
    let input = td.path().join("in.txt");
    fs::write(&input, b"data").unwrap();
    let opts = EncryptOptions::default().with_kdf_params(KdfParams {
        mem_kib: 1024,
        ..ok_params()
    });
    let res = encrypt_file(&input, None, &Credential::Password("pw".into()), &opts);
    assert!(matches!(res, Err(SealFileError::KeyDerivation(_))));
    assert!(!td.path().join("in.txt.enc").exists());
}

#[test]
fn salt_changes_the_key() {
    let pw = SecretString::from("pw");
    let a = derive_from_password(&pw, &[1u8; SALT_LEN], &ok_params()).unwrap();
    let b = derive_from_password(&pw, &[2u8; SALT_LEN], &ok_params()).unwrap();
    assert_ne!(a.as_bytes(), b.as_bytes());

    let cred = Credential::Password(pw);
    let again = derive_kek(&cred, &[1u8; SALT_LEN], &ok_params()).unwrap();
    assert_eq!(a.as_bytes(), again.as_bytes());
}

#[test]
fn keyfile_uses_only_its_prefix() {
    let td = tempfile::tempdir().unwrap();
    let short = td.path().join("short.key");
    let long = td.path().join("long.key");
    let mut contents = vec![0xC3u8; 64];
    fs::write(&short, &contents).unwrap();
    contents.extend_from_slice(&[0x11; 4096]);
    fs::write(&long, &contents).unwrap();

    let a = read_keyfile(&short).unwrap();
    let b = read_keyfile(&long).unwrap();
    assert_eq!(a.as_bytes(), b.as_bytes());

    let salt = [5u8; SALT_LEN];
    assert_eq!(
        derive_from_keyfile(&a, &salt).as_bytes(),
        derive_from_keyfile(&b, &salt).as_bytes()
    );
}

#[test]
fn short_keyfile_is_key_format_error() {
    assert!(matches!(
        keyfile_digest(&[1u8; 63]),
        Err(SealFileError::KeyFormat(_))
    ));

    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("tiny.key");
    fs::write(&path, b"too short").unwrap();
    assert!(matches!(read_keyfile(&path), Err(SealFileError::KeyFormat(_))));
}
