use std::fs;

use proptest::prelude::*;
use seal_file::{
    Credential, DecryptOptions, EncryptOptions, decrypt_file, encrypt_file, keyfile_digest,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn any_plaintext_roundtrips(
        data in proptest::collection::vec(any::<u8>(), 0..5000),
        chunk_size in 1024usize..3000,
        key in proptest::array::uniform32(any::<u8>()),
        obfuscate in any::<bool>(),
    ) {
        let td = tempfile::tempdir().unwrap();
        let input = td.path().join("input.bin");
        fs::write(&input, &data).unwrap();

        let mut keyfile = key.to_vec();
        keyfile.extend_from_slice(&key);
        let cred = || Credential::Keyfile(keyfile_digest(&keyfile).unwrap());

        let opts = EncryptOptions {
            chunk_size,
            obfuscate_names: obfuscate,
            overwrite_input: true,
            ..Default::default()
        };
        let sealed = encrypt_file(&input, None, &cred(), &opts).unwrap();
        let expected_chunks = ((data.len() + if obfuscate { 9 } else { 0 }) as u64)
            .div_ceil(chunk_size as u64)
            .max(1);
        let sealed_len = fs::metadata(&sealed).unwrap().len();
        prop_assert_eq!(sealed_len, 140 + expected_chunks * (chunk_size as u64 + 16));

        let out = decrypt_file(&sealed, None, &cred(), &DecryptOptions::from(&opts)).unwrap();
        prop_assert_eq!(&out, &input);
        prop_assert_eq!(fs::read(&out).unwrap(), data);
    }
}
