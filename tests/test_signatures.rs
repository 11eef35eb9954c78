//! File signing scenarios, including the `.sig` companion-file format.

use std::sync::Arc;

use keyvault::authenticator::{read_signature_file, write_signature_file, Authenticator, Op};
use keyvault::keys::{AsymmetricKey, KeyKind};
use keyvault::suite::DigestAlgorithm;

#[test]
fn test_scenario_f_ed25519_file_signature() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ten-bytes");
    std::fs::write(&path, b"0123456789").unwrap();

    let key = Arc::new(AsymmetricKey::generate(KeyKind::Ed25519, "signer", "").unwrap());
    let signer = Authenticator::new(Op::Sign, key.clone(), DigestAlgorithm::Sha512).unwrap();
    let verifier = Authenticator::new(Op::Verify, key, DigestAlgorithm::Sha512).unwrap();

    let signature = signer.sign_file(&path).unwrap();
    assert!(verifier.verify_file_signature(&path, &signature).unwrap());

    // Flip the last byte of the file; verification must now fail.
    let mut contents = std::fs::read(&path).unwrap();
    *contents.last_mut().unwrap() ^= 0x01;
    std::fs::write(&path, contents).unwrap();
    assert!(!verifier.verify_file_signature(&path, &signature).unwrap());
}

#[test]
fn test_signature_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("release.tar");
    std::fs::write(&path, vec![0xc3u8; 50_000]).unwrap();

    let key = Arc::new(AsymmetricKey::generate(KeyKind::Ec, "", "").unwrap());
    let signer = Authenticator::new(Op::Sign, key.clone(), DigestAlgorithm::Sha256).unwrap();
    let verifier = Authenticator::new(Op::Verify, key, DigestAlgorithm::Sha256).unwrap();

    let signature = signer.sign_file(&path).unwrap();
    let sig_path = write_signature_file(&path, &signature).unwrap();
    assert_eq!(sig_path.file_name().unwrap(), "release.tar.sig");

    // Base64, wrapped at 64 columns, trailing newline.
    let text = std::fs::read_to_string(&sig_path).unwrap();
    assert!(text.ends_with('\n'));
    assert!(text.lines().all(|line| line.len() <= 64 && !line.is_empty()));

    let recovered = read_signature_file(&sig_path).unwrap();
    assert_eq!(recovered, signature);
    assert!(verifier.verify_file_signature(&path, &recovered).unwrap());
}

#[test]
fn test_cross_key_verification_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc");
    std::fs::write(&path, b"document body").unwrap();

    for kind in [KeyKind::Ed25519, KeyKind::Ec] {
        let signer_key = Arc::new(AsymmetricKey::generate(kind, "", "").unwrap());
        let other_key = Arc::new(AsymmetricKey::generate(kind, "", "").unwrap());
        let signer =
            Authenticator::new(Op::Sign, signer_key, DigestAlgorithm::Sha256).unwrap();
        let wrong_verifier =
            Authenticator::new(Op::Verify, other_key, DigestAlgorithm::Sha256).unwrap();

        let signature = signer.sign_file(&path).unwrap();
        assert!(!wrong_verifier
            .verify_file_signature(&path, &signature)
            .unwrap());
    }
}
