//! Key ring persistence, hierarchy, and lifecycle scenarios.

use std::sync::Arc;

use keyvault::authenticator::Op;
use keyvault::error::CryptoError;
use keyvault::keyring::KeyRing;
use keyvault::keys::{AsymmetricKey, KeyKind, Params, SymmetricKey};
use keyvault::suite::{CipherSuite, DigestAlgorithm};
use keyvault::utils;

const SUITE: &str = "ECDHE_ECDSA_AES-256-GCM_SHA2-512";

fn populated_ring() -> KeyRing {
    let suite: CipherSuite = SUITE.parse().unwrap();
    let mut ring = KeyRing::new(suite, None, "root", "integration ring").unwrap();
    ring.add_cipher_active_key(Arc::new(SymmetricKey::from_random(32, "k1", "").unwrap()))
        .unwrap();
    let retired = Arc::new(SymmetricKey::from_random(32, "k2", "").unwrap());
    ring.add_cipher_active_key(retired.clone()).unwrap();
    ring.retire_active_cipher_key(retired.id(), false);
    ring.add_key_exchange_params(Arc::new(Params::new(KeyKind::X25519, None, "kxp", "").unwrap()))
        .unwrap();
    ring.add_key_exchange_key(Arc::new(
        AsymmetricKey::generate(KeyKind::X25519, "kxk", "").unwrap(),
    ))
    .unwrap();
    ring.add_authenticator_key(Arc::new(
        AsymmetricKey::generate(KeyKind::Ec, "authk", "").unwrap(),
    ))
    .unwrap();
    ring.add_mac_key(Arc::new(
        AsymmetricKey::generate_mac_key(KeyKind::Hmac, 32, "mack", "").unwrap(),
    ))
    .unwrap();

    let suite: CipherSuite = SUITE.parse().unwrap();
    let mut child = KeyRing::new(suite, None, "child", "").unwrap();
    child
        .add_cipher_active_key(Arc::new(SymmetricKey::from_random(32, "ck", "").unwrap()))
        .unwrap();
    ring.add_subring(child).unwrap();
    ring
}

#[test]
fn test_serialize_round_trip_preserves_everything() {
    let ring = populated_ring();
    let mut wire = Vec::new();
    ring.encode(&mut wire);

    let mut reader = wire.as_slice();
    let decoded = KeyRing::decode(&mut reader).unwrap();
    assert!(reader.is_empty());
    assert_eq!(decoded, ring);
}

#[test]
fn test_scenario_c_password_wrapped_save_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r.kr");

    let ring = populated_ring();
    let master_id = ring.master_cipher_key().id().clone();

    // Wrap key derived from a password: SHA-512, one iteration.
    let suite: CipherSuite = SUITE.parse().unwrap();
    let wrap_key = Arc::new(
        SymmetricKey::from_secret_and_salt(
            32,
            b"correcthorse",
            None,
            DigestAlgorithm::Sha512,
            1,
            "wrap",
            "",
        )
        .unwrap(),
    );
    let wrap_cipher = suite.get_cipher(wrap_key).unwrap();

    ring.save(&path, Some(&wrap_cipher), b"").unwrap();
    let mut reloaded = KeyRing::load(&path, Some(&wrap_cipher), b"").unwrap();

    assert_eq!(reloaded.master_cipher_key().id(), &master_id);
    assert_eq!(reloaded, ring);

    // The reloaded master still encrypts and decrypts.
    let cipher = reloaded.get_cipher(&master_id, false).unwrap().unwrap();
    let plaintext = utils::random_bytes(256);
    let envelope = cipher.encrypt(&plaintext, b"").unwrap();
    assert_eq!(cipher.decrypt(&envelope, b"").unwrap(), plaintext);
}

#[test]
fn test_load_with_wrong_wrap_key_fails_auth() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r.kr");

    let suite: CipherSuite = SUITE.parse().unwrap();
    let ring = populated_ring();

    let right = Arc::new(
        SymmetricKey::from_secret_and_salt(
            32,
            b"correcthorse",
            None,
            DigestAlgorithm::Sha512,
            1,
            "",
            "",
        )
        .unwrap(),
    );
    let wrong = Arc::new(
        SymmetricKey::from_secret_and_salt(
            32,
            b"batterystaple",
            None,
            DigestAlgorithm::Sha512,
            1,
            "",
            "",
        )
        .unwrap(),
    );

    ring.save(&path, Some(&suite.get_cipher(right).unwrap()), b"")
        .unwrap();
    let result = KeyRing::load(&path, Some(&suite.get_cipher(wrong).unwrap()), b"");
    assert!(matches!(result, Err(CryptoError::AuthFailed)));
}

#[test]
fn test_save_load_with_associated_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r.kr");

    let suite: CipherSuite = SUITE.parse().unwrap();
    let ring = populated_ring();
    let wrap = Arc::new(SymmetricKey::from_random(32, "", "").unwrap());
    let cipher = suite.get_cipher(wrap).unwrap();

    ring.save(&path, Some(&cipher), b"ring-v1").unwrap();
    assert!(KeyRing::load(&path, Some(&cipher), b"ring-v1").is_ok());
    assert!(matches!(
        KeyRing::load(&path, Some(&cipher), b"ring-v2"),
        Err(CryptoError::AuthFailed)
    ));
}

#[test]
fn test_plaintext_save_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r.kr");
    let ring = populated_ring();
    ring.save(&path, None, b"").unwrap();
    assert_eq!(KeyRing::load(&path, None, b"").unwrap(), ring);
}

#[test]
fn test_corrupt_ring_file_leaves_no_partial_ring() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r.kr");
    let ring = populated_ring();
    ring.save(&path, None, b"").unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes.truncate(bytes.len() / 2);
    std::fs::write(&path, bytes).unwrap();

    assert!(matches!(
        KeyRing::load(&path, None, b""),
        Err(CryptoError::SerializationFailure { .. })
    ));
}

#[test]
fn test_scenario_d_recursive_lookup_only_when_asked() {
    let suite: CipherSuite = SUITE.parse().unwrap();
    let mut root = KeyRing::new(suite, None, "root", "").unwrap();
    let suite: CipherSuite = SUITE.parse().unwrap();
    let a = KeyRing::new(suite, None, "a", "").unwrap();
    let suite: CipherSuite = SUITE.parse().unwrap();
    let mut b = KeyRing::new(suite, None, "b", "").unwrap();

    let key = Arc::new(SymmetricKey::from_random(32, "buried", "").unwrap());
    b.add_cipher_active_key(key.clone()).unwrap();

    root.add_subring(a).unwrap();
    root.add_subring(b).unwrap();

    assert!(root.get_cipher_key(key.id(), true).is_some());
    assert!(root.get_cipher_key(key.id(), false).is_none());
    assert!(root.get_cipher(key.id(), false).unwrap().is_none());
    assert!(root.get_cipher(key.id(), true).unwrap().is_some());
}

#[test]
fn test_scenario_e_duplicate_insert() {
    let suite: CipherSuite = SUITE.parse().unwrap();
    let mut ring = KeyRing::new(suite, None, "", "").unwrap();
    let key = Arc::new(SymmetricKey::from_random(32, "", "").unwrap());
    assert!(ring.add_cipher_active_key(key.clone()).unwrap());
    assert!(!ring.add_cipher_active_key(key).unwrap());
}

#[test]
fn test_cache_coherence_after_drop() {
    let suite: CipherSuite = SUITE.parse().unwrap();
    let mut ring = KeyRing::new(suite, None, "", "").unwrap();

    let cipher_key = Arc::new(SymmetricKey::from_random(32, "", "").unwrap());
    let mac_key = Arc::new(AsymmetricKey::generate_mac_key(KeyKind::Cmac, 16, "", "").unwrap());
    let auth_key = Arc::new(AsymmetricKey::generate(KeyKind::Ec, "", "").unwrap());
    ring.add_cipher_active_key(cipher_key.clone()).unwrap();
    ring.add_mac_key(mac_key.clone()).unwrap();
    ring.add_authenticator_key(auth_key.clone()).unwrap();

    assert!(ring.get_cipher(cipher_key.id(), false).unwrap().is_some());
    assert!(ring.get_mac(mac_key.id(), false).unwrap().is_some());
    assert!(ring
        .get_authenticator(Op::Sign, auth_key.id(), false)
        .unwrap()
        .is_some());

    assert!(ring.drop_active_cipher_key(cipher_key.id(), false));
    assert!(ring.drop_mac_key(mac_key.id(), false));
    assert!(ring.drop_authenticator_key(auth_key.id(), false));

    assert!(ring.get_cipher(cipher_key.id(), false).unwrap().is_none());
    assert!(ring.get_mac(mac_key.id(), false).unwrap().is_none());
    assert!(ring
        .get_authenticator(Op::Verify, auth_key.id(), false)
        .unwrap()
        .is_none());
}

#[test]
fn test_session_keys_from_ring_key_exchange() {
    // Two peers with each other's ring: derive matching session keys and
    // install them as active cipher keys.
    let suite: CipherSuite = "ECDHE_ED25519_AES-256-GCM_SHA2-256".parse().unwrap();
    let mut alice = KeyRing::new(suite, None, "alice", "").unwrap();
    let mut bob = KeyRing::new(suite, None, "bob", "").unwrap();

    let alice_kx = Arc::new(AsymmetricKey::generate(KeyKind::X25519, "", "").unwrap());
    let bob_kx = Arc::new(AsymmetricKey::generate(KeyKind::X25519, "", "").unwrap());
    alice.add_key_exchange_key(alice_kx.clone()).unwrap();
    bob.add_key_exchange_key(bob_kx.clone()).unwrap();

    let alice_exchange = alice.get_key_exchange(alice_kx.id(), false).unwrap().unwrap();
    let bob_exchange = bob.get_key_exchange(bob_kx.id(), false).unwrap().unwrap();

    let session_a = alice_exchange
        .derive_shared_symmetric_key(
            &bob_kx.public_key("", "").unwrap(),
            32,
            b"",
            b"session",
        )
        .unwrap();
    let session_b = bob_exchange
        .derive_shared_symmetric_key(
            &alice_kx.public_key("", "").unwrap(),
            32,
            b"",
            b"session",
        )
        .unwrap();
    assert_eq!(session_a.as_bytes(), session_b.as_bytes());

    let session_a = Arc::new(session_a);
    let session_b = Arc::new(session_b);
    alice.add_cipher_active_key(session_a.clone()).unwrap();
    bob.add_cipher_active_key(session_b.clone()).unwrap();

    let to_bob = alice
        .get_cipher(session_a.id(), false)
        .unwrap()
        .unwrap()
        .encrypt_and_frame(b"hello bob", b"")
        .unwrap();

    let mut reader = to_bob.as_slice();
    let frame = keyvault::FrameHeader::decode(&mut reader).unwrap();
    let cipher = bob.get_cipher(&frame.key_id, true).unwrap().unwrap();
    assert_eq!(cipher.decrypt(reader, b"").unwrap(), b"hello bob");
}
