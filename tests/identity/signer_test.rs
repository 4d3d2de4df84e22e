// Signer Tests
// Tests for issuer keys and signatures over canonical payloads

use offcash::identity::{Keypair, KeypairError, PublicKey, Signature, Signer, SIGNATURE_LEN};

// ============================================================================
// KEYPAIR
// ============================================================================

#[test]
fn test_keypairs_are_unique() {
    let a = Keypair::generate();
    let b = Keypair::generate();
    assert_ne!(a.public_key(), b.public_key());
}

#[test]
fn test_keypair_restores_from_secret_bytes() {
    let keypair = Keypair::generate();
    let restored = Keypair::from_bytes(&keypair.to_bytes()).unwrap();

    let signature = Signer::sign(&restored, b"payload");
    assert!(Signer::verify(&keypair.public_key(), b"payload", &signature));
}

#[test]
fn test_keypair_rejects_wrong_length() {
    let result = Keypair::from_bytes(&[0u8; 16]);
    assert!(matches!(
        result,
        Err(KeypairError::InvalidLength {
            expected: 32,
            got: 16
        })
    ));
}

/// Test: Debug output never prints secret key bytes
#[test]
fn test_keypair_debug_hides_secret() {
    let keypair = Keypair::generate();
    let debug = format!("{:?}", keypair);
    assert!(!debug.contains(&hex::encode(keypair.to_bytes())));
    assert!(debug.contains(&keypair.public_key().to_hex()));
}

#[test]
fn test_public_key_hex_roundtrip() {
    let pk = Keypair::generate().public_key();
    let parsed = PublicKey::from_hex(&pk.to_hex()).unwrap();
    assert_eq!(pk, parsed);
    assert!(PublicKey::from_hex("not hex").is_err());
}

// ============================================================================
// SIGN / VERIFY
// ============================================================================

#[test]
fn test_sign_and_verify() {
    let keypair = Keypair::generate();
    let signature = Signer::sign(&keypair, b"offline cash");

    assert_eq!(signature.as_bytes().len(), SIGNATURE_LEN);
    assert!(Signer::verify(&keypair.public_key(), b"offline cash", &signature));
}

#[test]
fn test_verify_rejects_altered_payload() {
    let keypair = Keypair::generate();
    let signature = Signer::sign(&keypair, b"amount=100");

    assert!(!Signer::verify(&keypair.public_key(), b"amount=900", &signature));
}

#[test]
fn test_verify_rejects_other_key() {
    let keypair = Keypair::generate();
    let other = Keypair::generate();
    let signature = Signer::sign(&keypair, b"payload");

    assert!(!Signer::verify(&other.public_key(), b"payload", &signature));
}

/// Test: Ed25519 signs the same payload to the same bytes
#[test]
fn test_signature_is_deterministic() {
    let keypair = Keypair::generate();
    let a = Signer::sign(&keypair, b"payload");
    let b = Signer::sign(&keypair, b"payload");
    assert_eq!(a, b);
}

#[test]
fn test_signature_hex_roundtrip() {
    let keypair = Keypair::generate();
    let signature = Signer::sign(&keypair, b"payload");

    let parsed = Signature::from_hex(&signature.to_hex()).unwrap();
    assert_eq!(signature, parsed);
    assert!(Signature::from_bytes(&[0u8; 10]).is_err());
}
