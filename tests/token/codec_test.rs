// Token Codec Tests
// Tests for handing tokens between devices as bytes, hex and base64

use offcash::clock::SystemClock;
use offcash::identity::Keypair;
use offcash::ledger::MemoryLedger;
use offcash::token::{CodecError, IssuerConfig, OwnerId, Token, TokenCodec, TokenIssuer};
use rust_decimal::Decimal;
use std::sync::Arc;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn issue_token(amount: &str) -> (Token, Keypair) {
    let keypair = Keypair::generate();
    let issuer = TokenIssuer::new(
        keypair.clone(),
        Arc::new(MemoryLedger::new()),
        Arc::new(SystemClock),
        IssuerConfig::default(),
    )
    .unwrap();
    let amount: Decimal = amount.parse().unwrap();
    let token = issuer
        .issue(&OwnerId::from("alice"), amount)
        .unwrap()
        .remove(0);
    (token, keypair)
}

// ============================================================================
// ENCODING
// ============================================================================

#[test]
fn test_binary_encoding_preserves_token() {
    let (token, issuer) = issue_token("42.75");
    let bytes = TokenCodec::encode(&token).unwrap();
    let decoded = TokenCodec::decode(&bytes).unwrap();

    assert_eq!(decoded, token);
    assert!(decoded.verify(&issuer.public_key()));
}

#[test]
fn test_text_encodings_preserve_token() {
    let (token, _) = issue_token("0.01");

    let hex = TokenCodec::encode_hex(&token).unwrap();
    assert_eq!(TokenCodec::decode_hex(&hex).unwrap(), token);

    let b64 = TokenCodec::encode_base64(&token).unwrap();
    assert!(!b64.contains('='));
    assert!(!b64.contains('+') && !b64.contains('/'));
    assert_eq!(TokenCodec::decode_base64(&b64).unwrap(), token);
}

#[test]
fn test_decode_tolerates_surrounding_whitespace() {
    let (token, _) = issue_token("5");
    let b64 = format!("  {}\n", TokenCodec::encode_base64(&token).unwrap());
    assert_eq!(TokenCodec::decode_base64(&b64).unwrap(), token);
}

// ============================================================================
// ERRORS
// ============================================================================

#[test]
fn test_invalid_hex() {
    assert!(matches!(
        TokenCodec::decode_hex("zz"),
        Err(CodecError::InvalidHex(_))
    ));
}

#[test]
fn test_invalid_base64() {
    assert!(matches!(
        TokenCodec::decode_base64("@@@"),
        Err(CodecError::InvalidBase64(_))
    ));
}

#[test]
fn test_truncated_bytes() {
    let (token, _) = issue_token("5");
    let bytes = TokenCodec::encode(&token).unwrap();
    assert!(matches!(
        TokenCodec::decode(&bytes[..bytes.len() / 2]),
        Err(CodecError::DecodeError(_))
    ));
}

/// Test: Flipping a bit in the encoded signature either fails decoding or
/// fails verification
#[test]
fn test_tampered_bytes_fail_verification() {
    let (token, issuer) = issue_token("5");
    let mut bytes = TokenCodec::encode(&token).unwrap();
    // flip a bit inside the signature, which sits after the claims
    let index = bytes.len() - 10;
    bytes[index] ^= 0x01;

    match TokenCodec::decode(&bytes) {
        Ok(decoded) => assert!(!decoded.verify(&issuer.public_key())),
        Err(_) => {}
    }
}
