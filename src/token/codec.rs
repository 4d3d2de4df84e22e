use crate::token::Token;
use thiserror::Error;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to encode token: {0}")]
    EncodeError(String),

    #[error("Failed to decode token: {0}")]
    DecodeError(String),

    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    #[error("Invalid base64 string: {0}")]
    InvalidBase64(String),
}

/// Codec for handing tokens between devices.
///
/// The binary form is postcard; the text forms wrap it in hex or URL-safe
/// base64 for QR codes and copy/paste. Decoding does not verify anything,
/// run the token through the validator afterwards.
pub struct TokenCodec;

impl TokenCodec {
    /// Encode a token to compact binary bytes
    pub fn encode(token: &Token) -> Result<Vec<u8>, CodecError> {
        postcard::to_allocvec(token).map_err(|e| CodecError::EncodeError(e.to_string()))
    }

    /// Decode a token from binary bytes
    pub fn decode(bytes: &[u8]) -> Result<Token, CodecError> {
        postcard::from_bytes(bytes).map_err(|e| CodecError::DecodeError(e.to_string()))
    }

    /// Encode to hex string
    pub fn encode_hex(token: &Token) -> Result<String, CodecError> {
        Self::encode(token).map(hex::encode)
    }

    /// Decode from hex string
    pub fn decode_hex(hex_str: &str) -> Result<Token, CodecError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
        Self::decode(&bytes)
    }

    /// Encode to base64 string (URL-safe, no padding)
    pub fn encode_base64(token: &Token) -> Result<String, CodecError> {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        Self::encode(token).map(|bytes| URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Decode from base64 string
    pub fn decode_base64(b64_str: &str) -> Result<Token, CodecError> {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        let bytes = URL_SAFE_NO_PAD
            .decode(b64_str.trim())
            .map_err(|e| CodecError::InvalidBase64(e.to_string()))?;
        Self::decode(&bytes)
    }
}
