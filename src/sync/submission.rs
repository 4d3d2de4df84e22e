use crate::identity::{Keypair, PublicKey, Signature, Signer};
use crate::token::{OwnerId, TokenId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

/// Domain tag prefixed to every submission signing payload
const SUBMISSION_DOMAIN_TAG: &[u8] = b"offcash:submission:v1";

/// Sender's signature over a submission, with the key that made it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SenderSignature {
    pub public_key: PublicKey,
    pub signature: Signature,
}

/// A transaction as recorded by a client, possibly while offline.
///
/// Fields are kept loose (`amount` may be non-positive, `tx_type` is free
/// text) because the reconciler is what decides whether they are valid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionSubmission {
    /// Client-assigned id, echoed back in the outcome
    pub local_id: String,
    pub sender_id: OwnerId,
    pub receiver_id: Option<OwnerId>,
    pub amount: Decimal,
    pub tx_type: String,
    /// Tokens to consume, in the order the client chose them
    pub token_ids: Vec<TokenId>,
    pub sender_signature: Option<SenderSignature>,
    pub timestamp: DateTime<Utc>,
}

impl TransactionSubmission {
    pub fn new(
        local_id: impl Into<String>,
        sender_id: OwnerId,
        amount: Decimal,
        tx_type: impl Into<String>,
        token_ids: Vec<TokenId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            sender_id,
            receiver_id: None,
            amount,
            tx_type: tx_type.into(),
            token_ids,
            sender_signature: None,
            timestamp,
        }
    }

    pub fn with_receiver(mut self, receiver_id: OwnerId) -> Self {
        self.receiver_id = Some(receiver_id);
        self
    }

    /// Sign the submission with the sender's key
    pub fn signed_by(mut self, keypair: &Keypair) -> Self {
        let signature = Signer::sign(keypair, &self.digest());
        self.sender_signature = Some(SenderSignature {
            public_key: keypair.public_key(),
            signature,
        });
        self
    }

    /// Canonical bytes of everything except the signature.
    ///
    /// Strings are u32 LE length-prefixed, the optional receiver carries a
    /// presence byte, token ids are a u32 LE count followed by 16 bytes each.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(128 + self.token_ids.len() * 16);
        bytes.extend_from_slice(SUBMISSION_DOMAIN_TAG);

        put_str(&mut bytes, &self.local_id);
        put_str(&mut bytes, self.sender_id.as_str());
        match &self.receiver_id {
            Some(receiver) => {
                bytes.push(1);
                put_str(&mut bytes, receiver.as_str());
            }
            None => bytes.push(0),
        }
        put_str(&mut bytes, &self.amount.normalize().to_string());
        put_str(&mut bytes, &self.tx_type);

        bytes.extend_from_slice(&(self.token_ids.len() as u32).to_le_bytes());
        for id in &self.token_ids {
            bytes.extend_from_slice(id.as_bytes());
        }

        bytes.extend_from_slice(&self.timestamp.timestamp_millis().to_le_bytes());
        bytes
    }

    /// SHA-256 of the signing bytes; this is what the sender signs
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.signing_bytes()).into()
    }

    /// Whether the attached sender signature (if any) covers this submission
    pub fn verify_sender_signature(&self) -> Option<bool> {
        self.sender_signature
            .as_ref()
            .map(|s| Signer::verify(&s.public_key, &self.digest(), &s.signature))
    }
}

fn put_str(bytes: &mut Vec<u8>, s: &str) {
    bytes.extend_from_slice(&(s.len() as u32).to_le_bytes());
    bytes.extend_from_slice(s.as_bytes());
}
