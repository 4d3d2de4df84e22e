use crate::identity::{PublicKey, Signature, Signer};
use crate::token::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Domain tag prefixed to every token signing payload
const TOKEN_DOMAIN_TAG: &[u8] = b"offcash:token:v1";

/// Unique identifier for a token
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId(Uuid);

impl TokenId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifier of a token holder. Opaque to the core.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Lifecycle status of a token.
///
/// `Active` is the only non-terminal state. The reachable sequences are
/// `active -> spent`, `active -> expired` and `active -> spent -> redeemed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenStatus {
    Active,
    Spent,
    Expired,
    Redeemed,
}

impl TokenStatus {
    /// Whether the lifecycle permits moving from `self` to `next`
    pub fn can_transition_to(self, next: TokenStatus) -> bool {
        matches!(
            (self, next),
            (TokenStatus::Active, TokenStatus::Spent)
                | (TokenStatus::Active, TokenStatus::Expired)
                | (TokenStatus::Spent, TokenStatus::Redeemed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Active => "active",
            TokenStatus::Spent => "spent",
            TokenStatus::Expired => "expired",
            TokenStatus::Redeemed => "redeemed",
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The signed part of a token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub id: TokenId,
    pub owner_id: OwnerId,
    pub amount: Amount,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenClaims {
    /// Canonical bytes covered by the issuer signature.
    ///
    /// Layout: domain tag, id (16 bytes), owner (u32 LE length + UTF-8),
    /// amount (u32 LE length + canonical decimal), issued_at and expires_at
    /// (i64 LE milliseconds). Every field is fixed-width or length-prefixed.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(96);
        bytes.extend_from_slice(TOKEN_DOMAIN_TAG);

        bytes.extend_from_slice(self.id.as_bytes());

        let owner = self.owner_id.as_str().as_bytes();
        bytes.extend_from_slice(&(owner.len() as u32).to_le_bytes());
        bytes.extend_from_slice(owner);

        let amount = self.amount.canonical();
        bytes.extend_from_slice(&(amount.len() as u32).to_le_bytes());
        bytes.extend_from_slice(amount.as_bytes());

        bytes.extend_from_slice(&self.issued_at.timestamp_millis().to_le_bytes());
        bytes.extend_from_slice(&self.expires_at.timestamp_millis().to_le_bytes());

        bytes
    }

    /// Lazy expiry: a token is expired once `now > expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A signed, amount-bearing bearer token.
///
/// The `status` carried here is a snapshot; the ledger record is the source
/// of truth and is what validation reads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Token {
    claims: TokenClaims,
    issuer_public_key: PublicKey,
    signature: Signature,
    status: TokenStatus,
    parent_token_id: Option<TokenId>,
}

impl Token {
    /// Assemble a token from its parts. Nothing is verified here.
    pub fn from_parts(
        claims: TokenClaims,
        issuer_public_key: PublicKey,
        signature: Signature,
        status: TokenStatus,
        parent_token_id: Option<TokenId>,
    ) -> Self {
        Self {
            claims,
            issuer_public_key,
            signature,
            status,
            parent_token_id,
        }
    }

    pub fn id(&self) -> TokenId {
        self.claims.id
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.claims.owner_id
    }

    pub fn amount(&self) -> Amount {
        self.claims.amount
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.claims.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.claims.expires_at
    }

    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    pub fn issuer_public_key(&self) -> &PublicKey {
        &self.issuer_public_key
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn status(&self) -> TokenStatus {
        self.status
    }

    pub fn parent_token_id(&self) -> Option<TokenId> {
        self.parent_token_id
    }

    /// Copy of this record with a different status. Used by ledgers when
    /// applying a conditional update.
    pub fn with_status(&self, status: TokenStatus) -> Self {
        let mut next = self.clone();
        next.status = status;
        next
    }

    /// Verify the signature against the given issuer key
    pub fn verify(&self, issuer_key: &PublicKey) -> bool {
        Signer::verify(issuer_key, &self.claims.signing_bytes(), &self.signature)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.claims.is_expired_at(now)
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.claims == other.claims
            && self.signature == other.signature
            && self.status == other.status
            && self.parent_token_id == other.parent_token_id
    }
}

impl Eq for Token {}
