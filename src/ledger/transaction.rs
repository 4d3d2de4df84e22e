use crate::identity::Signature;
use crate::token::{Amount, OwnerId, TokenId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Server-assigned transaction identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
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

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Purchase,
    Redemption,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Redemption => "redemption",
            TransactionType::Transfer => "transfer",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(TransactionType::Purchase),
            "redemption" => Ok(TransactionType::Redemption),
            "transfer" => Ok(TransactionType::Transfer),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

/// Transaction status. `Pending` moves to exactly one of the other two.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Completed)
                | (TransactionStatus::Pending, TransactionStatus::Failed)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionSource {
    Online,
    OfflineSync,
}

/// A persisted transaction record.
///
/// Across all `Completed` transactions the `token_ids` sets are disjoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Client-assigned id for offline submissions
    pub local_id: Option<String>,
    pub sender_id: OwnerId,
    /// Absent for issuer settlement
    pub receiver_id: Option<OwnerId>,
    pub amount: Amount,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    /// Consumed tokens, in submission order
    pub token_ids: Vec<TokenId>,
    pub sender_signature: Option<Signature>,
    pub receiver_signature: Option<Signature>,
    pub timestamp: DateTime<Utc>,
    pub source: TransactionSource,
    pub settlement_reference: Option<String>,
}

impl Transaction {
    /// A fresh `Pending` transaction with no signatures
    pub fn pending(
        sender_id: OwnerId,
        amount: Amount,
        tx_type: TransactionType,
        token_ids: Vec<TokenId>,
        source: TransactionSource,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            local_id: None,
            sender_id,
            receiver_id: None,
            amount,
            tx_type,
            status: TransactionStatus::Pending,
            token_ids,
            sender_signature: None,
            receiver_signature: None,
            timestamp,
            source,
            settlement_reference: None,
        }
    }

    pub fn consumes(&self, token_id: &TokenId) -> bool {
        self.token_ids.contains(token_id)
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }
}
