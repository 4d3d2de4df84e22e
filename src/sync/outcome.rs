use crate::ledger::TransactionId;
use crate::token::{Token, TokenId, TokenStatus};
use rust_decimal::Decimal;
use std::fmt;

/// Per-submission verdict
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    Accepted,
    Rejected,
    Conflict,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncStatus::Accepted => "accepted",
            SyncStatus::Rejected => "rejected",
            SyncStatus::Conflict => "conflict",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConflictType {
    DoubleSpend,
    InvalidSignature,
    ExpiredToken,
    InsufficientBalance,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::DoubleSpend => "double_spend",
            ConflictType::InvalidSignature => "invalid_signature",
            ConflictType::ExpiredToken => "expired_token",
            ConflictType::InsufficientBalance => "insufficient_balance",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a conflict was settled. The reconciler always applies `ServerWins`:
/// the already-committed transaction stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConflictResolution {
    ServerWins,
    ClientWins,
    ManualReview,
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictResolution::ServerWins => "server_wins",
            ConflictResolution::ClientWins => "client_wins",
            ConflictResolution::ManualReview => "manual_review",
        })
    }
}

/// Details returned with a `conflict` outcome so the client can reconcile
/// its local state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictRecord {
    pub local_id: String,
    pub conflict_type: ConflictType,
    pub resolution: ConflictResolution,
    /// The committed transaction that won, when one exists
    pub conflicting_transaction_ref: Option<TransactionId>,
    /// The contested token
    pub token_id: TokenId,
}

/// Why a submission was rejected
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Missing or malformed fields; nothing was looked up
    Structural(String),
    InvalidSenderSignature,
    TokenNotFound(TokenId),
    InvalidTokenSignature(TokenId),
    NotOwned(TokenId),
    NotActive { token_id: TokenId, status: TokenStatus },
    ExpiredToken(TokenId),
    InsufficientBalance { required: Decimal, available: Decimal },
    /// More value than needed and no single token can be divided to cover
    /// the excess
    SuperfluousTokens { excess: Decimal },
}

impl RejectReason {
    /// The conflict category this rejection falls under, if any
    pub fn conflict_type(&self) -> Option<ConflictType> {
        match self {
            RejectReason::InvalidSenderSignature | RejectReason::InvalidTokenSignature(_) => {
                Some(ConflictType::InvalidSignature)
            }
            RejectReason::ExpiredToken(_) => Some(ConflictType::ExpiredToken),
            RejectReason::InsufficientBalance { .. } => Some(ConflictType::InsufficientBalance),
            _ => None,
        }
    }

    /// Short machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::Structural(_) => "invalid_submission",
            RejectReason::InvalidSenderSignature => "invalid_signature",
            RejectReason::TokenNotFound(_) => "token_not_found",
            RejectReason::InvalidTokenSignature(_) => "invalid_signature",
            RejectReason::NotOwned(_) => "not_owned",
            RejectReason::NotActive { .. } => "not_active",
            RejectReason::ExpiredToken(_) => "expired_token",
            RejectReason::InsufficientBalance { .. } => "insufficient_balance",
            RejectReason::SuperfluousTokens { .. } => "superfluous_tokens",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Structural(msg) => write!(f, "invalid submission: {}", msg),
            RejectReason::InvalidSenderSignature => f.write_str("sender signature does not verify"),
            RejectReason::TokenNotFound(id) => write!(f, "token {} not found", id),
            RejectReason::InvalidTokenSignature(id) => {
                write!(f, "token {} has an invalid issuer signature", id)
            }
            RejectReason::NotOwned(id) => write!(f, "token {} is not owned by the sender", id),
            RejectReason::NotActive { token_id, status } => {
                write!(f, "token {} is {}", token_id, status)
            }
            RejectReason::ExpiredToken(id) => write!(f, "token {} has expired", id),
            RejectReason::InsufficientBalance {
                required,
                available,
            } => write!(f, "tokens cover {} of {}", available, required),
            RejectReason::SuperfluousTokens { excess } => {
                write!(f, "tokens exceed the amount by {} and none can be divided", excess)
            }
        }
    }
}

/// Result for one submitted transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncOutcome {
    pub local_id: String,
    pub server_transaction_id: Option<TransactionId>,
    pub status: SyncStatus,
    pub reason: Option<String>,
    pub rejection: Option<RejectReason>,
    pub conflict: Option<ConflictRecord>,
    /// Tokens minted back to the sender while processing, e.g. change from
    /// dividing an over-paying token
    pub issued_tokens: Vec<Token>,
}

impl SyncOutcome {
    pub fn accepted(local_id: String, tx_id: TransactionId, issued_tokens: Vec<Token>) -> Self {
        Self {
            local_id,
            server_transaction_id: Some(tx_id),
            status: SyncStatus::Accepted,
            reason: None,
            rejection: None,
            conflict: None,
            issued_tokens,
        }
    }

    pub fn rejected(local_id: String, reason: RejectReason) -> Self {
        Self {
            local_id,
            server_transaction_id: None,
            status: SyncStatus::Rejected,
            reason: Some(reason.to_string()),
            rejection: Some(reason),
            conflict: None,
            issued_tokens: Vec::new(),
        }
    }

    pub fn conflict(record: ConflictRecord, issued_tokens: Vec<Token>) -> Self {
        let reason = match record.conflicting_transaction_ref {
            Some(winner) => format!(
                "{}: token {} already consumed by transaction {}",
                record.conflict_type, record.token_id, winner
            ),
            None => format!(
                "{}: token {} was consumed concurrently",
                record.conflict_type, record.token_id
            ),
        };
        Self {
            local_id: record.local_id.clone(),
            server_transaction_id: None,
            status: SyncStatus::Conflict,
            reason: Some(reason),
            rejection: None,
            conflict: Some(record),
            issued_tokens,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == SyncStatus::Accepted
    }
}
