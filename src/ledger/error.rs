use crate::ledger::{TransactionId, TransactionStatus};
use crate::token::{TokenId, TokenStatus};
use thiserror::Error;

/// Errors from the persistence collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Token {0} already exists")]
    DuplicateToken(TokenId),

    #[error("Transaction {0} already exists")]
    DuplicateTransaction(TransactionId),

    #[error("Token {0} not found")]
    TokenNotFound(TokenId),

    #[error("Transaction {0} not found")]
    TransactionNotFound(TransactionId),

    #[error("Illegal token transition: {from} -> {to}")]
    IllegalTransition { from: TokenStatus, to: TokenStatus },

    #[error("Illegal transaction transition: {from} -> {to}")]
    IllegalTransactionTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

/// Result alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
