// Error kinds shared by the issuer, validator, divider and reconciler

use crate::ledger::LedgerError;
use crate::token::{AmountError, OwnerId, TokenId, TokenStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Why a specific token cannot be used right now.
///
/// Recoverable: the caller can pick a different token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenStateError {
    #[error("Token {0} not found")]
    NotFound(TokenId),

    #[error("Token {token_id} is {status}, not active")]
    NotActive { token_id: TokenId, status: TokenStatus },

    #[error("Token {0} has expired")]
    Expired(TokenId),

    #[error("Token {token_id} is not owned by {claimant}")]
    NotOwned { token_id: TokenId, claimant: OwnerId },

    #[error("Token {0} does not carry a valid issuer signature")]
    InvalidSignature(TokenId),
}

/// Errors from issuing, validating and dividing tokens
#[derive(Error, Debug)]
pub enum TokenError {
    /// Bad input shape, e.g. a non-positive amount
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    State(#[from] TokenStateError),

    /// A conditional update lost a race. Re-fetch and retry or report upward.
    #[error("Conflict: token {token_id} was consumed concurrently")]
    Conflict { token_id: TokenId },

    /// Internal invariant breach; never expected from correct input
    #[error("Conservation violated: {expected} in, {actual} out")]
    ConservationViolation { expected: Decimal, actual: Decimal },

    #[error("Persistence failure: {0}")]
    Persistence(#[from] LedgerError),
}

impl TokenError {
    /// True for the kinds that indicate a malfunction rather than a routine
    /// outcome of offline operation
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            TokenError::Persistence(_) | TokenError::ConservationViolation { .. }
        )
    }
}

impl From<AmountError> for TokenError {
    fn from(err: AmountError) -> Self {
        TokenError::Validation(err.to_string())
    }
}
