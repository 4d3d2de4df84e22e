use crate::clock::Clock;
use crate::error::TokenError;
use crate::ledger::{
    BulkUpdate, LedgerError, TokenLedger, Transaction, TransactionId, TransactionSource,
    TransactionStatus, TransactionType,
};
use crate::settlement::{RedemptionRequest, SettlementTarget};
use crate::token::{Amount, OwnerId, TokenId, TokenIssuer, TokenStatus, TokenValidator};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

// ============================================================================
// REDEEMER CONFIG
// ============================================================================

/// Configuration for the redeemer
#[derive(Clone, Debug)]
pub struct RedeemerConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Per-attempt timeout
    pub timeout_ms: u64,
}

impl RedeemerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn validate(&self) -> Result<(), RedeemError> {
        if self.timeout_ms == 0 {
            return Err(RedeemError::InvalidConfig(
                "timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RedeemerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1_000,
            timeout_ms: 30_000,
        }
    }
}

// ============================================================================
// REDEEMER ERROR
// ============================================================================

#[derive(Error, Debug)]
pub enum RedeemError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Transaction {0} not found")]
    TransactionNotFound(TransactionId),

    #[error("Transaction {0} is not a redemption")]
    NotRedemption(TransactionId),

    #[error("Transaction {transaction_id} is {status}, not pending")]
    NotPending {
        transaction_id: TransactionId,
        status: TransactionStatus,
    },

    /// Tokens stay spent and the transaction pending; `retry` resumes it
    #[error("Settlement of {transaction_id} failed after {attempts} attempts: {last_error}")]
    SettlementFailed {
        transaction_id: TransactionId,
        attempts: u32,
        last_error: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<LedgerError> for RedeemError {
    fn from(err: LedgerError) -> Self {
        RedeemError::Token(TokenError::Persistence(err))
    }
}

// ============================================================================
// REDEMPTION RECEIPT
// ============================================================================

/// Proof of a completed redemption
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedemptionReceipt {
    pub transaction_id: TransactionId,
    pub settlement_reference: String,
    pub amount: Amount,
    pub token_ids: Vec<TokenId>,
    pub attempts: u32,
}

// ============================================================================
// REDEEMER
// ============================================================================

/// Exchanges tokens for external settlement.
///
/// Tokens are durably `spent` under a pending redemption transaction before
/// the target is called, and only become `redeemed` once it confirms. A
/// failed settlement leaves them pending redemption rather than active.
pub struct Redeemer {
    ledger: Arc<dyn TokenLedger>,
    clock: Arc<dyn Clock>,
    validator: TokenValidator,
    target: Arc<dyn SettlementTarget>,
    config: RedeemerConfig,
}

impl Redeemer {
    pub fn new(
        issuer: &TokenIssuer,
        target: Arc<dyn SettlementTarget>,
        config: RedeemerConfig,
    ) -> Result<Self, RedeemError> {
        config.validate()?;
        let ledger = Arc::clone(issuer.ledger());
        let clock = Arc::clone(issuer.clock());
        let validator =
            TokenValidator::new(issuer.public_key(), Arc::clone(&ledger), Arc::clone(&clock));
        Ok(Self {
            ledger,
            clock,
            validator,
            target,
            config,
        })
    }

    pub fn config(&self) -> &RedeemerConfig {
        &self.config
    }

    /// Redeem `token_ids` held by `owner`
    pub async fn redeem(
        &self,
        owner: &OwnerId,
        token_ids: &[TokenId],
    ) -> Result<RedemptionReceipt, RedeemError> {
        if token_ids.is_empty() {
            return Err(TokenError::Validation("no tokens to redeem".to_string()).into());
        }
        let mut seen = HashSet::new();
        if !token_ids.iter().all(|id| seen.insert(*id)) {
            return Err(TokenError::Validation("token listed more than once".to_string()).into());
        }

        let mut amounts = Vec::with_capacity(token_ids.len());
        for id in token_ids {
            let result = self.validator.validate_by_id(id, owner)?;
            if let Some(failure) = result.first_failure(owner) {
                return Err(TokenError::State(failure).into());
            }
            if let Some(token) = self.ledger.get_token(id)? {
                amounts.push(token.amount());
            }
        }
        let total = Amount::total(&amounts).map_err(TokenError::from)?;
        let amount = Amount::new(total).map_err(TokenError::from)?;

        let tx = Transaction::pending(
            owner.clone(),
            amount,
            TransactionType::Redemption,
            token_ids.to_vec(),
            TransactionSource::Online,
            self.clock.now(),
        );
        self.ledger.create_transaction(&tx)?;

        if let BulkUpdate::Stale { token_id, current } = self.ledger.conditional_set_status_all(
            token_ids,
            TokenStatus::Active,
            TokenStatus::Spent,
        )? {
            self.ledger.conditional_set_transaction_status(
                &tx.id,
                TransactionStatus::Pending,
                TransactionStatus::Failed,
                None,
            )?;
            warn!(tx_id = %tx.id, token_id = %token_id, status = %current, "redemption lost race");
            return Err(TokenError::Conflict { token_id }.into());
        }

        info!(tx_id = %tx.id, owner = %owner, amount = %amount, "tokens pending redemption");
        self.settle(&tx).await
    }

    /// Resume a redemption left pending by a failed settlement
    pub async fn retry(&self, tx_id: &TransactionId) -> Result<RedemptionReceipt, RedeemError> {
        let tx = self
            .ledger
            .get_transaction(tx_id)?
            .ok_or(RedeemError::TransactionNotFound(*tx_id))?;
        if tx.tx_type != TransactionType::Redemption {
            return Err(RedeemError::NotRedemption(tx.id));
        }
        if tx.status != TransactionStatus::Pending {
            return Err(RedeemError::NotPending {
                transaction_id: tx.id,
                status: tx.status,
            });
        }
        self.settle(&tx).await
    }

    async fn settle(&self, tx: &Transaction) -> Result<RedemptionReceipt, RedeemError> {
        let request = RedemptionRequest {
            transaction_id: tx.id,
            owner_id: tx.sender_id.clone(),
            token_ids: tx.token_ids.clone(),
            amount: tx.amount,
        };

        let mut attempts = 0u32;
        let mut last_error = String::new();

        loop {
            attempts += 1;

            let timeout_duration = Duration::from_millis(self.config.timeout_ms);
            match tokio::time::timeout(timeout_duration, self.target.redeem(&request)).await {
                Ok(Ok(reference)) => return self.confirm(tx, reference, attempts),
                Ok(Err(e)) => last_error = e,
                Err(_) => last_error = "Timeout".to_string(),
            }

            if attempts > self.config.max_retries {
                break;
            }

            warn!(tx_id = %tx.id, attempt = attempts, error = %last_error, "settlement attempt failed");
            if self.config.retry_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }
        }

        warn!(tx_id = %tx.id, attempts, error = %last_error, "settlement failed, redemption left pending");
        Err(RedeemError::SettlementFailed {
            transaction_id: tx.id,
            attempts,
            last_error,
        })
    }

    /// Record a confirmed settlement: transaction first, then tokens
    fn confirm(
        &self,
        tx: &Transaction,
        reference: String,
        attempts: u32,
    ) -> Result<RedemptionReceipt, RedeemError> {
        if !self.ledger.conditional_set_transaction_status(
            &tx.id,
            TransactionStatus::Pending,
            TransactionStatus::Completed,
            Some(&reference),
        )? {
            let status = self
                .ledger
                .get_transaction(&tx.id)?
                .map(|current| current.status)
                .ok_or(RedeemError::TransactionNotFound(tx.id))?;
            return Err(RedeemError::NotPending {
                transaction_id: tx.id,
                status,
            });
        }

        if let BulkUpdate::Stale { token_id, current } = self.ledger.conditional_set_status_all(
            &tx.token_ids,
            TokenStatus::Spent,
            TokenStatus::Redeemed,
        )? {
            warn!(tx_id = %tx.id, token_id = %token_id, status = %current, "token moved during settlement");
            return Err(TokenError::Conflict { token_id }.into());
        }

        info!(tx_id = %tx.id, reference = %reference, attempts, "redemption settled");
        Ok(RedemptionReceipt {
            transaction_id: tx.id,
            settlement_reference: reference,
            amount: tx.amount,
            token_ids: tx.token_ids.clone(),
            attempts,
        })
    }
}
