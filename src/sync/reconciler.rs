use crate::clock::Clock;
use crate::error::{TokenError, TokenStateError};
use crate::ledger::{
    BulkUpdate, LedgerError, TokenLedger, Transaction, TransactionSource, TransactionStatus,
    TransactionType,
};
use crate::sync::{
    ConflictRecord, ConflictResolution, ConflictType, RejectReason, SyncOutcome,
    TransactionSubmission,
};
use crate::token::{
    Amount, OwnerId, Token, TokenDivider, TokenId, TokenIssuer, TokenStatus, TokenValidator,
};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for the reconciler
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// Largest batch accepted by `sync_batch`
    pub max_batch_size: usize,
}

impl ReconcilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn validate(&self) -> Result<(), TokenError> {
        if self.max_batch_size == 0 {
            return Err(TokenError::Validation(
                "max_batch_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 500,
        }
    }
}

/// A submission that passed every check, ready to commit
struct Checked {
    amount: Amount,
    tx_type: TransactionType,
    tokens: Vec<Token>,
    /// Index into `tokens` of the token to divide, and the excess it returns
    divide: Option<(usize, Decimal)>,
}

/// Verdict of the read-only checks
enum Verdict {
    Ready(Checked),
    Reject(RejectReason),
    DoubleSpend { token_id: TokenId, winner: Transaction },
}

/// Resolves client-recorded transactions against the ledger.
///
/// Each submission is handled on its own: one rejection never aborts the
/// rest of a batch. Token status only moves through conditional ledger
/// updates, so a submission's tokens are consumed all-or-nothing. Double
/// spends resolve server-wins: the committed transaction stands.
pub struct Reconciler {
    ledger: Arc<dyn TokenLedger>,
    clock: Arc<dyn Clock>,
    validator: TokenValidator,
    divider: TokenDivider,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(issuer: Arc<TokenIssuer>, config: ReconcilerConfig) -> Result<Self, TokenError> {
        config.validate()?;
        let ledger = Arc::clone(issuer.ledger());
        let clock = Arc::clone(issuer.clock());
        let validator =
            TokenValidator::new(issuer.public_key(), Arc::clone(&ledger), Arc::clone(&clock));
        Ok(Self {
            ledger,
            clock,
            validator,
            divider: TokenDivider::new(issuer),
            config,
        })
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Process offline submissions from `owner` in submission order.
    ///
    /// Returns one outcome per submission. Only ledger faults and
    /// conservation breaches are errors; they stop the batch.
    pub fn sync_batch(
        &self,
        owner: &OwnerId,
        submissions: Vec<TransactionSubmission>,
    ) -> Result<Vec<SyncOutcome>, TokenError> {
        if submissions.len() > self.config.max_batch_size {
            return Err(TokenError::Validation(format!(
                "batch of {} exceeds limit of {}",
                submissions.len(),
                self.config.max_batch_size
            )));
        }

        let mut outcomes = Vec::with_capacity(submissions.len());
        for submission in &submissions {
            outcomes.push(self.process(owner, submission, TransactionSource::OfflineSync)?);
        }

        info!(
            owner = %owner,
            submitted = submissions.len(),
            accepted = outcomes.iter().filter(|o| o.is_accepted()).count(),
            "sync batch processed"
        );
        Ok(outcomes)
    }

    /// Commit a single transaction made while connected
    pub fn submit_online(
        &self,
        owner: &OwnerId,
        submission: &TransactionSubmission,
    ) -> Result<SyncOutcome, TokenError> {
        self.process(owner, submission, TransactionSource::Online)
    }

    fn process(
        &self,
        owner: &OwnerId,
        submission: &TransactionSubmission,
        source: TransactionSource,
    ) -> Result<SyncOutcome, TokenError> {
        let local_id = submission.local_id.clone();
        match self.check(owner, submission)? {
            Verdict::Reject(reason) => {
                debug!(local_id = %local_id, reason = %reason, "submission rejected");
                Ok(SyncOutcome::rejected(local_id, reason))
            }
            Verdict::DoubleSpend { token_id, winner } => {
                warn!(
                    local_id = %local_id,
                    token_id = %token_id,
                    winner = %winner.id,
                    "double spend detected"
                );
                Ok(SyncOutcome::conflict(
                    double_spend(local_id, token_id, Some(winner)),
                    Vec::new(),
                ))
            }
            Verdict::Ready(checked) => self.commit(submission, checked, source),
        }
    }

    /// Every read-only check, in order: structure, token records,
    /// ownership, prior consumption, token validity, value.
    fn check(
        &self,
        owner: &OwnerId,
        submission: &TransactionSubmission,
    ) -> Result<Verdict, TokenError> {
        let (amount, tx_type) = match structural(owner, submission) {
            Ok(parsed) => parsed,
            Err(reason) => return Ok(Verdict::Reject(reason)),
        };

        let mut tokens = Vec::with_capacity(submission.token_ids.len());
        for id in &submission.token_ids {
            match self.ledger.get_token(id)? {
                Some(token) => tokens.push(token),
                None => return Ok(Verdict::Reject(RejectReason::TokenNotFound(*id))),
            }
        }

        if let Some(token) = tokens.iter().find(|t| t.owner_id() != owner) {
            return Ok(Verdict::Reject(RejectReason::NotOwned(token.id())));
        }

        for token in &tokens {
            if let Some(winner) = self.ledger.find_completed_consumer(&token.id())? {
                return Ok(Verdict::DoubleSpend {
                    token_id: token.id(),
                    winner,
                });
            }
        }

        let now = self.clock.now();
        for token in &tokens {
            let result = self.validator.validate_at(token, owner, now)?;
            if let Some(failure) = result.first_failure(owner) {
                return Ok(Verdict::Reject(reject_reason(failure)));
            }
        }

        let amounts: Vec<Amount> = tokens.iter().map(Token::amount).collect();
        let available = match Amount::total(&amounts) {
            Ok(total) => total,
            Err(_) => {
                return Ok(Verdict::Reject(RejectReason::Structural(
                    "token values overflow".to_string(),
                )))
            }
        };
        if available < amount.value() {
            return Ok(Verdict::Reject(RejectReason::InsufficientBalance {
                required: amount.value(),
                available,
            }));
        }

        let excess = available - amount.value();
        let divide = if excess.is_zero() {
            None
        } else {
            match tokens.iter().rposition(|t| t.amount().value() > excess) {
                Some(index) => Some((index, excess)),
                None => return Ok(Verdict::Reject(RejectReason::SuperfluousTokens { excess })),
            }
        };

        Ok(Verdict::Ready(Checked {
            amount,
            tx_type,
            tokens,
            divide,
        }))
    }

    /// Divide for change if needed, then record the transaction and move
    /// every input `active -> spent` in one conditional update.
    fn commit(
        &self,
        submission: &TransactionSubmission,
        checked: Checked,
        source: TransactionSource,
    ) -> Result<SyncOutcome, TokenError> {
        let local_id = submission.local_id.clone();
        let mut inputs: Vec<TokenId> = checked.tokens.iter().map(Token::id).collect();
        let mut spend: Vec<TokenId> = inputs.clone();
        let mut issued = Vec::new();

        if let Some((index, excess)) = checked.divide {
            let token = &checked.tokens[index];
            let payment = token.amount().value() - excess;
            match self.divider.divide(token, payment) {
                Ok(division) => {
                    // The divided token is retired by the split; its payment
                    // half is consumed in its place and listed after the inputs.
                    spend[index] = division.payment.id();
                    inputs.push(division.payment.id());
                    issued.extend(division.change);
                }
                Err(TokenError::Conflict { token_id })
                | Err(TokenError::State(TokenStateError::NotActive { token_id, .. })) => {
                    let winner = self.ledger.find_completed_consumer(&token_id)?;
                    return Ok(SyncOutcome::conflict(
                        double_spend(local_id, token_id, winner),
                        Vec::new(),
                    ));
                }
                Err(TokenError::State(TokenStateError::Expired(token_id))) => {
                    return Ok(SyncOutcome::rejected(
                        local_id,
                        RejectReason::ExpiredToken(token_id),
                    ));
                }
                Err(e) => return Err(e),
            }
        }

        let mut tx = Transaction::pending(
            submission.sender_id.clone(),
            checked.amount,
            checked.tx_type,
            inputs,
            source,
            submission.timestamp,
        );
        tx.local_id = Some(local_id.clone());
        tx.receiver_id = submission.receiver_id.clone();
        tx.sender_signature = submission
            .sender_signature
            .as_ref()
            .map(|s| s.signature.clone());
        self.ledger.create_transaction(&tx)?;

        match self.ledger.conditional_set_status_all(
            &spend,
            TokenStatus::Active,
            TokenStatus::Spent,
        )? {
            BulkUpdate::Applied => {}
            BulkUpdate::Stale { token_id, current } => {
                self.ledger.conditional_set_transaction_status(
                    &tx.id,
                    TransactionStatus::Pending,
                    TransactionStatus::Failed,
                    None,
                )?;
                let winner = self.ledger.find_completed_consumer(&token_id)?;
                warn!(
                    local_id = %local_id,
                    token_id = %token_id,
                    status = %current,
                    "commit lost race for token"
                );
                // The divided token's children stay with the sender.
                return Ok(SyncOutcome::conflict(
                    double_spend(local_id, token_id, winner),
                    issued,
                ));
            }
        }

        if !self.ledger.conditional_set_transaction_status(
            &tx.id,
            TransactionStatus::Pending,
            TransactionStatus::Completed,
            None,
        )? {
            return Err(TokenError::Persistence(LedgerError::Backend(format!(
                "transaction {} changed status during commit",
                tx.id
            ))));
        }

        info!(
            local_id = %local_id,
            tx_id = %tx.id,
            amount = %checked.amount,
            tokens = spend.len(),
            source = ?source,
            "transaction committed"
        );
        Ok(SyncOutcome::accepted(local_id, tx.id, issued))
    }
}

/// Shape checks that need no ledger access
fn structural(
    owner: &OwnerId,
    submission: &TransactionSubmission,
) -> Result<(Amount, TransactionType), RejectReason> {
    let invalid = |msg: &str| RejectReason::Structural(msg.to_string());

    if submission.local_id.trim().is_empty() {
        return Err(invalid("local id is required"));
    }
    if submission.sender_id.is_empty() {
        return Err(invalid("sender id is required"));
    }
    if &submission.sender_id != owner {
        return Err(invalid("sender does not match the submitting owner"));
    }
    let amount = Amount::new(submission.amount).map_err(|e| RejectReason::Structural(e.to_string()))?;
    let tx_type: TransactionType = submission
        .tx_type
        .parse()
        .map_err(RejectReason::Structural)?;
    if submission.token_ids.is_empty() {
        return Err(invalid("at least one token is required"));
    }
    let mut seen = HashSet::new();
    if !submission.token_ids.iter().all(|id| seen.insert(*id)) {
        return Err(invalid("token listed more than once"));
    }
    if tx_type == TransactionType::Transfer {
        if submission.receiver_id.as_ref().map_or(true, OwnerId::is_empty) {
            return Err(invalid("transfer needs a receiver"));
        }
        if submission.sender_signature.is_none() {
            return Err(invalid("transfer needs a sender signature"));
        }
    }
    if submission.verify_sender_signature() == Some(false) {
        return Err(RejectReason::InvalidSenderSignature);
    }
    Ok((amount, tx_type))
}

fn reject_reason(failure: TokenStateError) -> RejectReason {
    match failure {
        TokenStateError::NotFound(id) => RejectReason::TokenNotFound(id),
        TokenStateError::InvalidSignature(id) => RejectReason::InvalidTokenSignature(id),
        TokenStateError::NotOwned { token_id, .. } => RejectReason::NotOwned(token_id),
        TokenStateError::Expired(id)
        | TokenStateError::NotActive {
            token_id: id,
            status: TokenStatus::Expired,
        } => RejectReason::ExpiredToken(id),
        TokenStateError::NotActive { token_id, status } => {
            RejectReason::NotActive { token_id, status }
        }
    }
}

fn double_spend(local_id: String, token_id: TokenId, winner: Option<Transaction>) -> ConflictRecord {
    ConflictRecord {
        local_id,
        conflict_type: ConflictType::DoubleSpend,
        resolution: ConflictResolution::ServerWins,
        conflicting_transaction_ref: winner.map(|tx| tx.id),
        token_id,
    }
}
