use crate::ledger::{LedgerError, LedgerResult, Transaction, TransactionId, TransactionStatus};
use crate::token::{Token, TokenId, TokenStatus};

/// Outcome of a multi-token conditional update
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BulkUpdate {
    /// Every token moved
    Applied,
    /// Nothing moved: this token was not in the expected status
    Stale {
        token_id: TokenId,
        current: TokenStatus,
    },
}

impl BulkUpdate {
    pub fn is_applied(&self) -> bool {
        matches!(self, BulkUpdate::Applied)
    }
}

/// Store of token and transaction records.
///
/// All implementations must satisfy these invariants:
/// - Token status only changes through a conditional update that names the
///   expected current status. A lost race returns `false` (or
///   [`BulkUpdate::Stale`]) immediately; nothing blocks or retries.
/// - Transitions the token lifecycle forbids are refused with
///   `LedgerError::IllegalTransition` whatever the current status.
/// - Multi-record operations are all-or-nothing.
/// - Reads are safe to run concurrently with writes; they are advisory.
pub trait TokenLedger: Send + Sync {
    /// Persist a new token. Fails if the id already exists.
    fn create_token(&self, token: &Token) -> LedgerResult<()> {
        self.create_tokens(std::slice::from_ref(token))
    }

    /// Persist several new tokens atomically: either all are stored or none.
    fn create_tokens(&self, tokens: &[Token]) -> LedgerResult<()>;

    /// Read a token record. `Ok(None)` if absent.
    fn get_token(&self, id: &TokenId) -> LedgerResult<Option<Token>>;

    /// Set `id` to `new` only if it is currently `expected`.
    ///
    /// Returns `Ok(false)` when the current status differs.
    fn conditional_set_status(
        &self,
        id: &TokenId,
        expected: TokenStatus,
        new: TokenStatus,
    ) -> LedgerResult<bool>;

    /// Conditional update over a set of tokens: every token moves from
    /// `expected` to `new`, or none does.
    fn conditional_set_status_all(
        &self,
        ids: &[TokenId],
        expected: TokenStatus,
        new: TokenStatus,
    ) -> LedgerResult<BulkUpdate>;

    /// Retire `parent` (`active -> spent`) and insert `children` as one
    /// atomic step. Returns `Ok(false)` without writing anything if the
    /// parent is no longer active.
    fn split_token(&self, parent: &TokenId, children: &[Token]) -> LedgerResult<bool>;

    /// Persist a new transaction and index it by the tokens it consumes
    fn create_transaction(&self, tx: &Transaction) -> LedgerResult<()>;

    fn get_transaction(&self, id: &TransactionId) -> LedgerResult<Option<Transaction>>;

    /// Every transaction, in any status, that lists `token_id` as an input.
    ///
    /// Backed by an index, not a scan.
    fn find_transactions_consuming_token(&self, token_id: &TokenId)
        -> LedgerResult<Vec<Transaction>>;

    /// Set a transaction's status only if it is currently `expected`,
    /// optionally recording the settlement reference in the same write.
    fn conditional_set_transaction_status(
        &self,
        id: &TransactionId,
        expected: TransactionStatus,
        new: TransactionStatus,
        settlement_reference: Option<&str>,
    ) -> LedgerResult<bool>;

    /// The completed transaction that consumed `token_id`, if any
    fn find_completed_consumer(&self, token_id: &TokenId) -> LedgerResult<Option<Transaction>> {
        Ok(self
            .find_transactions_consuming_token(token_id)?
            .into_iter()
            .find(Transaction::is_completed))
    }
}

/// Refuse transitions the token lifecycle does not allow
pub(crate) fn check_transition(expected: TokenStatus, new: TokenStatus) -> LedgerResult<()> {
    if expected.can_transition_to(new) {
        Ok(())
    } else {
        Err(LedgerError::IllegalTransition {
            from: expected,
            to: new,
        })
    }
}

pub(crate) fn check_transaction_transition(
    expected: TransactionStatus,
    new: TransactionStatus,
) -> LedgerResult<()> {
    if expected.can_transition_to(new) {
        Ok(())
    } else {
        Err(LedgerError::IllegalTransactionTransition {
            from: expected,
            to: new,
        })
    }
}
