use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ledger::{
    check_transaction_transition, check_transition, BulkUpdate, LedgerError, LedgerResult,
    TokenLedger, Transaction, TransactionId, TransactionStatus,
};
use crate::token::{Token, TokenId, TokenStatus};

#[derive(Default)]
struct Inner {
    tokens: HashMap<TokenId, Token>,
    transactions: HashMap<TransactionId, Transaction>,
    /// token id -> transactions listing it as an input
    consumers: HashMap<TokenId, Vec<TransactionId>>,
}

/// In-memory ledger.
///
/// Intended for tests and embedding. One `RwLock` guards every map, which is
/// what makes the multi-record operations atomic.
#[derive(Default)]
pub struct MemoryLedger {
    inner: RwLock<Inner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of token records
    pub fn token_count(&self) -> usize {
        self.read().map(|inner| inner.tokens.len()).unwrap_or(0)
    }

    /// Number of transaction records
    pub fn transaction_count(&self) -> usize {
        self.read().map(|inner| inner.transactions.len()).unwrap_or(0)
    }

    /// All transaction records, in no particular order
    pub fn transactions(&self) -> LedgerResult<Vec<Transaction>> {
        Ok(self.read()?.transactions.values().cloned().collect())
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| LedgerError::Backend("lock poisoned".into()))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| LedgerError::Backend("lock poisoned".into()))
    }
}

impl TokenLedger for MemoryLedger {
    fn create_tokens(&self, tokens: &[Token]) -> LedgerResult<()> {
        let mut inner = self.write()?;

        let mut seen = HashSet::new();
        for token in tokens {
            if inner.tokens.contains_key(&token.id()) || !seen.insert(token.id()) {
                return Err(LedgerError::DuplicateToken(token.id()));
            }
        }

        for token in tokens {
            inner.tokens.insert(token.id(), token.clone());
        }
        Ok(())
    }

    fn get_token(&self, id: &TokenId) -> LedgerResult<Option<Token>> {
        Ok(self.read()?.tokens.get(id).cloned())
    }

    fn conditional_set_status(
        &self,
        id: &TokenId,
        expected: TokenStatus,
        new: TokenStatus,
    ) -> LedgerResult<bool> {
        check_transition(expected, new)?;
        let mut inner = self.write()?;
        let token = inner
            .tokens
            .get_mut(id)
            .ok_or(LedgerError::TokenNotFound(*id))?;

        if token.status() != expected {
            return Ok(false);
        }
        *token = token.with_status(new);
        Ok(true)
    }

    fn conditional_set_status_all(
        &self,
        ids: &[TokenId],
        expected: TokenStatus,
        new: TokenStatus,
    ) -> LedgerResult<BulkUpdate> {
        check_transition(expected, new)?;
        let mut inner = self.write()?;

        for id in ids {
            let token = inner.tokens.get(id).ok_or(LedgerError::TokenNotFound(*id))?;
            if token.status() != expected {
                return Ok(BulkUpdate::Stale {
                    token_id: *id,
                    current: token.status(),
                });
            }
        }

        for id in ids {
            if let Some(token) = inner.tokens.get_mut(id) {
                *token = token.with_status(new);
            }
        }
        Ok(BulkUpdate::Applied)
    }

    fn split_token(&self, parent: &TokenId, children: &[Token]) -> LedgerResult<bool> {
        let mut inner = self.write()?;

        let current = inner
            .tokens
            .get(parent)
            .ok_or(LedgerError::TokenNotFound(*parent))?
            .status();
        if current != TokenStatus::Active {
            return Ok(false);
        }
        for child in children {
            if inner.tokens.contains_key(&child.id()) {
                return Err(LedgerError::DuplicateToken(child.id()));
            }
        }

        if let Some(token) = inner.tokens.get_mut(parent) {
            *token = token.with_status(TokenStatus::Spent);
        }
        for child in children {
            inner.tokens.insert(child.id(), child.clone());
        }
        Ok(true)
    }

    fn create_transaction(&self, tx: &Transaction) -> LedgerResult<()> {
        let mut inner = self.write()?;
        if inner.transactions.contains_key(&tx.id) {
            return Err(LedgerError::DuplicateTransaction(tx.id));
        }

        for token_id in &tx.token_ids {
            inner.consumers.entry(*token_id).or_default().push(tx.id);
        }
        inner.transactions.insert(tx.id, tx.clone());
        Ok(())
    }

    fn get_transaction(&self, id: &TransactionId) -> LedgerResult<Option<Transaction>> {
        Ok(self.read()?.transactions.get(id).cloned())
    }

    fn find_transactions_consuming_token(
        &self,
        token_id: &TokenId,
    ) -> LedgerResult<Vec<Transaction>> {
        let inner = self.read()?;
        let found = inner
            .consumers
            .get(token_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.transactions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(found)
    }

    fn conditional_set_transaction_status(
        &self,
        id: &TransactionId,
        expected: TransactionStatus,
        new: TransactionStatus,
        settlement_reference: Option<&str>,
    ) -> LedgerResult<bool> {
        check_transaction_transition(expected, new)?;

        let mut inner = self.write()?;
        let tx = inner
            .transactions
            .get_mut(id)
            .ok_or(LedgerError::TransactionNotFound(*id))?;

        if tx.status != expected {
            return Ok(false);
        }
        tx.status = new;
        if let Some(reference) = settlement_reference {
            tx.settlement_reference = Some(reference.to_string());
        }
        Ok(true)
    }
}

impl std::fmt::Debug for MemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLedger")
            .field("tokens", &self.token_count())
            .field("transactions", &self.transaction_count())
            .finish()
    }
}
