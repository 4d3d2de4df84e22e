// SledLedger - Persistent ledger using sled
//
// Trees:
// - tokens:       token id -> Token (postcard)
// - transactions: transaction id -> Transaction (postcard)
// - tx_by_token:  token id ++ transaction id -> () (consumer index)
// - default tree: issuer keypair and other node metadata

use crate::identity::Keypair;
use crate::ledger::{
    check_transaction_transition, check_transition, BulkUpdate, LedgerError, LedgerResult,
    TokenLedger, Transaction, TransactionId, TransactionStatus,
};
use crate::token::{Token, TokenId, TokenStatus};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};
use sled::Transactional;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Tree names and metadata keys
mod keys {
    pub const TOKENS_TREE: &str = "tokens";
    pub const TRANSACTIONS_TREE: &str = "transactions";
    pub const TX_BY_TOKEN_TREE: &str = "tx_by_token";
    pub const ISSUER_KEYPAIR: &[u8] = b"identity:issuer";
}

/// Errors from opening and maintaining the store itself
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    OpenFailed(String),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Flush failed: {0}")]
    FlushFailed(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        LedgerError::Backend(err.to_string())
    }
}

impl From<TransactionError<LedgerError>> for LedgerError {
    fn from(err: TransactionError<LedgerError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => e.into(),
        }
    }
}

/// Statistics about the storage
#[derive(Clone, Debug)]
pub struct StorageStats {
    pub token_count: usize,
    pub transaction_count: usize,
    /// Approximate disk size in bytes
    pub disk_size_bytes: u64,
}

fn encode<T: Serialize>(value: &T) -> LedgerResult<Vec<u8>> {
    postcard::to_allocvec(value).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> LedgerResult<T> {
    postcard::from_bytes(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn abort_on<T>(result: LedgerResult<T>) -> ConflictableTransactionResult<T, LedgerError> {
    result.map_err(ConflictableTransactionError::Abort)
}

fn index_key(token_id: &TokenId, tx_id: &TransactionId) -> Vec<u8> {
    [&token_id.as_bytes()[..], &tx_id.as_bytes()[..]].concat()
}

/// Persistent token ledger.
///
/// Single-record updates go through sled's `compare_and_swap`; multi-record
/// updates run inside sled transactions so they are all-or-nothing.
pub struct SledLedger {
    db: sled::Db,
    tokens: sled::Tree,
    transactions: sled::Tree,
    tx_by_token: sled::Tree,
}

impl SledLedger {
    /// Open or create a ledger at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        let tokens = db.open_tree(keys::TOKENS_TREE)?;
        let transactions = db.open_tree(keys::TRANSACTIONS_TREE)?;
        let tx_by_token = db.open_tree(keys::TX_BY_TOKEN_TREE)?;
        Ok(Self {
            db,
            tokens,
            transactions,
            tx_by_token,
        })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::FlushFailed(e.to_string()))?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StorageStats, StoreError> {
        Ok(StorageStats {
            token_count: self.tokens.len(),
            transaction_count: self.transactions.len(),
            disk_size_bytes: self.db.size_on_disk().unwrap_or(0),
        })
    }

    // ========================================================================
    // ISSUER KEY
    // ========================================================================

    pub fn save_issuer_keypair(&self, keypair: &Keypair) -> Result<(), StoreError> {
        self.db.insert(keys::ISSUER_KEYPAIR, keypair.to_bytes())?;
        Ok(())
    }

    pub fn load_issuer_keypair(&self) -> Result<Option<Keypair>, StoreError> {
        match self.db.get(keys::ISSUER_KEYPAIR)? {
            Some(bytes) => {
                let keypair = Keypair::from_bytes(&bytes)
                    .map_err(|e| StoreError::DeserializationFailed(e.to_string()))?;
                Ok(Some(keypair))
            }
            None => Ok(None),
        }
    }

    /// Load the issuer keypair, generating and saving one on first use
    pub fn get_or_create_issuer_keypair(&self) -> Result<Keypair, StoreError> {
        if let Some(keypair) = self.load_issuer_keypair()? {
            return Ok(keypair);
        }
        let keypair = Keypair::generate();
        self.save_issuer_keypair(&keypair)?;
        self.flush()?;
        Ok(keypair)
    }
}

impl TokenLedger for SledLedger {
    fn create_tokens(&self, tokens: &[Token]) -> LedgerResult<()> {
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(tokens.len());
        for token in tokens {
            if !seen.insert(token.id()) {
                return Err(LedgerError::DuplicateToken(token.id()));
            }
            records.push((token.id(), encode(token)?));
        }

        self.tokens
            .transaction(|tree| -> ConflictableTransactionResult<(), LedgerError> {
                for (id, bytes) in &records {
                    if tree.get(&id.as_bytes()[..])?.is_some() {
                        return abort_on(Err(LedgerError::DuplicateToken(*id)));
                    }
                    tree.insert(&id.as_bytes()[..], bytes.as_slice())?;
                }
                Ok(())
            })?;
        self.tokens.flush()?;
        Ok(())
    }

    fn get_token(&self, id: &TokenId) -> LedgerResult<Option<Token>> {
        self.tokens
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn conditional_set_status(
        &self,
        id: &TokenId,
        expected: TokenStatus,
        new: TokenStatus,
    ) -> LedgerResult<bool> {
        check_transition(expected, new)?;

        let old = self
            .tokens
            .get(id.as_bytes())?
            .ok_or(LedgerError::TokenNotFound(*id))?;
        let token: Token = decode(&old)?;
        if token.status() != expected {
            return Ok(false);
        }

        let next = encode(&token.with_status(new))?;
        // status is the only mutable field, so a changed record means the
        // status moved underneath us
        let swapped = self
            .tokens
            .compare_and_swap(id.as_bytes(), Some(&old[..]), Some(next))?;
        self.tokens.flush()?;
        Ok(swapped.is_ok())
    }

    fn conditional_set_status_all(
        &self,
        ids: &[TokenId],
        expected: TokenStatus,
        new: TokenStatus,
    ) -> LedgerResult<BulkUpdate> {
        check_transition(expected, new)?;

        let outcome = self
            .tokens
            .transaction(|tree| -> ConflictableTransactionResult<BulkUpdate, LedgerError> {
                let mut updated = Vec::with_capacity(ids.len());
                for id in ids {
                    let bytes = match tree.get(&id.as_bytes()[..])? {
                        Some(bytes) => bytes,
                        None => return abort_on(Err(LedgerError::TokenNotFound(*id))),
                    };
                    let token: Token = abort_on(decode(&bytes))?;
                    if token.status() != expected {
                        return Ok(BulkUpdate::Stale {
                            token_id: *id,
                            current: token.status(),
                        });
                    }
                    updated.push((*id, abort_on(encode(&token.with_status(new)))?));
                }
                for (id, bytes) in updated {
                    tree.insert(&id.as_bytes()[..], bytes)?;
                }
                Ok(BulkUpdate::Applied)
            })?;
        self.tokens.flush()?;
        Ok(outcome)
    }

    fn split_token(&self, parent: &TokenId, children: &[Token]) -> LedgerResult<bool> {
        let mut records = Vec::with_capacity(children.len());
        for child in children {
            records.push((child.id(), encode(child)?));
        }

        let split = self
            .tokens
            .transaction(|tree| -> ConflictableTransactionResult<bool, LedgerError> {
                let bytes = match tree.get(&parent.as_bytes()[..])? {
                    Some(bytes) => bytes,
                    None => return abort_on(Err(LedgerError::TokenNotFound(*parent))),
                };
                let token: Token = abort_on(decode(&bytes))?;
                if token.status() != TokenStatus::Active {
                    return Ok(false);
                }
                for (id, _) in &records {
                    if tree.get(&id.as_bytes()[..])?.is_some() {
                        return abort_on(Err(LedgerError::DuplicateToken(*id)));
                    }
                }

                let retired = abort_on(encode(&token.with_status(TokenStatus::Spent)))?;
                tree.insert(&parent.as_bytes()[..], retired)?;
                for (id, child) in &records {
                    tree.insert(&id.as_bytes()[..], child.as_slice())?;
                }
                Ok(true)
            })?;
        self.tokens.flush()?;
        Ok(split)
    }

    fn create_transaction(&self, tx: &Transaction) -> LedgerResult<()> {
        let record = encode(tx)?;
        let index_keys: Vec<Vec<u8>> = tx
            .token_ids
            .iter()
            .map(|token_id| index_key(token_id, &tx.id))
            .collect();

        (&self.transactions, &self.tx_by_token).transaction(
            |(txs, index)| -> ConflictableTransactionResult<(), LedgerError> {
                if txs.get(&tx.id.as_bytes()[..])?.is_some() {
                    return abort_on(Err(LedgerError::DuplicateTransaction(tx.id)));
                }
                txs.insert(&tx.id.as_bytes()[..], record.as_slice())?;
                for key in &index_keys {
                    index.insert(key.as_slice(), &b""[..])?;
                }
                Ok(())
            },
        )?;
        self.db.flush()?;
        Ok(())
    }

    fn get_transaction(&self, id: &TransactionId) -> LedgerResult<Option<Transaction>> {
        self.transactions
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn find_transactions_consuming_token(
        &self,
        token_id: &TokenId,
    ) -> LedgerResult<Vec<Transaction>> {
        let mut found = Vec::new();
        for entry in self.tx_by_token.scan_prefix(token_id.as_bytes()) {
            let (key, _) = entry?;
            let tx_bytes: [u8; 16] = key
                .get(16..)
                .and_then(|suffix| <[u8; 16]>::try_from(suffix).ok())
                .ok_or_else(|| LedgerError::Serialization("malformed consumer index key".into()))?;
            if let Some(tx) = self.get_transaction(&TransactionId::from_bytes(tx_bytes))? {
                found.push(tx);
            }
        }
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

        let old = self
            .transactions
            .get(id.as_bytes())?
            .ok_or(LedgerError::TransactionNotFound(*id))?;
        let mut tx: Transaction = decode(&old)?;
        if tx.status != expected {
            return Ok(false);
        }

        tx.status = new;
        if let Some(reference) = settlement_reference {
            tx.settlement_reference = Some(reference.to_string());
        }
        let swapped = self
            .transactions
            .compare_and_swap(id.as_bytes(), Some(&old[..]), Some(encode(&tx)?))?;
        self.transactions.flush()?;
        Ok(swapped.is_ok())
    }
}

impl std::fmt::Debug for SledLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledLedger")
            .field("tokens", &self.tokens.len())
            .field("transactions", &self.transactions.len())
            .finish()
    }
}
