// Sled Ledger Tests
// Tests for the durable ledger: same contract as the in-memory one, plus
// records and keys surviving a reopen

use chrono::{Duration, Utc};
use offcash::clock::SystemClock;
use offcash::identity::{Keypair, Signer};
use offcash::ledger::{
    BulkUpdate, LedgerError, TokenLedger, Transaction, TransactionSource, TransactionStatus,
    TransactionType,
};
use offcash::storage::SledLedger;
use offcash::token::{
    Amount, IssuerConfig, OwnerId, Token, TokenClaims, TokenDivider, TokenId, TokenIssuer,
    TokenStatus,
};
use rust_decimal::Decimal;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn token(amount: &str) -> Token {
    let keypair = Keypair::generate();
    let now = Utc::now();
    let claims = TokenClaims {
        id: TokenId::generate(),
        owner_id: OwnerId::from("alice"),
        amount: amount.parse().unwrap(),
        issued_at: now,
        expires_at: now + Duration::days(1),
    };
    let signature = Signer::sign(&keypair, &claims.signing_bytes());
    Token::from_parts(claims, keypair.public_key(), signature, TokenStatus::Active, None)
}

fn transaction(token_ids: Vec<TokenId>) -> Transaction {
    Transaction::pending(
        OwnerId::from("alice"),
        "10".parse::<Amount>().unwrap(),
        TransactionType::Transfer,
        token_ids,
        TransactionSource::OfflineSync,
        Utc::now(),
    )
}

fn status(ledger: &SledLedger, id: &TokenId) -> TokenStatus {
    ledger.get_token(id).unwrap().unwrap().status()
}

// ============================================================================
// TOKENS
// ============================================================================

#[test]
fn test_token_record_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = SledLedger::open(temp_dir.path()).unwrap();
    let t = token("12.345");
    ledger.create_token(&t).unwrap();

    assert_eq!(ledger.get_token(&t.id()).unwrap(), Some(t.clone()));
    assert_eq!(
        ledger.create_token(&t),
        Err(LedgerError::DuplicateToken(t.id()))
    );
}

/// Test: A batch containing a duplicate id stores none of its tokens
#[test]
fn test_create_tokens_is_all_or_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = SledLedger::open(temp_dir.path()).unwrap();
    let existing = token("1");
    ledger.create_token(&existing).unwrap();

    let fresh = token("2");
    assert!(ledger.create_tokens(&[fresh.clone(), existing]).is_err());
    assert_eq!(ledger.get_token(&fresh.id()).unwrap(), None);
}

#[test]
fn test_conditional_updates() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = SledLedger::open(temp_dir.path()).unwrap();
    let t = token("10");
    ledger.create_token(&t).unwrap();

    assert!(ledger
        .conditional_set_status(&t.id(), TokenStatus::Active, TokenStatus::Spent)
        .unwrap());
    assert!(!ledger
        .conditional_set_status(&t.id(), TokenStatus::Active, TokenStatus::Spent)
        .unwrap());
    assert!(ledger
        .conditional_set_status(&t.id(), TokenStatus::Spent, TokenStatus::Redeemed)
        .unwrap());
    assert!(matches!(
        ledger.conditional_set_status(&t.id(), TokenStatus::Redeemed, TokenStatus::Active),
        Err(LedgerError::IllegalTransition { .. })
    ));
    assert_eq!(status(&ledger, &t.id()), TokenStatus::Redeemed);
}

/// Test: One stale token in a bulk update leaves every token unchanged
#[test]
fn test_bulk_update_moves_all_or_none() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = SledLedger::open(temp_dir.path()).unwrap();
    let (a, b) = (token("1"), token("2"));
    ledger.create_tokens(&[a.clone(), b.clone()]).unwrap();
    ledger
        .conditional_set_status(&b.id(), TokenStatus::Active, TokenStatus::Expired)
        .unwrap();

    let outcome = ledger
        .conditional_set_status_all(&[a.id(), b.id()], TokenStatus::Active, TokenStatus::Spent)
        .unwrap();
    assert_eq!(
        outcome,
        BulkUpdate::Stale {
            token_id: b.id(),
            current: TokenStatus::Expired
        }
    );
    assert_eq!(status(&ledger, &a.id()), TokenStatus::Active);

    let missing = TokenId::generate();
    assert_eq!(
        ledger.conditional_set_status_all(&[a.id(), missing], TokenStatus::Active, TokenStatus::Spent),
        Err(LedgerError::TokenNotFound(missing))
    );
    assert_eq!(status(&ledger, &a.id()), TokenStatus::Active);
}

#[test]
fn test_split_token() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = SledLedger::open(temp_dir.path()).unwrap();
    let parent = token("10");
    ledger.create_token(&parent).unwrap();
    let children = vec![token("3"), token("7")];

    assert!(ledger.split_token(&parent.id(), &children).unwrap());
    assert_eq!(status(&ledger, &parent.id()), TokenStatus::Spent);
    for child in &children {
        assert_eq!(ledger.get_token(&child.id()).unwrap().as_ref(), Some(child));
    }
    assert!(!ledger.split_token(&parent.id(), &[token("10")]).unwrap());

    let stats = ledger.stats().unwrap();
    assert_eq!(stats.token_count, 3);
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

#[test]
fn test_transaction_index_and_status() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = SledLedger::open(temp_dir.path()).unwrap();
    let (a, b) = (TokenId::generate(), TokenId::generate());
    let tx1 = transaction(vec![a, b]);
    let tx2 = transaction(vec![b]);
    ledger.create_transaction(&tx1).unwrap();
    ledger.create_transaction(&tx2).unwrap();
    assert_eq!(
        ledger.create_transaction(&tx1),
        Err(LedgerError::DuplicateTransaction(tx1.id))
    );

    assert_eq!(ledger.find_transactions_consuming_token(&a).unwrap(), vec![tx1.clone()]);
    assert_eq!(ledger.find_transactions_consuming_token(&b).unwrap().len(), 2);

    assert!(ledger
        .conditional_set_transaction_status(
            &tx2.id,
            TransactionStatus::Pending,
            TransactionStatus::Completed,
            Some("bank-77"),
        )
        .unwrap());
    let winner = ledger.find_completed_consumer(&b).unwrap().unwrap();
    assert_eq!(winner.id, tx2.id);
    assert_eq!(winner.settlement_reference.as_deref(), Some("bank-77"));
    assert_eq!(ledger.find_completed_consumer(&a).unwrap(), None);
}

// ============================================================================
// DURABILITY
// ============================================================================

#[test]
fn test_records_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let t = token("10");
    let tx = transaction(vec![t.id()]);

    {
        let ledger = SledLedger::open(temp_dir.path()).unwrap();
        ledger.create_token(&t).unwrap();
        ledger
            .conditional_set_status(&t.id(), TokenStatus::Active, TokenStatus::Spent)
            .unwrap();
        ledger.create_transaction(&tx).unwrap();
        ledger.flush().unwrap();
    }

    let ledger = SledLedger::open(temp_dir.path()).unwrap();
    assert_eq!(status(&ledger, &t.id()), TokenStatus::Spent);
    assert_eq!(ledger.get_transaction(&tx.id).unwrap(), Some(tx.clone()));
    assert_eq!(ledger.find_transactions_consuming_token(&t.id()).unwrap(), vec![tx]);
}

#[test]
fn test_issuer_key_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let keypair = Keypair::generate();
    {
        let ledger = SledLedger::open(temp_dir.path()).unwrap();
        assert!(ledger.load_issuer_keypair().unwrap().is_none());
        ledger.save_issuer_keypair(&keypair).unwrap();
        ledger.flush().unwrap();
    }

    let ledger = SledLedger::open(temp_dir.path()).unwrap();
    let loaded = ledger.get_or_create_issuer_keypair().unwrap();
    assert_eq!(loaded.public_key(), keypair.public_key());
}

// ============================================================================
// CONCURRENCY
// ============================================================================

/// Test: Racing divisions of one token on sled commit exactly one split
#[test]
fn test_concurrent_divisions_on_sled() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = Arc::new(SledLedger::open(temp_dir.path()).unwrap());
    let issuer = Arc::new(
        TokenIssuer::new(
            Keypair::generate(),
            ledger.clone(),
            Arc::new(SystemClock),
            IssuerConfig::default(),
        )
        .unwrap(),
    );
    let divider = TokenDivider::new(issuer.clone());
    let parent = issuer
        .issue(&OwnerId::from("alice"), Decimal::from(100))
        .unwrap()
        .remove(0);
    let barrier = Barrier::new(4);

    let wins: usize = thread::scope(|s| {
        let handles: Vec<_> = (1..=4)
            .map(|i| {
                let divider = &divider;
                let barrier = &barrier;
                let parent = &parent;
                s.spawn(move || {
                    barrier.wait();
                    divider.divide(parent, Decimal::from(i * 10)).is_ok() as usize
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    assert_eq!(wins, 1);
    assert_eq!(status(&ledger, &parent.id()), TokenStatus::Spent);
    assert_eq!(ledger.stats().unwrap().token_count, 3);
}
