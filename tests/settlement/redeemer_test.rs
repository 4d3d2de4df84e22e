// Redeemer Tests
// Tests for redemption against a settlement target: spend-before-settle,
// retries, timeouts and resuming a pending redemption

use offcash::clock::ManualClock;
use offcash::identity::Keypair;
use offcash::ledger::{MemoryLedger, TokenLedger, TransactionSource, TransactionStatus, TransactionType};
use offcash::settlement::{MockSettlementTarget, RedeemError, Redeemer, RedeemerConfig};
use offcash::token::{IssuerConfig, OwnerId, Token, TokenId, TokenIssuer, TokenStatus};
use offcash::{TokenError, TokenStateError};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn setup() -> (TokenIssuer, Arc<MemoryLedger>) {
    let ledger = Arc::new(MemoryLedger::new());
    let issuer = TokenIssuer::new(
        Keypair::generate(),
        ledger.clone(),
        Arc::new(ManualClock::starting_now()),
        IssuerConfig::default(),
    )
    .unwrap();
    (issuer, ledger)
}

fn fast_config() -> RedeemerConfig {
    RedeemerConfig::new()
        .with_max_retries(2)
        .with_retry_delay_ms(0)
        .with_timeout_ms(1_000)
}

fn redeemer(issuer: &TokenIssuer, target: Arc<MockSettlementTarget>) -> Redeemer {
    Redeemer::new(issuer, target, fast_config()).unwrap()
}

fn alice() -> OwnerId {
    OwnerId::from("alice")
}

fn issue(issuer: &TokenIssuer, amount: i64) -> Token {
    issuer.issue(&alice(), Decimal::from(amount)).unwrap().remove(0)
}

fn status(ledger: &MemoryLedger, id: &TokenId) -> TokenStatus {
    ledger.get_token(id).unwrap().unwrap().status()
}

// ============================================================================
// SUCCESSFUL REDEMPTION
// ============================================================================

#[tokio::test]
async fn test_redeem_success() {
    let (issuer, ledger) = setup();
    let a = issue(&issuer, 30);
    let b = issue(&issuer, 20);
    let target = Arc::new(MockSettlementTarget::new().with_success());
    let redeemer = redeemer(&issuer, target.clone());

    let receipt = redeemer.redeem(&alice(), &[a.id(), b.id()]).await.unwrap();

    assert_eq!(receipt.amount.value(), Decimal::from(50));
    assert_eq!(receipt.attempts, 1);
    assert_eq!(receipt.token_ids, vec![a.id(), b.id()]);
    assert!(receipt.settlement_reference.starts_with("settle-mock-"));

    assert_eq!(status(&ledger, &a.id()), TokenStatus::Redeemed);
    assert_eq!(status(&ledger, &b.id()), TokenStatus::Redeemed);

    let tx = ledger.get_transaction(&receipt.transaction_id).unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(tx.tx_type, TransactionType::Redemption);
    assert_eq!(tx.source, TransactionSource::Online);
    assert_eq!(tx.settlement_reference, Some(receipt.settlement_reference.clone()));

    let requests = target.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].transaction_id, receipt.transaction_id);
    assert_eq!(requests[0].amount.value(), Decimal::from(50));
}

/// Test: Failed attempts are retried with the same transaction id until the
/// target succeeds
#[tokio::test]
async fn test_transient_failures_then_success() {
    let (issuer, ledger) = setup();
    let token = issue(&issuer, 10);
    let target = Arc::new(MockSettlementTarget::new().with_failures_then_success(2));
    let redeemer = redeemer(&issuer, target.clone());

    let receipt = redeemer.redeem(&alice(), &[token.id()]).await.unwrap();
    assert_eq!(receipt.attempts, 3);
    assert_eq!(target.call_count(), 3);
    assert_eq!(status(&ledger, &token.id()), TokenStatus::Redeemed);

    // every attempt carried the same idempotency key
    let keys: Vec<_> = target.requests().iter().map(|r| r.transaction_id).collect();
    assert!(keys.iter().all(|k| *k == receipt.transaction_id));
}

// ============================================================================
// FAILED SETTLEMENT
// ============================================================================

/// Test: After the last retry the tokens stay spent and the transaction
/// pending, and `retry` later completes it
#[tokio::test]
async fn test_exhausted_retries_leave_redemption_pending() {
    let (issuer, ledger) = setup();
    let token = issue(&issuer, 10);
    let target = Arc::new(MockSettlementTarget::new().with_failure("bank offline"));
    let redeemer = redeemer(&issuer, target.clone());

    let err = redeemer.redeem(&alice(), &[token.id()]).await.unwrap_err();
    let tx_id = match err {
        RedeemError::SettlementFailed {
            transaction_id,
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(last_error, "bank offline");
            transaction_id
        }
        other => panic!("unexpected error: {:?}", other),
    };
    assert_eq!(target.call_count(), 3);

    // tokens are out of circulation but not yet redeemed
    assert_eq!(status(&ledger, &token.id()), TokenStatus::Spent);
    let tx = ledger.get_transaction(&tx_id).unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert!(tx.settlement_reference.is_none());

    // a fresh attempt against a working target resumes the same transaction
    let recovered = Redeemer::new(
        &issuer,
        Arc::new(MockSettlementTarget::new().with_success()),
        fast_config(),
    )
    .unwrap();
    let receipt = recovered.retry(&tx_id).await.unwrap();
    assert_eq!(receipt.transaction_id, tx_id);
    assert_eq!(status(&ledger, &token.id()), TokenStatus::Redeemed);
    assert_eq!(
        ledger.get_transaction(&tx_id).unwrap().unwrap().status,
        TransactionStatus::Completed
    );
}

/// Test: A target slower than the timeout uses up an attempt
#[tokio::test]
async fn test_timeout_counts_as_failed_attempt() {
    let (issuer, ledger) = setup();
    let token = issue(&issuer, 10);
    let target = Arc::new(MockSettlementTarget::new().with_success().with_delay_ms(200));
    let config = RedeemerConfig::new()
        .with_max_retries(1)
        .with_retry_delay_ms(0)
        .with_timeout_ms(20);
    let redeemer = Redeemer::new(&issuer, target.clone(), config).unwrap();

    let err = redeemer.redeem(&alice(), &[token.id()]).await.unwrap_err();
    assert!(matches!(
        err,
        RedeemError::SettlementFailed { attempts: 2, ref last_error, .. } if last_error == "Timeout"
    ));
    assert_eq!(target.call_count(), 2);
    assert_eq!(status(&ledger, &token.id()), TokenStatus::Spent);
}

#[tokio::test]
async fn test_retry_of_settled_redemption_refused() {
    let (issuer, _) = setup();
    let token = issue(&issuer, 10);
    let redeemer = redeemer(&issuer, Arc::new(MockSettlementTarget::new().with_success()));

    let receipt = redeemer.redeem(&alice(), &[token.id()]).await.unwrap();
    assert!(matches!(
        redeemer.retry(&receipt.transaction_id).await,
        Err(RedeemError::NotPending {
            status: TransactionStatus::Completed,
            ..
        })
    ));
}

#[tokio::test]
async fn test_retry_unknown_transaction() {
    let (issuer, _) = setup();
    let redeemer = redeemer(&issuer, Arc::new(MockSettlementTarget::new().with_success()));
    let missing = offcash::ledger::TransactionId::generate();

    assert!(matches!(
        redeemer.retry(&missing).await,
        Err(RedeemError::TransactionNotFound(id)) if id == missing
    ));
}

// ============================================================================
// REFUSED BEFORE SETTLEMENT
// ============================================================================

#[tokio::test]
async fn test_spent_token_not_redeemable() {
    let (issuer, ledger) = setup();
    let token = issue(&issuer, 10);
    ledger
        .conditional_set_status(&token.id(), TokenStatus::Active, TokenStatus::Spent)
        .unwrap();
    let target = Arc::new(MockSettlementTarget::new().with_success());
    let redeemer = redeemer(&issuer, target.clone());

    assert!(matches!(
        redeemer.redeem(&alice(), &[token.id()]).await,
        Err(RedeemError::Token(TokenError::State(TokenStateError::NotActive { .. })))
    ));
    assert_eq!(target.call_count(), 0);
    assert_eq!(ledger.transaction_count(), 0);
}

#[tokio::test]
async fn test_other_owners_token_not_redeemable() {
    let (issuer, ledger) = setup();
    let token = issuer
        .issue(&OwnerId::from("bob"), Decimal::from(10))
        .unwrap()
        .remove(0);
    let target = Arc::new(MockSettlementTarget::new().with_success());
    let redeemer = redeemer(&issuer, target.clone());

    assert!(matches!(
        redeemer.redeem(&alice(), &[token.id()]).await,
        Err(RedeemError::Token(TokenError::State(TokenStateError::NotOwned { .. })))
    ));
    assert_eq!(status(&ledger, &token.id()), TokenStatus::Active);
    assert_eq!(target.call_count(), 0);
}

/// Test: Empty, duplicated and unknown token lists are refused up front
#[tokio::test]
async fn test_unusable_token_lists_refused() {
    let (issuer, ledger) = setup();
    let token = issue(&issuer, 10);
    let redeemer = redeemer(&issuer, Arc::new(MockSettlementTarget::new().with_success()));

    assert!(matches!(
        redeemer.redeem(&alice(), &[]).await,
        Err(RedeemError::Token(TokenError::Validation(_)))
    ));
    assert!(matches!(
        redeemer.redeem(&alice(), &[token.id(), token.id()]).await,
        Err(RedeemError::Token(TokenError::Validation(_)))
    ));
    assert!(matches!(
        redeemer.redeem(&alice(), &[TokenId::generate()]).await,
        Err(RedeemError::Token(TokenError::State(TokenStateError::NotFound(_))))
    ));
    assert_eq!(status(&ledger, &token.id()), TokenStatus::Active);
}

/// Test: A redemption whose total exceeds the decimal range is refused before
/// any token moves or the target is called
#[tokio::test]
async fn test_redemption_total_overflow_refused() {
    let (issuer, ledger) = setup();
    let huge = Decimal::from_str("50000000000000000000000000000").unwrap();
    let a = issuer.issue(&alice(), huge).unwrap().remove(0);
    let b = issuer.issue(&alice(), huge).unwrap().remove(0);
    let target = Arc::new(MockSettlementTarget::new().with_success());
    let redeemer = redeemer(&issuer, target.clone());

    assert!(matches!(
        redeemer.redeem(&alice(), &[a.id(), b.id()]).await,
        Err(RedeemError::Token(TokenError::Validation(_)))
    ));
    assert_eq!(target.call_count(), 0);
    assert_eq!(ledger.transaction_count(), 0);
    assert_eq!(status(&ledger, &a.id()), TokenStatus::Active);
    assert_eq!(status(&ledger, &b.id()), TokenStatus::Active);

    // each token on its own is still redeemable
    assert!(redeemer.redeem(&alice(), &[a.id()]).await.is_ok());
}

#[tokio::test]
async fn test_redeemed_token_cannot_be_redeemed_again() {
    let (issuer, _) = setup();
    let token = issue(&issuer, 10);
    let target = Arc::new(MockSettlementTarget::new().with_success());
    let redeemer = redeemer(&issuer, target.clone());

    redeemer.redeem(&alice(), &[token.id()]).await.unwrap();
    assert!(redeemer.redeem(&alice(), &[token.id()]).await.is_err());
    assert_eq!(target.call_count(), 1);
}
