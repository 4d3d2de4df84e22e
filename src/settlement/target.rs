use crate::ledger::TransactionId;
use crate::token::{Amount, OwnerId, TokenId};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// REDEMPTION REQUEST
// ============================================================================

/// What the settlement target is asked to pay out
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedemptionRequest {
    /// Stable across retries; targets should treat it as an idempotency key
    pub transaction_id: TransactionId,
    pub owner_id: OwnerId,
    pub token_ids: Vec<TokenId>,
    pub amount: Amount,
}

// ============================================================================
// SETTLEMENT TARGET TRAIT
// ============================================================================

/// External ledger that settles redeemed value (bank, chain, ...)
#[async_trait]
pub trait SettlementTarget: Send + Sync {
    /// Attempt to settle a redemption.
    /// Returns the settlement reference on success, error message on failure
    async fn redeem(&self, request: &RedemptionRequest) -> Result<String, String>;
}

// ============================================================================
// MOCK SETTLEMENT TARGET
// ============================================================================

/// Scriptable `SettlementTarget` for tests and the CLI
pub struct MockSettlementTarget {
    should_succeed: bool,
    failure_message: Option<String>,
    delay_ms: u64,
    failures_before_success: AtomicUsize,
    call_count: AtomicUsize,
    requests: Mutex<Vec<RedemptionRequest>>,
}

impl MockSettlementTarget {
    /// Create a new mock target (defaults to failure)
    pub fn new() -> Self {
        Self {
            should_succeed: false,
            failure_message: None,
            delay_ms: 0,
            failures_before_success: AtomicUsize::new(0),
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_success(mut self) -> Self {
        self.should_succeed = true;
        self
    }

    pub fn with_failure(mut self, message: &str) -> Self {
        self.should_succeed = false;
        self.failure_message = Some(message.to_string());
        self
    }

    /// Sleep before answering, to exercise timeouts
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Fail N times, then succeed
    pub fn with_failures_then_success(mut self, failures: usize) -> Self {
        self.should_succeed = true;
        self.failures_before_success = AtomicUsize::new(failures);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<RedemptionRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn failure(&self) -> String {
        self.failure_message
            .clone()
            .unwrap_or_else(|| "Mock failure".to_string())
    }
}

impl Default for MockSettlementTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementTarget for MockSettlementTarget {
    async fn redeem(&self, request: &RedemptionRequest) -> Result<String, String> {
        let call_num = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        if call_num < self.failures_before_success.load(Ordering::SeqCst) {
            return Err(self.failure());
        }

        if self.should_succeed {
            Ok(format!("settle-mock-{}-{}", request.transaction_id, call_num))
        } else {
            Err(self.failure())
        }
    }
}
