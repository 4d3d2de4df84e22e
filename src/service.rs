// Service - the inbound surface: issue, validate, divide, sync
//
// One value wiring the issuer, validator, divider and reconciler to a shared
// ledger and clock. Every call is synchronous and returns a structured result
// or a typed failure.

use crate::clock::{Clock, SystemClock};
use crate::error::TokenError;
use crate::identity::{Keypair, PublicKey};
use crate::ledger::TokenLedger;
use crate::sync::{Reconciler, ReconcilerConfig, SyncOutcome, TransactionSubmission};
use crate::token::{
    Division, IssuerConfig, OwnerId, Token, TokenDivider, TokenIssuer, TokenValidator,
    ValidationResult,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Configuration for the whole service
#[derive(Clone, Debug, Default)]
pub struct ServiceConfig {
    pub issuer: IssuerConfig,
    pub reconciler: ReconcilerConfig,
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issuer(mut self, issuer: IssuerConfig) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn with_reconciler(mut self, reconciler: ReconcilerConfig) -> Self {
        self.reconciler = reconciler;
        self
    }
}

pub struct TokenService {
    issuer: Arc<TokenIssuer>,
    validator: TokenValidator,
    divider: TokenDivider,
    reconciler: Reconciler,
}

impl TokenService {
    pub fn new(
        keypair: Keypair,
        ledger: Arc<dyn TokenLedger>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Result<Self, TokenError> {
        let issuer = Arc::new(TokenIssuer::new(
            keypair,
            Arc::clone(&ledger),
            Arc::clone(&clock),
            config.issuer,
        )?);
        let validator = TokenValidator::new(issuer.public_key(), ledger, clock);
        let divider = TokenDivider::new(Arc::clone(&issuer));
        let reconciler = Reconciler::new(Arc::clone(&issuer), config.reconciler)?;
        Ok(Self {
            issuer,
            validator,
            divider,
            reconciler,
        })
    }

    /// Service on the wall clock with default configuration
    pub fn with_defaults(keypair: Keypair, ledger: Arc<dyn TokenLedger>) -> Result<Self, TokenError> {
        Self::new(keypair, ledger, Arc::new(SystemClock), ServiceConfig::default())
    }

    /// Issuer public key, for client-side verification
    pub fn public_key(&self) -> PublicKey {
        self.issuer.public_key()
    }

    pub fn issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    pub fn issue(&self, owner: &OwnerId, amount: Decimal) -> Result<Vec<Token>, TokenError> {
        self.issuer.issue(owner, amount)
    }

    pub fn validate(
        &self,
        token: &Token,
        claimant: &OwnerId,
    ) -> Result<ValidationResult, TokenError> {
        self.validator.validate(token, claimant)
    }

    pub fn divide(&self, token: &Token, payment_amount: Decimal) -> Result<Division, TokenError> {
        self.divider.divide(token, payment_amount)
    }

    pub fn sync_batch(
        &self,
        owner: &OwnerId,
        submissions: Vec<TransactionSubmission>,
    ) -> Result<Vec<SyncOutcome>, TokenError> {
        self.reconciler.sync_batch(owner, submissions)
    }

    pub fn submit_online(
        &self,
        owner: &OwnerId,
        submission: &TransactionSubmission,
    ) -> Result<SyncOutcome, TokenError> {
        self.reconciler.submit_online(owner, submission)
    }
}
