// Token issuer - the single root of trust for token signatures

use crate::clock::Clock;
use crate::error::TokenError;
use crate::identity::{Keypair, PublicKey, Signer};
use crate::ledger::TokenLedger;
use crate::token::{Amount, OwnerId, Token, TokenClaims, TokenId, TokenStatus};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// How a requested amount is broken into individual tokens.
///
/// This is a configuration decision; whatever the policy, the issued
/// amounts always sum to the requested amount exactly.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum DenominationPolicy {
    /// One token for the full amount
    #[default]
    Single,
    /// Largest-first greedy split over the given denominations; any
    /// remainder that no denomination fits becomes one extra token
    Greedy(Vec<Amount>),
}

impl DenominationPolicy {
    /// Split `amount` into at most `limit` token amounts
    pub fn split(&self, amount: Amount, limit: usize) -> Result<Vec<Amount>, TokenError> {
        let denominations = match self {
            DenominationPolicy::Single => return Ok(vec![amount]),
            DenominationPolicy::Greedy(denominations) => denominations,
        };

        let mut sorted = denominations.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        sorted.dedup();

        let mut parts = Vec::new();
        let mut remaining: Option<Amount> = Some(amount);
        for denomination in sorted {
            while let Some(rest) = remaining {
                if rest < denomination {
                    break;
                }
                if parts.len() == limit {
                    return Err(too_many_tokens(amount, limit));
                }
                parts.push(denomination);
                remaining = rest.checked_sub(denomination)?;
            }
        }
        if let Some(rest) = remaining {
            if parts.len() == limit {
                return Err(too_many_tokens(amount, limit));
            }
            parts.push(rest);
        }
        Ok(parts)
    }
}

fn too_many_tokens(amount: Amount, limit: usize) -> TokenError {
    TokenError::Validation(format!(
        "amount {} needs more than {} tokens under the denomination policy",
        amount, limit
    ))
}

/// Configuration for the issuer
#[derive(Clone, Debug)]
pub struct IssuerConfig {
    /// How long a freshly issued token stays spendable
    pub validity_window: Duration,
    pub denominations: DenominationPolicy,
    /// Upper bound on tokens minted for a single request
    pub max_tokens_per_issue: usize,
}

impl IssuerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validity_window(mut self, window: Duration) -> Self {
        self.validity_window = window;
        self
    }

    pub fn with_denominations(mut self, denominations: DenominationPolicy) -> Self {
        self.denominations = denominations;
        self
    }

    pub fn with_max_tokens_per_issue(mut self, max: usize) -> Self {
        self.max_tokens_per_issue = max;
        self
    }

    pub fn validate(&self) -> Result<(), TokenError> {
        if self.validity_window <= Duration::zero() {
            return Err(TokenError::Validation(
                "validity_window must be positive".to_string(),
            ));
        }
        if self.max_tokens_per_issue == 0 {
            return Err(TokenError::Validation(
                "max_tokens_per_issue must be > 0".to_string(),
            ));
        }
        if let DenominationPolicy::Greedy(denominations) = &self.denominations {
            if denominations.is_empty() {
                return Err(TokenError::Validation(
                    "greedy denomination policy needs at least one denomination".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            validity_window: Duration::days(30),
            denominations: DenominationPolicy::Single,
            max_tokens_per_issue: 64,
        }
    }
}

/// Mints and signs tokens, and persists freshly issued ones.
///
/// Owns the signing key; nothing else in the crate signs tokens.
pub struct TokenIssuer {
    keypair: Keypair,
    ledger: Arc<dyn TokenLedger>,
    clock: Arc<dyn Clock>,
    config: IssuerConfig,
}

impl TokenIssuer {
    pub fn new(
        keypair: Keypair,
        ledger: Arc<dyn TokenLedger>,
        clock: Arc<dyn Clock>,
        config: IssuerConfig,
    ) -> Result<Self, TokenError> {
        config.validate()?;
        Ok(Self {
            keypair,
            ledger,
            clock,
            config,
        })
    }

    /// Public half of the signing key, for client-side verification
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    pub(crate) fn ledger(&self) -> &Arc<dyn TokenLedger> {
        &self.ledger
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Issue tokens worth exactly `amount` to `owner`.
    ///
    /// All tokens are persisted as `active` in one atomic write before they
    /// are returned; on persistence failure nothing is issued.
    pub fn issue(&self, owner: &OwnerId, amount: Decimal) -> Result<Vec<Token>, TokenError> {
        if owner.is_empty() {
            return Err(TokenError::Validation("owner id is required".to_string()));
        }
        let amount = Amount::new(amount)?;

        let parts = self
            .config
            .denominations
            .split(amount, self.config.max_tokens_per_issue)?;

        let issued = Amount::total(&parts)?;
        if issued != amount.value() {
            return Err(TokenError::ConservationViolation {
                expected: amount.value(),
                actual: issued,
            });
        }

        let now = self.clock.now();
        let expires_at = now + self.config.validity_window;
        let tokens: Vec<Token> = parts
            .into_iter()
            .map(|part| self.mint(owner.clone(), part, now, expires_at, None))
            .collect();

        self.ledger.create_tokens(&tokens).map_err(|e| {
            debug!(owner = %owner, amount = %amount, error = %e, "issuance rolled back");
            TokenError::Persistence(e)
        })?;

        info!(
            owner = %owner,
            amount = %amount,
            tokens = tokens.len(),
            "issued tokens"
        );
        Ok(tokens)
    }

    /// Sign a new `active` token without persisting it
    pub(crate) fn mint(
        &self,
        owner_id: OwnerId,
        amount: Amount,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        parent_token_id: Option<TokenId>,
    ) -> Token {
        let claims = TokenClaims {
            id: TokenId::generate(),
            owner_id,
            amount,
            issued_at,
            expires_at,
        };
        let signature = Signer::sign(&self.keypair, &claims.signing_bytes());
        Token::from_parts(
            claims,
            self.keypair.public_key(),
            signature,
            TokenStatus::Active,
            parent_token_id,
        )
    }
}
