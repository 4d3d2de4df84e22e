use crate::clock::Clock;
use crate::error::{TokenError, TokenStateError};
use crate::identity::PublicKey;
use crate::ledger::TokenLedger;
use crate::token::{OwnerId, Token, TokenId, TokenStatus};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of validating a token for a claimed owner.
///
/// The four checks are independent; a token is spendable only when all of
/// them hold. The result is advisory: any actual spend must still win a
/// conditional update in the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationResult {
    pub token_id: TokenId,
    pub signature_valid: bool,
    pub not_expired: bool,
    pub not_spent: bool,
    pub ownership_valid: bool,
    /// Persisted status at check time, `None` if the ledger has no record
    pub status: Option<TokenStatus>,
}

impl ValidationResult {
    pub fn is_spendable(&self) -> bool {
        self.signature_valid && self.not_expired && self.not_spent && self.ownership_valid
    }

    /// The first failed check as a state error, in the order signature,
    /// record, status, expiry, ownership
    pub fn first_failure(&self, claimant: &OwnerId) -> Option<TokenStateError> {
        if !self.signature_valid {
            return Some(TokenStateError::InvalidSignature(self.token_id));
        }
        let status = match self.status {
            Some(status) => status,
            None => return Some(TokenStateError::NotFound(self.token_id)),
        };
        if !self.not_spent {
            return Some(TokenStateError::NotActive {
                token_id: self.token_id,
                status,
            });
        }
        if !self.not_expired {
            return Some(TokenStateError::Expired(self.token_id));
        }
        if !self.ownership_valid {
            return Some(TokenStateError::NotOwned {
                token_id: self.token_id,
                claimant: claimant.clone(),
            });
        }
        None
    }
}

/// Answers whether a token is currently spendable.
///
/// Read-only: validation never changes a token's status. `mark_expired` is
/// the one explicit write, and it is a conditional update like any other.
pub struct TokenValidator {
    issuer_key: PublicKey,
    ledger: Arc<dyn TokenLedger>,
    clock: Arc<dyn Clock>,
}

impl TokenValidator {
    pub fn new(issuer_key: PublicKey, ledger: Arc<dyn TokenLedger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuer_key,
            ledger,
            clock,
        }
    }

    pub fn issuer_key(&self) -> &PublicKey {
        &self.issuer_key
    }

    /// Validate `token` for `claimant` at the current clock reading
    pub fn validate(
        &self,
        token: &Token,
        claimant: &OwnerId,
    ) -> Result<ValidationResult, TokenError> {
        self.validate_at(token, claimant, self.clock.now())
    }

    /// Validate `token` for `claimant` as of `now`.
    ///
    /// The signature is checked against the trusted issuer key, never the
    /// key embedded in the token. Status comes from the persisted record.
    /// Only a ledger failure is an error.
    pub fn validate_at(
        &self,
        token: &Token,
        claimant: &OwnerId,
        now: DateTime<Utc>,
    ) -> Result<ValidationResult, TokenError> {
        let signature_valid =
            token.issuer_public_key() == &self.issuer_key && token.verify(&self.issuer_key);

        let stored = self.ledger.get_token(&token.id())?;
        let status = stored.as_ref().map(Token::status);
        // A presented copy whose claims differ from the record is not the
        // token the ledger knows about.
        let record_matches = stored
            .as_ref()
            .map(|record| record.claims() == token.claims())
            .unwrap_or(false);

        let result = ValidationResult {
            token_id: token.id(),
            signature_valid: signature_valid && (stored.is_none() || record_matches),
            not_expired: !token.is_expired_at(now),
            not_spent: status == Some(TokenStatus::Active),
            ownership_valid: token.owner_id() == claimant,
            status,
        };

        if !result.is_spendable() {
            debug!(
                token_id = %token.id(),
                signature_valid = result.signature_valid,
                not_expired = result.not_expired,
                not_spent = result.not_spent,
                ownership_valid = result.ownership_valid,
                "token not spendable"
            );
        }
        Ok(result)
    }

    /// Validate the persisted record for `id`
    pub fn validate_by_id(
        &self,
        id: &TokenId,
        claimant: &OwnerId,
    ) -> Result<ValidationResult, TokenError> {
        let token = self
            .ledger
            .get_token(id)?
            .ok_or(TokenStateError::NotFound(*id))?;
        self.validate(&token, claimant)
    }

    /// Record that an active token has passed its expiry.
    ///
    /// Writes `active -> expired` only if the clock says the token is
    /// expired and the record is still active. Returns whether it moved.
    pub fn mark_expired(&self, id: &TokenId) -> Result<bool, TokenError> {
        let token = self
            .ledger
            .get_token(id)?
            .ok_or(TokenStateError::NotFound(*id))?;
        if !token.is_expired_at(self.clock.now()) {
            return Ok(false);
        }

        let moved =
            self.ledger
                .conditional_set_status(id, TokenStatus::Active, TokenStatus::Expired)?;
        if moved {
            info!(token_id = %id, "token marked expired");
        }
        Ok(moved)
    }
}
