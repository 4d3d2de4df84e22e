use crate::error::{TokenError, TokenStateError};
use crate::token::{Amount, Token, TokenId, TokenIssuer, TokenStatus};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// The two halves of a successful division
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Division {
    pub parent_id: TokenId,
    pub payment: Token,
    /// Absent when the payment takes the whole token
    pub change: Option<Token>,
}

impl Division {
    /// Sum of the children, equal to the parent's amount
    pub fn total(&self) -> Decimal {
        self.payment.amount().value()
            + self
                .change
                .as_ref()
                .map(|t| t.amount().value())
                .unwrap_or_default()
    }
}

/// Splits one active token into a payment token and an optional change token.
///
/// The only way value is split. Both children are signed by the issuer and
/// carry the parent's id, owner and expiry. The parent is retired and the
/// children stored in a single conditional ledger write.
pub struct TokenDivider {
    issuer: Arc<TokenIssuer>,
}

impl TokenDivider {
    pub fn new(issuer: Arc<TokenIssuer>) -> Self {
        Self { issuer }
    }

    /// Divide `token` so that `payment_amount` can be paid exactly.
    ///
    /// Every check runs before the ledger is touched. Losing the race for
    /// the parent yields `TokenError::Conflict` and no children exist.
    pub fn divide(&self, token: &Token, payment_amount: Decimal) -> Result<Division, TokenError> {
        let payment_amount = Amount::new(payment_amount)?;
        let parent_amount = token.amount();
        if payment_amount > parent_amount {
            return Err(TokenError::Validation(format!(
                "payment {} exceeds token amount {}",
                payment_amount, parent_amount
            )));
        }

        let ledger = self.issuer.ledger();
        let record = ledger
            .get_token(&token.id())?
            .ok_or(TokenStateError::NotFound(token.id()))?;
        if record.claims() != token.claims() {
            return Err(TokenStateError::InvalidSignature(token.id()).into());
        }
        if record.status() != TokenStatus::Active {
            return Err(TokenStateError::NotActive {
                token_id: token.id(),
                status: record.status(),
            }
            .into());
        }
        let now = self.issuer.clock().now();
        // Children are issued at `now` and must still have a live window.
        if now >= record.expires_at() {
            return Err(TokenStateError::Expired(token.id()).into());
        }

        let change_amount = parent_amount.checked_sub(payment_amount)?;

        let owner = record.owner_id().clone();
        let expires_at = record.expires_at();
        let parent_id = Some(record.id());
        let payment = self
            .issuer
            .mint(owner.clone(), payment_amount, now, expires_at, parent_id);
        let change =
            change_amount.map(|amount| self.issuer.mint(owner, amount, now, expires_at, parent_id));

        let division = Division {
            parent_id: record.id(),
            payment,
            change,
        };
        if division.total() != parent_amount.value() {
            return Err(TokenError::ConservationViolation {
                expected: parent_amount.value(),
                actual: division.total(),
            });
        }

        let mut children = vec![division.payment.clone()];
        children.extend(division.change.clone());
        if !ledger.split_token(&record.id(), &children)? {
            warn!(token_id = %record.id(), "division lost race for parent token");
            return Err(TokenError::Conflict {
                token_id: record.id(),
            });
        }

        info!(
            token_id = %record.id(),
            payment = %payment_amount,
            change = %change_amount.map(|a| a.to_string()).unwrap_or_else(|| "0".into()),
            "divided token"
        );
        Ok(division)
    }
}
