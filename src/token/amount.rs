// Exact decimal amounts
//
// Token values never touch binary floating point. Conservation checks in the
// divider compare these for exact equality.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount must be positive, got {0}")]
    NotPositive(Decimal),

    #[error("Invalid decimal: {0}")]
    Parse(String),

    #[error("Amount arithmetic overflowed")]
    Overflow,
}

/// A strictly positive, arbitrary-precision decimal amount.
///
/// Equality is numeric: `30` and `30.00` are the same amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Amount(Decimal);

impl Amount {
    /// Create an amount, rejecting zero and negative values
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }
        Ok(Self(value.normalize()))
    }

    /// Convenience for whole-unit amounts
    pub fn from_units(units: u64) -> Result<Self, AmountError> {
        Self::new(Decimal::from(units))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn checked_add(self, other: Amount) -> Result<Amount, AmountError> {
        let sum = self.0.checked_add(other.0).ok_or(AmountError::Overflow)?;
        Amount::new(sum)
    }

    /// `self - other`, or `None` when the difference is zero.
    ///
    /// Errors when `other > self`.
    pub fn checked_sub(self, other: Amount) -> Result<Option<Amount>, AmountError> {
        let diff = self.0.checked_sub(other.0).ok_or(AmountError::Overflow)?;
        if diff.is_zero() {
            return Ok(None);
        }
        Amount::new(diff).map(Some)
    }

    /// Sum of amounts as a plain decimal. An empty sum is zero.
    pub fn total<'a, I>(amounts: I) -> Result<Decimal, AmountError>
    where
        I: IntoIterator<Item = &'a Amount>,
    {
        amounts.into_iter().try_fold(Decimal::ZERO, |acc, a| {
            acc.checked_add(a.0).ok_or(AmountError::Overflow)
        })
    }

    /// Canonical string form used in signing payloads
    pub fn canonical(&self) -> String {
        self.0.normalize().to_string()
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Amount {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|e| AmountError::Parse(e.to_string()))?;
        Amount::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.canonical())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AmountVisitor;

        impl<'de> serde::de::Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a positive decimal string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Amount::from_str(v).map_err(|e| E::custom(e.to_string()))
            }
        }

        deserializer.deserialize_str(AmountVisitor)
    }
}
