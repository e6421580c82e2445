//! Fixed-point money amounts.

use crate::error::{CoreError, CoreResult};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const SCALE: u32 = 2;

/// A money amount with two decimal places.
///
/// The server models amounts as a decimal with two fractional digits and
/// renders them as strings (`"42.50"`). Amounts serialize the same way and
/// accept either a decimal string or a JSON number on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    /// Zero.
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// Creates an amount from a number of cents.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, SCALE))
    }

    /// Returns the amount in cents.
    #[must_use]
    pub fn cents(self) -> i64 {
        // Every constructor checks the cent count fits.
        (self.0 * Decimal::ONE_HUNDRED).to_i64().unwrap_or_default()
    }

    /// Returns the underlying decimal.
    #[must_use]
    pub const fn as_decimal(self) -> Decimal {
        self.0
    }

    /// Wraps a decimal that already has at most two fractional digits.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAmount`] for finer precision or a value
    /// out of range.
    pub fn from_decimal(value: Decimal) -> CoreResult<Self> {
        let invalid = || CoreError::InvalidAmount(value.to_string());
        if value.normalize().scale() > SCALE {
            return Err(invalid());
        }
        value
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|cents| cents.to_i64())
            .ok_or_else(invalid)?;
        Ok(Self(value))
    }

    fn from_f64(value: f64) -> CoreResult<Self> {
        let decimal = Decimal::from_f64(value)
            .ok_or_else(|| CoreError::InvalidAmount(value.to_string()))?;
        Self::from_decimal(decimal.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let decimal = Decimal::from_str(s.trim()).map_err(|_| CoreError::InvalidAmount(s.to_string()))?;
        Self::from_decimal(decimal)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal amount as a string or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                Amount::from_decimal(Decimal::from(v)).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Amount::from_decimal(Decimal::from(v)).map_err(E::custom)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
                Amount::from_f64(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}
