//! Monetary amounts.
//!
//! An [`Amount`] is a non-negative integer count of minor currency units
//! (e.g. cents). Every entry point parses amounts through the same rule: the
//! input is read as an exact decimal and must be integral and non-negative.
//! Nothing is ever rounded.

use core::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomainError;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_minor_units(units: u64) -> Self {
        Self(units)
    }

    pub fn minor_units(&self) -> u64 {
        self.0
    }

    /// Parse a decimal string (e.g. `"42"`, `"1.0"`).
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let value = Decimal::from_str(raw.trim())
            .map_err(|_| DomainError::validation(format!("TotalAmount: not a number: {raw:?}")))?;
        Self::from_decimal(value)
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, DomainError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::validation("TotalAmount: must not be negative"));
        }
        if !value.fract().is_zero() {
            return Err(DomainError::validation(format!(
                "TotalAmount: {value} is not a whole number of minor units"
            )));
        }
        value
            .trunc()
            .to_u64()
            .map(Self)
            .ok_or_else(|| DomainError::validation("TotalAmount: out of range"))
    }

    /// Render as `major.minor` with two fraction digits.
    pub fn display_major(&self) -> String {
        format!("{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Amount {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("a non-negative whole number of minor currency units")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        Ok(Amount(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        u64::try_from(v)
            .map(Amount)
            .map_err(|_| E::custom("TotalAmount: must not be negative"))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
        let value = Decimal::try_from(v).map_err(|_| E::custom("TotalAmount: out of range"))?;
        Amount::from_decimal(value).map_err(E::custom)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        Amount::parse(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}
