use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const KES_CURRENCY_CODE: &str = "KES";

//--------------------------------------       Money        ----------------------------------------------------------
/// An escrow amount in whole currency units.
///
/// Amounts are opaque as far as this engine is concerned: they are displayed and compared, but never added or
/// converted. The remote authority is the only party that does monetary arithmetic, so `Money` intentionally
/// implements no operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Money(i64);

impl From<Money> for i64 {
    fn from(value: Money) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as an escrow amount: {0}")]
pub struct MoneyConversionError(String);

impl TryFrom<i64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 {
            Err(MoneyConversionError(format!("Amount {value} is negative")))
        } else {
            Ok(Self(value))
        }
    }
}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Amount {value} is too large")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits = self.0.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        write!(f, "{grouped}")
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }
}
