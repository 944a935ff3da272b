//! # Token Amounts
//!
//! Amounts are denominated in the asset's smallest unit and carried as
//! `u128`. That covers 18-decimal tokens up to ~3.4 × 10²⁰ whole units,
//! which is far beyond anything an escrow will ever hold.
//!
//! JSON cannot carry a `u128` through JavaScript without losing precision,
//! so every amount on the wire is a decimal string. [`as_decimal_str`] is the
//! serde adapter for that.

/// An amount of an asset in its smallest unit.
pub type Amount = u128;

/// Fixed-point unit (1.0) for indexes and rates, 18 decimals.
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Computes `a * b / denominator` without overflowing the intermediate
/// product for the operand sizes used here (one side is always a WAD-scaled
/// index). Rounds down. Returns `None` on division by zero or overflow.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    let whole = (a / denominator).checked_mul(b)?;
    let rem = (a % denominator).checked_mul(b)? / denominator;
    whole.checked_add(rem)
}

/// Serde adapter serializing an [`Amount`] as a base-10 string.
///
/// Deserialization also accepts plain JSON integers so hand-written requests
/// like `{"amount": 100}` keep working.
pub mod as_decimal_str {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        // Binary formats (bincode snapshots) are not self-describing.
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(AmountVisitor)
        } else {
            deserializer.deserialize_string(AmountVisitor)
        }
    }

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or a decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(v as u128)
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom("amount must not be negative"))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            v.trim()
                .parse::<u128>()
                .map_err(|e| E::custom(format!("invalid amount {v:?}: {e}")))
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<u128, E> {
            self.visit_str(&v)
        }
    }
}
