//! Serde shapes for the engine's decimal fields.
//!
//! Figures always serialize as strings so a JSON round-trip never passes
//! through a binary float. Quantities are quantized to the ledger's
//! quantity scale with the engine's default half-up rounding; per-unit
//! amounts keep their full internal precision, reporting quantization
//! being the aggregator's job.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{de, Deserialize, Deserializer, Serializer};
use std::str::FromStr;

use crate::constants::QUANTITY_SCALE;

/// Lot and realization quantities, quantized to [`QUANTITY_SCALE`] places.
pub mod quantity {
    use super::*;

    pub fn serialize<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let quantized =
            value.round_dp_with_strategy(QUANTITY_SCALE, RoundingStrategy::MidpointAwayFromZero);
        serializer.serialize_str(&quantized.normalize().to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Decimal::from_str(&raw)
            .map_err(|err| de::Error::custom(format!("invalid quantity '{}': {}", raw, err)))
    }
}

/// Optional amounts and rates, serialized at full internal precision.
pub mod optional_amount {
    use super::*;

    pub fn serialize<S>(value: &Option<Decimal>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(amount) => serializer.serialize_some(&amount.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => Decimal::from_str(&raw)
                .map(Some)
                .map_err(|err| de::Error::custom(format!("invalid amount '{}': {}", raw, err))),
            None => Ok(None),
        }
    }
}
