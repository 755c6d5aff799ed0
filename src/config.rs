use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Rounding mode applied when amounts are quantized for reporting.
/// Internal arithmetic always runs at full `rust_decimal` precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundingMode {
    RoundHalfUp,
    RoundHalfEven,
}

impl RoundingMode {
    pub fn strategy(&self) -> RoundingStrategy {
        match self {
            RoundingMode::RoundHalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::RoundHalfEven => RoundingStrategy::MidpointNearestEven,
        }
    }
}

/// Configuration surface of the engine. The host constructs one per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tax year being processed. Events outside it never reach an aggregate.
    pub tax_year: i32,
    /// Minimum significant digits for internal arithmetic. `rust_decimal`
    /// carries 28-29 digits, which is the floor this engine requires.
    pub internal_precision: usize,
    pub rounding_mode: RoundingMode,
    /// Scale for reported amounts (EUR), e.g. 0.01.
    pub output_precision_amount: Decimal,
    /// Scale for reported per-share values, e.g. 0.000001.
    pub output_precision_per_share: Decimal,
    /// Calendar days an `FxRateProvider` may step back when a rate is
    /// missing on the requested day.
    pub max_fx_fallback_days: u32,
    /// Absolute tolerance for the end-of-year quantity reconciliation.
    pub eoy_quantity_tolerance: Decimal,
    /// Whether the conceptual net derivative loss summary applies the
    /// 20,000 EUR cap. Form line figures are never capped.
    pub apply_derivative_loss_cap: bool,
}

impl EngineConfig {
    pub fn new(tax_year: i32) -> Self {
        EngineConfig {
            tax_year,
            ..Default::default()
        }
    }

    pub fn amount_scale(&self) -> u32 {
        self.output_precision_amount.scale()
    }

    pub fn per_share_scale(&self) -> u32 {
        self.output_precision_per_share.scale()
    }

    /// Quantizes a reported amount to the configured output precision.
    pub fn quantize_amount(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.amount_scale(), self.rounding_mode.strategy())
    }

    /// Quantizes a per-share value to the configured output precision.
    pub fn quantize_per_share(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.per_share_scale(), self.rounding_mode.strategy())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            tax_year: 2023,
            internal_precision: 28,
            rounding_mode: RoundingMode::RoundHalfUp,
            output_precision_amount: Decimal::from_str("0.01").unwrap(),
            output_precision_per_share: Decimal::from_str("0.000001").unwrap(),
            max_fx_fallback_days: 7,
            eoy_quantity_tolerance: Decimal::from_str("0.000001").unwrap(),
            apply_derivative_loss_cap: true,
        }
    }
}
