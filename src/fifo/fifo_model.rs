use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Per-unit tolerance of the lot consistency invariant:
/// |unit × qty − total| ≤ max(1, qty) × 10⁻⁶.
fn lot_tolerance(quantity: Decimal) -> Decimal {
    let epsilon = Decimal::from_str("0.000001").expect("static literal");
    if quantity > Decimal::ONE {
        quantity * epsilon
    } else {
        epsilon
    }
}

/// One acquisition in a long position. The per-unit cost is the invariant;
/// the remembered total is re-derived after partial consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FifoLot {
    pub acquisition_date: NaiveDate,
    /// Remaining quantity, always positive.
    #[serde(with = "crate::utils::decimal_fmt::quantity")]
    pub quantity: Decimal,
    pub unit_cost_eur: Decimal,
    pub total_cost_eur: Decimal,
    pub source_transaction_id: String,
}

impl FifoLot {
    pub fn new(
        acquisition_date: NaiveDate,
        quantity: Decimal,
        total_cost_eur: Decimal,
        source_transaction_id: String,
    ) -> Self {
        let unit_cost_eur = if quantity.is_zero() {
            Decimal::ZERO
        } else {
            total_cost_eur / quantity
        };
        FifoLot {
            acquisition_date,
            quantity,
            unit_cost_eur,
            total_cost_eur,
            source_transaction_id,
        }
    }

    pub fn invariant_holds(&self) -> bool {
        (self.unit_cost_eur * self.quantity - self.total_cost_eur).abs()
            <= lot_tolerance(self.quantity)
    }
}

/// One opening in a short position; quantities are positive magnitudes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortFifoLot {
    pub opening_date: NaiveDate,
    #[serde(with = "crate::utils::decimal_fmt::quantity")]
    pub quantity: Decimal,
    pub unit_proceeds_eur: Decimal,
    pub total_proceeds_eur: Decimal,
    pub source_transaction_id: String,
}

impl ShortFifoLot {
    pub fn new(
        opening_date: NaiveDate,
        quantity: Decimal,
        total_proceeds_eur: Decimal,
        source_transaction_id: String,
    ) -> Self {
        let unit_proceeds_eur = if quantity.is_zero() {
            Decimal::ZERO
        } else {
            total_proceeds_eur / quantity
        };
        ShortFifoLot {
            opening_date,
            quantity,
            unit_proceeds_eur,
            total_proceeds_eur,
            source_transaction_id,
        }
    }

    pub fn invariant_holds(&self) -> bool {
        (self.unit_proceeds_eur * self.quantity - self.total_proceeds_eur).abs()
            <= lot_tolerance(self.quantity)
    }
}

/// Detail of one lot portion consumed by an option exercise/assignment.
#[derive(Debug, Clone)]
pub struct ConsumedLot {
    pub quantity: Decimal,
    /// Cost per unit for long lots, proceeds per unit for short lots.
    pub unit_value_eur: Decimal,
    pub lot_date: NaiveDate,
    pub source_transaction_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::from_str(s).unwrap()
    }

    #[test]
    fn test_unit_cost_derived_from_total() {
        let lot = FifoLot::new(
            date("2023-03-01"),
            Decimal::from_str("10").unwrap(),
            Decimal::from_str("101.00").unwrap(),
            "T1".into(),
        );
        assert_eq!(lot.unit_cost_eur, Decimal::from_str("10.10").unwrap());
        assert!(lot.invariant_holds());
    }

    #[test]
    fn test_invariant_detects_drift() {
        let mut lot = FifoLot::new(
            date("2023-03-01"),
            Decimal::from_str("10").unwrap(),
            Decimal::from_str("101.00").unwrap(),
            "T1".into(),
        );
        lot.total_cost_eur += Decimal::from_str("0.01").unwrap();
        assert!(!lot.invariant_holds());
    }

    #[test]
    fn test_small_quantity_uses_absolute_tolerance() {
        let lot = FifoLot::new(
            date("2023-03-01"),
            Decimal::from_str("0.001").unwrap(),
            Decimal::from_str("1").unwrap(),
            "T1".into(),
        );
        assert!(lot.invariant_holds());
    }
}
