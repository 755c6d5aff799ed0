use rust_decimal::Decimal;
use std::str::FromStr;

use crate::assets::FundType;

/// Teilfreistellung (partial exemption) rate for a fund type. Rates apply
/// to private investors and shares acquired after 2018-01-01.
pub fn teilfreistellung_rate(fund_type: FundType) -> Decimal {
    match fund_type {
        FundType::Aktienfonds => Decimal::from_str("0.30").expect("static literal"),
        FundType::Mischfonds => Decimal::from_str("0.15").expect("static literal"),
        FundType::Immobilienfonds => Decimal::from_str("0.60").expect("static literal"),
        FundType::AuslandsImmobilienfonds => Decimal::from_str("0.80").expect("static literal"),
        FundType::SonstigeFonds | FundType::None => Decimal::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        assert_eq!(teilfreistellung_rate(FundType::Aktienfonds).to_string(), "0.30");
        assert_eq!(teilfreistellung_rate(FundType::Mischfonds).to_string(), "0.15");
        assert_eq!(teilfreistellung_rate(FundType::Immobilienfonds).to_string(), "0.60");
        assert_eq!(
            teilfreistellung_rate(FundType::AuslandsImmobilienfonds).to_string(),
            "0.80"
        );
        assert_eq!(teilfreistellung_rate(FundType::SonstigeFonds), Decimal::ZERO);
        assert_eq!(teilfreistellung_rate(FundType::None), Decimal::ZERO);
    }
}
