use chrono::{Duration, NaiveDate};
use log::debug;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::fx::fx_errors::FxError;

/// Capability handed in by the host: daily reference rates against EUR.
///
/// `rate` returns "foreign currency units per 1 EUR" for the given day and
/// is expected to fall back up to `max_fallback_days` calendar days earlier
/// when the day itself has no fixing (weekends, holidays). Currency
/// equivalences such as CNH→CNY are the provider's concern.
pub trait FxRateProvider {
    fn rate(&self, day: NaiveDate, currency: &str) -> Result<Decimal, FxError>;

    fn max_fallback_days(&self) -> u32 {
        7
    }
}

/// Deterministic in-memory provider. Production hosts wrap their ECB cache
/// in this shape; tests seed it directly.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRateProvider {
    rates: BTreeMap<(String, NaiveDate), Decimal>,
    fallback_days: u32,
}

impl InMemoryRateProvider {
    pub fn new(fallback_days: u32) -> Self {
        InMemoryRateProvider {
            rates: BTreeMap::new(),
            fallback_days,
        }
    }

    pub fn insert(&mut self, currency: &str, day: NaiveDate, rate: Decimal) {
        self.rates.insert((currency.to_uppercase(), day), rate);
    }

    pub fn with_rate(mut self, currency: &str, day: NaiveDate, rate: Decimal) -> Self {
        self.insert(currency, day, rate);
        self
    }
}

/// Currencies quoted under an equivalent code (offshore yuan trades at the
/// onshore fixing).
fn effective_currency(currency: &str) -> &str {
    match currency {
        "CNH" => "CNY",
        other => other,
    }
}

impl FxRateProvider for InMemoryRateProvider {
    fn rate(&self, day: NaiveDate, currency: &str) -> Result<Decimal, FxError> {
        let currency = effective_currency(&currency.to_uppercase()).to_string();
        if currency == "EUR" {
            return Ok(Decimal::ONE);
        }
        for offset in 0..=self.fallback_days {
            let candidate = day - Duration::days(offset as i64);
            if let Some(rate) = self.rates.get(&(currency.clone(), candidate)) {
                if offset > 0 {
                    debug!(
                        "Rate for {} on {} taken from {} ({} day fallback)",
                        currency, day, candidate, offset
                    );
                }
                return Ok(*rate);
            }
        }
        Err(FxError::RateNotFound(format!(
            "no {} rate within {} days before {}",
            currency, self.fallback_days, day
        )))
    }

    fn max_fallback_days(&self) -> u32 {
        self.fallback_days
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::from_str(s).unwrap()
    }

    #[test]
    fn test_eur_is_identity() {
        let provider = InMemoryRateProvider::new(7);
        assert_eq!(provider.rate(date("2023-06-01"), "EUR").unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_fallback_within_window() {
        let provider = InMemoryRateProvider::new(7).with_rate(
            "USD",
            date("2023-06-01"),
            Decimal::from_str("1.10").unwrap(),
        );
        // Saturday 2023-06-03 falls back to Thursday's fixing.
        assert_eq!(
            provider.rate(date("2023-06-03"), "USD").unwrap(),
            Decimal::from_str("1.10").unwrap()
        );
    }

    #[test]
    fn test_cnh_quotes_at_cny_fixing() {
        let provider = InMemoryRateProvider::new(7).with_rate(
            "CNY",
            date("2023-06-01"),
            Decimal::from_str("7.80").unwrap(),
        );
        assert_eq!(
            provider.rate(date("2023-06-01"), "CNH").unwrap(),
            Decimal::from_str("7.80").unwrap()
        );
    }

    #[test]
    fn test_rate_beyond_window_fails() {
        let provider = InMemoryRateProvider::new(7).with_rate(
            "USD",
            date("2023-06-01"),
            Decimal::from_str("1.10").unwrap(),
        );
        assert!(provider.rate(date("2023-06-09"), "USD").is_err());
    }
}
