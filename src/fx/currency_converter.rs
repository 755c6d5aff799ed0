use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::fx::fx_errors::FxError;
use crate::fx::fx_traits::FxRateProvider;

/// Converts foreign amounts to EUR using transaction-date rates.
///
/// Provider rates are foreign units per 1 EUR, so the EUR value is the
/// foreign amount divided by the rate. Division runs at full precision;
/// quantization happens only at reporting time.
pub struct CurrencyConverter {
    provider: Arc<dyn FxRateProvider>,
}

impl CurrencyConverter {
    pub fn new(provider: Arc<dyn FxRateProvider>) -> Self {
        CurrencyConverter { provider }
    }

    pub fn convert_to_eur(
        &self,
        amount: Decimal,
        currency: &str,
        day: NaiveDate,
    ) -> Result<Decimal, FxError> {
        let currency = currency.trim().to_uppercase();
        if currency.is_empty() {
            return Err(FxError::ConversionError(format!(
                "missing currency for amount {} on {}",
                amount, day
            )));
        }
        if amount.is_zero() {
            return Ok(Decimal::ZERO);
        }
        if currency == "EUR" {
            return Ok(amount);
        }

        let rate = self.provider.rate(day, &currency)?;
        if rate <= Decimal::ZERO {
            return Err(FxError::InvalidRate(format!(
                "rate {} for {} on {} is not positive",
                rate, currency, day
            )));
        }
        Ok(amount / rate)
    }
}
