use rust_decimal::Decimal;
use std::str::FromStr;

/// Parses a broker-supplied numeric string into a `Decimal`.
///
/// Broker exports mix US style ("1,234.56") and European style ("12,34")
/// values. The value is always constructed from the cleaned string, never
/// through a binary float.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cleaned = if trimmed.contains('.') && trimmed.contains(',') {
        // "1,234.56" - comma is a thousands separator
        trimmed.replace(',', "")
    } else if trimmed.contains(',') {
        // "12,34" - comma is the decimal separator
        trimmed.replace(',', ".")
    } else {
        trimmed.to_string()
    };

    Decimal::from_str(&cleaned).ok()
}

/// Like [`parse_decimal`] but treats empty/unparseable input as the default.
pub fn parse_decimal_or(raw: Option<&str>, default: Decimal) -> Decimal {
    raw.and_then(parse_decimal).unwrap_or(default)
}

/// Parses an optional field, mapping empty strings to `None`.
pub fn parse_decimal_opt(raw: Option<&str>) -> Option<Decimal> {
    raw.and_then(parse_decimal)
}
