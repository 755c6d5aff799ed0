/// Decimal scale used when quantities are compared or quantized internally.
pub const QUANTITY_SCALE: u32 = 8;

/// Decimal scale for reported monetary amounts (EUR, two places).
pub const AMOUNT_SCALE: u32 = 2;

/// Decimal scale for reported per-share values.
pub const PER_SHARE_SCALE: u32 = 6;

/// Alias prefixes used by the asset resolver. Every identifier that enters
/// the alias map is normalized into one of these namespaces.
pub const ALIAS_PREFIX_ISIN: &str = "ISIN:";
pub const ALIAS_PREFIX_CONID: &str = "CONID:";
pub const ALIAS_PREFIX_SYMBOL: &str = "SYMBOL:";
pub const ALIAS_PREFIX_CASH: &str = "CASH_BALANCE:";

/// Source-transaction id prefixes for lots that do not originate from a
/// broker trade row.
pub const SOY_SIMULATED_TX_PREFIX: &str = "SOY_SIMULATED";
pub const SOY_FALLBACK_TX_PREFIX: &str = "SOY_FALLBACK";
pub const SOY_FALLBACK_SHORT_TX_PREFIX: &str = "SOY_FALLBACK_SHORT";
pub const STOCK_DIVIDEND_TX_PREFIX: &str = "STOCKDIV";

/// Symbol suffix of broker-internal dividend receivable instruments. Rows
/// for these phantoms never create lots.
pub const RECEIVABLE_SYMBOL_SUFFIX: &str = ".REC";

/// Holding period (days) at or below which a §23 EStG private sale stays
/// inside the speculation period.
pub const SECTION_23_SPECULATION_DAYS: i64 = 365;

/// Cap applied to the conceptual net derivative loss summary. Form figures
/// are never capped.
pub const DERIVATIVE_LOSS_CAP_EUR: &str = "-20000";
