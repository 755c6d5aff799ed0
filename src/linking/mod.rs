pub(crate) mod dividend_rights;
pub(crate) mod option_trade_linker;
pub(crate) mod withholding_tax_linker;

pub use dividend_rights::reattribute_dividend_rights;
pub use option_trade_linker::link_option_trades;
pub use withholding_tax_linker::{link_withholding_tax, WithholdingTaxLink};
