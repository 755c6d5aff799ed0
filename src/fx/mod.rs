pub(crate) mod currency_converter;
pub(crate) mod enrichment;
pub(crate) mod fx_errors;
pub(crate) mod fx_traits;

pub use currency_converter::CurrencyConverter;
pub use enrichment::enrich_events;
pub use fx_errors::FxError;
pub use fx_traits::{FxRateProvider, InMemoryRateProvider};
