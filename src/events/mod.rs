pub(crate) mod events_errors;
pub(crate) mod events_factory;
pub(crate) mod events_model;
pub(crate) mod events_sort;
pub(crate) mod raw_models;

pub use events_errors::EventError;
pub use events_factory::EventFactory;
pub use events_model::{
    CashFlowDetails, CashFlowKind, CorporateActionDetails, CorporateActionKind,
    CurrencyConversionDetails, EventId, EventPayload, FinancialEvent, OptionLifecycleDetails,
    OptionLifecycleKind, TradeDetails, TradeDirection, WithholdingTaxDetails,
};
pub use events_sort::{sort_events, EventSortKey};
pub use raw_models::{
    RawCashTransactionRecord, RawCorporateActionRecord, RawPositionRecord, RawTradeRecord,
};
