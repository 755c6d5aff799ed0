use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::assets::AssetId;

/// Event identifier, unique per event object even when source rows share a
/// broker transaction id. Allocated sequentially so runs over identical
/// inputs order identically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    BuyLong,
    SellLong,
    SellShortOpen,
    BuyShortCover,
}

impl TradeDirection {
    pub fn is_acquisition(&self) -> bool {
        matches!(self, TradeDirection::BuyLong | TradeDirection::SellShortOpen)
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, TradeDirection::BuyLong | TradeDirection::BuyShortCover)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeDetails {
    pub direction: TradeDirection,
    /// Quantity as reported: positive for buys, negative for sells.
    pub quantity: Decimal,
    pub price_foreign: Decimal,
    pub commission_foreign: Decimal,
    pub commission_currency: Option<String>,
    pub commission_eur: Option<Decimal>,
    /// Cost basis (buys) or net proceeds (sells) in EUR including
    /// commission; populated by enrichment, adjusted by the option linker.
    pub net_value_eur: Option<Decimal>,
    /// Back-reference to the exercise/assignment this trade settles.
    pub related_option_event: Option<EventId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashFlowKind {
    DividendCash,
    DistributionFund,
    InterestReceived,
    InterestPaidStueckzinsen,
    PaymentInLieuDividend,
    CapitalRepayment,
    /// Engine-created: the part of a capital repayment that exceeded the
    /// remaining cost basis. Taxable like a dividend regardless of the
    /// asset's category.
    CapitalRepaymentExcess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowDetails {
    pub kind: CashFlowKind,
    pub source_country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithholdingTaxDetails {
    pub source_country: Option<String>,
    /// Populated by the withholding-tax linker.
    pub taxed_income_event: Option<EventId>,
    pub link_confidence: Option<u8>,
    pub effective_rate: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CorporateActionKind {
    /// Forward split; ratio is new shares per old share.
    SplitForward { ratio: Decimal },
    /// Acquisition for cash.
    MergerCash {
        cash_per_share_foreign: Decimal,
        cash_per_share_eur: Option<Decimal>,
        quantity_disposed: Decimal,
    },
    /// Stock-for-stock merger. Recognized; lot conversion is not performed.
    MergerStock {
        new_asset_id: AssetId,
        new_shares_per_old: Decimal,
    },
    StockDividend {
        quantity_new_shares: Decimal,
        fmv_per_share_foreign: Option<Decimal>,
        fmv_per_share_eur: Option<Decimal>,
    },
    /// DI rows: dividend rights booked into a phantom instrument.
    DividendRightsIssue,
    /// ED rows: dividend rights expire, usually paired with a cash row.
    ExpireDividendRights,
    /// Unrecognized corporate action; carried for diagnostics only.
    Other { code: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorporateActionDetails {
    pub kind: CorporateActionKind,
    pub ca_action_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionLifecycleKind {
    Exercise,
    Assignment,
    ExpirationWorthless,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionLifecycleDetails {
    pub kind: OptionLifecycleKind,
    /// Contracts involved (positive).
    pub contracts: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyConversionDetails {
    pub from_currency: String,
    pub from_amount: Decimal,
    pub to_currency: String,
    pub to_amount: Decimal,
    pub exchange_rate: Decimal,
}

/// Tagged event body. Downstream consumers match on the variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Trade(TradeDetails),
    CashFlow(CashFlowDetails),
    WithholdingTax(WithholdingTaxDetails),
    CorporateAction(CorporateActionDetails),
    OptionLifecycle(OptionLifecycleDetails),
    CurrencyConversion(CurrencyConversionDetails),
    Fee,
}

impl EventPayload {
    /// Intra-day processing tier: corporate actions adjust lots before any
    /// realization on the same date, option lifecycle events precede the
    /// stock trades they trigger, cash flows come last.
    pub fn sort_tier(&self) -> u8 {
        match self {
            EventPayload::CorporateAction(_) => 0,
            EventPayload::OptionLifecycle(_) => 1,
            EventPayload::Trade(_) | EventPayload::CurrencyConversion(_) => 2,
            EventPayload::CashFlow(_) | EventPayload::WithholdingTax(_) | EventPayload::Fee => 3,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            EventPayload::Trade(t) => match t.direction {
                TradeDirection::BuyLong => "TRADE_BUY_LONG",
                TradeDirection::SellLong => "TRADE_SELL_LONG",
                TradeDirection::SellShortOpen => "TRADE_SELL_SHORT_OPEN",
                TradeDirection::BuyShortCover => "TRADE_BUY_SHORT_COVER",
            },
            EventPayload::CashFlow(c) => match c.kind {
                CashFlowKind::DividendCash => "DIVIDEND_CASH",
                CashFlowKind::DistributionFund => "DISTRIBUTION_FUND",
                CashFlowKind::InterestReceived => "INTEREST_RECEIVED",
                CashFlowKind::InterestPaidStueckzinsen => "INTEREST_PAID_STUECKZINSEN",
                CashFlowKind::PaymentInLieuDividend => "PAYMENT_IN_LIEU_DIVIDEND",
                CashFlowKind::CapitalRepayment => "CAPITAL_REPAYMENT",
                CashFlowKind::CapitalRepaymentExcess => "CAPITAL_REPAYMENT_EXCESS",
            },
            EventPayload::WithholdingTax(_) => "WITHHOLDING_TAX",
            EventPayload::CorporateAction(ca) => match ca.kind {
                CorporateActionKind::SplitForward { .. } => "CORP_SPLIT_FORWARD",
                CorporateActionKind::MergerCash { .. } => "CORP_MERGER_CASH",
                CorporateActionKind::MergerStock { .. } => "CORP_MERGER_STOCK",
                CorporateActionKind::StockDividend { .. } => "CORP_STOCK_DIVIDEND",
                CorporateActionKind::DividendRightsIssue => "CORP_DIVIDEND_RIGHTS_ISSUE",
                CorporateActionKind::ExpireDividendRights => "CORP_EXPIRE_DIVIDEND_RIGHTS",
                CorporateActionKind::Other { .. } => "CORP_OTHER",
            },
            EventPayload::OptionLifecycle(o) => match o.kind {
                OptionLifecycleKind::Exercise => "OPTION_EXERCISE",
                OptionLifecycleKind::Assignment => "OPTION_ASSIGNMENT",
                OptionLifecycleKind::ExpirationWorthless => "OPTION_EXPIRATION_WORTHLESS",
            },
            EventPayload::CurrencyConversion(_) => "CURRENCY_CONVERSION",
            EventPayload::Fee => "FEE_TRANSACTION",
        }
    }
}

/// One financial event flowing through the pipeline. Immutable once
/// enriched, except for the EUR fields written by enrichment and the
/// linker back-references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialEvent {
    pub id: EventId,
    pub asset_id: AssetId,
    pub date: NaiveDate,
    /// Gross amount in the event's own currency, when the row carries one.
    pub gross_amount_foreign: Option<Decimal>,
    pub currency: Option<String>,
    /// Populated by FX enrichment.
    pub gross_amount_eur: Option<Decimal>,
    pub broker_transaction_id: Option<String>,
    pub description: Option<String>,
    pub notes_codes: Option<String>,
    pub payload: EventPayload,
}

impl FinancialEvent {
    pub fn trade(&self) -> Option<&TradeDetails> {
        match &self.payload {
            EventPayload::Trade(details) => Some(details),
            _ => None,
        }
    }

    pub fn trade_mut(&mut self) -> Option<&mut TradeDetails> {
        match &mut self.payload {
            EventPayload::Trade(details) => Some(details),
            _ => None,
        }
    }

    /// Short context string used in fatal error messages.
    pub fn context(&self) -> String {
        format!(
            "{} {} on {} (tx: {}, asset: {})",
            self.id,
            self.payload.type_name(),
            self.date,
            self.broker_transaction_id.as_deref().unwrap_or("n/a"),
            self.asset_id,
        )
    }
}
