use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::constants::{
    ALIAS_PREFIX_CASH, ALIAS_PREFIX_CONID, ALIAS_PREFIX_ISIN, ALIAS_PREFIX_SYMBOL,
};

/// Internal asset identifier. Allocated sequentially by the resolver so a
/// run over identical inputs produces identical ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct AssetId(pub u64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}

/// Tax-relevant instrument categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssetCategory {
    Stock,
    Bond,
    InvestmentFund,
    Option,
    Cfd,
    PrivateSaleAsset,
    CashBalance,
    Unknown,
}

impl AssetCategory {
    /// Ordering slot inside the deterministic event sort key.
    pub fn sort_rank(&self) -> u8 {
        match self {
            AssetCategory::Stock => 0,
            AssetCategory::Bond => 1,
            AssetCategory::InvestmentFund => 2,
            AssetCategory::Option => 3,
            AssetCategory::Cfd => 4,
            AssetCategory::PrivateSaleAsset => 5,
            AssetCategory::CashBalance => 6,
            AssetCategory::Unknown => 7,
        }
    }

    /// Rank used when two assets sharing an alias are merged; the more
    /// concrete category survives.
    pub fn concreteness_rank(&self) -> u8 {
        match self {
            AssetCategory::CashBalance => 0,
            AssetCategory::InvestmentFund => 1,
            AssetCategory::Option => 2,
            AssetCategory::Cfd => 3,
            AssetCategory::Stock => 4,
            AssetCategory::Bond => 5,
            AssetCategory::PrivateSaleAsset => 6,
            AssetCategory::Unknown => 9,
        }
    }

    pub fn is_derivative(&self) -> bool {
        matches!(self, AssetCategory::Option | AssetCategory::Cfd)
    }
}

/// Investment fund types with distinct Teilfreistellung treatment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum FundType {
    Aktienfonds,
    Mischfonds,
    Immobilienfonds,
    AuslandsImmobilienfonds,
    SonstigeFonds,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PutCall {
    Put,
    Call,
}

impl PutCall {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "P" | "PUT" => Some(PutCall::Put),
            "C" | "CALL" => Some(PutCall::Call),
            _ => None,
        }
    }
}

/// Extension carried by options and CFDs: the contract terms and the link
/// to the underlying instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivativeSpec {
    pub underlying_asset_id: Option<AssetId>,
    pub underlying_conid: Option<String>,
    pub underlying_symbol: Option<String>,
    pub multiplier: Decimal,
    pub put_call: Option<PutCall>,
    pub strike: Option<Decimal>,
    pub expiry: Option<NaiveDate>,
}

impl DerivativeSpec {
    pub fn new(multiplier: Decimal) -> Self {
        DerivativeSpec {
            underlying_asset_id: None,
            underlying_conid: None,
            underlying_symbol: None,
            multiplier,
            put_call: None,
            strike: None,
            expiry: None,
        }
    }
}

/// Where a description (or asset sighting) originated. Drives the
/// source-precedence rule when updating an asset's description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DescriptionSource {
    Trade,
    Position,
    CashTransaction,
    CorporateAction,
    Generated,
}

/// Canonical instrument. One `Asset` exists per real-world instrument no
/// matter how many identifier spellings the input files use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    /// All known string identifiers (`ISIN:…`, `CONID:…`, `SYMBOL:…`,
    /// `CASH_BALANCE:…`). Kept sorted for stable iteration.
    pub aliases: BTreeSet<String>,
    pub description: Option<String>,
    pub currency: Option<String>,
    pub category: AssetCategory,
    pub fund_type: FundType,

    pub isin: Option<String>,
    pub conid: Option<String>,
    pub symbol: Option<String>,
    pub raw_asset_class: Option<String>,
    pub raw_sub_category: Option<String>,

    pub derivative: Option<DerivativeSpec>,

    // Start-of-year snapshot from the positions report.
    pub soy_quantity: Option<Decimal>,
    pub soy_cost_basis_amount: Option<Decimal>,
    pub soy_cost_basis_currency: Option<String>,

    // End-of-year snapshot from the positions report.
    pub eoy_quantity: Option<Decimal>,
    pub eoy_market_price: Option<Decimal>,
    pub eoy_price_currency: Option<String>,
    pub eoy_position_value: Option<Decimal>,
}

impl Asset {
    pub fn new(id: AssetId, category: AssetCategory) -> Self {
        Asset {
            id,
            aliases: BTreeSet::new(),
            description: None,
            currency: None,
            category,
            fund_type: FundType::None,
            isin: None,
            conid: None,
            symbol: None,
            raw_asset_class: None,
            raw_sub_category: None,
            derivative: None,
            soy_quantity: None,
            soy_cost_basis_amount: None,
            soy_cost_basis_currency: None,
            eoy_quantity: None,
            eoy_market_price: None,
            eoy_price_currency: None,
            eoy_position_value: None,
        }
    }

    pub fn add_alias(&mut self, alias: impl Into<String>) {
        let alias = alias.into();
        if !alias.is_empty() {
            self.aliases.insert(alias);
        }
    }

    /// Stable key identifying this instrument across runs.
    /// Priority: ISIN > CONID > cash-balance currency > symbol.
    pub fn identity_key(&self) -> String {
        if let Some(isin) = &self.isin {
            return format!("{}{}", ALIAS_PREFIX_ISIN, isin);
        }
        if let Some(conid) = &self.conid {
            return format!("{}{}", ALIAS_PREFIX_CONID, conid);
        }
        if self.category == AssetCategory::CashBalance {
            if let Some(ccy) = &self.currency {
                return format!("{}{}", ALIAS_PREFIX_CASH, ccy);
            }
        }
        if let Some(symbol) = &self.symbol {
            if let Some(class) = &self.raw_asset_class {
                return format!("{}{}_{}", ALIAS_PREFIX_SYMBOL, symbol, class);
            }
            return format!("{}{}", ALIAS_PREFIX_SYMBOL, symbol);
        }
        format!("ASSET:{}", self.id)
    }

    /// Multiplier for derivative contracts, 1 otherwise.
    pub fn multiplier(&self) -> Decimal {
        self.derivative
            .as_ref()
            .map(|d| d.multiplier)
            .filter(|m| !m.is_zero())
            .unwrap_or(Decimal::ONE)
    }

    pub fn display_label(&self) -> String {
        self.symbol
            .clone()
            .or_else(|| self.description.clone())
            .unwrap_or_else(|| self.identity_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_identity_key_priority() {
        let mut asset = Asset::new(AssetId(1), AssetCategory::Stock);
        asset.symbol = Some("AAPL".into());
        asset.raw_asset_class = Some("STK".into());
        assert_eq!(asset.identity_key(), "SYMBOL:AAPL_STK");

        asset.conid = Some("265598".into());
        assert_eq!(asset.identity_key(), "CONID:265598");

        asset.isin = Some("US0378331005".into());
        assert_eq!(asset.identity_key(), "ISIN:US0378331005");
    }

    #[test]
    fn test_cash_balance_identity_key() {
        let mut asset = Asset::new(AssetId(2), AssetCategory::CashBalance);
        asset.currency = Some("EUR".into());
        assert_eq!(asset.identity_key(), "CASH_BALANCE:EUR");
    }

    #[test]
    fn test_multiplier_defaults_to_one() {
        let mut asset = Asset::new(AssetId(3), AssetCategory::Option);
        assert_eq!(asset.multiplier(), Decimal::ONE);

        asset.derivative = Some(DerivativeSpec::new(Decimal::from_str("100").unwrap()));
        assert_eq!(asset.multiplier(), Decimal::from_str("100").unwrap());
    }

    #[test]
    fn test_empty_alias_ignored() {
        let mut asset = Asset::new(AssetId(4), AssetCategory::Unknown);
        asset.add_alias("");
        assert!(asset.aliases.is_empty());
    }
}
