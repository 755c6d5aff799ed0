use serde::{Deserialize, Serialize};

/// Raw broker rows, one struct per flex-report section. All values stay
/// strings until the event factory parses them; decimals are always
/// constructed from the source text, never through a float.
///
/// Field aliases match the broker's CSV headers so the host can feed
/// deserialized rows straight in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTradeRecord {
    #[serde(default, alias = "ClientAccountID")]
    pub account_id: Option<String>,
    #[serde(default, alias = "CurrencyPrimary")]
    pub currency: Option<String>,
    #[serde(default, alias = "AssetClass")]
    pub asset_class: Option<String>,
    #[serde(default, alias = "SubCategory")]
    pub sub_category: Option<String>,
    #[serde(default, alias = "Symbol")]
    pub symbol: Option<String>,
    #[serde(default, alias = "Description")]
    pub description: Option<String>,
    #[serde(default, alias = "ISIN")]
    pub isin: Option<String>,
    #[serde(default, alias = "SecurityID")]
    pub security_id: Option<String>,
    #[serde(default, alias = "SecurityIDType")]
    pub security_id_type: Option<String>,
    #[serde(default, alias = "Conid")]
    pub conid: Option<String>,
    #[serde(default, alias = "UnderlyingConid")]
    pub underlying_conid: Option<String>,
    #[serde(default, alias = "UnderlyingSymbol")]
    pub underlying_symbol: Option<String>,
    #[serde(default, alias = "Multiplier")]
    pub multiplier: Option<String>,
    #[serde(default, alias = "Strike")]
    pub strike: Option<String>,
    #[serde(default, alias = "Expiry")]
    pub expiry: Option<String>,
    #[serde(default, alias = "Put/Call")]
    pub put_call: Option<String>,
    #[serde(default, alias = "TradeID")]
    pub trade_id: Option<String>,
    #[serde(default, alias = "ReportDate")]
    pub report_date: Option<String>,
    #[serde(default, alias = "TradeDate")]
    pub trade_date: Option<String>,
    #[serde(default, alias = "TradeTime")]
    pub trade_time: Option<String>,
    #[serde(default, alias = "SettleDateTarget")]
    pub settle_date: Option<String>,
    #[serde(default, alias = "Quantity")]
    pub quantity: Option<String>,
    #[serde(default, alias = "TradePrice")]
    pub trade_price: Option<String>,
    #[serde(default, alias = "TradeMoney")]
    pub trade_money: Option<String>,
    #[serde(default, alias = "Proceeds")]
    pub proceeds: Option<String>,
    #[serde(default, alias = "IBCommission")]
    pub commission: Option<String>,
    #[serde(default, alias = "IBCommissionCurrency")]
    pub commission_currency: Option<String>,
    #[serde(default, alias = "Open/CloseIndicator")]
    pub open_close_indicator: Option<String>,
    #[serde(default, alias = "Notes/Codes")]
    pub notes_codes: Option<String>,
    #[serde(default, alias = "Buy/Sell")]
    pub buy_sell: Option<String>,
    #[serde(default, alias = "TransactionID")]
    pub transaction_id: Option<String>,
}

impl RawTradeRecord {
    /// Broker transaction id with the trade id as fallback.
    pub fn primary_tx_id(&self) -> Option<&str> {
        self.transaction_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.trade_id.as_deref().filter(|s| !s.trim().is_empty()))
    }

    pub fn isin_or_security_id(&self) -> Option<String> {
        if self.isin.as_deref().map_or(false, |s| !s.trim().is_empty()) {
            return self.isin.clone();
        }
        if self.security_id_type.as_deref() == Some("ISIN") {
            return self.security_id.clone();
        }
        None
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCashTransactionRecord {
    #[serde(default, alias = "CurrencyPrimary")]
    pub currency: Option<String>,
    #[serde(default, alias = "AssetClass")]
    pub asset_class: Option<String>,
    #[serde(default, alias = "SubCategory")]
    pub sub_category: Option<String>,
    #[serde(default, alias = "Symbol")]
    pub symbol: Option<String>,
    #[serde(default, alias = "Description")]
    pub description: Option<String>,
    #[serde(default, alias = "ISIN")]
    pub isin: Option<String>,
    #[serde(default, alias = "SecurityID")]
    pub security_id: Option<String>,
    #[serde(default, alias = "SecurityIDType")]
    pub security_id_type: Option<String>,
    #[serde(default, alias = "Conid")]
    pub conid: Option<String>,
    #[serde(default, alias = "ReportDate")]
    pub report_date: Option<String>,
    #[serde(default, alias = "DateTime")]
    pub date_time: Option<String>,
    #[serde(default, alias = "SettleDate")]
    pub settle_date: Option<String>,
    /// E.g. "Dividends", "Withholding Tax", "Broker Interest Received".
    #[serde(default, alias = "Type")]
    pub tx_type: Option<String>,
    #[serde(default, alias = "Amount")]
    pub amount: Option<String>,
    #[serde(default, alias = "TransactionID")]
    pub transaction_id: Option<String>,
    #[serde(default, alias = "Code")]
    pub code: Option<String>,
    #[serde(default, alias = "IssuerCountryCode")]
    pub issuer_country_code: Option<String>,
}

impl RawCashTransactionRecord {
    pub fn isin_or_security_id(&self) -> Option<String> {
        if self.isin.as_deref().map_or(false, |s| !s.trim().is_empty()) {
            return self.isin.clone();
        }
        if self.security_id_type.as_deref() == Some("ISIN") {
            return self.security_id.clone();
        }
        None
    }

    /// True when the row references a concrete instrument rather than the
    /// account's cash balance.
    pub fn is_instrument_specific(&self) -> bool {
        let has_isin = self.isin_or_security_id().is_some();
        let has_conid = self.conid.as_deref().map_or(false, |s| !s.trim().is_empty());
        let symbol_is_currency = match (&self.symbol, &self.currency) {
            (Some(symbol), Some(ccy)) => {
                symbol.trim().to_uppercase() == ccy.trim().to_uppercase()
            }
            _ => true,
        };
        has_isin || has_conid || !symbol_is_currency
    }
}

/// Start- and end-of-year position snapshot rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPositionRecord {
    #[serde(default, alias = "CurrencyPrimary")]
    pub currency: Option<String>,
    #[serde(default, alias = "AssetClass")]
    pub asset_class: Option<String>,
    #[serde(default, alias = "SubCategory")]
    pub sub_category: Option<String>,
    #[serde(default, alias = "Symbol")]
    pub symbol: Option<String>,
    #[serde(default, alias = "Description")]
    pub description: Option<String>,
    #[serde(default, alias = "ISIN")]
    pub isin: Option<String>,
    #[serde(default, alias = "Conid")]
    pub conid: Option<String>,
    #[serde(default, alias = "UnderlyingConid")]
    pub underlying_conid: Option<String>,
    #[serde(default, alias = "UnderlyingSymbol")]
    pub underlying_symbol: Option<String>,
    #[serde(default, alias = "Multiplier")]
    pub multiplier: Option<String>,
    #[serde(default, alias = "Strike")]
    pub strike: Option<String>,
    #[serde(default, alias = "Expiry")]
    pub expiry: Option<String>,
    #[serde(default, alias = "Put/Call")]
    pub put_call: Option<String>,
    #[serde(default, alias = "Quantity")]
    pub quantity: Option<String>,
    #[serde(default, alias = "MarkPrice")]
    pub mark_price: Option<String>,
    #[serde(default, alias = "PositionValue")]
    pub position_value: Option<String>,
    #[serde(default, alias = "CostBasisMoney")]
    pub cost_basis_money: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCorporateActionRecord {
    #[serde(default, alias = "CurrencyPrimary")]
    pub currency: Option<String>,
    #[serde(default, alias = "AssetClass")]
    pub asset_class: Option<String>,
    #[serde(default, alias = "Symbol")]
    pub symbol: Option<String>,
    #[serde(default, alias = "Description")]
    pub description: Option<String>,
    #[serde(default, alias = "ISIN")]
    pub isin: Option<String>,
    #[serde(default, alias = "Conid")]
    pub conid: Option<String>,
    #[serde(default, alias = "Report Date")]
    pub report_date: Option<String>,
    #[serde(default, alias = "ActionID")]
    pub action_id: Option<String>,
    #[serde(default, alias = "ActionDescription")]
    pub action_description: Option<String>,
    /// FS, TC, HI, SD, DI, ED.
    #[serde(default, alias = "Type")]
    pub ca_type: Option<String>,
    #[serde(default, alias = "Quantity")]
    pub quantity: Option<String>,
    #[serde(default, alias = "Proceeds")]
    pub proceeds: Option<String>,
    #[serde(default, alias = "Value")]
    pub value: Option<String>,
    #[serde(default, alias = "TransactionID")]
    pub transaction_id: Option<String>,
    #[serde(default, alias = "PayDate")]
    pub pay_date: Option<String>,
    #[serde(default, alias = "ExDate")]
    pub ex_date: Option<String>,
}
