#![allow(dead_code)]

use std::sync::Arc;

use kapsteuer_core::events::{
    RawCashTransactionRecord, RawCorporateActionRecord, RawPositionRecord, RawTradeRecord,
};
use kapsteuer_core::fx::{FxRateProvider, InMemoryRateProvider};
use kapsteuer_core::EngineConfig;

pub fn config_2023() -> EngineConfig {
    EngineConfig::new(2023)
}

/// EUR-only provider; the engine treats EUR as identity so no rates are
/// needed.
pub fn eur_provider() -> Arc<dyn FxRateProvider> {
    Arc::new(InMemoryRateProvider::new(7))
}

pub fn provider_with(rates: &[(&str, &str, &str)]) -> Arc<dyn FxRateProvider> {
    let mut provider = InMemoryRateProvider::new(7);
    for (currency, day, rate) in rates {
        provider.insert(
            currency,
            day.parse().expect("test date"),
            rate.parse().expect("test rate"),
        );
    }
    Arc::new(provider)
}

#[allow(clippy::too_many_arguments)]
pub fn stock_trade(
    symbol: &str,
    conid: &str,
    trade_date: &str,
    quantity: &str,
    price: &str,
    money: &str,
    commission: &str,
    buy_sell: &str,
    open_close: &str,
    tx_id: &str,
) -> RawTradeRecord {
    RawTradeRecord {
        currency: Some("EUR".into()),
        asset_class: Some("STK".into()),
        sub_category: Some("COMMON".into()),
        symbol: Some(symbol.into()),
        description: Some(format!("{} COMMON STOCK", symbol)),
        conid: Some(conid.into()),
        trade_date: Some(trade_date.into()),
        quantity: Some(quantity.into()),
        trade_price: Some(price.into()),
        trade_money: Some(money.into()),
        commission: Some(commission.into()),
        buy_sell: Some(buy_sell.into()),
        open_close_indicator: Some(open_close.into()),
        transaction_id: Some(tx_id.into()),
        ..Default::default()
    }
}

#[allow(clippy::too_many_arguments)]
pub fn option_trade(
    symbol: &str,
    conid: &str,
    underlying_conid: &str,
    put_call: &str,
    trade_date: &str,
    quantity: &str,
    price: &str,
    money: &str,
    commission: &str,
    buy_sell: &str,
    open_close: &str,
    notes: Option<&str>,
    tx_id: &str,
) -> RawTradeRecord {
    RawTradeRecord {
        currency: Some("EUR".into()),
        asset_class: Some("OPT".into()),
        symbol: Some(symbol.into()),
        description: Some(format!("{} OPTION", symbol)),
        conid: Some(conid.into()),
        underlying_conid: Some(underlying_conid.into()),
        underlying_symbol: Some(symbol.split(' ').next().unwrap_or(symbol).into()),
        multiplier: Some("100".into()),
        put_call: Some(put_call.into()),
        trade_date: Some(trade_date.into()),
        quantity: Some(quantity.into()),
        trade_price: Some(price.into()),
        trade_money: Some(money.into()),
        commission: Some(commission.into()),
        buy_sell: Some(buy_sell.into()),
        open_close_indicator: Some(open_close.into()),
        notes_codes: notes.map(String::from),
        transaction_id: Some(tx_id.into()),
        ..Default::default()
    }
}

pub fn eoy_position(symbol: &str, conid: &str, quantity: &str) -> RawPositionRecord {
    RawPositionRecord {
        currency: Some("EUR".into()),
        asset_class: Some("STK".into()),
        symbol: Some(symbol.into()),
        description: Some(format!("{} COMMON STOCK", symbol)),
        conid: Some(conid.into()),
        quantity: Some(quantity.into()),
        ..Default::default()
    }
}

pub fn cash_transaction(
    symbol: Option<&str>,
    conid: Option<&str>,
    settle_date: &str,
    tx_type: &str,
    amount: &str,
    currency: &str,
    tx_id: &str,
) -> RawCashTransactionRecord {
    RawCashTransactionRecord {
        currency: Some(currency.into()),
        asset_class: symbol.map(|_| "STK".into()),
        symbol: symbol.map(String::from),
        description: Some(format!("{} {}", symbol.unwrap_or("ACCOUNT"), tx_type)),
        conid: conid.map(String::from),
        settle_date: Some(settle_date.into()),
        tx_type: Some(tx_type.into()),
        amount: Some(amount.into()),
        transaction_id: Some(tx_id.into()),
        ..Default::default()
    }
}

pub fn corporate_action(
    symbol: &str,
    conid: &str,
    report_date: &str,
    ca_type: &str,
    description: &str,
    quantity: Option<&str>,
    proceeds: Option<&str>,
    value: Option<&str>,
    action_id: &str,
) -> RawCorporateActionRecord {
    RawCorporateActionRecord {
        currency: Some("EUR".into()),
        asset_class: Some("STK".into()),
        symbol: Some(symbol.into()),
        description: Some(description.into()),
        conid: Some(conid.into()),
        report_date: Some(report_date.into()),
        action_id: Some(action_id.into()),
        ca_type: Some(ca_type.into()),
        quantity: quantity.map(String::from),
        proceeds: proceeds.map(String::from),
        value: value.map(String::from),
        ..Default::default()
    }
}
