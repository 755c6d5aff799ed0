use log::{debug, error, warn};
use regex::Regex;
use rust_decimal::Decimal;

use crate::assets::{AssetCategory, AssetLookup, AssetResolver, DescriptionSource};
use crate::constants::RECEIVABLE_SYMBOL_SUFFIX;
use crate::events::events_errors::EventError;
use crate::events::events_model::{
    CashFlowDetails, CashFlowKind, CorporateActionDetails, CorporateActionKind,
    CurrencyConversionDetails, EventId, EventPayload, FinancialEvent, OptionLifecycleDetails,
    OptionLifecycleKind, TradeDetails, TradeDirection, WithholdingTaxDetails,
};
use crate::events::raw_models::{
    RawCashTransactionRecord, RawCorporateActionRecord, RawTradeRecord,
};
use crate::utils::date_utils::parse_broker_date;
use crate::utils::decimal_utils::{parse_decimal_opt, parse_decimal_or};
use chrono::NaiveDate;

/// Builds typed financial events from raw broker rows.
pub struct EventFactory {
    next_event_id: u64,
    split_ratio_re: Regex,
    cash_per_share_re: Regex,
    stock_merger_re: Regex,
    wht_on_interest_re: Regex,
}

impl EventFactory {
    pub fn new() -> Self {
        EventFactory {
            next_event_id: 1,
            split_ratio_re: Regex::new(r"(\d+(?:\.\d+)?)\s*FOR\s*(\d+(?:\.\d+)?)")
                .expect("static regex"),
            cash_per_share_re: Regex::new(r"FOR\s+([A-Z]{3})\s*(\d+(?:\.\d+)?)(?:\s*PER\s*SHARE)?")
                .expect("static regex"),
            stock_merger_re: Regex::new(
                r"(?:WITH\s+)?([A-Z0-9.\-]+)\s+(\d+(?:\.\d+)?)\s*FOR\s*(\d+(?:\.\d+)?)",
            )
            .expect("static regex"),
            wht_on_interest_re: Regex::new(
                r"(?i)WITHHOLDING\s*(?:@\s*\d{1,3}(?:\.\d+)?%)?\s*ON\s*(?:CREDIT\s*)?INT(?:EREST)?",
            )
            .expect("static regex"),
        }
    }

    fn allocate_id(&mut self) -> EventId {
        let id = EventId(self.next_event_id);
        self.next_event_id += 1;
        id
    }

    /// Creates the dividend-like income event for the part of a capital
    /// repayment that exceeded the remaining cost basis.
    pub fn capital_repayment_excess(
        &mut self,
        asset_id: crate::assets::AssetId,
        date: NaiveDate,
        amount_eur: Decimal,
        description: String,
    ) -> FinancialEvent {
        FinancialEvent {
            id: self.allocate_id(),
            asset_id,
            date,
            gross_amount_foreign: Some(amount_eur),
            currency: Some("EUR".to_string()),
            gross_amount_eur: Some(amount_eur),
            broker_transaction_id: None,
            description: Some(description),
            notes_codes: None,
            payload: EventPayload::CashFlow(CashFlowDetails {
                kind: CashFlowKind::CapitalRepaymentExcess,
                source_country: None,
            }),
        }
    }

    /// Maps trade rows to trade, option-lifecycle and currency-conversion
    /// events. Linking of exercises/assignments to their stock legs happens
    /// in a later pass over the produced events.
    pub fn events_from_trades(
        &mut self,
        rows: &[RawTradeRecord],
        resolver: &mut AssetResolver,
    ) -> Result<Vec<FinancialEvent>, EventError> {
        let mut events = Vec::new();

        for row in rows {
            let tx_id = match row.primary_tx_id() {
                Some(id) => id.to_string(),
                None => {
                    error!(
                        "Trade row for symbol {:?} on {:?} lacks both TransactionID and TradeID; skipping",
                        row.symbol, row.trade_date
                    );
                    continue;
                }
            };

            let asset_id = resolver.resolve_or_create(AssetLookup {
                isin: row.isin_or_security_id(),
                conid: row.conid.clone(),
                symbol: row.symbol.clone(),
                currency: row.currency.clone(),
                asset_class: row.asset_class.clone(),
                sub_category: row.sub_category.clone(),
                description: row.description.clone(),
                source: DescriptionSource::Trade,
                multiplier: parse_decimal_opt(row.multiplier.as_deref()),
                strike: parse_decimal_opt(row.strike.as_deref()),
                expiry: row.expiry.clone(),
                put_call: row.put_call.clone(),
                underlying_conid: row.underlying_conid.clone(),
                underlying_symbol: row.underlying_symbol.clone(),
            });

            let date = prioritized_date(&[
                row.settle_date.as_deref(),
                row.trade_date.as_deref(),
                row.report_date.as_deref(),
            ])
            .ok_or_else(|| EventError::UnparseableDate {
                date: row
                    .trade_date
                    .clone()
                    .or_else(|| row.report_date.clone())
                    .unwrap_or_default(),
                record: tx_id.clone(),
            })?;

            let asset = resolver.get(asset_id).expect("just resolved");
            let quantity = parse_decimal_or(row.quantity.as_deref(), Decimal::ZERO);

            if asset.category == AssetCategory::Option {
                if let Some(kind) = option_lifecycle_kind(row.notes_codes.as_deref()) {
                    events.push(FinancialEvent {
                        id: self.allocate_id(),
                        asset_id,
                        date,
                        gross_amount_foreign: Some(Decimal::ZERO),
                        currency: row.currency.clone(),
                        gross_amount_eur: None,
                        broker_transaction_id: Some(tx_id),
                        description: row.description.clone(),
                        notes_codes: row.notes_codes.clone(),
                        payload: EventPayload::OptionLifecycle(OptionLifecycleDetails {
                            kind,
                            contracts: quantity.abs(),
                        }),
                    });
                    continue;
                }
            }

            let is_fx_pair = asset.raw_asset_class.as_deref() == Some("CASH")
                && asset
                    .symbol
                    .as_deref()
                    .map_or(false, crate::assets::assets_classifier::is_fx_pair_symbol);

            if is_fx_pair {
                match self.currency_conversion_from_fx_pair(row, &tx_id, date, resolver) {
                    Some(event) => events.push(event),
                    None => continue,
                }
                continue;
            }

            let direction = self.determine_trade_direction(row, &tx_id, quantity)?;
            let price = parse_decimal_or(row.trade_price.as_deref(), Decimal::ZERO);
            let commission = parse_decimal_or(row.commission.as_deref(), Decimal::ZERO).abs();

            let gross_foreign = parse_decimal_opt(row.trade_money.as_deref())
                .or_else(|| parse_decimal_opt(row.proceeds.as_deref()))
                .map(|v| v.abs())
                .unwrap_or_else(|| {
                    let asset = resolver.get(asset_id).expect("just resolved");
                    let mut gross = quantity.abs() * price * asset.multiplier();
                    if asset.category == AssetCategory::Bond {
                        // Bond prices are percentages of nominal value.
                        gross /= Decimal::ONE_HUNDRED;
                    }
                    gross
                });

            events.push(FinancialEvent {
                id: self.allocate_id(),
                asset_id,
                date,
                gross_amount_foreign: Some(gross_foreign),
                currency: row.currency.clone(),
                gross_amount_eur: None,
                broker_transaction_id: Some(tx_id),
                description: row.description.clone(),
                notes_codes: row.notes_codes.clone(),
                payload: EventPayload::Trade(TradeDetails {
                    direction,
                    quantity,
                    price_foreign: price,
                    commission_foreign: commission,
                    commission_currency: row
                        .commission_currency
                        .clone()
                        .or_else(|| row.currency.clone()),
                    commission_eur: None,
                    net_value_eur: None,
                    related_option_event: None,
                }),
            });
        }

        debug!("Created {} events from trade rows", events.len());
        Ok(events)
    }

    fn determine_trade_direction(
        &self,
        row: &RawTradeRecord,
        tx_id: &str,
        quantity: Decimal,
    ) -> Result<TradeDirection, EventError> {
        let buy_sell = row
            .buy_sell
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_uppercase();
        let open_close = row
            .open_close_indicator
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_uppercase();

        match buy_sell.as_str() {
            "BUY" => match open_close.as_str() {
                "O" => Ok(TradeDirection::BuyLong),
                "C" => Ok(TradeDirection::BuyShortCover),
                other => {
                    warn!(
                        "Trade {}: BUY with Open/Close indicator '{}'; assuming long buy",
                        tx_id, other
                    );
                    Ok(TradeDirection::BuyLong)
                }
            },
            "SELL" => match open_close.as_str() {
                "O" => Ok(TradeDirection::SellShortOpen),
                "C" => Ok(TradeDirection::SellLong),
                other => {
                    warn!(
                        "Trade {}: SELL with Open/Close indicator '{}'; assuming long sale",
                        tx_id, other
                    );
                    Ok(TradeDirection::SellLong)
                }
            },
            _ if !quantity.is_zero() => {
                warn!(
                    "Trade {}: Buy/Sell indicator missing, inferring direction from quantity sign",
                    tx_id
                );
                if quantity > Decimal::ZERO {
                    Ok(if open_close == "C" {
                        TradeDirection::BuyShortCover
                    } else {
                        TradeDirection::BuyLong
                    })
                } else {
                    Ok(if open_close == "O" {
                        TradeDirection::SellShortOpen
                    } else {
                        TradeDirection::SellLong
                    })
                }
            }
            _ => Err(EventError::AmbiguousTradeDirection(format!(
                "trade {} (symbol {:?}): Buy/Sell '{:?}', Open/Close '{:?}', quantity {}",
                tx_id, row.symbol, row.buy_sell, row.open_close_indicator, quantity
            ))),
        }
    }

    /// An FX-pair instrument trade ("EUR.USD") becomes one currency
    /// conversion carrying both legs, never a FIFO-tracked trade.
    fn currency_conversion_from_fx_pair(
        &mut self,
        row: &RawTradeRecord,
        tx_id: &str,
        date: NaiveDate,
        resolver: &mut AssetResolver,
    ) -> Option<FinancialEvent> {
        let symbol = row.symbol.as_deref().unwrap_or_default().to_uppercase();
        let mut legs = symbol.split('.');
        let base = legs.next()?.to_string();
        let quote = legs.next()?.to_string();

        let quantity = parse_decimal_or(row.quantity.as_deref(), Decimal::ZERO);
        if quantity.is_zero() {
            error!("FX pair trade {} of {} has zero quantity; skipping", tx_id, symbol);
            return None;
        }

        let mut rate = parse_decimal_or(row.trade_price.as_deref(), Decimal::ZERO);
        let mut quote_amount = parse_decimal_opt(row.trade_money.as_deref())
            .or_else(|| parse_decimal_opt(row.proceeds.as_deref()))
            .map(|v| v.abs())
            .unwrap_or(Decimal::ZERO);
        if quote_amount.is_zero() && !rate.is_zero() {
            quote_amount = quantity.abs() * rate;
            warn!(
                "FX pair trade {} ({}): money amount missing, derived quote leg {} {} from quantity and rate",
                tx_id, symbol, quote_amount, quote
            );
        }

        // Positive quantity buys the base currency, negative sells it.
        let (from_currency, from_amount, to_currency, to_amount) = if quantity > Decimal::ZERO {
            (quote, quote_amount, base, quantity.abs())
        } else {
            (base, quantity.abs(), quote, quote_amount)
        };

        if rate.is_zero() && !from_amount.is_zero() && !to_amount.is_zero() {
            rate = if quantity > Decimal::ZERO {
                from_amount / to_amount
            } else {
                to_amount / from_amount
            };
        }

        if from_amount <= Decimal::ZERO || to_amount <= Decimal::ZERO || rate <= Decimal::ZERO {
            error!(
                "FX pair trade {} of {}: could not determine both legs (from {} {}, to {} {}, rate {}); skipping",
                tx_id, symbol, from_amount, from_currency, to_amount, to_currency, rate
            );
            return None;
        }

        let target_cash = resolver.resolve_or_create(AssetLookup::cash_balance(&to_currency));
        Some(FinancialEvent {
            id: self.allocate_id(),
            asset_id: target_cash,
            date,
            gross_amount_foreign: Some(to_amount),
            currency: Some(to_currency.clone()),
            gross_amount_eur: None,
            broker_transaction_id: Some(tx_id.to_string()),
            description: row
                .description
                .as_ref()
                .map(|d| format!("FX Pair Trade: {}", d)),
            notes_codes: row.notes_codes.clone(),
            payload: EventPayload::CurrencyConversion(CurrencyConversionDetails {
                from_currency,
                from_amount,
                to_currency,
                to_amount,
                exchange_rate: rate,
            }),
        })
    }

    pub fn events_from_cash_transactions(
        &mut self,
        rows: &[RawCashTransactionRecord],
        resolver: &mut AssetResolver,
    ) -> Result<Vec<FinancialEvent>, EventError> {
        let mut events = Vec::new();

        for row in rows {
            let tx_id = match row.transaction_id.as_deref().filter(|s| !s.trim().is_empty()) {
                Some(id) => id.to_string(),
                None => {
                    error!(
                        "Cash transaction (type {:?}, desc {:?}) lacks a transaction id; skipping",
                        row.tx_type, row.description
                    );
                    continue;
                }
            };

            let asset_id = if row.is_instrument_specific() {
                resolver.resolve_or_create(AssetLookup {
                    isin: row.isin_or_security_id(),
                    conid: row.conid.clone(),
                    symbol: row.symbol.clone(),
                    currency: row.currency.clone(),
                    asset_class: row.asset_class.clone(),
                    sub_category: row.sub_category.clone(),
                    description: row.description.clone(),
                    source: DescriptionSource::CashTransaction,
                    ..Default::default()
                })
            } else {
                resolver.resolve_or_create(AssetLookup::cash_balance(
                    row.currency.as_deref().unwrap_or("EUR"),
                ))
            };

            let date = prioritized_date(&[
                row.settle_date.as_deref(),
                row.date_time.as_deref(),
                row.report_date.as_deref(),
            ])
            .ok_or_else(|| EventError::UnparseableDate {
                date: row
                    .settle_date
                    .clone()
                    .or_else(|| row.report_date.clone())
                    .unwrap_or_default(),
                record: tx_id.clone(),
            })?;

            let amount = parse_decimal_or(row.amount.as_deref(), Decimal::ZERO);
            let tx_type = row.tx_type.as_deref().unwrap_or("").trim().to_uppercase();
            let code = row.code.as_deref().unwrap_or("").trim().to_uppercase();
            let desc_upper = row.description.as_deref().unwrap_or("").to_uppercase();
            let asset = resolver.get(asset_id).expect("just resolved");

            let payload = if tx_type.contains("WITHHOLDING TAX")
                || code == "WHT"
                || self.wht_on_interest_re.is_match(&desc_upper)
            {
                let mut country = row.issuer_country_code.clone();
                if country.is_none()
                    && self.wht_on_interest_re.is_match(&desc_upper)
                    && asset.category == AssetCategory::CashBalance
                {
                    country = Some("IE".to_string());
                }
                Some((
                    EventPayload::WithholdingTax(WithholdingTaxDetails {
                        source_country: country,
                        taxed_income_event: None,
                        link_confidence: None,
                        effective_rate: None,
                    }),
                    amount.abs(),
                ))
            } else if desc_upper.contains("EXPIRE DIVIDEND RIGHT")
                || tx_type.contains("EXEMPT FROM WITHHOLDING")
            {
                // ED cash lands on a dividend-rights phantom; a later pass
                // re-attributes it to the underlying as capital repayment.
                Some((
                    EventPayload::CashFlow(CashFlowDetails {
                        kind: CashFlowKind::CapitalRepayment,
                        source_country: row.issuer_country_code.clone(),
                    }),
                    amount.abs(),
                ))
            } else if tx_type.contains("CAPITAL REPAYMENT") || code == "RE" {
                Some((
                    EventPayload::CashFlow(CashFlowDetails {
                        kind: CashFlowKind::CapitalRepayment,
                        source_country: row.issuer_country_code.clone(),
                    }),
                    amount.abs(),
                ))
            } else if tx_type.contains("PAYMENT IN LIEU") || code == "PO" {
                Some((
                    EventPayload::CashFlow(CashFlowDetails {
                        kind: CashFlowKind::PaymentInLieuDividend,
                        source_country: row.issuer_country_code.clone(),
                    }),
                    amount.abs(),
                ))
            } else if tx_type.contains("DIVIDEND")
                || (code == "DI"
                    && asset.category != AssetCategory::CashBalance
                    && !desc_upper.contains("INTEREST"))
            {
                let kind = if asset.category == AssetCategory::InvestmentFund {
                    CashFlowKind::DistributionFund
                } else {
                    CashFlowKind::DividendCash
                };
                Some((
                    EventPayload::CashFlow(CashFlowDetails {
                        kind,
                        source_country: row.issuer_country_code.clone(),
                    }),
                    amount.abs(),
                ))
            } else if tx_type.contains("INTEREST")
                || code == "IN"
                || desc_upper.starts_with("CREDIT INTEREST")
                || desc_upper.starts_with("DEBIT INTEREST")
            {
                let is_stueckzinsen = asset.category == AssetCategory::Bond
                    && (desc_upper.contains("STÜCKZINSEN") || desc_upper.contains("ACCRUED INT"));
                let kind = if is_stueckzinsen && amount < Decimal::ZERO {
                    CashFlowKind::InterestPaidStueckzinsen
                } else {
                    CashFlowKind::InterestReceived
                };
                let mut country = row.issuer_country_code.clone();
                if asset.category == AssetCategory::CashBalance
                    && (desc_upper.contains("BROKER INTEREST")
                        || desc_upper.contains("DEPOSIT INTEREST")
                        || desc_upper.starts_with("CREDIT INTEREST"))
                {
                    country = Some("IE".to_string());
                }
                Some((
                    EventPayload::CashFlow(CashFlowDetails {
                        kind,
                        source_country: country,
                    }),
                    amount.abs(),
                ))
            } else if tx_type.contains("FEE") || code == "FE" {
                Some((EventPayload::Fee, amount.abs()))
            } else {
                debug!(
                    "Cash transaction {} of type '{}' maps to no domain event; skipping",
                    tx_id, tx_type
                );
                None
            };

            if let Some((payload, gross)) = payload {
                events.push(FinancialEvent {
                    id: self.allocate_id(),
                    asset_id,
                    date,
                    gross_amount_foreign: Some(gross),
                    currency: row.currency.clone(),
                    gross_amount_eur: None,
                    broker_transaction_id: Some(tx_id),
                    description: row.description.clone(),
                    notes_codes: row.code.clone(),
                    payload,
                });
            }
        }

        debug!("Created {} events from cash transaction rows", events.len());
        Ok(events)
    }

    pub fn events_from_corporate_actions(
        &mut self,
        rows: &[RawCorporateActionRecord],
        resolver: &mut AssetResolver,
    ) -> Result<Vec<FinancialEvent>, EventError> {
        let mut events = Vec::new();

        for row in rows {
            let (symbol, description, ca_type) =
                match (&row.symbol, &row.description, &row.ca_type) {
                    (Some(symbol), Some(description), Some(ca_type)) => {
                        (symbol.clone(), description.clone(), ca_type.clone())
                    }
                    _ => {
                        warn!(
                            "Corporate action row missing symbol, description or type; skipping ({:?})",
                            row.action_id
                        );
                        continue;
                    }
                };

            if symbol.to_uppercase().ends_with(RECEIVABLE_SYMBOL_SUFFIX) {
                warn!(
                    "Skipping broker-internal receivable row {} ({:?})",
                    symbol, row.action_id
                );
                continue;
            }

            let asset_id = resolver.resolve_or_create(AssetLookup {
                isin: row.isin.clone(),
                conid: row.conid.clone(),
                symbol: Some(symbol.clone()),
                currency: row.currency.clone(),
                asset_class: row.asset_class.clone(),
                description: Some(description.clone()),
                source: DescriptionSource::CorporateAction,
                ..Default::default()
            });

            let date = prioritized_date(&[
                row.pay_date.as_deref(),
                row.report_date.as_deref(),
                row.ex_date.as_deref(),
            ])
            .ok_or_else(|| EventError::UnparseableDate {
                date: row
                    .report_date
                    .clone()
                    .or_else(|| row.pay_date.clone())
                    .unwrap_or_default(),
                record: row.action_id.clone().unwrap_or_else(|| symbol.clone()),
            })?;

            let ca_type_upper = ca_type.trim().to_uppercase();
            let desc_upper = description.to_uppercase();
            let quantity = parse_decimal_opt(row.quantity.as_deref());
            let proceeds = parse_decimal_opt(row.proceeds.as_deref());
            let value = parse_decimal_opt(row.value.as_deref());

            let (kind, gross_foreign) = self.classify_corporate_action(
                &ca_type_upper,
                &desc_upper,
                quantity,
                proceeds,
                value,
                row,
                resolver,
            );

            let Some(kind) = kind else {
                warn!(
                    "Corporate action {:?} ({}) did not map to a supported action; recording as generic",
                    row.action_id, ca_type_upper
                );
                events.push(FinancialEvent {
                    id: self.allocate_id(),
                    asset_id,
                    date,
                    gross_amount_foreign: proceeds.or(value),
                    currency: row.currency.clone(),
                    gross_amount_eur: None,
                    broker_transaction_id: row.transaction_id.clone(),
                    description: Some(description),
                    notes_codes: None,
                    payload: EventPayload::CorporateAction(CorporateActionDetails {
                        kind: CorporateActionKind::Other {
                            code: ca_type_upper,
                        },
                        ca_action_id: row.action_id.clone(),
                    }),
                });
                continue;
            };

            events.push(FinancialEvent {
                id: self.allocate_id(),
                asset_id,
                date,
                gross_amount_foreign: gross_foreign,
                currency: row.currency.clone(),
                gross_amount_eur: None,
                broker_transaction_id: row.transaction_id.clone(),
                description: Some(description),
                notes_codes: None,
                payload: EventPayload::CorporateAction(CorporateActionDetails {
                    kind,
                    ca_action_id: row.action_id.clone(),
                }),
            });
        }

        debug!("Created {} events from corporate action rows", events.len());
        Ok(events)
    }

    #[allow(clippy::too_many_arguments)]
    fn classify_corporate_action(
        &mut self,
        ca_type: &str,
        desc_upper: &str,
        quantity: Option<Decimal>,
        proceeds: Option<Decimal>,
        value: Option<Decimal>,
        row: &RawCorporateActionRecord,
        resolver: &mut AssetResolver,
    ) -> (Option<CorporateActionKind>, Option<Decimal>) {
        if ca_type == "FS"
            || ca_type.contains("FORWARD SPLIT")
            || (desc_upper.contains("SPLIT") && !desc_upper.contains("REVERSE"))
        {
            if let Some(caps) = self.split_ratio_re.captures(desc_upper) {
                let new: Option<Decimal> = caps[1].parse().ok();
                let old: Option<Decimal> = caps[2].parse().ok();
                if let (Some(new), Some(old)) = (new, old) {
                    if !old.is_zero() {
                        return (
                            Some(CorporateActionKind::SplitForward { ratio: new / old }),
                            Some(Decimal::ZERO),
                        );
                    }
                }
            }
            warn!(
                "Could not parse split ratio from '{}' for action {:?}",
                desc_upper, row.action_id
            );
            return (None, None);
        }

        if ca_type == "TC" {
            // Cash merger: "... FOR USD 11.50 PER SHARE"
            if let Some(caps) = self.cash_per_share_re.captures(desc_upper) {
                let cash_currency = caps[1].to_string();
                let cash_per_share: Option<Decimal> = caps[2].parse().ok();
                let row_currency = row
                    .currency
                    .as_deref()
                    .map(str::to_uppercase)
                    .unwrap_or_default();
                if let Some(cash_per_share) = cash_per_share {
                    if cash_currency == row_currency {
                        match quantity.filter(|q| !q.is_zero()) {
                            Some(qty) => {
                                return (
                                    Some(CorporateActionKind::MergerCash {
                                        cash_per_share_foreign: cash_per_share,
                                        cash_per_share_eur: None,
                                        quantity_disposed: qty.abs(),
                                    }),
                                    proceeds.map(|p| p.abs()),
                                );
                            }
                            None => {
                                warn!(
                                    "Cash merger {:?} has cash per share but no disposed quantity",
                                    row.action_id
                                );
                                return (None, None);
                            }
                        }
                    }
                    warn!(
                        "Cash merger {:?}: description currency {} does not match row currency {}",
                        row.action_id, cash_currency, row_currency
                    );
                }
            }
            // Stock-for-stock merger: "... WITH NEWCO 2 FOR 1"
            if let Some(caps) = self.stock_merger_re.captures(desc_upper) {
                let new_symbol = caps[1].to_string();
                let new: Option<Decimal> = caps[2].parse().ok();
                let old: Option<Decimal> = caps[3].parse().ok();
                if let (Some(new), Some(old)) = (new, old) {
                    if !old.is_zero() {
                        let new_asset_id = resolver.resolve_or_create(AssetLookup {
                            symbol: Some(new_symbol.clone()),
                            currency: row.currency.clone(),
                            asset_class: row.asset_class.clone(),
                            description: Some(format!("New asset from merger: {}", new_symbol)),
                            source: DescriptionSource::Generated,
                            ..Default::default()
                        });
                        return (
                            Some(CorporateActionKind::MergerStock {
                                new_asset_id,
                                new_shares_per_old: new / old,
                            }),
                            Some(Decimal::ZERO),
                        );
                    }
                }
            }
            warn!(
                "Merger action {:?}: could not determine cash or stock terms from '{}'",
                row.action_id, desc_upper
            );
            return (None, None);
        }

        if ca_type == "HI" || ca_type == "SD" || ca_type.contains("STOCK DIVIDEND") {
            let new_shares = match quantity.filter(|q| *q > Decimal::ZERO) {
                Some(q) => q,
                None => {
                    warn!(
                        "Stock dividend {:?} has invalid or missing quantity",
                        row.action_id
                    );
                    return (None, None);
                }
            };
            let total_fmv = value.or(proceeds).unwrap_or(Decimal::ZERO).abs();
            let fmv_per_share = if new_shares.is_zero() {
                Decimal::ZERO
            } else {
                total_fmv / new_shares
            };
            return (
                Some(CorporateActionKind::StockDividend {
                    quantity_new_shares: new_shares,
                    fmv_per_share_foreign: Some(fmv_per_share),
                    fmv_per_share_eur: None,
                }),
                Some(total_fmv),
            );
        }

        if ca_type == "DI" {
            return (Some(CorporateActionKind::DividendRightsIssue), Some(Decimal::ZERO));
        }
        if ca_type == "ED" {
            return (
                Some(CorporateActionKind::ExpireDividendRights),
                proceeds.map(|p| p.abs()).or(Some(Decimal::ZERO)),
            );
        }

        (None, None)
    }
}

impl Default for EventFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Notes/Codes drive the option lifecycle mapping: `A` (assignment, but not
/// `IA`), `Ex` (exercise), `Ep` (worthless expiration). The Open/Close
/// indicator is deliberately ignored here; assignments always carry `C`.
fn option_lifecycle_kind(notes_codes: Option<&str>) -> Option<OptionLifecycleKind> {
    let notes = notes_codes?;
    let parts: Vec<String> = notes
        .split(';')
        .map(|p| p.trim().to_uppercase())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.iter().any(|p| p == "A") {
        return Some(OptionLifecycleKind::Assignment);
    }
    if parts.iter().any(|p| p == "EX") {
        return Some(OptionLifecycleKind::Exercise);
    }
    if parts.iter().any(|p| p == "EP") {
        return Some(OptionLifecycleKind::ExpirationWorthless);
    }
    None
}

/// First parseable date wins. Callers pass candidates in priority order
/// (settle before pay before trade before report).
fn prioritized_date(candidates: &[Option<&str>]) -> Option<NaiveDate> {
    candidates
        .iter()
        .flatten()
        .find_map(|raw| parse_broker_date(raw))
}

/// True when the trade's notes mark it as the stock leg of an exercise or
/// assignment (`Ex` or `A`, never `IA`).
pub fn has_exercise_or_assignment_notes(notes_codes: Option<&str>) -> bool {
    matches!(
        option_lifecycle_kind(notes_codes),
        Some(OptionLifecycleKind::Assignment) | Some(OptionLifecycleKind::Exercise)
    )
}
