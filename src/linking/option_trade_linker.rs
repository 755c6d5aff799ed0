use chrono::NaiveDate;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::assets::{AssetCategory, AssetResolver};
use crate::engine::Diagnostic;
use crate::events::events_factory::has_exercise_or_assignment_notes;
use crate::events::{EventId, EventPayload, FinancialEvent, OptionLifecycleKind};

/// Retroactively links each stock trade flagged with exercise/assignment
/// notes to the option lifecycle event that triggered it.
///
/// Lookup key: (event date, underlying conid, |contracts × multiplier|).
/// A stock trade matches when its own conid and absolute quantity produce
/// the same key. Duplicate keys keep the later event with a warning;
/// unmatched candidates are critical findings but never fail the run.
pub fn link_option_trades(
    events: &mut [FinancialEvent],
    resolver: &AssetResolver,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let mut lookup: BTreeMap<(NaiveDate, String, Decimal), EventId> = BTreeMap::new();
    for event in events.iter() {
        let EventPayload::OptionLifecycle(details) = &event.payload else {
            continue;
        };
        if !matches!(
            details.kind,
            OptionLifecycleKind::Exercise | OptionLifecycleKind::Assignment
        ) {
            continue;
        }
        let Some(option_asset) = resolver.get(event.asset_id) else {
            continue;
        };
        let Some(spec) = option_asset.derivative.as_ref() else {
            warn!(
                "Option event {} has no contract terms; cannot build link key",
                event.context()
            );
            continue;
        };
        let Some(underlying_conid) = spec.underlying_conid.clone() else {
            warn!(
                "Option event {} lacks an underlying conid; cannot build link key",
                event.context()
            );
            continue;
        };
        let multiplier = if spec.multiplier.is_zero() {
            Decimal::ONE_HUNDRED
        } else {
            spec.multiplier
        };
        let expected_stock_quantity = (details.contracts * multiplier).abs();
        let key = (event.date, underlying_conid, expected_stock_quantity);

        if let Some(previous) = lookup.insert(key.clone(), event.id) {
            warn!(
                "Duplicate option link key {:?}: replacing event {} with {}",
                key, previous, event.id
            );
        }
    }
    debug!("Built option link lookup with {} entries", lookup.len());

    let mut linked = 0usize;
    for event in events.iter_mut() {
        let is_candidate = matches!(&event.payload, EventPayload::Trade(_))
            && has_exercise_or_assignment_notes(event.notes_codes.as_deref());
        if !is_candidate {
            continue;
        }
        let Some(asset) = resolver.get(event.asset_id) else {
            continue;
        };
        if asset.category != AssetCategory::Stock {
            continue;
        }
        let Some(conid) = asset.conid.clone() else {
            warn!(
                "Stock trade {} has exercise/assignment notes but its asset lacks a conid",
                event.context()
            );
            continue;
        };

        let quantity = event
            .trade()
            .map(|t| t.quantity.abs())
            .unwrap_or(Decimal::ZERO);
        let key = (event.date, conid, quantity);
        match lookup.get(&key) {
            Some(option_event_id) => {
                if let Some(trade) = event.trade_mut() {
                    trade.related_option_event = Some(*option_event_id);
                    linked += 1;
                }
            }
            None => {
                diagnostics.push(
                    Diagnostic::critical(format!(
                        "Stock trade {} carries exercise/assignment notes ('{}') but no option event matches key ({}, {:?})",
                        event.context(),
                        event.notes_codes.as_deref().unwrap_or(""),
                        event.date,
                        quantity
                    ))
                    .with_event(event.id)
                    .with_asset(event.asset_id),
                );
            }
        }
    }
    info!("Option trade linking completed: {} stock trades linked", linked);
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetClassifier, AssetLookup, DescriptionSource};
    use crate::events::{OptionLifecycleDetails, TradeDetails, TradeDirection};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::from_str(s).unwrap()
    }

    fn setup() -> (AssetResolver, crate::assets::AssetId, crate::assets::AssetId) {
        let mut resolver = AssetResolver::new(AssetClassifier::new());
        let stock = resolver.resolve_or_create(AssetLookup {
            symbol: Some("AAPL".into()),
            conid: Some("265598".into()),
            asset_class: Some("STK".into()),
            currency: Some("USD".into()),
            source: DescriptionSource::Trade,
            ..Default::default()
        });
        let option = resolver.resolve_or_create(AssetLookup {
            symbol: Some("AAPL 230616P00150000".into()),
            conid: Some("5550011".into()),
            asset_class: Some("OPT".into()),
            currency: Some("USD".into()),
            multiplier: Some(dec("100")),
            put_call: Some("P".into()),
            underlying_conid: Some("265598".into()),
            source: DescriptionSource::Trade,
            ..Default::default()
        });
        resolver.link_derivatives();
        (resolver, stock, option)
    }

    fn assignment_event(
        id: u64,
        asset_id: crate::assets::AssetId,
        day: &str,
        contracts: &str,
    ) -> FinancialEvent {
        FinancialEvent {
            id: EventId(id),
            asset_id,
            date: date(day),
            gross_amount_foreign: Some(Decimal::ZERO),
            currency: Some("USD".into()),
            gross_amount_eur: None,
            broker_transaction_id: Some(format!("T{}", id)),
            description: None,
            notes_codes: Some("A".into()),
            payload: EventPayload::OptionLifecycle(OptionLifecycleDetails {
                kind: OptionLifecycleKind::Assignment,
                contracts: dec(contracts),
            }),
        }
    }

    fn stock_trade(
        id: u64,
        asset_id: crate::assets::AssetId,
        day: &str,
        quantity: &str,
    ) -> FinancialEvent {
        FinancialEvent {
            id: EventId(id),
            asset_id,
            date: date(day),
            gross_amount_foreign: Some(dec("5000")),
            currency: Some("USD".into()),
            gross_amount_eur: None,
            broker_transaction_id: Some(format!("T{}", id)),
            description: None,
            notes_codes: Some("A".into()),
            payload: EventPayload::Trade(TradeDetails {
                direction: TradeDirection::BuyLong,
                quantity: dec(quantity),
                price_foreign: dec("50"),
                commission_foreign: Decimal::ONE,
                commission_currency: Some("USD".into()),
                commission_eur: None,
                net_value_eur: None,
                related_option_event: None,
            }),
        }
    }

    #[test]
    fn test_link_by_date_conid_quantity() {
        let (resolver, stock, option) = setup();
        let mut events = vec![
            assignment_event(1, option, "2023-03-10", "1"),
            stock_trade(2, stock, "2023-03-10", "100"),
        ];
        let diagnostics = link_option_trades(&mut events, &resolver);
        assert!(diagnostics.is_empty());
        assert_eq!(
            events[1].trade().unwrap().related_option_event,
            Some(EventId(1))
        );
    }

    #[test]
    fn test_quantity_mismatch_is_critical_not_fatal() {
        let (resolver, stock, option) = setup();
        let mut events = vec![
            assignment_event(1, option, "2023-03-10", "1"),
            stock_trade(2, stock, "2023-03-10", "200"),
        ];
        let diagnostics = link_option_trades(&mut events, &resolver);
        assert_eq!(diagnostics.len(), 1);
        assert!(events[1].trade().unwrap().related_option_event.is_none());
    }

    #[test]
    fn test_duplicate_key_keeps_later_event() {
        let (resolver, stock, option) = setup();
        let mut events = vec![
            assignment_event(1, option, "2023-03-10", "1"),
            assignment_event(2, option, "2023-03-10", "1"),
            stock_trade(3, stock, "2023-03-10", "100"),
        ];
        link_option_trades(&mut events, &resolver);
        assert_eq!(
            events[2].trade().unwrap().related_option_event,
            Some(EventId(2))
        );
    }

    #[test]
    fn test_trade_without_notes_is_not_linked() {
        let (resolver, stock, option) = setup();
        let mut trade = stock_trade(2, stock, "2023-03-10", "100");
        trade.notes_codes = None;
        let mut events = vec![assignment_event(1, option, "2023-03-10", "1"), trade];
        let diagnostics = link_option_trades(&mut events, &resolver);
        assert!(diagnostics.is_empty());
        assert!(events[1].trade().unwrap().related_option_event.is_none());
    }
}
