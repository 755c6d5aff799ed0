use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::assets::AssetResolver;
use crate::errors::{Error, Result};
use crate::events::events_model::{EventId, EventPayload, FinancialEvent};

/// Fully ordered sort key. The leading date keeps processing chronological;
/// the tier enforces corporate-action-before-realization on the same day;
/// the event id breaks any remaining tie, guaranteeing a total order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventSortKey {
    pub date: NaiveDate,
    pub tier: u8,
    /// Broker transaction id, or the asset symbol for corporate actions.
    pub primary: String,
    pub category_rank: u8,
    /// Corporate actions: action id and description; empty otherwise.
    pub detail: (String, String),
    /// Cash-like events: gross foreign amount; zero otherwise.
    pub amount: Decimal,
    pub event_id: EventId,
}

pub fn sort_key(event: &FinancialEvent, resolver: &AssetResolver) -> Result<EventSortKey> {
    let asset = resolver.get(event.asset_id).ok_or_else(|| {
        Error::Sorting(format!(
            "event {} references unknown asset {}",
            event.id, event.asset_id
        ))
    })?;

    let tx_id = event
        .broker_transaction_id
        .clone()
        .unwrap_or_default();

    let key = match &event.payload {
        EventPayload::CorporateAction(details) => EventSortKey {
            date: event.date,
            tier: event.payload.sort_tier(),
            primary: asset.symbol.clone().unwrap_or_default(),
            category_rank: 0,
            detail: (
                details.ca_action_id.clone().unwrap_or_default(),
                event.description.clone().unwrap_or_default(),
            ),
            amount: Decimal::ZERO,
            event_id: event.id,
        },
        EventPayload::CashFlow(_) | EventPayload::WithholdingTax(_) | EventPayload::Fee => {
            EventSortKey {
                date: event.date,
                tier: event.payload.sort_tier(),
                primary: tx_id,
                category_rank: asset.category.sort_rank(),
                detail: (String::new(), String::new()),
                amount: event.gross_amount_foreign.unwrap_or(Decimal::ZERO),
                event_id: event.id,
            }
        }
        // Trades, option lifecycle, currency conversions.
        _ => EventSortKey {
            date: event.date,
            tier: event.payload.sort_tier(),
            primary: tx_id,
            category_rank: asset.category.sort_rank(),
            detail: (String::new(), String::new()),
            amount: Decimal::ZERO,
            event_id: event.id,
        },
    };
    Ok(key)
}

/// Sorts events into deterministic processing order and validates that the
/// resulting keys form a strict total order.
pub fn sort_events(events: &mut [FinancialEvent], resolver: &AssetResolver) -> Result<()> {
    let mut keyed: Vec<(EventSortKey, usize)> = Vec::with_capacity(events.len());
    for (index, event) in events.iter().enumerate() {
        keyed.push((sort_key(event, resolver)?, index));
    }
    keyed.sort();

    for window in keyed.windows(2) {
        if window[0].0 == window[1].0 {
            return Err(Error::Sorting(format!(
                "duplicate sort key for events {} and {}",
                events[window[0].1].context(),
                events[window[1].1].context()
            )));
        }
    }

    let order: Vec<usize> = keyed.into_iter().map(|(_, index)| index).collect();
    apply_permutation(events, order);
    Ok(())
}

fn apply_permutation(events: &mut [FinancialEvent], order: Vec<usize>) {
    let mut reordered: Vec<FinancialEvent> = order
        .into_iter()
        .map(|index| events[index].clone())
        .collect();
    events.swap_with_slice(&mut reordered);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetClassifier, AssetLookup, DescriptionSource};
    use crate::events::events_model::{
        CorporateActionDetails, CorporateActionKind, TradeDetails, TradeDirection,
    };
    use std::str::FromStr;

    fn fixture() -> (AssetResolver, crate::assets::AssetId) {
        let mut resolver = AssetResolver::new(AssetClassifier::new());
        let id = resolver.resolve_or_create(AssetLookup {
            symbol: Some("SAP".into()),
            asset_class: Some("STK".into()),
            currency: Some("EUR".into()),
            source: DescriptionSource::Trade,
            ..Default::default()
        });
        (resolver, id)
    }

    fn trade_event(id: u64, asset_id: crate::assets::AssetId, date: &str) -> FinancialEvent {
        FinancialEvent {
            id: EventId(id),
            asset_id,
            date: NaiveDate::from_str(date).unwrap(),
            gross_amount_foreign: Some(Decimal::ONE_HUNDRED),
            currency: Some("EUR".into()),
            gross_amount_eur: None,
            broker_transaction_id: Some(format!("T{}", id)),
            description: None,
            notes_codes: None,
            payload: EventPayload::Trade(TradeDetails {
                direction: TradeDirection::SellLong,
                quantity: Decimal::from_str("-1").unwrap(),
                price_foreign: Decimal::ONE_HUNDRED,
                commission_foreign: Decimal::ZERO,
                commission_currency: None,
                commission_eur: None,
                net_value_eur: None,
                related_option_event: None,
            }),
        }
    }

    fn split_event(id: u64, asset_id: crate::assets::AssetId, date: &str) -> FinancialEvent {
        FinancialEvent {
            id: EventId(id),
            asset_id,
            date: NaiveDate::from_str(date).unwrap(),
            gross_amount_foreign: Some(Decimal::ZERO),
            currency: Some("EUR".into()),
            gross_amount_eur: None,
            broker_transaction_id: None,
            description: Some("SPLIT 2 FOR 1".into()),
            notes_codes: None,
            payload: EventPayload::CorporateAction(CorporateActionDetails {
                kind: CorporateActionKind::SplitForward {
                    ratio: Decimal::from_str("2").unwrap(),
                },
                ca_action_id: Some("CA1".into()),
            }),
        }
    }

    #[test]
    fn test_corporate_action_precedes_same_day_trade() {
        let (resolver, asset_id) = fixture();
        let mut events = vec![
            trade_event(1, asset_id, "2023-06-01"),
            split_event(2, asset_id, "2023-06-01"),
        ];
        sort_events(&mut events, &resolver).unwrap();
        assert!(matches!(events[0].payload, EventPayload::CorporateAction(_)));
        assert!(matches!(events[1].payload, EventPayload::Trade(_)));
    }

    #[test]
    fn test_date_dominates_tier() {
        let (resolver, asset_id) = fixture();
        let mut events = vec![
            split_event(2, asset_id, "2023-06-02"),
            trade_event(1, asset_id, "2023-06-01"),
        ];
        sort_events(&mut events, &resolver).unwrap();
        assert_eq!(events[0].id, EventId(1));
        assert_eq!(events[1].id, EventId(2));
    }

    #[test]
    fn test_event_id_breaks_full_tie() {
        let (resolver, asset_id) = fixture();
        let mut a = trade_event(7, asset_id, "2023-06-01");
        let mut b = trade_event(3, asset_id, "2023-06-01");
        // Same broker transaction id on both rows.
        a.broker_transaction_id = Some("T100".into());
        b.broker_transaction_id = Some("T100".into());
        let mut events = vec![a, b];
        sort_events(&mut events, &resolver).unwrap();
        assert_eq!(events[0].id, EventId(3));
        assert_eq!(events[1].id, EventId(7));
    }

    #[test]
    fn test_sort_is_deterministic() {
        let (resolver, asset_id) = fixture();
        let build = || {
            vec![
                trade_event(5, asset_id, "2023-03-02"),
                split_event(4, asset_id, "2023-03-02"),
                trade_event(3, asset_id, "2023-03-01"),
            ]
        };
        let mut first = build();
        let mut second = build();
        sort_events(&mut first, &resolver).unwrap();
        sort_events(&mut second, &resolver).unwrap();
        let ids_first: Vec<EventId> = first.iter().map(|e| e.id).collect();
        let ids_second: Vec<EventId> = second.iter().map(|e| e.id).collect();
        assert_eq!(ids_first, ids_second);
    }
}
