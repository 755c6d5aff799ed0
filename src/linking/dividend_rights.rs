use log::{info, warn};
use std::collections::BTreeSet;

use crate::assets::{AssetId, AssetResolver};
use crate::constants::ALIAS_PREFIX_SYMBOL;
use crate::engine::Diagnostic;
use crate::events::{CashFlowKind, CorporateActionKind, EventPayload, FinancialEvent};

/// Re-attributes dividend-rights cash to the real instrument.
///
/// Brokers book optional stock dividends through a phantom rights
/// instrument: a DI corporate action issues rights (symbol like
/// "LEG.DIVIR"), an ED action expires them and a cash row pays out. The
/// cash belongs to the underlying share and behaves like a capital
/// repayment against it; the DI/ED pair itself never creates lots.
pub fn reattribute_dividend_rights(
    events: &mut [FinancialEvent],
    resolver: &AssetResolver,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    // Assets that saw a DI or ED corporate action.
    let mut rights_assets: BTreeSet<AssetId> = BTreeSet::new();
    for event in events.iter() {
        if let EventPayload::CorporateAction(details) = &event.payload {
            if matches!(
                details.kind,
                CorporateActionKind::DividendRightsIssue
                    | CorporateActionKind::ExpireDividendRights
            ) {
                rights_assets.insert(resolver.canonical_id(event.asset_id));
            }
        }
    }

    let mut reattributed = 0usize;
    for event in events.iter_mut() {
        let is_rights_cash = match &event.payload {
            EventPayload::CashFlow(cash) if cash.kind == CashFlowKind::CapitalRepayment => {
                rights_assets.contains(&resolver.canonical_id(event.asset_id))
                    || event
                        .description
                        .as_deref()
                        .map_or(false, |d| d.to_uppercase().contains("EXPIRE DIVIDEND RIGHT"))
            }
            _ => false,
        };
        if !is_rights_cash {
            continue;
        }

        let Some(rights_asset) = resolver.get(event.asset_id) else {
            continue;
        };
        // "LEG.DIVIR" -> "LEG": the phantom symbol carries the underlying
        // symbol before the first dot.
        let underlying_symbol = rights_asset
            .symbol
            .as_deref()
            .and_then(|symbol| symbol.split('.').next())
            .filter(|prefix| !prefix.is_empty())
            .map(str::to_string);

        let underlying = underlying_symbol.as_deref().and_then(|symbol| {
            resolver
                .get_by_alias(&format!("{}{}", ALIAS_PREFIX_SYMBOL, symbol))
                .filter(|asset| asset.id != rights_asset.id)
        });

        match underlying {
            Some(underlying_asset) => {
                info!(
                    "Re-attributing dividend-rights cash {} from phantom {} to underlying {}",
                    event.context(),
                    rights_asset.identity_key(),
                    underlying_asset.identity_key()
                );
                event.asset_id = underlying_asset.id;
                reattributed += 1;
            }
            None => {
                warn!(
                    "Dividend-rights cash {} has no resolvable underlying (symbol {:?})",
                    event.context(),
                    rights_asset.symbol
                );
                diagnostics.push(
                    Diagnostic::warning(format!(
                        "Dividend-rights cash {} could not be re-attributed to an underlying instrument",
                        event.context()
                    ))
                    .with_event(event.id)
                    .with_asset(event.asset_id),
                );
            }
        }
    }

    if reattributed > 0 {
        info!("Re-attributed {} dividend-rights cash events", reattributed);
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetClassifier, AssetLookup, DescriptionSource};
    use crate::events::{CashFlowDetails, CorporateActionDetails, EventId};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::from_str(s).unwrap()
    }

    #[test]
    fn test_rights_cash_moves_to_underlying() {
        let mut resolver = AssetResolver::new(AssetClassifier::new());
        let stock = resolver.resolve_or_create(AssetLookup {
            symbol: Some("LEG".into()),
            conid: Some("101".into()),
            asset_class: Some("STK".into()),
            currency: Some("EUR".into()),
            source: DescriptionSource::Trade,
            ..Default::default()
        });
        let rights = resolver.resolve_or_create(AssetLookup {
            symbol: Some("LEG.DIVIR".into()),
            conid: Some("102".into()),
            asset_class: Some("STK".into()),
            currency: Some("EUR".into()),
            source: DescriptionSource::CorporateAction,
            ..Default::default()
        });

        let mut events = vec![
            FinancialEvent {
                id: EventId(1),
                asset_id: rights,
                date: date("2024-06-26"),
                gross_amount_foreign: Some(Decimal::ZERO),
                currency: Some("EUR".into()),
                gross_amount_eur: None,
                broker_transaction_id: None,
                description: Some("LEG.DIVIR EXPIRE DIVIDEND RIGHT".into()),
                notes_codes: None,
                payload: EventPayload::CorporateAction(CorporateActionDetails {
                    kind: CorporateActionKind::ExpireDividendRights,
                    ca_action_id: Some("CA9".into()),
                }),
            },
            FinancialEvent {
                id: EventId(2),
                asset_id: rights,
                date: date("2024-06-26"),
                gross_amount_foreign: Some(Decimal::from_str("120.00").unwrap()),
                currency: Some("EUR".into()),
                gross_amount_eur: None,
                broker_transaction_id: Some("C77".into()),
                description: Some("LEG.DIVIR EXPIRE DIVIDEND RIGHT (Exempt From Withholding)".into()),
                notes_codes: None,
                payload: EventPayload::CashFlow(CashFlowDetails {
                    kind: CashFlowKind::CapitalRepayment,
                    source_country: Some("DE".into()),
                }),
            },
        ];

        let diagnostics = reattribute_dividend_rights(&mut events, &resolver);
        assert!(diagnostics.is_empty());
        assert_eq!(events[1].asset_id, stock);
        // The corporate action itself stays on the phantom.
        assert_eq!(events[0].asset_id, rights);
    }

    #[test]
    fn test_unresolvable_underlying_is_warned() {
        let mut resolver = AssetResolver::new(AssetClassifier::new());
        let rights = resolver.resolve_or_create(AssetLookup {
            symbol: Some("ABC.DIVIR".into()),
            conid: Some("103".into()),
            asset_class: Some("STK".into()),
            currency: Some("EUR".into()),
            source: DescriptionSource::CorporateAction,
            ..Default::default()
        });

        let mut events = vec![FinancialEvent {
            id: EventId(1),
            asset_id: rights,
            date: date("2024-06-26"),
            gross_amount_foreign: Some(Decimal::ONE_HUNDRED),
            currency: Some("EUR".into()),
            gross_amount_eur: None,
            broker_transaction_id: Some("C88".into()),
            description: Some("ABC.DIVIR EXPIRE DIVIDEND RIGHT".into()),
            notes_codes: None,
            payload: EventPayload::CashFlow(CashFlowDetails {
                kind: CashFlowKind::CapitalRepayment,
                source_country: None,
            }),
        }];

        let diagnostics = reattribute_dividend_rights(&mut events, &resolver);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(events[0].asset_id, rights);
    }
}
