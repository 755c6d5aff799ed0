use log::debug;
use rust_decimal::Decimal;

use crate::errors::Result;
use crate::events::{CorporateActionKind, EventPayload, FinancialEvent};
use crate::fx::currency_converter::CurrencyConverter;

/// Populates the EUR fields of every event from transaction-date rates.
///
/// Sign convention for trades: buys (long buy, short cover) carry a positive
/// cost of price×qty plus commission; sells (long sale, short open) carry
/// positive proceeds of price×qty minus commission. A missing rate inside
/// the fallback window is a fatal error.
pub fn enrich_events(
    events: &mut [FinancialEvent],
    converter: &CurrencyConverter,
) -> Result<()> {
    let mut enriched = 0usize;

    for event in events.iter_mut() {
        let date = event.date;
        let event_currency = event.currency.clone();

        if event.gross_amount_eur.is_none() {
            if let (Some(gross), Some(currency)) = (event.gross_amount_foreign, &event_currency) {
                event.gross_amount_eur = Some(converter.convert_to_eur(gross, currency, date)?);
                enriched += 1;
            }
        }

        match &mut event.payload {
            EventPayload::Trade(trade) => {
                if trade.commission_eur.is_none() {
                    let commission_currency = trade
                        .commission_currency
                        .clone()
                        .or_else(|| event_currency.clone());
                    trade.commission_eur = match commission_currency {
                        Some(currency) => Some(converter.convert_to_eur(
                            trade.commission_foreign.abs(),
                            &currency,
                            date,
                        )?),
                        None if trade.commission_foreign.is_zero() => Some(Decimal::ZERO),
                        None => None,
                    };
                }

                if trade.net_value_eur.is_none() {
                    if let (Some(gross_eur), Some(commission_eur)) =
                        (event.gross_amount_eur, trade.commission_eur)
                    {
                        let net = if trade.direction.is_buy() {
                            gross_eur + commission_eur
                        } else {
                            gross_eur - commission_eur
                        };
                        trade.net_value_eur = Some(net);
                    }
                }
            }
            EventPayload::CorporateAction(details) => match &mut details.kind {
                CorporateActionKind::MergerCash {
                    cash_per_share_foreign,
                    cash_per_share_eur,
                    ..
                } => {
                    if cash_per_share_eur.is_none() {
                        if let Some(currency) = &event_currency {
                            *cash_per_share_eur = Some(converter.convert_to_eur(
                                *cash_per_share_foreign,
                                currency,
                                date,
                            )?);
                        }
                    }
                }
                CorporateActionKind::StockDividend {
                    fmv_per_share_foreign,
                    fmv_per_share_eur,
                    ..
                } => {
                    if fmv_per_share_eur.is_none() {
                        if let (Some(fmv), Some(currency)) =
                            (*fmv_per_share_foreign, &event_currency)
                        {
                            *fmv_per_share_eur =
                                Some(converter.convert_to_eur(fmv, currency, date)?);
                        }
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    debug!("Enriched {} events with EUR amounts", enriched);
    Ok(())
}
