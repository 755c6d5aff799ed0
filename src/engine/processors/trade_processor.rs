use log::{debug, info};

use crate::assets::{AssetCategory, AssetResolver, PutCall};
use crate::engine::processors::ProcessingState;
use crate::engine::Diagnostic;
use crate::errors::{Error, Result};
use crate::events::events_factory::has_exercise_or_assignment_notes;
use crate::events::{FinancialEvent, TradeDirection};
use crate::fifo::{FifoLedger, LedgerError};
use crate::taxes::RealizedGainLoss;

/// Handles buy/sell events against the asset's ledger, folding a linked
/// option premium into the trade's economics first.
pub(crate) fn process_trade(
    event: &mut FinancialEvent,
    ledger: &mut FifoLedger,
    resolver: &AssetResolver,
    state: &mut ProcessingState,
) -> Result<Vec<RealizedGainLoss>> {
    apply_option_adjustment(event, resolver, state)?;

    let context = event.context();
    let (direction, quantity, net_value) = {
        let trade = event.trade().expect("trade payload");
        let net = trade
            .net_value_eur
            .ok_or_else(|| Error::Ledger(LedgerError::MissingEnrichedValue(context.clone())))?;
        (trade.direction, trade.quantity.abs(), net)
    };
    let tx_id = event
        .broker_transaction_id
        .clone()
        .unwrap_or_else(|| event.id.to_string());

    let records = match direction {
        TradeDirection::BuyLong => {
            ledger.add_long_lot(event.date, quantity, net_value, &tx_id)?;
            Vec::new()
        }
        TradeDirection::SellShortOpen => {
            ledger.add_short_lot(event.date, quantity, net_value, &tx_id)?;
            Vec::new()
        }
        TradeDirection::SellLong => {
            ledger.realize_long_sale(event.id, event.date, quantity, net_value, &context)?
        }
        TradeDirection::BuyShortCover => {
            ledger.realize_short_cover(event.id, event.date, quantity, net_value, &context)?
        }
    };
    Ok(records)
}

/// Folds the pending premium of the linked exercise/assignment into the
/// stock trade's net value:
///
/// | stock side | option | adjustment          |
/// |------------|--------|---------------------|
/// | buy        | call   | cost += premium     |
/// | buy        | put    | cost −= premium     |
/// | sell       | call   | proceeds += premium |
/// | sell       | put    | proceeds −= premium |
fn apply_option_adjustment(
    event: &mut FinancialEvent,
    resolver: &AssetResolver,
    state: &mut ProcessingState,
) -> Result<()> {
    let asset_category = resolver
        .get(event.asset_id)
        .map(|asset| asset.category)
        .unwrap_or(AssetCategory::Unknown);

    let related = match event.trade().and_then(|t| t.related_option_event) {
        Some(related) if asset_category == AssetCategory::Stock => related,
        _ => {
            if asset_category == AssetCategory::Stock
                && has_exercise_or_assignment_notes(event.notes_codes.as_deref())
            {
                state.diagnostics.push(
                    Diagnostic::critical(format!(
                        "Stock trade {} carries exercise/assignment notes but is not linked to an option event; premium adjustment skipped",
                        event.context()
                    ))
                    .with_event(event.id)
                    .with_asset(event.asset_id),
                );
            }
            return Ok(());
        }
    };

    let adjustment = state
        .pending_option_adjustments
        .remove(&related)
        .ok_or_else(|| {
            Error::Calculation(format!(
                "stock trade {} is linked to option event {} but no pending premium exists",
                event.context(),
                related
            ))
        })?;

    let option_asset = resolver.get(adjustment.option_asset_id).ok_or_else(|| {
        Error::Calculation(format!(
            "pending adjustment references unknown option asset {}",
            adjustment.option_asset_id
        ))
    })?;
    let underlying_matches = option_asset
        .derivative
        .as_ref()
        .and_then(|spec| spec.underlying_asset_id)
        .map(|underlying| resolver.canonical_id(underlying) == resolver.canonical_id(event.asset_id))
        .unwrap_or(false);
    if !underlying_matches {
        return Err(Error::Calculation(format!(
            "stock trade {} does not match the underlying of option {} from event {}",
            event.context(),
            adjustment.option_asset_id,
            related
        )));
    }

    let trade = event.trade_mut().expect("trade payload");
    let original = trade.net_value_eur.ok_or_else(|| {
        Error::Calculation(format!(
            "stock trade linked to option event {} has no enriched net value",
            related
        ))
    })?;
    let signed_premium = match (trade.direction.is_buy(), adjustment.put_call) {
        (true, PutCall::Call) => adjustment.premium_eur,
        (true, PutCall::Put) => -adjustment.premium_eur,
        (false, PutCall::Call) => adjustment.premium_eur,
        (false, PutCall::Put) => -adjustment.premium_eur,
    };
    let adjusted = original + signed_premium;
    info!(
        "Folding option premium {:+} EUR from event {} into stock trade (net {} -> {})",
        signed_premium, related, original, adjusted
    );
    trade.net_value_eur = Some(adjusted);
    debug!("Removed pending adjustment for option event {}", related);
    Ok(())
}
