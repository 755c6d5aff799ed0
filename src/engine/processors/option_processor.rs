use log::{error, info};
use rust_decimal::Decimal;

use crate::assets::AssetResolver;
use crate::engine::processors::{PendingOptionAdjustment, ProcessingState};
use crate::engine::Diagnostic;
use crate::errors::{Error, Result};
use crate::events::{FinancialEvent, OptionLifecycleDetails, OptionLifecycleKind};
use crate::fifo::{ConsumedLot, FifoLedger};
use crate::taxes::{RealizationType, RealizedGainLoss};

/// Handles exercise, assignment and worthless expiration of options.
///
/// Exercises and assignments never emit a realization themselves; their
/// consumed premium waits in the processing state until the linked stock
/// trade folds it into its cost basis or proceeds.
pub(crate) fn process_option_lifecycle(
    event: &FinancialEvent,
    details: &OptionLifecycleDetails,
    ledger: &mut FifoLedger,
    resolver: &AssetResolver,
    state: &mut ProcessingState,
) -> Result<Vec<RealizedGainLoss>> {
    match details.kind {
        OptionLifecycleKind::Exercise | OptionLifecycleKind::Assignment => {
            stash_premium(event, details, ledger, resolver, state).map(|_| Vec::new())
        }
        OptionLifecycleKind::ExpirationWorthless => {
            expire_worthless(event, details, ledger, state)
        }
    }
}

fn stash_premium(
    event: &FinancialEvent,
    details: &OptionLifecycleDetails,
    ledger: &mut FifoLedger,
    resolver: &AssetResolver,
    state: &mut ProcessingState,
) -> Result<()> {
    let option_asset = resolver.get(event.asset_id).ok_or_else(|| {
        Error::Calculation(format!("option event {} references unknown asset", event.context()))
    })?;
    let spec = option_asset.derivative.as_ref().ok_or_else(|| {
        Error::Calculation(format!(
            "option asset {} has no contract terms for {}",
            option_asset.identity_key(),
            event.context()
        ))
    })?;
    if spec.underlying_asset_id.is_none() {
        return Err(Error::Calculation(format!(
            "option asset {} is missing its underlying link; cannot process {}",
            option_asset.identity_key(),
            event.context()
        )));
    }
    let put_call = match spec.put_call {
        Some(put_call) => put_call,
        None => {
            error!(
                "Option asset {} has no put/call flag; skipping {}",
                option_asset.identity_key(),
                event.context()
            );
            return Ok(());
        }
    };

    let consumed = match details.kind {
        OptionLifecycleKind::Exercise => {
            ledger.consume_long_option_premium(details.contracts, &event.context())?
        }
        _ => ledger.consume_short_option_premium(details.contracts, &event.context())?,
    };
    let premium_eur: Decimal = consumed
        .iter()
        .map(|portion| portion.quantity * portion.unit_value_eur)
        .sum();

    info!(
        "{} of {} contracts consumed {} lots, premium {} EUR stashed for the linked stock trade",
        event.payload.type_name(),
        details.contracts,
        consumed.len(),
        premium_eur
    );
    state.pending_option_adjustments.insert(
        event.id,
        PendingOptionAdjustment {
            premium_eur,
            option_asset_id: event.asset_id,
            put_call,
        },
    );
    Ok(())
}

/// Worthless expiration closes every remaining contract. Long positions
/// lose the paid premium; short positions keep the received premium as
/// Stillhalter income.
fn expire_worthless(
    event: &FinancialEvent,
    details: &OptionLifecycleDetails,
    ledger: &mut FifoLedger,
    state: &mut ProcessingState,
) -> Result<Vec<RealizedGainLoss>> {
    let contracts = details.contracts;
    let (consumed, realization_type): (Vec<ConsumedLot>, RealizationType) =
        if ledger.long_quantity() >= contracts && !ledger.lots().is_empty() {
            (
                ledger.consume_long_option_premium(contracts, &event.context())?,
                RealizationType::OptionExpiredLong,
            )
        } else if ledger.short_quantity() >= contracts && !ledger.short_lots().is_empty() {
            (
                ledger.consume_short_option_premium(contracts, &event.context())?,
                RealizationType::OptionExpiredShort,
            )
        } else {
            state.diagnostics.push(
                Diagnostic::critical(format!(
                    "Worthless expiration {}: neither side holds {} contracts (long {}, short {}); no realization recorded",
                    event.context(),
                    contracts,
                    ledger.long_quantity(),
                    ledger.short_quantity()
                ))
                .with_event(event.id)
                .with_asset(event.asset_id),
            );
            return Ok(Vec::new());
        };

    let records = consumed
        .into_iter()
        .map(|portion| {
            let (unit_cost, unit_value) = match realization_type {
                RealizationType::OptionExpiredLong => (portion.unit_value_eur, Decimal::ZERO),
                _ => (Decimal::ZERO, portion.unit_value_eur),
            };
            RealizedGainLoss::build(
                event.id,
                ledger.asset_id,
                ledger.category,
                ledger.fund_type,
                portion.lot_date,
                event.date,
                realization_type,
                portion.quantity,
                unit_cost,
                unit_value,
                portion.quantity * unit_cost,
                portion.quantity * unit_value,
            )
        })
        .collect();
    Ok(records)
}
