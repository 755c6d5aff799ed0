use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::assets::{AssetCategory, AssetId, AssetResolver};
use crate::config::EngineConfig;
use crate::engine::processors::{
    corporate_action_processor::process_corporate_action,
    option_processor::process_option_lifecycle, trade_processor::process_trade, ProcessingState,
};
use crate::engine::Diagnostic;
use crate::errors::Result;
use crate::events::{
    CashFlowKind, CorporateActionDetails, CorporateActionKind, EventFactory, EventPayload,
    FinancialEvent, OptionLifecycleDetails,
};
use crate::fifo::FifoLedger;
use crate::fx::CurrencyConverter;
use crate::taxes::{RealizedGainLoss, VorabpauschaleData};
use crate::utils::date_utils::{year_end, year_start};

/// Results of the FIFO processing stage.
pub struct CalculationOutcome {
    pub realized_gains_losses: Vec<RealizedGainLoss>,
    pub vorabpauschale: Vec<VorabpauschaleData>,
    /// Events the engine created itself (capital-repayment excess turned
    /// taxable dividend income).
    pub synthetic_events: Vec<FinancialEvent>,
    pub diagnostics: Vec<Diagnostic>,
    pub eoy_mismatch_count: usize,
    /// Net ledger quantity per asset after full-year processing.
    pub final_quantities: BTreeMap<AssetId, Decimal>,
}

enum Dispatch {
    Trade,
    CorporateAction(CorporateActionDetails),
    OptionLifecycle(OptionLifecycleDetails),
    CapitalRepayment,
    None,
}

/// Runs the deterministic FIFO stage over a fully sorted, enriched event
/// stream: SOY reconstruction, chronological dispatch, EOY validation.
pub fn run_calculations(
    events: &mut [FinancialEvent],
    resolver: &AssetResolver,
    converter: &CurrencyConverter,
    factory: &mut EventFactory,
    config: &EngineConfig,
) -> Result<CalculationOutcome> {
    let start = year_start(config.tax_year);
    let end = year_end(config.tax_year);
    info!(
        "Starting calculation engine for tax year {} over {} events",
        config.tax_year,
        events.len()
    );

    // Partition into historical (feeds SOY reconstruction), current-year
    // and ignored post-year events.
    let mut historical_by_asset: BTreeMap<AssetId, Vec<usize>> = BTreeMap::new();
    let mut current_indices: Vec<usize> = Vec::new();
    let mut filtered_after_year = 0usize;
    for (index, event) in events.iter().enumerate() {
        if event.date < start {
            let relevant = matches!(
                &event.payload,
                EventPayload::Trade(_)
                    | EventPayload::CorporateAction(CorporateActionDetails {
                        kind: CorporateActionKind::SplitForward { .. },
                        ..
                    })
                    | EventPayload::CorporateAction(CorporateActionDetails {
                        kind: CorporateActionKind::StockDividend { .. },
                        ..
                    })
            );
            if relevant {
                historical_by_asset
                    .entry(resolver.canonical_id(event.asset_id))
                    .or_default()
                    .push(index);
            }
        } else if event.date <= end {
            current_indices.push(index);
        } else {
            filtered_after_year += 1;
        }
    }
    if filtered_after_year > 0 {
        info!(
            "Filtered out {} events dated after tax year {}",
            filtered_after_year, config.tax_year
        );
    }

    let mut state = ProcessingState::default();

    // One ledger per non-cash asset, initialized from the SOY snapshot.
    let mut ledgers: BTreeMap<AssetId, FifoLedger> = BTreeMap::new();
    for asset in resolver.assets() {
        if asset.category == AssetCategory::CashBalance {
            continue;
        }
        let mut ledger = FifoLedger::new(asset);
        let historical: Vec<&FinancialEvent> = historical_by_asset
            .get(&asset.id)
            .map(|indices| indices.iter().map(|&i| &events[i]).collect())
            .unwrap_or_default();
        let soy = ledger.initialize_from_soy(asset, &historical, config.tax_year, converter)?;
        if soy.simulation_inconsistent {
            state.diagnostics.push(
                Diagnostic::critical(format!(
                    "SOY reconstruction for {} was inconsistent; fallback lot used",
                    asset.identity_key()
                ))
                .with_asset(asset.id),
            );
        } else if soy.used_fallback {
            state.diagnostics.push(
                Diagnostic::warning(format!(
                    "SOY position of {} initialized from snapshot cost basis (no usable history)",
                    asset.identity_key()
                ))
                .with_asset(asset.id),
            );
        }
        if soy.missing_cost_basis {
            state.diagnostics.push(
                Diagnostic::warning(format!(
                    "SOY cost basis missing for {}; zero-cost fallback lot created",
                    asset.identity_key()
                ))
                .with_asset(asset.id),
            );
        }
        ledgers.insert(asset.id, ledger);
    }
    info!("Initialized {} FIFO ledgers", ledgers.len());

    // Chronological dispatch over current-year events.
    let mut realized: Vec<RealizedGainLoss> = Vec::new();
    for index in current_indices {
        let asset_id = resolver.canonical_id(events[index].asset_id);
        let dispatch = match &events[index].payload {
            EventPayload::Trade(_) => Dispatch::Trade,
            EventPayload::CorporateAction(details) => {
                Dispatch::CorporateAction(details.clone())
            }
            EventPayload::OptionLifecycle(details) => {
                Dispatch::OptionLifecycle(details.clone())
            }
            EventPayload::CashFlow(cash) if cash.kind == CashFlowKind::CapitalRepayment => {
                Dispatch::CapitalRepayment
            }
            _ => Dispatch::None,
        };

        let Some(ledger) = ledgers.get_mut(&asset_id) else {
            match dispatch {
                Dispatch::None => {}
                _ => {
                    let category = resolver
                        .get(asset_id)
                        .map(|a| a.category)
                        .unwrap_or(AssetCategory::Unknown);
                    if category != AssetCategory::CashBalance {
                        warn!(
                            "Event {} requires a ledger but none exists; skipping",
                            events[index].context()
                        );
                    }
                }
            }
            continue;
        };

        match dispatch {
            Dispatch::Trade => {
                let records =
                    process_trade(&mut events[index], ledger, resolver, &mut state)?;
                realized.extend(records);
            }
            Dispatch::CorporateAction(details) => {
                let records =
                    process_corporate_action(&events[index], &details, ledger, &mut state)?;
                realized.extend(records);
            }
            Dispatch::OptionLifecycle(details) => {
                let records = process_option_lifecycle(
                    &events[index],
                    &details,
                    ledger,
                    resolver,
                    &mut state,
                )?;
                realized.extend(records);
            }
            Dispatch::CapitalRepayment => {
                let event = &events[index];
                let amount = event.gross_amount_eur.unwrap_or(Decimal::ZERO);
                let excess = ledger.reduce_cost_basis_for_capital_repayment(amount);
                info!(
                    "Capital repayment {} reduced basis by {}; excess {}",
                    event.context(),
                    amount - excess,
                    excess
                );
                if excess > Decimal::ZERO {
                    let synthetic = factory.capital_repayment_excess(
                        asset_id,
                        event.date,
                        excess,
                        format!(
                            "Capital repayment excess over cost basis ({})",
                            event.broker_transaction_id.as_deref().unwrap_or("n/a")
                        ),
                    );
                    state.synthetic_events.push(synthetic);
                }
            }
            Dispatch::None => {
                debug!(
                    "Event {} needs no ledger processing",
                    events[index].context()
                );
            }
        }
    }

    if !state.pending_option_adjustments.is_empty() {
        for (event_id, adjustment) in &state.pending_option_adjustments {
            state.diagnostics.push(
                Diagnostic::critical(format!(
                    "Option event {} left an unconsumed premium of {} EUR (no linked stock trade was processed)",
                    event_id, adjustment.premium_eur
                ))
                .with_event(*event_id)
                .with_asset(adjustment.option_asset_id),
            );
        }
    }

    // End-of-year reconciliation: the snapshot quantity is authoritative;
    // assets absent from the snapshot must be flat.
    let mut eoy_mismatch_count = 0usize;
    let mut final_quantities = BTreeMap::new();
    for asset in resolver.assets() {
        if asset.category == AssetCategory::CashBalance {
            continue;
        }
        let calculated = ledgers
            .get(&asset.id)
            .map(|ledger| ledger.position_quantity())
            .unwrap_or(Decimal::ZERO);
        final_quantities.insert(asset.id, calculated);
        let reported = asset.eoy_quantity.unwrap_or(Decimal::ZERO);
        if (calculated - reported).abs() > config.eoy_quantity_tolerance {
            state.diagnostics.push(
                Diagnostic::critical(format!(
                    "EOY quantity mismatch for {}: calculated {}, reported {}",
                    asset.identity_key(),
                    calculated,
                    reported
                ))
                .with_asset(asset.id),
            );
            eoy_mismatch_count += 1;
        }
    }
    if eoy_mismatch_count > 0 {
        warn!(
            "EOY validation found {} mismatches; processing continued",
            eoy_mismatch_count
        );
    }

    // Vorabpauschale: the base rate for the supported year is zero, so no
    // items are produced; the shape is kept for reporting.
    info!("Vorabpauschale calculation produced 0 items (base rate zero)");

    info!(
        "Calculation engine finished: {} realized gain/loss records",
        realized.len()
    );
    Ok(CalculationOutcome {
        realized_gains_losses: realized,
        vorabpauschale: Vec::new(),
        synthetic_events: state.synthetic_events,
        diagnostics: state.diagnostics,
        eoy_mismatch_count,
        final_quantities,
    })
}
