use log::info;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::assets::{
    AssetCategory, AssetClassifier, AssetId, AssetLookup, AssetResolver, DescriptionSource,
};
use crate::config::EngineConfig;
use crate::engine::{run_calculations, Diagnostic};
use crate::errors::Result;
use crate::events::{
    sort_events, EventFactory, FinancialEvent, RawCashTransactionRecord,
    RawCorporateActionRecord, RawPositionRecord, RawTradeRecord,
};
use crate::fx::{enrich_events, CurrencyConverter, FxRateProvider};
use crate::linking::{
    link_option_trades, link_withholding_tax, reattribute_dividend_rights, WithholdingTaxLink,
};
use crate::taxes::{LossOffsettingEngine, LossOffsettingResult, RealizedGainLoss, VorabpauschaleData};
use crate::utils::decimal_utils::{parse_decimal_opt, parse_decimal_or};

/// Already-parsed broker rows. CSV dialects, encodings and file handling
/// are the host's concern.
#[derive(Debug, Default, Clone)]
pub struct PipelineInput {
    pub trades: Vec<RawTradeRecord>,
    pub cash_transactions: Vec<RawCashTransactionRecord>,
    pub positions_start: Vec<RawPositionRecord>,
    pub positions_end: Vec<RawPositionRecord>,
    pub corporate_actions: Vec<RawCorporateActionRecord>,
}

/// Everything a reporting layer needs from one run.
pub struct PipelineOutput {
    pub realized_gains_losses: Vec<RealizedGainLoss>,
    pub vorabpauschale: Vec<VorabpauschaleData>,
    pub tax_summary: LossOffsettingResult,
    pub withholding_tax_links: Vec<WithholdingTaxLink>,
    pub diagnostics: Vec<Diagnostic>,
    pub eoy_mismatch_count: usize,
    /// All enriched events in processing order, including engine-created
    /// synthetic income events.
    pub events: Vec<FinancialEvent>,
    /// Net ledger quantity per asset after full-year processing.
    pub final_quantities: BTreeMap<AssetId, Decimal>,
    pub resolver: AssetResolver,
}

/// Runs the deterministic pipeline: asset discovery, event construction,
/// linking, FX enrichment, chronological FIFO processing and tax
/// aggregation.
pub fn run_pipeline(
    input: PipelineInput,
    rate_provider: Arc<dyn FxRateProvider>,
    config: &EngineConfig,
) -> Result<PipelineOutput> {
    let mut resolver = AssetResolver::new(AssetClassifier::new());
    let mut factory = EventFactory::new();
    let converter = CurrencyConverter::new(rate_provider);
    let mut diagnostics: Vec<Diagnostic> = Vec::new();

    // Positions first: the snapshots anchor SOY/EOY data on the canonical
    // assets before any trade row is seen.
    process_positions(&input, &mut resolver);

    // Discovery pass over the remaining row kinds settles alias merges
    // before events capture asset ids.
    discover_assets(&input, &mut resolver);
    resolver.link_derivatives();
    ensure_soy_quantities(&mut resolver);
    info!("Asset discovery complete: {} unique assets", resolver.asset_count());

    let mut events: Vec<FinancialEvent> = Vec::new();
    events.extend(factory.events_from_trades(&input.trades, &mut resolver)?);
    events.extend(factory.events_from_cash_transactions(&input.cash_transactions, &mut resolver)?);
    events.extend(factory.events_from_corporate_actions(&input.corporate_actions, &mut resolver)?);
    info!("Created {} financial events", events.len());

    diagnostics.extend(reattribute_dividend_rights(&mut events, &resolver));
    diagnostics.extend(link_option_trades(&mut events, &resolver));

    enrich_events(&mut events, &converter)?;

    let (withholding_tax_links, unlinked_wht) = link_withholding_tax(&mut events);
    for event_id in unlinked_wht {
        diagnostics.push(
            Diagnostic::warning(format!(
                "Withholding tax event {} could not be linked to an income event",
                event_id
            ))
            .with_event(event_id),
        );
    }

    sort_events(&mut events, &resolver)?;

    let outcome = run_calculations(&mut events, &resolver, &converter, &mut factory, config)?;
    diagnostics.extend(outcome.diagnostics);

    let mut all_events = events;
    all_events.extend(outcome.synthetic_events);
    sort_events(&mut all_events, &resolver)?;

    let aggregator = LossOffsettingEngine::new(config, &resolver);
    let tax_summary = aggregator.calculate(
        &outcome.realized_gains_losses,
        &outcome.vorabpauschale,
        &all_events,
    );

    info!(
        "Pipeline finished: {} realizations, {} diagnostics, Zeile 19 = {}",
        outcome.realized_gains_losses.len(),
        diagnostics.len(),
        tax_summary.kap_zeile_19
    );

    Ok(PipelineOutput {
        realized_gains_losses: outcome.realized_gains_losses,
        vorabpauschale: outcome.vorabpauschale,
        tax_summary,
        withholding_tax_links,
        diagnostics,
        eoy_mismatch_count: outcome.eoy_mismatch_count,
        events: all_events,
        final_quantities: outcome.final_quantities,
        resolver,
    })
}

fn process_positions(input: &PipelineInput, resolver: &mut AssetResolver) {
    for row in &input.positions_start {
        let asset_id = resolver.resolve_or_create(position_lookup(row));
        if let Some(asset) = resolver.get_mut(asset_id) {
            asset.soy_quantity = Some(parse_decimal_or(row.quantity.as_deref(), Decimal::ZERO));
            asset.soy_cost_basis_amount = parse_decimal_opt(row.cost_basis_money.as_deref());
            asset.soy_cost_basis_currency = row.currency.clone();
        }
    }
    for row in &input.positions_end {
        let asset_id = resolver.resolve_or_create(position_lookup(row));
        if let Some(asset) = resolver.get_mut(asset_id) {
            asset.eoy_quantity = Some(parse_decimal_or(row.quantity.as_deref(), Decimal::ZERO));
            asset.eoy_market_price = parse_decimal_opt(row.mark_price.as_deref());
            asset.eoy_position_value = parse_decimal_opt(row.position_value.as_deref());
            asset.eoy_price_currency = row.currency.clone();
        }
    }
}

fn position_lookup(row: &RawPositionRecord) -> AssetLookup {
    AssetLookup {
        isin: row.isin.clone(),
        conid: row.conid.clone(),
        symbol: row.symbol.clone(),
        currency: row.currency.clone(),
        asset_class: row.asset_class.clone(),
        sub_category: row.sub_category.clone(),
        description: row.description.clone(),
        source: DescriptionSource::Position,
        multiplier: parse_decimal_opt(row.multiplier.as_deref()),
        strike: parse_decimal_opt(row.strike.as_deref()),
        expiry: row.expiry.clone(),
        put_call: row.put_call.clone(),
        underlying_conid: row.underlying_conid.clone(),
        underlying_symbol: row.underlying_symbol.clone(),
    }
}

fn discover_assets(input: &PipelineInput, resolver: &mut AssetResolver) {
    for row in &input.trades {
        resolver.resolve_or_create(AssetLookup {
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
    }
    for row in &input.cash_transactions {
        if row.is_instrument_specific() {
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
            });
        } else if let Some(currency) = &row.currency {
            resolver.resolve_or_create(AssetLookup::cash_balance(currency));
        }
    }
    for row in &input.corporate_actions {
        if row.symbol.is_none() {
            continue;
        }
        resolver.resolve_or_create(AssetLookup {
            isin: row.isin.clone(),
            conid: row.conid.clone(),
            symbol: row.symbol.clone(),
            currency: row.currency.clone(),
            asset_class: row.asset_class.clone(),
            description: row.description.clone(),
            source: DescriptionSource::CorporateAction,
            ..Default::default()
        });
    }
}

/// Every non-cash asset carries an authoritative SOY quantity; absence from
/// the snapshot means zero.
fn ensure_soy_quantities(resolver: &mut AssetResolver) {
    let ids: Vec<AssetId> = resolver
        .assets()
        .filter(|asset| asset.category != AssetCategory::CashBalance)
        .filter(|asset| asset.soy_quantity.is_none())
        .map(|asset| asset.id)
        .collect();
    for id in ids {
        if let Some(asset) = resolver.get_mut(id) {
            asset.soy_quantity = Some(Decimal::ZERO);
        }
    }
}
