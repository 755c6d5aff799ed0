use chrono::NaiveDate;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::assets::{Asset, AssetCategory, AssetId, FundType};
use crate::constants::{
    SOY_FALLBACK_SHORT_TX_PREFIX, SOY_FALLBACK_TX_PREFIX, SOY_SIMULATED_TX_PREFIX,
    STOCK_DIVIDEND_TX_PREFIX,
};
use crate::events::{EventId, EventPayload, FinancialEvent, TradeDirection};
use crate::fifo::fifo_errors::LedgerError;
use crate::fifo::fifo_model::{ConsumedLot, FifoLot, ShortFifoLot};
use crate::fx::CurrencyConverter;
use crate::taxes::{RealizationType, RealizedGainLoss};
use crate::utils::date_utils::soy_sentinel_date;

fn underflow_tolerance() -> Decimal {
    Decimal::from_str("0.0000000001").expect("static literal")
}

/// Outcome of start-of-year lot initialization, surfaced as diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoyInitialization {
    pub used_fallback: bool,
    pub simulation_inconsistent: bool,
    pub missing_cost_basis: bool,
}

/// Per-asset FIFO ledger over long and short lots.
///
/// A ledger never holds long and short lots at the same time; a position
/// transition must fully flatten first. Lots are kept sorted by date with
/// insertion order as the intraday tie-break, which is the event processing
/// order.
pub struct FifoLedger {
    pub asset_id: AssetId,
    pub category: AssetCategory,
    pub fund_type: FundType,
    lots: Vec<FifoLot>,
    short_lots: Vec<ShortFifoLot>,
}

impl FifoLedger {
    pub fn new(asset: &Asset) -> Self {
        if asset.category == AssetCategory::InvestmentFund && asset.fund_type == FundType::None {
            warn!(
                "Ledger for investment fund {} has no specific fund type; Teilfreistellung rate will be 0",
                asset.id
            );
        }
        FifoLedger {
            asset_id: asset.id,
            category: asset.category,
            fund_type: asset.fund_type,
            lots: Vec::new(),
            short_lots: Vec::new(),
        }
    }

    pub fn lots(&self) -> &[FifoLot] {
        &self.lots
    }

    pub fn short_lots(&self) -> &[ShortFifoLot] {
        &self.short_lots
    }

    pub fn long_quantity(&self) -> Decimal {
        self.lots.iter().map(|lot| lot.quantity).sum()
    }

    pub fn short_quantity(&self) -> Decimal {
        self.short_lots.iter().map(|lot| lot.quantity).sum()
    }

    /// Net signed position: long minus short.
    pub fn position_quantity(&self) -> Decimal {
        self.long_quantity() - self.short_quantity()
    }

    fn state_snapshot(&self) -> String {
        format!(
            "asset {}: {} long lots (qty {}), {} short lots (qty {})",
            self.asset_id,
            self.lots.len(),
            self.long_quantity(),
            self.short_lots.len(),
            self.short_quantity()
        )
    }

    // --- Acquisition ---

    pub fn add_long_lot(
        &mut self,
        acquisition_date: NaiveDate,
        quantity: Decimal,
        total_cost_eur: Decimal,
        source_transaction_id: &str,
    ) -> Result<(), LedgerError> {
        if quantity.is_zero() {
            warn!(
                "Trade {} (buy) has zero quantity, skipping lot creation",
                source_transaction_id
            );
            return Ok(());
        }
        if quantity < Decimal::ZERO {
            return Err(LedgerError::InvalidOperation(format!(
                "long lot quantity must be positive, got {} ({})",
                quantity, source_transaction_id
            )));
        }
        if !self.short_lots.is_empty() {
            return Err(LedgerError::PositionConflict(format!(
                "cannot open long lot {} while short position is open; {}",
                source_transaction_id,
                self.state_snapshot()
            )));
        }
        self.lots.push(FifoLot::new(
            acquisition_date,
            quantity,
            total_cost_eur,
            source_transaction_id.to_string(),
        ));
        // Stable by-date sort keeps the processing order as the intraday
        // tie-break.
        self.lots.sort_by_key(|lot| lot.acquisition_date);
        Ok(())
    }

    pub fn add_short_lot(
        &mut self,
        opening_date: NaiveDate,
        quantity: Decimal,
        total_proceeds_eur: Decimal,
        source_transaction_id: &str,
    ) -> Result<(), LedgerError> {
        if quantity.is_zero() {
            warn!(
                "Trade {} (short open) has zero quantity, skipping lot creation",
                source_transaction_id
            );
            return Ok(());
        }
        if quantity < Decimal::ZERO {
            return Err(LedgerError::InvalidOperation(format!(
                "short lot quantity must be positive, got {} ({})",
                quantity, source_transaction_id
            )));
        }
        if !self.lots.is_empty() {
            return Err(LedgerError::PositionConflict(format!(
                "cannot open short lot {} while long position is open; {}",
                source_transaction_id,
                self.state_snapshot()
            )));
        }
        self.short_lots.push(ShortFifoLot::new(
            opening_date,
            quantity,
            total_proceeds_eur.abs(),
            source_transaction_id.to_string(),
        ));
        self.short_lots.sort_by_key(|lot| lot.opening_date);
        Ok(())
    }

    // --- Consumption ---

    /// Consumes long lots oldest-first, returning the consumed portions.
    /// Consuming more than is present is an underflow error.
    pub fn consume_long(
        &mut self,
        quantity: Decimal,
        context: &str,
    ) -> Result<Vec<ConsumedLot>, LedgerError> {
        let available = self.long_quantity();
        let mut remaining = quantity;
        let mut consumed = Vec::new();
        let mut fully_consumed = 0usize;

        for lot in self.lots.iter_mut() {
            if remaining <= Decimal::ZERO {
                break;
            }
            let take = lot.quantity.min(remaining);
            consumed.push(ConsumedLot {
                quantity: take,
                unit_value_eur: lot.unit_cost_eur,
                lot_date: lot.acquisition_date,
                source_transaction_id: lot.source_transaction_id.clone(),
            });
            remaining -= take;
            if take == lot.quantity {
                fully_consumed += 1;
            } else {
                lot.quantity -= take;
                // Per-unit cost is the invariant; re-derive the total.
                lot.total_cost_eur = lot.quantity * lot.unit_cost_eur;
            }
        }
        self.lots.drain(..fully_consumed);

        if remaining.abs() > underflow_tolerance() {
            return Err(LedgerError::ConsumptionUnderflow {
                event: context.to_string(),
                required: quantity.to_string(),
                available: available.to_string(),
                ledger_state: self.state_snapshot(),
            });
        }
        Ok(consumed)
    }

    /// Consumes short lots oldest-first.
    pub fn consume_short(
        &mut self,
        quantity: Decimal,
        context: &str,
    ) -> Result<Vec<ConsumedLot>, LedgerError> {
        let available = self.short_quantity();
        let mut remaining = quantity;
        let mut consumed = Vec::new();
        let mut fully_consumed = 0usize;

        for lot in self.short_lots.iter_mut() {
            if remaining <= Decimal::ZERO {
                break;
            }
            let take = lot.quantity.min(remaining);
            consumed.push(ConsumedLot {
                quantity: take,
                unit_value_eur: lot.unit_proceeds_eur,
                lot_date: lot.opening_date,
                source_transaction_id: lot.source_transaction_id.clone(),
            });
            remaining -= take;
            if take == lot.quantity {
                fully_consumed += 1;
            } else {
                lot.quantity -= take;
                lot.total_proceeds_eur = lot.quantity * lot.unit_proceeds_eur;
            }
        }
        self.short_lots.drain(..fully_consumed);

        if remaining.abs() > underflow_tolerance() {
            return Err(LedgerError::ConsumptionUnderflow {
                event: context.to_string(),
                required: quantity.to_string(),
                available: available.to_string(),
                ledger_state: self.state_snapshot(),
            });
        }
        Ok(consumed)
    }

    // --- Realization ---

    /// Sells from long lots. The event's net proceeds (commission already
    /// inside) are split pro-rata by quantity across consumed lots.
    pub fn realize_long_sale(
        &mut self,
        event_id: EventId,
        date: NaiveDate,
        quantity: Decimal,
        total_proceeds_eur: Decimal,
        context: &str,
    ) -> Result<Vec<RealizedGainLoss>, LedgerError> {
        if quantity.is_zero() {
            return Ok(Vec::new());
        }
        let unit_proceeds = total_proceeds_eur.abs() / quantity;
        let realization_type = if self.category == AssetCategory::Option {
            RealizationType::OptionTradeCloseLong
        } else {
            RealizationType::LongPositionSale
        };

        let consumed = self.consume_long(quantity, context)?;
        let records = consumed
            .into_iter()
            .map(|portion| {
                RealizedGainLoss::build(
                    event_id,
                    self.asset_id,
                    self.category,
                    self.fund_type,
                    portion.lot_date,
                    date,
                    realization_type,
                    portion.quantity,
                    portion.unit_value_eur,
                    unit_proceeds,
                    portion.quantity * portion.unit_value_eur,
                    portion.quantity * unit_proceeds,
                )
            })
            .collect();
        Ok(records)
    }

    /// Buys back short lots. The event's net cost per unit is the cost
    /// basis; the lot's opening proceeds are the realization value.
    pub fn realize_short_cover(
        &mut self,
        event_id: EventId,
        date: NaiveDate,
        quantity: Decimal,
        total_cost_eur: Decimal,
        context: &str,
    ) -> Result<Vec<RealizedGainLoss>, LedgerError> {
        if quantity.is_zero() {
            return Ok(Vec::new());
        }
        let unit_cost = total_cost_eur.abs() / quantity;
        let realization_type = if self.category == AssetCategory::Option {
            RealizationType::OptionTradeCloseShort
        } else {
            RealizationType::ShortPositionCover
        };

        let consumed = self.consume_short(quantity, context)?;
        let records = consumed
            .into_iter()
            .map(|portion| {
                RealizedGainLoss::build(
                    event_id,
                    self.asset_id,
                    self.category,
                    self.fund_type,
                    portion.lot_date,
                    date,
                    realization_type,
                    portion.quantity,
                    unit_cost,
                    portion.unit_value_eur,
                    portion.quantity * unit_cost,
                    portion.quantity * portion.unit_value_eur,
                )
            })
            .collect();
        Ok(records)
    }

    // --- Corporate action transforms ---

    /// Forward split: quantities scale by the ratio, unit values divide by
    /// it, totals stay unchanged. Non-taxable.
    pub fn apply_split(&mut self, ratio: Decimal) {
        if ratio <= Decimal::ZERO {
            warn!(
                "Split ratio {} for asset {} is not positive; no adjustment",
                ratio, self.asset_id
            );
            return;
        }
        info!("Applying split ratio {} to asset {}", ratio, self.asset_id);
        for lot in self.lots.iter_mut() {
            lot.quantity *= ratio;
            lot.unit_cost_eur = if lot.quantity.is_zero() {
                Decimal::ZERO
            } else {
                lot.total_cost_eur / lot.quantity
            };
        }
        for lot in self.short_lots.iter_mut() {
            lot.quantity *= ratio;
            lot.unit_proceeds_eur = if lot.quantity.is_zero() {
                Decimal::ZERO
            } else {
                lot.total_proceeds_eur / lot.quantity
            };
        }
    }

    /// Cash merger: every long lot is sold at the per-share cash price and
    /// the ledger is cleared.
    pub fn consume_all_for_cash_merger(
        &mut self,
        event_id: EventId,
        date: NaiveDate,
        cash_per_share_eur: Decimal,
    ) -> Vec<RealizedGainLoss> {
        if self.lots.is_empty() {
            info!(
                "Cash merger {} for asset {}: no long lots to consume",
                event_id, self.asset_id
            );
            return Vec::new();
        }

        let records = self
            .lots
            .iter()
            .map(|lot| {
                RealizedGainLoss::build(
                    event_id,
                    self.asset_id,
                    self.category,
                    self.fund_type,
                    lot.acquisition_date,
                    date,
                    RealizationType::CashMergerProceeds,
                    lot.quantity,
                    lot.unit_cost_eur,
                    cash_per_share_eur,
                    lot.total_cost_eur,
                    lot.quantity * cash_per_share_eur,
                )
            })
            .collect();
        self.lots.clear();
        records
    }

    /// Stock dividend: a new long lot at the fair market value per share.
    /// The FMV income itself is aggregated from the event, not here.
    pub fn add_stock_dividend_lot(
        &mut self,
        event_id: EventId,
        date: NaiveDate,
        quantity_new_shares: Decimal,
        fmv_per_share_eur: Decimal,
        source_transaction_id: Option<&str>,
    ) -> Result<(), LedgerError> {
        if quantity_new_shares <= Decimal::ZERO {
            info!(
                "Stock dividend {} for asset {} has non-positive share count {}; no lot added",
                event_id, self.asset_id, quantity_new_shares
            );
            return Ok(());
        }
        let tx_id = source_transaction_id
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}", STOCK_DIVIDEND_TX_PREFIX, event_id));
        self.add_long_lot(
            date,
            quantity_new_shares,
            quantity_new_shares * fmv_per_share_eur,
            &tx_id,
        )
    }

    /// Capital repayment: reduces the oldest lots' cost down to zero before
    /// touching the next lot. Whatever exceeds the remaining basis is
    /// returned and becomes taxable dividend income at the caller.
    pub fn reduce_cost_basis_for_capital_repayment(&mut self, amount_eur: Decimal) -> Decimal {
        let mut remaining = amount_eur.abs();
        for lot in self.lots.iter_mut() {
            if remaining.is_zero() {
                break;
            }
            let reduction = lot.total_cost_eur.min(remaining);
            lot.total_cost_eur -= reduction;
            lot.unit_cost_eur = if lot.quantity.is_zero() {
                Decimal::ZERO
            } else {
                lot.total_cost_eur / lot.quantity
            };
            remaining -= reduction;
        }
        if !remaining.is_zero() {
            debug!(
                "Capital repayment for asset {} exceeds remaining basis by {}",
                self.asset_id, remaining
            );
        }
        remaining
    }

    // --- Option premium consumption ---

    /// Consumes long option lots for an exercise, returning the portions so
    /// the caller can total the premium paid.
    pub fn consume_long_option_premium(
        &mut self,
        contracts: Decimal,
        context: &str,
    ) -> Result<Vec<ConsumedLot>, LedgerError> {
        if self.category != AssetCategory::Option {
            return Err(LedgerError::InvalidOperation(format!(
                "option premium consumption on non-option asset {}",
                self.asset_id
            )));
        }
        self.consume_long(contracts, context)
    }

    /// Consumes short option lots for an assignment, returning the portions
    /// so the caller can total the premium received.
    pub fn consume_short_option_premium(
        &mut self,
        contracts: Decimal,
        context: &str,
    ) -> Result<Vec<ConsumedLot>, LedgerError> {
        if self.category != AssetCategory::Option {
            return Err(LedgerError::InvalidOperation(format!(
                "option premium consumption on non-option asset {}",
                self.asset_id
            )));
        }
        self.consume_short(contracts, context)
    }

    // --- Start-of-year reconstruction ---

    /// Rebuilds the start-of-year lots: replay the asset's historical
    /// events through the ledger and accept the simulated state iff it had
    /// no underflow, its sign matches the reported SOY quantity and it
    /// covers at least that quantity. Otherwise a single fallback lot dated
    /// Dec 31 of the prior year carries the reported quantity. The snapshot
    /// quantity is authoritative either way.
    pub fn initialize_from_soy(
        &mut self,
        asset: &Asset,
        historical_events: &[&FinancialEvent],
        tax_year: i32,
        converter: &CurrencyConverter,
    ) -> Result<SoyInitialization, LedgerError> {
        self.lots.clear();
        self.short_lots.clear();
        let mut outcome = SoyInitialization::default();
        let mut inconsistent = false;

        for event in historical_events {
            if let Err(err) = self.replay_historical_event(event) {
                warn!(
                    "Historical simulation for asset {} hit {} at {}; falling back",
                    self.asset_id,
                    err,
                    event.context()
                );
                inconsistent = true;
            }
        }

        let reconstructed_long: Vec<FifoLot> = std::mem::take(&mut self.lots);
        let reconstructed_short: Vec<ShortFifoLot> = std::mem::take(&mut self.short_lots);
        let long_total: Decimal = reconstructed_long.iter().map(|l| l.quantity).sum();
        let short_total: Decimal = reconstructed_short.iter().map(|l| l.quantity).sum();

        let reported = match asset.soy_quantity {
            Some(quantity) => quantity,
            None => {
                warn!(
                    "Asset {} has no reported SOY quantity; assuming 0",
                    asset.identity_key()
                );
                Decimal::ZERO
            }
        };

        if reported.is_zero() {
            return Ok(outcome);
        }

        let mut use_fallback = inconsistent;
        if !use_fallback {
            if reported > Decimal::ZERO && short_total.is_zero() && long_total >= reported {
                let mut to_assign = reported;
                for lot in reconstructed_long {
                    if to_assign <= Decimal::ZERO {
                        break;
                    }
                    let quantity = lot.quantity.min(to_assign);
                    self.lots.push(FifoLot::new(
                        lot.acquisition_date,
                        quantity,
                        quantity * lot.unit_cost_eur,
                        lot.source_transaction_id,
                    ));
                    to_assign -= quantity;
                }
            } else if reported < Decimal::ZERO
                && long_total.is_zero()
                && short_total >= reported.abs()
            {
                let mut to_assign = reported.abs();
                for lot in reconstructed_short {
                    if to_assign <= Decimal::ZERO {
                        break;
                    }
                    let quantity = lot.quantity.min(to_assign);
                    self.short_lots.push(ShortFifoLot::new(
                        lot.opening_date,
                        quantity,
                        quantity * lot.unit_proceeds_eur,
                        lot.source_transaction_id,
                    ));
                    to_assign -= quantity;
                }
            } else {
                use_fallback = true;
            }
        }

        if use_fallback {
            self.lots.clear();
            self.short_lots.clear();
            warn!(
                "Asset {}: historical reconstruction (long {}, short {}, inconsistent: {}) cannot explain reported SOY quantity {}; using fallback lot",
                asset.identity_key(),
                long_total,
                short_total,
                inconsistent,
                reported
            );
            outcome.used_fallback = true;
            outcome.missing_cost_basis =
                self.create_fallback_lot(asset, reported, tax_year, converter)?;
        }
        outcome.simulation_inconsistent = inconsistent;
        Ok(outcome)
    }

    fn replay_historical_event(&mut self, event: &FinancialEvent) -> Result<(), LedgerError> {
        match &event.payload {
            EventPayload::Trade(trade) => {
                let quantity = trade.quantity.abs();
                let net = trade.net_value_eur.ok_or_else(|| {
                    LedgerError::MissingEnrichedValue(event.context())
                })?;
                let tx_id = event
                    .broker_transaction_id
                    .clone()
                    .unwrap_or_else(|| format!("{}_{}", SOY_SIMULATED_TX_PREFIX, event.id));
                match trade.direction {
                    TradeDirection::BuyLong => {
                        self.add_long_lot(event.date, quantity, net, &tx_id)
                    }
                    TradeDirection::SellLong => {
                        self.consume_long(quantity, &event.context()).map(|_| ())
                    }
                    TradeDirection::SellShortOpen => {
                        self.add_short_lot(event.date, quantity, net, &tx_id)
                    }
                    TradeDirection::BuyShortCover => {
                        self.consume_short(quantity, &event.context()).map(|_| ())
                    }
                }
            }
            EventPayload::CorporateAction(details) => match &details.kind {
                crate::events::CorporateActionKind::SplitForward { ratio } => {
                    self.apply_split(*ratio);
                    Ok(())
                }
                crate::events::CorporateActionKind::StockDividend {
                    quantity_new_shares,
                    fmv_per_share_eur,
                    ..
                } => self.add_stock_dividend_lot(
                    event.id,
                    event.date,
                    *quantity_new_shares,
                    fmv_per_share_eur.unwrap_or(Decimal::ZERO),
                    event.broker_transaction_id.as_deref(),
                ),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Creates the fallback SOY lot. Returns true when the cost basis was
    /// missing and a zero-cost lot was created.
    fn create_fallback_lot(
        &mut self,
        asset: &Asset,
        reported_quantity: Decimal,
        tax_year: i32,
        converter: &CurrencyConverter,
    ) -> Result<bool, LedgerError> {
        let sentinel = soy_sentinel_date(tax_year);
        let quantity = reported_quantity.abs();
        let mut missing_cost_basis = false;

        let total_value_eur = match (&asset.soy_cost_basis_amount, &asset.soy_cost_basis_currency)
        {
            (Some(amount), Some(currency)) => {
                match converter.convert_to_eur(amount.abs(), currency, sentinel) {
                    Ok(eur) => eur,
                    Err(err) => {
                        warn!(
                            "Asset {}: could not convert SOY cost basis ({} {}): {}; using zero cost",
                            asset.identity_key(),
                            amount,
                            currency,
                            err
                        );
                        missing_cost_basis = true;
                        Decimal::ZERO
                    }
                }
            }
            _ => {
                warn!(
                    "Asset {}: SOY cost basis missing; creating zero-cost fallback lot for qty {}",
                    asset.identity_key(),
                    reported_quantity
                );
                missing_cost_basis = true;
                Decimal::ZERO
            }
        };

        if reported_quantity > Decimal::ZERO {
            let tx_id = format!("{}_{}", SOY_FALLBACK_TX_PREFIX, self.asset_id);
            self.add_long_lot(sentinel, quantity, total_value_eur, &tx_id)?;
        } else {
            let tx_id = format!("{}_{}", SOY_FALLBACK_SHORT_TX_PREFIX, self.asset_id);
            self.add_short_lot(sentinel, quantity, total_value_eur, &tx_id)?;
        }
        info!(
            "Asset {}: created fallback SOY lot qty {} value {} EUR dated {}",
            asset.identity_key(),
            reported_quantity,
            total_value_eur,
            sentinel
        );
        Ok(missing_cost_basis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{Asset, AssetCategory, AssetId};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::from_str(s).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn stock_ledger() -> FifoLedger {
        let asset = Asset::new(AssetId(1), AssetCategory::Stock);
        FifoLedger::new(&asset)
    }

    fn option_ledger() -> FifoLedger {
        let asset = Asset::new(AssetId(2), AssetCategory::Option);
        FifoLedger::new(&asset)
    }

    #[test]
    fn test_multi_lot_sale_pro_rata() {
        // Scenario: buy 10@100 and 10@110 (1 EUR commission each), then
        // sell 15 for net proceeds 1799.00.
        let mut ledger = stock_ledger();
        ledger
            .add_long_lot(date("2023-03-01"), dec("10"), dec("1001.00"), "T1")
            .unwrap();
        ledger
            .add_long_lot(date("2023-04-01"), dec("10"), dec("1101.00"), "T2")
            .unwrap();

        let records = ledger
            .realize_long_sale(EventId(3), date("2023-06-01"), dec("15"), dec("1799.00"), "sale")
            .unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.quantity, dec("10"));
        assert_eq!(first.acquisition_date, date("2023-03-01"));
        assert_eq!(first.total_cost_basis_eur, dec("1001.00"));

        let second = &records[1];
        assert_eq!(second.quantity, dec("5"));
        assert_eq!(second.acquisition_date, date("2023-04-01"));
        assert_eq!(second.total_cost_basis_eur.round_dp(2), dec("550.50"));

        // Pro-rata proceeds sum back to the event's net value.
        let proceeds_total: Decimal = records
            .iter()
            .map(|r| r.total_realization_value_eur)
            .sum();
        assert!((proceeds_total - dec("1799.00")).abs() < dec("0.01"));

        // Remaining lot: 5 units at the second lot's unit cost.
        assert_eq!(ledger.lots().len(), 1);
        let remaining = &ledger.lots()[0];
        assert_eq!(remaining.quantity, dec("5"));
        assert_eq!(remaining.total_cost_eur.round_dp(2), dec("550.50"));
        assert!(remaining.invariant_holds());
    }

    #[test]
    fn test_underflow_is_error() {
        let mut ledger = stock_ledger();
        ledger
            .add_long_lot(date("2023-03-01"), dec("10"), dec("1000"), "T1")
            .unwrap();
        let result =
            ledger.realize_long_sale(EventId(2), date("2023-04-01"), dec("11"), dec("1200"), "sale");
        assert!(matches!(
            result,
            Err(LedgerError::ConsumptionUnderflow { .. })
        ));
    }

    #[test]
    fn test_long_short_mutual_exclusion() {
        let mut ledger = stock_ledger();
        ledger
            .add_long_lot(date("2023-03-01"), dec("10"), dec("1000"), "T1")
            .unwrap();
        let result = ledger.add_short_lot(date("2023-03-02"), dec("5"), dec("600"), "T2");
        assert!(matches!(result, Err(LedgerError::PositionConflict(_))));
    }

    #[test]
    fn test_short_cover_gain() {
        let mut ledger = stock_ledger();
        ledger
            .add_short_lot(date("2023-02-01"), dec("10"), dec("1500"), "T1")
            .unwrap();
        let records = ledger
            .realize_short_cover(EventId(2), date("2023-05-01"), dec("10"), dec("1200"), "cover")
            .unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.realization_type, RealizationType::ShortPositionCover);
        assert_eq!(record.gross_gain_loss_eur, dec("300"));
        assert_eq!(record.acquisition_date, date("2023-02-01"));
        assert!(ledger.short_lots().is_empty());
    }

    #[test]
    fn test_split_preserves_total_cost() {
        let mut ledger = stock_ledger();
        ledger
            .add_long_lot(date("2023-01-10"), dec("10"), dec("1000"), "T1")
            .unwrap();
        ledger.apply_split(dec("4"));
        let lot = &ledger.lots()[0];
        assert_eq!(lot.quantity, dec("40"));
        assert_eq!(lot.unit_cost_eur, dec("25"));
        assert_eq!(lot.total_cost_eur, dec("1000"));
        assert!(lot.invariant_holds());
    }

    #[test]
    fn test_cash_merger_clears_ledger() {
        let mut ledger = stock_ledger();
        ledger
            .add_long_lot(date("2023-01-10"), dec("10"), dec("1000"), "T1")
            .unwrap();
        let records =
            ledger.consume_all_for_cash_merger(EventId(2), date("2023-08-01"), dec("120"));
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].realization_type,
            RealizationType::CashMergerProceeds
        );
        assert_eq!(records[0].gross_gain_loss_eur, dec("200"));
        assert!(ledger.lots().is_empty());
    }

    #[test]
    fn test_capital_repayment_reduces_then_overflows() {
        // Scenario: lot of 100 shares at total cost 150; a repayment of
        // 245 zeroes the basis and returns 95 as taxable excess.
        let mut ledger = stock_ledger();
        ledger
            .add_long_lot(date("2023-01-10"), dec("100"), dec("150"), "T1")
            .unwrap();
        let excess = ledger.reduce_cost_basis_for_capital_repayment(dec("245"));
        assert_eq!(excess, dec("95"));
        let lot = &ledger.lots()[0];
        assert_eq!(lot.total_cost_eur, Decimal::ZERO);
        assert_eq!(lot.unit_cost_eur, Decimal::ZERO);
        assert_eq!(lot.quantity, dec("100"));
    }

    #[test]
    fn test_capital_repayment_spans_lots_oldest_first() {
        let mut ledger = stock_ledger();
        ledger
            .add_long_lot(date("2023-01-10"), dec("10"), dec("100"), "T1")
            .unwrap();
        ledger
            .add_long_lot(date("2023-02-10"), dec("10"), dec("200"), "T2")
            .unwrap();
        let excess = ledger.reduce_cost_basis_for_capital_repayment(dec("150"));
        assert_eq!(excess, Decimal::ZERO);
        assert_eq!(ledger.lots()[0].total_cost_eur, Decimal::ZERO);
        assert_eq!(ledger.lots()[1].total_cost_eur, dec("150"));
    }

    #[test]
    fn test_stock_dividend_lot_at_fmv() {
        let mut ledger = stock_ledger();
        ledger
            .add_stock_dividend_lot(EventId(1), date("2023-05-02"), dec("10"), dec("34.07"), None)
            .unwrap();
        let lot = &ledger.lots()[0];
        assert_eq!(lot.quantity, dec("10"));
        assert_eq!(lot.unit_cost_eur, dec("34.07"));
        assert_eq!(lot.total_cost_eur, dec("340.70"));
    }

    #[test]
    fn test_option_premium_consumption() {
        let mut ledger = option_ledger();
        ledger
            .add_short_lot(date("2023-01-10"), dec("1"), dec("299.00"), "T1")
            .unwrap();
        let consumed = ledger
            .consume_short_option_premium(dec("1"), "assignment")
            .unwrap();
        assert_eq!(consumed.len(), 1);
        assert_eq!(consumed[0].unit_value_eur, dec("299.00"));
        assert!(ledger.short_lots().is_empty());
    }

    #[test]
    fn test_option_premium_on_stock_ledger_rejected() {
        let mut ledger = stock_ledger();
        assert!(matches!(
            ledger.consume_long_option_premium(dec("1"), "x"),
            Err(LedgerError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_partial_consumption_keeps_invariant() {
        let mut ledger = stock_ledger();
        ledger
            .add_long_lot(date("2023-03-01"), dec("3"), dec("100"), "T1")
            .unwrap();
        ledger.consume_long(dec("1"), "sale").unwrap();
        let lot = &ledger.lots()[0];
        assert_eq!(lot.quantity, dec("2"));
        assert!(lot.invariant_holds());
    }
}
