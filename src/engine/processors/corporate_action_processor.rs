use log::{debug, info};

use crate::engine::processors::ProcessingState;
use crate::engine::Diagnostic;
use crate::errors::Result;
use crate::events::{CorporateActionDetails, CorporateActionKind, FinancialEvent};
use crate::fifo::FifoLedger;
use crate::taxes::RealizedGainLoss;

/// Applies a corporate action to the asset's ledger. Runs before any
/// realization on the same date (enforced by the sort tier).
pub(crate) fn process_corporate_action(
    event: &FinancialEvent,
    details: &CorporateActionDetails,
    ledger: &mut FifoLedger,
    state: &mut ProcessingState,
) -> Result<Vec<RealizedGainLoss>> {
    match &details.kind {
        CorporateActionKind::SplitForward { ratio } => {
            info!(
                "Processing forward split ratio {} for asset {} ({})",
                ratio,
                event.asset_id,
                event.date
            );
            ledger.apply_split(*ratio);
            Ok(Vec::new())
        }
        CorporateActionKind::MergerCash {
            cash_per_share_eur, ..
        } => match cash_per_share_eur {
            Some(cash_eur) => {
                let records =
                    ledger.consume_all_for_cash_merger(event.id, event.date, *cash_eur);
                info!(
                    "Cash merger {} realized {} lots at {} EUR per share",
                    event.context(),
                    records.len(),
                    cash_eur
                );
                Ok(records)
            }
            None => {
                state.diagnostics.push(
                    Diagnostic::critical(format!(
                        "Cash merger {} is missing its EUR cash per share; ledger untouched",
                        event.context()
                    ))
                    .with_event(event.id)
                    .with_asset(event.asset_id),
                );
                Ok(Vec::new())
            }
        },
        CorporateActionKind::StockDividend {
            quantity_new_shares,
            fmv_per_share_eur,
            ..
        } => {
            ledger.add_stock_dividend_lot(
                event.id,
                event.date,
                *quantity_new_shares,
                fmv_per_share_eur.unwrap_or_default(),
                event.broker_transaction_id.as_deref(),
            )?;
            Ok(Vec::new())
        }
        CorporateActionKind::MergerStock {
            new_asset_id,
            new_shares_per_old,
        } => {
            // Lot conversion for tax-neutral stock mergers is deliberately
            // not performed; guessing an adjustment is worse than flagging.
            state.diagnostics.push(
                Diagnostic::critical(format!(
                    "Stock-for-stock merger {} into asset {} (ratio {}): lot conversion not performed, positions left unchanged",
                    event.context(),
                    new_asset_id,
                    new_shares_per_old
                ))
                .with_event(event.id)
                .with_asset(event.asset_id),
            );
            Ok(Vec::new())
        }
        CorporateActionKind::DividendRightsIssue
        | CorporateActionKind::ExpireDividendRights => {
            // Handled by the pre-FIFO re-attribution pass; the phantom
            // rights instrument never creates lots.
            debug!("Dividend-rights event {} needs no ledger action", event.context());
            Ok(Vec::new())
        }
        CorporateActionKind::Other { code } => {
            state.diagnostics.push(
                Diagnostic::warning(format!(
                    "Unsupported corporate action type '{}' at {}; no ledger modification",
                    code,
                    event.context()
                ))
                .with_event(event.id)
                .with_asset(event.asset_id),
            );
            Ok(Vec::new())
        }
    }
}
