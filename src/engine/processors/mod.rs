pub(crate) mod corporate_action_processor;
pub(crate) mod option_processor;
pub(crate) mod trade_processor;

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::assets::{AssetId, PutCall};
use crate::engine::Diagnostic;
use crate::events::{EventId, FinancialEvent};

/// Premium of a processed exercise/assignment, waiting for the linked
/// stock trade to fold it into its economics.
#[derive(Debug, Clone)]
pub(crate) struct PendingOptionAdjustment {
    pub premium_eur: Decimal,
    pub option_asset_id: AssetId,
    pub put_call: PutCall,
}

/// Mutable state shared by the per-event handlers.
#[derive(Default)]
pub(crate) struct ProcessingState {
    /// Keyed by option event id; ordered so leftover-premium diagnostics
    /// come out in a stable order.
    pub pending_option_adjustments: BTreeMap<EventId, PendingOptionAdjustment>,
    pub diagnostics: Vec<Diagnostic>,
    pub synthetic_events: Vec<FinancialEvent>,
}
