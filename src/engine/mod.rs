pub(crate) mod calculation_engine;
pub(crate) mod processors;

pub use calculation_engine::{run_calculations, CalculationOutcome};

use serde::{Deserialize, Serialize};

use crate::assets::AssetId;
use crate::events::EventId;

/// Critical findings are surfaced in reports but never abort processing;
/// fatal conditions become `Err` values instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticSeverity {
    Critical,
    Warning,
}

/// One per-run finding for the host's report rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub message: String,
    pub event_id: Option<EventId>,
    pub asset_id: Option<AssetId>,
}

impl Diagnostic {
    pub fn critical(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: DiagnosticSeverity::Critical,
            message: message.into(),
            event_id: None,
            asset_id: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: DiagnosticSeverity::Warning,
            message: message.into(),
            event_id: None,
            asset_id: None,
        }
    }

    pub fn with_event(mut self, event_id: EventId) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn with_asset(mut self, asset_id: AssetId) -> Self {
        self.asset_id = Some(asset_id);
        self
    }
}
