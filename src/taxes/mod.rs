pub(crate) mod loss_offsetting;
pub(crate) mod taxes_model;
pub(crate) mod teilfreistellung;

pub use loss_offsetting::{LossOffsettingEngine, LossOffsettingResult, Section23Row};
pub use taxes_model::{
    categorize_realization, RealizationCategorization, RealizationType, RealizedGainLoss,
    TaxReportingCategory, VorabpauschaleData,
};
pub use teilfreistellung::teilfreistellung_rate;
