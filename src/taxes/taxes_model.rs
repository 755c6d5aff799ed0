use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::assets::{AssetCategory, AssetId, FundType};
use crate::constants::SECTION_23_SPECULATION_DAYS;
use crate::events::EventId;
use crate::taxes::teilfreistellung::teilfreistellung_rate;

/// How a gain or loss was realized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RealizationType {
    LongPositionSale,
    ShortPositionCover,
    CashMergerProceeds,
    OptionExpiredLong,
    OptionExpiredShort,
    OptionTradeCloseLong,
    OptionTradeCloseShort,
}

/// Buckets the aggregator and the form renderer work with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaxReportingCategory {
    AnlageKapAktienGewinn,
    AnlageKapAktienVerlust,
    AnlageKapTerminGewinn,
    AnlageKapTerminVerlust,
    AnlageKapSonstigeKapitalertraege,
    AnlageKapSonstigeVerluste,
    AnlageKapAuslaendischeKapitalertraegeGesamt,
    AnlageKapForeignTaxPaid,
    KapInvAusschuettungGross(FundType),
    KapInvGewinnGross(FundType),
    KapInvVorabpauschaleGross(FundType),
    Section23EstgTaxableGain,
    Section23EstgTaxableLoss,
    Section23EstgExemptHoldingPeriodMet,
}

#[derive(Debug, Clone, Copy)]
pub struct RealizationCategorization {
    pub tax_category: Option<TaxReportingCategory>,
    pub is_taxable_under_section_23: bool,
    pub is_stillhalter_income: bool,
}

/// Derives the tax bucket for one realization.
pub fn categorize_realization(
    category: AssetCategory,
    fund_type: FundType,
    gross_gain_loss_eur: Decimal,
    holding_period_days: Option<i64>,
    realization_type: RealizationType,
) -> RealizationCategorization {
    let gain = gross_gain_loss_eur >= Decimal::ZERO;
    match category {
        AssetCategory::Stock => RealizationCategorization {
            tax_category: Some(if gain {
                TaxReportingCategory::AnlageKapAktienGewinn
            } else {
                TaxReportingCategory::AnlageKapAktienVerlust
            }),
            is_taxable_under_section_23: false,
            is_stillhalter_income: false,
        },
        AssetCategory::Bond => RealizationCategorization {
            tax_category: Some(if gain {
                TaxReportingCategory::AnlageKapSonstigeKapitalertraege
            } else {
                TaxReportingCategory::AnlageKapSonstigeVerluste
            }),
            is_taxable_under_section_23: false,
            is_stillhalter_income: false,
        },
        AssetCategory::Option | AssetCategory::Cfd => {
            // The premium kept by the writer of a short position is
            // Stillhalter income.
            let stillhalter = category == AssetCategory::Option
                && gain
                && matches!(
                    realization_type,
                    RealizationType::OptionExpiredShort
                        | RealizationType::OptionTradeCloseShort
                        | RealizationType::ShortPositionCover
                );
            RealizationCategorization {
                tax_category: Some(if gain {
                    TaxReportingCategory::AnlageKapTerminGewinn
                } else {
                    TaxReportingCategory::AnlageKapTerminVerlust
                }),
                is_taxable_under_section_23: false,
                is_stillhalter_income: stillhalter,
            }
        }
        AssetCategory::InvestmentFund => RealizationCategorization {
            tax_category: Some(TaxReportingCategory::KapInvGewinnGross(fund_type)),
            is_taxable_under_section_23: false,
            is_stillhalter_income: false,
        },
        AssetCategory::PrivateSaleAsset => {
            let within_period = holding_period_days
                .map_or(false, |days| days <= SECTION_23_SPECULATION_DAYS);
            let tax_category = if within_period {
                if gain {
                    TaxReportingCategory::Section23EstgTaxableGain
                } else {
                    TaxReportingCategory::Section23EstgTaxableLoss
                }
            } else {
                TaxReportingCategory::Section23EstgExemptHoldingPeriodMet
            };
            RealizationCategorization {
                tax_category: Some(tax_category),
                is_taxable_under_section_23: within_period,
                is_stillhalter_income: false,
            }
        }
        AssetCategory::CashBalance | AssetCategory::Unknown => RealizationCategorization {
            tax_category: None,
            is_taxable_under_section_23: false,
            is_stillhalter_income: false,
        },
    }
}

/// One realized gain/loss record, append-only output of the FIFO layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealizedGainLoss {
    pub originating_event_id: EventId,
    pub asset_id: AssetId,
    pub category: AssetCategory,
    /// Acquisition date of the consumed lot (opening date for shorts).
    pub acquisition_date: NaiveDate,
    pub realization_date: NaiveDate,
    pub realization_type: RealizationType,
    /// Quantity realized from this lot, always positive.
    pub quantity: Decimal,
    pub unit_cost_eur: Decimal,
    pub unit_realization_value_eur: Decimal,
    pub total_cost_basis_eur: Decimal,
    pub total_realization_value_eur: Decimal,
    pub gross_gain_loss_eur: Decimal,
    pub holding_period_days: Option<i64>,
    pub is_within_speculation_period: bool,
    pub is_taxable_under_section_23: bool,
    pub tax_category: Option<TaxReportingCategory>,
    pub fund_type: Option<FundType>,
    #[serde(with = "crate::utils::decimal_fmt::optional_amount")]
    pub teilfreistellung_rate: Option<Decimal>,
    #[serde(with = "crate::utils::decimal_fmt::optional_amount")]
    pub teilfreistellung_amount_eur: Option<Decimal>,
    #[serde(with = "crate::utils::decimal_fmt::optional_amount")]
    pub net_after_teilfreistellung_eur: Option<Decimal>,
    pub is_stillhalter_income: bool,
}

impl RealizedGainLoss {
    /// Builds a fully categorized record. Teilfreistellung fields stay at
    /// full precision; quantization is reporting's concern.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        originating_event_id: EventId,
        asset_id: AssetId,
        category: AssetCategory,
        fund_type: FundType,
        acquisition_date: NaiveDate,
        realization_date: NaiveDate,
        realization_type: RealizationType,
        quantity: Decimal,
        unit_cost_eur: Decimal,
        unit_realization_value_eur: Decimal,
        total_cost_basis_eur: Decimal,
        total_realization_value_eur: Decimal,
    ) -> Self {
        let gross_gain_loss_eur = total_realization_value_eur - total_cost_basis_eur;
        let holding_period_days = if realization_date >= acquisition_date {
            Some((realization_date - acquisition_date).num_days())
        } else {
            None
        };

        let categorization = categorize_realization(
            category,
            fund_type,
            gross_gain_loss_eur,
            holding_period_days,
            realization_type,
        );

        let is_fund = category == AssetCategory::InvestmentFund;
        let tf_rate = is_fund.then(|| teilfreistellung_rate(fund_type));
        let tf_amount = tf_rate.map(|rate| gross_gain_loss_eur.abs() * rate);
        let net_after = match (tf_amount, gross_gain_loss_eur >= Decimal::ZERO) {
            (Some(amount), true) => Some(gross_gain_loss_eur - amount),
            (Some(amount), false) => Some(gross_gain_loss_eur + amount),
            (None, _) => Some(gross_gain_loss_eur),
        };

        RealizedGainLoss {
            originating_event_id,
            asset_id,
            category,
            acquisition_date,
            realization_date,
            realization_type,
            quantity,
            unit_cost_eur,
            unit_realization_value_eur,
            total_cost_basis_eur,
            total_realization_value_eur,
            gross_gain_loss_eur,
            holding_period_days,
            is_within_speculation_period: category == AssetCategory::PrivateSaleAsset
                && categorization.is_taxable_under_section_23,
            is_taxable_under_section_23: categorization.is_taxable_under_section_23,
            tax_category: categorization.tax_category,
            fund_type: is_fund.then_some(fund_type),
            teilfreistellung_rate: tf_rate,
            teilfreistellung_amount_eur: tf_amount,
            net_after_teilfreistellung_eur: net_after,
            is_stillhalter_income: categorization.is_stillhalter_income,
        }
    }
}

/// Advance lump-sum taxation data per fund and year. The engine emits none
/// for the supported year (base rate zero), but reports carry the shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VorabpauschaleData {
    pub asset_id: AssetId,
    pub tax_year: i32,
    pub fund_value_start_eur: Decimal,
    pub fund_value_end_eur: Decimal,
    pub distributions_eur: Decimal,
    pub basiszins: Decimal,
    pub gross_vorabpauschale_eur: Decimal,
    pub fund_type: FundType,
    pub teilfreistellung_rate: Decimal,
    pub teilfreistellung_amount_eur: Decimal,
    pub net_taxable_vorabpauschale_eur: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::from_str(s).unwrap()
    }

    #[test]
    fn test_stock_gain_categorization() {
        let rgl = RealizedGainLoss::build(
            EventId(1),
            AssetId(1),
            AssetCategory::Stock,
            FundType::None,
            date("2023-03-01"),
            date("2023-06-01"),
            RealizationType::LongPositionSale,
            Decimal::from_str("10").unwrap(),
            Decimal::from_str("10.10").unwrap(),
            Decimal::from_str("12").unwrap(),
            Decimal::from_str("101").unwrap(),
            Decimal::from_str("120").unwrap(),
        );
        assert_eq!(rgl.gross_gain_loss_eur, Decimal::from_str("19").unwrap());
        assert_eq!(
            rgl.tax_category,
            Some(TaxReportingCategory::AnlageKapAktienGewinn)
        );
        assert_eq!(rgl.holding_period_days, Some(92));
        assert!(!rgl.is_stillhalter_income);
    }

    #[test]
    fn test_fund_teilfreistellung_on_gain() {
        let rgl = RealizedGainLoss::build(
            EventId(2),
            AssetId(2),
            AssetCategory::InvestmentFund,
            FundType::Aktienfonds,
            date("2023-01-10"),
            date("2023-09-10"),
            RealizationType::LongPositionSale,
            Decimal::from_str("5").unwrap(),
            Decimal::from_str("100").unwrap(),
            Decimal::from_str("120").unwrap(),
            Decimal::from_str("500").unwrap(),
            Decimal::from_str("600").unwrap(),
        );
        assert_eq!(rgl.teilfreistellung_rate, Some(Decimal::from_str("0.30").unwrap()));
        assert_eq!(
            rgl.teilfreistellung_amount_eur,
            Some(Decimal::from_str("30.00").unwrap())
        );
        assert_eq!(
            rgl.net_after_teilfreistellung_eur,
            Some(Decimal::from_str("70.00").unwrap())
        );
    }

    #[test]
    fn test_fund_teilfreistellung_softens_loss() {
        let rgl = RealizedGainLoss::build(
            EventId(3),
            AssetId(3),
            AssetCategory::InvestmentFund,
            FundType::Aktienfonds,
            date("2023-01-10"),
            date("2023-09-10"),
            RealizationType::LongPositionSale,
            Decimal::ONE,
            Decimal::from_str("100").unwrap(),
            Decimal::from_str("90").unwrap(),
            Decimal::from_str("100").unwrap(),
            Decimal::from_str("90").unwrap(),
        );
        // Loss of 10 with 30% exemption nets to -7.
        assert_eq!(
            rgl.net_after_teilfreistellung_eur,
            Some(Decimal::from_str("-7.00").unwrap())
        );
    }

    #[test]
    fn test_section_23_boundary() {
        let at_boundary = RealizedGainLoss::build(
            EventId(4),
            AssetId(4),
            AssetCategory::PrivateSaleAsset,
            FundType::None,
            date("2022-03-15"),
            date("2023-03-15"),
            RealizationType::LongPositionSale,
            Decimal::ONE,
            Decimal::from_str("100").unwrap(),
            Decimal::from_str("150").unwrap(),
            Decimal::from_str("100").unwrap(),
            Decimal::from_str("150").unwrap(),
        );
        assert_eq!(at_boundary.holding_period_days, Some(365));
        assert!(at_boundary.is_taxable_under_section_23);
        assert_eq!(
            at_boundary.tax_category,
            Some(TaxReportingCategory::Section23EstgTaxableGain)
        );

        let past_boundary = RealizedGainLoss::build(
            EventId(5),
            AssetId(4),
            AssetCategory::PrivateSaleAsset,
            FundType::None,
            date("2022-03-15"),
            date("2023-03-16"),
            RealizationType::LongPositionSale,
            Decimal::ONE,
            Decimal::from_str("100").unwrap(),
            Decimal::from_str("150").unwrap(),
            Decimal::from_str("100").unwrap(),
            Decimal::from_str("150").unwrap(),
        );
        assert_eq!(past_boundary.holding_period_days, Some(366));
        assert!(!past_boundary.is_taxable_under_section_23);
        assert_eq!(
            past_boundary.tax_category,
            Some(TaxReportingCategory::Section23EstgExemptHoldingPeriodMet)
        );
    }

    #[test]
    fn test_stillhalter_flag_on_short_option_gain() {
        let categorization = categorize_realization(
            AssetCategory::Option,
            FundType::None,
            Decimal::from_str("200").unwrap(),
            Some(7),
            RealizationType::OptionExpiredShort,
        );
        assert!(categorization.is_stillhalter_income);

        let long_expiry = categorize_realization(
            AssetCategory::Option,
            FundType::None,
            Decimal::from_str("-200").unwrap(),
            Some(7),
            RealizationType::OptionExpiredLong,
        );
        assert!(!long_expiry.is_stillhalter_income);
        assert_eq!(
            long_expiry.tax_category,
            Some(TaxReportingCategory::AnlageKapTerminVerlust)
        );
    }
}
