use chrono::NaiveDate;
use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::assets::{AssetCategory, AssetId, AssetResolver, FundType};
use crate::config::EngineConfig;
use crate::constants::DERIVATIVE_LOSS_CAP_EUR;
use crate::events::{CashFlowKind, CorporateActionKind, EventPayload, FinancialEvent};
use crate::taxes::taxes_model::{RealizedGainLoss, VorabpauschaleData};
use crate::taxes::teilfreistellung::teilfreistellung_rate;
use crate::utils::date_utils::{year_end, year_start};

/// One Anlage-SO line item (Zeilen 42–53). Exempt transactions are listed
/// but excluded from the Zeile 54 total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section23Row {
    pub asset_id: AssetId,
    pub asset_label: String,
    pub acquisition_date: NaiveDate,
    pub sale_date: NaiveDate,
    pub quantity: Decimal,
    pub total_cost_basis_eur: Decimal,
    pub total_proceeds_eur: Decimal,
    pub gain_loss_eur: Decimal,
    pub holding_period_days: Option<i64>,
    pub taxable: bool,
}

/// Aggregated form-line figures and conceptual net summaries.
///
/// Form lines are gross per the JStG reporting scheme: Zeile 19 nets stock
/// and other losses but never derivative losses; lines 20–24 carry the
/// gross pools; KAP-INV lines stay gross per fund type (Teilfreistellung
/// only shapes the internal net summaries).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LossOffsettingResult {
    pub kap_zeile_19: Decimal,
    pub kap_zeile_20: Decimal,
    pub kap_zeile_21: Decimal,
    pub kap_zeile_22: Decimal,
    pub kap_zeile_23: Decimal,
    pub kap_zeile_24: Decimal,
    pub kap_zeile_41: Decimal,

    pub kap_inv_distributions_gross: BTreeMap<FundType, Decimal>,
    pub kap_inv_vorabpauschale_gross: BTreeMap<FundType, Decimal>,
    pub kap_inv_sale_gains_gross: BTreeMap<FundType, Decimal>,

    pub so_zeile_54: Decimal,
    pub section_23_transactions: Vec<Section23Row>,

    pub conceptual_net_stocks: Decimal,
    pub conceptual_net_derivatives_uncapped: Decimal,
    pub conceptual_net_derivatives_capped: Decimal,
    pub conceptual_net_other_income: Decimal,
    pub conceptual_fund_income_net_taxable: Decimal,
    pub conceptual_net_section_23: Decimal,
}

/// Classifies every realization and income event of the tax year into the
/// correct offsetting pool and derives the declared form lines.
pub struct LossOffsettingEngine<'a> {
    config: &'a EngineConfig,
    resolver: &'a AssetResolver,
}

impl<'a> LossOffsettingEngine<'a> {
    pub fn new(config: &'a EngineConfig, resolver: &'a AssetResolver) -> Self {
        LossOffsettingEngine { config, resolver }
    }

    pub fn calculate(
        &self,
        realized_gains_losses: &[RealizedGainLoss],
        vorabpauschale_items: &[VorabpauschaleData],
        events: &[FinancialEvent],
    ) -> LossOffsettingResult {
        let start = year_start(self.config.tax_year);
        let end = year_end(self.config.tax_year);
        let in_year = |date: NaiveDate| date >= start && date <= end;

        let mut stock_gains_gross = Decimal::ZERO;
        let mut stock_losses_abs = Decimal::ZERO;
        let mut derivative_gains_gross = Decimal::ZERO;
        let mut derivative_losses_abs = Decimal::ZERO;
        let mut kap_other_income_positive = Decimal::ZERO;
        let mut kap_other_losses_abs = Decimal::ZERO;
        let mut fund_income_net_taxable = Decimal::ZERO;
        let mut section_23_net = Decimal::ZERO;
        let mut foreign_tax_paid = Decimal::ZERO;

        let mut result = LossOffsettingResult::default();

        for rgl in realized_gains_losses {
            if !in_year(rgl.realization_date) {
                continue;
            }
            let gross = rgl.gross_gain_loss_eur;
            match rgl.category {
                AssetCategory::Stock => {
                    if gross > Decimal::ZERO {
                        stock_gains_gross += gross;
                    } else {
                        stock_losses_abs += gross.abs();
                    }
                }
                AssetCategory::Option | AssetCategory::Cfd => {
                    if gross > Decimal::ZERO {
                        derivative_gains_gross += gross;
                    } else {
                        derivative_losses_abs += gross.abs();
                    }
                }
                AssetCategory::Bond => {
                    if gross > Decimal::ZERO {
                        kap_other_income_positive += gross;
                    } else {
                        kap_other_losses_abs += gross.abs();
                    }
                }
                AssetCategory::InvestmentFund => {
                    let net = rgl.net_after_teilfreistellung_eur.unwrap_or_else(|| {
                        warn!(
                            "Fund realization {} lacks a net-after-Teilfreistellung value; using gross",
                            rgl.originating_event_id
                        );
                        gross
                    });
                    fund_income_net_taxable += net;
                    let fund_type = rgl.fund_type.unwrap_or(FundType::None);
                    *result
                        .kap_inv_sale_gains_gross
                        .entry(fund_type)
                        .or_insert(Decimal::ZERO) += gross;
                }
                AssetCategory::PrivateSaleAsset => {
                    if rgl.is_taxable_under_section_23 {
                        section_23_net += gross;
                    }
                    result.section_23_transactions.push(Section23Row {
                        asset_id: rgl.asset_id,
                        asset_label: self
                            .resolver
                            .get(rgl.asset_id)
                            .map(|asset| asset.display_label())
                            .unwrap_or_else(|| rgl.asset_id.to_string()),
                        acquisition_date: rgl.acquisition_date,
                        sale_date: rgl.realization_date,
                        quantity: rgl.quantity,
                        total_cost_basis_eur: rgl.total_cost_basis_eur,
                        total_proceeds_eur: rgl.total_realization_value_eur,
                        gain_loss_eur: gross,
                        holding_period_days: rgl.holding_period_days,
                        taxable: rgl.is_taxable_under_section_23,
                    });
                }
                AssetCategory::CashBalance | AssetCategory::Unknown => {}
            }
        }

        for event in events {
            if !in_year(event.date) {
                continue;
            }
            let gross_eur = event.gross_amount_eur.unwrap_or(Decimal::ZERO);
            let category = self
                .resolver
                .get(event.asset_id)
                .map(|asset| asset.category)
                .unwrap_or(AssetCategory::Unknown);

            match &event.payload {
                EventPayload::CashFlow(cash) => match cash.kind {
                    CashFlowKind::DividendCash => {
                        if category == AssetCategory::Stock && gross_eur > Decimal::ZERO {
                            kap_other_income_positive += gross_eur;
                        }
                    }
                    CashFlowKind::PaymentInLieuDividend => {
                        if gross_eur > Decimal::ZERO {
                            kap_other_income_positive += gross_eur;
                        }
                    }
                    CashFlowKind::InterestReceived => {
                        if gross_eur > Decimal::ZERO {
                            kap_other_income_positive += gross_eur;
                        }
                    }
                    CashFlowKind::InterestPaidStueckzinsen => {
                        if !gross_eur.is_zero() {
                            kap_other_losses_abs += gross_eur.abs();
                        }
                    }
                    CashFlowKind::DistributionFund => {
                        if category == AssetCategory::InvestmentFund {
                            let fund_type = self
                                .resolver
                                .get(event.asset_id)
                                .map(|asset| asset.fund_type)
                                .unwrap_or(FundType::None);
                            let rate = teilfreistellung_rate(fund_type);
                            let exempt = if gross_eur > Decimal::ZERO {
                                gross_eur * rate
                            } else {
                                Decimal::ZERO
                            };
                            fund_income_net_taxable += gross_eur - exempt;
                            *result
                                .kap_inv_distributions_gross
                                .entry(fund_type)
                                .or_insert(Decimal::ZERO) += gross_eur;
                        }
                    }
                    // The excess over the remaining basis is taxable no
                    // matter what kind of instrument was repaid.
                    CashFlowKind::CapitalRepaymentExcess => {
                        if gross_eur > Decimal::ZERO {
                            kap_other_income_positive += gross_eur;
                        }
                    }
                    // Repayments themselves only reduce basis in the
                    // ledger; their excess arrives as the event above.
                    CashFlowKind::CapitalRepayment => {}
                },
                EventPayload::WithholdingTax(_) => {
                    foreign_tax_paid += gross_eur;
                }
                EventPayload::CorporateAction(details) => {
                    if matches!(details.kind, CorporateActionKind::StockDividend { .. })
                        && category == AssetCategory::Stock
                        && gross_eur > Decimal::ZERO
                    {
                        // Fair-market-value income of a taxable stock
                        // dividend.
                        kap_other_income_positive += gross_eur;
                    }
                }
                _ => {}
            }
        }

        for item in vorabpauschale_items {
            if item.tax_year != self.config.tax_year {
                continue;
            }
            fund_income_net_taxable += item.net_taxable_vorabpauschale_eur;
            if !item.gross_vorabpauschale_eur.is_zero() {
                *result
                    .kap_inv_vorabpauschale_gross
                    .entry(item.fund_type)
                    .or_insert(Decimal::ZERO) += item.gross_vorabpauschale_eur;
            }
        }

        // Zeile 19: all KAP income net of stock and other losses. Fund
        // items are excluded and derivative losses are NOT subtracted.
        let zeile_19 = stock_gains_gross + derivative_gains_gross + kap_other_income_positive
            - stock_losses_abs
            - kap_other_losses_abs;

        let quantize = |value: Decimal| self.config.quantize_amount(value);
        result.kap_zeile_19 = quantize(zeile_19);
        result.kap_zeile_20 = quantize(stock_gains_gross);
        result.kap_zeile_21 = quantize(derivative_gains_gross);
        result.kap_zeile_22 = quantize(kap_other_losses_abs);
        result.kap_zeile_23 = quantize(stock_losses_abs);
        result.kap_zeile_24 = quantize(derivative_losses_abs);
        result.kap_zeile_41 = quantize(foreign_tax_paid);
        result.so_zeile_54 = quantize(section_23_net);

        for value in result.kap_inv_distributions_gross.values_mut() {
            *value = quantize(*value);
        }
        for value in result.kap_inv_sale_gains_gross.values_mut() {
            *value = quantize(*value);
        }
        for value in result.kap_inv_vorabpauschale_gross.values_mut() {
            *value = quantize(*value);
        }

        result.conceptual_net_stocks = quantize(stock_gains_gross - stock_losses_abs);
        result.conceptual_net_other_income =
            quantize(kap_other_income_positive - kap_other_losses_abs);
        result.conceptual_fund_income_net_taxable = quantize(fund_income_net_taxable);
        result.conceptual_net_section_23 = quantize(section_23_net);

        let net_derivatives = derivative_gains_gross - derivative_losses_abs;
        result.conceptual_net_derivatives_uncapped = quantize(net_derivatives);
        result.conceptual_net_derivatives_capped =
            if self.config.apply_derivative_loss_cap && net_derivatives < Decimal::ZERO {
                let cap = Decimal::from_str(DERIVATIVE_LOSS_CAP_EUR).expect("static literal");
                quantize(net_derivatives.max(cap))
            } else {
                quantize(net_derivatives)
            };

        result
    }
}
