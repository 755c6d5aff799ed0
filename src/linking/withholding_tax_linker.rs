use chrono::NaiveDate;
use log::{debug, info, warn};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::assets::AssetId;
use crate::events::{CashFlowKind, EventId, EventPayload, FinancialEvent};

/// Minimum confidence a match needs to become a link.
const MIN_CONFIDENCE: u8 = 50;

/// A withholding-tax event tied to the income event it taxed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithholdingTaxLink {
    pub withholding_tax_event: EventId,
    pub income_event: EventId,
    pub confidence: u8,
    pub criteria: Vec<String>,
    pub effective_tax_rate: Option<Decimal>,
}

#[derive(Debug, Clone)]
struct IncomeCandidate {
    event_id: EventId,
    asset_id: AssetId,
    date: NaiveDate,
    currency: Option<String>,
    amount: Option<Decimal>,
    description: String,
    broker_transaction_id: Option<String>,
    kind: CashFlowKind,
}

#[derive(Debug, Clone)]
struct CandidateMatch {
    income_event: EventId,
    confidence: u8,
    criteria: Vec<String>,
    effective_tax_rate: Option<Decimal>,
}

/// Links withholding-tax events to the income events they belong to, using
/// layered strategies from exact (sequential broker ids on the same day) to
/// proximity (same asset and currency within three days). Unlinked events
/// are returned for diagnostics; Zeile 41 does not depend on the links.
pub fn link_withholding_tax(
    events: &mut [FinancialEvent],
) -> (Vec<WithholdingTaxLink>, Vec<EventId>) {
    let wht_on_interest_re = Regex::new(
        r"(?i)WITHHOLDING\s*(?:@\s*(\d{1,3}(?:\.\d+)?)%)?\s*ON\s*(?:CREDIT\s*)?INT(?:EREST)?",
    )
    .expect("static regex");
    let period_re = Regex::new(r"(?i)(?:FOR\s+|OF\s+)?([A-Z]{3})-?(\d{4})").expect("static regex");

    let income_candidates: Vec<IncomeCandidate> = events
        .iter()
        .filter_map(|event| match &event.payload {
            EventPayload::CashFlow(cash) => Some(IncomeCandidate {
                event_id: event.id,
                asset_id: event.asset_id,
                date: event.date,
                currency: event.currency.clone(),
                amount: event.gross_amount_foreign,
                description: event.description.clone().unwrap_or_default(),
                broker_transaction_id: event.broker_transaction_id.clone(),
                kind: cash.kind,
            }),
            _ => None,
        })
        .filter(|candidate| {
            matches!(
                candidate.kind,
                CashFlowKind::DividendCash
                    | CashFlowKind::DistributionFund
                    | CashFlowKind::InterestReceived
                    | CashFlowKind::PaymentInLieuDividend
                    | CashFlowKind::CapitalRepayment
            )
        })
        .collect();

    let mut links = Vec::new();
    let mut unlinked = Vec::new();

    for event in events.iter_mut() {
        if !matches!(event.payload, EventPayload::WithholdingTax(_)) {
            continue;
        }
        let wht_amount = event.gross_amount_foreign;
        let wht_description = event.description.clone().unwrap_or_default();

        let best = income_candidates
            .iter()
            .filter_map(|candidate| {
                try_exact(event, wht_amount, candidate)
                    .or_else(|| try_strong(event, wht_amount, candidate))
                    .or_else(|| {
                        try_interest_pattern(
                            event,
                            wht_amount,
                            &wht_description,
                            candidate,
                            &wht_on_interest_re,
                            &period_re,
                        )
                    })
                    .or_else(|| try_proximity(event, wht_amount, candidate))
            })
            .max_by_key(|candidate_match| {
                // Stable preference on equal confidence: earlier income
                // event id wins.
                (
                    candidate_match.confidence,
                    std::cmp::Reverse(candidate_match.income_event),
                )
            });

        match best.filter(|m| m.confidence >= MIN_CONFIDENCE) {
            Some(matched) => {
                if let EventPayload::WithholdingTax(details) = &mut event.payload {
                    details.taxed_income_event = Some(matched.income_event);
                    details.link_confidence = Some(matched.confidence);
                    details.effective_rate = matched.effective_tax_rate;
                }
                debug!(
                    "Linked WHT event {} to income event {} (confidence {})",
                    event.id, matched.income_event, matched.confidence
                );
                links.push(WithholdingTaxLink {
                    withholding_tax_event: event.id,
                    income_event: matched.income_event,
                    confidence: matched.confidence,
                    criteria: matched.criteria,
                    effective_tax_rate: matched.effective_tax_rate,
                });
            }
            None => {
                warn!(
                    "Could not link withholding tax event {} ({} {:?})",
                    event.context(),
                    event.gross_amount_foreign.unwrap_or_default(),
                    event.currency
                );
                unlinked.push(event.id);
            }
        }
    }

    info!(
        "Withholding tax linking: {} linked, {} unlinked",
        links.len(),
        unlinked.len()
    );
    (links, unlinked)
}

/// Exact: same day, asset and currency plus sequential broker transaction
/// ids (the tax row follows its income row within a handful of ids).
fn try_exact(
    wht: &FinancialEvent,
    wht_amount: Option<Decimal>,
    candidate: &IncomeCandidate,
) -> Option<CandidateMatch> {
    if wht.date != candidate.date
        || wht.asset_id != candidate.asset_id
        || wht.currency != candidate.currency
    {
        return None;
    }
    if !sequential_transaction_ids(
        wht.broker_transaction_id.as_deref(),
        candidate.broker_transaction_id.as_deref(),
    ) {
        return None;
    }
    if !amount_relationship_plausible(wht_amount, candidate.amount, "0.3") {
        return None;
    }
    Some(CandidateMatch {
        income_event: candidate.event_id,
        confidence: 100,
        criteria: vec![
            "exact_date".into(),
            "exact_asset".into(),
            "exact_currency".into(),
            "sequential_transaction_id".into(),
        ],
        effective_tax_rate: effective_rate(wht_amount, candidate.amount),
    })
}

/// Strong: same day, asset and currency with a plausible tax rate.
fn try_strong(
    wht: &FinancialEvent,
    wht_amount: Option<Decimal>,
    candidate: &IncomeCandidate,
) -> Option<CandidateMatch> {
    if wht.date != candidate.date
        || wht.asset_id != candidate.asset_id
        || wht.currency != candidate.currency
    {
        return None;
    }
    if !amount_relationship_plausible(wht_amount, candidate.amount, "0.1") {
        return None;
    }
    Some(CandidateMatch {
        income_event: candidate.event_id,
        confidence: 80,
        criteria: vec![
            "exact_date".into(),
            "exact_asset".into(),
            "exact_currency".into(),
            "valid_amount_relationship".into(),
        ],
        effective_tax_rate: effective_rate(wht_amount, candidate.amount),
    })
}

/// Interest pattern: "WITHHOLDING @ 20% ON CREDIT INTEREST" style rows are
/// matched to interest income by description, date and currency.
fn try_interest_pattern(
    wht: &FinancialEvent,
    wht_amount: Option<Decimal>,
    wht_description: &str,
    candidate: &IncomeCandidate,
    wht_on_interest_re: &Regex,
    period_re: &Regex,
) -> Option<CandidateMatch> {
    if candidate.kind != CashFlowKind::InterestReceived {
        return None;
    }
    if !wht_on_interest_re.is_match(wht_description) {
        return None;
    }
    if wht.date != candidate.date || wht.currency != candidate.currency {
        return None;
    }

    let mut criteria = vec![
        "interest_wht_pattern".into(),
        "exact_date".into(),
        "exact_currency".into(),
    ];
    let wht_period = extract_period(period_re, wht_description);
    let income_period = extract_period(period_re, &candidate.description);
    if wht_period.is_some() && wht_period == income_period {
        criteria.push("description_period_match".into());
    }
    if interest_rate_plausible(wht_amount, candidate.amount) {
        criteria.push("valid_interest_tax_rate".into());
    }

    Some(CandidateMatch {
        income_event: candidate.event_id,
        confidence: 70,
        criteria,
        effective_tax_rate: effective_rate(wht_amount, candidate.amount),
    })
}

/// Proximity fallback: same asset and currency within three days, with a
/// loosely plausible amount relationship.
fn try_proximity(
    wht: &FinancialEvent,
    wht_amount: Option<Decimal>,
    candidate: &IncomeCandidate,
) -> Option<CandidateMatch> {
    if wht.asset_id != candidate.asset_id || wht.currency != candidate.currency {
        return None;
    }
    if (wht.date - candidate.date).num_days().abs() > 3 {
        return None;
    }
    if !amount_relationship_plausible(wht_amount, candidate.amount, "0.5") {
        return None;
    }
    Some(CandidateMatch {
        income_event: candidate.event_id,
        confidence: 60,
        criteria: vec![
            "exact_asset".into(),
            "exact_currency".into(),
            "close_dates".into(),
            "reasonable_amount_relationship".into(),
        ],
        effective_tax_rate: effective_rate(wht_amount, candidate.amount),
    })
}

fn sequential_transaction_ids(wht_tx: Option<&str>, income_tx: Option<&str>) -> bool {
    let (Some(wht_tx), Some(income_tx)) = (wht_tx, income_tx) else {
        return false;
    };
    match (wht_tx.parse::<i64>(), income_tx.parse::<i64>()) {
        (Ok(wht_id), Ok(income_id)) => (1..=5).contains(&(wht_id - income_id)),
        _ => false,
    }
}

/// Plausible withholding rates run from 5% to 50%, widened by the given
/// tolerance.
fn amount_relationship_plausible(
    wht_amount: Option<Decimal>,
    income_amount: Option<Decimal>,
    tolerance: &str,
) -> bool {
    let (Some(wht), Some(income)) = (wht_amount, income_amount) else {
        return false;
    };
    if income <= Decimal::ZERO {
        return false;
    }
    let rate = wht / income;
    let tolerance = Decimal::from_str(tolerance).expect("static literal");
    let min = Decimal::from_str("0.05").expect("static literal") - tolerance;
    let max = Decimal::from_str("0.50").expect("static literal") + tolerance;
    rate >= min && rate <= max
}

/// EU interest withholding is typically 20% give or take 2%.
fn interest_rate_plausible(wht_amount: Option<Decimal>, income_amount: Option<Decimal>) -> bool {
    let (Some(wht), Some(income)) = (wht_amount, income_amount) else {
        return false;
    };
    if income <= Decimal::ZERO {
        return false;
    }
    let rate = wht / income;
    rate >= Decimal::from_str("0.18").expect("static literal")
        && rate <= Decimal::from_str("0.22").expect("static literal")
}

fn effective_rate(wht_amount: Option<Decimal>, income_amount: Option<Decimal>) -> Option<Decimal> {
    match (wht_amount, income_amount) {
        (Some(wht), Some(income)) if income > Decimal::ZERO => Some(wht / income),
        _ => None,
    }
}

fn extract_period(period_re: &Regex, description: &str) -> Option<(String, String)> {
    period_re
        .captures(description)
        .map(|caps| (caps[1].to_uppercase(), caps[2].to_string()))
}
