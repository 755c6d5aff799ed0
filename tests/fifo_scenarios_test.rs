mod common;

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use kapsteuer_core::engine::DiagnosticSeverity;
use kapsteuer_core::events::RawTradeRecord;
use kapsteuer_core::pipeline::{run_pipeline, PipelineInput};
use kapsteuer_core::taxes::RealizationType;

use common::*;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::from_str(s).unwrap()
}

/// Long FIFO with a multi-lot sale in EUR: two buys, one sale spanning
/// both lots, proceeds split pro-rata by quantity.
#[test]
fn test_scenario_long_fifo_multi_lot_sale() {
    let input = PipelineInput {
        trades: vec![
            stock_trade("SAP", "14204", "2023-03-01", "10", "10", "100", "-1", "BUY", "O", "T1"),
            stock_trade("SAP", "14204", "2023-04-01", "10", "11", "110", "-1", "BUY", "O", "T2"),
            stock_trade("SAP", "14204", "2023-06-01", "-15", "120", "1800", "-1", "SELL", "C", "T3"),
        ],
        positions_end: vec![eoy_position("SAP", "14204", "5")],
        ..Default::default()
    };

    let output = run_pipeline(input, eur_provider(), &config_2023()).unwrap();
    assert_eq!(output.eoy_mismatch_count, 0);

    let records = &output.realized_gains_losses;
    assert_eq!(records.len(), 2);

    let first = &records[0];
    assert_eq!(first.quantity, dec("10"));
    assert_eq!(first.acquisition_date, date("2023-03-01"));
    assert_eq!(first.total_cost_basis_eur, dec("101.00"));
    assert_eq!(first.total_realization_value_eur.round_dp(2), dec("1199.33"));
    assert_eq!(first.gross_gain_loss_eur.round_dp(2), dec("1098.33"));

    let second = &records[1];
    assert_eq!(second.quantity, dec("5"));
    assert_eq!(second.acquisition_date, date("2023-04-01"));
    assert_eq!(second.total_cost_basis_eur, dec("55.50"));
    assert_eq!(second.total_realization_value_eur.round_dp(2), dec("599.67"));
    assert_eq!(second.gross_gain_loss_eur.round_dp(2), dec("544.17"));

    // Quantities and proceeds reconcile with the sale event.
    let quantity_sum: Decimal = records.iter().map(|r| r.quantity).sum();
    assert_eq!(quantity_sum, dec("15"));
    let proceeds_sum: Decimal = records.iter().map(|r| r.total_realization_value_eur).sum();
    assert!((proceeds_sum - dec("1799.00")).abs() < dec("0.01"));

    assert_eq!(output.tax_summary.kap_zeile_20, dec("1642.50"));
}

/// Short put assignment: the received premium reduces the assigned stock's
/// cost basis; the option leg itself never produces a realization.
#[test]
fn test_scenario_short_put_assignment_folds_premium() {
    let input = PipelineInput {
        trades: vec![
            // Sell 1 put for 3.00, commission 1 -> net proceeds 299.00.
            option_trade(
                "SAP 230317P00050000",
                "900001",
                "14204",
                "P",
                "2023-01-10",
                "-1",
                "3",
                "300",
                "-1",
                "SELL",
                "O",
                None,
                "T10",
            ),
            // Assignment removes the short contract.
            option_trade(
                "SAP 230317P00050000",
                "900001",
                "14204",
                "P",
                "2023-03-10",
                "1",
                "0",
                "0",
                "0",
                "BUY",
                "C",
                Some("A"),
                "T11",
            ),
            // Assigned stock purchase: 100 @ 50, commission 1 -> 5001.00.
            {
                let mut row = stock_trade(
                    "SAP", "14204", "2023-03-10", "100", "50", "5000", "-1", "BUY", "O", "T12",
                );
                row.notes_codes = Some("A".into());
                row
            },
            // Sell the stock later to surface the adjusted basis.
            stock_trade("SAP", "14204", "2023-06-01", "-100", "48", "4800", "0", "SELL", "C", "T13"),
        ],
        ..Default::default()
    };

    let output = run_pipeline(input, eur_provider(), &config_2023()).unwrap();
    assert_eq!(output.eoy_mismatch_count, 0);
    assert!(output
        .diagnostics
        .iter()
        .all(|d| d.severity != DiagnosticSeverity::Critical));

    // Only the stock sale realizes; exercise/assignment legs do not.
    assert_eq!(output.realized_gains_losses.len(), 1);
    let sale = &output.realized_gains_losses[0];
    assert_eq!(sale.quantity, dec("100"));
    assert_eq!(sale.acquisition_date, date("2023-03-10"));
    // 5001.00 - 299.00 premium = 4702.00 basis, 47.02 per share.
    assert_eq!(sale.total_cost_basis_eur, dec("4702.00"));
    assert_eq!(sale.unit_cost_eur, dec("47.02"));
    assert_eq!(sale.gross_gain_loss_eur, dec("98.00"));
}

/// A short call expiring worthless keeps the premium as Stillhalter income
/// in the derivative gains pool.
#[test]
fn test_scenario_stillhalter_worthless_expiry() {
    let input = PipelineInput {
        trades: vec![
            option_trade(
                "SAP 230421C00060000",
                "900002",
                "14204",
                "C",
                "2023-04-14",
                "-1",
                "2",
                "200",
                "0",
                "SELL",
                "O",
                None,
                "T20",
            ),
            option_trade(
                "SAP 230421C00060000",
                "900002",
                "14204",
                "C",
                "2023-04-21",
                "1",
                "0",
                "0",
                "0",
                "BUY",
                "C",
                Some("Ep"),
                "T21",
            ),
        ],
        ..Default::default()
    };

    let output = run_pipeline(input, eur_provider(), &config_2023()).unwrap();
    assert_eq!(output.realized_gains_losses.len(), 1);

    let expiry = &output.realized_gains_losses[0];
    assert_eq!(expiry.realization_type, RealizationType::OptionExpiredShort);
    assert_eq!(expiry.gross_gain_loss_eur, dec("200.00"));
    assert!(expiry.is_stillhalter_income);
    assert_eq!(expiry.total_cost_basis_eur, dec("0"));

    assert_eq!(output.tax_summary.kap_zeile_21, dec("200.00"));
    assert_eq!(output.tax_summary.kap_zeile_24, dec("0.00"));
}

/// A capital repayment beyond the remaining cost basis zeroes the lot and
/// turns the excess into taxable dividend income.
#[test]
fn test_scenario_capital_repayment_excess() {
    let input = PipelineInput {
        trades: vec![stock_trade(
            "LEG", "450001", "2023-01-10", "100", "1.5", "150", "0", "BUY", "O", "T30",
        )],
        cash_transactions: vec![cash_transaction(
            Some("LEG"),
            Some("450001"),
            "2023-07-15",
            "Capital Repayment",
            "245",
            "EUR",
            "C30",
        )],
        positions_end: vec![eoy_position("LEG", "450001", "100")],
        ..Default::default()
    };

    let output = run_pipeline(input, eur_provider(), &config_2023()).unwrap();
    assert_eq!(output.eoy_mismatch_count, 0);

    // Excess 245 - 150 = 95 arrives as a synthetic dividend event.
    assert_eq!(output.tax_summary.kap_zeile_19, dec("95.00"));
    let synthetic_dividends = output
        .events
        .iter()
        .filter(|event| event.broker_transaction_id.is_none())
        .count();
    assert_eq!(synthetic_dividends, 1);
}

/// The excess is taxable income even when the repaid instrument is not a
/// stock.
#[test]
fn test_capital_repayment_excess_on_bond_counts_as_income() {
    let mut buy = stock_trade(
        "BUND26", "777001", "2023-01-10", "100", "1.5", "150", "0", "BUY", "O", "T31",
    );
    buy.asset_class = Some("BOND".into());
    buy.sub_category = None;
    buy.description = Some("BUND 0.5 02/26".into());

    let mut repayment = cash_transaction(
        Some("BUND26"),
        Some("777001"),
        "2023-07-15",
        "Capital Repayment",
        "245",
        "EUR",
        "C31",
    );
    repayment.asset_class = Some("BOND".into());

    let mut eoy = eoy_position("BUND26", "777001", "100");
    eoy.asset_class = Some("BOND".into());

    let input = PipelineInput {
        trades: vec![buy],
        cash_transactions: vec![repayment],
        positions_end: vec![eoy],
        ..Default::default()
    };

    let output = run_pipeline(input, eur_provider(), &config_2023()).unwrap();
    assert_eq!(output.eoy_mismatch_count, 0);
    assert_eq!(output.tax_summary.kap_zeile_19, dec("95.00"));
}

/// §23 boundary: a sale on day 365 is taxable, day 366 is exempt but still
/// listed in the Anlage SO transactions.
#[test]
fn test_scenario_section_23_boundary() {
    fn gold_trade(
        symbol: &str,
        conid: &str,
        day: &str,
        quantity: &str,
        price: &str,
        money: &str,
        buy_sell: &str,
        open_close: &str,
        tx: &str,
    ) -> RawTradeRecord {
        RawTradeRecord {
            currency: Some("EUR".into()),
            asset_class: Some("STK".into()),
            symbol: Some(symbol.into()),
            description: Some("XETRA-GOLD".into()),
            conid: Some(conid.into()),
            trade_date: Some(day.into()),
            quantity: Some(quantity.into()),
            trade_price: Some(price.into()),
            trade_money: Some(money.into()),
            commission: Some("0".into()),
            buy_sell: Some(buy_sell.into()),
            open_close_indicator: Some(open_close.into()),
            transaction_id: Some(tx.into()),
            ..Default::default()
        }
    }

    let mut soy_a = eoy_position("4GLD", "770001", "1");
    soy_a.description = Some("XETRA-GOLD".into());
    soy_a.cost_basis_money = Some("100".into());
    let mut soy_b = eoy_position("XAD5", "770002", "1");
    soy_b.description = Some("XETRA-GOLD".into());
    soy_b.cost_basis_money = Some("100".into());

    let input = PipelineInput {
        trades: vec![
            gold_trade("4GLD", "770001", "2022-03-15", "1", "100", "100", "BUY", "O", "T40"),
            gold_trade("XAD5", "770002", "2022-03-15", "1", "100", "100", "BUY", "O", "T41"),
            gold_trade("4GLD", "770001", "2023-03-15", "-1", "150", "150", "SELL", "C", "T42"),
            gold_trade("XAD5", "770002", "2023-03-16", "-1", "150", "150", "SELL", "C", "T43"),
        ],
        positions_start: vec![soy_a, soy_b],
        ..Default::default()
    };

    let output = run_pipeline(input, eur_provider(), &config_2023()).unwrap();
    assert_eq!(output.realized_gains_losses.len(), 2);

    let taxable = &output.realized_gains_losses[0];
    assert_eq!(taxable.holding_period_days, Some(365));
    assert!(taxable.is_taxable_under_section_23);

    let exempt = &output.realized_gains_losses[1];
    assert_eq!(exempt.holding_period_days, Some(366));
    assert!(!exempt.is_taxable_under_section_23);

    // Only the in-period gain reaches Zeile 54; both sales are listed.
    assert_eq!(output.tax_summary.so_zeile_54, dec("50.00"));
    assert_eq!(output.tax_summary.section_23_transactions.len(), 2);
    // §23 assets never leak into Anlage KAP.
    assert_eq!(output.tax_summary.kap_zeile_19, dec("0.00"));
    assert_eq!(output.tax_summary.kap_zeile_20, dec("0.00"));
}

/// Forward split before a same-day sale: the split adjusts lots first
/// (tier ordering), total cost is conserved.
#[test]
fn test_split_adjusts_before_same_day_sale() {
    let input = PipelineInput {
        trades: vec![
            stock_trade("AAPL", "265598", "2023-02-01", "10", "100", "1000", "0", "BUY", "O", "T50"),
            stock_trade("AAPL", "265598", "2023-08-25", "-20", "30", "600", "0", "SELL", "C", "T51"),
        ],
        corporate_actions: vec![corporate_action(
            "AAPL",
            "265598",
            "2023-08-25",
            "FS",
            "AAPL(US0378331005) SPLIT 4 FOR 1 (AAPL, APPLE INC, US0378331005)",
            None,
            None,
            None,
            "CA50",
        )],
        positions_end: vec![eoy_position("AAPL", "265598", "20")],
        ..Default::default()
    };

    let output = run_pipeline(input, eur_provider(), &config_2023()).unwrap();
    assert_eq!(output.eoy_mismatch_count, 0);
    assert_eq!(output.realized_gains_losses.len(), 1);

    let sale = &output.realized_gains_losses[0];
    // 20 of 40 post-split shares at unit cost 25: basis 500, proceeds 600.
    assert_eq!(sale.quantity, dec("20"));
    assert_eq!(sale.total_cost_basis_eur, dec("500.00"));
    assert_eq!(sale.gross_gain_loss_eur, dec("100.00"));
    assert_eq!(*output.final_quantities.values().next().unwrap(), dec("20"));
}

/// Cash merger: all lots realize at the per-share cash price and the
/// ledger ends flat.
#[test]
fn test_cash_merger_realizes_all_lots() {
    let input = PipelineInput {
        trades: vec![stock_trade(
            "TGT", "560001", "2023-01-20", "10", "100", "1000", "0", "BUY", "O", "T60",
        )],
        corporate_actions: vec![corporate_action(
            "TGT",
            "560001",
            "2023-09-15",
            "TC",
            "TGT(US8888888888) MERGED(ACQUISITION) FOR EUR 120 PER SHARE (TGT, TARGET CORP, US8888888888)",
            Some("-10"),
            Some("1200"),
            None,
            "CA60",
        )],
        ..Default::default()
    };

    let output = run_pipeline(input, eur_provider(), &config_2023()).unwrap();
    assert_eq!(output.eoy_mismatch_count, 0);
    assert_eq!(output.realized_gains_losses.len(), 1);

    let merger = &output.realized_gains_losses[0];
    assert_eq!(merger.realization_type, RealizationType::CashMergerProceeds);
    assert_eq!(merger.gross_gain_loss_eur, dec("200.00"));
    assert_eq!(output.tax_summary.kap_zeile_20, dec("200.00"));
}

/// Withholding tax: Zeile 41 sums the EUR amounts and the linker ties the
/// tax row to its dividend.
#[test]
fn test_dividend_with_withholding_tax() {
    let mut dividend = cash_transaction(
        Some("AAPL"),
        Some("265598"),
        "2023-05-18",
        "Dividends",
        "24.00",
        "USD",
        "1000",
    );
    dividend.description = Some("AAPL (US0378331005) CASH DIVIDEND USD 0.24 PER SHARE".into());
    let mut wht = cash_transaction(
        Some("AAPL"),
        Some("265598"),
        "2023-05-18",
        "Withholding Tax",
        "-3.60",
        "USD",
        "1001",
    );
    wht.description = Some("AAPL (US0378331005) CASH DIVIDEND - US TAX".into());

    let input = PipelineInput {
        cash_transactions: vec![dividend, wht],
        ..Default::default()
    };

    let output = run_pipeline(
        input,
        provider_with(&[("USD", "2023-05-18", "1.2")]),
        &config_2023(),
    )
    .unwrap();

    assert_eq!(output.tax_summary.kap_zeile_41, dec("3.00"));
    assert_eq!(output.tax_summary.kap_zeile_19, dec("20.00"));
    assert_eq!(output.withholding_tax_links.len(), 1);
    assert_eq!(output.withholding_tax_links[0].confidence, 100);
}
