use crate::assets::assets_model::{AssetCategory, FundType};

/// Derives an asset category from broker row hints.
///
/// This is the non-interactive part of classification; ambiguous instruments
/// (a stock that looks like a fund, an unknown ETC) are left for the host's
/// interactive classification flow, which feeds its verdicts back through
/// the resolver.
#[derive(Debug, Default, Clone)]
pub struct AssetClassifier;

impl AssetClassifier {
    pub fn new() -> Self {
        AssetClassifier
    }

    /// Maps broker asset class / sub-category / description hints to a
    /// preliminary category and fund type.
    pub fn preliminary_classify(
        &self,
        asset_class: Option<&str>,
        sub_category: Option<&str>,
        description: Option<&str>,
        symbol: Option<&str>,
    ) -> (AssetCategory, FundType) {
        let class = asset_class.unwrap_or("").trim().to_uppercase();
        let sub = sub_category.unwrap_or("").trim().to_uppercase();
        let desc = description.unwrap_or("").trim().to_uppercase();
        let sym = symbol.unwrap_or("").trim().to_uppercase();

        if class == "FUND"
            || sub.contains("ETF")
            || sub.contains("FUND")
            || desc.contains("ETF")
            || desc.contains("INVESTMENT FUND")
        {
            return (AssetCategory::InvestmentFund, guess_fund_type(&desc));
        }

        // Gold and crypto ETCs/ETPs fall under §23 EStG, not Anlage KAP.
        if desc.contains("XETRA-GOLD")
            || desc.contains("PHYSICAL GOLD")
            || matches!(sym.as_str(), "4GLD" | "XAD5" | "GZLD" | "BTCE")
            || desc.contains("BTCETC")
            || desc.contains("BITCOIN ETP")
            || (desc.contains("ETC")
                && (desc.contains("GOLD") || desc.contains("CRYPTO") || desc.contains("BITCOIN")))
        {
            return (AssetCategory::PrivateSaleAsset, FundType::None);
        }

        if class == "OPT" {
            return (AssetCategory::Option, FundType::None);
        }
        if class == "CFD" {
            return (AssetCategory::Cfd, FundType::None);
        }
        if class == "STK" || sub == "COMMON" || sub == "PREFERRED" {
            return (AssetCategory::Stock, FundType::None);
        }
        if class == "BOND" {
            return (AssetCategory::Bond, FundType::None);
        }

        if class == "CASH" {
            // An instrument whose symbol is a currency pair ("EUR.USD") is
            // an FX trading pair, never a cash balance. Its trades become
            // currency conversions.
            if is_fx_pair_symbol(&sym) {
                return (AssetCategory::Unknown, FundType::None);
            }
            return (AssetCategory::CashBalance, FundType::None);
        }

        (AssetCategory::Unknown, FundType::None)
    }
}

fn guess_fund_type(desc: &str) -> FundType {
    if desc.contains("AKTIEN") || desc.contains("EQUITY") || desc.contains("STOCK") {
        FundType::Aktienfonds
    } else if desc.contains("MISCH") || desc.contains("MIXED") || desc.contains("MULTI-ASSET") {
        FundType::Mischfonds
    } else if desc.contains("IMMOBILIEN") || desc.contains("REAL ESTATE") {
        FundType::Immobilienfonds
    } else {
        FundType::SonstigeFonds
    }
}

/// True for symbols of the form `XXX.YYY` where both legs look like
/// three-letter currency codes.
pub fn is_fx_pair_symbol(symbol: &str) -> bool {
    let mut parts = symbol.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => {
            a.len() == 3
                && b.len() == 3
                && a.chars().all(|c| c.is_ascii_alphabetic())
                && b.chars().all(|c| c.is_ascii_alphabetic())
        }
        _ => false,
    }
}
