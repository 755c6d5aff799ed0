use log::{debug, warn};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::assets::assets_classifier::AssetClassifier;
use crate::assets::assets_model::{
    Asset, AssetCategory, AssetId, DerivativeSpec, DescriptionSource, FundType, PutCall,
};
use crate::constants::{
    ALIAS_PREFIX_CASH, ALIAS_PREFIX_CONID, ALIAS_PREFIX_ISIN, ALIAS_PREFIX_SYMBOL,
};
use crate::utils::date_utils::parse_broker_date;

/// Identifier and hint set extracted from one input row.
#[derive(Debug, Clone)]
pub struct AssetLookup {
    pub isin: Option<String>,
    pub conid: Option<String>,
    pub symbol: Option<String>,
    pub currency: Option<String>,
    pub asset_class: Option<String>,
    pub sub_category: Option<String>,
    pub description: Option<String>,
    pub source: DescriptionSource,
    pub multiplier: Option<Decimal>,
    pub strike: Option<Decimal>,
    pub expiry: Option<String>,
    pub put_call: Option<String>,
    pub underlying_conid: Option<String>,
    pub underlying_symbol: Option<String>,
}

impl Default for AssetLookup {
    fn default() -> Self {
        AssetLookup {
            isin: None,
            conid: None,
            symbol: None,
            currency: None,
            asset_class: None,
            sub_category: None,
            description: None,
            source: DescriptionSource::Generated,
            multiplier: None,
            strike: None,
            expiry: None,
            put_call: None,
            underlying_conid: None,
            underlying_symbol: None,
        }
    }
}

impl AssetLookup {
    /// Lookup for the cash balance of a currency.
    pub fn cash_balance(currency: &str) -> Self {
        AssetLookup {
            symbol: Some(currency.to_string()),
            currency: Some(currency.to_string()),
            asset_class: Some("CASH".to_string()),
            description: Some(format!("Cash Balance {}", currency)),
            source: DescriptionSource::Generated,
            ..Default::default()
        }
    }
}

/// Process-wide mapping from alias strings to canonical assets.
///
/// Invariant: every alias in the map resolves to exactly one live asset and
/// that asset's alias set contains the alias. Assets merged away leave a
/// redirect so stale ids keep resolving to the survivor.
pub struct AssetResolver {
    classifier: AssetClassifier,
    alias_map: HashMap<String, AssetId>,
    assets: BTreeMap<AssetId, Asset>,
    redirects: HashMap<AssetId, AssetId>,
    next_id: u64,
    synthetic_counter: u64,
}

impl AssetResolver {
    pub fn new(classifier: AssetClassifier) -> Self {
        AssetResolver {
            classifier,
            alias_map: HashMap::new(),
            assets: BTreeMap::new(),
            redirects: HashMap::new(),
            next_id: 1,
            synthetic_counter: 0,
        }
    }

    fn allocate_id(&mut self) -> AssetId {
        let id = AssetId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Follows merge redirects to the surviving id.
    pub fn canonical_id(&self, id: AssetId) -> AssetId {
        let mut current = id;
        while let Some(next) = self.redirects.get(&current) {
            current = *next;
        }
        current
    }

    pub fn get(&self, id: AssetId) -> Option<&Asset> {
        self.assets.get(&self.canonical_id(id))
    }

    pub fn get_mut(&mut self, id: AssetId) -> Option<&mut Asset> {
        let canonical = self.canonical_id(id);
        self.assets.get_mut(&canonical)
    }

    pub fn get_by_alias(&self, alias: &str) -> Option<&Asset> {
        self.alias_map.get(alias).and_then(|id| self.get(*id))
    }

    /// Iterates all live assets in stable id order.
    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    fn generate_aliases(
        isin: Option<&str>,
        conid: Option<&str>,
        symbol: Option<&str>,
        currency: Option<&str>,
        asset_class: Option<&str>,
    ) -> BTreeSet<String> {
        let mut aliases = BTreeSet::new();
        if let Some(isin) = isin {
            aliases.insert(format!("{}{}", ALIAS_PREFIX_ISIN, isin));
        }
        if let Some(conid) = conid {
            aliases.insert(format!("{}{}", ALIAS_PREFIX_CONID, conid));
        }
        if let Some(symbol) = symbol {
            aliases.insert(format!("{}{}", ALIAS_PREFIX_SYMBOL, symbol));
        }
        // A genuine cash row (class CASH, symbol == currency) also gets the
        // cash-balance alias; FX pairs never reach this branch because
        // their symbol contains a dot.
        if let (Some(class), Some(symbol), Some(ccy)) = (asset_class, symbol, currency) {
            if class == "CASH" && symbol == ccy {
                aliases.insert(format!("{}{}", ALIAS_PREFIX_CASH, ccy));
            }
        }
        aliases
    }

    /// Resolves the row to an existing asset, merging duplicates that the
    /// row proves identical, or creates a new asset. Never fails for
    /// parseable input.
    pub fn resolve_or_create(&mut self, lookup: AssetLookup) -> AssetId {
        let isin = normalize_upper(lookup.isin.as_deref());
        let conid = normalize(lookup.conid.as_deref());
        let symbol = normalize_upper(lookup.symbol.as_deref());
        let currency = normalize_upper(lookup.currency.as_deref());
        let asset_class = normalize_upper(lookup.asset_class.as_deref());
        let sub_category = normalize(lookup.sub_category.as_deref());
        let description = normalize(lookup.description.as_deref());

        let row_aliases = Self::generate_aliases(
            isin.as_deref(),
            conid.as_deref(),
            symbol.as_deref(),
            currency.as_deref(),
            asset_class.as_deref(),
        );

        let mut found: BTreeSet<AssetId> = BTreeSet::new();
        for alias in &row_aliases {
            if let Some(id) = self.alias_map.get(alias) {
                found.insert(self.canonical_id(*id));
            }
        }

        let asset_id = match found.len() {
            0 => {
                let (category, fund_type) = self.classifier.preliminary_classify(
                    asset_class.as_deref(),
                    sub_category.as_deref(),
                    description.as_deref(),
                    symbol.as_deref(),
                );
                let id = self.allocate_id();
                let mut asset = Asset::new(id, category);
                asset.fund_type = fund_type;
                if row_aliases.is_empty() {
                    self.synthetic_counter += 1;
                    let synthetic = format!("SYNTHETIC:{}", self.synthetic_counter);
                    warn!(
                        "Row with description '{}' carries no usable identifiers; creating minimal asset {} ({})",
                        description.as_deref().unwrap_or(""),
                        id,
                        synthetic
                    );
                    asset.add_alias(synthetic);
                }
                self.assets.insert(id, asset);
                id
            }
            1 => *found.iter().next().expect("len checked"),
            _ => self.merge(found),
        };

        self.update_asset(
            asset_id,
            &row_aliases,
            isin,
            conid,
            symbol,
            currency,
            asset_class,
            sub_category,
            description,
            &lookup,
        );
        asset_id
    }

    /// Collapses several assets that turned out to share an alias into one
    /// survivor. Preference: more concrete category, then more aliases,
    /// then the lower internal id.
    fn merge(&mut self, candidates: BTreeSet<AssetId>) -> AssetId {
        let mut ranked: Vec<AssetId> = candidates.into_iter().collect();
        ranked.sort_by_key(|id| {
            let asset = &self.assets[id];
            (
                asset.category.concreteness_rank(),
                std::cmp::Reverse(asset.aliases.len()),
                *id,
            )
        });
        let survivor_id = ranked[0];

        for loser_id in ranked.into_iter().skip(1) {
            let loser = match self.assets.remove(&loser_id) {
                Some(asset) => asset,
                None => continue,
            };
            debug!(
                "Merging asset {} into {} (shared alias set)",
                loser_id, survivor_id
            );
            for alias in &loser.aliases {
                self.alias_map.insert(alias.clone(), survivor_id);
            }
            let survivor = self.assets.get_mut(&survivor_id).expect("survivor exists");
            survivor.aliases.extend(loser.aliases.iter().cloned());
            merge_missing_fields(survivor, &loser);
            self.redirects.insert(loser_id, survivor_id);
        }
        survivor_id
    }

    #[allow(clippy::too_many_arguments)]
    fn update_asset(
        &mut self,
        id: AssetId,
        row_aliases: &BTreeSet<String>,
        isin: Option<String>,
        conid: Option<String>,
        symbol: Option<String>,
        currency: Option<String>,
        asset_class: Option<String>,
        sub_category: Option<String>,
        description: Option<String>,
        lookup: &AssetLookup,
    ) {
        let (prelim_category, prelim_fund_type) = self.classifier.preliminary_classify(
            asset_class.as_deref(),
            sub_category.as_deref(),
            description.as_deref(),
            symbol.as_deref(),
        );

        let asset = self.assets.get_mut(&id).expect("asset exists");

        for alias in row_aliases {
            asset.aliases.insert(alias.clone());
        }

        update_description(asset, description.as_deref(), lookup.source);

        if asset.currency.is_none() {
            asset.currency = currency.clone();
        }
        if asset.isin.is_none() {
            asset.isin = isin;
        }
        if asset.conid.is_none() {
            asset.conid = conid;
        }
        match (&asset.symbol, &symbol) {
            (None, Some(_)) => asset.symbol = symbol.clone(),
            // A symbol equal to the currency is a placeholder from cash
            // rows; a real instrument symbol beats it.
            (Some(current), Some(new))
                if Some(current) == asset.currency.as_ref() && new != current =>
            {
                asset.symbol = Some(new.clone());
            }
            _ => {}
        }
        if asset
            .raw_asset_class
            .as_deref()
            .map_or(true, |c| c == "UNKNOWN")
        {
            if let Some(class) = asset_class {
                if class != "UNKNOWN" {
                    asset.raw_asset_class = Some(class);
                }
            }
        }
        if asset.raw_sub_category.is_none() {
            asset.raw_sub_category = sub_category;
        }

        // Upgrade a generic asset when the row proves a more concrete type.
        if asset.category == AssetCategory::Unknown && prelim_category != AssetCategory::Unknown {
            asset.category = prelim_category;
            if prelim_category == AssetCategory::InvestmentFund {
                asset.fund_type = prelim_fund_type;
            }
        } else if asset.category == AssetCategory::InvestmentFund
            && asset.fund_type == FundType::None
            && prelim_fund_type != FundType::None
        {
            asset.fund_type = prelim_fund_type;
        }

        if asset.category.is_derivative() {
            let default_multiplier = if asset.category == AssetCategory::Option {
                Decimal::ONE_HUNDRED
            } else {
                Decimal::ONE
            };
            let row_multiplier = lookup.multiplier.filter(|m| !m.is_zero());
            let spec = asset
                .derivative
                .get_or_insert_with(|| DerivativeSpec::new(row_multiplier.unwrap_or(default_multiplier)));
            if let Some(multiplier) = row_multiplier {
                // A contract-size placeholder of 1 yields to the reported
                // multiplier; a real value is never overwritten.
                if spec.multiplier <= Decimal::ONE {
                    spec.multiplier = multiplier;
                }
            }
            if spec.put_call.is_none() {
                spec.put_call = lookup.put_call.as_deref().and_then(PutCall::parse);
            }
            if spec.strike.is_none() {
                spec.strike = lookup.strike;
            }
            if spec.expiry.is_none() {
                spec.expiry = lookup.expiry.as_deref().and_then(parse_broker_date);
            }
            if spec.underlying_conid.is_none() {
                spec.underlying_conid = normalize(lookup.underlying_conid.as_deref());
            }
            if spec.underlying_symbol.is_none() {
                spec.underlying_symbol = normalize_upper(lookup.underlying_symbol.as_deref());
            }
        }

        if asset.category == AssetCategory::CashBalance {
            if asset.currency.is_none() {
                asset.currency = currency;
            }
            if let Some(ccy) = asset.currency.clone() {
                asset.add_alias(format!("{}{}", ALIAS_PREFIX_CASH, ccy));
            }
            if asset.description.is_none() {
                asset.description = asset.currency.as_ref().map(|c| format!("Cash Balance {}", c));
            }
        }

        let alias_snapshot: Vec<String> = asset.aliases.iter().cloned().collect();
        for alias in alias_snapshot {
            self.alias_map.insert(alias, id);
        }
    }

    /// Applies a host classification verdict (e.g. from an interactive
    /// session) without losing identity or aliases.
    pub fn reclassify(&mut self, id: AssetId, category: AssetCategory, fund_type: FundType) {
        let canonical = self.canonical_id(id);
        if let Some(asset) = self.assets.get_mut(&canonical) {
            asset.category = category;
            asset.fund_type = if category == AssetCategory::InvestmentFund {
                fund_type
            } else {
                FundType::None
            };
            if category.is_derivative() && asset.derivative.is_none() {
                let default_multiplier = if category == AssetCategory::Option {
                    Decimal::ONE_HUNDRED
                } else {
                    Decimal::ONE
                };
                asset.derivative = Some(DerivativeSpec::new(default_multiplier));
            }
        }
    }

    /// Resolves each derivative's underlying reference to an internal asset
    /// id, preferring the conid alias over the symbol alias.
    pub fn link_derivatives(&mut self) {
        let derivative_ids: Vec<AssetId> = self
            .assets
            .values()
            .filter(|a| {
                a.derivative
                    .as_ref()
                    .map_or(false, |d| d.underlying_asset_id.is_none())
            })
            .map(|a| a.id)
            .collect();

        for id in derivative_ids {
            let (underlying_conid, underlying_symbol) = {
                let spec = self.assets[&id].derivative.as_ref().expect("filtered");
                (spec.underlying_conid.clone(), spec.underlying_symbol.clone())
            };

            let mut underlying: Option<AssetId> = None;
            if let Some(conid) = underlying_conid {
                underlying = self
                    .alias_map
                    .get(&format!("{}{}", ALIAS_PREFIX_CONID, conid))
                    .map(|found| self.canonical_id(*found));
            }
            if underlying.is_none() {
                if let Some(symbol) = underlying_symbol {
                    let alias = format!("{}{}", ALIAS_PREFIX_SYMBOL, symbol);
                    underlying = self
                        .alias_map
                        .get(&alias)
                        .map(|found| self.canonical_id(*found))
                        .filter(|found| {
                            self.assets
                                .get(found)
                                .map_or(false, |a| a.category != AssetCategory::CashBalance)
                        });
                }
            }

            if let Some(underlying_id) = underlying {
                if let Some(spec) = self
                    .assets
                    .get_mut(&id)
                    .and_then(|a| a.derivative.as_mut())
                {
                    spec.underlying_asset_id = Some(underlying_id);
                }
            }
        }
    }
}

fn normalize(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn normalize_upper(raw: Option<&str>) -> Option<String> {
    normalize(raw).map(|s| s.to_uppercase())
}

fn merge_missing_fields(survivor: &mut Asset, loser: &Asset) {
    if survivor.description.is_none() {
        survivor.description = loser.description.clone();
    }
    if survivor.currency.is_none() {
        survivor.currency = loser.currency.clone();
    }
    if survivor.isin.is_none() {
        survivor.isin = loser.isin.clone();
    }
    if survivor.conid.is_none() {
        survivor.conid = loser.conid.clone();
    }
    if survivor.symbol.is_none() {
        survivor.symbol = loser.symbol.clone();
    }
    if survivor.raw_asset_class.is_none() {
        survivor.raw_asset_class = loser.raw_asset_class.clone();
    }
    if survivor.raw_sub_category.is_none() {
        survivor.raw_sub_category = loser.raw_sub_category.clone();
    }
    if survivor.derivative.is_none() {
        survivor.derivative = loser.derivative.clone();
    }
    if survivor.soy_quantity.is_none() {
        survivor.soy_quantity = loser.soy_quantity;
        survivor.soy_cost_basis_amount = loser.soy_cost_basis_amount;
        survivor.soy_cost_basis_currency = loser.soy_cost_basis_currency.clone();
    }
    if survivor.eoy_quantity.is_none() {
        survivor.eoy_quantity = loser.eoy_quantity;
        survivor.eoy_market_price = loser.eoy_market_price;
        survivor.eoy_price_currency = loser.eoy_price_currency.clone();
        survivor.eoy_position_value = loser.eoy_position_value;
    }
}

/// Description updates follow source precedence:
/// trade ≥ position > corporate action > cash transaction (never).
fn update_description(asset: &mut Asset, description: Option<&str>, source: DescriptionSource) {
    let new_desc = match description {
        Some(d) if !d.is_empty() => d,
        _ => return,
    };

    const GENERIC_PLACEHOLDERS: [&str; 5] = ["STOCK", "BOND", "FUND", "ETF", "UNKNOWN ASSET"];
    let current = asset.description.as_deref();
    let current_is_generic = match current {
        None => true,
        Some(d) => GENERIC_PLACEHOLDERS.contains(&d.to_uppercase().as_str()),
    };

    let update = match source {
        DescriptionSource::Trade | DescriptionSource::Position | DescriptionSource::Generated => {
            match current {
                None => true,
                Some(current_desc) => {
                    if current_is_generic {
                        true
                    } else {
                        let current_numeric = looks_numeric(current_desc);
                        let new_numeric = looks_numeric(new_desc);
                        if current_numeric && !new_numeric {
                            true
                        } else if !current_numeric && new_numeric {
                            false
                        } else {
                            new_desc.len() > current_desc.len()
                        }
                    }
                }
            }
        }
        DescriptionSource::CorporateAction => {
            current_is_generic && !GENERIC_PLACEHOLDERS.contains(&new_desc.to_uppercase().as_str())
        }
        DescriptionSource::CashTransaction => false,
    };

    if update {
        if current.is_some() && source == DescriptionSource::CorporateAction {
            debug!(
                "Asset {}: corporate-action description replaces generic '{}'",
                asset.id,
                current.unwrap_or("")
            );
        }
        asset.description = Some(new_desc.to_string());
    }
}

fn looks_numeric(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
}
