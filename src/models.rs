use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

pub type PriceTable = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Games,
    Books,
    Software,
    Unclassified,
}

impl Category {
    pub const FEEDS: [Category; 3] = [Category::Games, Category::Books, Category::Software];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Games => "games",
            Category::Books => "books",
            Category::Software => "software",
            Category::Unclassified => "unclassified",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Games => "Game",
            Category::Books => "Book",
            Category::Software => "Software",
            Category::Unclassified => "Other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream sources, declared in dedup precedence order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    IndexApi,
    AllActiveApi,
    PromotionsApi,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::IndexApi => "index_api",
            SourceId::AllActiveApi => "all_active_api",
            SourceId::PromotionsApi => "promotions_api",
        }
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Unix(i64),
    Fractional(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Bundle,
    PickAndMix,
    StarDeal,
    Giveaway { primary: bool },
    Voucher,
}

#[derive(Debug, Clone)]
pub struct RawBundleCandidate {
    pub source: SourceId,
    pub kind: CandidateKind,
    pub id: Option<String>,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub image: Option<String>,
    pub display_type: Option<String>,
    pub category_hint: Option<String>,
    pub tier: Option<String>,
    pub valid_from: Option<RawTimestamp>,
    pub valid_until: Option<RawTimestamp>,
    pub sale_prices: PriceTable,
    pub list_prices: PriceTable,
    pub explicit_discount: Option<f64>,
    pub bonus_saving: Option<f64>,
    pub item_count: Option<u32>,
    pub on_sale: Option<bool>,
}

impl RawBundleCandidate {
    pub fn new(source: SourceId, kind: CandidateKind) -> Self {
        Self {
            source,
            kind,
            id: None,
            slug: None,
            title: None,
            description: None,
            url: None,
            image: None,
            display_type: None,
            category_hint: None,
            tier: None,
            valid_from: None,
            valid_until: None,
            sale_prices: PriceTable::new(),
            list_prices: PriceTable::new(),
            explicit_discount: None,
            bonus_saving: None,
            item_count: None,
            on_sale: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BundleKind {
    Bundle,
    PickAndMix,
    StarDeal,
    Giveaway,
    Voucher,
    Placeholder,
}

impl From<CandidateKind> for BundleKind {
    fn from(kind: CandidateKind) -> Self {
        match kind {
            CandidateKind::Bundle => BundleKind::Bundle,
            CandidateKind::PickAndMix => BundleKind::PickAndMix,
            CandidateKind::StarDeal => BundleKind::StarDeal,
            CandidateKind::Giveaway { .. } => BundleKind::Giveaway,
            CandidateKind::Voucher => BundleKind::Voucher,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BundlePrice {
    pub currency: String,
    pub sale: f64,
    pub list: f64,
    pub discount: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct CanonicalBundle {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub category: Category,
    pub kind: BundleKind,
    pub source: Option<SourceId>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub price: BundlePrice,
    pub item_count: u32,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip)]
    pub display_type: Option<String>,
    #[serde(skip)]
    pub category_hint: Option<String>,
}

impl CanonicalBundle {
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty() && !self.url.trim().is_empty()
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == BundleKind::Placeholder
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryFeed {
    pub category: Category,
    pub bundles: Vec<CanonicalBundle>,
}

impl CategoryFeed {
    pub fn is_placeholder_only(&self) -> bool {
        self.bundles.len() == 1 && self.bundles[0].is_placeholder()
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct SourceReport {
    pub source: SourceId,
    pub candidates: usize,
    pub elapsed_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub stages: Vec<StageReport>,
    pub feeds: Vec<CategoryFeed>,
}

impl PipelineRun {
    #[cfg(test)]
    pub fn feed(&self, category: Category) -> Option<&CategoryFeed> {
        self.feeds.iter().find(|feed| feed.category == category)
    }
}
