use super::{
    SourceAdapter, SourceClient, SourceError, lenient_f64, lenient_price_table, lenient_u32,
    non_empty,
};
use crate::config::SourceConfig;
use crate::models::{CandidateKind, PriceTable, RawBundleCandidate, RawTimestamp, SourceId};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use serde_with::{DefaultOnNull, serde_as};
use tracing::debug;

pub struct AllActiveSource {
    client: SourceClient,
    locale: String,
}

impl AllActiveSource {
    pub fn new(config: SourceConfig, locale: impl Into<String>) -> Self {
        Self {
            client: SourceClient::new(SourceId::AllActiveApi, config),
            locale: locale.into(),
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct AllActivePayload {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pickandmix: Vec<PickAndMixOffer>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    stardeals: Vec<StarDeal>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct PickAndMixOffer {
    #[serde(default, rename = "_id")]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    display_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    cover_image: Option<String>,
    #[serde(default)]
    valid_from: Option<RawTimestamp>,
    #[serde(default)]
    valid_until: Option<RawTimestamp>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    tiers: Vec<PickAndMixTier>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    products: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct PickAndMixTier {
    #[serde(default, deserialize_with = "lenient_u32")]
    quantity: Option<u32>,
    #[serde(default, deserialize_with = "lenient_price_table")]
    price: PriceTable,
}

#[derive(Debug, Deserialize)]
struct StarDeal {
    #[serde(default, rename = "_id")]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    display_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default, deserialize_with = "lenient_price_table")]
    price: PriceTable,
    #[serde(default, rename = "fullPrice", deserialize_with = "lenient_price_table")]
    full_price: PriceTable,
    #[serde(default, deserialize_with = "lenient_f64")]
    discount_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_u32")]
    bundle_count: Option<u32>,
    #[serde(default)]
    valid_from: Option<RawTimestamp>,
    #[serde(default)]
    valid_until: Option<RawTimestamp>,
    #[serde(default)]
    on_sale: Option<bool>,
}

#[async_trait]
impl SourceAdapter for AllActiveSource {
    fn id(&self) -> SourceId {
        SourceId::AllActiveApi
    }

    async fn fetch(&self) -> Result<Vec<RawBundleCandidate>, SourceError> {
        let payload: AllActivePayload = self.client.fetch_json(self.client.get()).await?;
        debug!(
            target = "bundles.source",
            source = %SourceId::AllActiveApi,
            endpoint = self.client.endpoint(),
            pickandmix = payload.pickandmix.len(),
            stardeals = payload.stardeals.len(),
            "all_active_payload_decoded"
        );
        let mut candidates = Vec::with_capacity(payload.pickandmix.len() + payload.stardeals.len());
        candidates.extend(
            payload
                .pickandmix
                .into_iter()
                .map(|offer| map_pick_and_mix(offer, &self.locale)),
        );
        candidates.extend(
            payload
                .stardeals
                .into_iter()
                .map(|deal| map_star_deal(deal, &self.locale)),
        );
        Ok(candidates)
    }
}

fn map_pick_and_mix(offer: PickAndMixOffer, locale: &str) -> RawBundleCandidate {
    let sale_prices = cheapest_tier_prices(&offer.tiers);
    // No list price is published for tiered offers; twice the cheapest tier
    // stands in for it.
    let list_prices = sale_prices
        .iter()
        .map(|(currency, amount)| (currency.clone(), amount * 2.0))
        .collect::<PriceTable>();
    let tier = offer
        .tiers
        .iter()
        .filter_map(|tier| tier.quantity)
        .min()
        .map(|quantity| format!("{} tiers from {quantity} items", offer.tiers.len()));
    let slug = non_empty(offer.slug);
    let url = slug
        .as_ref()
        .map(|slug| format!("/{locale}/pick-and-mix/{slug}"));
    let item_count = u32::try_from(offer.products.len()).ok().filter(|n| *n > 0);

    RawBundleCandidate {
        id: non_empty(offer.id),
        slug,
        title: non_empty(offer.name),
        description: non_empty(offer.description),
        url,
        image: non_empty(offer.cover_image),
        display_type: non_empty(offer.display_type),
        tier,
        valid_from: offer.valid_from,
        valid_until: offer.valid_until,
        sale_prices,
        list_prices,
        item_count,
        on_sale: Some(true),
        ..RawBundleCandidate::new(SourceId::AllActiveApi, CandidateKind::PickAndMix)
    }
}

fn cheapest_tier_prices(tiers: &[PickAndMixTier]) -> PriceTable {
    let mut cheapest = PriceTable::new();
    for tier in tiers {
        for (currency, amount) in &tier.price {
            if *amount <= 0.0 {
                continue;
            }
            cheapest
                .entry(currency.clone())
                .and_modify(|current| {
                    if *amount < *current {
                        *current = *amount;
                    }
                })
                .or_insert(*amount);
        }
    }
    cheapest
}

fn map_star_deal(deal: StarDeal, locale: &str) -> RawBundleCandidate {
    let slug = non_empty(deal.slug);
    let url = slug.as_ref().map(|slug| format!("/{locale}/bundle/{slug}"));
    RawBundleCandidate {
        id: non_empty(deal.id),
        slug,
        title: non_empty(deal.name),
        description: non_empty(deal.description),
        url,
        image: non_empty(deal.cover),
        display_type: non_empty(deal.display_type),
        valid_from: deal.valid_from,
        valid_until: deal.valid_until,
        sale_prices: deal.price,
        list_prices: deal.full_price,
        explicit_discount: deal.discount_percent,
        item_count: deal.bundle_count,
        on_sale: deal.on_sale,
        ..RawBundleCandidate::new(SourceId::AllActiveApi, CandidateKind::StarDeal)
    }
}
