use super::{
    SourceAdapter, SourceClient, SourceError, lenient_f64, lenient_price_table, lenient_u32,
    non_empty,
};
use crate::config::SourceConfig;
use crate::models::{CandidateKind, PriceTable, RawBundleCandidate, RawTimestamp, SourceId};
use async_trait::async_trait;
use serde::Deserialize;
use serde_with::{DefaultOnNull, serde_as};
use tracing::debug;

pub struct PromotionsSource {
    client: SourceClient,
    locale: String,
}

impl PromotionsSource {
    pub fn new(config: SourceConfig, locale: impl Into<String>) -> Self {
        Self {
            client: SourceClient::new(SourceId::PromotionsApi, config),
            locale: locale.into(),
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromotionsPayload {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    free_products: Vec<FreeProduct>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    vouchers: Vec<Voucher>,
}

#[derive(Debug, Deserialize)]
struct FreeProduct {
    #[serde(default, rename = "_id")]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default, rename = "type")]
    product_type: Option<String>,
    #[serde(default)]
    display_type: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default, rename = "fullPrice", deserialize_with = "lenient_price_table")]
    full_price: PriceTable,
    #[serde(default, deserialize_with = "lenient_u32")]
    product_count: Option<u32>,
    #[serde(default)]
    valid_from: Option<RawTimestamp>,
    #[serde(default)]
    valid_until: Option<RawTimestamp>,
    #[serde(default)]
    featured: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Voucher {
    #[serde(default, rename = "_id")]
    id: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    bonus_percent: Option<f64>,
    #[serde(default)]
    valid_from: Option<RawTimestamp>,
    #[serde(default)]
    valid_until: Option<RawTimestamp>,
}

#[async_trait]
impl SourceAdapter for PromotionsSource {
    fn id(&self) -> SourceId {
        SourceId::PromotionsApi
    }

    async fn fetch(&self) -> Result<Vec<RawBundleCandidate>, SourceError> {
        let payload: PromotionsPayload = self.client.fetch_json(self.client.get()).await?;
        debug!(
            target = "bundles.source",
            source = %SourceId::PromotionsApi,
            endpoint = self.client.endpoint(),
            free_products = payload.free_products.len(),
            vouchers = payload.vouchers.len(),
            "promotions_payload_decoded"
        );
        let mut candidates = Vec::with_capacity(payload.free_products.len() + payload.vouchers.len());
        candidates.extend(
            payload
                .free_products
                .into_iter()
                .map(|product| map_free_product(product, &self.locale)),
        );
        candidates.extend(
            payload
                .vouchers
                .into_iter()
                .filter_map(|voucher| map_voucher(voucher, &self.locale)),
        );
        Ok(candidates)
    }
}

fn map_free_product(product: FreeProduct, locale: &str) -> RawBundleCandidate {
    let slug = non_empty(product.slug);
    let (segment, type_hint) = match product.product_type.as_deref().map(str::to_lowercase).as_deref() {
        Some("game") | Some("dlc") => ("game", Some("games")),
        Some("book") => ("book", Some("books")),
        Some("software") => ("software", Some("software")),
        _ => ("bundle", None),
    };
    let url = slug.as_ref().map(|slug| format!("/{locale}/{segment}/{slug}"));
    let sale_prices = product
        .full_price
        .keys()
        .map(|currency| (currency.clone(), 0.0))
        .collect::<PriceTable>();

    RawBundleCandidate {
        id: non_empty(product.id),
        slug,
        title: non_empty(product.name),
        url,
        image: non_empty(product.cover),
        display_type: non_empty(product.display_type),
        category_hint: non_empty(product.category).or_else(|| type_hint.map(str::to_string)),
        valid_from: product.valid_from,
        valid_until: product.valid_until,
        sale_prices,
        list_prices: product.full_price,
        item_count: product.product_count,
        on_sale: Some(true),
        ..RawBundleCandidate::new(
            SourceId::PromotionsApi,
            CandidateKind::Giveaway {
                primary: product.featured.unwrap_or(false),
            },
        )
    }
}

fn map_voucher(voucher: Voucher, locale: &str) -> Option<RawBundleCandidate> {
    let code = non_empty(voucher.code)?.to_uppercase();
    let percent = voucher.percent.filter(|p| *p > 0.0);
    let title = non_empty(voucher.name).or_else(|| {
        percent.map(|p| format!("{}% Off Voucher {code}", p.round() as i64))
    });

    Some(RawBundleCandidate {
        id: non_empty(voucher.id).or_else(|| Some(code.clone())),
        slug: Some(format!("voucher-{}", code.to_lowercase())),
        title,
        description: Some(format!("Use code {code} at checkout")),
        url: Some(format!("/{locale}/promotions")),
        valid_from: voucher.valid_from,
        valid_until: voucher.valid_until,
        explicit_discount: percent,
        bonus_saving: voucher.bonus_percent,
        on_sale: Some(true),
        ..RawBundleCandidate::new(SourceId::PromotionsApi, CandidateKind::Voucher)
    })
}
