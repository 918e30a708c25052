use super::{
    SourceAdapter, SourceClient, SourceError, lenient_f64, lenient_price_table, lenient_u32,
    non_empty,
};
use crate::config::SourceConfig;
use crate::models::{CandidateKind, PriceTable, RawBundleCandidate, RawTimestamp, SourceId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnNull, serde_as};
use tracing::debug;

pub struct IndexSource {
    client: SourceClient,
    query: String,
    locale: String,
}

impl IndexSource {
    pub fn new(config: SourceConfig, query: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            client: SourceClient::new(SourceId::IndexApi, config),
            query: query.into(),
            locale: locale.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct IndexQuery {
    params: String,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct IndexResponse {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    hits: Vec<IndexHit>,
}

#[derive(Debug, Deserialize)]
struct IndexHit {
    #[serde(default, rename = "objectID")]
    object_id: Option<String>,
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default, rename = "type")]
    product_type: Option<String>,
    #[serde(default)]
    display_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default, deserialize_with = "lenient_price_table")]
    price: PriceTable,
    #[serde(default, rename = "fullPrice", deserialize_with = "lenient_price_table")]
    full_price: PriceTable,
    #[serde(default, deserialize_with = "lenient_f64")]
    discount_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    bonus_saving_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_u32")]
    bundle_count: Option<u32>,
    #[serde(default)]
    available_valid_from: Option<RawTimestamp>,
    #[serde(default)]
    available_valid_until: Option<RawTimestamp>,
    #[serde(default)]
    on_sale: Option<bool>,
    #[serde(default)]
    tier: Option<String>,
}

#[async_trait]
impl SourceAdapter for IndexSource {
    fn id(&self) -> SourceId {
        SourceId::IndexApi
    }

    async fn fetch(&self) -> Result<Vec<RawBundleCandidate>, SourceError> {
        let body = IndexQuery {
            params: encode_params(&self.query),
        };
        let request = self.client.post().json(&body);
        let payload: IndexResponse = self.client.fetch_json(request).await?;
        debug!(
            target = "bundles.source",
            source = %SourceId::IndexApi,
            endpoint = self.client.endpoint(),
            hits = payload.hits.len(),
            "index_payload_decoded"
        );
        Ok(payload
            .hits
            .into_iter()
            .map(|hit| map_hit(hit, &self.locale))
            .collect())
    }
}

fn map_hit(hit: IndexHit, locale: &str) -> RawBundleCandidate {
    let kind = match hit.product_type.as_deref().map(str::to_lowercase).as_deref() {
        Some("pickandmix") | Some("pick-and-mix") => CandidateKind::PickAndMix,
        _ => CandidateKind::Bundle,
    };
    let slug = non_empty(hit.slug);
    let url = non_empty(hit.url).or_else(|| {
        slug.as_ref().map(|slug| match kind {
            CandidateKind::PickAndMix => format!("/{locale}/pick-and-mix/{slug}"),
            _ => format!("/{locale}/bundle/{slug}"),
        })
    });

    RawBundleCandidate {
        id: non_empty(hit.object_id).or(non_empty(hit.product_id)),
        slug,
        title: non_empty(hit.name),
        description: non_empty(hit.description),
        url,
        image: non_empty(hit.cover),
        display_type: non_empty(hit.display_type),
        tier: non_empty(hit.tier),
        valid_from: hit.available_valid_from,
        valid_until: hit.available_valid_until,
        sale_prices: hit.price,
        list_prices: hit.full_price,
        explicit_discount: hit.discount_percent,
        bonus_saving: hit.bonus_saving_percent,
        item_count: hit.bundle_count,
        on_sale: hit.on_sale,
        ..RawBundleCandidate::new(SourceId::IndexApi, kind)
    }
}

/// Index queries travel as a url-encoded parameter string; `key=value` pairs
/// are encoded value by value so separators survive.
fn encode_params(query: &str) -> String {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => format!("{key}={}", urlencoding::encode(value)),
            None => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn source(server: &MockServer) -> IndexSource {
        let config = SourceConfig::new(server.url("/1/indexes/bundles/query"))
            .with_header("X-Algolia-Application-Id", "demo-app")
            .with_timeout(Duration::from_secs(2));
        IndexSource::new(config, "filters=type:bundle&hitsPerPage=50", "en")
    }

    #[test]
    fn encode_params_encodes_values_only() {
        assert_eq!(
            encode_params("filters=type:bundle AND on_sale:true&hitsPerPage=50"),
            "filters=type%3Abundle%20AND%20on_sale%3Atrue&hitsPerPage=50"
        );
    }

    #[tokio::test]
    async fn fetch_maps_hits_and_sends_fixed_headers() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/1/indexes/bundles/query")
                    .header("X-Algolia-Application-Id", "demo-app")
                    .json_body(json!({"params": "filters=type%3Abundle&hitsPerPage=50"}));
                then.status(200).json_body(json!({
                    "hits": [
                        {
                            "objectID": "b-1",
                            "name": "Pro Studio Software Bundle",
                            "slug": "pro-studio-software-bundle",
                            "type": "bundle",
                            "display_type": "software-bundle",
                            "price": {"USD": 9.99, "EUR": "8.99"},
                            "fullPrice": {"USD": 99.9},
                            "discount_percent": "0",
                            "bundle_count": 12,
                            "available_valid_from": 1760000000,
                            "available_valid_until": "2099-01-01T00:00:00Z",
                            "on_sale": null
                        },
                        {"objectID": "pm-1", "name": "Build your own", "slug": "byo", "type": "pickandmix"}
                    ]
                }));
            })
            .await;

        let candidates = source(&server).fetch().await.expect("fetch");
        mock.assert_async().await;
        assert_eq!(candidates.len(), 2);

        let first = &candidates[0];
        assert_eq!(first.source, SourceId::IndexApi);
        assert_eq!(first.kind, CandidateKind::Bundle);
        assert_eq!(first.url.as_deref(), Some("/en/bundle/pro-studio-software-bundle"));
        assert_eq!(first.display_type.as_deref(), Some("software-bundle"));
        assert_eq!(first.sale_prices.get("EUR"), Some(&8.99));
        assert_eq!(first.explicit_discount, Some(0.0));
        assert_eq!(first.item_count, Some(12));
        assert_eq!(first.valid_from, Some(RawTimestamp::Unix(1760000000)));
        assert_eq!(first.on_sale, None);

        assert_eq!(candidates[1].kind, CandidateKind::PickAndMix);
        assert_eq!(candidates[1].url.as_deref(), Some("/en/pick-and-mix/byo"));
        assert!(candidates[1].sale_prices.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(503);
            })
            .await;

        let err = source(&server).fetch().await.expect_err("should fail");
        assert!(matches!(err, SourceError::Status { status: 503, .. }));
        assert_eq!(err.source_id(), SourceId::IndexApi);
    }

    #[tokio::test]
    async fn slow_upstream_hits_the_request_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200)
                    .json_body(json!({"hits": []}))
                    .delay(Duration::from_secs(5));
            })
            .await;

        let config = SourceConfig::new(server.url("/1/indexes/bundles/query"))
            .with_timeout(Duration::from_millis(300));
        let started = std::time::Instant::now();
        let err = IndexSource::new(config, "hitsPerPage=1", "en")
            .fetch()
            .await
            .expect_err("should time out");
        assert!(matches!(
            err,
            SourceError::Request {
                source_id: SourceId::IndexApi,
                ..
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn malformed_payload_is_a_decode_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).body("<html>not json</html>");
            })
            .await;

        let err = source(&server).fetch().await.expect_err("should fail");
        assert!(matches!(err, SourceError::Decode { .. }));
    }
}
