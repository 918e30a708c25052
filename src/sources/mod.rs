pub mod all_active;
pub mod index;
pub mod promotions;

use crate::config::SourceConfig;
use crate::http::build_client;
use crate::models::{PriceTable, RawBundleCandidate, SourceId};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub use all_active::AllActiveSource;
pub use index::IndexSource;
pub use promotions::PromotionsSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{source_id}: request failed: {message}")]
    Request { source_id: SourceId, message: String },
    #[error("{source_id}: HTTP {status}")]
    Status { source_id: SourceId, status: u16 },
    #[error("{source_id}: unexpected payload: {message}")]
    Decode { source_id: SourceId, message: String },
}

impl SourceError {
    pub fn source_id(&self) -> SourceId {
        match self {
            SourceError::Request { source_id, .. }
            | SourceError::Status { source_id, .. }
            | SourceError::Decode { source_id, .. } => *source_id,
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> SourceId;
    async fn fetch(&self) -> Result<Vec<RawBundleCandidate>, SourceError>;
}

#[derive(Debug, Clone)]
pub(crate) struct SourceClient {
    id: SourceId,
    config: SourceConfig,
    http: Client,
}

impl SourceClient {
    pub(crate) fn new(id: SourceId, config: SourceConfig) -> Self {
        let http = build_client(config.timeout);
        Self { id, config, http }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub(crate) fn get(&self) -> RequestBuilder {
        self.with_headers(self.http.get(&self.config.endpoint))
    }

    pub(crate) fn post(&self) -> RequestBuilder {
        self.with_headers(self.http.post(&self.config.endpoint))
    }

    fn with_headers(&self, mut request: RequestBuilder) -> RequestBuilder {
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }

    pub(crate) async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, SourceError> {
        let response = request.send().await.map_err(|err| SourceError::Request {
            source_id: self.id,
            message: err.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                source_id: self.id,
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|err| SourceError::Request {
            source_id: self.id,
            message: err.to_string(),
        })?;
        serde_json::from_slice::<T>(&body).map_err(|err| SourceError::Decode {
            source_id: self.id,
            message: err.to_string(),
        })
    }
}

// Upstream fields flip between numbers, numeric strings and null.

pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_f64))
}

pub(crate) fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(value_as_f64)
        .filter(|v| *v >= 0.0)
        .map(|v| v.round() as u32))
}

pub(crate) fn lenient_price_table<'de, D>(deserializer: D) -> Result<PriceTable, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let mut table = PriceTable::new();
    if let Some(serde_json::Value::Object(map)) = value {
        for (currency, amount) in map {
            if let Some(amount) = value_as_f64(&amount) {
                table.insert(currency.trim().to_uppercase(), amount);
            }
        }
    }
    Ok(table)
}

fn value_as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
