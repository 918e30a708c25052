use once_cell::sync::Lazy;
use std::{env, path::PathBuf, time::Duration};

pub static SITE_URL: Lazy<String> = Lazy::new(|| {
    env::var("BUNDLE_SITE_URL")
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "https://www.fanatical.com".to_string())
});

pub static LOCALE: Lazy<String> = Lazy::new(|| {
    env::var("BUNDLE_LOCALE")
        .ok()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "en".to_string())
});

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_GIVEAWAY_MIN_ITEMS: u32 = 5;
const DEFAULT_INDEX_QUERY: &str = "filters=type:bundle&hitsPerPage=200";

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl SourceConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            headers: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn from_env(prefix: &str, default_endpoint: String, timeout: Duration) -> Self {
        let endpoint = env::var(format!("{prefix}_URL"))
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(default_endpoint);
        let headers = env::var(format!("{prefix}_HEADERS"))
            .map(|raw| parse_headers(&raw))
            .unwrap_or_default();
        headers
            .into_iter()
            .fold(Self::new(endpoint).with_timeout(timeout), |cfg, (name, value)| {
                cfg.with_header(name, value)
            })
    }
}

#[derive(Debug, Clone)]
pub struct CanonicalConfig {
    pub preferred_currency: String,
    pub fallback_currencies: Vec<String>,
    pub giveaway_min_items: u32,
    pub locale: String,
}

impl Default for CanonicalConfig {
    fn default() -> Self {
        Self {
            preferred_currency: "USD".to_string(),
            fallback_currencies: vec!["EUR".to_string(), "GBP".to_string()],
            giveaway_min_items: DEFAULT_GIVEAWAY_MIN_ITEMS,
            locale: LOCALE.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub output_dir: PathBuf,
    pub site_url: String,
    pub locale: String,
    pub title_prefix: String,
    pub language: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("docs"),
            site_url: SITE_URL.clone(),
            locale: LOCALE.clone(),
            title_prefix: "Fanatical".to_string(),
            language: language_tag(LOCALE.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub index: SourceConfig,
    pub index_query: String,
    pub all_active: SourceConfig,
    pub promotions: SourceConfig,
    pub canonical: CanonicalConfig,
    pub feed: FeedConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let timeout = Duration::from_secs(
            env::var("SOURCE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        );
        let site = SITE_URL.as_str();
        let locale = LOCALE.as_str();

        let canonical = CanonicalConfig {
            preferred_currency: env::var("PREFERRED_CURRENCY")
                .ok()
                .map(|v| v.trim().to_uppercase())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "USD".to_string()),
            fallback_currencies: env::var("FALLBACK_CURRENCIES")
                .map(|raw| parse_currency_list(&raw))
                .unwrap_or_else(|_| vec!["EUR".to_string(), "GBP".to_string()]),
            giveaway_min_items: env::var("GIVEAWAY_MIN_ITEMS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(DEFAULT_GIVEAWAY_MIN_ITEMS),
            locale: locale.to_string(),
        };

        let mut feed = FeedConfig::default();
        if let Some(dir) = env::var("FEED_OUTPUT_DIR").ok().filter(|v| !v.trim().is_empty()) {
            feed.output_dir = PathBuf::from(dir.trim());
        }
        if let Some(language) = env::var("FEED_LANGUAGE").ok().filter(|v| !v.trim().is_empty()) {
            feed.language = language.trim().to_string();
        }
        if let Some(prefix) = env::var("FEED_TITLE_PREFIX").ok().filter(|v| !v.trim().is_empty()) {
            feed.title_prefix = prefix.trim().to_string();
        }

        Self {
            index: SourceConfig::from_env(
                "INDEX_API",
                format!("{site}/api/algolia/bundles"),
                timeout,
            ),
            index_query: env::var("INDEX_API_QUERY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_INDEX_QUERY.to_string()),
            all_active: SourceConfig::from_env(
                "ALL_ACTIVE_API",
                format!("{site}/api/all/{locale}"),
                timeout,
            ),
            promotions: SourceConfig::from_env(
                "PROMOTIONS_API",
                format!("{site}/api/promotions/{locale}"),
                timeout,
            ),
            canonical,
            feed,
        }
    }
}

/// Parses `Name: value; Other: value` into header pairs, skipping malformed
/// entries.
pub fn parse_headers(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|entry| {
            let (name, value) = entry.split_once(':')?;
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() {
                None
            } else {
                Some((name.to_string(), value.to_string()))
            }
        })
        .collect()
}

pub fn language_tag(locale: &str) -> String {
    let locale = locale.trim();
    if locale.contains(['-', '_']) {
        return locale.replace('_', "-");
    }
    match locale.to_lowercase().as_str() {
        "" | "en" => "en-US".to_string(),
        "ja" => "ja-JP".to_string(),
        lang => format!("{lang}-{}", lang.to_uppercase()),
    }
}

fn parse_currency_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_headers_skips_malformed_entries() {
        let headers = parse_headers("X-Algolia-Application-Id: APP; broken ; : nope;Accept:application/json");
        assert_eq!(
            headers,
            vec![
                ("X-Algolia-Application-Id".to_string(), "APP".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
            ]
        );
    }

    #[test]
    fn language_tag_follows_locale() {
        assert_eq!(language_tag("en"), "en-US");
        assert_eq!(language_tag("de"), "de-DE");
        assert_eq!(language_tag("fr"), "fr-FR");
        assert_eq!(language_tag("pt_BR"), "pt-BR");
    }

    #[test]
    fn currency_list_is_uppercased_and_trimmed() {
        assert_eq!(parse_currency_list(" eur, gbp ,,"), vec!["EUR", "GBP"]);
    }

    #[test]
    fn source_config_builder_keeps_headers_in_order() {
        let cfg = SourceConfig::new("http://localhost/api")
            .with_header("A", "1")
            .with_header("B", "2")
            .with_timeout(Duration::from_secs(2));
        assert_eq!(cfg.headers.len(), 2);
        assert_eq!(cfg.headers[0].0, "A");
        assert_eq!(cfg.timeout, Duration::from_secs(2));
    }
}
