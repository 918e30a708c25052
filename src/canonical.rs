use crate::config::CanonicalConfig;
use crate::models::{
    BundleKind, BundlePrice, CandidateKind, Category, CanonicalBundle, PriceTable,
    RawBundleCandidate, RawTimestamp,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Converts one candidate. Returns `None` when the candidate has expired or
/// is an incidental giveaway below the item threshold.
pub fn canonicalize(
    raw: RawBundleCandidate,
    config: &CanonicalConfig,
    now: DateTime<Utc>,
) -> Option<CanonicalBundle> {
    let valid_from = raw.valid_from.as_ref().and_then(parse_timestamp);
    let valid_until = raw.valid_until.as_ref().and_then(parse_timestamp);
    if valid_until.is_some_and(|until| until < now) {
        return None;
    }

    let item_count = raw.item_count.unwrap_or(0);
    if let CandidateKind::Giveaway { primary: false } = raw.kind
        && item_count < config.giveaway_min_items
    {
        return None;
    }

    let price = resolve_price(&raw, config);
    let title = raw.title.map(|t| collapse_whitespace(&t)).unwrap_or_default();
    let slug = raw
        .slug
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| slugify(&title));
    let url = raw
        .url
        .map(|u| normalize_url(&u))
        .filter(|u| !u.is_empty())
        .or_else(|| {
            (!slug.is_empty()).then(|| match raw.kind {
                CandidateKind::PickAndMix => format!("/{}/pick-and-mix/{slug}", config.locale),
                _ => format!("/{}/bundle/{slug}", config.locale),
            })
        })
        .unwrap_or_default();
    let free = matches!(raw.kind, CandidateKind::Giveaway { .. });
    let description = describe(raw.description.as_deref(), &price, free, item_count, raw.tier.as_deref());
    let active = raw.on_sale.unwrap_or(true) && valid_until.is_none_or(|until| until > now);

    Some(CanonicalBundle {
        id: raw.id.unwrap_or_else(|| slug.clone()),
        slug,
        title,
        description,
        url,
        category: Category::Unclassified,
        kind: BundleKind::from(raw.kind),
        source: Some(raw.source),
        valid_from,
        valid_until,
        price,
        item_count,
        active,
        image: raw.image,
        tier: raw.tier,
        display_type: raw.display_type,
        category_hint: raw.category_hint,
    })
}

/// Preferred currency first, then the fallbacks in order.
pub fn resolve_price(raw: &RawBundleCandidate, config: &CanonicalConfig) -> BundlePrice {
    let table = if raw.sale_prices.is_empty() {
        &raw.list_prices
    } else {
        &raw.sale_prices
    };
    let currency = std::iter::once(&config.preferred_currency)
        .chain(config.fallback_currencies.iter())
        .find(|currency| table.contains_key(currency.as_str()))
        .cloned();

    let Some(currency) = currency else {
        return BundlePrice {
            currency: config.preferred_currency.clone(),
            sale: 0.0,
            list: 0.0,
            discount: resolve_discount(0.0, 0.0, raw.explicit_discount, raw.bonus_saving),
        };
    };

    let sale = amount(&raw.sale_prices, &currency);
    let list = amount(&raw.list_prices, &currency);
    BundlePrice {
        discount: resolve_discount(sale, list, raw.explicit_discount, raw.bonus_saving),
        currency,
        sale,
        list,
    }
}

fn amount(table: &PriceTable, currency: &str) -> f64 {
    table
        .get(currency)
        .copied()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(0.0)
}

/// A non-zero explicit discount wins over the computed one; a larger bonus
/// saving wins over both.
pub fn resolve_discount(sale: f64, list: f64, explicit: Option<f64>, bonus: Option<f64>) -> u8 {
    let explicit = explicit.filter(|d| d.is_finite() && *d > 0.0);
    let base = match explicit {
        Some(d) => d.round(),
        None if list > sale && sale > 0.0 => (100.0 * (list - sale) / list).round(),
        None => 0.0,
    };
    let resolved = match bonus.filter(|b| b.is_finite()) {
        Some(b) if b.round() > base => b.round(),
        _ => base,
    };
    resolved.clamp(0.0, 100.0) as u8
}

pub fn parse_timestamp(raw: &RawTimestamp) -> Option<DateTime<Utc>> {
    match raw {
        RawTimestamp::Unix(secs) => from_unix(*secs),
        RawTimestamp::Fractional(secs) if secs.is_finite() => from_unix(secs.trunc() as i64),
        RawTimestamp::Fractional(_) => None,
        RawTimestamp::Text(text) => parse_text_timestamp(text.trim()),
    }
}

fn from_unix(value: i64) -> Option<DateTime<Utc>> {
    if value <= 0 {
        return None;
    }
    if value >= MILLIS_THRESHOLD {
        return Utc.timestamp_millis_opt(value).single();
    }
    Utc.timestamp_opt(value, 0).single()
}

fn parse_text_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(secs) = text.parse::<i64>() {
        return from_unix(secs);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn describe(
    source: Option<&str>,
    price: &BundlePrice,
    free: bool,
    item_count: u32,
    tier: Option<&str>,
) -> String {
    let mut parts = vec![
        source
            .map(collapse_whitespace)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Bundle".to_string()),
    ];
    if price.sale > 0.0 {
        let mut line = format!("Price: {:.2} {}", price.sale, price.currency);
        if price.discount > 0 {
            line.push_str(&format!(" (-{}%)", price.discount));
        }
        parts.push(line);
    } else if free && price.list > 0.0 {
        parts.push(format!("Free (worth {:.2} {})", price.list, price.currency));
    } else if price.discount > 0 {
        parts.push(format!("{}% off", price.discount));
    }
    if item_count > 0 {
        parts.push(format!(
            "{item_count} {}",
            if item_count == 1 { "item" } else { "items" }
        ));
    }
    if let Some(tier) = tier.filter(|t| !t.trim().is_empty()) {
        parts.push(format!("Tier: {}", tier.trim()));
    }
    parts.join(" - ")
}

fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }
    format!("/{}", trimmed.trim_start_matches('/'))
}

pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(ch.to_ascii_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceId;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    fn candidate() -> RawBundleCandidate {
        RawBundleCandidate {
            id: Some("b-1".into()),
            slug: Some("indie-bundle".into()),
            title: Some("Indie  Bundle".into()),
            url: Some("en/bundle/indie-bundle".into()),
            on_sale: Some(true),
            ..RawBundleCandidate::new(SourceId::IndexApi, CandidateKind::Bundle)
        }
    }

    fn config() -> CanonicalConfig {
        CanonicalConfig {
            locale: "en".into(),
            ..CanonicalConfig::default()
        }
    }

    #[test]
    fn falls_back_through_currency_order() {
        let raw = RawBundleCandidate {
            sale_prices: PriceTable::from([("EUR".to_string(), 9.99)]),
            ..candidate()
        };
        let price = resolve_price(&raw, &config());
        assert_eq!(price.currency, "EUR");
        assert_eq!(price.sale, 9.99);
        assert_eq!(price.list, 0.0);
        assert_eq!(price.discount, 0);
    }

    #[test]
    fn preferred_currency_wins_when_present() {
        let raw = RawBundleCandidate {
            sale_prices: PriceTable::from([
                ("EUR".to_string(), 8.0),
                ("USD".to_string(), 10.0),
            ]),
            list_prices: PriceTable::from([("USD".to_string(), 40.0)]),
            ..candidate()
        };
        let price = resolve_price(&raw, &config());
        assert_eq!(price.currency, "USD");
        assert_eq!(price.discount, 75);
    }

    #[test]
    fn no_known_currency_means_zero_in_preferred() {
        let raw = RawBundleCandidate {
            sale_prices: PriceTable::from([("JPY".to_string(), 1200.0)]),
            ..candidate()
        };
        let price = resolve_price(&raw, &config());
        assert_eq!(price.currency, "USD");
        assert_eq!(price.sale, 0.0);
    }

    #[test]
    fn discount_rules() {
        assert_eq!(resolve_discount(2.5, 10.0, None, None), 75);
        assert_eq!(resolve_discount(6.66, 10.0, None, None), 33);
        assert_eq!(resolve_discount(2.5, 10.0, Some(0.0), None), 75);
        assert_eq!(resolve_discount(2.5, 10.0, Some(60.0), None), 60);
        assert_eq!(resolve_discount(2.5, 10.0, None, Some(90.0)), 90);
        assert_eq!(resolve_discount(2.5, 10.0, None, Some(10.0)), 75);
        assert_eq!(resolve_discount(2.5, 0.0, None, None), 0);
        assert_eq!(resolve_discount(0.0, 10.0, None, None), 0);
        assert_eq!(resolve_discount(1.0, 10.0, Some(250.0), None), 100);
    }

    #[test]
    fn expired_candidates_are_dropped() {
        let raw = RawBundleCandidate {
            valid_until: Some(RawTimestamp::Unix((now() - Duration::seconds(1)).timestamp())),
            ..candidate()
        };
        assert!(canonicalize(raw, &config(), now()).is_none());
    }

    #[test]
    fn future_end_is_active_and_open_end_is_kept() {
        let raw = RawBundleCandidate {
            valid_until: Some(RawTimestamp::Text("2026-02-01T00:00:00Z".into())),
            ..candidate()
        };
        let bundle = canonicalize(raw, &config(), now()).expect("kept");
        assert!(bundle.active);

        let open = canonicalize(candidate(), &config(), now()).expect("kept");
        assert!(open.valid_until.is_none());
        assert!(open.active);

        let off_sale = RawBundleCandidate {
            on_sale: Some(false),
            ..candidate()
        };
        assert!(!canonicalize(off_sale, &config(), now()).expect("kept").active);
    }

    #[test]
    fn small_giveaways_need_primary_flag() {
        let small = RawBundleCandidate {
            item_count: Some(2),
            ..RawBundleCandidate {
                kind: CandidateKind::Giveaway { primary: false },
                ..candidate()
            }
        };
        assert!(canonicalize(small.clone(), &config(), now()).is_none());

        let primary = RawBundleCandidate {
            kind: CandidateKind::Giveaway { primary: true },
            ..small.clone()
        };
        assert!(canonicalize(primary, &config(), now()).is_some());

        let large = RawBundleCandidate {
            item_count: Some(5),
            ..small
        };
        assert!(canonicalize(large, &config(), now()).is_some());
    }

    #[test]
    fn derives_slug_url_and_description() {
        let raw = RawBundleCandidate {
            slug: None,
            url: None,
            id: None,
            title: Some("Brutal  Strategy Bundle!".into()),
            sale_prices: PriceTable::from([("USD".to_string(), 4.99)]),
            list_prices: PriceTable::from([("USD".to_string(), 49.9)]),
            item_count: Some(8),
            tier: Some("Tier 2".into()),
            ..candidate()
        };
        let bundle = canonicalize(raw, &config(), now()).expect("kept");
        assert_eq!(bundle.title, "Brutal Strategy Bundle!");
        assert_eq!(bundle.slug, "brutal-strategy-bundle");
        assert_eq!(bundle.id, "brutal-strategy-bundle");
        assert_eq!(bundle.url, "/en/bundle/brutal-strategy-bundle");
        assert_eq!(
            bundle.description,
            "Bundle - Price: 4.99 USD (-90%) - 8 items - Tier: Tier 2"
        );
        assert_eq!(bundle.category, Category::Unclassified);
    }

    #[test]
    fn only_giveaways_are_described_as_free() {
        let list_only = RawBundleCandidate {
            list_prices: PriceTable::from([("USD".to_string(), 29.99)]),
            item_count: Some(6),
            ..candidate()
        };
        let bundle = canonicalize(list_only.clone(), &config(), now()).expect("kept");
        assert_eq!(bundle.description, "Bundle - 6 items");

        let giveaway = RawBundleCandidate {
            kind: CandidateKind::Giveaway { primary: true },
            sale_prices: PriceTable::from([("USD".to_string(), 0.0)]),
            ..list_only
        };
        let bundle = canonicalize(giveaway, &config(), now()).expect("kept");
        assert_eq!(bundle.description, "Bundle - Free (worth 29.99 USD) - 6 items");
    }

    #[test]
    fn relative_urls_are_normalized() {
        let bundle = canonicalize(candidate(), &config(), now()).expect("kept");
        assert_eq!(bundle.url, "/en/bundle/indie-bundle");
        assert_eq!(normalize_url("https://x.test/a"), "https://x.test/a");
        assert_eq!(normalize_url("//a"), "/a");
    }

    #[test]
    fn timestamp_encodings() {
        let expected = Utc.with_ymd_and_hms(2025, 10, 1, 10, 0, 0).unwrap();
        let secs = expected.timestamp();
        assert_eq!(parse_timestamp(&RawTimestamp::Unix(secs)), Some(expected));
        assert_eq!(parse_timestamp(&RawTimestamp::Unix(secs * 1000)), Some(expected));
        assert_eq!(
            parse_timestamp(&RawTimestamp::Fractional(secs as f64 + 0.4)),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&RawTimestamp::Text("2025-10-01 10:00:00".into())),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&RawTimestamp::Text("2025-10-01T12:00:00+02:00".into())),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&RawTimestamp::Text(secs.to_string())),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&RawTimestamp::Text("soon".into())), None);
        assert_eq!(parse_timestamp(&RawTimestamp::Unix(0)), None);
    }
}
