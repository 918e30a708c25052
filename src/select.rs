use crate::models::{BundleKind, BundlePrice, Category, CanonicalBundle, CategoryFeed};
use chrono::{DateTime, Utc};

/// Bundles owned by `category`, most recently started first. Ties keep their
/// arrival order. An empty selection yields a single placeholder so the feed
/// is never empty.
pub fn select_category(
    bundles: &[CanonicalBundle],
    category: Category,
    locale: &str,
    now: DateTime<Utc>,
) -> CategoryFeed {
    let mut selected = bundles
        .iter()
        .filter(|bundle| bundle.category == category)
        .cloned()
        .collect::<Vec<_>>();
    selected.sort_by(|a, b| b.valid_from.cmp(&a.valid_from));

    if selected.is_empty() {
        selected.push(placeholder(category, locale, now));
    }
    CategoryFeed {
        category,
        bundles: selected,
    }
}

pub fn placeholder(category: Category, locale: &str, now: DateTime<Utc>) -> CanonicalBundle {
    let slug = format!("no-active-{}-bundles", category.as_str());
    CanonicalBundle {
        id: format!("placeholder-{}", category.as_str()),
        title: format!("No active {} Bundles right now", category.label()),
        description: format!(
            "There are currently no {} bundles available. This entry will be replaced as soon as new bundles appear.",
            category.label().to_lowercase()
        ),
        url: format!("/{locale}/bundle/{}", category.as_str()),
        slug,
        category,
        kind: BundleKind::Placeholder,
        source: None,
        valid_from: Some(now),
        valid_until: None,
        price: BundlePrice {
            currency: String::new(),
            sale: 0.0,
            list: 0.0,
            discount: 0,
        },
        item_count: 0,
        active: false,
        image: None,
        tier: None,
        display_type: None,
        category_hint: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bundle(slug: &str, category: Category, day: Option<u32>) -> CanonicalBundle {
        let mut b = placeholder(category, "en", Utc::now());
        b.slug = slug.into();
        b.id = slug.into();
        b.title = slug.into();
        b.kind = BundleKind::Bundle;
        b.valid_from = day.and_then(|d| Utc.with_ymd_and_hms(2026, 1, d, 0, 0, 0).single());
        b
    }

    #[test]
    fn orders_by_start_desc_with_stable_ties() {
        let bundles = vec![
            bundle("old", Category::Games, Some(1)),
            bundle("tie-a", Category::Games, Some(5)),
            bundle("book", Category::Books, Some(9)),
            bundle("undated", Category::Games, None),
            bundle("tie-b", Category::Games, Some(5)),
            bundle("new", Category::Games, Some(8)),
        ];
        let feed = select_category(&bundles, Category::Games, "en", Utc::now());
        let slugs = feed.bundles.iter().map(|b| b.slug.as_str()).collect::<Vec<_>>();
        assert_eq!(slugs, vec!["new", "tie-a", "tie-b", "old", "undated"]);
        assert!(!feed.is_placeholder_only());
    }

    #[test]
    fn empty_selection_gets_one_placeholder() {
        let bundles = vec![bundle("g", Category::Games, Some(1))];
        let feed = select_category(&bundles, Category::Software, "de", Utc::now());
        assert!(feed.is_placeholder_only());
        let entry = &feed.bundles[0];
        assert_eq!(entry.category, Category::Software);
        assert_eq!(entry.title, "No active Software Bundles right now");
        assert_eq!(entry.url, "/de/bundle/software");
        assert!(entry.is_valid());
    }
}
