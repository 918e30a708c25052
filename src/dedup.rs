use crate::models::CanonicalBundle;
use std::collections::HashSet;
use tracing::debug;

/// `(slug, valid_from unix seconds)`; a missing start counts as 0 so
/// undated duplicates still collapse.
pub fn dedup_key(bundle: &CanonicalBundle) -> (String, i64) {
    (
        bundle.slug.clone(),
        bundle.valid_from.map(|ts| ts.timestamp()).unwrap_or(0),
    )
}

pub fn dedup(bundles: Vec<CanonicalBundle>) -> Vec<CanonicalBundle> {
    let mut seen = HashSet::with_capacity(bundles.len());
    let mut unique = Vec::with_capacity(bundles.len());
    for bundle in bundles {
        let key = dedup_key(&bundle);
        if seen.insert(key) {
            unique.push(bundle);
        } else {
            debug!(
                target = "bundles.dedup",
                slug = %bundle.slug,
                title = %bundle.title,
                source = ?bundle.source,
                "duplicate_bundle_removed"
            );
        }
    }
    unique
}
