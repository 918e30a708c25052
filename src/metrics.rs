use tracing::trace;

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "bundles.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn source_candidates(source: &'static str, candidates: usize, failed: bool) {
    trace!(
        target = "bundles.metrics",
        source = source,
        candidates = candidates as u64,
        failed = failed,
        "source_candidates"
    );
}

pub fn feed_items(category: &'static str, items: usize) {
    trace!(
        target = "bundles.metrics",
        category = category,
        items = items as u64,
        "feed_items"
    );
}
