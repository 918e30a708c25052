use crate::canonical::canonicalize;
use crate::classify;
use crate::config::{AppConfig, CanonicalConfig};
use crate::dedup::dedup;
use crate::feed::FeedSink;
use crate::models::{
    CanonicalBundle, Category, CategoryFeed, PipelineRun, RawBundleCandidate, SourceReport,
    StageReport,
};
use crate::select::{placeholder, select_category};
use crate::sources::{AllActiveSource, IndexSource, PromotionsSource, SourceAdapter};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{Value, json};
use std::{future::Future, sync::Arc, time::Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct Pipeline {
    pub config: Arc<PipelineConfig>,
    sources: Arc<[Arc<dyn SourceAdapter>]>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub canonical: CanonicalConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub category: Category,
    pub items: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Pipeline {
    /// Adapters are ordered by source precedence regardless of the order given.
    pub fn new(config: PipelineConfig, mut sources: Vec<Arc<dyn SourceAdapter>>) -> Self {
        sources.sort_by_key(|source| source.id());
        Self {
            config: Arc::new(config),
            sources: sources.into(),
        }
    }

    pub fn from_config(app: &AppConfig) -> Self {
        let locale = app.canonical.locale.clone();
        let sources: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(IndexSource::new(
                app.index.clone(),
                app.index_query.clone(),
                locale.clone(),
            )),
            Arc::new(AllActiveSource::new(app.all_active.clone(), locale.clone())),
            Arc::new(PromotionsSource::new(app.promotions.clone(), locale)),
        ];
        Self::new(
            PipelineConfig {
                canonical: app.canonical.clone(),
            },
            sources,
        )
    }

    pub async fn run(&self) -> PipelineRun {
        self.run_at(Utc::now()).await
    }

    /// One full pass. Never fails: unavailable sources contribute nothing and
    /// empty categories get a placeholder.
    pub async fn run_at(&self, now: DateTime<Utc>) -> PipelineRun {
        let run_id = Uuid::new_v4();
        let mut stages = Vec::new();
        info!(target = "bundles.pipeline", %run_id, sources = self.sources.len(), "run_started");

        let (candidates, sources) = self
            .capture_stage("fetch_sources", &mut stages, async {
                let (candidates, reports) = self.fetch_all().await;
                let failed = reports.iter().filter(|r| r.error.is_some()).count();
                let output = json!({
                    "candidates": candidates.len(),
                    "sources": reports.len(),
                    "failed": failed,
                });
                StageOutcome::new((candidates, reports), output)
            })
            .await;

        let canonical = &self.config.canonical;
        let bundles = self
            .capture_stage("canonicalize", &mut stages, async {
                let total = candidates.len();
                let bundles = candidates
                    .into_iter()
                    .filter_map(|raw| canonicalize(raw, canonical, now))
                    .filter(CanonicalBundle::is_valid)
                    .collect::<Vec<_>>();
                let output = json!({
                    "candidates": total,
                    "kept": bundles.len(),
                    "dropped": total - bundles.len(),
                });
                StageOutcome::new(bundles, output)
            })
            .await;

        let bundles = self
            .capture_stage("dedup", &mut stages, async {
                let before = bundles.len();
                let unique = dedup(bundles);
                let output = json!({ "before": before, "after": unique.len() });
                StageOutcome::new(unique, output)
            })
            .await;

        let shared: Arc<[CanonicalBundle]> = self
            .capture_stage("classify", &mut stages, async {
                let mut bundles = bundles;
                classify::apply(&mut bundles);
                let mut counts = serde_json::Map::new();
                for category in Category::FEEDS {
                    let n = bundles.iter().filter(|b| b.category == category).count();
                    counts.insert(category.as_str().to_string(), json!(n));
                }
                StageOutcome::new(bundles.into(), Value::Object(counts))
            })
            .await;

        let locale = canonical.locale.clone();
        let feeds = self
            .capture_stage("select", &mut stages, async {
                let feeds = select_all(shared, &locale, now).await;
                let output = feeds
                    .iter()
                    .map(|feed| {
                        json!({
                            "category": feed.category,
                            "items": feed.bundles.len(),
                            "placeholder": feed.is_placeholder_only(),
                        })
                    })
                    .collect::<Vec<_>>();
                StageOutcome::new(feeds, Value::Array(output))
            })
            .await;

        for feed in &feeds {
            crate::metrics::feed_items(feed.category.as_str(), feed.bundles.len());
        }
        info!(
            target = "bundles.pipeline",
            %run_id,
            games = feeds.first().map(|f| f.bundles.len()).unwrap_or(0),
            books = feeds.get(1).map(|f| f.bundles.len()).unwrap_or(0),
            software = feeds.get(2).map(|f| f.bundles.len()).unwrap_or(0),
            "run_finished"
        );

        PipelineRun {
            run_id,
            started_at: now,
            sources,
            stages,
            feeds,
        }
    }

    pub async fn publish(&self, run: &PipelineRun, sink: Arc<dyn FeedSink>) -> Vec<PublishReport> {
        let tasks = run.feeds.iter().cloned().map(|feed| {
            let sink = sink.clone();
            tokio::spawn(async move {
                let result = sink.publish(&feed).await;
                (feed.category, feed.bundles.len(), result)
            })
        });
        let categories = run.feeds.iter().map(|feed| feed.category).collect::<Vec<_>>();

        join_all(tasks)
            .await
            .into_iter()
            .zip(categories)
            .map(|(joined, category)| match joined {
                Ok((category, items, Ok(()))) => PublishReport {
                    category,
                    items,
                    error: None,
                },
                Ok((category, items, Err(err))) => {
                    error!(target = "bundles.feed", run_id = %run.run_id, category = category.as_str(), error = %err, "feed_publish_failed");
                    PublishReport {
                        category,
                        items,
                        error: Some(err.to_string()),
                    }
                }
                Err(err) => {
                    error!(target = "bundles.feed", run_id = %run.run_id, category = category.as_str(), error = %err, "feed_publish_task_failed");
                    PublishReport {
                        category,
                        items: 0,
                        error: Some(err.to_string()),
                    }
                }
            })
            .collect()
    }

    async fn fetch_all(&self) -> (Vec<RawBundleCandidate>, Vec<SourceReport>) {
        let tasks = self.sources.iter().cloned().map(|source| {
            tokio::spawn(async move {
                let started = Instant::now();
                let result = source.fetch().await;
                (result, started.elapsed().as_millis())
            })
        });
        let joined = join_all(tasks).await;

        let mut candidates = Vec::new();
        let mut reports = Vec::with_capacity(joined.len());
        for (source, outcome) in self.sources.iter().zip(joined) {
            let id = source.id();
            let report = match outcome {
                Ok((Ok(batch), elapsed_ms)) => {
                    info!(target = "bundles.source", source = id.as_str(), candidates = batch.len(), elapsed_ms = elapsed_ms as u64, "source_fetched");
                    let report = SourceReport {
                        source: id,
                        candidates: batch.len(),
                        elapsed_ms,
                        error: None,
                    };
                    candidates.extend(batch);
                    report
                }
                Ok((Err(err), elapsed_ms)) => {
                    warn!(target = "bundles.source", source = err.source_id().as_str(), error = %err, "source_unavailable");
                    SourceReport {
                        source: id,
                        candidates: 0,
                        elapsed_ms,
                        error: Some(err.to_string()),
                    }
                }
                Err(err) => {
                    warn!(target = "bundles.source", source = id.as_str(), error = %err, "source_task_failed");
                    SourceReport {
                        source: id,
                        candidates: 0,
                        elapsed_ms: 0,
                        error: Some(format!("{id}: task failed: {err}")),
                    }
                }
            };
            crate::metrics::source_candidates(id.as_str(), report.candidates, report.error.is_some());
            reports.push(report);
        }
        (candidates, reports)
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> T
    where
        Fut: Future<Output = StageOutcome<T>>,
    {
        let started = Instant::now();
        let outcome = fut.await;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        outcome.value
    }
}

async fn select_all(
    shared: Arc<[CanonicalBundle]>,
    locale: &str,
    now: DateTime<Utc>,
) -> Vec<CategoryFeed> {
    let tasks = Category::FEEDS.into_iter().map(|category| {
        let shared = shared.clone();
        let locale = locale.to_string();
        tokio::spawn(async move { select_category(&shared, category, &locale, now) })
    });

    join_all(tasks)
        .await
        .into_iter()
        .zip(Category::FEEDS)
        .map(|(joined, category)| {
            joined.unwrap_or_else(|err| {
                error!(target = "bundles.pipeline", category = category.as_str(), error = %err, "select_task_failed");
                CategoryFeed {
                    category,
                    bundles: vec![placeholder(category, locale, now)],
                }
            })
        })
        .collect()
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}
