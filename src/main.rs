mod canonical;
mod classify;
mod config;
mod dedup;
mod feed;
mod http;
mod metrics;
mod models;
mod pipeline;
mod select;
mod sources;

use config::AppConfig;
use eyre::{WrapErr, eyre};
use feed::RssFeedWriter;
use pipeline::Pipeline;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "bundles.main", "run failed: {err:?}");
        std::process::exit(1);
    }
}

async fn run() -> eyre::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env();
    info!(
        target = "bundles.main",
        index = %config.index.endpoint,
        all_active = %config.all_active.endpoint,
        promotions = %config.promotions.endpoint,
        output_dir = %config.feed.output_dir.display(),
        "config_loaded"
    );

    tokio::fs::create_dir_all(&config.feed.output_dir)
        .await
        .wrap_err_with(|| format!("creating {}", config.feed.output_dir.display()))?;

    let pipeline = Pipeline::from_config(&config);
    let run = pipeline.run().await;
    for report in run.sources.iter().filter(|r| r.error.is_some()) {
        warn!(
            target = "bundles.main",
            source = report.source.as_str(),
            error = report.error.as_deref().unwrap_or_default(),
            "source_skipped"
        );
    }

    let writer = Arc::new(RssFeedWriter::new(config.feed.clone()));
    let published = pipeline.publish(&run, writer.clone()).await;
    writer
        .write_index(&run.feeds)
        .await
        .wrap_err("writing feed index page")?;

    let summary = serde_json::json!({
        "run_id": run.run_id,
        "started_at": run.started_at,
        "sources": run.sources,
        "stages": run.stages,
        "published": published,
    });
    let summary_path = config.feed.output_dir.join("last_run.json");
    tokio::fs::write(&summary_path, serde_json::to_vec_pretty(&summary)?)
        .await
        .wrap_err_with(|| format!("writing {}", summary_path.display()))?;

    let failed = published.iter().filter(|p| p.error.is_some()).count();
    info!(
        target = "bundles.main",
        run_id = %run.run_id,
        feeds = published.len(),
        failed,
        "run_complete"
    );
    if failed == published.len() {
        return Err(eyre!("no feed could be published"));
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
