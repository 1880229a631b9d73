use std::sync::Arc;

use clap::Parser;
use feature_service::{FeatureFetcher, HttpTransport};
use navigator::{Args, LogSync, NavigatorConfig, OutputOptions, Session};
use streaming::{FetchOutcome, HttpImagerySource, ImageryCache, ImageryPipeline};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = NavigatorConfig::from_env()?;
    config.apply_args(&args);
    let params = config.query_params(&args)?;

    let client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;

    let transport = HttpTransport::new(&config.feature_service_url, config.http_timeout)?
        .with_client(client.clone());
    let fetcher = FeatureFetcher::new(Arc::new(transport)).with_retry(config.retry_policy());

    let source = HttpImagerySource::new(&config.imagery_url, config.http_timeout)?
        .with_client(client);
    let cache = ImageryCache::with_policy(config.cache_max_entries, config.cache_policy);
    let pipeline = Arc::new(ImageryPipeline::new(Arc::new(source), cache));

    let mut session = Session::new(fetcher, pipeline, Arc::new(LogSync))
        .with_multi_select(config.multi_select)
        .with_output(OutputOptions {
            width: Some(config.image_width),
            height: Some(config.image_height),
            mode: config.image_mode.clone(),
        });

    info!(
        "querying {} for {}",
        config.feature_service_url, config.type_name
    );
    let outcome = session.discover(&params).await?;
    info!(
        features = outcome.collection.len(),
        attempts = outcome.attempts,
        via_fallback = outcome.via_fallback,
        "discovery finished"
    );
    if outcome.collection.is_empty() {
        return Ok(());
    }

    if config.multi_select {
        session.select_all();
        session.first();
    } else if let Some(first) = session.discovered().first().cloned() {
        session.select_feature(&first);
    }

    for step in 0..=args.steps {
        if step > 0 {
            session.next();
        }
        let Some(current) = session.current().cloned() else {
            break;
        };
        let Some(fetch) = session.refresh_image() else {
            warn!(id = %current.id, "no imagery for feature");
            continue;
        };
        match fetch.await {
            Ok(FetchOutcome::Fetched(image)) | Ok(FetchOutcome::Cached(image)) => info!(
                id = %current.id,
                bytes = image.len(),
                content_type = image.content_type.as_deref().unwrap_or("unknown"),
                "imagery ready"
            ),
            Ok(FetchOutcome::Superseded) => info!(id = %current.id, "imagery superseded"),
            Ok(FetchOutcome::InFlight) => info!(id = %current.id, "imagery already loading"),
            Err(err) => warn!(id = %current.id, "imagery fetch failed: {err}"),
        }
    }

    let stats = session.pipeline().cache_stats();
    info!(
        entries = stats.count,
        bytes = stats.estimated_bytes,
        evictions = stats.evictions,
        "imagery cache"
    );
    Ok(())
}
