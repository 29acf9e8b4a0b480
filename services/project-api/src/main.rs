//! Project API Service - Main Entry Point
//!
//! Wires configuration, logging, metrics, the key ring and the project
//! pipeline, then runs until a termination signal arrives.

use std::sync::Arc;

use prometheus::Registry;
use tracing::{info, warn};

use project_api::config::Config;
use project_api::jwt::{HttpKeySetSource, KeyRing, KeyRingSettings, TokenValidator};
use project_api::observability::{init_logging, CoreMetrics, LoggingConfig};
use project_api::pipeline::{RequestPipeline, TracingAuditSink};
use project_api::project::{MemoryDocumentStore, Repository};
use project_api::shutdown::{wait_for_signal, ShutdownCoordinator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;
    init_logging(&LoggingConfig::from_config(&config));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        authority = %config.authority,
        "Starting Project API Service"
    );

    let registry = Registry::new();
    let metrics = CoreMetrics::new(&registry)?;

    // Key ring
    let source = HttpKeySetSource::from_config(&config)?;
    let key_ring = KeyRing::new(
        Arc::new(source),
        KeyRingSettings::from_config(&config),
        metrics.clone(),
    );
    match key_ring.refresh().await {
        Ok(keys) => info!(keys = keys.len(), "Key set loaded"),
        Err(err) => warn!(error = %err, "Initial key set fetch failed; retrying on demand"),
    }

    let mut coordinator = ShutdownCoordinator::new();
    key_ring.spawn_refresher(&mut coordinator);

    // Project storage and pipeline
    let repository = Repository::new(
        Arc::new(MemoryDocumentStore::new()),
        config.store_timeout(),
        metrics.clone(),
    );
    let validator = TokenValidator::from_config(&config, key_ring.clone(), metrics);
    let pipeline = RequestPipeline::new(
        validator,
        key_ring,
        repository,
        Arc::new(TracingAuditSink),
    );

    let health = pipeline.health(&project_api::CallMetadata::anonymous()).await;
    info!(status = health.status, keys = health.key_ring.key_count, "Project API Service ready");

    let signal = wait_for_signal().await;
    let report = coordinator.shutdown(config.shutdown_timeout()).await;
    info!(?signal, aborted = report.aborted, "Project API Service stopped");

    Ok(())
}
