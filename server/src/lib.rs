//! Lifecycle and HTTP surface: the one crate that wires every other
//! core crate into a single running process and exposes them over HTTP.
//! Build config, init tracing, construct every component once, run the
//! warmup sequence, bind the listener, and drain on signal before
//! persisting and closing.

pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
mod state;

pub use config::ServerConfig;
pub use state::ApiState;

use facesrec_batch::{BatchConfig, BatchEngine};
use facesrec_cache::{CacheConfig, FaceCache};
use facesrec_coordinator::{Coordinator, CoordinatorConfig};
use facesrec_embedder::reference::ReferenceEmbedder;
use facesrec_embedder::FaceEmbedder;
use facesrec_index::{FaceIndex, IndexConfig, RebuildUser};
use facesrec_metrics::FaceMetrics;
use facesrec_store::{DescriptorStore, PgDescriptorStore};
use facesrec_types::RecognitionProfile;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use task_manager::TaskManager;
use tokio::net::TcpListener;

/// Startup order: init the store, warm up the embedder, init the index
/// (bulk-loading active users into it if it came up empty), then prime
/// the metrics gauges. Traffic is not accepted until this returns.
pub async fn build_state(config: &ServerConfig) -> Result<ApiState, Box<dyn Error>> {
    let metrics = FaceMetrics::install();
    let store: Arc<dyn DescriptorStore> =
        Arc::new(PgDescriptorStore::connect(&config.database_url, metrics.clone()).await?);

    // The reference embedder stands in for a real detector/embedder
    // provider the way `facesrec_embedder`'s module docs describe — one
    // production-shaped seam, one deterministic implementation, both
    // behind `FaceEmbedder`.
    let embedder: Arc<dyn FaceEmbedder> = Arc::new(ReferenceEmbedder);
    embedder.warmup().await?;

    let index_dir = PathBuf::from(&config.index_dir);
    let index = FaceIndex::new(
        IndexConfig {
            dim: facesrec_types::DESCRIPTOR_DIM,
            m: config.index.hnsw_m,
            ef_construction: config.index.hnsw_ef_construction,
            ef_search: config.index.hnsw_ef_search,
            max_elements: config.index.max_elements,
        },
        index_dir.join("graph.hnsw"),
        index_dir.join("meta.json"),
    );
    index.init();

    if index.size() == 0 {
        let active = store.list_active().await?;
        if !active.is_empty() {
            let rows: Vec<RebuildUser> = active
                .into_iter()
                .map(|u| RebuildUser {
                    user_id: u.user_id,
                    external_id: u.external_id,
                    display_name: u.display_name,
                    client_ref: u.client_ref,
                    descriptor_json: u.descriptor.to_json(),
                })
                .collect();
            index.rebuild(&rows)?;
        }
    }

    let cache = FaceCache::connect(CacheConfig {
        redis_url: config.redis_url.clone(),
        default_ttl: config.cache.ttl(),
        max_keys: config.cache.cache_max_size,
    })
    .await;

    metrics.set_hnsw_index_size(index.size());
    metrics.set_active_users(store.count_active().await.unwrap_or_default());
    // The reference embedder runs on CPU; these gauges exist for parity with
    // spec.md's metrics surface and are primed at zero rather than omitted.
    metrics.set_gpu_memory(0, 0);
    metrics.set_tensorflow_gpu_active(false);

    let coordinator = Arc::new(Coordinator::new(
        index.clone(),
        Arc::clone(&store),
        Arc::clone(&cache),
        metrics.clone(),
        Arc::clone(&embedder),
        CoordinatorConfig {
            default_profile: RecognitionProfile::Balanced,
            min_face_size: config.recognition.min_face_size,
            max_face_size: config.recognition.max_face_size,
            detection_confidence: 0.8,
            cache_enabled: true,
            confidence_threshold: Some(config.recognition.confidence_threshold),
        },
    ));

    let batch = BatchEngine::new(
        Arc::clone(&coordinator),
        Arc::clone(&store),
        metrics.clone(),
        BatchConfig {
            max_batch_size: config.batch.max_batch_size,
            max_concurrency: config.batch.max_concurrency,
            job_ttl: config.batch.job_ttl(),
            eviction_interval: Duration::from_secs(900),
        },
    );

    Ok(ApiState {
        coordinator,
        batch,
        index,
        store,
        cache,
        metrics,
    })
}

/// Binds the listener and serves until a shutdown signal arrives, then
/// drains in-flight requests, persists the index, and returns. Graceful
/// shutdown races `ctrl_c()` against the shared `TaskManager`'s
/// cancellation token the same way every long-running loop in this
/// service does (`task-manager/src/lib.rs`'s `TaskManagerGuard`).
pub async fn run(config: ServerConfig) -> Result<(), Box<dyn Error>> {
    let state = build_state(&config).await?;
    let task_manager = TaskManager::new();
    state.batch.spawn_eviction_loop(&task_manager).await;

    let app = routes::build_router(state.clone());
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "accepting traffic");

    let cancellation_token = task_manager.cancellation_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = cancellation_token.cancelled() => {}
            }
            tracing::info!("shutdown signal received, draining in-flight requests");
        })
        .await?;

    task_manager.cancel_all();
    task_manager.wait().await;

    if let Err(e) = state.index.save() {
        tracing::error!(error = %e, "failed to persist index on shutdown");
    }
    state.store.close().await;

    tracing::info!("shutdown complete");
    Ok(())
}
