//! Batch engine: job lifecycle plus a bounded-concurrency worker
//! pool over a shared cursor. Workers drain a single shared atomic cursor
//! rather than dispatching chunks over per-worker channels, since each
//! unit of work here is one image through `Coordinator::identify`, not a
//! chunked validation batch.

pub mod config;
pub mod error;
mod view;

pub use config::BatchConfig;
pub use error::{BatchError, Result};
pub use view::{JobSummary, JobView};

use chrono::Utc;
use facesrec_coordinator::{Coordinator, IdentifyOptions};
use facesrec_metrics::FaceMetrics;
use facesrec_store::DescriptorStore;
use facesrec_types::{Job, JobError as JobErrorRow, JobId, JobOptions, JobResult, JobStatus, User};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use task_manager::TaskManager;

/// One item of a batch request: a caller-supplied id (used to correlate
/// results, since batch results land in completion order, not input order)
/// and already-decoded image bytes.
#[derive(Clone, Debug)]
pub struct BatchItem {
    pub id: Option<String>,
    pub image: Vec<u8>,
}

/// Guarded job registry plus the pool that drains items into it. One
/// `BatchEngine` per worker process, constructed explicitly and handed the
/// coordinator/store/metrics it needs rather than reaching for globals.
pub struct BatchEngine {
    coordinator: Arc<Coordinator>,
    store: Arc<dyn DescriptorStore>,
    metrics: FaceMetrics,
    config: BatchConfig,
    registry: RwLock<HashMap<JobId, Job>>,
}

impl BatchEngine {
    pub fn new(
        coordinator: Arc<Coordinator>,
        store: Arc<dyn DescriptorStore>,
        metrics: FaceMetrics,
        config: BatchConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            store,
            metrics,
            config,
            registry: RwLock::new(HashMap::new()),
        })
    }

    /// `createJob`. Validates `1 <= items.len() <= MAX_BATCH_SIZE`, registers
    /// a `pending` job, and returns immediately — the worker pool runs off
    /// the caller's task on a spawned one.
    #[tracing::instrument(skip(self, items))]
    pub fn create_job(self: &Arc<Self>, items: Vec<BatchItem>, options: JobOptions) -> Result<JobSummary> {
        if items.is_empty() || items.len() > self.config.max_batch_size {
            return Err(BatchError::InvalidBatchSize {
                len: items.len(),
                max: self.config.max_batch_size,
            });
        }

        let job_id = JobId::new();
        let job = Job::new(job_id.clone(), items.len(), options.clone());
        let summary = JobSummary::from(&job);
        self.registry.write().insert(job_id.clone(), job);
        self.metrics.record_batch_job("pending");

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run_job(job_id, items, options).await;
        });

        Ok(summary)
    }

    async fn run_job(self: Arc<Self>, job_id: JobId, items: Vec<BatchItem>, options: JobOptions) {
        self.transition(&job_id, |job| {
            job.status = JobStatus::Processing;
            job.started_at = Some(Utc::now());
        });

        let snapshot = match self.store.list_active().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "batch job failed before worker loop started");
                self.transition(&job_id, |job| {
                    job.status = JobStatus::Failed;
                    job.completed_at = Some(Utc::now());
                    job.global_error = Some(e.to_string());
                });
                self.metrics.record_batch_job("failed");
                return;
            }
        };

        let total = items.len();
        let cursor = Arc::new(AtomicUsize::new(0));
        let items = Arc::new(items);
        let worker_count = self.config.max_concurrency.min(total).max(1);
        let profile = options.profile;

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let engine = Arc::clone(&self);
            let cursor = Arc::clone(&cursor);
            let items = Arc::clone(&items);
            let snapshot = snapshot.clone();
            let job_id = job_id.clone();
            handles.push(tokio::spawn(async move {
                engine.worker_loop(cursor, items, snapshot, job_id, profile).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(job_id = %job_id, error = %e, "batch worker task panicked");
            }
        }

        self.transition(&job_id, |job| {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
        });

        let (success_count, error_count) = self
            .registry
            .read()
            .get(&job_id)
            .map(|job| (job.results.len() as u64, job.errors.len() as u64))
            .unwrap_or_default();
        self.metrics.record_batch_images("success", success_count);
        self.metrics.record_batch_images("error", error_count);
        self.metrics.record_batch_job("completed");
    }

    /// One worker draining the shared `cursor` over `items`. Each worker
    /// invokes `coordinator.identify` and appends its own result/error —
    /// results land in completion order, not input order — callers that
    /// need input order correlate by item id.
    async fn worker_loop(
        &self,
        cursor: Arc<AtomicUsize>,
        items: Arc<Vec<BatchItem>>,
        snapshot: Vec<User>,
        job_id: JobId,
        profile: Option<facesrec_types::RecognitionProfile>,
    ) {
        loop {
            let idx = cursor.fetch_add(1, Ordering::SeqCst);
            if idx >= items.len() {
                return;
            }
            let item = &items[idx];
            let item_id = item.id.clone().unwrap_or_else(|| idx.to_string());
            let started = Instant::now();
            let outcome = self
                .coordinator
                .identify(
                    &item.image,
                    IdentifyOptions {
                        active_users_snapshot: Some(snapshot.clone()),
                        profile,
                    },
                )
                .await;
            let processing_ms = started.elapsed().as_millis() as u64;

            self.transition(&job_id, |job| {
                match outcome {
                    Ok(outcome) => {
                        job.results.push(JobResult {
                            item_id,
                            r#match: outcome.r#match,
                            processing_ms,
                        });
                    }
                    Err(e) => {
                        job.errors.push(JobErrorRow {
                            item_id,
                            message: e.to_string(),
                            processing_ms,
                        });
                    }
                }
                job.processed += 1;
            });
        }
    }

    fn transition(&self, job_id: &JobId, f: impl FnOnce(&mut Job)) {
        if let Some(job) = self.registry.write().get_mut(job_id) {
            f(job);
        }
    }

    /// `getJob`.
    pub fn get_job(&self, job_id: &JobId) -> Option<JobView> {
        self.registry.read().get(job_id).map(JobView::from)
    }

    /// `listJobs`: newest-first slice, summary form only.
    pub fn list_jobs(&self, limit: usize) -> Vec<JobSummary> {
        let registry = self.registry.read();
        let mut jobs: Vec<&Job> = registry.values().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.into_iter().take(limit).map(JobSummary::from).collect()
    }

    /// Evicts terminal jobs whose `completed_at` is older than `JOB_TTL`.
    /// Called by the periodic sweep spawned via `spawn_eviction_loop`, and
    /// directly by tests.
    pub fn evict_expired(&self) {
        let now = Utc::now();
        let ttl = self.config.job_ttl;
        self.registry.write().retain(|_, job| {
            if !job.status.is_terminal() {
                return true;
            }
            match job.completed_at {
                Some(completed_at) => {
                    let age = (now - completed_at).to_std().unwrap_or(Duration::ZERO);
                    age < ttl
                }
                None => true,
            }
        });
    }

    /// Spawns the periodic eviction sweep on `task_manager`, racing its
    /// sleep against ctrl-c / cancellation the way every other long-running
    /// loop in this service does.
    pub async fn spawn_eviction_loop(self: &Arc<Self>, task_manager: &TaskManager) {
        let engine = Arc::clone(self);
        let interval = self.config.eviction_interval;
        task_manager
            .spawn_task_loop(
                move |guard| async move {
                    loop {
                        tokio::select! {
                            _ = guard.is_cancelled() => break,
                            _ = tokio::time::sleep(interval) => {
                                engine.evict_expired();
                            }
                        }
                    }
                },
                "batch-job-eviction".to_string(),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facesrec_cache::{CacheConfig, FaceCache};
    use facesrec_coordinator::{Coordinator, CoordinatorConfig, EnrollRequest};
    use facesrec_embedder::reference::ReferenceEmbedder;
    use facesrec_embedder::FaceEmbedder;
    use facesrec_index::{FaceIndex, IndexConfig};
    use facesrec_store::NewUser;
    use std::sync::atomic::AtomicU64;
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct MemoryStore {
        users: AsyncMutex<HashMap<facesrec_types::UserId, User>>,
        next_id: AtomicU64,
    }

    #[async_trait::async_trait]
    impl DescriptorStore for MemoryStore {
        async fn create(&self, user: NewUser) -> facesrec_store::Result<facesrec_types::UserId> {
            let mut users = self.users.lock().await;
            if users.values().any(|u| u.active && u.external_id == user.external_id) {
                return Err(facesrec_store::StoreError::Duplicate(user.external_id));
            }
            let id = facesrec_types::UserId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            users.insert(
                id,
                User {
                    user_id: id,
                    external_id: user.external_id,
                    display_name: user.display_name,
                    client_ref: user.client_ref,
                    descriptor: user.descriptor,
                    confidence: user.confidence,
                    active: true,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                    last_recognition_at: None,
                    recognition_count: 0,
                },
            );
            Ok(id)
        }

        async fn find_by_external_id(&self, external_id: &str) -> facesrec_store::Result<Option<User>> {
            Ok(self
                .users
                .lock()
                .await
                .values()
                .find(|u| u.active && u.external_id == external_id)
                .cloned())
        }

        async fn find_by_id(&self, user_id: facesrec_types::UserId) -> facesrec_store::Result<Option<User>> {
            Ok(self.users.lock().await.get(&user_id).cloned())
        }

        async fn list_active(&self) -> facesrec_store::Result<Vec<User>> {
            Ok(self.users.lock().await.values().filter(|u| u.active).cloned().collect())
        }

        async fn update_descriptor(
            &self,
            _user_id: facesrec_types::UserId,
            _descriptor: &facesrec_types::Descriptor,
            _confidence: f32,
        ) -> facesrec_store::Result<()> {
            unimplemented!("not exercised by batch tests")
        }

        async fn soft_delete(&self, _user_id: facesrec_types::UserId) -> facesrec_store::Result<()> {
            unimplemented!("not exercised by batch tests")
        }

        async fn count_active(&self) -> facesrec_store::Result<u64> {
            Ok(self.users.lock().await.values().filter(|u| u.active).count() as u64)
        }

        async fn append_log(&self, _event: facesrec_store::LogEvent) {}
    }

    fn solid_png(fill: [u8; 3]) -> Vec<u8> {
        use image::{ImageBuffer, Rgb};
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(256, 256, |_, _| Rgb(fill));
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    async fn test_engine() -> (Arc<BatchEngine>, Arc<dyn DescriptorStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::new(IndexConfig::default(), dir.path().join("g"), dir.path().join("m"));
        index.init();
        let store: Arc<dyn DescriptorStore> = Arc::new(MemoryStore::default());
        let cache = FaceCache::connect(CacheConfig::default()).await;
        let metrics = FaceMetrics::install();
        let embedder: Arc<dyn FaceEmbedder> = Arc::new(ReferenceEmbedder);
        let coordinator = Coordinator::new(
            index,
            Arc::clone(&store),
            cache,
            metrics.clone(),
            embedder,
            CoordinatorConfig::default(),
        );
        let engine = BatchEngine::new(Arc::new(coordinator), Arc::clone(&store), metrics, BatchConfig::default());
        (engine, store, dir)
    }

    #[tokio::test]
    async fn batch_of_three_completes_with_mixed_outcomes() {
        let (engine, store, _dir) = test_engine().await;
        let image_a = solid_png([11, 22, 33]);

        store
            .create(NewUser {
                external_id: "A".into(),
                display_name: "A".into(),
                client_ref: "test".into(),
                descriptor: match ReferenceEmbedder
                    .detect_and_embed(&image_a, facesrec_types::DetectionMode::Register)
                    .await
                    .unwrap()
                {
                    facesrec_embedder::DetectOutcome::Detected(d) => d.descriptor,
                    _ => panic!("expected a detection"),
                },
                confidence: 0.9,
            })
            .await
            .unwrap();

        let image_b = solid_png([200, 10, 10]);
        let garbage = b"not an image".to_vec();

        let summary = engine
            .create_job(
                vec![
                    BatchItem { id: Some("x".into()), image: image_a },
                    BatchItem { id: Some("y".into()), image: image_b },
                    BatchItem { id: Some("z".into()), image: garbage },
                ],
                JobOptions::default(),
            )
            .unwrap();
        assert_eq!(summary.total, 3);

        let job = wait_for_terminal(&engine, &summary.job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed, 3);
        assert_eq!(job.results.len() + job.errors.len(), 3);
        assert!(job.results.iter().any(|r| r.item_id == "x" && r.r#match.is_some()));
        assert!(job.errors.iter().any(|e| e.item_id == "z"));
    }

    #[tokio::test]
    async fn create_job_rejects_oversized_batch() {
        let (engine, _store, _dir) = test_engine().await;
        let items: Vec<BatchItem> = (0..51)
            .map(|_| BatchItem { id: None, image: solid_png([1, 1, 1]) })
            .collect();
        let err = engine.create_job(items, JobOptions::default()).unwrap_err();
        assert!(matches!(err, BatchError::InvalidBatchSize { len: 51, max: 50 }));
    }

    #[tokio::test]
    async fn create_job_rejects_empty_batch() {
        let (engine, _store, _dir) = test_engine().await;
        let err = engine.create_job(Vec::new(), JobOptions::default()).unwrap_err();
        assert!(matches!(err, BatchError::InvalidBatchSize { len: 0, max: 50 }));
    }

    #[tokio::test]
    async fn eviction_removes_old_terminal_jobs_only() {
        let (engine, _store, _dir) = test_engine().await;
        let summary = engine
            .create_job(vec![BatchItem { id: None, image: solid_png([5, 5, 5]) }], JobOptions::default())
            .unwrap();
        let _ = wait_for_terminal(&engine, &summary.job_id).await;

        {
            let mut registry = engine.registry.write();
            let job = registry.get_mut(&summary.job_id).unwrap();
            job.completed_at = Some(Utc::now() - chrono::Duration::hours(2));
        }
        engine.evict_expired();
        assert!(engine.get_job(&summary.job_id).is_none());
    }

    #[tokio::test]
    async fn list_jobs_is_newest_first() {
        let (engine, _store, _dir) = test_engine().await;
        let first = engine
            .create_job(vec![BatchItem { id: None, image: solid_png([1, 2, 3]) }], JobOptions::default())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = engine
            .create_job(vec![BatchItem { id: None, image: solid_png([4, 5, 6]) }], JobOptions::default())
            .unwrap();

        let jobs = engine.list_jobs(10);
        assert_eq!(jobs[0].job_id, second.job_id);
        assert_eq!(jobs[1].job_id, first.job_id);
        let _ = first;
    }

    async fn wait_for_terminal(engine: &Arc<BatchEngine>, job_id: &facesrec_types::JobId) -> JobView {
        for _ in 0..200 {
            if let Some(job) = engine.get_job(job_id) {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job did not reach a terminal state in time");
    }
}
