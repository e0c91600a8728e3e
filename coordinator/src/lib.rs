//! Recognition coordinator: orchestrates cache lookup, embedder
//! detect+embed, ANN search with thresholding, linear-search fallback, and
//! metrics emission. Constructed explicitly
//! (`Coordinator::new(index, store, cache, metrics, embedder, config)`)
//! and handed to the listener loop, never a singleton or lazy-static.

pub mod config;
pub mod error;
pub mod stats;

pub use config::CoordinatorConfig;
pub use error::{CoordinatorError, Result};
pub use stats::StatsSnapshot;

use chrono::Utc;
use facesrec_cache::{cache_key, FaceCache};
use facesrec_embedder::{DetectOutcome, FaceEmbedder};
use facesrec_index::{FaceIndex, UserMeta};
use facesrec_metrics::FaceMetrics;
use facesrec_store::{DescriptorStore, LogEvent, NewUser};
use facesrec_types::{
    Backend, Descriptor, DetectionMode, FaceBox, IdentifyOutcome, Match, RecognitionProfile, User, UserId,
};
use parking_lot::RwLock;
use stats::RollingStats;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// `enroll` request fields (image is passed separately).
#[derive(Clone, Debug)]
pub struct EnrollRequest {
    pub external_id: String,
    pub display_name: String,
    pub client_ref: String,
}

/// `enroll` return shape.
#[derive(Clone, Debug)]
pub struct EnrollOutcome {
    pub user_id: UserId,
    pub descriptor: Descriptor,
    pub confidence: f32,
    pub face_box: FaceBox,
    pub processing_ms: u64,
}

/// step 4's "caller supplied an explicit user list" linear
/// fallback, plus a per-call profile override.
#[derive(Clone, Debug, Default)]
pub struct IdentifyOptions {
    pub active_users_snapshot: Option<Vec<User>>,
    pub profile: Option<RecognitionProfile>,
}

/// `syncIndex` op selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOp {
    Add,
    Update,
    Remove,
}

pub struct Coordinator {
    index: Arc<FaceIndex>,
    store: Arc<dyn DescriptorStore>,
    cache: Arc<FaceCache>,
    metrics: FaceMetrics,
    embedder: Arc<dyn FaceEmbedder>,
    config: CoordinatorConfig,
    profile: RwLock<RecognitionProfile>,
    stats: RollingStats,
}

impl Coordinator {
    pub fn new(
        index: Arc<FaceIndex>,
        store: Arc<dyn DescriptorStore>,
        cache: Arc<FaceCache>,
        metrics: FaceMetrics,
        embedder: Arc<dyn FaceEmbedder>,
        config: CoordinatorConfig,
    ) -> Self {
        let profile = RwLock::new(config.default_profile);
        Self {
            index,
            store,
            cache,
            metrics,
            embedder,
            config,
            profile,
            stats: RollingStats::default(),
        }
    }

    /// Runs the embedder under `config.embed_timeout`: spec §5/§7's
    /// per-embedding-operation timeout, surfaced as `CoordinatorError::Timeout`
    /// on a hung or slow detector rather than blocking the caller forever.
    async fn detect_and_embed(&self, image: &[u8], mode: DetectionMode) -> Result<DetectOutcome> {
        match tokio::time::timeout(self.config.embed_timeout, self.embedder.detect_and_embed(image, mode)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CoordinatorError::Timeout),
        }
    }

    /// Hot-swaps the active recognition profile.
    pub fn set_profile(&self, profile: RecognitionProfile) {
        *self.profile.write() = profile;
    }

    pub fn profile(&self) -> RecognitionProfile {
        *self.profile.read()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// `enroll`.
    #[tracing::instrument(skip(self, image))]
    pub async fn enroll(&self, image: &[u8], request: EnrollRequest) -> Result<EnrollOutcome> {
        let started = Instant::now();
        let result = self.enroll_inner(image, request).await;
        let status = if result.is_ok() { "success" } else { "error" };
        self.metrics.record_registration(status, started.elapsed());
        result
    }

    async fn enroll_inner(&self, image: &[u8], request: EnrollRequest) -> Result<EnrollOutcome> {
        let started = Instant::now();
        let outcome = self.detect_and_embed(image, DetectionMode::Register).await?;
        let detection = match outcome {
            DetectOutcome::Detected(d) => d,
            DetectOutcome::NoFace => return Err(CoordinatorError::NoFace),
        };

        if detection.face_box.w < self.config.min_face_size || detection.face_box.h < self.config.min_face_size {
            return Err(CoordinatorError::FaceTooSmall);
        }
        if detection.face_box.w > self.config.max_face_size || detection.face_box.h > self.config.max_face_size {
            return Err(CoordinatorError::FaceTooLarge);
        }
        if detection.detection_score < self.config.detection_confidence {
            return Err(CoordinatorError::LowQuality);
        }

        let landmark_factor = if detection.has_landmarks { 0.9 } else { 0.7 };
        let confidence = ((detection.detection_score * landmark_factor * 100.0).round()) / 100.0;

        let user_id = self
            .store
            .create(NewUser {
                external_id: request.external_id.clone(),
                display_name: request.display_name.clone(),
                client_ref: request.client_ref.clone(),
                descriptor: detection.descriptor,
                confidence,
            })
            .await?;

        if let Err(e) = self.index.add_user(
            user_id,
            &detection.descriptor,
            UserMeta {
                external_id: request.external_id.clone(),
                display_name: request.display_name.clone(),
                client_ref: request.client_ref.clone(),
            },
        ) {
            // Index mutation failures during enroll are swallowed: the
            // descriptor store remains authoritative and `rebuild` recovers

            tracing::error!(error = %e, user_id = %user_id, "index upsert failed during enroll, continuing");
        }

        self.store
            .append_log(LogEvent {
                user_id: Some(user_id),
                event: "enroll".to_string(),
                detail: None,
            })
            .await;

        self.metrics.set_active_users(self.store.count_active().await.unwrap_or_default());

        Ok(EnrollOutcome {
            user_id,
            descriptor: detection.descriptor,
            confidence,
            face_box: detection.face_box,
            processing_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// `identify`.
    #[tracing::instrument(skip(self, image))]
    pub async fn identify(&self, image: &[u8], options: IdentifyOptions) -> Result<IdentifyOutcome> {
        let started = Instant::now();
        let key = cache_key(image);

        if self.config.cache_enabled {
            if let Some(cached) = self.cache.get(&key).await {
                if let Ok(outcome) = serde_json::from_slice::<IdentifyOutcome>(&cached) {
                    self.metrics.inc_cache_hit();
                    let status = if outcome.r#match.is_some() { "matched" } else { "not_found" };
                    self.metrics.record_recognition(status, "cache", started.elapsed());
                    return Ok(outcome);
                }
            }
            self.metrics.inc_cache_miss();
        }

        let outcome = self.detect_and_embed(image, DetectionMode::Recognize).await?;
        let detection = match outcome {
            DetectOutcome::Detected(d) => d,
            DetectOutcome::NoFace => {
                self.metrics.record_recognition("no_face", "recognize", started.elapsed());
                return Err(CoordinatorError::NoFace);
            }
        };

        let threshold = match options.profile {
            Some(profile) => profile.confidence_threshold(),
            None => self.config.effective_threshold(self.profile()),
        };
        let (found, backend) = self.search_match(&detection.descriptor, threshold, &options).await?;

        let processing_ms = started.elapsed().as_millis() as u64;
        let result = IdentifyOutcome {
            r#match: found.clone(),
            processing_ms,
            backend,
        };

        if found.is_some() && self.config.cache_enabled {
            if let Ok(bytes) = serde_json::to_vec(&result) {
                self.cache.set(&key, bytes, Some(Duration::from_secs(1800))).await;
            }
        }

        self.stats.record(found.is_some(), processing_ms);
        let status = if found.is_some() { "matched" } else { "not_found" };
        self.metrics.record_recognition(status, "recognize", started.elapsed());

        Ok(result)
    }

    /// steps 3-4: ANN search when the index has vectors,
    /// otherwise the linear-fallback path over a caller-supplied snapshot.
    async fn search_match(
        &self,
        descriptor: &Descriptor,
        threshold: f32,
        options: &IdentifyOptions,
    ) -> Result<(Option<Match>, Backend)> {
        if self.index.is_initialized() && self.index.size() > 0 {
            let hnsw_started = Instant::now();
            let hits = self.index.search(descriptor, 5, threshold)?;
            self.metrics.record_hnsw_search(hnsw_started.elapsed());

            // The search already filters by threshold; the coordinator
            // re-checks as defense in depth.
            let top = hits.into_iter().find(|h| h.distance <= threshold);
            let found = top.map(|h| Match {
                user_id: h.user_id,
                external_id: h.external_id,
                display_name: h.display_name,
                client_ref: h.client_ref,
                distance: h.distance,
                similarity: h.similarity,
            });
            return Ok((found, Backend::Ann));
        }

        let Some(snapshot) = &options.active_users_snapshot else {
            return Ok((None, Backend::LinearFallback));
        };

        let descriptor = *descriptor;
        let candidates = futures::future::join_all(snapshot.iter().cloned().map(|user| {
            let descriptor = descriptor;
            tokio::task::spawn_blocking(move || {
                let distance = descriptor.distance(&user.descriptor);
                (user, distance)
            })
        }))
        .await;

        let best = candidates
            .into_iter()
            .filter_map(|r| r.ok())
            .filter(|(_, distance)| *distance < threshold)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let found = best.map(|(user, distance)| Match {
            user_id: user.user_id,
            external_id: user.external_id,
            display_name: user.display_name,
            client_ref: user.client_ref,
            distance,
            similarity: ((1.0 - distance) * 100.0).round() as i32,
        });

        Ok((found, Backend::LinearFallback))
    }

    /// `update`: like enroll but requires an existing user.
    #[tracing::instrument(skip(self, image))]
    pub async fn update(&self, image: &[u8], external_id: &str) -> Result<EnrollOutcome> {
        let started = Instant::now();
        let result = self.update_inner(image, external_id).await;
        let status = if result.is_ok() { "success" } else { "error" };
        self.metrics.record_registration(status, started.elapsed());
        result
    }

    async fn update_inner(&self, image: &[u8], external_id: &str) -> Result<EnrollOutcome> {
        let started = Instant::now();
        let existing = self
            .store
            .find_by_external_id(external_id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(external_id.to_string()))?;

        let outcome = self.detect_and_embed(image, DetectionMode::Register).await?;
        let detection = match outcome {
            DetectOutcome::Detected(d) => d,
            DetectOutcome::NoFace => return Err(CoordinatorError::NoFace),
        };

        if detection.face_box.w < self.config.min_face_size || detection.face_box.h < self.config.min_face_size {
            return Err(CoordinatorError::FaceTooSmall);
        }
        if detection.face_box.w > self.config.max_face_size || detection.face_box.h > self.config.max_face_size {
            return Err(CoordinatorError::FaceTooLarge);
        }
        if detection.detection_score < self.config.detection_confidence {
            return Err(CoordinatorError::LowQuality);
        }

        let landmark_factor = if detection.has_landmarks { 0.9 } else { 0.7 };
        let confidence = ((detection.detection_score * landmark_factor * 100.0).round()) / 100.0;

        self.store
            .update_descriptor(existing.user_id, &detection.descriptor, confidence)
            .await?;

        if let Err(e) = self.index.update_user(
            existing.user_id,
            &detection.descriptor,
            UserMeta {
                external_id: existing.external_id.clone(),
                display_name: existing.display_name.clone(),
                client_ref: existing.client_ref.clone(),
            },
        ) {
            tracing::error!(error = %e, user_id = %existing.user_id, "index update failed, continuing");
        }

        self.store
            .append_log(LogEvent {
                user_id: Some(existing.user_id),
                event: "update".to_string(),
                detail: None,
            })
            .await;

        Ok(EnrollOutcome {
            user_id: existing.user_id,
            descriptor: detection.descriptor,
            confidence,
            face_box: detection.face_box,
            processing_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// `syncIndex`: idempotent façade for non-recognition code
    /// paths; failures are logged and swallowed.
    #[tracing::instrument(skip(self, descriptor))]
    pub fn sync_index(&self, user_id: UserId, descriptor: &Descriptor, meta: UserMeta, op: SyncOp) {
        let result = match op {
            SyncOp::Add => self.index.add_user(user_id, descriptor, meta),
            SyncOp::Update => self.index.update_user(user_id, descriptor, meta),
            SyncOp::Remove => self.index.remove_user(user_id),
        };
        if let Err(e) = result {
            tracing::error!(error = %e, user_id = %user_id, op = ?op, "syncIndex failed, continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facesrec_embedder::reference::ReferenceEmbedder;
    use facesrec_index::IndexConfig;
    use facesrec_store::{DescriptorStore, NewUser};
    use std::collections::HashMap;
    use tokio::sync::Mutex as AsyncMutex;

    /// An in-memory `DescriptorStore` so the linear-fallback path can be
    /// exercised in tests without a live store.
    #[derive(Default)]
    struct MemoryStore {
        users: AsyncMutex<HashMap<UserId, User>>,
        next_id: std::sync::atomic::AtomicU64,
    }

    #[async_trait::async_trait]
    impl DescriptorStore for MemoryStore {
        async fn create(&self, user: NewUser) -> facesrec_store::Result<UserId> {
            let mut users = self.users.lock().await;
            if users.values().any(|u| u.active && u.external_id == user.external_id) {
                return Err(facesrec_store::StoreError::Duplicate(user.external_id));
            }
            let id = UserId(self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1);
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

        async fn find_by_id(&self, user_id: UserId) -> facesrec_store::Result<Option<User>> {
            Ok(self.users.lock().await.get(&user_id).cloned())
        }

        async fn list_active(&self) -> facesrec_store::Result<Vec<User>> {
            Ok(self.users.lock().await.values().filter(|u| u.active).cloned().collect())
        }

        async fn update_descriptor(&self, user_id: UserId, descriptor: &Descriptor, confidence: f32) -> facesrec_store::Result<()> {
            let mut users = self.users.lock().await;
            let user = users
                .get_mut(&user_id)
                .ok_or_else(|| facesrec_store::StoreError::NotFound(user_id.to_string()))?;
            user.descriptor = *descriptor;
            user.confidence = confidence;
            user.updated_at = Utc::now();
            Ok(())
        }

        async fn soft_delete(&self, user_id: UserId) -> facesrec_store::Result<()> {
            let mut users = self.users.lock().await;
            let user = users
                .get_mut(&user_id)
                .ok_or_else(|| facesrec_store::StoreError::NotFound(user_id.to_string()))?;
            user.active = false;
            Ok(())
        }

        async fn count_active(&self) -> facesrec_store::Result<u64> {
            Ok(self.users.lock().await.values().filter(|u| u.active).count() as u64)
        }

        async fn append_log(&self, _event: LogEvent) {}
    }

    fn solid_png(fill: [u8; 3]) -> Vec<u8> {
        use image::{ImageBuffer, Rgb};
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(256, 256, |_, _| Rgb(fill));
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    async fn test_coordinator() -> (Coordinator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::new(IndexConfig::default(), dir.path().join("g"), dir.path().join("m"));
        index.init();
        let store: Arc<dyn DescriptorStore> = Arc::new(MemoryStore::default());
        let cache = FaceCache::connect(facesrec_cache::CacheConfig::default()).await;
        let metrics = FaceMetrics::install();
        let embedder: Arc<dyn FaceEmbedder> = Arc::new(ReferenceEmbedder);
        let coordinator = Coordinator::new(index, store, cache, metrics, embedder, CoordinatorConfig::default());
        (coordinator, dir)
    }

    #[tokio::test]
    async fn enroll_then_identify_self() {
        let (coordinator, _dir) = test_coordinator().await;
        let image = solid_png([12, 34, 56]);

        coordinator
            .enroll(
                &image,
                EnrollRequest {
                    external_id: "A1".into(),
                    display_name: "Ada".into(),
                    client_ref: "test".into(),
                },
            )
            .await
            .unwrap();

        let result = coordinator.identify(&image, IdentifyOptions::default()).await.unwrap();
        let m = result.r#match.expect("expected a match");
        assert_eq!(m.external_id, "A1");
        assert!(m.distance < 0.1);
        assert!(m.similarity >= 90);
    }

    #[tokio::test]
    async fn identify_against_empty_index_is_no_match() {
        let (coordinator, _dir) = test_coordinator().await;
        let image = solid_png([77, 88, 99]);
        let result = coordinator.identify(&image, IdentifyOptions::default()).await.unwrap();
        assert!(result.r#match.is_none());
    }

    #[tokio::test]
    async fn duplicate_enroll_is_rejected() {
        let (coordinator, _dir) = test_coordinator().await;
        let image = solid_png([1, 2, 3]);
        let req = EnrollRequest {
            external_id: "A1".into(),
            display_name: "Ada".into(),
            client_ref: "test".into(),
        };
        coordinator.enroll(&image, req.clone()).await.unwrap();
        let err = coordinator.enroll(&image, req).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Duplicate(_)));
    }

    #[tokio::test]
    async fn update_changes_identity() {
        let (coordinator, _dir) = test_coordinator().await;
        let image_1 = solid_png([200, 10, 10]);
        let image_2 = solid_png([10, 10, 200]);

        coordinator
            .enroll(
                &image_1,
                EnrollRequest {
                    external_id: "A1".into(),
                    display_name: "Ada".into(),
                    client_ref: "test".into(),
                },
            )
            .await
            .unwrap();

        coordinator.update(&image_2, "A1").await.unwrap();

        let result_2 = coordinator.identify(&image_2, IdentifyOptions::default()).await.unwrap();
        assert_eq!(result_2.r#match.unwrap().external_id, "A1");
    }

    #[tokio::test]
    async fn no_face_on_blank_image_is_rejected() {
        let (coordinator, _dir) = test_coordinator().await;
        let blank = solid_png([0, 0, 0]);
        let err = coordinator
            .identify(&blank, IdentifyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::NoFace));
    }

    #[tokio::test]
    async fn repeated_identify_hits_cache() {
        let (coordinator, _dir) = test_coordinator().await;
        let image = solid_png([5, 6, 7]);
        coordinator
            .enroll(
                &image,
                EnrollRequest {
                    external_id: "A1".into(),
                    display_name: "Ada".into(),
                    client_ref: "test".into(),
                },
            )
            .await
            .unwrap();

        let first = coordinator.identify(&image, IdentifyOptions::default()).await.unwrap();
        let second = coordinator.identify(&image, IdentifyOptions::default()).await.unwrap();
        assert_eq!(first.r#match, second.r#match);
    }

    #[tokio::test]
    async fn linear_fallback_used_when_index_empty() {
        let (coordinator, _dir) = test_coordinator().await;
        let image = solid_png([9, 9, 200]);
        let outcome = coordinator.embedder.detect_and_embed(&image, DetectionMode::Recognize).await.unwrap();
        let DetectOutcome::Detected(detection) = outcome else {
            panic!("expected a detection");
        };

        let snapshot_user = User {
            user_id: UserId(42),
            external_id: "snap".into(),
            display_name: "Snap".into(),
            client_ref: "test".into(),
            descriptor: detection.descriptor,
            confidence: 0.9,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_recognition_at: None,
            recognition_count: 0,
        };

        let result = coordinator
            .identify(
                &image,
                IdentifyOptions {
                    active_users_snapshot: Some(vec![snapshot_user]),
                    profile: None,
                },
            )
            .await
            .unwrap();

        let m = result.r#match.expect("expected linear-fallback match");
        assert_eq!(m.external_id, "snap");
    }

    /// A `FaceEmbedder` that never returns, standing in for a hung detector.
    struct HangingEmbedder;

    #[async_trait::async_trait]
    impl FaceEmbedder for HangingEmbedder {
        async fn warmup(&self) -> facesrec_embedder::Result<()> {
            Ok(())
        }

        async fn detect_and_embed(&self, _image: &[u8], _mode: DetectionMode) -> facesrec_embedder::Result<DetectOutcome> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn hung_embedder_surfaces_as_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::new(IndexConfig::default(), dir.path().join("g"), dir.path().join("m"));
        index.init();
        let store: Arc<dyn DescriptorStore> = Arc::new(MemoryStore::default());
        let cache = FaceCache::connect(facesrec_cache::CacheConfig::default()).await;
        let metrics = FaceMetrics::install();
        let embedder: Arc<dyn FaceEmbedder> = Arc::new(HangingEmbedder);
        let coordinator = Coordinator::new(
            index,
            store,
            cache,
            metrics,
            embedder,
            CoordinatorConfig {
                embed_timeout: Duration::from_millis(20),
                ..CoordinatorConfig::default()
            },
        );

        let image = solid_png([3, 4, 5]);
        let err = coordinator.identify(&image, IdentifyOptions::default()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Timeout));
    }
}
