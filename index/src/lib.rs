//! HNSW vector index over 128-D face descriptors.
//!
//! One `FaceIndex` per worker process. Mutating operations (`add_user`,
//! `update_user`, `remove_user`, `rebuild`, `load`) are serialized against
//! each other and against `search` by a single `parking_lot::RwLock` guarding
//! both the graph and its label/meta side maps together: a search must
//! never observe a half-updated label map even though the graph itself
//! would tolerate it, so one lock covers both rather than splitting the
//! graph's own internal lock from a separate metadata lock.
//!
//! `hnsw_rs`'s own dump/reload pair (`file_dump` / `HnswIo::load_hnsw`)
//! can't round-trip into an owned, `'static` graph without a
//! self-referential struct, since the loader's reader is borrowed. So the
//! graph is dumped via `file_dump` for inspection only; reloading goes
//! through the metadata file plus its carried descriptors instead, which
//! rebuilds the graph by re-inserting every live label's descriptor — the
//! same path `rebuild` already uses for a from-scratch build.

pub mod config;
pub mod error;
mod meta;

use chrono::{DateTime, Utc};
use facesrec_types::{Descriptor, IndexEntry, Label, UserId, DESCRIPTOR_DIM};
use hnsw_rs::prelude::*;
use meta::PersistedMeta;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

pub use config::IndexConfig;
pub use error::{IndexError, Result};

/// Every 100 successful adds a background persist is kicked off.
const PERSIST_EVERY: u64 = 100;

/// One hit from `FaceIndex::search`, sorted ascending by distance.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub user_id: UserId,
    pub external_id: String,
    pub display_name: String,
    pub client_ref: String,
    /// Euclidean, never squared — the graph's native squared L2 is
    /// converted at this boundary.
    pub distance: f32,
    pub similarity: i32,
}

#[derive(Clone, Copy, Debug, Default, serde::Serialize)]
pub struct IndexStats {
    pub total_vectors: u64,
    pub max_elements: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

struct IndexInner {
    graph: Hnsw<'static, f32, DistL2>,
    label_to_meta: HashMap<Label, IndexEntry>,
    /// Descriptors for every live label, kept alongside `label_to_meta` purely
    /// so `save` can persist enough to reconstruct the graph on the next
    /// `init` — `hnsw_rs`'s own dump/reload pair can't round-trip into an
    /// owned, 'static graph (see the module doc comment).
    label_to_descriptor: HashMap<Label, Descriptor>,
    user_to_label: HashMap<UserId, Label>,
    next_label: u64,
    last_rebuild_at: Option<DateTime<Utc>>,
    total_vectors: u64,
}

impl IndexInner {
    fn empty(config: &IndexConfig) -> Self {
        Self {
            graph: new_graph(config),
            label_to_meta: HashMap::new(),
            label_to_descriptor: HashMap::new(),
            user_to_label: HashMap::new(),
            next_label: 0,
            last_rebuild_at: None,
            total_vectors: 0,
        }
    }
}

fn new_graph(config: &IndexConfig) -> Hnsw<'static, f32, DistL2> {
    let max_layer = 16usize.min((config.max_elements as f64).ln().ceil() as usize).max(1);
    Hnsw::new(config.m, config.max_elements, max_layer, config.ef_construction, DistL2 {})
}

/// Wraps `hnsw_rs::Hnsw<f32, DistL2>` with label/meta side maps, logical
/// delete, and crash-safe persistence.
pub struct FaceIndex {
    inner: RwLock<Option<IndexInner>>,
    config: IndexConfig,
    index_path: PathBuf,
    meta_path: PathBuf,
    adds_since_persist: AtomicU64,
    /// A weak handle back to the enclosing `Arc`, so `spawn_background_persist`
    /// can hand a `tokio::task::spawn_blocking` closure an owned `Arc<Self>`
    /// without changing every mutating method's receiver from `&self` to
    /// `Arc<Self>`. Set once at construction via `Arc::new_cyclic`.
    self_ref: Weak<FaceIndex>,
}

impl FaceIndex {
    pub fn new(config: IndexConfig, index_path: impl Into<PathBuf>, meta_path: impl Into<PathBuf>) -> Arc<Self> {
        let index_path = index_path.into();
        let meta_path = meta_path.into();
        Arc::new_cyclic(|self_ref| Self {
            inner: RwLock::new(None),
            config,
            index_path,
            meta_path,
            adds_since_persist: AtomicU64::new(0),
            self_ref: self_ref.clone(),
        })
    }

    /// Loads persisted state from the metadata file if present; otherwise
    /// starts empty. Never fails the caller — any load error is logged and
    /// the index falls back to empty, per `init`'s "must not crash because
    /// of a corrupt index". The graph dump at `index_path` is informational
    /// only (see the module doc comment); only `meta_path` is required to
    /// reconstruct state.
    #[tracing::instrument(skip(self))]
    pub fn init(&self) {
        let dir = self.index_path.parent().unwrap_or_else(|| Path::new("."));
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!(error = %e, "could not create index directory, starting empty");
            *self.inner.write() = Some(IndexInner::empty(&self.config));
            return;
        }

        if !self.meta_path.exists() {
            *self.inner.write() = Some(IndexInner::empty(&self.config));
            return;
        }

        match self.load_from_disk() {
            Ok(loaded) => {
                tracing::info!(total_vectors = loaded.total_vectors, "loaded index from disk");
                *self.inner.write() = Some(loaded);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load persisted index, starting empty");
                *self.inner.write() = Some(IndexInner::empty(&self.config));
            }
        }
    }

    fn load_from_disk(&self) -> Result<IndexInner> {
        let raw = std::fs::read_to_string(&self.meta_path)
            .map_err(|e| IndexError::Persist(format!("metadata read failed: {e}")))?;
        let persisted: PersistedMeta = serde_json::from_str(&raw)
            .map_err(|e| IndexError::Persist(format!("metadata parse failed: {e}")))?;
        let (next_label, last_rebuild_at, label_to_meta, raw_descriptors, user_to_label) = persisted.into_state();

        let mut graph = new_graph(&self.config);
        let mut label_to_descriptor = HashMap::with_capacity(raw_descriptors.len());
        for (label, raw) in raw_descriptors {
            if raw.len() != DESCRIPTOR_DIM {
                tracing::warn!(label = label.0, "skipping persisted descriptor with wrong dimension");
                continue;
            }
            let mut arr = [0f32; DESCRIPTOR_DIM];
            arr.copy_from_slice(&raw);
            let descriptor = Descriptor(arr);
            graph.insert((descriptor.as_slice(), label.0 as usize));
            label_to_descriptor.insert(label, descriptor);
        }

        let total_vectors = label_to_meta.len() as u64;
        Ok(IndexInner {
            graph,
            label_to_meta,
            label_to_descriptor,
            user_to_label,
            next_label,
            last_rebuild_at,
            total_vectors,
        })
    }

    fn with_inner<R>(&self, f: impl FnOnce(&IndexInner) -> Result<R>) -> Result<R> {
        let guard = self.inner.read();
        let inner = guard.as_ref().ok_or(IndexError::NotInitialized)?;
        f(inner)
    }

    /// `addUser`. Delegates to `update_user` if the user already
    /// has a live label.
    #[tracing::instrument(skip(self, descriptor))]
    pub fn add_user(&self, user_id: UserId, descriptor: &Descriptor, meta: UserMeta) -> Result<()> {
        check_dim(descriptor)?;
        let already_present = self.with_inner(|inner| Ok(inner.user_to_label.contains_key(&user_id)))?;
        if already_present {
            return self.update_user(user_id, descriptor, meta);
        }

        let mut guard = self.inner.write();
        let inner = guard.as_mut().ok_or(IndexError::NotInitialized)?;
        if inner.total_vectors as usize >= self.config.max_elements {
            return Err(IndexError::CapacityExceeded(self.config.max_elements));
        }

        let label = Label(inner.next_label);
        inner.next_label += 1;
        inner.graph.insert((descriptor.as_slice(), label.0 as usize));
        inner.label_to_meta.insert(
            label,
            IndexEntry {
                label,
                user_id,
                external_id: meta.external_id,
                display_name: meta.display_name,
                client_ref: meta.client_ref,
            },
        );
        inner.user_to_label.insert(user_id, label);
        inner.label_to_descriptor.insert(label, *descriptor);
        inner.total_vectors += 1;
        drop(guard);

        let count = self.adds_since_persist.fetch_add(1, Ordering::SeqCst) + 1;
        if count % PERSIST_EVERY == 0 {
            self.spawn_background_persist();
        }
        Ok(())
    }

    /// `updateUser`. Marks the old label deleted (its meta entry
    /// removed, the point left physically present in the graph) and
    /// allocates a fresh label for the new descriptor. Old labels are never
    /// resurrected.
    #[tracing::instrument(skip(self, descriptor))]
    pub fn update_user(&self, user_id: UserId, descriptor: &Descriptor, meta: UserMeta) -> Result<()> {
        check_dim(descriptor)?;
        let mut guard = self.inner.write();
        let inner = guard.as_mut().ok_or(IndexError::NotInitialized)?;

        let Some(&old_label) = inner.user_to_label.get(&user_id) else {
            drop(guard);
            return self.add_user(user_id, descriptor, meta);
        };

        let new_label = Label(inner.next_label);
        inner.next_label += 1;
        inner.graph.insert((descriptor.as_slice(), new_label.0 as usize));
        inner.label_to_meta.remove(&old_label);
        inner.label_to_descriptor.remove(&old_label);
        inner.label_to_meta.insert(
            new_label,
            IndexEntry {
                label: new_label,
                user_id,
                external_id: meta.external_id,
                display_name: meta.display_name,
                client_ref: meta.client_ref,
            },
        );
        inner.label_to_descriptor.insert(new_label, *descriptor);
        inner.user_to_label.insert(user_id, new_label);
        // total_vectors is unchanged: the old point is still physically
        // present in the graph, just masked out of label_to_meta.
        Ok(())
    }

    /// `removeUser`. No-op if the user has no live label.
    #[tracing::instrument(skip(self))]
    pub fn remove_user(&self, user_id: UserId) -> Result<()> {
        let mut guard = self.inner.write();
        let inner = guard.as_mut().ok_or(IndexError::NotInitialized)?;
        if let Some(label) = inner.user_to_label.remove(&user_id) {
            inner.label_to_meta.remove(&label);
            inner.label_to_descriptor.remove(&label);
            inner.total_vectors = inner.total_vectors.saturating_sub(1);
        }
        Ok(())
    }

    /// `search`. `threshold_l2` is a Euclidean distance; the
    /// graph's native squared distance is compared against its square.
    #[tracing::instrument(skip(self, query))]
    pub fn search(&self, query: &Descriptor, k: usize, threshold_l2: f32) -> Result<Vec<SearchHit>> {
        check_dim(query)?;
        self.with_inner(|inner| {
            if inner.total_vectors == 0 {
                return Ok(Vec::new());
            }
            let knbn = k.min(inner.total_vectors as usize).max(1);
            let neighbours = inner.graph.search(query.as_slice(), knbn, self.config.ef_search);
            let threshold_sq = threshold_l2 * threshold_l2;

            let mut hits: Vec<(Label, f32, &IndexEntry)> = neighbours
                .into_iter()
                .filter(|n| n.distance <= threshold_sq)
                .filter_map(|n| {
                    let label = Label(n.d_id as u64);
                    inner.label_to_meta.get(&label).map(|entry| (label, n.distance, entry))
                })
                .collect();
            hits.sort_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            });

            Ok(hits
                .into_iter()
                .map(|(_, d2, entry)| {
                    let distance = d2.max(0.0).sqrt();
                    let similarity = ((1.0 - distance) * 100.0).round() as i32;
                    SearchHit {
                        user_id: entry.user_id,
                        external_id: entry.external_id.clone(),
                        display_name: entry.display_name.clone(),
                        client_ref: entry.client_ref.clone(),
                        distance,
                        similarity,
                    }
                })
                .collect())
        })
    }

    /// `rebuild`. Discards all marks and reconstructs the graph
    /// from scratch, then persists synchronously.
    #[tracing::instrument(skip(self, users))]
    pub fn rebuild(&self, users: &[RebuildUser]) -> Result<()> {
        let mut inner = IndexInner::empty(&self.config);
        for u in users {
            let descriptor = match Descriptor::from_json(&u.descriptor_json) {
                Ok(d) => d,
                Err(e) => {
                    tracing::error!(user_id = %u.user_id, error = %e, "skipping user with unparsable descriptor during rebuild");
                    continue;
                }
            };
            let label = Label(inner.next_label);
            inner.next_label += 1;
            inner.graph.insert((descriptor.as_slice(), label.0 as usize));
            inner.label_to_meta.insert(
                label,
                IndexEntry {
                    label,
                    user_id: u.user_id,
                    external_id: u.external_id.clone(),
                    display_name: u.display_name.clone(),
                    client_ref: u.client_ref.clone(),
                },
            );
            inner.label_to_descriptor.insert(label, descriptor);
            inner.user_to_label.insert(u.user_id, label);
            inner.total_vectors += 1;
        }
        inner.last_rebuild_at = Some(Utc::now());
        *self.inner.write() = Some(inner);
        self.adds_since_persist.store(0, Ordering::SeqCst);
        self.save()
    }

    /// `save`. The graph dump (`file_dump`) is best-effort and written
    /// directly into the target dir — it's never read back on load, so a
    /// torn write there is harmless. The metadata file is the one load-bearing
    /// artifact: it's written to a temp file and renamed into place
    /// (`tempfile::NamedTempFile` + `persist()`), so a crash mid-write leaves
    /// the previous metadata untouched.
    #[tracing::instrument(skip(self))]
    pub fn save(&self) -> Result<()> {
        let guard = self.inner.read();
        let inner = guard.as_ref().ok_or(IndexError::NotInitialized)?;

        let dir = self.index_path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| IndexError::Persist(e.to_string()))?;
        let basename = self
            .index_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| IndexError::Persist("index path has no file stem".into()))?
            .to_string();

        if inner.total_vectors > 0 {
            inner
                .graph
                .file_dump(dir, &basename)
                .map_err(|e| IndexError::Persist(format!("graph dump failed: {e}")))?;
        }

        let persisted = PersistedMeta::from_state(
            inner.next_label,
            inner.last_rebuild_at,
            &inner.label_to_meta,
            &inner.label_to_descriptor,
            &inner.user_to_label,
        );
        let json = serde_json::to_vec_pretty(&persisted).map_err(|e| IndexError::Persist(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| IndexError::Persist(e.to_string()))?;
        use std::io::Write;
        tmp.write_all(&json).map_err(|e| IndexError::Persist(e.to_string()))?;
        tmp.persist(&self.meta_path)
            .map_err(|e| IndexError::Persist(e.error.to_string()))?;

        tracing::debug!(total_vectors = inner.total_vectors, "persisted index");
        Ok(())
    }

    /// Fires the every-100-adds persist without blocking the caller. Inside
    /// a tokio runtime (the only context `add_user` is ever called from in
    /// this service) the write goes to a `spawn_blocking` task; outside one
    /// (a unit test with no runtime) it falls back to running inline, since
    /// there is nowhere to hand the work off to.
    fn spawn_background_persist(&self) {
        let Some(handle) = self.self_ref.upgrade() else {
            return;
        };
        if tokio::runtime::Handle::try_current().is_ok() {
            tokio::task::spawn_blocking(move || {
                if let Err(e) = handle.save() {
                    tracing::warn!(error = %e, "background index persist failed, continuing");
                }
            });
        } else if let Err(e) = handle.save() {
            tracing::warn!(error = %e, "background index persist failed, continuing");
        }
    }

    /// Live vector count, excluding marked-deleted labels.
    pub fn size(&self) -> u64 {
        self.inner.read().as_ref().map(|i| i.total_vectors).unwrap_or(0)
    }

    pub fn stats(&self) -> IndexStats {
        let total_vectors = self.size();
        IndexStats {
            total_vectors,
            max_elements: self.config.max_elements,
            m: self.config.m,
            ef_construction: self.config.ef_construction,
            ef_search: self.config.ef_search,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.read().is_some()
    }
}

fn check_dim(d: &Descriptor) -> Result<()> {
    if d.as_slice().len() != DESCRIPTOR_DIM {
        return Err(IndexError::DimensionMismatch {
            expected: DESCRIPTOR_DIM,
            actual: d.as_slice().len(),
        });
    }
    Ok(())
}

/// Label metadata for an upsert.
#[derive(Clone, Debug)]
pub struct UserMeta {
    pub external_id: String,
    pub display_name: String,
    pub client_ref: String,
}

/// One row handed to `rebuild``), shaped after
/// `facesrec_store`'s `User` row without creating a dependency cycle on the
/// store crate.
#[derive(Clone, Debug)]
pub struct RebuildUser {
    pub user_id: UserId,
    pub external_id: String,
    pub display_name: String,
    pub client_ref: String,
    pub descriptor_json: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn descriptor(seed: f32) -> Descriptor {
        let mut arr = [0f32; DESCRIPTOR_DIM];
        for (i, v) in arr.iter_mut().enumerate() {
            *v = seed + i as f32 * 0.001;
        }
        Descriptor(arr)
    }

    fn meta(id: &str) -> UserMeta {
        UserMeta {
            external_id: id.to_string(),
            display_name: id.to_string(),
            client_ref: "test".to_string(),
        }
    }

    fn test_index() -> (Arc<FaceIndex>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let idx = FaceIndex::new(
            IndexConfig {
                max_elements: 1000,
                ..Default::default()
            },
            dir.path().join("graph.hnsw"),
            dir.path().join("meta.json"),
        );
        idx.init();
        (idx, dir)
    }

    #[test]
    fn self_search_returns_zero_distance_top1() {
        let (idx, _dir) = test_index();
        idx.add_user(UserId(1), &descriptor(1.0), meta("a")).unwrap();
        idx.add_user(UserId(2), &descriptor(5.0), meta("b")).unwrap();

        let hits = idx.search(&descriptor(1.0), 1, 1000.0).unwrap();
        assert_eq!(hits[0].user_id, UserId(1));
        assert!(hits[0].distance < 1e-3);
    }

    #[test]
    fn remove_excludes_from_search() {
        let (idx, _dir) = test_index();
        idx.add_user(UserId(1), &descriptor(1.0), meta("a")).unwrap();
        idx.remove_user(UserId(1)).unwrap();

        let hits = idx.search(&descriptor(1.0), 5, 1000.0).unwrap();
        assert!(hits.iter().all(|h| h.user_id != UserId(1)));
        assert_eq!(idx.size(), 0);
    }

    #[test]
    fn update_reassigns_label_and_masks_old_point() {
        let (idx, _dir) = test_index();
        idx.add_user(UserId(1), &descriptor(1.0), meta("a")).unwrap();
        idx.update_user(UserId(1), &descriptor(9.0), meta("a")).unwrap();

        let hits = idx.search(&descriptor(9.0), 1, 1000.0).unwrap();
        assert_eq!(hits[0].user_id, UserId(1));
        assert!(hits[0].distance < 1e-3);

        // old point is still physically present but masked, total_vectors
        // must not double-count it
        assert_eq!(idx.size(), 1);

        let stale = idx.search(&descriptor(1.0), 5, 0.01).unwrap();
        assert!(stale.iter().all(|h| h.user_id != UserId(1)));
    }

    #[test]
    fn size_tracks_live_labels() {
        let (idx, _dir) = test_index();
        assert_eq!(idx.size(), 0);
        idx.add_user(UserId(1), &descriptor(1.0), meta("a")).unwrap();
        idx.add_user(UserId(2), &descriptor(2.0), meta("b")).unwrap();
        assert_eq!(idx.size(), 2);
        idx.remove_user(UserId(1)).unwrap();
        assert_eq!(idx.size(), 1);
    }

    #[test]
    fn search_before_init_is_not_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let idx = FaceIndex::new(IndexConfig::default(), dir.path().join("g"), dir.path().join("m"));
        let err = idx.search(&descriptor(1.0), 1, 1.0).unwrap_err();
        assert!(matches!(err, IndexError::NotInitialized));
    }

    #[test]
    fn rebuild_reconstructs_from_descriptor_rows() {
        let (idx, _dir) = test_index();
        idx.add_user(UserId(1), &descriptor(1.0), meta("a")).unwrap();
        idx.add_user(UserId(2), &descriptor(2.0), meta("b")).unwrap();
        idx.remove_user(UserId(2)).unwrap();

        let rows = vec![RebuildUser {
            user_id: UserId(1),
            external_id: "a".into(),
            display_name: "a".into(),
            client_ref: "test".into(),
            descriptor_json: descriptor(1.0).to_json(),
        }];
        idx.rebuild(&rows).unwrap();

        assert_eq!(idx.size(), 1);
        let hits = idx.search(&descriptor(1.0), 1, 1000.0).unwrap();
        assert_eq!(hits[0].user_id, UserId(1));
    }

    // Property-based coverage of the "add then remove never returns"
    // invariant over arbitrary descriptor sets, rather than a fixed table
    // of cases.
    mod props {
        use super::*;
        use proptest::prelude::*;

        fn arb_descriptor() -> impl Strategy<Value = Descriptor> {
            prop::collection::vec(-10.0f32..10.0f32, DESCRIPTOR_DIM)
                .prop_map(|v| Descriptor(v.try_into().unwrap()))
        }

        proptest! {
            #[test]
            fn added_then_removed_user_never_resurfaces(
                seeds in prop::collection::vec(arb_descriptor(), 2..12),
                victim in 0usize..12,
            ) {
                let (idx, _dir) = test_index();
                let victim = victim % seeds.len();
                for (i, d) in seeds.iter().enumerate() {
                    idx.add_user(UserId(i as u64 + 1), d, meta(&format!("u{i}"))).unwrap();
                }
                let victim_descriptor = seeds[victim];
                idx.remove_user(UserId(victim as u64 + 1)).unwrap();

                let hits = idx.search(&victim_descriptor, seeds.len(), 1000.0).unwrap();
                prop_assert!(hits.iter().all(|h| h.user_id != UserId(victim as u64 + 1)));
                prop_assert_eq!(idx.size(), seeds.len() as u64 - 1);
            }
        }
    }
}
