use axum::extract::FromRef;
use facesrec_batch::BatchEngine;
use facesrec_cache::FaceCache;
use facesrec_coordinator::Coordinator;
use facesrec_index::FaceIndex;
use facesrec_metrics::FaceMetrics;
use facesrec_store::DescriptorStore;
use std::sync::Arc;

/// Shared process state, the one thing every handler is constructed with:
/// a single `Clone`-cheap struct (every field is an `Arc` or already
/// internally shared) threaded through `Router::with_state`.
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Coordinator>,
    pub batch: Arc<BatchEngine>,
    pub index: Arc<FaceIndex>,
    pub store: Arc<dyn DescriptorStore>,
    pub cache: Arc<FaceCache>,
    pub metrics: FaceMetrics,
}

impl FromRef<ApiState> for FaceMetrics {
    fn from_ref(state: &ApiState) -> Self {
        state.metrics.clone()
    }
}
