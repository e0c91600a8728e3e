use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Rolling identification stats, exposed via `GET
/// /recognition/stats`.
#[derive(Default)]
pub struct RollingStats {
    total: AtomicU64,
    success: AtomicU64,
    avg_processing_ms: Mutex<f64>,
}

#[derive(Clone, Copy, Debug, Default, serde::Serialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub success: u64,
    pub avg_processing_ms: f64,
}

impl RollingStats {
    pub fn record(&self, matched: bool, processing_ms: u64) {
        let total_before = self.total.fetch_add(1, Ordering::SeqCst);
        if matched {
            self.success.fetch_add(1, Ordering::SeqCst);
        }
        let mut avg = self.avg_processing_ms.lock();
        let n = total_before as f64 + 1.0;
        *avg += (processing_ms as f64 - *avg) / n;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total.load(Ordering::SeqCst),
            success: self.success.load(Ordering::SeqCst),
            avg_processing_ms: *self.avg_processing_ms.lock(),
        }
    }
}
