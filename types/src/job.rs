use crate::descriptor::JobId;
use crate::result::Match;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One successful identification within a batch job, tagged with the
/// caller-supplied item id so results (which land in completion order, not
/// input order — "Ordering guarantees") can be correlated back.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobResult {
    pub item_id: String,
    pub r#match: Option<Match>,
    pub processing_ms: u64,
}

/// One failed item within a batch job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobError {
    pub item_id: String,
    pub message: String,
    pub processing_ms: u64,
}

/// Per-job options. `profile` overrides the
/// coordinator's default `RecognitionProfile` for the duration of this job
/// only; `None` means "use the coordinator's configured default".
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobOptions {
    pub profile: Option<crate::profile::RecognitionProfile>,
}

/// Row of the in-memory job registry. Monotonic:
/// `processed <= total`, and on terminal status `results.len() + errors.len()
/// == processed`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub status: JobStatus,
    pub total: usize,
    pub processed: usize,
    pub results: Vec<JobResult>,
    pub errors: Vec<JobError>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub options: JobOptions,
    /// Set only when the job fails before the worker loop starts.
    pub global_error: Option<String>,
}

impl Job {
    pub fn new(job_id: JobId, total: usize, options: JobOptions) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            total,
            processed: 0,
            results: Vec::new(),
            errors: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            options,
            global_error: None,
        }
    }

    /// `round(processed / total * 100)`, clamped to `[0, 100]`.
    pub fn progress(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let pct = (self.processed as f64 / self.total as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_rounds_and_clamps() {
        let mut job = Job::new(JobId::new(), 3, JobOptions::default());
        assert_eq!(job.progress(), 0);
        job.processed = 1;
        assert_eq!(job.progress(), 33);
        job.processed = 3;
        assert_eq!(job.progress(), 100);
    }

    #[test]
    fn zero_total_job_is_fully_progressed() {
        let job = Job::new(JobId::new(), 0, JobOptions::default());
        assert_eq!(job.progress(), 100);
    }
}
