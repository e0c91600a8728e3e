use chrono::{DateTime, Utc};
use facesrec_types::{Job, JobError, JobId, JobResult, JobStatus};
use serde::Serialize;

/// `listJobs` summary form: no `results`/`errors`, just enough to render a
/// job list.
#[derive(Clone, Debug, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobStatus,
    pub total: usize,
    pub processed: usize,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            total: job.total,
            processed: job.processed,
            progress: job.progress(),
            created_at: job.created_at,
        }
    }
}

/// `getJob` full-detail form: `{ id, status, total, processed,
/// progress, results, errors, createdAt, startedAt, completedAt,
/// processingMs }`. `processing_ms` is the wall-clock span from
/// `started_at` to `completed_at` (or to now, for jobs still in flight),
/// distinct from each individual result/error's own `processing_ms`.
#[derive(Clone, Debug, Serialize)]
pub struct JobView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub total: usize,
    pub processed: usize,
    pub progress: u8,
    pub results: Vec<JobResult>,
    pub errors: Vec<JobError>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_ms: Option<u64>,
    pub global_error: Option<String>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        let processing_ms = job.started_at.map(|started| {
            let end = job.completed_at.unwrap_or_else(Utc::now);
            (end - started).num_milliseconds().max(0) as u64
        });
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            total: job.total,
            processed: job.processed,
            progress: job.progress(),
            results: job.results.clone(),
            errors: job.errors.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            processing_ms,
            global_error: job.global_error.clone(),
        }
    }
}
