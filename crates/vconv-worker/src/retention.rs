//! Retention sweep: drop old jobs together with their blobs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use vconv_models::JobStatus;
use vconv_queue::JobStore;
use vconv_storage::BlobStore;

use crate::error::WorkerResult;

/// Default age after which jobs are swept.
pub const DEFAULT_RETENTION_DAYS: i64 = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub jobs_deleted: usize,
    /// Old jobs left for a later sweep: still processing, or a blob failed
    pub jobs_skipped: usize,
    pub blobs_deleted: usize,
    pub blob_failures: usize,
}

/// Delete jobs created before `cutoff` together with their input and output
/// blobs.
///
/// Blobs go first and the record only after all of them are gone, so a
/// failed blob delete keeps the job around to be retried by the next sweep.
/// Jobs still processing are left alone.
pub async fn sweep(
    jobs: &dyn JobStore,
    blobs: &dyn BlobStore,
    cutoff: DateTime<Utc>,
) -> WorkerResult<SweepReport> {
    let mut report = SweepReport::default();

    for job in jobs.list_created_before(cutoff).await? {
        if job.status == JobStatus::Processing {
            debug!(job_id = %job.id, "Skipping job still processing");
            report.jobs_skipped += 1;
            continue;
        }

        let mut clean = true;
        let keys = [job.input_key.as_str(), job.output_key.as_str()];
        for key in keys.into_iter().filter(|k| !k.is_empty()) {
            match blobs.delete(key).await {
                Ok(()) => {
                    debug!(job_id = %job.id, key = %key, "Deleted blob");
                    report.blobs_deleted += 1;
                }
                Err(e) => {
                    warn!(job_id = %job.id, key = %key, "Failed to delete blob: {}", e);
                    report.blob_failures += 1;
                    clean = false;
                }
            }
        }

        if clean && jobs.delete(&job.id).await? {
            report.jobs_deleted += 1;
        } else {
            report.jobs_skipped += 1;
        }
    }

    info!(
        cutoff = %cutoff,
        jobs = report.jobs_deleted,
        skipped = report.jobs_skipped,
        blobs = report.blobs_deleted,
        failures = report.blob_failures,
        "Retention sweep finished"
    );
    Ok(report)
}
