//! Delete jobs (and their blobs) older than `RETENTION_DAYS`.

use anyhow::Context;
use chrono::Utc;
use tracing::info;

use vconv_queue::PgJobStore;
use vconv_storage::StorageConfig;
use vconv_worker::{init_tracing, sweep, DEFAULT_RETENTION_DAYS};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    let days = std::env::var("RETENTION_DAYS")
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|d| *d >= 0)
        .unwrap_or(DEFAULT_RETENTION_DAYS);
    let cutoff = Utc::now() - chrono::Duration::days(days);

    let blobs = StorageConfig::from_env()?
        .build()
        .await
        .context("failed to initialize blob store")?;
    let jobs = PgJobStore::from_env()
        .await
        .context("failed to connect to job store")?;

    info!(days, cutoff = %cutoff, backend = blobs.backend(), "Running retention sweep");
    let report = sweep(&jobs, blobs.as_ref(), cutoff).await?;

    println!(
        "vconv-cleanup: deleted {} jobs, {} blobs ({} jobs skipped, {} blob failures)",
        report.jobs_deleted, report.blobs_deleted, report.jobs_skipped, report.blob_failures
    );
    Ok(())
}
