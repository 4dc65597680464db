//! Conversion worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};

use vconv_media::FfmpegRunner;
use vconv_queue::PgJobStore;
use vconv_storage::StorageConfig;
use vconv_worker::{init_tracing, metrics, JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting vconv-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        match metrics::init_metrics(port) {
            Ok(()) => info!("Prometheus metrics on :{}", port),
            Err(e) => warn!("Metrics disabled: {}", e),
        }
    }

    let runner = FfmpegRunner::new(config.ffmpeg_bin.clone());
    match runner.version().await {
        Ok(version) => info!("Using {}", version),
        Err(e) => warn!("FFmpeg unavailable, every job will fail: {}", e),
    }

    let blobs = match StorageConfig::from_env() {
        Ok(storage) => match storage.build().await {
            Ok(store) => store,
            Err(e) => {
                error!("Failed to initialize blob store: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!("Invalid storage configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Blob store backend: {}", blobs.backend());

    let jobs = match PgJobStore::from_env().await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to connect to job store: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = jobs.ensure_schema().await {
        error!("Failed to prepare job store schema: {}", e);
        std::process::exit(1);
    }

    let executor = Arc::new(JobExecutor::new(config, Arc::new(jobs), blobs));

    // Stop polling on Ctrl-C; an in-flight job finishes first
    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
