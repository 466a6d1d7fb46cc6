//! Queue worker binary.

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vforge_worker::{IntervalClock, JobExecutor, Scheduler, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vforge=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vforge-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        match vforge_worker::metrics::init_metrics(port) {
            Ok(()) => info!(port, "Prometheus metrics listener started"),
            Err(e) => error!(error = %e, "Failed to start metrics listener"),
        }
    }

    tokio::fs::create_dir_all(config.queue.storage_root.join(vforge_queue::layout::SESSIONS_DIR))
        .await?;

    let executor = JobExecutor::new(config.clone());
    executor.check_executables();

    let handle = Scheduler::start(IntervalClock::new(config.tick_interval), executor);

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, waiting for the current job to finish");

    if handle.stop().await.is_none() {
        error!("Worker loop ended abnormally");
    }

    info!("Worker shutdown complete");
    Ok(())
}
