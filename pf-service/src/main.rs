//! Process entrypoint: parse configuration, connect every collaborator,
//! spawn the worker pool and cleanup sweepers, then run until `ctrl_c`
//! signals a graceful shutdown.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use pf_service::{config::Config, logging, Core};
use pf_worker::{WorkerConfig, WorkerPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = Config::parse();
    info!(target: "pf::service", "starting up");

    let core = Arc::new(Core::connect(&config).await?);

    let worker_config = WorkerConfig {
        pool_size: config.worker_pool_size,
        per_job_deadline: config.job_deadline(),
        dequeue_timeout: config.dequeue_timeout(),
        error_backoff: config.error_backoff(),
    };
    let pool = Arc::new(WorkerPool::new(core.queue.clone(), core.executor.clone(), worker_config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = pool.clone().spawn(shutdown_rx.clone());
    handles.extend(pf_cleanup::spawn(
        core.session_sweeper.clone(),
        core.job_sweeper.clone(),
        config.cleanup_interval(),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    info!(target: "pf::service", "shutdown signal received, draining in-flight work");
    shutdown_tx.send(true).ok();

    for handle in handles {
        let _ = handle.await;
    }

    info!(target: "pf::service", "shutdown complete");
    Ok(())
}
