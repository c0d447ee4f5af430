//! Worker startup: config seeding, install with retry, and reload.

use crate::controller::Controller;
use crate::error::ProxyResult;
use pantry_core::RetrievalConfig;
use pantry_core::config::WorkerConfig;

/// Persist the configured retrieval seed into the config slot.
///
/// The seed replaces whatever an earlier run stored. Without a seed the slot
/// is left alone, so a record written by another tool survives restarts.
pub async fn seed_retrieval_config(
    controller: &Controller,
    seed: Option<&RetrievalConfig>,
) -> ProxyResult<()> {
    let Some(seed) = seed else {
        tracing::debug!("No retrieval seed configured, keeping persisted record");
        return Ok(());
    };

    controller.cache().open().await?;
    controller.config_slot().store(seed).await?;
    tracing::info!(peer = ?seed.peer, cid = ?seed.cid, "Retrieval configuration persisted");
    Ok(())
}

/// Install, retrying up to `install_attempts` times.
pub async fn install_with_retry(controller: &Controller, worker: &WorkerConfig) -> ProxyResult<u64> {
    let attempts = worker.install_attempts.max(1);
    let mut attempt = 1;
    loop {
        match controller.install().await {
            Ok(generation) => return Ok(generation),
            Err(e) if attempt < attempts => {
                tracing::warn!(
                    attempt,
                    attempts,
                    error = %e,
                    "Install failed, retrying"
                );
                tokio::time::sleep(worker.install_retry_delay()).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Register the lifecycle handlers, install and activate the first generation.
pub async fn start_worker(controller: &Controller, worker: &WorkerConfig) -> ProxyResult<u64> {
    controller.register();
    install_with_retry(controller, worker).await?;
    controller.activate().await
}

/// Install and activate a new generation while the current one keeps serving.
pub async fn reload_worker(controller: &Controller, worker: &WorkerConfig) -> ProxyResult<u64> {
    install_with_retry(controller, worker).await?;
    controller.activate().await
}
