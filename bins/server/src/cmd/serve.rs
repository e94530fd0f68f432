use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use queue_engine::MicroQueue;
use storage_memory::{MemoryBlobStore, MemoryKvStore};

use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("microqueue-server starting");

    // --- Load config ---
    let config = ServerConfig::load(&args.config)?;
    tracing::info!(config = %args.config, api_port = config.api_port, "loaded config");

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- Engine over in-memory stores ---
    let queue = Arc::new(MicroQueue::new(
        Arc::new(MemoryKvStore::new()),
        Arc::new(MemoryBlobStore::new()),
        config.engine.clone(),
    )?);
    tracing::info!(storage = "memory", "engine ready");

    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    // --- Retention reaper ---
    if config.engine.reaper.enabled {
        handles.push(queue.spawn_reaper(token.clone()));
    } else {
        tracing::info!("retention reaper disabled");
    }

    // --- API server ---
    let api_queue = queue.clone();
    let api_port = config.api_port;
    let api_token = token.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = queue_api_server::run(api_port, api_queue, api_token.clone()).await {
            tracing::error!(error = %e, "api server error");
            // Without the API there is nothing left to serve.
            api_token.cancel();
        }
    }));

    tracing::info!("server ready");

    // --- Wait for Ctrl+C or a fatal task error ---
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutting down...");
        }
        _ = token.cancelled() => {
            tracing::warn!("a server task stopped, shutting down");
        }
    }

    // Signal all tasks to stop cooperatively
    token.cancel();

    // Drain with a bounded grace period, then abort stragglers
    let grace = config.shutdown_grace();
    let drained = tokio::time::timeout(grace, async {
        for h in handles.iter_mut() {
            let _ = h.await;
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!(grace_secs = grace.as_secs(), "tasks did not stop in time, aborting");
        for h in &handles {
            h.abort();
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}
