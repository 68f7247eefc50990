//! Process roles.
//!
//! Each role connects its backends (with bounded retry), serves HTTP until
//! Ctrl-C, signals background tasks through a `watch` channel, and closes
//! its backends on the way out.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use fib_api::ApiState;
use fib_api::reconcile::run_reconciler;
use fib_core::ServiceConfig;
use fib_state::context::connect_redis;
use fib_state::{Backends, MemoryBackends};
use fib_worker::Worker;
use tokio::sync::watch;
use tracing::{error, info};

/// Run the REST API against PostgreSQL and Redis.
pub async fn run_api(
    config: ServiceConfig,
    port: u16,
    health_timeout: Duration,
    reconcile_interval: Duration,
) -> anyhow::Result<()> {
    info!("fibd starting in api mode");

    let backends = Backends::connect(&config).await?;
    let state = ApiState::new(backends.clone()).with_health_timeout(health_timeout);

    let result = serve_api(state, port, reconcile_interval, shutdown_signal()).await;

    backends.close().await;
    info!("fibd api stopped");
    result
}

/// Serve the API, with the reconciler alongside when `reconcile_interval`
/// is non-zero. The reconciler stops with the server, including when the
/// server fails to start.
async fn serve_api(
    state: ApiState,
    port: u16,
    reconcile_interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let reconciler = if reconcile_interval.is_zero() {
        None
    } else {
        info!(interval_secs = reconcile_interval.as_secs(), "reconciler enabled");
        Some(tokio::spawn(run_reconciler(
            state.coordinator.clone(),
            reconcile_interval,
            shutdown.clone(),
        )))
    };

    let result = serve("api", fib_api::build_router(state), port, shutdown).await;

    if let Some(handle) = reconciler {
        if let Err(e) = &result {
            error!(error = %e, "api server failed, stopping reconciler");
            handle.abort();
        }
        let _ = handle.await;
    }
    result
}

/// Run a compute worker against Redis.
pub async fn run_worker(config: ServiceConfig, health_port: u16) -> anyhow::Result<()> {
    info!("fibd starting in worker mode");

    let redis = connect_redis(&config).await?;
    let cache = Arc::new(redis.cache());
    let channel = Arc::new(redis.channel());
    let worker = Worker::new(cache.clone(), channel.clone()).with_resubscribe_policy(config.retry);
    let shutdown = shutdown_signal();

    let health = serve(
        "worker-health",
        fib_worker::health_router(cache, channel),
        health_port,
        shutdown.clone(),
    );
    let run = async { worker.run(shutdown).await.map_err(anyhow::Error::from) };
    tokio::try_join!(run, health)?;

    info!("fibd worker stopped");
    Ok(())
}

/// Run the API and a worker in one process over in-memory backends.
pub async fn run_standalone(port: u16) -> anyhow::Result<()> {
    info!("fibd starting in standalone mode (in-memory backends)");

    let backends = MemoryBackends::new().backends();
    let worker = Worker::from_backends(&backends);
    let state = ApiState::new(backends);
    let shutdown = shutdown_signal();

    let api = serve("api", fib_api::build_router(state), port, shutdown.clone());
    let run = async { worker.run(shutdown).await.map_err(anyhow::Error::from) };
    tokio::try_join!(run, api)?;

    info!("fibd standalone stopped");
    Ok(())
}

/// Flip a watch channel to `true` on Ctrl-C.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = tx.send(true);
    });
    rx
}

/// Serve `router` on `0.0.0.0:port` until `shutdown` flips.
async fn serve(
    name: &str,
    router: Router,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, server = name, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_failure_with_reconciler_returns_error() {
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let state = ApiState::new(MemoryBackends::new().backends());
        // Never flipped: only the failing server may end the reconciler.
        let (_tx, rx) = watch::channel(false);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            serve_api(state, port, Duration::from_secs(10), rx),
        )
        .await
        .expect("serve_api hung after the bind failed");

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reconciler_stops_on_shutdown() {
        let state = ApiState::new(MemoryBackends::new().backends());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(serve_api(state, 0, Duration::from_secs(10), rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("serve_api did not stop on shutdown")
            .unwrap();
        assert!(result.is_ok());
    }
}
