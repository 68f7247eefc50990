//! fibd — the Fibonacci service daemon.
//!
//! One binary, three roles:
//! - `api`: submission coordinator + query surface over HTTP
//! - `worker`: compute worker + its health endpoint
//! - `standalone`: both, over in-memory backends (local development)
//!
//! # Usage
//!
//! ```text
//! fibd api --port 8000
//! fibd worker --health-port 5001
//! fibd standalone
//! ```

mod modes;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fib_core::ServiceConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fibd", about = "Fibonacci service daemon")]
struct Cli {
    /// TOML config file; environment variables take precedence over it.
    #[arg(long, global = true, env = "FIB_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the REST API (PostgreSQL + Redis).
    Api {
        /// Port to listen on.
        #[arg(long, env = "PORT", default_value = "8000")]
        port: u16,

        /// Per-dependency health probe timeout in milliseconds.
        #[arg(long, default_value = "2000")]
        health_timeout_ms: u64,

        /// Re-notify uncomputed indices every N seconds (0 disables).
        #[arg(long, env = "FIB_RECONCILE_INTERVAL", default_value = "0")]
        reconcile_interval: u64,
    },

    /// Run a compute worker (Redis).
    Worker {
        /// Port for the worker health endpoint.
        #[arg(long, env = "WORKER_HEALTH_PORT", default_value = "5001")]
        health_port: u16,
    },

    /// API and worker in one process over in-memory backends.
    Standalone {
        /// Port to listen on.
        #[arg(long, env = "PORT", default_value = "8000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Api {
            port,
            health_timeout_ms,
            reconcile_interval,
        } => {
            let config = ServiceConfig::load(cli.config.as_deref())?;
            modes::run_api(
                config,
                port,
                Duration::from_millis(health_timeout_ms),
                Duration::from_secs(reconcile_interval),
            )
            .await
        }
        Command::Worker { health_port } => {
            let config = ServiceConfig::load(cli.config.as_deref())?;
            modes::run_worker(config, health_port).await
        }
        Command::Standalone { port } => modes::run_standalone(port).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fibd=debug,fib=debug"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
