use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hivegate::config::GateConfig;
use hivegate::interop::schedule_action;
use hivegate::ratelimit::{RateLimiter, RateLimiterFactory, RateLimiterOptions, TimeUnit};

/// Drive a burst of actions through a rate limiter and log how they are admitted.
#[derive(Debug, Parser)]
#[command(name = "hivegate", version, about)]
struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Resource id to limit
    #[arg(short, long, default_value = "demo")]
    resource: String,

    /// Number of actions to run
    #[arg(short = 'n', long, default_value_t = 20)]
    actions: u64,

    /// Tokens requested by each action
    #[arg(short, long, default_value_t = 1)]
    tokens: u64,

    /// Simulated duration of each action in milliseconds
    #[arg(long, default_value_t = 50)]
    work_ms: u64,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting Hivegate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => GateConfig::from_file(path)?,
        None => GateConfig::default(),
    };
    let options = config
        .options_for(&args.resource)
        .cloned()
        .unwrap_or_else(|| RateLimiterOptions::new(5, TimeUnit::Second));
    info!(
        resource = %args.resource,
        tokens_per_timespan = options.tokens_per_timespan,
        timespan = %options.timespan,
        "Configuration loaded"
    );

    let factory = config.build_factory();
    let limiter = factory.create(&args.resource, options)?;

    tokio::select! {
        result = run_burst(limiter, &args) => result?,
        _ = shutdown_signal() => warn!("Burst interrupted"),
    }

    info!("Hivegate stopped");
    Ok(())
}

/// Run every action concurrently and wait for all of them.
async fn run_burst(limiter: Arc<dyn RateLimiter>, args: &Args) -> anyhow::Result<()> {
    let work = Duration::from_millis(args.work_ms);
    let started = tokio::time::Instant::now();

    let runs = (1..=args.actions).map(|n| {
        let limiter = limiter.clone();
        let tokens = args.tokens;
        async move {
            let gate = limiter.as_ref();
            schedule_action(gate, tokens, move || async move {
                let tokens_left = gate.tokens_left().await;
                info!(
                    action = n,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    tokens_left = tokens_left,
                    "Action admitted"
                );
                tokio::time::sleep(work).await;
                Ok::<_, anyhow::Error>(())
            })
            .await
        }
    });

    futures::future::try_join_all(runs).await?;

    info!(
        actions = args.actions,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Burst complete"
    );
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
