//! Process entry point: parses the startup configuration, builds and starts
//! the Pipeline Coordinator, then blocks the main thread polling a
//! process-wide shutdown flag until a signal arrives — the one piece of
//! global mutable state the design notes call for.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use tradepulse::config::Config;
use tradepulse::coordinator::Pipeline;

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::from_args(std::env::args().skip(1));
    tracing::info!(
        source = ?cfg.source,
        strategy = %cfg.strategy,
        symbol = %cfg.symbol,
        latency_mode = ?cfg.latency_mode,
        "starting tradepulse"
    );

    let addr = format!("0.0.0.0:{}", cfg.port);
    let pipeline = Pipeline::new(cfg, addr.clone());
    if let Err(e) = pipeline.start().await {
        tracing::error!(error = %e, %addr, "pipeline failed to start");
        return ExitCode::from(1);
    }
    tracing::info!(%addr, "pipeline running, awaiting shutdown signal");

    tokio::spawn(async {
        let _ = tokio::signal::ctrl_c().await;
        SHUTDOWN.store(true, Ordering::SeqCst);
    });
    #[cfg(unix)]
    tokio::spawn(async {
        let Ok(mut term) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        else {
            return;
        };
        term.recv().await;
        SHUTDOWN.store(true, Ordering::SeqCst);
    });

    while !SHUTDOWN.load(Ordering::Relaxed) {
        tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
    }

    tracing::info!("shutdown signal received, stopping pipeline");
    pipeline.stop().await;
    ExitCode::SUCCESS
}
