use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use statsbeat::{HttpStats, Snapshot, StatsConfig, StatsEngine};

mod app;

/// Demo HTTP server with periodic process and throughput stats.
#[derive(Parser, Debug)]
#[command(name = "statsbeat", version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3000, env = "STATSBEAT_PORT")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1", env = "STATSBEAT_HOST")]
    host: String,

    /// Stats options, e.g. `period=1&all` (falls back to STATS_BEAT)
    #[arg(short, long)]
    stats: Option<String>,

    /// Built-in load generator workers hitting /api/echo (0 = off)
    #[arg(long, default_value_t = 0)]
    load: u32,
}

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Latest snapshot, replaced by the engine's observer every period.
    pub latest: watch::Receiver<Option<Snapshot>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::logging::init();
    let args = Args::parse();

    // ── 1. Resolve stats options ─────────────────────────────────
    let config = StatsConfig::resolve(args.stats.as_deref()).context("invalid stats options")?;
    if config.interval().is_none() {
        info!("stats disabled; pass --stats period=1&all or set STATS_BEAT");
    }

    // ── 2. Engine + observer ─────────────────────────────────────
    let (latest_tx, latest) = watch::channel(None);
    let mut engine = StatsEngine::new(config).context("cannot read host metrics")?;
    engine.on_snapshot(move |snapshot: Snapshot| {
        info!(target: "statsbeat", "{}", snapshot.to_json());
        latest_tx.send_replace(Some(snapshot));
    });

    let stats = HttpStats::new();
    engine.start(Some(stats.handle()))?;

    // ── 3. Router ────────────────────────────────────────────────
    let state = Arc::new(AppState { latest });
    let router = app::server::create_router(state, &stats);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local = listener.local_addr()?;
    info!(%local, "listening; GET /api/stats for the latest snapshot");

    let load_running = Arc::new(AtomicBool::new(args.load > 0));
    let load_handle = (args.load > 0).then(|| {
        tokio::spawn(app::load_generator::run(
            load_running.clone(),
            local,
            args.load,
        ))
    });

    let shutdown = {
        let load_running = load_running.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            load_running.store(false, Ordering::SeqCst);
        }
    };
    axum::serve(listener, stats.make_service(router))
        .with_graceful_shutdown(shutdown)
        .await
        .context("server exited with error")?;

    // ── 5. Shutdown ──────────────────────────────────────────────
    if let Some(handle) = load_handle {
        let _ = handle.await;
    }
    engine.stop();
    info!("bye");
    Ok(())
}
