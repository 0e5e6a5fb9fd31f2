// Framework bootstrap for the action server runtime.

use crate::domain::SystemClock;
use crate::frameworks::config;
use crate::interface_adapters::actions::action_handlers;
use crate::interface_adapters::net::{stats_handler, ws_handler};
use crate::interface_adapters::session::ClientHandle;
use crate::interface_adapters::state::AppState;
use crate::use_cases::{
    ActionQueue, GameEvent, QueueStats, TickSettings, TickWorker, TileBook, tick_task,
};

use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};
use tokio::sync::{Notify, mpsc, watch};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;

    let shutdown = Arc::new(Notify::new());
    let state = spawn_tick_worker(shutdown.clone());

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/stats", get(stats_handler))
        .with_state(state);

    tracing::info!(%address, "listening");

    let served = axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    });
    // notify_one stores a permit, so the worker stops even if it is mid-tick.
    shutdown.notify_one();
    served
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

// The tick worker is the only owner of the action queue; sockets reach it through input_tx.
fn spawn_tick_worker(shutdown: Arc<Notify>) -> Arc<AppState> {
    let (input_tx, input_rx) =
        mpsc::channel::<GameEvent<ClientHandle>>(config::INPUT_CHANNEL_CAPACITY);
    let (stats_tx, _stats_rx) = watch::channel(QueueStats::default());

    let tiles = TileBook::default();
    let queue_config = config::queue_config();
    let settings = TickSettings {
        tick_interval: config::tick_interval(),
        movement_limits: config::movement_limits(),
        ..TickSettings::default()
    };
    tracing::debug!(
        tick_interval_ms = settings.tick_interval.as_millis() as u64,
        max_interaction_queue = queue_config.max_interaction_queue,
        max_action_age_ms = queue_config.max_action_age.as_millis() as u64,
        max_tile_distance = settings.movement_limits.max_tile_distance,
        world_bound = settings.movement_limits.world_max,
        "action queue configured"
    );

    let mut queue = ActionQueue::with_config(SystemClock, queue_config);
    queue.set_handlers(action_handlers(tiles.clone()));
    let worker = TickWorker::new(queue, tiles, settings);

    tokio::spawn(tick_task(input_rx, worker, stats_tx.clone(), shutdown));

    Arc::new(AppState { input_tx, stats_tx })
}
