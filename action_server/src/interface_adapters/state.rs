use crate::interface_adapters::session::ClientHandle;
use crate::use_cases::{GameEvent, QueueStats};
use tokio::sync::{mpsc, watch};

#[derive(Clone)]
pub struct AppState {
    // Events flowing from sockets into the tick worker.
    pub input_tx: mpsc::Sender<GameEvent<ClientHandle>>,
    // Queue counters refreshed by the tick worker after every tick.
    pub stats_tx: watch::Sender<QueueStats>,
}
