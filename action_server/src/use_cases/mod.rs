// Use cases layer: action scheduling and the tick worker.

pub mod action_queue;
pub mod tick;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use action_queue::{
    ActionHandler, ActionHandlers, ActionQueue, HandlerError, QueueConfig, QueueStats, TickSummary,
};
pub use tick::{TickSettings, TickWorker, TileBook, tick_task};
pub use types::GameEvent;
