use super::action::PlayerId;
use super::movement::MoveRejection;
use std::time::{SystemTime, UNIX_EPOCH};

// Port for whatever transport handle a queued action came in on.
// Returning `None` means the connection is not bound to a player yet.
pub trait Connection {
    fn player_id(&self) -> Option<PlayerId>;

    // Feedback for a movement packet that failed validation. Transports that
    // cannot report back keep the default.
    fn reject_move(&self, _rejection: &MoveRejection) {}
}

// Port for retrieving the current time.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}
