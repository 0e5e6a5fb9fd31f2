// Action classification and queued action records.

use super::movement::MoveInstruction;
use super::payload::PayloadValue;
use std::fmt;
use std::time::Duration;

pub type PlayerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Movement,
    Combat,
    Interaction,
    Cancel,
}

impl ActionKind {
    pub fn priority(self) -> ActionPriority {
        match self {
            ActionKind::Cancel => ActionPriority::Cancel,
            ActionKind::Combat => ActionPriority::Combat,
            ActionKind::Interaction => ActionPriority::Interaction,
            ActionKind::Movement => ActionPriority::Movement,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Movement => "movement",
            ActionKind::Combat => "combat",
            ActionKind::Interaction => "interaction",
            ActionKind::Cancel => "cancel",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Same-tick conflict ordering. Lower value wins ties.
///
/// This only arbitrates the primary slot; it does not sequence actions across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ActionPriority {
    Cancel = 0,
    Combat = 1,
    Interaction = 2,
    Movement = 3,
}

impl ActionPriority {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Data carried by a queued action into its handler.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    // Movement is always validated before it is queued.
    Move(MoveInstruction),
    Data(PayloadValue),
}

impl ActionPayload {
    pub fn as_move(&self) -> Option<&MoveInstruction> {
        match self {
            ActionPayload::Move(instruction) => Some(instruction),
            ActionPayload::Data(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuedAction<C> {
    pub kind: ActionKind,
    pub player_id: PlayerId,
    pub connection: C,
    pub payload: ActionPayload,
    // Milliseconds from the queue's clock.
    pub enqueued_at: u64,
    pub priority: ActionPriority,
}

impl<C> QueuedAction<C> {
    pub fn new(
        kind: ActionKind,
        player_id: PlayerId,
        connection: C,
        payload: ActionPayload,
        enqueued_at: u64,
    ) -> Self {
        Self {
            kind,
            player_id,
            connection,
            payload,
            enqueued_at,
            priority: kind.priority(),
        }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.enqueued_at)
    }

    /// An action is stale once its age strictly exceeds `max_age`.
    pub fn is_stale(&self, now_ms: u64, max_age: Duration) -> bool {
        u128::from(self.age_ms(now_ms)) > max_age.as_millis()
    }
}
