// Per-player action scheduling: decides which pending input runs on each tick.
//
// Every player holds at most one primary action, a bounded FIFO of interactions and a
// combat target that outlives individual ticks. `process_tick` admits at most one
// action per player and hands it to the registered handler.

use crate::domain::{
    ActionKind, ActionPayload, ActionPriority, Clock, Connection, MoveInstruction, PayloadValue,
    PlayerId, QueuedAction,
};
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

pub const MAX_INTERACTION_QUEUE: usize = 5;
pub const MAX_ACTION_AGE: Duration = Duration::from_millis(10_000);

pub type TargetId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Interactions kept per player; the oldest is evicted past this.
    pub max_interaction_queue: usize,
    /// Actions older than this when their turn comes are discarded.
    pub max_action_age: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_interaction_queue: MAX_INTERACTION_QUEUE,
            max_action_age: MAX_ACTION_AGE,
        }
    }
}

/// Errors a handler can report back without aborting the tick.
#[derive(Debug)]
pub enum HandlerError {
    // The simulation refused the action (target gone, out of reach, ...).
    Rejected(String),
    // The connection that queued the action can no longer receive results.
    ConnectionClosed,
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Rejected(reason) => write!(f, "rejected: {reason}"),
            HandlerError::ConnectionClosed => f.write_str("connection closed"),
        }
    }
}

pub type ActionHandler<C> =
    Box<dyn FnMut(&C, &ActionPayload) -> Result<(), HandlerError> + Send + 'static>;

/// Execution callbacks supplied by the surrounding server.
///
/// A kind without a handler is dropped silently when its turn comes.
pub struct ActionHandlers<C> {
    pub movement: Option<ActionHandler<C>>,
    pub combat: Option<ActionHandler<C>>,
    pub interaction: Option<ActionHandler<C>>,
}

impl<C> Default for ActionHandlers<C> {
    fn default() -> Self {
        Self {
            movement: None,
            combat: None,
            interaction: None,
        }
    }
}

impl<C> ActionHandlers<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_movement<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&C, &ActionPayload) -> Result<(), HandlerError> + Send + 'static,
    {
        self.movement = Some(Box::new(handler));
        self
    }

    pub fn on_combat<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&C, &ActionPayload) -> Result<(), HandlerError> + Send + 'static,
    {
        self.combat = Some(Box::new(handler));
        self
    }

    pub fn on_interaction<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&C, &ActionPayload) -> Result<(), HandlerError> + Send + 'static,
    {
        self.interaction = Some(Box::new(handler));
        self
    }

    fn for_kind(&mut self, kind: ActionKind) -> Option<&mut ActionHandler<C>> {
        match kind {
            ActionKind::Movement => self.movement.as_mut(),
            ActionKind::Combat => self.combat.as_mut(),
            ActionKind::Interaction => self.interaction.as_mut(),
            ActionKind::Cancel => None,
        }
    }
}

struct PlayerQueueState<C> {
    pending_action: Option<QueuedAction<C>>,
    interaction_backlog: VecDeque<QueuedAction<C>>,
    combat_target: Option<TargetId>,
    last_processed_tick: u64,
}

impl<C> Default for PlayerQueueState<C> {
    fn default() -> Self {
        Self {
            pending_action: None,
            interaction_backlog: VecDeque::new(),
            combat_target: None,
            last_processed_tick: 0,
        }
    }
}

impl<C> PlayerQueueState<C> {
    fn has_pending(&self) -> bool {
        self.pending_action.is_some() || !self.interaction_backlog.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub total_players: usize,
    pub players_with_pending: usize,
    pub total_queued_interactions: usize,
}

/// Outcome counters for a single `process_tick` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: u64,
    pub players_processed: usize,
    pub executed: usize,
    pub stale_discarded: usize,
    pub handler_failures: usize,
}

pub struct ActionQueue<C, K> {
    clock: K,
    config: QueueConfig,
    handlers: ActionHandlers<C>,
    // Ordered so a tick always visits players in the same sequence.
    players: BTreeMap<PlayerId, PlayerQueueState<C>>,
}

impl<C, K> ActionQueue<C, K>
where
    C: Connection,
    K: Clock,
{
    pub fn new(clock: K) -> Self {
        Self::with_config(clock, QueueConfig::default())
    }

    pub fn with_config(clock: K, config: QueueConfig) -> Self {
        Self {
            clock,
            config: QueueConfig {
                // A zero-length backlog could never accept an interaction.
                max_interaction_queue: config.max_interaction_queue.max(1),
                ..config
            },
            handlers: ActionHandlers::default(),
            players: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> QueueConfig {
        self.config
    }

    pub fn set_handlers(&mut self, handlers: ActionHandlers<C>) {
        self.handlers = handlers;
    }

    /// Queues a validated move. A ground click replaces whatever was pending,
    /// combat included, and drops the combat target.
    pub fn queue_movement(&mut self, connection: C, instruction: MoveInstruction) {
        let Some(player_id) = connection.player_id() else {
            return;
        };
        let now = self.clock.now_millis();
        let state = self.players.entry(player_id).or_default();

        state.pending_action = Some(QueuedAction::new(
            ActionKind::Movement,
            player_id,
            connection,
            ActionPayload::Move(instruction),
            now,
        ));
        state.combat_target = None;
        trace!(player_id, target = ?instruction.target_tile, "movement queued");
    }

    /// Queues an attack on `mobId` (or `targetId`). Requests without a target are ignored.
    pub fn queue_combat(&mut self, connection: C, data: PayloadValue) {
        let Some(player_id) = connection.player_id() else {
            return;
        };
        let Some(target) = combat_target_id(&data) else {
            trace!(player_id, "combat request without target ignored");
            return;
        };
        let now = self.clock.now_millis();
        let state = self.players.entry(player_id).or_default();

        state.combat_target = Some(target);
        // Only a cancel outranks combat; it never silently loses to movement or combat.
        let replace = state
            .pending_action
            .as_ref()
            .is_none_or(|pending| pending.priority >= ActionPriority::Combat);
        if replace {
            state.pending_action = Some(QueuedAction::new(
                ActionKind::Combat,
                player_id,
                connection,
                ActionPayload::Data(data),
                now,
            ));
        }
        trace!(player_id, replaced = replace, "combat queued");
    }

    pub fn queue_interaction(&mut self, connection: C, data: PayloadValue) {
        let Some(player_id) = connection.player_id() else {
            return;
        };
        let now = self.clock.now_millis();
        let max = self.config.max_interaction_queue;
        let state = self.players.entry(player_id).or_default();

        while state.interaction_backlog.len() >= max {
            state.interaction_backlog.pop_front();
            debug!(player_id, "interaction backlog full; oldest evicted");
        }
        state.interaction_backlog.push_back(QueuedAction::new(
            ActionKind::Interaction,
            player_id,
            connection,
            ActionPayload::Data(data),
            now,
        ));
    }

    /// Clears everything queued for the player but keeps the state record.
    pub fn cancel_actions(&mut self, player_id: PlayerId) {
        if let Some(state) = self.players.get_mut(&player_id) {
            state.pending_action = None;
            state.interaction_backlog.clear();
            state.combat_target = None;
        }
    }

    pub fn clear_combat_target(&mut self, player_id: PlayerId) {
        if let Some(state) = self.players.get_mut(&player_id) {
            state.combat_target = None;
        }
    }

    /// Runs at most one action per player for `tick`.
    ///
    /// Ticks at or below a player's last processed tick are skipped, so a repeated
    /// call with the same number is a no-op. Tick numbers start at 1.
    pub fn process_tick(&mut self, tick: u64) -> TickSummary {
        let now = self.clock.now_millis();
        let max_age = self.config.max_action_age;
        let mut summary = TickSummary {
            tick,
            ..TickSummary::default()
        };

        let Self {
            players, handlers, ..
        } = self;

        for state in players.values_mut() {
            if state.last_processed_tick >= tick {
                continue;
            }
            state.last_processed_tick = tick;
            summary.players_processed += 1;

            let mut ran_primary = false;
            if let Some(action) = state.pending_action.take() {
                if action.is_stale(now, max_age) {
                    summary.stale_discarded += 1;
                    debug!(
                        player_id = action.player_id,
                        kind = %action.kind,
                        age_ms = action.age_ms(now),
                        "stale action discarded"
                    );
                } else {
                    ran_primary = true;
                    execute(handlers, &action, &mut summary);
                }
            }

            if ran_primary {
                continue;
            }

            if let Some(action) = state.interaction_backlog.pop_front() {
                if action.is_stale(now, max_age) {
                    summary.stale_discarded += 1;
                    debug!(
                        player_id = action.player_id,
                        age_ms = action.age_ms(now),
                        "stale interaction discarded"
                    );
                } else {
                    execute(handlers, &action, &mut summary);
                }
            }
        }

        summary
    }

    /// Drops all state for the player. Returns false if nothing was tracked.
    pub fn cleanup(&mut self, player_id: PlayerId) -> bool {
        self.players.remove(&player_id).is_some()
    }

    pub fn has_player(&self, player_id: PlayerId) -> bool {
        self.players.contains_key(&player_id)
    }

    pub fn has_pending_actions(&self, player_id: PlayerId) -> bool {
        self.players
            .get(&player_id)
            .is_some_and(PlayerQueueState::has_pending)
    }

    pub fn get_combat_target(&self, player_id: PlayerId) -> Option<&str> {
        self.players
            .get(&player_id)
            .and_then(|state| state.combat_target.as_deref())
    }

    pub fn pending_kind(&self, player_id: PlayerId) -> Option<ActionKind> {
        self.players
            .get(&player_id)
            .and_then(|state| state.pending_action.as_ref())
            .map(|action| action.kind)
    }

    pub fn get_stats(&self) -> QueueStats {
        self.players
            .values()
            .fold(QueueStats::default(), |mut stats, state| {
                stats.total_players += 1;
                if state.has_pending() {
                    stats.players_with_pending += 1;
                }
                stats.total_queued_interactions += state.interaction_backlog.len();
                stats
            })
    }
}

// Handler failures and panics stay contained to the action that caused them.
fn execute<C>(
    handlers: &mut ActionHandlers<C>,
    action: &QueuedAction<C>,
    summary: &mut TickSummary,
) {
    let Some(handler) = handlers.for_kind(action.kind) else {
        trace!(
            player_id = action.player_id,
            kind = %action.kind,
            "no handler registered; action dropped"
        );
        return;
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        handler(&action.connection, &action.payload)
    }));

    match outcome {
        Ok(Ok(())) => summary.executed += 1,
        Ok(Err(e)) => {
            summary.handler_failures += 1;
            warn!(
                player_id = action.player_id,
                kind = %action.kind,
                error = %e,
                "action handler failed"
            );
        }
        Err(panic) => {
            summary.handler_failures += 1;
            error!(
                player_id = action.player_id,
                kind = %action.kind,
                panic = panic_message(panic.as_ref()),
                "action handler panicked"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Reads the attack target from `mobId`, falling back to `targetId`.
///
/// Empty strings, zero and non-scalar values count as "no target".
pub fn combat_target_id(data: &PayloadValue) -> Option<TargetId> {
    ["mobId", "targetId"]
        .into_iter()
        .find_map(|key| data.get(key).and_then(scalar_id))
}

pub(crate) fn scalar_id(value: &PayloadValue) -> Option<TargetId> {
    match value {
        PayloadValue::String(s) if !s.is_empty() => Some(s.clone()),
        PayloadValue::Number(n) if n.is_finite() && *n != 0.0 => {
            if n.fract() == 0.0 && n.abs() < 9.0e15 {
                Some(format!("{}", *n as i64))
            } else {
                Some(n.to_string())
            }
        }
        _ => None,
    }
}
