// Fixed-interval tick driver: the single worker that owns the action queue.
//
// Network tasks never touch the queue directly. They send `GameEvent`s over a channel and
// this task applies them in arrival order, so per-player state is only mutated from here.

use super::action_queue::{ActionQueue, QueueStats, TickSummary};
use super::types::GameEvent;
use crate::domain::{
    Clock, Connection, MovementLimits, PlayerId, Severity, Tile, validate_move_request_with,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Last authoritative tile per player, shared with the movement handler.
#[derive(Debug, Clone, Default)]
pub struct TileBook {
    tiles: Arc<Mutex<HashMap<PlayerId, Tile>>>,
}

impl TileBook {
    pub fn get(&self, player_id: PlayerId) -> Option<Tile> {
        self.lock().get(&player_id).copied()
    }

    pub fn set(&self, player_id: PlayerId, tile: Tile) {
        self.lock().insert(player_id, tile);
    }

    pub fn remove(&self, player_id: PlayerId) -> Option<Tile> {
        self.lock().remove(&player_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A handler panic must not lock every player out of movement.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PlayerId, Tile>> {
        self.tiles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TickSettings {
    pub tick_interval: Duration,
    pub movement_limits: MovementLimits,
    pub spawn_tile: Tile,
}

impl Default for TickSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(600),
            movement_limits: MovementLimits::default(),
            spawn_tile: Tile::default(),
        }
    }
}

/// Synchronous core of the tick task: applies events and runs ticks.
pub struct TickWorker<C, K> {
    queue: ActionQueue<C, K>,
    tiles: TileBook,
    settings: TickSettings,
    // Live sockets per player; state is dropped only when the last one leaves.
    sessions: HashMap<PlayerId, HashSet<u64>>,
    tick: u64,
}

impl<C, K> TickWorker<C, K>
where
    C: Connection,
    K: Clock,
{
    pub fn new(queue: ActionQueue<C, K>, tiles: TileBook, settings: TickSettings) -> Self {
        Self {
            queue,
            tiles,
            settings,
            sessions: HashMap::new(),
            tick: 0,
        }
    }

    pub fn queue(&self) -> &ActionQueue<C, K> {
        &self.queue
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn apply(&mut self, event: GameEvent<C>) {
        match event {
            GameEvent::Join { player_id, conn_id } => {
                let sessions = self.sessions.entry(player_id).or_default();
                let first = sessions.is_empty();
                sessions.insert(conn_id);
                if first {
                    info!(player_id, conn_id, "player joined");
                    self.tiles.set(player_id, self.settings.spawn_tile);
                } else {
                    // The player is already in the world; keep its authoritative tile.
                    info!(
                        player_id,
                        conn_id,
                        sessions = sessions.len(),
                        "additional session joined"
                    );
                }
            }
            GameEvent::Leave { player_id, conn_id } => {
                let Some(sessions) = self.sessions.get_mut(&player_id) else {
                    debug!(player_id, conn_id, "leave for unknown player ignored");
                    return;
                };
                if !sessions.remove(&conn_id) {
                    debug!(player_id, conn_id, "leave for unknown session ignored");
                    return;
                }
                if !sessions.is_empty() {
                    info!(
                        player_id,
                        conn_id,
                        sessions = sessions.len(),
                        "session left; player still connected"
                    );
                    return;
                }
                self.sessions.remove(&player_id);
                info!(player_id, conn_id, "player left");
                self.queue.cleanup(player_id);
                self.tiles.remove(player_id);
            }
            GameEvent::Move {
                connection,
                payload,
            } => {
                let Some(player_id) = connection.player_id() else {
                    return;
                };
                let Some(current) = self.tiles.get(player_id) else {
                    debug!(player_id, "move from player without a tile ignored");
                    return;
                };

                match validate_move_request_with(&payload, current, &self.settings.movement_limits)
                {
                    Ok(instruction) => self.queue.queue_movement(connection, instruction),
                    Err(rejection) => {
                        match rejection.severity {
                            Severity::Minor | Severity::Moderate => debug!(
                                player_id,
                                severity = %rejection.severity,
                                reason = %rejection.reason,
                                "move rejected"
                            ),
                            Severity::Major => warn!(
                                player_id,
                                severity = %rejection.severity,
                                reason = %rejection.reason,
                                "move rejected"
                            ),
                            Severity::Critical => warn!(
                                player_id,
                                severity = %rejection.severity,
                                reason = %rejection.reason,
                                attack_signal = true,
                                "move rejected"
                            ),
                        }
                        connection.reject_move(&rejection);
                    }
                }
            }
            GameEvent::Attack {
                connection,
                payload,
            } => self.queue.queue_combat(connection, payload),
            GameEvent::Interact {
                connection,
                payload,
            } => self.queue.queue_interaction(connection, payload),
            GameEvent::Cancel { player_id } => self.queue.cancel_actions(player_id),
            GameEvent::CombatEnded { player_id } => self.queue.clear_combat_target(player_id),
        }
    }

    pub fn run_tick(&mut self) -> TickSummary {
        self.tick += 1;
        let summary = self.queue.process_tick(self.tick);
        if summary.stale_discarded > 0 || summary.handler_failures > 0 {
            debug!(
                tick = summary.tick,
                executed = summary.executed,
                stale = summary.stale_discarded,
                failures = summary.handler_failures,
                "tick processed"
            );
        }
        summary
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.get_stats()
    }
}

pub async fn tick_task<C, K>(
    mut input_rx: mpsc::Receiver<GameEvent<C>>,
    mut worker: TickWorker<C, K>,
    stats_tx: watch::Sender<QueueStats>,
    shutdown: Arc<Notify>,
) where
    C: Connection + Send + 'static,
    K: Clock + 'static,
{
    let mut interval = tokio::time::interval(worker.settings.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; start counting from the next boundary.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                info!(tick = worker.current_tick(), "tick task shutting down");
                break;
            }
            event = input_rx.recv() => {
                match event {
                    Some(event) => worker.apply(event),
                    None => {
                        warn!("input channel closed; tick task exiting");
                        break;
                    }
                }
            }
            _ = interval.tick() => {
                worker.run_tick();
                stats_tx.send_replace(worker.stats());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionKind, PayloadValue};
    use crate::use_cases::action_queue::ActionHandlers;
    use crate::use_cases::test_support::{CallLog, ManualClock, TestConnection};

    fn worker_with_log() -> (TickWorker<TestConnection, ManualClock>, TileBook, CallLog) {
        let log = CallLog::default();
        let tiles = TileBook::default();
        let mut queue = ActionQueue::new(ManualClock::new(0));
        queue.set_handlers(log.handlers());
        let worker = TickWorker::new(
            queue,
            tiles.clone(),
            TickSettings {
                spawn_tile: Tile::new(100, 100),
                ..TickSettings::default()
            },
        );
        (worker, tiles, log)
    }

    fn move_to(x: f64, z: f64) -> PayloadValue {
        PayloadValue::object([(
            "targetTile",
            PayloadValue::object([("x", PayloadValue::from(x)), ("z", PayloadValue::from(z))]),
        )])
    }

    #[test]
    fn when_player_joins_then_spawn_tile_is_recorded() {
        let (mut worker, tiles, _log) = worker_with_log();
        worker.apply(GameEvent::Join {
            player_id: 1,
            conn_id: 1,
        });
        assert_eq!(tiles.get(1), Some(Tile::new(100, 100)));
    }

    #[test]
    fn when_valid_move_arrives_then_it_runs_on_next_tick() {
        let (mut worker, _tiles, log) = worker_with_log();
        let conn = TestConnection::player(1);
        worker.apply(GameEvent::Join {
            player_id: 1,
            conn_id: 1,
        });
        worker.apply(GameEvent::Move {
            connection: conn.clone(),
            payload: move_to(110.4, 95.0),
        });

        let summary = worker.run_tick();

        assert_eq!(summary.tick, 1);
        assert_eq!(log.calls(), vec![(ActionKind::Movement, 1)]);
        assert_eq!(
            log.last_move().map(|m| m.target_tile),
            Some(Tile::new(110, 95))
        );
        assert!(conn.rejections().is_empty());
    }

    #[test]
    fn when_move_is_a_teleport_then_connection_is_told_and_nothing_queues() {
        let (mut worker, _tiles, log) = worker_with_log();
        let conn = TestConnection::player(1);
        worker.apply(GameEvent::Join {
            player_id: 1,
            conn_id: 1,
        });
        worker.apply(GameEvent::Move {
            connection: conn.clone(),
            payload: move_to(301.0, 100.0),
        });

        worker.run_tick();

        let rejections = conn.rejections();
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].severity, Severity::Major);
        assert!(rejections[0].reason.contains("201 tiles"));
        assert!(log.calls().is_empty());
    }

    #[test]
    fn when_move_arrives_before_join_then_it_is_ignored() {
        let (mut worker, _tiles, _log) = worker_with_log();
        let conn = TestConnection::player(5);
        worker.apply(GameEvent::Move {
            connection: conn.clone(),
            payload: move_to(1.0, 1.0),
        });

        assert!(!worker.queue().has_player(5));
        assert!(conn.rejections().is_empty());
    }

    #[test]
    fn when_player_leaves_then_queue_and_tile_are_cleaned_up() {
        let (mut worker, tiles, _log) = worker_with_log();
        worker.apply(GameEvent::Join {
            player_id: 1,
            conn_id: 1,
        });
        worker.apply(GameEvent::Interact {
            connection: TestConnection::player(1),
            payload: PayloadValue::object([("objectId", PayloadValue::from(3))]),
        });
        assert_eq!(worker.stats().total_players, 1);

        worker.apply(GameEvent::Leave {
            player_id: 1,
            conn_id: 1,
        });

        assert_eq!(worker.stats().total_players, 0);
        assert!(tiles.is_empty());
    }

    #[test]
    fn when_second_session_leaves_then_first_session_keeps_playing() {
        let (mut worker, tiles, log) = worker_with_log();
        let first = TestConnection::player(7);
        worker.apply(GameEvent::Join {
            player_id: 7,
            conn_id: 10,
        });
        worker.apply(GameEvent::Move {
            connection: first.clone(),
            payload: move_to(120.0, 100.0),
        });
        worker.run_tick();
        // The recording handlers do not move players; stand in for the movement handler.
        tiles.set(7, Tile::new(120, 100));

        worker.apply(GameEvent::Join {
            player_id: 7,
            conn_id: 11,
        });
        assert_eq!(tiles.get(7), Some(Tile::new(120, 100)));
        worker.apply(GameEvent::Leave {
            player_id: 7,
            conn_id: 11,
        });

        worker.apply(GameEvent::Move {
            connection: first.clone(),
            payload: move_to(130.0, 100.0),
        });
        worker.run_tick();

        assert_eq!(tiles.get(7), Some(Tile::new(120, 100)));
        assert_eq!(log.count(ActionKind::Movement), 2);
        assert!(first.rejections().is_empty());
    }

    #[test]
    fn when_last_session_leaves_then_player_is_removed() {
        let (mut worker, tiles, _log) = worker_with_log();
        for conn_id in [10, 11] {
            worker.apply(GameEvent::Join {
                player_id: 7,
                conn_id,
            });
        }

        worker.apply(GameEvent::Leave {
            player_id: 7,
            conn_id: 10,
        });
        assert!(tiles.get(7).is_some());

        // A repeated leave for a session that is already gone changes nothing.
        worker.apply(GameEvent::Leave {
            player_id: 7,
            conn_id: 10,
        });
        assert!(tiles.get(7).is_some());

        worker.apply(GameEvent::Leave {
            player_id: 7,
            conn_id: 11,
        });
        assert_eq!(tiles.get(7), None);
    }

    #[test]
    fn when_cancel_arrives_then_pending_work_is_dropped() {
        let (mut worker, _tiles, log) = worker_with_log();
        worker.apply(GameEvent::Join {
            player_id: 1,
            conn_id: 1,
        });
        worker.apply(GameEvent::Attack {
            connection: TestConnection::player(1),
            payload: PayloadValue::object([("mobId", PayloadValue::from("cow"))]),
        });
        worker.apply(GameEvent::Cancel { player_id: 1 });

        worker.run_tick();

        assert!(log.calls().is_empty());
        assert_eq!(worker.queue().get_combat_target(1), None);
    }

    #[test]
    fn when_combat_ends_then_target_is_cleared() {
        let (mut worker, _tiles, _log) = worker_with_log();
        worker.apply(GameEvent::Attack {
            connection: TestConnection::player(1),
            payload: PayloadValue::object([("mobId", PayloadValue::from("cow"))]),
        });
        worker.run_tick();
        assert_eq!(worker.queue().get_combat_target(1), Some("cow"));

        worker.apply(GameEvent::CombatEnded { player_id: 1 });

        assert_eq!(worker.queue().get_combat_target(1), None);
    }

    #[test]
    fn when_movement_handler_updates_tiles_then_next_move_uses_new_origin() {
        let tiles = TileBook::default();
        let mut queue = ActionQueue::new(ManualClock::new(0));
        let book = tiles.clone();
        queue.set_handlers(ActionHandlers::new().on_movement(
            move |conn: &TestConnection, payload: &crate::domain::ActionPayload| {
                if let (Some(player_id), Some(mv)) = (conn.player_id(), payload.as_move()) {
                    book.set(player_id, mv.target_tile);
                }
                Ok(())
            },
        ));
        let mut worker = TickWorker::new(queue, tiles.clone(), TickSettings::default());
        let conn = TestConnection::player(1);

        worker.apply(GameEvent::Join {
            player_id: 1,
            conn_id: 1,
        });
        worker.apply(GameEvent::Move {
            connection: conn.clone(),
            payload: move_to(200.0, 0.0),
        });
        worker.run_tick();
        // 400 tiles from spawn, but only 200 from the tile reached last tick.
        worker.apply(GameEvent::Move {
            connection: conn.clone(),
            payload: move_to(400.0, 0.0),
        });
        worker.run_tick();

        assert_eq!(tiles.get(1), Some(Tile::new(400, 0)));
        assert!(conn.rejections().is_empty());
    }

    #[tokio::test]
    async fn when_task_runs_then_ticks_fire_and_shutdown_stops_it() {
        let (worker, _tiles, log) = worker_with_log();
        let worker = TickWorker {
            settings: TickSettings {
                tick_interval: Duration::from_millis(10),
                ..worker.settings
            },
            ..worker
        };
        let (input_tx, input_rx) = mpsc::channel(16);
        let (stats_tx, mut stats_rx) = watch::channel(QueueStats::default());
        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(tick_task(input_rx, worker, stats_tx, shutdown.clone()));

        input_tx
            .send(GameEvent::Join {
                player_id: 4,
                conn_id: 1,
            })
            .await
            .expect("tick task should accept events");
        input_tx
            .send(GameEvent::Interact {
                connection: TestConnection::player(4),
                payload: PayloadValue::object([("objectId", PayloadValue::from(1))]),
            })
            .await
            .expect("tick task should accept events");

        tokio::time::timeout(Duration::from_secs(2), async {
            while log.count(ActionKind::Interaction) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("interaction should run within a few ticks");

        stats_rx
            .wait_for(|stats| stats.total_players == 1 && stats.total_queued_interactions == 0)
            .await
            .expect("stats should be published");

        shutdown.notify_one();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("tick task should stop")
            .expect("tick task should not panic");
    }
}
