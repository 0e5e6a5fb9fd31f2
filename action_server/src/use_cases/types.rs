// Use-case level inputs for the tick worker.

use crate::domain::{PayloadValue, PlayerId};

#[derive(Debug, Clone)]
pub enum GameEvent<C> {
    // `conn_id` identifies the socket, so one player id may hold several sessions.
    Join { player_id: PlayerId, conn_id: u64 },
    Leave { player_id: PlayerId, conn_id: u64 },
    // Raw movement payload; validated by the worker against the player's current tile.
    Move { connection: C, payload: PayloadValue },
    Attack { connection: C, payload: PayloadValue },
    Interact { connection: C, payload: PayloadValue },
    Cancel { player_id: PlayerId },
    // Raised by the combat system when a fight is over.
    CombatEnded { player_id: PlayerId },
}
