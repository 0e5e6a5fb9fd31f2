// Wire protocol DTOs and conversions for public action server messages.

use crate::domain::{ActionKind, MoveInstruction, MoveRejection, PayloadValue, PlayerId, Tile};
use crate::use_cases::QueueStats;
use serde::{Deserialize, Serialize};

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    // Assigned identity for the connection after Join is accepted.
    Identity { player_id: String },
    // A movement packet failed validation and was dropped.
    MoveRejected(MoveRejectedDto),
    // An action was admitted on a tick and handed to the simulation.
    ActionExecuted(ActionExecutedDto),
}

/// Messages the client sends to the server over the WebSocket.
///
/// Action bodies stay untyped here; the validator and the queue classify them.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    // Initial handshake message with identity metadata.
    Join(JoinPayload),
    Move(serde_json::Value),
    Attack(serde_json::Value),
    Interact(serde_json::Value),
    Cancel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinPayload {
    pub player_id: PlayerId,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileDto {
    pub x: i32,
    pub z: i32,
}

impl From<Tile> for TileDto {
    fn from(tile: Tile) -> Self {
        Self {
            x: tile.x,
            z: tile.z,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveRejectedDto {
    pub severity: &'static str,
    pub reason: String,
}

impl From<&MoveRejection> for MoveRejectedDto {
    fn from(rejection: &MoveRejection) -> Self {
        Self {
            severity: rejection.severity.as_str(),
            reason: rejection.reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionExecutedDto {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_tile: Option<TileDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
}

impl ActionExecutedDto {
    pub fn movement(instruction: &MoveInstruction) -> Self {
        Self {
            kind: ActionKind::Movement.as_str(),
            target_tile: Some(instruction.target_tile.into()),
            run_mode: Some(instruction.run_mode),
            cancel: Some(instruction.cancel),
            target_id: None,
        }
    }

    pub fn targeted(kind: ActionKind, target_id: Option<String>) -> Self {
        Self {
            kind: kind.as_str(),
            target_tile: None,
            run_mode: None,
            cancel: None,
            target_id,
        }
    }
}

/// Queue counters served on `/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatsDto {
    pub total_players: usize,
    pub players_with_pending: usize,
    pub total_queued_interactions: usize,
}

impl From<QueueStats> for QueueStatsDto {
    fn from(stats: QueueStats) -> Self {
        Self {
            total_players: stats.total_players,
            players_with_pending: stats.players_with_pending,
            total_queued_interactions: stats.total_queued_interactions,
        }
    }
}

impl From<serde_json::Value> for PayloadValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => PayloadValue::Null,
            serde_json::Value::Bool(b) => PayloadValue::Bool(b),
            // Unrepresentable numbers become NaN so the validator flags them.
            serde_json::Value::Number(n) => PayloadValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => PayloadValue::String(s),
            serde_json::Value::Array(items) => {
                PayloadValue::Array(items.into_iter().map(PayloadValue::from).collect())
            }
            serde_json::Value::Object(fields) => PayloadValue::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, PayloadValue::from(v)))
                    .collect(),
            ),
        }
    }
}
