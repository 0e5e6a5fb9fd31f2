// Per-connection handle that travels with queued actions back into handlers.

use crate::domain::{Connection, MoveRejection, PlayerId};
use crate::interface_adapters::protocol::{MoveRejectedDto, ServerMessage};
use crate::use_cases::HandlerError;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ClientHandle {
    player_id: PlayerId,
    // Separate connection id for correlating logs across reconnects.
    conn_id: u64,
    outbound: mpsc::Sender<ServerMessage>,
}

impl ClientHandle {
    pub fn new(player_id: PlayerId, conn_id: u64, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            player_id,
            conn_id,
            outbound,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.player_id
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Queues a message for the socket without waiting; the tick must never block on I/O.
    pub fn send(&self, msg: ServerMessage) -> Result<(), HandlerError> {
        match self.outbound.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                // A slow reader only loses notifications, never game state.
                debug!(
                    player_id = self.player_id,
                    conn_id = self.conn_id,
                    "outbound queue full; dropping message"
                );
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(HandlerError::ConnectionClosed),
        }
    }
}

impl Connection for ClientHandle {
    fn player_id(&self) -> Option<PlayerId> {
        Some(self.player_id)
    }

    fn reject_move(&self, rejection: &MoveRejection) {
        let msg = ServerMessage::MoveRejected(MoveRejectedDto::from(rejection));
        if let Err(e) = self.send(msg) {
            debug!(
                player_id = self.player_id,
                conn_id = self.conn_id,
                severity = %rejection.severity,
                error = %e,
                "move rejection not delivered"
            );
        }
    }
}
