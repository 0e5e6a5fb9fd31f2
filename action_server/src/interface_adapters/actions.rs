// Action handlers wired into the queue by this server.
//
// World resolution (pathing, damage, object use) happens elsewhere; these report the admitted
// action to its client and keep the authoritative tile book current.

use crate::domain::{ActionKind, ActionPayload};
use crate::interface_adapters::protocol::{ActionExecutedDto, ServerMessage};
use crate::interface_adapters::session::ClientHandle;
use crate::use_cases::action_queue::{combat_target_id, scalar_id};
use crate::use_cases::{ActionHandlers, HandlerError, TileBook};

pub fn action_handlers(tiles: TileBook) -> ActionHandlers<ClientHandle> {
    ActionHandlers::new()
        .on_movement(move |client: &ClientHandle, payload: &ActionPayload| {
            let Some(instruction) = payload.as_move() else {
                return Err(HandlerError::Rejected("movement without instruction".into()));
            };
            // Arrival is immediate until a pathing system owns position updates.
            tiles.set(client.id(), instruction.target_tile);
            client.send(ServerMessage::ActionExecuted(ActionExecutedDto::movement(
                instruction,
            )))
        })
        .on_combat(|client: &ClientHandle, payload: &ActionPayload| {
            client.send(ServerMessage::ActionExecuted(ActionExecutedDto::targeted(
                ActionKind::Combat,
                target_of(payload),
            )))
        })
        .on_interaction(|client: &ClientHandle, payload: &ActionPayload| {
            client.send(ServerMessage::ActionExecuted(ActionExecutedDto::targeted(
                ActionKind::Interaction,
                target_of(payload),
            )))
        })
}

// Combat reads `mobId`/`targetId`; interactions usually name an `objectId`.
fn target_of(payload: &ActionPayload) -> Option<String> {
    let ActionPayload::Data(data) = payload else {
        return None;
    };
    combat_target_id(data).or_else(|| data.get("objectId").and_then(scalar_id))
}
