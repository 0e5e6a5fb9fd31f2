// Domain layer: action classification and movement validation rules.

pub mod action;
pub mod movement;
pub mod payload;
pub mod ports;

pub use action::{ActionKind, ActionPayload, ActionPriority, PlayerId, QueuedAction};
pub use movement::{
    MoveInstruction, MoveRejection, MovementLimits, Severity, Tile, ValidationResult,
    validate_move_request, validate_move_request_with,
};
pub use payload::PayloadValue;
pub use ports::{Clock, Connection, SystemClock};
