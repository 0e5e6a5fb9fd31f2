use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::domain::{
    ActionKind, ActionPayload, Clock, Connection, MoveInstruction, MoveRejection, PlayerId,
};
use crate::use_cases::action_queue::ActionHandlers;

// Manually advanced time source so staleness assertions are deterministic.
#[derive(Clone)]
pub(crate) struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub(crate) fn new(start_ms: u64) -> Self {
        Self(Arc::new(AtomicU64::new(start_ms)))
    }

    pub(crate) fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

// Connection stand-in that remembers every movement rejection sent to it.
#[derive(Clone)]
pub(crate) struct TestConnection {
    player_id: Option<PlayerId>,
    rejections: Arc<Mutex<Vec<MoveRejection>>>,
}

impl TestConnection {
    pub(crate) fn player(player_id: PlayerId) -> Self {
        Self {
            player_id: Some(player_id),
            rejections: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn anonymous() -> Self {
        Self {
            player_id: None,
            rejections: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn rejections(&self) -> Vec<MoveRejection> {
        self.rejections
            .lock()
            .expect("rejections mutex poisoned")
            .clone()
    }
}

impl Connection for TestConnection {
    fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    fn reject_move(&self, rejection: &MoveRejection) {
        self.rejections
            .lock()
            .expect("rejections mutex poisoned")
            .push(rejection.clone());
    }
}

// Shared record of handler invocations in call order.
#[derive(Clone, Default)]
pub(crate) struct CallLog {
    calls: Arc<Mutex<Vec<(ActionKind, PlayerId, ActionPayload)>>>,
}

impl CallLog {
    pub(crate) fn record(&self, kind: ActionKind, conn: &TestConnection, payload: &ActionPayload) {
        let player_id = conn.player_id().unwrap_or_default();
        self.calls
            .lock()
            .expect("call log mutex poisoned")
            .push((kind, player_id, payload.clone()));
    }

    // Handlers for all three kinds that only record the call.
    pub(crate) fn handlers(&self) -> ActionHandlers<TestConnection> {
        let (movement, combat, interaction) = (self.clone(), self.clone(), self.clone());
        ActionHandlers::new()
            .on_movement(move |conn: &TestConnection, payload: &ActionPayload| {
                movement.record(ActionKind::Movement, conn, payload);
                Ok(())
            })
            .on_combat(move |conn: &TestConnection, payload: &ActionPayload| {
                combat.record(ActionKind::Combat, conn, payload);
                Ok(())
            })
            .on_interaction(move |conn: &TestConnection, payload: &ActionPayload| {
                interaction.record(ActionKind::Interaction, conn, payload);
                Ok(())
            })
    }

    pub(crate) fn calls(&self) -> Vec<(ActionKind, PlayerId)> {
        self.calls
            .lock()
            .expect("call log mutex poisoned")
            .iter()
            .map(|(kind, player_id, _)| (*kind, *player_id))
            .collect()
    }

    pub(crate) fn count(&self, kind: ActionKind) -> usize {
        self.calls()
            .into_iter()
            .filter(|(called, _)| *called == kind)
            .count()
    }

    pub(crate) fn last_move(&self) -> Option<MoveInstruction> {
        self.calls
            .lock()
            .expect("call log mutex poisoned")
            .iter()
            .rev()
            .find_map(|(_, _, payload)| payload.as_move().copied())
    }

    // `objectId` of every interaction handled, in order.
    pub(crate) fn interaction_objects(&self) -> Vec<f64> {
        self.calls
            .lock()
            .expect("call log mutex poisoned")
            .iter()
            .filter(|(kind, _, _)| *kind == ActionKind::Interaction)
            .filter_map(|(_, _, payload)| match payload {
                ActionPayload::Data(data) => data.get("objectId").and_then(|v| v.as_f64()),
                ActionPayload::Move(_) => None,
            })
            .collect()
    }
}
