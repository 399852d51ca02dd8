use crate::{
    dto::{battle::counts_map, events::BattleEvent},
    state::{SharedState, battle::Battle, session::SessionEnd, tracker::TrackedPerformance},
};

/// Broadcast a combined rep snapshot after an accepted submission.
pub fn broadcast_rep_update(
    state: &SharedState,
    battle: &Battle,
    counts: &[TrackedPerformance; 2],
    elapsed_seconds: u64,
) {
    let event = BattleEvent::RepUpdate {
        battle_id: battle.id,
        participant_reps: counts_map(battle.participants(), counts),
        elapsed_seconds,
    };
    state.broadcaster().broadcast(&event);
}

/// Broadcast a lifecycle transition that happened outside a live session
/// (acceptance, decline, activation, pre-start cancellation).
pub fn broadcast_status_changed(state: &SharedState, battle: &Battle) {
    let event = BattleEvent::StatusChanged {
        battle_id: battle.id,
        status: battle.status,
        participant_reps: None,
        elapsed_seconds: None,
        winner_id: None,
    };
    state.broadcaster().broadcast(&event);
}

/// Broadcast the terminal event of a live session, then forget its observers.
pub fn broadcast_session_finished(state: &SharedState, battle: &Battle, end: &SessionEnd) {
    let event = BattleEvent::StatusChanged {
        battle_id: battle.id,
        status: battle.status,
        participant_reps: Some(counts_map(battle.participants(), &end.final_counts)),
        elapsed_seconds: Some(end.elapsed_seconds),
        winner_id: Some(end.winner_id),
    };
    state.broadcaster().broadcast(&event);
    state.broadcaster().drop_battle(battle.id);
}
