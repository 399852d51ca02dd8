use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::machine::BattleStatus;

/// Realtime events pushed to subscribed battle observers.
///
/// One variant per event kind so the dispatch is exhaustive; the serialized
/// `type` tag is what clients switch on.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BattleEvent {
    /// Combined snapshot emitted after every accepted rep submission.
    RepUpdate {
        /// Battle the snapshot belongs to.
        battle_id: Uuid,
        /// Current rep count per contestant, creator first.
        #[schema(value_type = Object)]
        participant_reps: IndexMap<Uuid, u32>,
        /// Seconds elapsed since the battle started, clamped to its duration.
        elapsed_seconds: u64,
    },
    /// Lifecycle transition of a battle.
    StatusChanged {
        /// Battle that transitioned.
        battle_id: Uuid,
        /// Status after the transition.
        status: BattleStatus,
        /// Final rep counts, present on session-ending transitions.
        #[serde(skip_serializing_if = "Option::is_none")]
        #[schema(value_type = Object)]
        participant_reps: Option<IndexMap<Uuid, u32>>,
        /// Elapsed seconds at the time of the transition, when a session existed.
        #[serde(skip_serializing_if = "Option::is_none")]
        elapsed_seconds: Option<u64>,
        /// Winner on completion; serialized `null` denotes a tie.
        #[serde(skip_serializing_if = "Option::is_none")]
        #[schema(value_type = Option<Uuid>)]
        winner_id: Option<Option<Uuid>>,
    },
}

impl BattleEvent {
    /// Battle this event refers to.
    pub fn battle_id(&self) -> Uuid {
        match self {
            BattleEvent::RepUpdate { battle_id, .. } => *battle_id,
            BattleEvent::StatusChanged { battle_id, .. } => *battle_id,
        }
    }
}
