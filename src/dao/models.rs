use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::machine::BattleStatus;

/// Durable battle record exchanged with storage backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleEntity {
    /// Primary key of the battle.
    pub id: Uuid,
    /// User who issued the challenge.
    pub creator_id: Uuid,
    /// User the challenge was issued to.
    pub opponent_id: Uuid,
    /// Free-form exercise label.
    pub exercise_type: String,
    /// Session length in seconds.
    pub duration_secs: u32,
    /// Lifecycle status at the last persisted boundary.
    pub status: BattleStatus,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Set when the battle became active.
    pub started_at: Option<SystemTime>,
    /// Set when the battle completed or was cancelled.
    pub ended_at: Option<SystemTime>,
    /// Winner recorded on completion; `None` is also a tie.
    pub winner_id: Option<Uuid>,
}

/// Durable per-contestant rep record, keyed by `(battle_id, user_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceEntity {
    /// Battle the record belongs to.
    pub battle_id: Uuid,
    /// Contestant the record belongs to.
    pub user_id: Uuid,
    /// Last persisted rep count.
    pub reps: u32,
    /// Timestamp of the last persisted update.
    pub last_updated_at: SystemTime,
}
