use std::time::SystemTime;

use uuid::Uuid;

use crate::{
    dao::models::{BattleEntity, PerformanceEntity},
    state::machine::BattleStatus,
};

/// Runtime representation of a battle between two contestants.
#[derive(Debug, Clone)]
pub struct Battle {
    /// Stable identifier assigned at creation.
    pub id: Uuid,
    /// User who issued the challenge.
    pub creator_id: Uuid,
    /// User the challenge was issued to.
    pub opponent_id: Uuid,
    /// Domain label for the exercise ("pushups", "squats", ...). Free-form.
    pub exercise_type: String,
    /// Fixed session length in seconds, immutable after creation.
    pub duration_secs: u32,
    /// Current lifecycle status.
    pub status: BattleStatus,
    /// Creation timestamp for auditing.
    pub created_at: SystemTime,
    /// Set exactly once when the battle becomes active.
    pub started_at: Option<SystemTime>,
    /// Set exactly once when the battle completes or is cancelled.
    pub ended_at: Option<SystemTime>,
    /// Winning contestant, set only on completion. `None` also denotes a tie.
    pub winner_id: Option<Uuid>,
}

impl Battle {
    /// Build a fresh pending battle.
    pub fn new(creator_id: Uuid, opponent_id: Uuid, exercise_type: String, duration_secs: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            creator_id,
            opponent_id,
            exercise_type,
            duration_secs,
            status: BattleStatus::Pending,
            created_at: SystemTime::now(),
            started_at: None,
            ended_at: None,
            winner_id: None,
        }
    }

    /// Whether `user` is one of the two contestants.
    pub fn is_participant(&self, user: Uuid) -> bool {
        user == self.creator_id || user == self.opponent_id
    }

    /// The two contestants, creator first.
    pub fn participants(&self) -> [Uuid; 2] {
        [self.creator_id, self.opponent_id]
    }
}

/// Decide the winner from final rep counts: strictly more reps wins, equal is a tie.
pub fn winner_between(creator: (Uuid, u32), opponent: (Uuid, u32)) -> Option<Uuid> {
    if creator.1 > opponent.1 {
        Some(creator.0)
    } else if opponent.1 > creator.1 {
        Some(opponent.0)
    } else {
        None
    }
}

/// A contestant's accumulated rep count within one battle.
#[derive(Debug, Clone)]
pub struct Performance {
    /// Contestant this record belongs to.
    pub user_id: Uuid,
    /// Latest accepted rep count.
    pub reps: u32,
    /// Timestamp of the most recent accepted update.
    pub last_updated_at: SystemTime,
}

impl From<BattleEntity> for Battle {
    fn from(value: BattleEntity) -> Self {
        Self {
            id: value.id,
            creator_id: value.creator_id,
            opponent_id: value.opponent_id,
            exercise_type: value.exercise_type,
            duration_secs: value.duration_secs,
            status: value.status,
            created_at: value.created_at,
            started_at: value.started_at,
            ended_at: value.ended_at,
            winner_id: value.winner_id,
        }
    }
}

impl From<Battle> for BattleEntity {
    fn from(value: Battle) -> Self {
        Self {
            id: value.id,
            creator_id: value.creator_id,
            opponent_id: value.opponent_id,
            exercise_type: value.exercise_type,
            duration_secs: value.duration_secs,
            status: value.status,
            created_at: value.created_at,
            started_at: value.started_at,
            ended_at: value.ended_at,
            winner_id: value.winner_id,
        }
    }
}

impl From<PerformanceEntity> for Performance {
    fn from(value: PerformanceEntity) -> Self {
        Self {
            user_id: value.user_id,
            reps: value.reps,
            last_updated_at: value.last_updated_at,
        }
    }
}
