use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::format_system_time,
    state::{
        battle::{Battle, Performance},
        machine::BattleStatus,
        tracker::TrackedPerformance,
    },
};

/// Payload used to challenge a specific opponent.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateBattleRequest {
    /// User the challenge is issued to.
    pub opponent_id: Uuid,
    /// Exercise label, e.g. "pushups".
    #[validate(length(min = 1, message = "exercise type must not be empty"))]
    pub exercise_type: String,
    /// Session length in seconds.
    #[validate(range(min = 1, message = "duration must be strictly positive"))]
    pub duration_secs: u32,
}

/// Payload used to open a battle against an automatically discovered opponent.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct QuickChallengeRequest {
    /// Exercise label, e.g. "pushups".
    #[validate(length(min = 1, message = "exercise type must not be empty"))]
    pub exercise_type: String,
    /// Session length in seconds.
    #[validate(range(min = 1, message = "duration must be strictly positive"))]
    pub duration_secs: u32,
}

/// Payload carrying a contestant's current absolute rep count.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRepsRequest {
    /// Absolute rep count as seen by the client.
    pub reps: u32,
}

/// Status filter accepted by the battle listing route.
#[derive(Debug, Deserialize, IntoParams)]
pub struct BattleListQuery {
    /// Only return battles currently in this status.
    pub status: Option<BattleStatus>,
}

/// Public projection of a battle exposed to REST and realtime clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BattleSummary {
    /// Battle identifier.
    pub id: Uuid,
    /// User who issued the challenge.
    pub creator_id: Uuid,
    /// User the challenge was issued to.
    pub opponent_id: Uuid,
    /// Exercise label.
    pub exercise_type: String,
    /// Session length in seconds.
    pub duration_secs: u32,
    /// Current lifecycle status.
    pub status: BattleStatus,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 start timestamp, present once active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// RFC 3339 end timestamp, present once terminal via completion/cancellation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    /// Winner on completion; `null` denotes a tie.
    pub winner_id: Option<Uuid>,
}

impl From<Battle> for BattleSummary {
    fn from(value: Battle) -> Self {
        Self {
            id: value.id,
            creator_id: value.creator_id,
            opponent_id: value.opponent_id,
            exercise_type: value.exercise_type,
            duration_secs: value.duration_secs,
            status: value.status,
            created_at: format_system_time(value.created_at),
            started_at: value.started_at.map(format_system_time),
            ended_at: value.ended_at.map(format_system_time),
            winner_id: value.winner_id,
        }
    }
}

/// Public projection of one contestant's rep record.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PerformanceSummary {
    /// Contestant the record belongs to.
    pub user_id: Uuid,
    /// Latest accepted rep count.
    pub reps: u32,
    /// RFC 3339 timestamp of the most recent accepted update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<String>,
}

impl From<Performance> for PerformanceSummary {
    fn from(value: Performance) -> Self {
        Self {
            user_id: value.user_id,
            reps: value.reps,
            last_updated_at: Some(format_system_time(value.last_updated_at)),
        }
    }
}

impl From<TrackedPerformance> for PerformanceSummary {
    fn from(value: TrackedPerformance) -> Self {
        Self {
            user_id: value.user_id,
            reps: value.reps,
            last_updated_at: value.last_updated_at.map(format_system_time),
        }
    }
}

/// Combined live counts for a battle, creator first.
pub fn counts_map(participants: [Uuid; 2], counts: &[TrackedPerformance; 2]) -> IndexMap<Uuid, u32> {
    let mut map = IndexMap::with_capacity(2);
    for user in participants {
        if let Some(tracked) = counts.iter().find(|tracked| tracked.user_id == user) {
            map.insert(user, tracked.reps);
        }
    }
    map
}
