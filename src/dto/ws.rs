use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Messages accepted from observer WebSocket clients.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Follow a battle's realtime events.
    Subscribe {
        /// Battle to follow.
        battle_id: Uuid,
    },
    /// Stop following a battle.
    Unsubscribe {
        /// Battle to stop following.
        battle_id: Uuid,
    },
    /// Submit the caller's current rep count for an active battle.
    SubmitReps {
        /// Battle the count belongs to.
        battle_id: Uuid,
        /// Absolute rep count as seen by the client.
        reps: u32,
    },
}

/// Per-frame feedback pushed back on the observer channel.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Positive acknowledgement of an inbound frame.
    Ack {
        /// Battle the acknowledged frame referred to.
        battle_id: Uuid,
    },
    /// Rejection of an inbound frame, with a reason the client can reconcile
    /// its local counter against.
    Error {
        /// Battle the rejected frame referred to, when it could be parsed.
        battle_id: Option<Uuid>,
        /// Human-readable rejection reason.
        message: String,
    },
}
