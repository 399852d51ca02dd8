use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle states a battle moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BattleStatus {
    /// Challenge issued, waiting for the opponent to respond.
    Pending,
    /// Opponent agreed; the battle can be started.
    Accepted,
    /// Opponent refused the challenge. Terminal.
    Declined,
    /// Both contestants are competing; a live session exists.
    Active,
    /// The battle ran to its end and a winner (or tie) was recorded. Terminal.
    Completed,
    /// A participant called the battle off. Terminal.
    Cancelled,
}

/// Commands that drive the battle lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleCommand {
    /// Opponent accepts the challenge.
    Accept,
    /// Opponent declines the challenge.
    Decline,
    /// Open the live session and start the clock.
    Start,
    /// Finish the session and record the result.
    Complete,
    /// Call the battle off from any non-terminal state.
    Cancel,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {command:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The status the battle was in when the invalid command arrived.
    pub from: BattleStatus,
    /// The command that cannot be applied from this status.
    pub command: BattleCommand,
}

impl BattleStatus {
    /// Whether this status can never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BattleStatus::Declined | BattleStatus::Completed | BattleStatus::Cancelled
        )
    }

    /// Compute the status reached by applying `command`, if the transition is valid.
    ///
    /// The state itself is not mutated; callers commit the returned status only
    /// once the corresponding store write succeeded.
    pub fn apply(self, command: BattleCommand) -> Result<BattleStatus, InvalidTransition> {
        let next = match (self, command) {
            (BattleStatus::Pending, BattleCommand::Accept) => BattleStatus::Accepted,
            (BattleStatus::Pending, BattleCommand::Decline) => BattleStatus::Declined,
            (BattleStatus::Accepted, BattleCommand::Start) => BattleStatus::Active,
            (BattleStatus::Active, BattleCommand::Complete) => BattleStatus::Completed,
            (
                BattleStatus::Pending | BattleStatus::Accepted | BattleStatus::Active,
                BattleCommand::Cancel,
            ) => BattleStatus::Cancelled,
            (from, command) => return Err(InvalidTransition { from, command }),
        };

        Ok(next)
    }
}
