use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::machine::InvalidTransition,
    state::tracker::TrackerError,
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Caller lacks the required relationship to the battle.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested battle or performance was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The state machine rejected the requested move.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// A rep submission arrived for a battle with no live session.
    #[error("battle `{0}` is not active")]
    BattleNotActive(Uuid),
    /// A rep submission carried a value not greater than the stored one.
    #[error("stale update: stored rep count is already {current}")]
    StaleUpdate {
        /// Rep count currently on record.
        current: u32,
    },
    /// Opponent discovery produced no candidate for a quick challenge.
    #[error("no nearby opponent available")]
    NoOpponentFound,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Missing(id) => ServiceError::NotFound(format!("battle `{id}` not found")),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Request lacks a valid caller identity.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller is authenticated but not allowed to act on this battle.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with the battle's current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {err}"))
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::InvalidTransition(invalid) => AppError::Conflict(invalid.to_string()),
            err @ ServiceError::BattleNotActive(_) => AppError::Conflict(err.to_string()),
            err @ ServiceError::StaleUpdate { .. } => AppError::Conflict(err.to_string()),
            err @ ServiceError::NoOpponentFound => AppError::NotFound(err.to_string()),
        }
    }
}

/// Map a tracker rejection onto the service taxonomy for one battle.
pub fn tracker_error(battle_id: Uuid, err: TrackerError) -> ServiceError {
    match err {
        TrackerError::Sealed => ServiceError::BattleNotActive(battle_id),
        TrackerError::Stale { current } => ServiceError::StaleUpdate { current },
        TrackerError::UnknownParticipant => {
            ServiceError::Forbidden("caller is not a contestant in this battle".into())
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
