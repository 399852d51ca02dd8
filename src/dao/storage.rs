use std::error::Error;

use thiserror::Error;
use uuid::Uuid;

use crate::state::machine::BattleStatus;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or the operation failed mid-flight.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failed operation.
        message: String,
        /// Backend-specific cause.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// An optimistic write observed a different status than it expected.
    #[error("write conflict on battle `{battle_id}`: expected {expected:?}, found {found:?}")]
    Conflict {
        /// Battle whose record was contended.
        battle_id: Uuid,
        /// Status the writer based its update on.
        expected: BattleStatus,
        /// Status actually on record.
        found: BattleStatus,
    },
    /// The targeted battle does not exist.
    #[error("battle `{0}` does not exist")]
    Missing(Uuid),
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
