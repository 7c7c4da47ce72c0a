use axum::http::StatusCode;
use thiserror::Error;

use super::models::SignalResult;

/// Failures surfaced by a storage backend. Missing rows are not errors;
/// lookups return `None` and id-targeted updates return `None`/`false`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("username already taken: {0}")]
    UsernameTaken(String),

    #[error("user {0} does not exist")]
    UnknownUser(i32),

    #[error("signal {id} is already resolved as {current}")]
    AlreadyResolved { id: i32, current: SignalResult },

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn status(&self) -> StatusCode {
        match self {
            StorageError::UsernameTaken(_) | StorageError::AlreadyResolved { .. } => {
                StatusCode::CONFLICT
            }
            StorageError::UnknownUser(_) => StatusCode::BAD_REQUEST,
            StorageError::Corrupt(_) | StorageError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Handler rejection for a storage failure. Server-side failures are logged here.
pub fn rejection(e: StorageError) -> (StatusCode, String) {
    let status = e.status();
    if status.is_server_error() {
        tracing::error!(error = %e, "storage failure");
    }
    (status, e.to_string())
}
