use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

/// Message shown to the user when a mutating operation could not be persisted
pub const SAVE_FAILED_MESSAGE: &str = "could not save, try again";

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Invalid star rating: {0} (expected 1-5)")]
    InvalidStarRating(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already ranked: {0}")]
    AlreadyRanked(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Folds a store error raised during a write into `PersistenceFailure`.
    ///
    /// Conflicts are kept as-is so callers can tell a stale snapshot or a duplicate from
    /// a broken store.
    pub fn into_persistence(self) -> Self {
        match self {
            AppError::PersistenceFailure(_)
            | AppError::Conflict(_)
            | AppError::AlreadyRanked(_) => self,
            other => AppError::PersistenceFailure(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidStarRating(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::AlreadyRanked(_) | AppError::Conflict(_) => {
                (StatusCode::CONFLICT, self.to_string())
            }
            AppError::PersistenceFailure(ref reason) => {
                tracing::error!(reason = %reason, "Write failed, nothing was applied");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    SAVE_FAILED_MESSAGE.to_string(),
                )
            }
            AppError::Database(_) | AppError::Cache(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::ExternalApi(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Non-fatal conditions recovered inside the ranking engine.
///
/// These never abort the caller's operation; they are logged and handed back next to
/// the result.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RankingWarning {
    #[error("Tier ordering violation: position {requested} clamped to {clamped}")]
    TierOrderingViolation { requested: u32, clamped: u32 },

    #[error("Repair write failed for {content_item_id}: {reason}")]
    RepairWriteFailure {
        content_item_id: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_persistence_wraps_store_errors() {
        let err = AppError::Internal("disk full".to_string()).into_persistence();
        assert!(matches!(err, AppError::PersistenceFailure(ref m) if m.contains("disk full")));
    }

    #[test]
    fn test_into_persistence_keeps_conflicts() {
        let err = AppError::Conflict("list changed".to_string()).into_persistence();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_persistence_failure_maps_to_retry_message() {
        let response = AppError::PersistenceFailure("boom".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_invalid_star_rating_is_bad_request() {
        let response = AppError::InvalidStarRating(7).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_warning_serializes_with_kind_tag() {
        let warning = RankingWarning::TierOrderingViolation {
            requested: 1,
            clamped: 3,
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "tier_ordering_violation");
        assert_eq!(json["clamped"], 3);
    }
}
