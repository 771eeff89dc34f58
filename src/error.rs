use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures of the tracking engine.
///
/// Every variant except `Database` is an expected condition the caller can
/// render to the user. Only `Busy` may be retried without changing the request.
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Unknown status: {0}")]
    InvalidStatus(String),

    #[error("Card {card} is at {actual}, not {expected}")]
    InvalidTransition {
        card: String,
        expected: String,
        actual: String,
    },

    #[error("Card {card} is already at {status}")]
    NoOp { card: String, status: String },

    #[error("Operation {0} is already cancelled")]
    AlreadyCancelled(i64),

    #[error("Operation {id} is not the latest active operation of card {card}")]
    NotReversible { id: i64, card: String },

    #[error("Card {0} is quarantined")]
    Quarantined(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} is busy, retry later")]
    Busy(String),

    #[error("No {0} configured")]
    NotConfigured(&'static str),

    // Built by `classify_db_error` only, so lock contention never lands here
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl TrackingError {
    /// Stable machine-readable code surfaced in HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            TrackingError::NotFound(_) => "not_found",
            TrackingError::Validation(_) => "validation",
            TrackingError::InvalidStatus(_) => "invalid_status",
            TrackingError::InvalidTransition { .. } => "invalid_transition",
            TrackingError::NoOp { .. } => "no_op",
            TrackingError::AlreadyCancelled(_) => "already_cancelled",
            TrackingError::NotReversible { .. } => "not_reversible",
            TrackingError::Quarantined(_) => "quarantined",
            TrackingError::AlreadyExists(_) => "already_exists",
            TrackingError::Busy(_) => "busy",
            TrackingError::NotConfigured(_) => "not_configured",
            TrackingError::Database(_) => "database",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TrackingError::Busy(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            TrackingError::NotFound(_) => StatusCode::NOT_FOUND,
            TrackingError::Validation(_) => StatusCode::BAD_REQUEST,
            TrackingError::InvalidStatus(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TrackingError::InvalidTransition { .. }
            | TrackingError::NoOp { .. }
            | TrackingError::AlreadyCancelled(_)
            | TrackingError::NotReversible { .. }
            | TrackingError::AlreadyExists(_) => StatusCode::CONFLICT,
            TrackingError::Quarantined(_) => StatusCode::LOCKED,
            TrackingError::Busy(_) | TrackingError::NotConfigured(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            TrackingError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to an end user. Database details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            TrackingError::Database(_) => "Database error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Maps driver errors to `Busy` when they signal lock or pool contention.
///
/// `subject` names what was busy, e.g. `Card A23` or `Store`.
pub fn classify_db_error(err: sqlx::Error, subject: &str) -> TrackingError {
    match &err {
        sqlx::Error::PoolTimedOut => TrackingError::Busy(subject.to_string()),
        // 55P03 lock_not_available, 40001 serialization_failure, 40P01 deadlock_detected
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some("55P03" | "40001" | "40P01")) =>
        {
            TrackingError::Busy(subject.to_string())
        }
        _ => TrackingError::Database(err),
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error("Unauthorized")]
    Unauthorized,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Tracking(TrackingError::Database(e)) = &self {
            tracing::error!(error = %e, "Database failure while serving request");
        }

        let (status, code, message) = match &self {
            AppError::Tracking(e) => (e.status_code(), e.code(), e.public_message()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Unauthorized".to_string(),
            ),
        };

        let body = Json(json!({
            "error": code,
            "message": message,
        }));

        if matches!(self, AppError::Tracking(ref e) if e.is_retryable()) {
            return (status, [(header::RETRY_AFTER, "1")], body).into_response();
        }

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
