use std::fmt;

use rusqlite;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

/// Failure classification for the narrative collaborator. Configuration
/// codes mean the provider cannot be called at all; the rest are
/// invocation failures. Every analytics component treats both classes as
/// non-fatal and substitutes deterministic fallback text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrativeErrorCode {
    MissingApiKey,
    Forbidden,
    HttpTimeout,
    RateLimited,
    InvalidResponse,
    InvalidRequest,
    ProviderUnavailable,
    Unknown,
}

impl NarrativeErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            NarrativeErrorCode::MissingApiKey => "MISSING_API_KEY",
            NarrativeErrorCode::Forbidden => "FORBIDDEN",
            NarrativeErrorCode::HttpTimeout => "HTTP_TIMEOUT",
            NarrativeErrorCode::RateLimited => "RATE_LIMITED",
            NarrativeErrorCode::InvalidResponse => "INVALID_RESPONSE",
            NarrativeErrorCode::InvalidRequest => "INVALID_REQUEST",
            NarrativeErrorCode::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            NarrativeErrorCode::Unknown => "UNKNOWN_NARRATIVE_ERROR",
        }
    }

    /// True when the failure is a setup problem (credentials missing or
    /// rejected) rather than a transient invocation problem.
    pub fn is_configuration(self) -> bool {
        matches!(
            self,
            NarrativeErrorCode::MissingApiKey | NarrativeErrorCode::Forbidden
        )
    }
}

impl fmt::Display for NarrativeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {message}")]
    Database { message: String },

    #[error("record not found")]
    NotFound,

    #[error("record conflict: {message}")]
    Conflict { message: String },

    #[error("validation failed: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        details: Option<JsonValue>,
    },

    #[error("{message}")]
    Narrative {
        code: NarrativeErrorCode,
        message: String,
        correlation_id: Option<String>,
        details: Option<JsonValue>,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            source: None,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "validation error with details");
        AppError::Validation {
            message,
            source: None,
            details: Some(details),
        }
    }

    pub fn narrative(code: NarrativeErrorCode, message: impl Into<String>) -> Self {
        Self::narrative_with_details(code, message, None, None)
    }

    pub fn narrative_with_details(
        code: NarrativeErrorCode,
        message: impl Into<String>,
        correlation_id: Option<&str>,
        details: Option<JsonValue>,
    ) -> Self {
        let message = message.into();
        let correlation = correlation_id.map(|value| value.to_string());
        match (&correlation, &details) {
            (Some(id), Some(payload)) => {
                warn!(
                    target: "app::narrative::error",
                    code = %code,
                    correlation_id = %id,
                    details = %payload,
                    %message
                );
            }
            (Some(id), None) => {
                warn!(
                    target: "app::narrative::error",
                    code = %code,
                    correlation_id = %id,
                    %message
                );
            }
            (None, Some(payload)) => {
                warn!(target: "app::narrative::error", code = %code, details = %payload, %message);
            }
            (None, None) => {
                warn!(target: "app::narrative::error", code = %code, %message);
            }
        }

        AppError::Narrative {
            code,
            message,
            correlation_id: correlation,
            details,
        }
    }

    pub fn narrative_code(&self) -> Option<NarrativeErrorCode> {
        match self {
            AppError::Narrative { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn narrative_correlation_id(&self) -> Option<&str> {
        match self {
            AppError::Narrative { correlation_id, .. } => correlation_id.as_deref(),
            _ => None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::db", %message, "conflict error");
        AppError::Conflict { message }
    }

    pub fn not_found() -> Self {
        warn!(target: "app::db", "resource not found");
        AppError::NotFound
    }

    pub fn database(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::db", %message, "database error");
        AppError::Database { message }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::Error::{QueryReturnedNoRows, SqliteFailure};
        use rusqlite::ErrorCode;

        match &error {
            QueryReturnedNoRows => AppError::not_found(),
            SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
                AppError::conflict("uniqueness or constraint violation")
            }
            _ => {
                error!(target: "app::db", error = ?error, "sqlite error");
                AppError::database(error.to_string())
            }
        }
    }
}
