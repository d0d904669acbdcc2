// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("Notification queue already exists: {service_name}:{queue_name}")]
    QueueAlreadyExists {
        service_name: String,
        queue_name: String,
    },

    #[error("No such notification queue: {service_name}:{queue_name}")]
    NoSuchQueue {
        service_name: String,
        queue_name: String,
    },

    #[error("Notification queue error: {0}")]
    Queue(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Queue registry and transport failures: misconfiguration or unavailable
    /// infrastructure, outside the per-notification retry taxonomy
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::QueueAlreadyExists { .. } | AppError::NoSuchQueue { .. } | AppError::Queue(_)
        )
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in infra-sqlite crate
// by converting to AppError::Database(String)
