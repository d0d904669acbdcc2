// Domain Error Types

use thiserror::Error;

use crate::domain::entitlement::EntitlementId;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Entitlement not found: {0}")]
    EntitlementNotFound(EntitlementId),

    #[error("Entitlement {entitlement_id} does not match notification: {reason}")]
    UnexpectedEntitlement {
        entitlement_id: EntitlementId,
        reason: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
