// Blocking State Domain Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Blocking state ID (UUID v4)
pub type BlockingStateId = Uuid;

/// Kind of entity a blocking state applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockingType {
    Account,
    SubscriptionBundle,
    Subscription,
}

impl std::fmt::Display for BlockingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockingType::Account => write!(f, "ACCOUNT"),
            BlockingType::SubscriptionBundle => write!(f, "SUBSCRIPTION_BUNDLE"),
            BlockingType::Subscription => write!(f, "SUBSCRIPTION"),
        }
    }
}

impl std::str::FromStr for BlockingType {
    type Err = crate::domain::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACCOUNT" => Ok(BlockingType::Account),
            "SUBSCRIPTION_BUNDLE" => Ok(BlockingType::SubscriptionBundle),
            "SUBSCRIPTION" => Ok(BlockingType::Subscription),
            other => Err(crate::domain::DomainError::ValidationError(format!(
                "unknown blocking type: {}",
                other
            ))),
        }
    }
}

/// Point-in-time block/unblock directive for a blockable entity and a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingState {
    pub id: BlockingStateId,
    pub blocked_id: Uuid,
    pub blocking_type: BlockingType,
    pub state_name: String,
    pub service: String,
    pub block_change: bool,
    pub block_entitlement: bool,
    pub block_billing: bool,
    pub effective_date: DateTime<Utc>,
}

impl BlockingState {
    /// Natural key used to upsert the state on re-entry
    pub fn natural_key(&self) -> (Uuid, &str, &str, DateTime<Utc>) {
        (
            self.blocked_id,
            self.service.as_str(),
            self.state_name.as_str(),
            self.effective_date,
        )
    }
}
