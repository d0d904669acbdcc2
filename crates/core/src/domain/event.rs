// Bus Event Domain Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::blocking::{BlockingState, BlockingType};
use crate::domain::entitlement::BundleId;

/// Announces that a blocking transition became effective
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingTransitionInternalEvent {
    pub blockable_id: Uuid,
    pub state_name: String,
    pub service: String,
    pub effective_date: DateTime<Utc>,
    pub blocking_type: BlockingType,
    pub is_transitioned_to_blocked_billing: bool,
    pub is_transitioned_to_unblocked_billing: bool,
    pub is_transitioned_to_blocked_entitlement: bool,
    pub is_transitioned_to_unblocked_entitlement: bool,
    pub search_key1: Option<i64>, // account record id
    pub search_key2: Option<i64>, // tenant record id
    pub user_token: Option<Uuid>,
}

/// Internal signal posted in the same transaction that persists blocking states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingStatesChangedEvent {
    pub bundle_id: BundleId,
    pub blocking_states: Vec<BlockingState>,
    pub search_key1: Option<i64>,
    pub search_key2: Option<i64>,
    pub user_token: Option<Uuid>,
}

/// Events published on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusEvent {
    BlockingTransition(BlockingTransitionInternalEvent),
    BlockingStatesChanged(BlockingStatesChangedEvent),
}

impl BusEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            BusEvent::BlockingTransition(_) => "BLOCKING_TRANSITION",
            BusEvent::BlockingStatesChanged(_) => "BLOCKING_STATES_CHANGED",
        }
    }

    pub fn user_token(&self) -> Option<Uuid> {
        match self {
            BusEvent::BlockingTransition(e) => e.user_token,
            BusEvent::BlockingStatesChanged(e) => e.user_token,
        }
    }
}
