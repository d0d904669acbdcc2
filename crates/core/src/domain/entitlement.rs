// Entitlement Domain Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::blocking::{BlockingState, BlockingType};
use crate::domain::notification::BlockingTransitionKey;

/// Entitlement ID (UUID v4)
pub type EntitlementId = Uuid;

/// Subscription bundle ID (UUID v4)
pub type BundleId = Uuid;

/// Service name owning the entitlement blocking states and queue
pub const ENTITLEMENT_SERVICE_NAME: &str = "entitlement-service";

/// Add-on blocked because its base was cancelled or changed away from it
pub const ENT_CANCELLED: &str = "ENT_CANCELLED";

/// Bundle paused
pub const ENT_BLOCKED: &str = "ENT_BLOCKED";

/// Bundle resumed
pub const ENT_CLEAR: &str = "ENT_CLEAR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductCategory {
    Base,
    AddOn,
    Standalone,
}

impl std::fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductCategory::Base => write!(f, "BASE"),
            ProductCategory::AddOn => write!(f, "ADD_ON"),
            ProductCategory::Standalone => write!(f, "STANDALONE"),
        }
    }
}

impl std::str::FromStr for ProductCategory {
    type Err = crate::domain::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BASE" => Ok(ProductCategory::Base),
            "ADD_ON" => Ok(ProductCategory::AddOn),
            "STANDALONE" => Ok(ProductCategory::Standalone),
            other => Err(crate::domain::DomainError::ValidationError(format!(
                "unknown product category: {}",
                other
            ))),
        }
    }
}

/// Opaque key/value pair forwarded to pause/resume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginProperty {
    pub key: String,
    pub value: serde_json::Value,
}

/// Add-on subscription attached to the same bundle as a base entitlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOn {
    pub id: EntitlementId,
    /// Whether the current base plan still offers this add-on
    pub available_on_base_plan: bool,
    /// Already blocked by a previous ENT_CANCELLED state
    pub blocked: bool,
}

/// Entitlement as loaded for notification processing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub id: EntitlementId,
    pub bundle_id: BundleId,
    pub category: ProductCategory,
    pub cancelled_date: Option<DateTime<Utc>>,
    pub add_ons: Vec<AddOn>,
}

/// Blocking states to persist for add-ons plus the keys announcing future transitions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOnBlockingPlan {
    pub blocking_states: Vec<BlockingState>,
    pub notifications: Vec<BlockingTransitionKey>,
}

impl AddOnBlockingPlan {
    pub fn is_empty(&self) -> bool {
        self.blocking_states.is_empty()
    }
}

impl Entitlement {
    fn is_cancelled_at(&self, effective_date: DateTime<Utc>) -> bool {
        self.cancelled_date
            .map(|cancelled| cancelled <= effective_date)
            .unwrap_or(false)
    }

    /// Compute the add-on blocking states implied by a CHANGE or CANCEL of this entitlement.
    ///
    /// Only base entitlements carry add-ons. When the base is cancelled as of
    /// `effective_date`, every unblocked add-on is blocked; otherwise only the
    /// add-ons the (changed) base plan no longer offers are. Transitions that
    /// become effective after `now` get a `BlockingTransitionKey` so they can be
    /// announced when they fire.
    pub fn compute_add_on_blocking_states(
        &self,
        effective_date: DateTime<Utc>,
        now: DateTime<Utc>,
        mut next_id: impl FnMut() -> Uuid,
    ) -> AddOnBlockingPlan {
        let mut plan = AddOnBlockingPlan::default();
        if self.category != ProductCategory::Base {
            return plan;
        }

        let base_cancelled = self.is_cancelled_at(effective_date);
        for add_on in &self.add_ons {
            if add_on.blocked || (!base_cancelled && add_on.available_on_base_plan) {
                continue;
            }

            let state = BlockingState {
                id: next_id(),
                blocked_id: add_on.id,
                blocking_type: BlockingType::Subscription,
                state_name: ENT_CANCELLED.to_string(),
                service: ENTITLEMENT_SERVICE_NAME.to_string(),
                block_change: true,
                block_entitlement: true,
                block_billing: true,
                effective_date,
            };

            if effective_date > now {
                plan.notifications.push(BlockingTransitionKey {
                    blocking_state_id: state.id,
                    blockable_id: state.blocked_id,
                    state_name: state.state_name.clone(),
                    service: state.service.clone(),
                    effective_date,
                    blocking_type: state.blocking_type,
                    is_transitioned_to_blocked_billing: true,
                    is_transitioned_to_unblocked_billing: false,
                    is_transitioned_to_blocked_entitlement: true,
                    is_transitioned_to_unblocked_entitlement: false,
                });
            }
            plan.blocking_states.push(state);
        }
        plan
    }
}
