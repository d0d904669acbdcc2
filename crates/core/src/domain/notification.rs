// Notification Key Domain Model
//
// Payloads carried by the entitlement notification queue. Keys are immutable
// once enqueued: redelivery must reproduce the exact same JSON body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::blocking::{BlockingStateId, BlockingType};
use crate::domain::entitlement::{BundleId, EntitlementId};

/// Lifecycle action recorded against an entitlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementAction {
    Change,
    Cancel,
    Pause,
    Resume,
}

impl std::fmt::Display for EntitlementAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntitlementAction::Change => write!(f, "CHANGE"),
            EntitlementAction::Cancel => write!(f, "CANCEL"),
            EntitlementAction::Pause => write!(f, "PAUSE"),
            EntitlementAction::Resume => write!(f, "RESUME"),
        }
    }
}

/// Immediate notification: an entitlement action became effective
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementActionKey {
    pub entitlement_id: EntitlementId,
    pub bundle_id: BundleId,
    pub effective_date: DateTime<Utc>,
    pub action: EntitlementAction,
}

impl EntitlementActionKey {
    pub fn new(
        entitlement_id: EntitlementId,
        bundle_id: BundleId,
        effective_date: DateTime<Utc>,
        action: EntitlementAction,
    ) -> Self {
        Self {
            entitlement_id,
            bundle_id,
            effective_date,
            action,
        }
    }
}

/// Deferred notification: announces a blocking transition once it becomes effective
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingTransitionKey {
    pub blocking_state_id: BlockingStateId,
    pub blockable_id: Uuid,
    pub state_name: String,
    pub service: String,
    pub effective_date: DateTime<Utc>,
    pub blocking_type: BlockingType,
    pub is_transitioned_to_blocked_billing: bool,
    pub is_transitioned_to_unblocked_billing: bool,
    pub is_transitioned_to_blocked_entitlement: bool,
    pub is_transitioned_to_unblocked_entitlement: bool,
}

/// Runtime classification of a notification payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    EntitlementAction,
    BlockingTransition,
}

/// Typed payload of the entitlement queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKey {
    EntitlementAction(EntitlementActionKey),
    BlockingTransition(BlockingTransitionKey),
}

impl NotificationKey {
    pub fn kind(&self) -> NotificationKind {
        match self {
            NotificationKey::EntitlementAction(_) => NotificationKind::EntitlementAction,
            NotificationKey::BlockingTransition(_) => NotificationKind::BlockingTransition,
        }
    }

    pub fn effective_date(&self) -> DateTime<Utc> {
        match self {
            NotificationKey::EntitlementAction(key) => key.effective_date,
            NotificationKey::BlockingTransition(key) => key.effective_date,
        }
    }

    /// Encode into the queue payload representation
    pub fn to_payload(&self) -> serde_json::Result<NotificationPayload> {
        serde_json::to_value(self).map(NotificationPayload::new)
    }
}

impl From<EntitlementActionKey> for NotificationKey {
    fn from(key: EntitlementActionKey) -> Self {
        NotificationKey::EntitlementAction(key)
    }
}

impl From<BlockingTransitionKey> for NotificationKey {
    fn from(key: BlockingTransitionKey) -> Self {
        NotificationKey::BlockingTransition(key)
    }
}

/// Result of classifying a raw payload
#[derive(Debug)]
pub enum DecodedNotification {
    Known(NotificationKey),
    /// Tag unknown to this build, or a body that does not match its tag
    Unrecognized { tag: Option<String>, reason: String },
}

/// Raw JSON body as stored by the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload(serde_json::Value);

impl NotificationPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// The `type` tag, if the payload carries one
    pub fn tag(&self) -> Option<&str> {
        self.0.get("type").and_then(serde_json::Value::as_str)
    }

    pub fn decode(&self) -> DecodedNotification {
        match NotificationKey::deserialize(&self.0) {
            Ok(key) => DecodedNotification::Known(key),
            Err(e) => DecodedNotification::Unrecognized {
                tag: self.tag().map(str::to_string),
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn action_key() -> EntitlementActionKey {
        EntitlementActionKey::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            EntitlementAction::Cancel,
        )
    }

    #[test]
    fn test_key_serializes_with_type_tag() {
        let key = NotificationKey::from(action_key());
        let value = serde_json::to_value(&key).unwrap();

        assert_eq!(value["type"], "ENTITLEMENT_ACTION");
        assert_eq!(value["action"], "CANCEL");
    }

    #[test]
    fn test_redelivered_payload_decodes_to_same_key() {
        let key = NotificationKey::from(action_key());
        let payload = key.to_payload().unwrap();

        match payload.decode() {
            DecodedNotification::Known(decoded) => assert_eq!(decoded, key),
            other => panic!("expected known key, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tag_is_unrecognized() {
        let payload = NotificationPayload::new(json!({"type": "SUBSCRIPTION_EVENT", "id": 1}));

        match payload.decode() {
            DecodedNotification::Unrecognized { tag, .. } => {
                assert_eq!(tag.as_deref(), Some("SUBSCRIPTION_EVENT"))
            }
            other => panic!("expected unrecognized, got {:?}", other),
        }
    }

    #[test]
    fn test_kind_classification() {
        let key = NotificationKey::from(action_key());
        assert_eq!(key.kind(), NotificationKind::EntitlementAction);
    }
}
