// Notification Dispatcher
//
// Routes a delivered notification to its processor and translates failures
// into the two-valued taxonomy understood by the retry layer. It never
// retries on its own.

use crate::application::constants::QUEUE_USER_NAME;
use crate::application::processor::{BlockingTransitionProcessor, EntitlementActionProcessor};
use crate::domain::{CallOrigin, DecodedNotification, NotificationKey, UserType};
use crate::error::AppError;
use crate::port::{HandlerError, InternalCallContextFactory, NotificationQueueHandler, ReadyNotification};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, warn};

pub struct EntitlementNotificationDispatcher {
    context_factory: Arc<dyn InternalCallContextFactory>,
    entitlement_processor: EntitlementActionProcessor,
    blocking_processor: BlockingTransitionProcessor,
}

impl EntitlementNotificationDispatcher {
    pub fn new(
        context_factory: Arc<dyn InternalCallContextFactory>,
        entitlement_processor: EntitlementActionProcessor,
        blocking_processor: BlockingTransitionProcessor,
    ) -> Self {
        Self {
            context_factory,
            entitlement_processor,
            blocking_processor,
        }
    }

    pub async fn on_ready(&self, notification: ReadyNotification) -> Result<(), HandlerError> {
        // A null payload can never become valid on redelivery: drop it
        let payload = match notification.payload {
            Some(payload) if !payload.is_null() => payload,
            _ => {
                error!("Entitlement service received an unexpected null event");
                return Ok(());
            }
        };

        let key = match payload.decode() {
            DecodedNotification::Known(key) => key,
            DecodedNotification::Unrecognized { tag, reason } => {
                error!(
                    tag = tag.as_deref().unwrap_or("<none>"),
                    reason = %reason,
                    "Entitlement service received an unexpected event"
                );
                return Err(HandlerError::Retry(AppError::Internal(format!(
                    "unrecognized notification: {}",
                    reason
                ))));
            }
        };

        let context = self
            .context_factory
            .create_internal_call_context(
                notification.tenant_record_id,
                notification.account_record_id,
                QUEUE_USER_NAME,
                CallOrigin::Internal,
                UserType::System,
                notification.user_token,
            )
            .await
            .map_err(HandlerError::Retry)?;

        let result = match &key {
            NotificationKey::EntitlementAction(action) => {
                self.entitlement_processor.handle(action, &context).await
            }
            NotificationKey::BlockingTransition(transition) => {
                self.blocking_processor.handle(transition, &context).await
            }
        };

        result.map_err(|e| {
            warn!(
                kind = ?key.kind(),
                effective_date = %key.effective_date(),
                attempt = notification.attempt,
                error = %e,
                "Entitlement notification processing failed"
            );
            HandlerError::classify(e)
        })
    }
}

#[async_trait]
impl NotificationQueueHandler for EntitlementNotificationDispatcher {
    async fn handle_ready_notification(
        &self,
        notification: ReadyNotification,
    ) -> Result<(), HandlerError> {
        self.on_ready(notification).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BlockingState, BlockingTransitionKey, BlockingType, EntitlementAction,
        EntitlementActionKey, NotificationPayload,
    };
    use crate::port::blocking_state_dao::mocks::RecordingBlockingStateDao;
    use crate::port::entitlement_api::MockEntitlementInternalApi;
    use crate::port::event_bus::mocks::RecordingBus;
    use crate::port::id_provider::UuidProvider;
    use crate::port::notification_queue::mocks::RecordingQueueService;
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::FixedOffsetCallContextFactory;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    struct Harness {
        dispatcher: EntitlementNotificationDispatcher,
        dao: Arc<RecordingBlockingStateDao>,
        bus: Arc<RecordingBus>,
    }

    fn harness(api: MockEntitlementInternalApi) -> Harness {
        let dao = Arc::new(RecordingBlockingStateDao::new());
        let bus = Arc::new(RecordingBus::new());
        let entitlement_processor = EntitlementActionProcessor::new(
            Arc::new(api),
            dao.clone(),
            Arc::new(RecordingQueueService::new()),
            Arc::new(UuidProvider),
            Arc::new(SystemTimeProvider),
        );
        let blocking_processor = BlockingTransitionProcessor::new(dao.clone(), bus.clone());
        Harness {
            dispatcher: EntitlementNotificationDispatcher::new(
                Arc::new(FixedOffsetCallContextFactory::utc()),
                entitlement_processor,
                blocking_processor,
            ),
            dao,
            bus,
        }
    }

    fn ready(payload: Option<NotificationPayload>) -> ReadyNotification {
        ReadyNotification {
            payload,
            effective_date: Utc::now(),
            user_token: Some(Uuid::new_v4()),
            account_record_id: Some(5),
            tenant_record_id: Some(6),
            attempt: 0,
        }
    }

    fn stored_transition(dao: &RecordingBlockingStateDao) -> BlockingTransitionKey {
        let state = BlockingState {
            id: Uuid::new_v4(),
            blocked_id: Uuid::new_v4(),
            blocking_type: BlockingType::Subscription,
            state_name: "ENT_CANCELLED".to_string(),
            service: "entitlement-service".to_string(),
            block_change: true,
            block_entitlement: true,
            block_billing: true,
            effective_date: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        };
        dao.insert(state.clone());
        BlockingTransitionKey {
            blocking_state_id: state.id,
            blockable_id: state.blocked_id,
            state_name: state.state_name,
            service: state.service,
            effective_date: state.effective_date,
            blocking_type: state.blocking_type,
            is_transitioned_to_blocked_billing: true,
            is_transitioned_to_unblocked_billing: false,
            is_transitioned_to_blocked_entitlement: true,
            is_transitioned_to_unblocked_entitlement: false,
        }
    }

    #[tokio::test]
    async fn test_null_payload_is_terminal() {
        let h = harness(MockEntitlementInternalApi::new());

        assert!(h.dispatcher.on_ready(ready(None)).await.is_ok());
        assert!(h
            .dispatcher
            .on_ready(ready(Some(NotificationPayload::new(serde_json::Value::Null))))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unrecognized_variant_is_retryable() {
        let h = harness(MockEntitlementInternalApi::new());
        let payload = NotificationPayload::new(json!({"type": "OVERDUE_CHECK", "account": 1}));

        let result = h.dispatcher.on_ready(ready(Some(payload))).await;

        assert!(matches!(result, Err(HandlerError::Retry(_))));
    }

    #[tokio::test]
    async fn test_blocking_transition_routes_to_bus() {
        let h = harness(MockEntitlementInternalApi::new());
        let key = NotificationKey::from(stored_transition(&h.dao));

        let notification = ready(Some(key.to_payload().unwrap()));
        let token = notification.user_token;
        h.dispatcher.on_ready(notification).await.unwrap();

        let events = h.bus.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_token(), token);
    }

    #[tokio::test]
    async fn test_bus_failure_becomes_retryable() {
        let h = harness(MockEntitlementInternalApi::new());
        let key = NotificationKey::from(stored_transition(&h.dao));
        h.bus.set_unavailable(true);

        let result = h.dispatcher.on_ready(ready(Some(key.to_payload().unwrap()))).await;

        assert!(matches!(result, Err(HandlerError::Retry(AppError::EventBus(_)))));
    }

    #[tokio::test]
    async fn test_entitlement_lookup_failure_becomes_retryable() {
        let mut api = MockEntitlementInternalApi::new();
        api.expect_get_entitlement_for_id()
            .returning(|id, _| Err(AppError::NotFound(format!("entitlement {}", id))));
        let h = harness(api);
        let key = NotificationKey::from(EntitlementActionKey::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now(),
            EntitlementAction::Cancel,
        ));

        let result = h.dispatcher.on_ready(ready(Some(key.to_payload().unwrap()))).await;

        assert!(matches!(result, Err(HandlerError::Retry(AppError::NotFound(_)))));
        assert!(h.bus.events().is_empty());
    }
}
