// Blocking-Transition Processor
//
// Turns a fired deferred notification into a bus event, unless the blocking
// state it announces no longer exists.

use crate::domain::{
    BlockingTransitionInternalEvent, BlockingTransitionKey, BusEvent, InternalCallContext,
};
use crate::error::Result;
use crate::port::{BlockingStateDao, PersistentBus};
use std::sync::Arc;
use tracing::{debug, info};

pub struct BlockingTransitionProcessor {
    blocking_state_dao: Arc<dyn BlockingStateDao>,
    event_bus: Arc<dyn PersistentBus>,
}

impl BlockingTransitionProcessor {
    pub fn new(blocking_state_dao: Arc<dyn BlockingStateDao>, event_bus: Arc<dyn PersistentBus>) -> Self {
        Self {
            blocking_state_dao,
            event_bus,
        }
    }

    pub async fn handle(&self, key: &BlockingTransitionKey, context: &InternalCallContext) -> Result<()> {
        // Deleted or superseded since the notification was scheduled
        if self
            .blocking_state_dao
            .get_by_id(key.blocking_state_id, context)
            .await?
            .is_none()
        {
            debug!(
                blocking_state_id = %key.blocking_state_id,
                "BlockingState has been deleted, not sending a bus event"
            );
            return Ok(());
        }

        let event = BusEvent::BlockingTransition(transition_event(key, context));
        self.event_bus.post(event).await?;

        info!(
            blocking_state_id = %key.blocking_state_id,
            blockable_id = %key.blockable_id,
            state_name = %key.state_name,
            "Blocking transition event posted"
        );
        Ok(())
    }
}

/// Snapshot of the key; account, tenant and token come from the delivery context
fn transition_event(
    key: &BlockingTransitionKey,
    context: &InternalCallContext,
) -> BlockingTransitionInternalEvent {
    BlockingTransitionInternalEvent {
        blockable_id: key.blockable_id,
        state_name: key.state_name.clone(),
        service: key.service.clone(),
        effective_date: key.effective_date,
        blocking_type: key.blocking_type,
        is_transitioned_to_blocked_billing: key.is_transitioned_to_blocked_billing,
        is_transitioned_to_unblocked_billing: key.is_transitioned_to_unblocked_billing,
        is_transitioned_to_blocked_entitlement: key.is_transitioned_to_blocked_entitlement,
        is_transitioned_to_unblocked_entitlement: key.is_transitioned_to_unblocked_entitlement,
        search_key1: context.account_record_id,
        search_key2: context.tenant_record_id,
        user_token: context.user_token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BlockingState, BlockingType, CallOrigin, UserType};
    use crate::error::AppError;
    use crate::port::blocking_state_dao::mocks::RecordingBlockingStateDao;
    use crate::port::event_bus::mocks::RecordingBus;
    use chrono::{FixedOffset, TimeZone, Utc};
    use uuid::Uuid;

    fn context(account: i64, tenant: i64, token: Uuid) -> InternalCallContext {
        InternalCallContext {
            tenant_record_id: Some(tenant),
            account_record_id: Some(account),
            user_token: Some(token),
            created_by: "EntitlementQueue".to_string(),
            call_origin: CallOrigin::Internal,
            user_type: UserType::System,
            time_zone: FixedOffset::east_opt(0).unwrap(),
        }
    }

    fn stored_state() -> BlockingState {
        BlockingState {
            id: Uuid::new_v4(),
            blocked_id: Uuid::new_v4(),
            blocking_type: BlockingType::Subscription,
            state_name: "ENT_CANCELLED".to_string(),
            service: "entitlement-service".to_string(),
            block_change: true,
            block_entitlement: true,
            block_billing: true,
            effective_date: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        }
    }

    fn key_for(state: &BlockingState) -> BlockingTransitionKey {
        BlockingTransitionKey {
            blocking_state_id: state.id,
            blockable_id: state.blocked_id,
            state_name: state.state_name.clone(),
            service: state.service.clone(),
            effective_date: state.effective_date,
            blocking_type: state.blocking_type,
            is_transitioned_to_blocked_billing: true,
            is_transitioned_to_unblocked_billing: false,
            is_transitioned_to_blocked_entitlement: true,
            is_transitioned_to_unblocked_entitlement: false,
        }
    }

    #[tokio::test]
    async fn test_event_mirrors_key_and_current_context() {
        let dao = Arc::new(RecordingBlockingStateDao::new());
        let bus = Arc::new(RecordingBus::new());
        let state = stored_state();
        dao.insert(state.clone());
        let processor = BlockingTransitionProcessor::new(dao, bus.clone());

        let token = Uuid::new_v4();
        let key = key_for(&state);
        processor.handle(&key, &context(11, 22, token)).await.unwrap();

        let events = bus.events();
        assert_eq!(events.len(), 1);
        let BusEvent::BlockingTransition(event) = &events[0] else {
            panic!("expected blocking transition event, got {:?}", events[0]);
        };
        assert_eq!(event.blockable_id, state.blocked_id);
        assert_eq!(event.state_name, "ENT_CANCELLED");
        assert_eq!(event.service, "entitlement-service");
        assert_eq!(event.effective_date, state.effective_date);
        assert_eq!(event.blocking_type, BlockingType::Subscription);
        assert!(event.is_transitioned_to_blocked_billing);
        assert!(!event.is_transitioned_to_unblocked_billing);
        assert!(event.is_transitioned_to_blocked_entitlement);
        assert!(!event.is_transitioned_to_unblocked_entitlement);
        assert_eq!(event.search_key1, Some(11));
        assert_eq!(event.search_key2, Some(22));
        assert_eq!(event.user_token, Some(token));
    }

    #[tokio::test]
    async fn test_deleted_state_posts_nothing() {
        let dao = Arc::new(RecordingBlockingStateDao::new());
        let bus = Arc::new(RecordingBus::new());
        let state = stored_state();
        dao.insert(state.clone());
        dao.delete(state.id);
        let processor = BlockingTransitionProcessor::new(dao, bus.clone());

        let result = processor
            .handle(&key_for(&state), &context(1, 1, Uuid::new_v4()))
            .await;

        assert!(result.is_ok());
        assert!(bus.events().is_empty());
    }

    #[tokio::test]
    async fn test_bus_failure_propagates() {
        let dao = Arc::new(RecordingBlockingStateDao::new());
        let bus = Arc::new(RecordingBus::new());
        let state = stored_state();
        dao.insert(state.clone());
        bus.set_unavailable(true);
        let processor = BlockingTransitionProcessor::new(dao, bus);

        let result = processor
            .handle(&key_for(&state), &context(1, 1, Uuid::new_v4()))
            .await;

        assert!(matches!(result, Err(AppError::EventBus(_))));
    }
}
