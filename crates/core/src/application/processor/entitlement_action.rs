// Entitlement-Action Processor
//
// Turns an immediate entitlement notification into domain mutations and the
// deferred notifications announcing them.

use crate::application::constants::{ENTITLEMENT_SERVICE_NAME, NOTIFICATION_QUEUE_NAME};
use crate::domain::{
    DomainError, Entitlement, EntitlementAction, EntitlementActionKey, InternalCallContext,
    NotificationKey,
};
use crate::error::Result;
use crate::port::{
    BlockingStateDao, EntitlementInternalApi, FutureNotification, IdProvider,
    NotificationQueueService, TimeProvider,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct EntitlementActionProcessor {
    entitlement_api: Arc<dyn EntitlementInternalApi>,
    blocking_state_dao: Arc<dyn BlockingStateDao>,
    queue_service: Arc<dyn NotificationQueueService>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl EntitlementActionProcessor {
    pub fn new(
        entitlement_api: Arc<dyn EntitlementInternalApi>,
        blocking_state_dao: Arc<dyn BlockingStateDao>,
        queue_service: Arc<dyn NotificationQueueService>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            entitlement_api,
            blocking_state_dao,
            queue_service,
            id_provider,
            time_provider,
        }
    }

    pub async fn handle(&self, key: &EntitlementActionKey, context: &InternalCallContext) -> Result<()> {
        let entitlement = self
            .entitlement_api
            .get_entitlement_for_id(key.entitlement_id, context)
            .await?;
        ensure_matches_key(&entitlement, key)?;

        info!(
            entitlement_id = %key.entitlement_id,
            bundle_id = %key.bundle_id,
            action = %key.action,
            effective_date = %key.effective_date,
            "Processing entitlement notification"
        );

        match key.action {
            EntitlementAction::Change | EntitlementAction::Cancel => {
                self.block_add_ons_if_required(key, &entitlement, context).await
            }
            EntitlementAction::Pause => {
                self.entitlement_api
                    .pause(key.bundle_id, context.to_local_date(key.effective_date), &[], context)
                    .await
            }
            EntitlementAction::Resume => {
                self.entitlement_api
                    .resume(key.bundle_id, context.to_local_date(key.effective_date), &[], context)
                    .await
            }
        }
    }

    async fn block_add_ons_if_required(
        &self,
        key: &EntitlementActionKey,
        entitlement: &Entitlement,
        context: &InternalCallContext,
    ) -> Result<()> {
        let plan = entitlement.compute_add_on_blocking_states(
            key.effective_date,
            self.time_provider.now(),
            || self.id_provider.generate_id(),
        );
        if plan.is_empty() {
            debug!(entitlement_id = %entitlement.id, "No add-on to block");
            return Ok(());
        }

        // Record the new states first, then the notifications announcing them
        self.blocking_state_dao
            .set_blocking_states_and_post_blocking_transition_event(
                &plan.blocking_states,
                entitlement.bundle_id,
                context,
            )
            .await?;

        for transition in plan.notifications {
            self.record_future_notification(key.effective_date, transition.into(), context)
                .await?;
        }

        info!(
            entitlement_id = %entitlement.id,
            blocking_states = plan.blocking_states.len(),
            "Add-on blocking states recorded"
        );
        Ok(())
    }

    async fn record_future_notification(
        &self,
        effective_date: DateTime<Utc>,
        key: NotificationKey,
        context: &InternalCallContext,
    ) -> Result<()> {
        let queue = self
            .queue_service
            .get_notification_queue(ENTITLEMENT_SERVICE_NAME, NOTIFICATION_QUEUE_NAME)
            .await?;

        queue
            .record_future_notification(FutureNotification {
                effective_date,
                payload: key.to_payload()?,
                user_token: context.user_token,
                account_record_id: context.account_record_id,
                tenant_record_id: context.tenant_record_id,
                attempt: 0,
            })
            .await
    }
}

/// Reject an entitlement that is not the one the key was recorded for
fn ensure_matches_key(entitlement: &Entitlement, key: &EntitlementActionKey) -> Result<()> {
    let reason = if entitlement.id != key.entitlement_id {
        format!("resolved entitlement {} instead", entitlement.id)
    } else if entitlement.bundle_id != key.bundle_id {
        format!(
            "entitlement belongs to bundle {}, notification names bundle {}",
            entitlement.bundle_id, key.bundle_id
        )
    } else {
        return Ok(());
    };

    error!(
        entitlement_id = %key.entitlement_id,
        reason = %reason,
        "Error retrieving entitlement, unexpected entitlement"
    );
    Err(DomainError::UnexpectedEntitlement {
        entitlement_id: key.entitlement_id,
        reason,
    }
    .into())
}
