// Entitlement Service - queue lifecycle
//
// Owns the single notification queue handle of the process. State machine:
// Uninitialized -> Created (initialize) -> Started (start) -> Stopped (stop).
// A stopped service may be initialized again, which recreates its queue.

use crate::application::constants::{ENTITLEMENT_SERVICE_NAME, NOTIFICATION_QUEUE_NAME};
use crate::application::dispatcher::EntitlementNotificationDispatcher;
use crate::application::processor::{BlockingTransitionProcessor, EntitlementActionProcessor};
use crate::application::retry::{RetrySchedule, RetryableHandler};
use crate::error::{AppError, Result};
use crate::port::{
    BlockingStateDao, EntitlementInternalApi, IdProvider, InternalCallContextFactory,
    NotificationQueue, NotificationQueueService, PersistentBus, TimeProvider,
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Created,
    Started,
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Uninitialized => "UNINITIALIZED",
            ServiceState::Created => "CREATED",
            ServiceState::Started => "STARTED",
            ServiceState::Stopped => "STOPPED",
        };
        write!(f, "{}", s)
    }
}

/// Everything the dispatcher and its processors are built from
#[derive(Clone)]
pub struct ServiceCollaborators {
    pub queue_service: Arc<dyn NotificationQueueService>,
    pub entitlement_api: Arc<dyn EntitlementInternalApi>,
    pub blocking_state_dao: Arc<dyn BlockingStateDao>,
    pub bus: Arc<dyn PersistentBus>,
    pub context_factory: Arc<dyn InternalCallContextFactory>,
    pub id_provider: Arc<dyn IdProvider>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub retry_schedule: Arc<dyn RetrySchedule>,
}

struct Lifecycle {
    state: ServiceState,
    queue: Option<Arc<dyn NotificationQueue>>,
}

pub struct EntitlementService {
    collaborators: ServiceCollaborators,
    lifecycle: Mutex<Lifecycle>,
}

impl EntitlementService {
    pub fn new(collaborators: ServiceCollaborators) -> Self {
        Self {
            collaborators,
            lifecycle: Mutex::new(Lifecycle {
                state: ServiceState::Uninitialized,
                queue: None,
            }),
        }
    }

    pub async fn state(&self) -> ServiceState {
        self.lifecycle.lock().await.state
    }

    /// Build the dispatcher, wrap it for retries and create the queue.
    /// A queue name collision is fatal: nothing is created or started.
    pub async fn initialize(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        match (lifecycle.state, &lifecycle.queue) {
            (ServiceState::Uninitialized | ServiceState::Stopped, None) => {}
            (ServiceState::Stopped, Some(_)) => {
                return Err(AppError::InvalidState(
                    "initialize requires the previous queue to be deleted, retry stop first"
                        .to_string(),
                ))
            }
            (state, _) => {
                return Err(AppError::InvalidState(format!(
                    "initialize requires {} or {}, service is {}",
                    ServiceState::Uninitialized,
                    ServiceState::Stopped,
                    state
                )))
            }
        }

        let c = &self.collaborators;
        let dispatcher = EntitlementNotificationDispatcher::new(
            Arc::clone(&c.context_factory),
            EntitlementActionProcessor::new(
                Arc::clone(&c.entitlement_api),
                Arc::clone(&c.blocking_state_dao),
                Arc::clone(&c.queue_service),
                Arc::clone(&c.id_provider),
                Arc::clone(&c.time_provider),
            ),
            BlockingTransitionProcessor::new(Arc::clone(&c.blocking_state_dao), Arc::clone(&c.bus)),
        );
        let handler = RetryableHandler::new(
            Arc::new(dispatcher),
            Arc::clone(&c.queue_service),
            ENTITLEMENT_SERVICE_NAME,
            NOTIFICATION_QUEUE_NAME,
            Arc::clone(&c.retry_schedule),
            Arc::clone(&c.time_provider),
        );

        let queue = c
            .queue_service
            .create_notification_queue(
                ENTITLEMENT_SERVICE_NAME,
                NOTIFICATION_QUEUE_NAME,
                Arc::new(handler),
            )
            .await?;

        lifecycle.queue = Some(queue);
        lifecycle.state = ServiceState::Created;
        info!(
            service = ENTITLEMENT_SERVICE_NAME,
            queue = NOTIFICATION_QUEUE_NAME,
            "Entitlement notification queue created"
        );
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let queue = match (&lifecycle.state, &lifecycle.queue) {
            (ServiceState::Created, Some(queue)) => Arc::clone(queue),
            (state, _) => {
                return Err(AppError::InvalidState(format!(
                    "start requires {}, service is {}",
                    ServiceState::Created,
                    state
                )))
            }
        };

        queue.start_queue().await?;
        lifecycle.state = ServiceState::Started;
        info!(queue = NOTIFICATION_QUEUE_NAME, "Entitlement service started");
        Ok(())
    }

    /// Stop delivery and delete the queue. No-op when no queue is held.
    ///
    /// The handle is released only once the queue is deleted, so a failed
    /// stop can be retried.
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(queue) = lifecycle.queue.as_ref().map(Arc::clone) else {
            if lifecycle.state == ServiceState::Uninitialized {
                warn!("Stop requested before the entitlement service was initialized");
            }
            return Ok(());
        };

        queue.stop_queue().await?;
        lifecycle.state = ServiceState::Stopped;
        self.collaborators
            .queue_service
            .delete_notification_queue(queue.service_name(), queue.queue_name())
            .await?;
        lifecycle.queue = None;

        info!(queue = NOTIFICATION_QUEUE_NAME, "Entitlement service stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retry::ExponentialRetryPolicy;
    use crate::port::blocking_state_dao::mocks::RecordingBlockingStateDao;
    use crate::port::entitlement_api::MockEntitlementInternalApi;
    use crate::port::event_bus::mocks::RecordingBus;
    use crate::port::id_provider::UuidProvider;
    use crate::port::notification_queue::mocks::{RecordingQueue, RecordingQueueService};
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::FixedOffsetCallContextFactory;

    fn service(queue_service: Arc<RecordingQueueService>) -> EntitlementService {
        EntitlementService::new(ServiceCollaborators {
            queue_service,
            entitlement_api: Arc::new(MockEntitlementInternalApi::new()),
            blocking_state_dao: Arc::new(RecordingBlockingStateDao::new()),
            bus: Arc::new(RecordingBus::new()),
            context_factory: Arc::new(FixedOffsetCallContextFactory::utc()),
            id_provider: Arc::new(UuidProvider),
            time_provider: Arc::new(SystemTimeProvider),
            retry_schedule: Arc::new(ExponentialRetryPolicy::default()),
        })
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let registry = Arc::new(RecordingQueueService::new());
        let svc = service(registry.clone());

        svc.initialize().await.unwrap();
        assert_eq!(svc.state().await, ServiceState::Created);
        assert!(registry
            .handler(ENTITLEMENT_SERVICE_NAME, NOTIFICATION_QUEUE_NAME)
            .is_some());

        svc.start().await.unwrap();
        assert_eq!(svc.state().await, ServiceState::Started);
        let queue = registry
            .queue(ENTITLEMENT_SERVICE_NAME, NOTIFICATION_QUEUE_NAME)
            .unwrap();
        assert!(queue.is_started());

        svc.stop().await.unwrap();
        assert_eq!(svc.state().await, ServiceState::Stopped);
        assert!(!queue.is_started());
        assert!(registry
            .queue(ENTITLEMENT_SERVICE_NAME, NOTIFICATION_QUEUE_NAME)
            .is_none());
    }

    #[tokio::test]
    async fn test_stop_before_initialize_is_noop() {
        let svc = service(Arc::new(RecordingQueueService::new()));

        svc.stop().await.unwrap();

        assert_eq!(svc.state().await, ServiceState::Uninitialized);
    }

    #[tokio::test]
    async fn test_stop_twice_is_safe() {
        let svc = service(Arc::new(RecordingQueueService::new()));
        svc.initialize().await.unwrap();
        svc.start().await.unwrap();

        svc.stop().await.unwrap();
        svc.stop().await.unwrap();

        assert_eq!(svc.state().await, ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_name_collision_fails_fast_without_starting() {
        let registry = Arc::new(RecordingQueueService::new());
        let existing = Arc::new(RecordingQueue::new(
            ENTITLEMENT_SERVICE_NAME,
            NOTIFICATION_QUEUE_NAME,
        ));
        registry.insert(existing.clone());
        let svc = service(registry);

        let result = svc.initialize().await;

        assert!(matches!(result, Err(AppError::QueueAlreadyExists { .. })));
        assert_eq!(svc.state().await, ServiceState::Uninitialized);
        assert!(matches!(svc.start().await, Err(AppError::InvalidState(_))));
        assert!(!existing.is_started());
    }

    #[tokio::test]
    async fn test_start_requires_created() {
        let svc = service(Arc::new(RecordingQueueService::new()));
        assert!(matches!(svc.start().await, Err(AppError::InvalidState(_))));

        svc.initialize().await.unwrap();
        svc.start().await.unwrap();
        assert!(matches!(svc.start().await, Err(AppError::InvalidState(_))));

        svc.stop().await.unwrap();
        assert!(matches!(svc.start().await, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_stopped_service_can_be_initialized_again() {
        let registry = Arc::new(RecordingQueueService::new());
        let svc = service(registry.clone());
        svc.initialize().await.unwrap();
        svc.start().await.unwrap();
        svc.stop().await.unwrap();

        svc.initialize().await.unwrap();
        assert_eq!(svc.state().await, ServiceState::Created);
        svc.start().await.unwrap();

        let queue = registry
            .queue(ENTITLEMENT_SERVICE_NAME, NOTIFICATION_QUEUE_NAME)
            .unwrap();
        assert!(queue.is_started());
        assert!(matches!(svc.initialize().await, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_handle_for_retry() {
        let registry = Arc::new(RecordingQueueService::new());
        let svc = service(registry.clone());
        svc.initialize().await.unwrap();
        svc.start().await.unwrap();

        registry.fail_deletes(true);
        assert!(matches!(svc.stop().await, Err(AppError::Queue(_))));
        assert_eq!(svc.state().await, ServiceState::Stopped);
        assert!(matches!(svc.initialize().await, Err(AppError::InvalidState(_))));

        registry.fail_deletes(false);
        svc.stop().await.unwrap();
        assert!(registry
            .queue(ENTITLEMENT_SERVICE_NAME, NOTIFICATION_QUEUE_NAME)
            .is_none());
        svc.initialize().await.unwrap();
    }
}
