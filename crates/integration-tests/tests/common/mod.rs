//! Shared wiring: the real service over SQLite adapters and a manual clock

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use entitlement_core::application::constants::{ENTITLEMENT_SERVICE_NAME, NOTIFICATION_QUEUE_NAME};
use entitlement_core::application::{EntitlementService, ExponentialRetryPolicy, ServiceCollaborators};
use entitlement_core::domain::{CallOrigin, InternalCallContext, NotificationPayload, UserType};
use entitlement_core::port::id_provider::UuidProvider;
use entitlement_core::port::time_provider::FixedTimeProvider;
use entitlement_core::port::{FixedOffsetCallContextFactory, FutureNotification, NotificationQueueService};
use entitlement_infra_sqlite::{
    create_pool, run_migrations, SqliteBlockingStateDao, SqliteEntitlementApi,
    SqliteNotificationQueue, SqliteNotificationQueueService, SqlitePersistentBus,
};
use sqlx::SqlitePool;
use uuid::Uuid;

pub const ACCOUNT_RECORD_ID: i64 = 11;
pub const TENANT_RECORD_ID: i64 = 22;

pub struct Engine {
    pub pool: SqlitePool,
    pub clock: Arc<FixedTimeProvider>,
    pub queue_service: Arc<SqliteNotificationQueueService>,
    pub blocking_state_dao: Arc<SqliteBlockingStateDao>,
    pub entitlement_api: Arc<SqliteEntitlementApi>,
    pub bus: Arc<SqlitePersistentBus>,
    pub service: EntitlementService,
}

pub fn start_of_test() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

/// Retry base delay is long enough that redeliveries never fire during a test
pub async fn engine() -> Engine {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();

    let clock = Arc::new(FixedTimeProvider::new(start_of_test()));
    let queue_service = Arc::new(SqliteNotificationQueueService::with_poll_interval(
        pool.clone(),
        clock.clone(),
        Duration::from_millis(10),
    ));
    let blocking_state_dao = Arc::new(SqliteBlockingStateDao::new(pool.clone(), clock.clone()));
    let entitlement_api = Arc::new(SqliteEntitlementApi::new(
        pool.clone(),
        blocking_state_dao.clone(),
        Arc::new(UuidProvider),
        clock.clone(),
    ));
    let bus = Arc::new(SqlitePersistentBus::new(pool.clone(), clock.clone()));

    let service = build_service(&queue_service, &blocking_state_dao, &entitlement_api, &bus, &clock);

    Engine {
        pool,
        clock,
        queue_service,
        blocking_state_dao,
        entitlement_api,
        bus,
        service,
    }
}

fn build_service(
    queue_service: &Arc<SqliteNotificationQueueService>,
    blocking_state_dao: &Arc<SqliteBlockingStateDao>,
    entitlement_api: &Arc<SqliteEntitlementApi>,
    bus: &Arc<SqlitePersistentBus>,
    clock: &Arc<FixedTimeProvider>,
) -> EntitlementService {
    EntitlementService::new(ServiceCollaborators {
        queue_service: queue_service.clone(),
        entitlement_api: entitlement_api.clone(),
        blocking_state_dao: blocking_state_dao.clone(),
        bus: bus.clone(),
        context_factory: Arc::new(FixedOffsetCallContextFactory::utc()),
        id_provider: Arc::new(UuidProvider),
        time_provider: clock.clone(),
        retry_schedule: Arc::new(ExponentialRetryPolicy::new(3_600_000, 2.0, 3).unwrap()),
    })
}

impl Engine {
    /// A second service instance sharing this engine's registry and store
    pub fn another_service(&self) -> EntitlementService {
        build_service(
            &self.queue_service,
            &self.blocking_state_dao,
            &self.entitlement_api,
            &self.bus,
            &self.clock,
        )
    }

    pub async fn running() -> Self {
        let engine = engine().await;
        engine.service.initialize().await.unwrap();
        engine.service.start().await.unwrap();
        engine
    }

    pub async fn queue(&self) -> Arc<SqliteNotificationQueue> {
        self.queue_service
            .queue(ENTITLEMENT_SERVICE_NAME, NOTIFICATION_QUEUE_NAME)
            .await
            .expect("entitlement queue registered")
    }

    /// Enqueue a raw payload for delivery at `deliver_at`
    pub async fn enqueue(
        &self,
        deliver_at: DateTime<Utc>,
        payload: NotificationPayload,
        user_token: Uuid,
    ) {
        let queue = self
            .queue_service
            .get_notification_queue(ENTITLEMENT_SERVICE_NAME, NOTIFICATION_QUEUE_NAME)
            .await
            .unwrap();
        queue
            .record_future_notification(FutureNotification {
                effective_date: deliver_at,
                payload,
                user_token: Some(user_token),
                account_record_id: Some(ACCOUNT_RECORD_ID),
                tenant_record_id: Some(TENANT_RECORD_ID),
                attempt: 0,
            })
            .await
            .unwrap();
    }
}

pub fn provisioning_context() -> InternalCallContext {
    InternalCallContext {
        tenant_record_id: Some(TENANT_RECORD_ID),
        account_record_id: Some(ACCOUNT_RECORD_ID),
        user_token: None,
        created_by: "provisioning".to_string(),
        call_origin: CallOrigin::External,
        user_type: UserType::Admin,
        time_zone: FixedOffset::east_opt(0).unwrap(),
    }
}

/// Poll `condition` until it holds, panicking after a few seconds
pub async fn eventually<F, Fut>(description: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {}", description);
}
