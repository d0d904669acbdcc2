// Entitlement Infrastructure - SQLite Adapter
// Implements: NotificationQueueService, BlockingStateDao, PersistentBus, EntitlementInternalApi

mod blocking_state_dao;
mod connection;
mod entitlement_api;
mod error;
mod event_bus;
mod migration;
mod notification_queue;

pub use blocking_state_dao::SqliteBlockingStateDao;
pub use connection::create_pool;
pub use entitlement_api::SqliteEntitlementApi;
pub use event_bus::SqlitePersistentBus;
pub use migration::run_migrations;
pub use notification_queue::{
    ProcessingState, SqliteNotificationQueue, SqliteNotificationQueueService,
};
