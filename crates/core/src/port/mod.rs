// Port Layer - Interfaces for external dependencies

pub mod blocking_state_dao;
pub mod call_context;
pub mod entitlement_api;
pub mod event_bus;
pub mod id_provider; // For deterministic testing
pub mod notification_queue;
pub mod time_provider;

// Re-exports
pub use blocking_state_dao::BlockingStateDao;
pub use call_context::{FixedOffsetCallContextFactory, InternalCallContextFactory};
pub use entitlement_api::EntitlementInternalApi;
pub use event_bus::PersistentBus;
pub use id_provider::IdProvider;
pub use notification_queue::{
    FutureNotification, HandlerError, NotificationQueue, NotificationQueueHandler,
    NotificationQueueService, ReadyNotification,
};
pub use time_provider::TimeProvider;
