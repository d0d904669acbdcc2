// Application Layer - Notification handling and queue lifecycle

pub mod constants;
pub mod dispatcher;
pub mod processor;
pub mod retry;
pub mod service;
pub mod shutdown;

// Re-exports
pub use dispatcher::EntitlementNotificationDispatcher;
pub use processor::{BlockingTransitionProcessor, EntitlementActionProcessor};
pub use retry::{ExponentialRetryPolicy, RetryDecision, RetrySchedule, RetryableHandler};
pub use service::{EntitlementService, ServiceCollaborators, ServiceState};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
