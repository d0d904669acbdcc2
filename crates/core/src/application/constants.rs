// Service constants (no magic values)
use std::time::Duration;

pub use crate::domain::entitlement::ENTITLEMENT_SERVICE_NAME;

/// Queue carrying entitlement notifications; stable across restarts
pub const NOTIFICATION_QUEUE_NAME: &str = "entitlement-events";

/// User name recorded on contexts built for queue deliveries
pub const QUEUE_USER_NAME: &str = "EntitlementQueue";

/// Default retry base delay (1000ms = 1s)
pub const DEFAULT_RETRY_BASE_DELAY_MS: i64 = 1000;

/// Default exponential factor between redeliveries
pub const DEFAULT_RETRY_BACKOFF_FACTOR: f64 = 2.0;

/// Redeliveries attempted before a notification is given up
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;

/// Upper bound on a single redelivery delay (7 days)
pub const MAX_RETRY_DELAY_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Sleep duration when no notification is ready (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after a fatal handler error before polling again (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);
