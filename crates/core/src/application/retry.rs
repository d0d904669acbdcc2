// Retry layer
//
// A decorator over any NotificationQueueHandler: retryable failures are
// rescheduled on the same queue with a backoff delay, everything else passes
// through. The delegate never sees the backoff policy.

use crate::application::constants::{
    DEFAULT_RETRY_BACKOFF_FACTOR, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_ATTEMPTS,
    MAX_RETRY_DELAY_MS,
};
use crate::error::AppError;
use crate::port::{
    FutureNotification, HandlerError, NotificationQueueHandler, NotificationQueueService,
    ReadyNotification, TimeProvider,
};
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Redeliver after the given delay (ms)
    Retry(i64),
    /// Give up: the notification is dropped
    Failed,
}

/// Backoff policy consulted by the retry layer
pub trait RetrySchedule: Send + Sync {
    /// Decide what to do after the `attempt`-th failed delivery (0-based)
    fn next_retry(&self, attempt: u32, notification: &ReadyNotification) -> RetryDecision;
}

/// Exponential backoff with deterministic jitter
///
/// Backoff formula:
/// delay = min(base_delay * (backoff_factor ^ attempt) * (1.0 ± 0.1), MAX_RETRY_DELAY_MS)
pub struct ExponentialRetryPolicy {
    base_delay_ms: i64,
    backoff_factor: f64,
    max_attempts: u32,
}

impl ExponentialRetryPolicy {
    pub fn new(
        base_delay_ms: i64,
        backoff_factor: f64,
        max_attempts: u32,
    ) -> crate::error::Result<Self> {
        if !(0..=MAX_RETRY_DELAY_MS).contains(&base_delay_ms) {
            return Err(AppError::Config(format!(
                "retry base delay must be within 0..={}ms, got {}",
                MAX_RETRY_DELAY_MS, base_delay_ms
            )));
        }
        if !backoff_factor.is_finite() || backoff_factor < 1.0 {
            return Err(AppError::Config(format!(
                "retry backoff factor must be a finite value >= 1.0, got {}",
                backoff_factor
            )));
        }
        Ok(Self {
            base_delay_ms,
            backoff_factor,
            max_attempts,
        })
    }
}

impl Default for ExponentialRetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            backoff_factor: DEFAULT_RETRY_BACKOFF_FACTOR,
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
        }
    }
}

impl RetrySchedule for ExponentialRetryPolicy {
    fn next_retry(&self, attempt: u32, notification: &ReadyNotification) -> RetryDecision {
        if attempt >= self.max_attempts {
            warn!(
                attempt = attempt,
                max_attempts = self.max_attempts,
                "Max retry attempts reached"
            );
            return RetryDecision::Failed;
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay_ms = self.base_delay_ms as f64 * self.backoff_factor.powi(exponent);

        // ±10% jitter, seeded by the payload so redeliveries of one
        // notification stay stable while different notifications spread out
        let jitter_seed = notification
            .payload
            .as_ref()
            .map(|p| p.as_value().to_string())
            .unwrap_or_default()
            .bytes()
            .map(u32::from)
            .sum::<u32>();
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        let delay_ms = (base_delay_ms * jitter_factor).min(MAX_RETRY_DELAY_MS as f64);
        RetryDecision::Retry(delay_ms as i64)
    }
}

/// Retry decorator bound to the queue it reschedules on
pub struct RetryableHandler {
    delegate: Arc<dyn NotificationQueueHandler>,
    queue_service: Arc<dyn NotificationQueueService>,
    service_name: String,
    queue_name: String,
    schedule: Arc<dyn RetrySchedule>,
    time_provider: Arc<dyn TimeProvider>,
}

impl RetryableHandler {
    pub fn new(
        delegate: Arc<dyn NotificationQueueHandler>,
        queue_service: Arc<dyn NotificationQueueService>,
        service_name: impl Into<String>,
        queue_name: impl Into<String>,
        schedule: Arc<dyn RetrySchedule>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            delegate,
            queue_service,
            service_name: service_name.into(),
            queue_name: queue_name.into(),
            schedule,
            time_provider,
        }
    }

    async fn schedule_retry(
        &self,
        notification: ReadyNotification,
        delay_ms: i64,
    ) -> Result<(), HandlerError> {
        let Some(payload) = notification.payload else {
            // Nothing to redeliver
            return Ok(());
        };

        let queue = self
            .queue_service
            .get_notification_queue(&self.service_name, &self.queue_name)
            .await
            .map_err(HandlerError::Fatal)?;

        let Some(retry_at) = Duration::try_milliseconds(delay_ms)
            .and_then(|delay| self.time_provider.now().checked_add_signed(delay))
        else {
            error!(
                attempt = notification.attempt,
                delay_ms = delay_ms,
                "Retry time out of range, dropping notification"
            );
            return Ok(());
        };
        queue
            .record_future_notification(FutureNotification {
                effective_date: retry_at,
                payload,
                user_token: notification.user_token,
                account_record_id: notification.account_record_id,
                tenant_record_id: notification.tenant_record_id,
                attempt: notification.attempt + 1,
            })
            .await
            .map_err(HandlerError::Fatal)?;

        info!(
            queue = %self.queue_name,
            attempt = notification.attempt + 1,
            retry_at = %retry_at,
            "Notification rescheduled for retry"
        );
        Ok(())
    }
}

#[async_trait]
impl NotificationQueueHandler for RetryableHandler {
    async fn handle_ready_notification(
        &self,
        notification: ReadyNotification,
    ) -> Result<(), HandlerError> {
        match self.delegate.handle_ready_notification(notification.clone()).await {
            Ok(()) => Ok(()),
            Err(HandlerError::Retry(cause)) => {
                match self.schedule.next_retry(notification.attempt, &notification) {
                    RetryDecision::Retry(delay_ms) => {
                        warn!(
                            attempt = notification.attempt,
                            delay_ms = delay_ms,
                            error = %cause,
                            "Retrying notification after failure"
                        );
                        self.schedule_retry(notification, delay_ms).await
                    }
                    RetryDecision::Failed => {
                        error!(
                            attempt = notification.attempt,
                            error = %cause,
                            "Notification failed after max retries, dropping it"
                        );
                        Ok(())
                    }
                }
            }
            Err(fatal) => Err(fatal),
        }
    }
}
