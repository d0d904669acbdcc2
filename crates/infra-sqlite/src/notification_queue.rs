// SQLite Notification Queue
//
// Rows in `notifications` move AVAILABLE -> IN_PROCESSING -> PROCESSED. A
// started queue runs one delivery loop that claims the oldest ready row
// atomically, so deliveries of one queue are serialized.

use crate::error::{from_millis, map_queue_error};
use async_trait::async_trait;
use entitlement_core::application::constants::{
    ERROR_RECOVERY_SLEEP_DURATION, IDLE_SLEEP_DURATION,
};
use entitlement_core::application::{shutdown_channel, ShutdownSender, ShutdownToken};
use entitlement_core::domain::NotificationPayload;
use entitlement_core::error::{AppError, Result};
use entitlement_core::port::{
    FutureNotification, HandlerError, NotificationQueue, NotificationQueueHandler,
    NotificationQueueService, ReadyNotification, TimeProvider,
};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    Available,
    InProcessing,
    Processed,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Available => "AVAILABLE",
            ProcessingState::InProcessing => "IN_PROCESSING",
            ProcessingState::Processed => "PROCESSED",
        }
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    record_id: i64,
    effective_date: i64,
    payload: Option<String>,
    user_token: Option<String>,
    account_record_id: Option<i64>,
    tenant_record_id: Option<i64>,
    attempt: i64,
}

impl NotificationRow {
    fn into_ready(self) -> Result<ReadyNotification> {
        // A body that is not JSON is handed over as a string so the handler
        // classifies it instead of the transport dropping it
        let payload = self.payload.map(|raw| {
            NotificationPayload::new(
                serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw)),
            )
        });
        let user_token = self.user_token.and_then(|raw| match Uuid::parse_str(&raw) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(record_id = self.record_id, error = %e, "Ignoring malformed user token");
                None
            }
        });

        Ok(ReadyNotification {
            payload,
            effective_date: from_millis("notifications.effective_date", self.effective_date)?,
            user_token,
            account_record_id: self.account_record_id,
            tenant_record_id: self.tenant_record_id,
            attempt: u32::try_from(self.attempt).unwrap_or(u32::MAX),
        })
    }
}

/// State shared between a queue handle and its delivery loop
struct QueueCore {
    service_name: String,
    queue_name: String,
    pool: SqlitePool,
    handler: Arc<dyn NotificationQueueHandler>,
    time_provider: Arc<dyn TimeProvider>,
    poll_interval: Duration,
}

impl QueueCore {
    async fn claim_next(&self) -> Result<Option<NotificationRow>> {
        sqlx::query_as::<_, NotificationRow>(
            r#"
            UPDATE notifications
            SET processing_state = ?
            WHERE record_id = (
                SELECT record_id FROM notifications
                WHERE service_name = ? AND queue_name = ?
                  AND processing_state = ?
                  AND effective_date <= ?
                ORDER BY effective_date ASC, record_id ASC
                LIMIT 1
            )
            RETURNING record_id, effective_date, payload, user_token,
                      account_record_id, tenant_record_id, attempt
            "#,
        )
        .bind(ProcessingState::InProcessing.as_str())
        .bind(&self.service_name)
        .bind(&self.queue_name)
        .bind(ProcessingState::Available.as_str())
        .bind(self.time_provider.now_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_queue_error)
    }

    async fn set_state(&self, record_id: i64, state: ProcessingState) -> Result<()> {
        let processed_date = match state {
            ProcessingState::Processed => Some(self.time_provider.now_millis()),
            _ => None,
        };
        sqlx::query(
            "UPDATE notifications SET processing_state = ?, processed_date = ? WHERE record_id = ?",
        )
        .bind(state.as_str())
        .bind(processed_date)
        .bind(record_id)
        .execute(&self.pool)
        .await
        .map_err(map_queue_error)?;
        Ok(())
    }

    /// Rows a crashed process left claimed become deliverable again
    async fn reclaim_in_processing(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications SET processing_state = ?
            WHERE service_name = ? AND queue_name = ? AND processing_state = ?
            "#,
        )
        .bind(ProcessingState::Available.as_str())
        .bind(&self.service_name)
        .bind(&self.queue_name)
        .bind(ProcessingState::InProcessing.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_queue_error)?;
        Ok(result.rows_affected())
    }

    /// Deliver the next ready notification; `Ok(false)` when none is ready
    async fn process_next(&self) -> Result<bool> {
        let Some(row) = self.claim_next().await? else {
            return Ok(false);
        };
        let record_id = row.record_id;

        let notification = match row.into_ready() {
            Ok(notification) => notification,
            Err(e) => {
                self.set_state(record_id, ProcessingState::Available).await?;
                return Err(e);
            }
        };
        debug!(
            record_id = record_id,
            queue = %self.queue_name,
            attempt = notification.attempt,
            "Delivering notification"
        );

        // Spawned so a panicking handler cannot take the loop down
        let handler = Arc::clone(&self.handler);
        let outcome =
            tokio::spawn(async move { handler.handle_ready_notification(notification).await })
                .await;

        match outcome {
            Ok(Ok(())) => {
                self.set_state(record_id, ProcessingState::Processed).await?;
                Ok(true)
            }
            Ok(Err(handler_error)) => {
                if let HandlerError::Retry(_) = handler_error {
                    warn!(
                        record_id = record_id,
                        "Retryable failure reached the transport; is the handler wrapped for retries?"
                    );
                }
                self.set_state(record_id, ProcessingState::Available).await?;
                Err(AppError::Queue(format!(
                    "notification {} released after handler failure: {}",
                    record_id, handler_error
                )))
            }
            Err(join_err) => {
                self.set_state(record_id, ProcessingState::Available).await?;
                Err(AppError::Queue(format!(
                    "notification {} released after handler panic: {}",
                    record_id, join_err
                )))
            }
        }
    }

    async fn run(self: Arc<Self>, mut shutdown: ShutdownToken) {
        info!(
            service = %self.service_name,
            queue = %self.queue_name,
            "Notification delivery loop started"
        );
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = sleep(self.poll_interval) => {},
                        _ = shutdown.wait() => break,
                    }
                }
                Err(e) => {
                    error!(queue = %self.queue_name, error = %e, "Notification delivery failed");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => break,
                    }
                }
            }
        }
        info!(queue = %self.queue_name, "Notification delivery loop stopped");
    }
}

struct DeliveryRunner {
    shutdown: ShutdownSender,
    handle: JoinHandle<()>,
}

pub struct SqliteNotificationQueue {
    core: Arc<QueueCore>,
    started: AtomicBool,
    runner: Mutex<Option<DeliveryRunner>>,
}

impl SqliteNotificationQueue {
    fn new(core: QueueCore) -> Self {
        Self {
            core: Arc::new(core),
            started: AtomicBool::new(false),
            runner: Mutex::new(None),
        }
    }

    pub async fn count_in_state(&self, state: ProcessingState) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notifications
            WHERE service_name = ? AND queue_name = ? AND processing_state = ?
            "#,
        )
        .bind(&self.core.service_name)
        .bind(&self.core.queue_name)
        .bind(state.as_str())
        .fetch_one(&self.core.pool)
        .await
        .map_err(map_queue_error)
    }

    /// Notifications not yet delivered, in delivery order
    pub async fn pending_notifications(&self) -> Result<Vec<ReadyNotification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT record_id, effective_date, payload, user_token,
                   account_record_id, tenant_record_id, attempt
            FROM notifications
            WHERE service_name = ? AND queue_name = ? AND processing_state != ?
            ORDER BY effective_date ASC, record_id ASC
            "#,
        )
        .bind(&self.core.service_name)
        .bind(&self.core.queue_name)
        .bind(ProcessingState::Processed.as_str())
        .fetch_all(&self.core.pool)
        .await
        .map_err(map_queue_error)?;

        rows.into_iter().map(NotificationRow::into_ready).collect()
    }
}

#[async_trait]
impl NotificationQueue for SqliteNotificationQueue {
    fn service_name(&self) -> &str {
        &self.core.service_name
    }

    fn queue_name(&self) -> &str {
        &self.core.queue_name
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    async fn start_queue(&self) -> Result<()> {
        let mut runner = self.runner.lock().await;
        if runner.is_some() {
            debug!(queue = %self.core.queue_name, "Queue already started");
            return Ok(());
        }

        let reclaimed = self.core.reclaim_in_processing().await?;
        if reclaimed > 0 {
            warn!(
                queue = %self.core.queue_name,
                reclaimed = reclaimed,
                "Reclaimed notifications left in processing"
            );
        }

        let (shutdown, token) = shutdown_channel();
        let handle = tokio::spawn(Arc::clone(&self.core).run(token));
        *runner = Some(DeliveryRunner { shutdown, handle });
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_queue(&self) -> Result<()> {
        let Some(runner) = self.runner.lock().await.take() else {
            return Ok(());
        };
        self.started.store(false, Ordering::SeqCst);

        runner.shutdown.shutdown();
        runner
            .handle
            .await
            .map_err(|e| AppError::Queue(format!("delivery loop did not stop cleanly: {}", e)))
    }

    async fn record_future_notification(&self, notification: FutureNotification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                service_name, queue_name, effective_date, payload, user_token,
                account_record_id, tenant_record_id, attempt, processing_state, created_date
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&self.core.service_name)
        .bind(&self.core.queue_name)
        .bind(notification.effective_date.timestamp_millis())
        .bind(notification.payload.as_value().to_string())
        .bind(notification.user_token.map(|t| t.to_string()))
        .bind(notification.account_record_id)
        .bind(notification.tenant_record_id)
        .bind(i64::from(notification.attempt))
        .bind(ProcessingState::Available.as_str())
        .bind(self.core.time_provider.now_millis())
        .execute(&self.core.pool)
        .await
        .map_err(map_queue_error)?;

        debug!(
            queue = %self.core.queue_name,
            effective_date = %notification.effective_date,
            attempt = notification.attempt,
            "Notification recorded"
        );
        Ok(())
    }
}

/// Process-wide queue registry backed by one SQLite pool
pub struct SqliteNotificationQueueService {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
    poll_interval: Duration,
    queues: RwLock<HashMap<(String, String), Arc<SqliteNotificationQueue>>>,
}

impl SqliteNotificationQueueService {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self::with_poll_interval(pool, time_provider, IDLE_SLEEP_DURATION)
    }

    pub fn with_poll_interval(
        pool: SqlitePool,
        time_provider: Arc<dyn TimeProvider>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            time_provider,
            poll_interval,
            queues: RwLock::new(HashMap::new()),
        }
    }

    /// Concrete handle, for inspection
    pub async fn queue(
        &self,
        service_name: &str,
        queue_name: &str,
    ) -> Option<Arc<SqliteNotificationQueue>> {
        self.queues
            .read()
            .await
            .get(&(service_name.to_string(), queue_name.to_string()))
            .cloned()
    }
}

fn no_such_queue(service_name: &str, queue_name: &str) -> AppError {
    AppError::NoSuchQueue {
        service_name: service_name.to_string(),
        queue_name: queue_name.to_string(),
    }
}

#[async_trait]
impl NotificationQueueService for SqliteNotificationQueueService {
    async fn create_notification_queue(
        &self,
        service_name: &str,
        queue_name: &str,
        handler: Arc<dyn NotificationQueueHandler>,
    ) -> Result<Arc<dyn NotificationQueue>> {
        let key = (service_name.to_string(), queue_name.to_string());
        let mut queues = self.queues.write().await;
        if queues.contains_key(&key) {
            return Err(AppError::QueueAlreadyExists {
                service_name: service_name.to_string(),
                queue_name: queue_name.to_string(),
            });
        }

        let queue = Arc::new(SqliteNotificationQueue::new(QueueCore {
            service_name: service_name.to_string(),
            queue_name: queue_name.to_string(),
            pool: self.pool.clone(),
            handler,
            time_provider: Arc::clone(&self.time_provider),
            poll_interval: self.poll_interval,
        }));
        queues.insert(key, Arc::clone(&queue));

        info!(service = %service_name, queue = %queue_name, "Notification queue created");
        Ok(queue)
    }

    async fn get_notification_queue(
        &self,
        service_name: &str,
        queue_name: &str,
    ) -> Result<Arc<dyn NotificationQueue>> {
        match self.queue(service_name, queue_name).await {
            Some(queue) => Ok(queue),
            None => Err(no_such_queue(service_name, queue_name)),
        }
    }

    async fn delete_notification_queue(&self, service_name: &str, queue_name: &str) -> Result<()> {
        let removed = self
            .queues
            .write()
            .await
            .remove(&(service_name.to_string(), queue_name.to_string()));

        let Some(queue) = removed else {
            return Err(no_such_queue(service_name, queue_name));
        };
        if queue.is_started() {
            queue.stop_queue().await?;
        }

        info!(service = %service_name, queue = %queue_name, "Notification queue deleted");
        Ok(())
    }
}
