// Notification Queue Port (Interface)
//
// Durable queue of notifications delivered once they become ready. The
// registry addresses queues by (service name, queue name) so that every
// component of a process reaches the same logical queue.

use crate::domain::NotificationPayload;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// A notification the transport considers ready for processing
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyNotification {
    /// `None` when the stored payload is absent
    pub payload: Option<NotificationPayload>,
    pub effective_date: DateTime<Utc>,
    pub user_token: Option<Uuid>,
    pub account_record_id: Option<i64>,
    pub tenant_record_id: Option<i64>,
    /// Number of earlier deliveries that ended in a retry
    pub attempt: u32,
}

/// A notification to be delivered at or after `effective_date`
#[derive(Debug, Clone, PartialEq)]
pub struct FutureNotification {
    pub effective_date: DateTime<Utc>,
    pub payload: NotificationPayload,
    pub user_token: Option<Uuid>,
    pub account_record_id: Option<i64>,
    pub tenant_record_id: Option<i64>,
    pub attempt: u32,
}

/// Two-valued failure outcome of a handler
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Redeliver later, per the retry layer's backoff
    #[error("Retryable failure: {0}")]
    Retry(#[source] AppError),

    /// Not part of the per-notification taxonomy; surfaces to the transport
    #[error("Fatal failure: {0}")]
    Fatal(#[source] AppError),
}

impl HandlerError {
    /// Classify a processing failure: fatal for queue infrastructure, retryable otherwise
    pub fn classify(err: AppError) -> Self {
        if err.is_fatal() {
            HandlerError::Fatal(err)
        } else {
            HandlerError::Retry(err)
        }
    }
}

/// Handler bound to a queue at creation time
#[async_trait]
pub trait NotificationQueueHandler: Send + Sync {
    /// Process one ready notification. `Ok` means done: the notification is
    /// never redelivered, including when it was dropped on purpose.
    async fn handle_ready_notification(
        &self,
        notification: ReadyNotification,
    ) -> std::result::Result<(), HandlerError>;
}

/// A single named queue
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    fn service_name(&self) -> &str;

    fn queue_name(&self) -> &str;

    fn is_started(&self) -> bool;

    /// Begin delivering ready notifications to the bound handler
    async fn start_queue(&self) -> Result<()>;

    /// Stop delivery; in-flight handling runs to completion
    async fn stop_queue(&self) -> Result<()>;

    /// Durably schedule a notification
    async fn record_future_notification(&self, notification: FutureNotification) -> Result<()>;
}

/// Process-wide registry of queues
#[async_trait]
pub trait NotificationQueueService: Send + Sync {
    /// Fails with `AppError::QueueAlreadyExists` on a name collision
    async fn create_notification_queue(
        &self,
        service_name: &str,
        queue_name: &str,
        handler: Arc<dyn NotificationQueueHandler>,
    ) -> Result<Arc<dyn NotificationQueue>>;

    /// Fails with `AppError::NoSuchQueue` when absent
    async fn get_notification_queue(
        &self,
        service_name: &str,
        queue_name: &str,
    ) -> Result<Arc<dyn NotificationQueue>>;

    /// Fails with `AppError::NoSuchQueue` when absent
    async fn delete_notification_queue(&self, service_name: &str, queue_name: &str) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Queue that records scheduled notifications instead of persisting them
    pub struct RecordingQueue {
        service_name: String,
        queue_name: String,
        started: AtomicBool,
        /// Schedulings still allowed to succeed; `usize::MAX` means unlimited
        scheduling_budget: AtomicUsize,
        recorded: Mutex<Vec<FutureNotification>>,
        journal: Option<Arc<Mutex<Vec<String>>>>,
    }

    impl RecordingQueue {
        pub fn new(service_name: &str, queue_name: &str) -> Self {
            Self {
                service_name: service_name.to_string(),
                queue_name: queue_name.to_string(),
                started: AtomicBool::new(false),
                scheduling_budget: AtomicUsize::new(usize::MAX),
                recorded: Mutex::new(Vec::new()),
                journal: None,
            }
        }

        /// Append `schedule:<effective_date>` to a journal shared with other fakes
        pub fn with_journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
            self.journal = Some(journal);
            self
        }

        pub fn fail_scheduling(&self) {
            self.fail_scheduling_after(0);
        }

        /// Let `successes` schedulings through, then fail every following one
        pub fn fail_scheduling_after(&self, successes: usize) {
            self.scheduling_budget.store(successes, Ordering::SeqCst);
        }

        pub fn allow_scheduling(&self) {
            self.scheduling_budget.store(usize::MAX, Ordering::SeqCst);
        }

        pub fn recorded(&self) -> Vec<FutureNotification> {
            self.recorded.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationQueue for RecordingQueue {
        fn service_name(&self) -> &str {
            &self.service_name
        }

        fn queue_name(&self) -> &str {
            &self.queue_name
        }

        fn is_started(&self) -> bool {
            self.started.load(Ordering::SeqCst)
        }

        async fn start_queue(&self) -> Result<()> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop_queue(&self) -> Result<()> {
            self.started.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn record_future_notification(&self, notification: FutureNotification) -> Result<()> {
            let budget = self.scheduling_budget.load(Ordering::SeqCst);
            if budget == 0 {
                return Err(AppError::Queue("simulated I/O failure".to_string()));
            }
            if budget != usize::MAX {
                self.scheduling_budget.store(budget - 1, Ordering::SeqCst);
            }
            if let Some(journal) = &self.journal {
                journal
                    .lock()
                    .unwrap()
                    .push(format!("schedule:{}", notification.effective_date));
            }
            self.recorded.lock().unwrap().push(notification);
            Ok(())
        }
    }

    /// In-memory registry handing out `RecordingQueue`s
    #[derive(Default)]
    pub struct RecordingQueueService {
        queues: Mutex<HashMap<(String, String), Arc<RecordingQueue>>>,
        handlers: Mutex<HashMap<(String, String), Arc<dyn NotificationQueueHandler>>>,
        fail_deletes: AtomicBool,
    }

    impl RecordingQueueService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_deletes(&self, fail: bool) {
            self.fail_deletes.store(fail, Ordering::SeqCst);
        }

        /// Register a queue without a handler (e.g. one owned by another component)
        pub fn insert(&self, queue: Arc<RecordingQueue>) {
            let key = (queue.service_name.clone(), queue.queue_name.clone());
            self.queues.lock().unwrap().insert(key, queue);
        }

        pub fn queue(&self, service_name: &str, queue_name: &str) -> Option<Arc<RecordingQueue>> {
            self.queues
                .lock()
                .unwrap()
                .get(&(service_name.to_string(), queue_name.to_string()))
                .cloned()
        }

        pub fn handler(
            &self,
            service_name: &str,
            queue_name: &str,
        ) -> Option<Arc<dyn NotificationQueueHandler>> {
            self.handlers
                .lock()
                .unwrap()
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
    impl NotificationQueueService for RecordingQueueService {
        async fn create_notification_queue(
            &self,
            service_name: &str,
            queue_name: &str,
            handler: Arc<dyn NotificationQueueHandler>,
        ) -> Result<Arc<dyn NotificationQueue>> {
            let key = (service_name.to_string(), queue_name.to_string());
            let mut queues = self.queues.lock().unwrap();
            if queues.contains_key(&key) {
                return Err(AppError::QueueAlreadyExists {
                    service_name: service_name.to_string(),
                    queue_name: queue_name.to_string(),
                });
            }
            let queue = Arc::new(RecordingQueue::new(service_name, queue_name));
            queues.insert(key.clone(), Arc::clone(&queue));
            self.handlers.lock().unwrap().insert(key, handler);
            Ok(queue)
        }

        async fn get_notification_queue(
            &self,
            service_name: &str,
            queue_name: &str,
        ) -> Result<Arc<dyn NotificationQueue>> {
            match self.queue(service_name, queue_name) {
                Some(queue) => Ok(queue),
                None => Err(no_such_queue(service_name, queue_name)),
            }
        }

        async fn delete_notification_queue(
            &self,
            service_name: &str,
            queue_name: &str,
        ) -> Result<()> {
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(AppError::Queue("simulated delete failure".to_string()));
            }
            let key = (service_name.to_string(), queue_name.to_string());
            self.handlers.lock().unwrap().remove(&key);
            match self.queues.lock().unwrap().remove(&key) {
                Some(_) => Ok(()),
                None => Err(no_such_queue(service_name, queue_name)),
            }
        }
    }
}
