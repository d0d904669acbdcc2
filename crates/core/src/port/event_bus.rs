// Event Bus Port (Interface)

use crate::domain::BusEvent;
use crate::error::Result;
use async_trait::async_trait;

/// Fire-and-forget publication; fails with `AppError::EventBus`
#[async_trait]
pub trait PersistentBus: Send + Sync {
    async fn post(&self, event: BusEvent) -> Result<()>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Bus that keeps posted events in memory
    #[derive(Default)]
    pub struct RecordingBus {
        events: Mutex<Vec<BusEvent>>,
        unavailable: AtomicBool,
    }

    impl RecordingBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        pub fn events(&self) -> Vec<BusEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PersistentBus for RecordingBus {
        async fn post(&self, event: BusEvent) -> Result<()> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(AppError::EventBus("bus unavailable".to_string()));
            }
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }
}
