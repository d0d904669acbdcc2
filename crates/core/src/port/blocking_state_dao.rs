// Blocking State DAO Port (Interface)

use crate::domain::{BlockingState, BlockingStateId, BundleId, InternalCallContext};
use crate::error::Result;
use async_trait::async_trait;

/// Persistence of blocking states
#[async_trait]
pub trait BlockingStateDao: Send + Sync {
    /// Find a blocking state by ID; `None` once deleted or superseded
    async fn get_by_id(
        &self,
        id: BlockingStateId,
        context: &InternalCallContext,
    ) -> Result<Option<BlockingState>>;

    /// Persist `states` and post the internal state-changed signal in one transaction.
    ///
    /// States are upserted on (blocked id, service, state name, effective date)
    /// and the latest call wins the row's id: transition keys scheduled against
    /// a replaced id find nothing when they fire and are dropped.
    async fn set_blocking_states_and_post_blocking_transition_event(
        &self,
        states: &[BlockingState],
        bundle_id: BundleId,
        context: &InternalCallContext,
    ) -> Result<()>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-memory DAO with the same upsert semantics as the SQL implementation
    #[derive(Default)]
    pub struct RecordingBlockingStateDao {
        states: Mutex<HashMap<BlockingStateId, BlockingState>>,
        signals: Mutex<Vec<BundleId>>,
        fail_writes: AtomicBool,
        journal: Option<Arc<Mutex<Vec<String>>>>,
    }

    impl RecordingBlockingStateDao {
        pub fn new() -> Self {
            Self::default()
        }

        /// Append `persist:<count>` to a journal shared with other fakes
        pub fn with_journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
            self.journal = Some(journal);
            self
        }

        pub fn fail_writes(&self) {
            self.fail_writes.store(true, Ordering::SeqCst);
        }

        pub fn insert(&self, state: BlockingState) {
            self.states.lock().unwrap().insert(state.id, state);
        }

        pub fn delete(&self, id: BlockingStateId) {
            self.states.lock().unwrap().remove(&id);
        }

        pub fn states(&self) -> Vec<BlockingState> {
            self.states.lock().unwrap().values().cloned().collect()
        }

        /// Bundles for which a state-changed signal was posted, in order
        pub fn signals(&self) -> Vec<BundleId> {
            self.signals.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BlockingStateDao for RecordingBlockingStateDao {
        async fn get_by_id(
            &self,
            id: BlockingStateId,
            _context: &InternalCallContext,
        ) -> Result<Option<BlockingState>> {
            Ok(self.states.lock().unwrap().get(&id).cloned())
        }

        async fn set_blocking_states_and_post_blocking_transition_event(
            &self,
            states: &[BlockingState],
            bundle_id: BundleId,
            _context: &InternalCallContext,
        ) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(AppError::Database("simulated write failure".to_string()));
            }

            let mut stored = self.states.lock().unwrap();
            for state in states {
                // Same natural key: the latest computation replaces the row, id included
                stored.retain(|_, existing| existing.natural_key() != state.natural_key());
                stored.insert(state.id, state.clone());
            }
            drop(stored);

            self.signals.lock().unwrap().push(bundle_id);
            if let Some(journal) = &self.journal {
                journal
                    .lock()
                    .unwrap()
                    .push(format!("persist:{}", states.len()));
            }
            Ok(())
        }
    }
}
