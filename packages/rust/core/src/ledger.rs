//! Per-batch state record, persisted beside the narration.

use std::sync::{Arc, Mutex};

use slidecast_shared::{BatchState, Result, SlidecastError};
use slidecast_storage::BlobStore;
use tracing::warn;

/// Holds the current [`BatchState`] for one batch and persists every transition.
///
/// Transitions build a new record from the current one and swap it in whole.
/// The ledger is owned by the batch's orchestrator run; nothing else writes
/// its key.
pub struct BatchLedger {
    store: Arc<dyn BlobStore>,
    key: String,
    current: Mutex<BatchState>,
}

impl BatchLedger {
    /// Start a ledger, seeding the json attempt counter from any persisted record.
    pub async fn open(store: Arc<dyn BlobStore>, key: String) -> Result<Self> {
        let prior_json_attempts = match store.get(&key).await {
            Ok(bytes) => match serde_json::from_slice::<BatchState>(&bytes) {
                Ok(prior) => prior.json.attempts,
                Err(e) => {
                    warn!(key, error = %e, "unreadable batch metadata, starting fresh");
                    0
                }
            },
            Err(SlidecastError::MissingArtifact { .. }) => 0,
            Err(e) => return Err(e),
        };

        Ok(Self {
            store,
            key,
            current: Mutex::new(BatchState::new(prior_json_attempts)),
        })
    }

    /// Apply a transition, persist the new record, and return it.
    pub async fn record<F>(&self, transition: F) -> Result<BatchState>
    where
        F: FnOnce(&BatchState) -> BatchState,
    {
        let next = {
            let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
            let next = transition(&current);
            *current = next.clone();
            next
        };

        let bytes = serde_json::to_vec_pretty(&next)
            .map_err(|e| SlidecastError::Storage(format!("serialize batch state: {e}")))?;
        self.store.put(&self.key, &bytes).await?;
        Ok(next)
    }

    pub fn snapshot(&self) -> BatchState {
        self.current
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}
