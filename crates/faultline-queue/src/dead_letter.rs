use std::sync::Arc;

use faultline_core::IngestEventJob;
use tokio::sync::Mutex;
use tracing::warn;

/// In-memory store for jobs that exhausted their retries.
///
/// Entries are kept for inspection and manual replay; nothing drains this
/// automatically.
#[derive(Clone, Default)]
pub struct DeadLetterStore {
    entries: Arc<Mutex<Vec<DeadLetterEntry>>>,
}

#[derive(Clone, Debug)]
pub struct DeadLetterEntry {
    pub job: IngestEventJob,
    pub error: String,
}

impl DeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, job: IngestEventJob, error: String) {
        warn!(
            "Dead-lettering event for project {} after {} attempts: {}",
            job.project_id, job.attempt, error
        );
        self.entries.lock().await.push(DeadLetterEntry { job, error });
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Remove and return all entries, e.g. for manual replay.
    pub async fn drain(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().await.drain(..).collect()
    }
}
