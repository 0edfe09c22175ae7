//! Background workers pulling ingestion jobs off the queue.
//!
//! Jobs are retried with bounded exponential backoff; a job that keeps
//! failing is moved to the dead-letter store for inspection. A dropped job
//! (unknown project) is neither retried nor dead-lettered.

use std::sync::Arc;
use std::time::Duration;

use faultline_core::{IngestEventJob, Job, JobReceiver, QueueError};
use faultline_queue::{DeadLetterStore, QueueService, SharedJobReceiver, WeakQueueService};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::service::IngestionService;

/// A job is dead-lettered once it has been attempted this many times.
pub const MAX_ATTEMPTS: u32 = 3;

const BASE_BACKOFF_MS: u64 = 500;

/// Delay before retry `attempt + 1`: 500ms, 1s, 2s, ...
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS * 2u64.saturating_pow(attempt.min(10)))
}

/// Spawn `count` workers competing for jobs on the shared receiver.
///
/// Workers exit when the queue channel closes.
pub fn spawn_workers(
    count: usize,
    receiver: SharedJobReceiver,
    queue: QueueService,
    service: Arc<IngestionService>,
    dead_letter: DeadLetterStore,
) -> Vec<JoinHandle<()>> {
    // Workers hold a weak sender for retries; only the caller's strong
    // handles keep the channel open.
    let retry_queue = queue.downgrade();
    (0..count)
        .map(|worker_id| {
            let receiver = receiver.clone();
            let queue = retry_queue.clone();
            let service = Arc::clone(&service);
            let dead_letter = dead_letter.clone();
            tokio::spawn(async move {
                run_worker(worker_id, receiver, queue, service, dead_letter).await;
            })
        })
        .collect()
}

async fn run_worker(
    worker_id: usize,
    mut receiver: SharedJobReceiver,
    queue: WeakQueueService,
    service: Arc<IngestionService>,
    dead_letter: DeadLetterStore,
) {
    info!("Ingestion worker {} started", worker_id);
    loop {
        match receiver.recv().await {
            Ok(Job::IngestEvent(job)) => {
                handle_job(job, &queue, &service, &dead_letter).await;
            }
            Err(QueueError::ChannelClosed) => {
                info!("Ingestion worker {} stopping: queue closed", worker_id);
                break;
            }
            Err(e) => {
                error!("Ingestion worker {} failed to receive job: {}", worker_id, e);
            }
        }
    }
}

async fn handle_job(
    job: IngestEventJob,
    queue: &WeakQueueService,
    service: &Arc<IngestionService>,
    dead_letter: &DeadLetterStore,
) {
    match service.process_event(&job).await {
        Ok(Some(processed)) => {
            debug!(
                "Processed event into exception {} (issue {})",
                processed.exception_id, processed.issue_id
            );
        }
        Ok(None) => {
            // Unknown project; already logged, nothing to retry
        }
        Err(e) => {
            let next_attempt = job.attempt + 1;
            if next_attempt >= MAX_ATTEMPTS {
                dead_letter.push(job, e.to_string()).await;
                return;
            }

            let delay = backoff_delay(job.attempt);
            warn!(
                "Processing failed for project {} (attempt {}/{}), retrying in {:?}: {}",
                job.project_id, next_attempt, MAX_ATTEMPTS, delay, e
            );

            let queue = queue.clone();
            let mut retry = job;
            retry.attempt = next_attempt;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(send_err) = queue.send(Job::IngestEvent(retry)).await {
                    error!("Failed to requeue job for retry: {}", send_err);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use faultline_database::test_utils::TestDatabase;
    use faultline_entities::{exceptions, projects};
    use faultline_queue::{JobQueue, QueueService};
    use sea_orm::{ActiveModelTrait, EntityTrait, Set};
    use serde_json::json;

    #[test]
    fn test_backoff_delay_doubles() {
        assert_eq!(backoff_delay(0), Duration::from_millis(500));
        assert_eq!(backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2), Duration::from_millis(2000));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_workers_process_jobs_until_queue_closes() -> anyhow::Result<()> {
        let test_db = TestDatabase::with_migrations().await?;
        let db = test_db.connection_arc();

        let project = projects::ActiveModel {
            name: Set("Worker Test".to_string()),
            slug: Set(format!("worker-test-{}", uuid::Uuid::new_v4())),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db.as_ref())
        .await?;

        let (queue, receiver) = QueueService::create_channel(16);
        let service = Arc::new(IngestionService::new(db.clone()));
        let dead_letter = DeadLetterStore::new();

        let handles = spawn_workers(
            2,
            receiver,
            queue.clone(),
            service,
            dead_letter.clone(),
        );

        for i in 0..3 {
            queue
                .send(Job::IngestEvent(IngestEventJob {
                    project_id: project.id,
                    event_id: None,
                    event_payload: json!({
                        "exception": {"values": [{"type": format!("Error{}", i)}]}
                    }),
                    received_at: Utc::now(),
                    attempt: 0,
                }))
                .await?;
        }
        // Unknown project: dropped without retry or dead letter
        queue
            .send(Job::IngestEvent(IngestEventJob {
                project_id: 999_999,
                event_id: None,
                event_payload: json!({}),
                received_at: Utc::now(),
                attempt: 0,
            }))
            .await?;

        drop(queue);
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(10), handle).await??;
        }

        let stored = exceptions::Entity::find().all(db.as_ref()).await?;
        assert_eq!(stored.len(), 3);
        assert!(dead_letter.is_empty().await);

        Ok(())
    }
}
