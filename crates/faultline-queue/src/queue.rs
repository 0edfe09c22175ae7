use std::sync::Arc;

use faultline_core::async_trait::async_trait;
use faultline_core::{IngestEventJob, Job, JobQueue, JobReceiver, QueueError};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum QueueServiceError {
    #[error("Failed to send job to queue: {details}")]
    QueueSendError { details: String, job_type: String },

    #[error("Queue is full")]
    QueueFull { job_type: String },

    #[error("Queue channel closed")]
    QueueChannelClosed { job_type: String },

    #[error("Invalid job data: {details}")]
    InvalidJobData { details: String, job_type: String },
}

/// Producer side of the ingestion queue.
///
/// Backed by a bounded mpsc channel; `try_send` keeps the HTTP handler from
/// blocking when the queue is saturated.
#[derive(Clone)]
pub struct QueueService {
    job_sender: mpsc::Sender<Job>,
}

/// Consumer side of the ingestion queue.
///
/// mpsc receivers are single-owner, so workers share one behind a mutex.
/// Each job is delivered to exactly one worker.
#[derive(Clone)]
pub struct SharedJobReceiver {
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
}

impl SharedJobReceiver {
    pub fn new(receiver: mpsc::Receiver<Job>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }
}

#[async_trait]
impl JobReceiver for SharedJobReceiver {
    async fn recv(&mut self) -> Result<Job, QueueError> {
        let mut receiver = self.receiver.lock().await;
        match receiver.recv().await {
            Some(job) => {
                debug!("Received job: {}", job);
                Ok(job)
            }
            None => {
                error!("Queue channel closed, no more jobs will arrive");
                Err(QueueError::ChannelClosed)
            }
        }
    }
}

#[async_trait]
impl JobQueue for QueueService {
    async fn send(&self, job: Job) -> Result<(), QueueError> {
        debug!("Enqueueing job: {}", job);
        self.job_sender
            .send(job)
            .await
            .map_err(|e| QueueError::SendError(format!("mpsc send failed: {}", e)))
    }
}

/// A sender handle that does not keep the channel open.
///
/// Workers requeue failed jobs through this so that the channel closes once
/// every producer-side `QueueService` is dropped, letting workers exit.
#[derive(Clone)]
pub struct WeakQueueService {
    job_sender: mpsc::WeakSender<Job>,
}

impl WeakQueueService {
    pub async fn send(&self, job: Job) -> Result<(), QueueError> {
        match self.job_sender.upgrade() {
            Some(sender) => sender
                .send(job)
                .await
                .map_err(|e| QueueError::SendError(format!("mpsc send failed: {}", e))),
            None => Err(QueueError::ChannelClosed),
        }
    }
}

impl QueueService {
    pub fn new(job_sender: mpsc::Sender<Job>) -> Self {
        Self { job_sender }
    }

    /// Create a bounded channel and return both halves.
    pub fn create_channel(buffer_size: usize) -> (QueueService, SharedJobReceiver) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        (QueueService::new(sender), SharedJobReceiver::new(receiver))
    }

    pub fn downgrade(&self) -> WeakQueueService {
        WeakQueueService {
            job_sender: self.job_sender.downgrade(),
        }
    }

    /// Enqueue an ingestion job without waiting for queue capacity.
    ///
    /// Returns `QueueFull` when the channel buffer is saturated so the
    /// caller can reject the request instead of blocking the accept path.
    pub fn launch_event_ingestion(&self, data: IngestEventJob) -> Result<(), QueueServiceError> {
        if !data.event_payload.is_object() {
            return Err(QueueServiceError::InvalidJobData {
                details: "Event payload must be a JSON object".to_string(),
                job_type: "ingest_event".to_string(),
            });
        }

        info!(
            "Enqueueing event ingestion job for project {}",
            data.project_id
        );
        self.job_sender
            .try_send(Job::IngestEvent(data))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    error!("Ingestion queue is full, rejecting event");
                    QueueServiceError::QueueFull {
                        job_type: "ingest_event".to_string(),
                    }
                }
                mpsc::error::TrySendError::Closed(_) => {
                    error!("Ingestion queue channel closed");
                    QueueServiceError::QueueChannelClosed {
                        job_type: "ingest_event".to_string(),
                    }
                }
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tokio::time::{timeout, Duration};

    fn test_job(project_id: i32) -> IngestEventJob {
        IngestEventJob {
            project_id,
            event_id: Some("deadbeef".to_string()),
            event_payload: json!({"message": "boom"}),
            received_at: Utc::now(),
            attempt: 0,
        }
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let (queue, mut receiver) = QueueService::create_channel(10);

        queue.send(Job::IngestEvent(test_job(42))).await.unwrap();

        let job = timeout(Duration::from_secs(1), receiver.recv())
            .await
            .expect("timed out waiting for job")
            .unwrap();

        match job {
            Job::IngestEvent(data) => {
                assert_eq!(data.project_id, 42);
                assert_eq!(data.event_id.as_deref(), Some("deadbeef"));
            }
        }
    }

    #[tokio::test]
    async fn test_launch_event_ingestion_rejects_non_object_payload() {
        let (queue, _receiver) = QueueService::create_channel(10);

        let mut job = test_job(1);
        job.event_payload = json!("not an object");

        let err = queue.launch_event_ingestion(job).unwrap_err();
        assert!(matches!(
            err,
            QueueServiceError::InvalidJobData { .. }
        ));
    }

    #[tokio::test]
    async fn test_launch_event_ingestion_reports_full_queue() {
        let (queue, _receiver) = QueueService::create_channel(1);

        queue.launch_event_ingestion(test_job(1)).unwrap();
        let err = queue.launch_event_ingestion(test_job(2)).unwrap_err();

        assert!(matches!(err, QueueServiceError::QueueFull { .. }));
    }

    #[tokio::test]
    async fn test_each_job_delivered_to_one_worker() {
        let (queue, receiver) = QueueService::create_channel(10);

        for i in 0..4 {
            queue.send(Job::IngestEvent(test_job(i))).await.unwrap();
        }
        drop(queue);

        let mut worker_a = receiver.clone();
        let mut worker_b = receiver;

        let a = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Ok(Job::IngestEvent(job)) = worker_a.recv().await {
                seen.push(job.project_id);
            }
            seen
        });
        let b = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Ok(Job::IngestEvent(job)) = worker_b.recv().await {
                seen.push(job.project_id);
            }
            seen
        });

        let (mut seen_a, seen_b) = (a.await.unwrap(), b.await.unwrap());
        seen_a.extend(seen_b);
        seen_a.sort();
        assert_eq!(seen_a, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_recv_reports_closed_channel() {
        let (queue, mut receiver) = QueueService::create_channel(1);
        drop(queue);

        let err = receiver.recv().await.unwrap_err();
        assert!(matches!(err, QueueError::ChannelClosed));
    }
}
