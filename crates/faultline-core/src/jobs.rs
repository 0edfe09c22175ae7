use serde::{Deserialize, Serialize};
use std::fmt;

use crate::UtcDateTime;

/// Queued unit of work for one accepted telemetry event.
///
/// Delivery is at-least-once and carries no idempotency key; `attempt` tracks
/// how many times processing has been tried so the worker can apply its
/// bounded retry policy.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngestEventJob {
    pub project_id: i32,
    pub event_id: Option<String>,
    pub event_payload: serde_json::Value,
    pub received_at: UtcDateTime,
    #[serde(default)]
    pub attempt: u32,
}

/// Core job enum containing all possible job types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Job {
    IngestEvent(IngestEventJob),
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::IngestEvent(job) => write!(
                f,
                "IngestEvent(project_id: {}, event_id: {:?}, attempt: {})",
                job.project_id, job.event_id, job.attempt
            ),
        }
    }
}

// Core queue abstraction - faultline-queue implements this
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to send job: {0}")]
    SendError(String),
    #[error("Failed to receive job: {0}")]
    ReceiveError(String),
    #[error("Queue channel closed")]
    ChannelClosed,
    #[error("Invalid job data: {0}")]
    InvalidData(String),
}

/// Core trait for job queue operations
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Send a job to the queue
    async fn send(&self, job: Job) -> Result<(), QueueError>;
}

/// Core trait for receiving jobs
#[async_trait]
pub trait JobReceiver: Send {
    /// Receive the next job
    async fn recv(&mut self) -> Result<Job, QueueError>;
}
