//! Implementation of the ingestion job queue using tokio channels
//! This crate implements the JobQueue trait from faultline-core using a
//! bounded mpsc channel with a shareable receiver for competing workers.

pub mod dead_letter;
pub mod queue;

pub use dead_letter::*;
pub use queue::*;

// Re-export core traits for convenience
pub use faultline_core::{JobQueue, JobReceiver, QueueError};
