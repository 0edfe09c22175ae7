//! Event ingestion pipeline: envelope decoding, normalization, aggregation.
//!
//! The HTTP accept path only decodes and enqueues; background workers pull
//! jobs off the queue, normalize the raw SDK payload, store the exception,
//! and update the owning issue.

pub mod envelope;
pub mod handlers;
pub mod normalizer;
pub mod service;
pub mod worker;

pub use envelope::{Envelope, EnvelopeError, EnvelopeItem, ItemType};
pub use normalizer::{normalize, HttpContext, NormalizedEvent};
pub use service::{IngestionService, ProcessedEvent};
pub use worker::spawn_workers;
