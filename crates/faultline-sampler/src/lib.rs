//! Sampling engine for building bounded exception corpora.
//!
//! Given the stored exceptions of one or more issues, this crate
//! deduplicates them, draws a stratified per-issue sample, apportions a
//! global budget across issues, and serializes the survivors into a compact
//! textual corpus for a downstream analysis consumer.

pub mod config;
pub mod context;
pub mod sampling;

pub use config::SamplerConfig;
pub use context::ContextBuilder;
pub use sampling::{apportion, dedupe, stratified_sample};
