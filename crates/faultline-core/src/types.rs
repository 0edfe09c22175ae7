//! Shared type aliases for datetime handling
//!
//! All timestamps in Faultline are stored and compared in UTC. Entities use
//! `DBDateTime` for persisted columns and services use `UtcDateTime` for
//! in-flight values; both resolve to the same chrono type.

use chrono::{DateTime as ChronoDateTime, Utc};

/// Datetime type for database columns.
pub type DBDateTime = ChronoDateTime<Utc>;

/// Standard datetime type for use across all crates.
pub type UtcDateTime = ChronoDateTime<Utc>;
