//! SeaORM entity definitions for the Faultline schema

pub mod exceptions;
pub mod issues;
pub mod projects;
pub mod types;
