//! Database migrations for Faultline

pub use sea_orm_migration::prelude::*;

mod migration;

pub use migration::Migrator;
