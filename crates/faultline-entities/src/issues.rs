use faultline_core::DBDateTime;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::types::{IssueStatus, Severity};

/// An aggregated group of exceptions sharing the same (project, name) pair.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "issues")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    // Grouping key; (project_id, name) is unique
    pub project_id: i32,
    pub name: String,

    pub status: IssueStatus,
    pub severity: Severity,

    // Timestamps and metrics
    pub first_seen: DBDateTime,
    pub last_seen: DBDateTime,
    pub event_count: i32,

    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::projects::Entity",
        from = "Column::ProjectId",
        to = "super::projects::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Projects,
    #[sea_orm(has_many = "super::exceptions::Entity")]
    Exceptions,
}

impl Related<super::projects::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Projects.def()
    }
}

impl Related<super::exceptions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Exceptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
