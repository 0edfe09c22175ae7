use faultline_core::DBDateTime;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::types::{Environment, HttpMethod, Platform};

/// Single stack frame as captured by the SDK. Persisted as JSON alongside the
/// pre-rendered `stack_trace` text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    pub index: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abs_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineno: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colno: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_app: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// A single normalized error event.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "exceptions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub project_id: i32,
    /// Set once the aggregator has assigned this event to an issue.
    pub issue_id: Option<i32>,

    pub environment: Environment,
    pub platform: Option<Platform>,

    // What went wrong
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub details: Option<String>,

    // Stack trace, both rendered for display and structured for tooling
    #[sea_orm(column_type = "Text", nullable)]
    pub stack_trace: Option<String>,
    pub frames: Option<Json>,

    // HTTP request context, when the event carried one
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub status: Option<String>,
    pub status_code: Option<i32>,
    pub client_ip: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub response_body: Option<String>,

    pub created_at: DBDateTime,
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
    #[sea_orm(
        belongs_to = "super::issues::Entity",
        from = "Column::IssueId",
        to = "super::issues::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    Issues,
}

impl Related<super::projects::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Projects.def()
    }
}

impl Related<super::issues::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Issues.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
