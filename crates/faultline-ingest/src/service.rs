//! Ingestion service: stores normalized exceptions and maintains issues.

use std::sync::Arc;

use faultline_core::{IngestEventJob, ServiceError, ServiceResult, UtcDateTime};
use faultline_entities::types::{IssueStatus, Severity};
use faultline_entities::{exceptions, issues, projects};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tracing::{info, warn};

use crate::normalizer::{normalize, NormalizedEvent};

/// Outcome of a successfully processed job.
#[derive(Debug, Clone, Copy)]
pub struct ProcessedEvent {
    pub exception_id: i64,
    pub issue_id: i32,
}

/// Processes ingestion jobs: project lookup, normalization, issue
/// aggregation, exception storage.
pub struct IngestionService {
    db: Arc<DatabaseConnection>,
}

impl IngestionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Process one queued event.
    ///
    /// Returns `Ok(None)` when the job's project no longer exists; the
    /// caller already got its 200, so the job is dropped with a warning
    /// rather than retried.
    pub async fn process_event(
        &self,
        job: &IngestEventJob,
    ) -> ServiceResult<Option<ProcessedEvent>> {
        let project = projects::Entity::find_by_id(job.project_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))?;

        let Some(project) = project else {
            warn!(
                "Dropping event for unknown project {} (event_id: {:?})",
                job.project_id, job.event_id
            );
            return Ok(None);
        };

        let event = normalize(&job.event_payload);

        let issue = self
            .upsert_issue(project.id, &event.name, job.received_at)
            .await?;
        let exception = self
            .create_exception(project.id, issue.id, &event, job.received_at)
            .await?;

        info!(
            "Stored exception {} for issue {} ({}) in project {}",
            exception.id, issue.id, issue.name, project.id
        );

        Ok(Some(ProcessedEvent {
            exception_id: exception.id,
            issue_id: issue.id,
        }))
    }

    /// Find-or-create the issue for `(project_id, name)`.
    ///
    /// Grouping is exact name match only. On the first occurrence the issue
    /// starts at medium severity with a count of 1; every later occurrence
    /// bumps the count, refreshes `last_seen`, and forces the status back to
    /// open even if it had been resolved or ignored.
    async fn upsert_issue(
        &self,
        project_id: i32,
        name: &str,
        now: UtcDateTime,
    ) -> ServiceResult<issues::Model> {
        if let Some(existing) = self.find_issue(project_id, name).await? {
            return self.touch_issue(existing, now).await;
        }

        let fresh = issues::ActiveModel {
            project_id: Set(project_id),
            name: Set(name.to_string()),
            status: Set(IssueStatus::Open),
            severity: Set(Severity::Medium),
            first_seen: Set(now),
            last_seen: Set(now),
            event_count: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        match fresh.insert(self.db.as_ref()).await {
            Ok(issue) => Ok(issue),
            // The unique index on (project_id, name) means a concurrent
            // first occurrence may have won the insert; fall back to the
            // update path against the winner.
            Err(insert_err) => match self.find_issue(project_id, name).await? {
                Some(existing) => self.touch_issue(existing, now).await,
                None => Err(ServiceError::Database(insert_err.to_string())),
            },
        }
    }

    async fn find_issue(
        &self,
        project_id: i32,
        name: &str,
    ) -> ServiceResult<Option<issues::Model>> {
        issues::Entity::find()
            .filter(issues::Column::ProjectId.eq(project_id))
            .filter(issues::Column::Name.eq(name))
            .one(self.db.as_ref())
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))
    }

    async fn touch_issue(
        &self,
        issue: issues::Model,
        now: UtcDateTime,
    ) -> ServiceResult<issues::Model> {
        let event_count = issue.event_count + 1;
        let mut active: issues::ActiveModel = issue.into();
        active.event_count = Set(event_count);
        active.last_seen = Set(now);
        active.status = Set(IssueStatus::Open);
        active.updated_at = Set(now);

        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))
    }

    async fn create_exception(
        &self,
        project_id: i32,
        issue_id: i32,
        event: &NormalizedEvent,
        now: UtcDateTime,
    ) -> ServiceResult<exceptions::Model> {
        let frames = if event.frames.is_empty() {
            None
        } else {
            Some(
                serde_json::to_value(&event.frames)
                    .map_err(|e| ServiceError::Validation {
                        message: format!("Failed to serialize stack frames: {}", e),
                    })?,
            )
        };

        let http = event.http.clone().unwrap_or_default();

        let exception = exceptions::ActiveModel {
            project_id: Set(project_id),
            issue_id: Set(Some(issue_id)),
            environment: Set(event.environment),
            platform: Set(event.platform),
            name: Set(event.name.clone()),
            message: Set(event.message.clone()),
            details: Set(event.details.clone()),
            stack_trace: Set(event.stack_trace.clone()),
            frames: Set(frames),
            url: Set(http.url),
            method: Set(http.method),
            status: Set(http.status),
            status_code: Set(http.status_code),
            client_ip: Set(http.client_ip),
            response_body: Set(http.response_body),
            created_at: Set(now),
            ..Default::default()
        };

        exception
            .insert(self.db.as_ref())
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use faultline_database::test_utils::TestDatabase;
    use serde_json::json;
    use uuid::Uuid;

    async fn setup_test_db() -> TestDatabase {
        TestDatabase::with_migrations()
            .await
            .expect("Failed to create test database")
    }

    async fn create_test_project(db: &Arc<DatabaseConnection>) -> i32 {
        let unique_slug = format!("test-project-{}", Uuid::new_v4());
        let project = projects::ActiveModel {
            name: Set("Test Project".to_string()),
            slug: Set(unique_slug),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };

        project
            .insert(db.as_ref())
            .await
            .expect("Failed to create project")
            .id
    }

    fn test_job(project_id: i32, payload: serde_json::Value) -> IngestEventJob {
        IngestEventJob {
            project_id,
            event_id: Some(Uuid::new_v4().simple().to_string()),
            event_payload: payload,
            received_at: Utc::now(),
            attempt: 0,
        }
    }

    fn type_error_payload() -> serde_json::Value {
        json!({
            "exception": {
                "values": [{
                    "type": "TypeError",
                    "value": "Cannot read property 'foo' of undefined",
                    "stacktrace": {
                        "frames": [
                            {"filename": "/app/index.js", "function": "doSomething", "lineno": 42}
                        ]
                    }
                }]
            }
        })
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_process_event_creates_issue_and_exception() {
        let test_db = setup_test_db().await;
        let db = test_db.connection_arc();
        let service = IngestionService::new(db.clone());

        let project_id = create_test_project(&db).await;
        let job = test_job(project_id, type_error_payload());

        let processed = service
            .process_event(&job)
            .await
            .expect("Failed to process event")
            .expect("Event should not be dropped");

        let issue = issues::Entity::find_by_id(processed.issue_id)
            .one(db.as_ref())
            .await
            .unwrap()
            .expect("Issue not found");
        assert_eq!(issue.project_id, project_id);
        assert_eq!(issue.name, "TypeError");
        assert_eq!(issue.event_count, 1);
        assert_eq!(issue.status, IssueStatus::Open);
        assert_eq!(issue.severity, Severity::Medium);
        assert_eq!(issue.first_seen, issue.last_seen);

        let exception = exceptions::Entity::find_by_id(processed.exception_id)
            .one(db.as_ref())
            .await
            .unwrap()
            .expect("Exception not found");
        assert_eq!(exception.issue_id, Some(issue.id));
        assert_eq!(exception.name, "TypeError");
        assert_eq!(
            exception.message,
            "Cannot read property 'foo' of undefined"
        );
        assert!(exception.stack_trace.unwrap().contains("doSomething"));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_repeat_occurrence_updates_and_reopens_issue() {
        let test_db = setup_test_db().await;
        let db = test_db.connection_arc();
        let service = IngestionService::new(db.clone());

        let project_id = create_test_project(&db).await;

        let first = service
            .process_event(&test_job(project_id, type_error_payload()))
            .await
            .unwrap()
            .unwrap();

        // Resolve the issue, then ingest the same name again
        let issue = issues::Entity::find_by_id(first.issue_id)
            .one(db.as_ref())
            .await
            .unwrap()
            .unwrap();
        let first_last_seen = issue.last_seen;
        let mut active: issues::ActiveModel = issue.into();
        active.status = Set(IssueStatus::Resolved);
        active.update(db.as_ref()).await.unwrap();

        let second = service
            .process_event(&test_job(project_id, type_error_payload()))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(second.issue_id, first.issue_id);

        let issue = issues::Entity::find_by_id(first.issue_id)
            .one(db.as_ref())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(issue.event_count, 2);
        assert_eq!(issue.status, IssueStatus::Open);
        assert!(issue.last_seen >= first_last_seen);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_concurrent_first_occurrences_converge_on_one_issue() {
        let test_db = setup_test_db().await;
        let db = test_db.connection_arc();
        let service = IngestionService::new(db.clone());

        let project_id = create_test_project(&db).await;

        // Both events race to create the issue; the unique index on
        // (project_id, name) forces the loser onto the update path
        let job_a = test_job(project_id, type_error_payload());
        let job_b = test_job(project_id, type_error_payload());
        let (a, b) = tokio::join!(
            service.process_event(&job_a),
            service.process_event(&job_b)
        );
        let a = a.expect("first concurrent event failed").unwrap();
        let b = b.expect("second concurrent event failed").unwrap();

        assert_eq!(a.issue_id, b.issue_id);

        let issues = issues::Entity::find()
            .filter(issues::Column::ProjectId.eq(project_id))
            .all(db.as_ref())
            .await
            .unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].event_count, 2);
        assert_eq!(issues[0].name, "TypeError");
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_same_name_in_different_projects_gets_separate_issues() {
        let test_db = setup_test_db().await;
        let db = test_db.connection_arc();
        let service = IngestionService::new(db.clone());

        let project_a = create_test_project(&db).await;
        let project_b = create_test_project(&db).await;

        let a = service
            .process_event(&test_job(project_a, type_error_payload()))
            .await
            .unwrap()
            .unwrap();
        let b = service
            .process_event(&test_job(project_b, type_error_payload()))
            .await
            .unwrap()
            .unwrap();

        assert_ne!(a.issue_id, b.issue_id);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_unknown_project_drops_event() {
        let test_db = setup_test_db().await;
        let db = test_db.connection_arc();
        let service = IngestionService::new(db.clone());

        let result = service
            .process_event(&test_job(999_999, type_error_payload()))
            .await
            .expect("Dropping is not an error");
        assert!(result.is_none());

        let stored = exceptions::Entity::find()
            .all(db.as_ref())
            .await
            .unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_minimal_payload_uses_normalizer_defaults() {
        let test_db = setup_test_db().await;
        let db = test_db.connection_arc();
        let service = IngestionService::new(db.clone());

        let project_id = create_test_project(&db).await;
        let processed = service
            .process_event(&test_job(project_id, json!({})))
            .await
            .unwrap()
            .unwrap();

        let exception = exceptions::Entity::find_by_id(processed.exception_id)
            .one(db.as_ref())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exception.name, "Error");
        assert_eq!(exception.message, "Unknown error");
        assert_eq!(
            exception.environment,
            faultline_entities::types::Environment::Production
        );
        assert!(exception.frames.is_none());
    }
}
