//! Corpus builder: fetches per-issue pools and assembles the bounded,
//! serialized corpus handed to the downstream analysis consumer.

use std::sync::Arc;

use faultline_core::{ServiceError, ServiceResult};
use faultline_entities::exceptions;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use tracing::debug;

use crate::config::SamplerConfig;
use crate::sampling::{apportion, dedupe, stratified_sample};

pub struct ContextBuilder {
    db: Arc<DatabaseConnection>,
    config: SamplerConfig,
}

impl ContextBuilder {
    pub fn new(db: Arc<DatabaseConnection>, config: SamplerConfig) -> Self {
        Self { db, config }
    }

    /// Build the serialized corpus for the given issues.
    ///
    /// Per-issue fetches fan out in parallel; the global-cap step needs all
    /// per-issue samples and runs once every fetch has completed.
    pub async fn build_corpus(&self, issue_ids: &[i32]) -> ServiceResult<String> {
        let pools = futures::future::try_join_all(
            issue_ids.iter().map(|&issue_id| self.fetch_pool(issue_id)),
        )
        .await?;

        Ok(self.assemble(pools, &mut StdRng::from_entropy()))
    }

    /// Deterministic core of corpus assembly, split out so tests can inject
    /// a seeded random source.
    pub fn assemble<R: Rng>(&self, pools: Vec<Vec<exceptions::Model>>, rng: &mut R) -> String {
        let samples: Vec<Vec<exceptions::Model>> = pools
            .into_iter()
            .map(|pool| stratified_sample(dedupe(pool), self.config.per_issue_limit, rng))
            .collect();

        let counts: Vec<usize> = samples.iter().map(Vec::len).collect();
        let total: usize = counts.iter().sum();

        let capped: Vec<Vec<exceptions::Model>> = if total <= self.config.global_limit {
            samples
        } else {
            debug!(
                "Corpus over global limit ({} > {}), apportioning",
                total, self.config.global_limit
            );
            let allotments = apportion(&counts, self.config.global_limit);
            samples
                .into_iter()
                .zip(allotments)
                .map(|(mut sample, allotment)| {
                    sample.truncate(allotment);
                    sample
                })
                .collect()
        };

        capped
            .iter()
            .flatten()
            .map(serialize_exception)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Newest-first pool for one issue, capped at the configured fetch limit.
    async fn fetch_pool(&self, issue_id: i32) -> ServiceResult<Vec<exceptions::Model>> {
        exceptions::Entity::find()
            .filter(exceptions::Column::IssueId.eq(issue_id))
            .order_by_desc(exceptions::Column::CreatedAt)
            .limit(self.config.fetch_limit())
            .all(self.db.as_ref())
            .await
            .map_err(|e| ServiceError::Database(e.to_string()))
    }
}

/// Render one exception as a single corpus line.
pub fn serialize_exception(exception: &exceptions::Model) -> String {
    let mut line = format!(
        "<exception created_at=\"{}\" name=\"{}\" message=\"{}\" path=\"{}\"",
        xml_escape(&exception.created_at.to_rfc3339()),
        xml_escape(&exception.name),
        xml_escape(&exception.message),
        xml_escape(exception.url.as_deref().unwrap_or("")),
    );

    if let Some(method) = exception.method {
        line.push_str(&format!(" method=\"{}\"", method.as_str()));
    }
    if let Some(status) = &exception.status {
        line.push_str(&format!(" status=\"{}\"", xml_escape(status)));
    }
    if let Some(status_code) = exception.status_code {
        line.push_str(&format!(" status_code=\"{}\"", status_code));
    }

    line.push_str(" />");
    line
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use faultline_database::test_utils::TestDatabase;
    use faultline_entities::types::{Environment, HttpMethod, IssueStatus, Severity};
    use faultline_entities::{issues, projects};
    use rand::rngs::StdRng;
    use sea_orm::{ActiveModelTrait, Set};

    fn sample_exception(id: i64, name: &str, message: &str) -> exceptions::Model {
        exceptions::Model {
            id,
            project_id: 1,
            issue_id: Some(1),
            environment: Environment::Production,
            platform: None,
            name: name.to_string(),
            message: message.to_string(),
            details: None,
            stack_trace: None,
            frames: None,
            url: Some("/checkout".to_string()),
            method: Some(HttpMethod::Post),
            status: Some("Internal Server Error".to_string()),
            status_code: Some(500),
            client_ip: None,
            response_body: None,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_serialize_exception_full_line() {
        let line = serialize_exception(&sample_exception(1, "TypeError", "boom"));
        assert_eq!(
            line,
            "<exception created_at=\"2025-06-01T12:00:00+00:00\" name=\"TypeError\" \
             message=\"boom\" path=\"/checkout\" method=\"POST\" \
             status=\"Internal Server Error\" status_code=\"500\" />"
        );
    }

    #[test]
    fn test_serialize_exception_escapes_attributes() {
        let mut exception = sample_exception(1, "Error", "a < b & \"c\"");
        exception.method = None;
        exception.status = None;
        exception.status_code = None;
        exception.url = None;

        let line = serialize_exception(&exception);
        assert!(line.contains("message=\"a &lt; b &amp; &quot;c&quot;\""));
        assert!(line.contains("path=\"\""));
        assert!(!line.contains("method="));
        assert!(!line.contains("status="));
    }

    #[test]
    fn test_assemble_under_global_limit_keeps_everything() {
        let config = SamplerConfig {
            per_issue_limit: 10,
            fetch_multiplier: 3,
            global_limit: 100,
        };
        let builder = ContextBuilder::new(Arc::new(DatabaseConnection::Disconnected), config);

        // Three issues, five distinct samples each: 15 <= 100
        let pools: Vec<Vec<exceptions::Model>> = (0..3)
            .map(|issue| {
                (0..5)
                    .map(|i| {
                        sample_exception(
                            (issue * 5 + i) as i64,
                            &format!("Error{}", issue),
                            &format!("message {}", i),
                        )
                    })
                    .collect()
            })
            .collect();

        let mut rng = StdRng::seed_from_u64(1);
        let corpus = builder.assemble(pools, &mut rng);
        assert_eq!(corpus.lines().count(), 15);
    }

    #[test]
    fn test_assemble_applies_global_cap() {
        let config = SamplerConfig {
            per_issue_limit: 10,
            fetch_multiplier: 3,
            global_limit: 12,
        };
        let builder = ContextBuilder::new(Arc::new(DatabaseConnection::Disconnected), config);

        // Two issues with 10 distinct samples each: 20 > 12
        let pools: Vec<Vec<exceptions::Model>> = (0..2)
            .map(|issue| {
                (0..10)
                    .map(|i| {
                        sample_exception(
                            (issue * 10 + i) as i64,
                            &format!("Error{}", issue),
                            &format!("message {}", i),
                        )
                    })
                    .collect()
            })
            .collect();

        let mut rng = StdRng::seed_from_u64(1);
        let corpus = builder.assemble(pools, &mut rng);
        assert_eq!(corpus.lines().count(), 12);
    }

    async fn seed_issue_with_exceptions(
        db: &Arc<DatabaseConnection>,
        count: usize,
    ) -> anyhow::Result<i32> {
        let project = projects::ActiveModel {
            name: Set("Sampler Test".to_string()),
            slug: Set(format!("sampler-test-{}", uuid::Uuid::new_v4())),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db.as_ref())
        .await?;

        let issue = issues::ActiveModel {
            project_id: Set(project.id),
            name: Set("TypeError".to_string()),
            status: Set(IssueStatus::Open),
            severity: Set(Severity::Medium),
            first_seen: Set(Utc::now()),
            last_seen: Set(Utc::now()),
            event_count: Set(count as i32),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db.as_ref())
        .await?;

        for i in 0..count {
            exceptions::ActiveModel {
                project_id: Set(project.id),
                issue_id: Set(Some(issue.id)),
                environment: Set(Environment::Production),
                name: Set("TypeError".to_string()),
                message: Set(format!("occurrence {}", i)),
                created_at: Set(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::minutes(i as i64)),
                ..Default::default()
            }
            .insert(db.as_ref())
            .await?;
        }

        Ok(issue.id)
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_build_corpus_fetches_newest_first_and_caps() -> anyhow::Result<()> {
        let test_db = TestDatabase::with_migrations().await?;
        let db = test_db.connection_arc();

        let issue_id = seed_issue_with_exceptions(&db, 30).await?;

        let config = SamplerConfig {
            per_issue_limit: 10,
            fetch_multiplier: 3,
            global_limit: 100,
        };
        let builder = ContextBuilder::new(db, config);

        let corpus = builder.build_corpus(&[issue_id]).await?;
        let lines: Vec<&str> = corpus.lines().collect();
        assert_eq!(lines.len(), 10);
        // Newest stratum leads the sample
        assert!(lines[0].contains("occurrence 29"));

        Ok(())
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_build_corpus_empty_issue_list() -> anyhow::Result<()> {
        let test_db = TestDatabase::with_migrations().await?;
        let db = test_db.connection_arc();

        let builder = ContextBuilder::new(db, SamplerConfig::default());
        let corpus = builder.build_corpus(&[]).await?;
        assert!(corpus.is_empty());

        Ok(())
    }
}
