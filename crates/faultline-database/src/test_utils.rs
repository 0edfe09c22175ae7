//! Test utilities for database integration tests
//!
//! Provides a shared PostgreSQL testcontainer plus helpers for setting up
//! a migrated, cleaned database across all faultline crates.

use crate::DbConnection;
use faultline_migrations::Migrator;
use sea_orm::*;
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use testcontainers::{runners::AsyncRunner, ContainerAsync, GenericImage, ImageExt};
use tokio::sync::{Mutex, OnceCell};

/// Shared test database container that lives for the duration of the test run
static TEST_CONTAINER: OnceCell<Arc<Mutex<SharedContainer>>> = OnceCell::const_new();

/// Global migration lock so only one test runs migrations against the shared
/// container at a time
static MIGRATION_LOCK: OnceCell<Arc<Mutex<()>>> = OnceCell::const_new();

struct SharedContainer {
    #[allow(dead_code)]
    container: ContainerAsync<GenericImage>,
    database_url: String,
}

impl SharedContainer {
    async fn new() -> anyhow::Result<Self> {
        let db_name = "test_db";
        let username = "test_user";
        let password = "test_password";

        let postgres_container = GenericImage::new("postgres", "16")
            .with_env_var("POSTGRES_DB", db_name)
            .with_env_var("POSTGRES_USER", username)
            .with_env_var("POSTGRES_PASSWORD", password)
            .with_env_var("POSTGRES_HOST_AUTH_METHOD", "trust")
            .start()
            .await?;

        let port = postgres_container.get_host_port_ipv4(5432).await?;
        let database_url = format!(
            "postgresql://{}:{}@localhost:{}/{}",
            username, password, port, db_name
        );

        // Wait for the database to be ready
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        Ok(Self {
            container: postgres_container,
            database_url,
        })
    }
}

/// Test database backed by the shared PostgreSQL container
pub struct TestDatabase {
    pub db: Arc<DbConnection>,
    pub database_url: String,
}

impl TestDatabase {
    async fn get_or_create_container() -> anyhow::Result<Arc<Mutex<SharedContainer>>> {
        TEST_CONTAINER
            .get_or_try_init(|| async {
                let container = SharedContainer::new().await?;
                Ok(Arc::new(Mutex::new(container)))
            })
            .await
            .map(Arc::clone)
    }

    /// Connect to the shared container and truncate all tables for isolation.
    pub async fn new() -> anyhow::Result<Self> {
        let container = Self::get_or_create_container().await?;
        let container_lock = container.lock().await;
        let database_url = container_lock.database_url.clone();
        drop(container_lock);

        let db = Self::connect_with_retry(&database_url, 20).await?;

        let test_db = TestDatabase {
            db: Arc::new(db),
            database_url,
        };

        test_db
            .test_connection()
            .await
            .map_err(|e| anyhow::anyhow!("Initial connection test failed: {}", e))?;

        // Ignore errors if no tables exist yet
        test_db.cleanup_all_tables().await.ok();

        Ok(test_db)
    }

    /// Connect to the shared container and ensure migrations have run.
    ///
    /// Migrations execute at most once per container; the global lock keeps
    /// concurrent tests from racing the first run.
    pub async fn with_migrations() -> anyhow::Result<Self> {
        let test_db = Self::new().await?;

        let migrations_table_exists = test_db.migrations_table_exists().await?;

        if !migrations_table_exists {
            let migration_lock = MIGRATION_LOCK
                .get_or_init(|| async { Arc::new(Mutex::new(())) })
                .await;
            let _lock = migration_lock.lock().await;

            // Double-check after acquiring the lock
            if !test_db.migrations_table_exists().await? {
                Migrator::up(&*test_db.db, None)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

                // Verify migrations produced a known table
                let check_sql = "SELECT EXISTS (
                    SELECT FROM information_schema.tables
                    WHERE table_schema = 'public'
                    AND table_name = 'issues'
                )";
                let result = test_db.query_sql(check_sql).await?;
                let issues_table_exists = result
                    .first()
                    .and_then(|row| row.try_get::<bool>("", "exists").ok())
                    .unwrap_or(false);

                if !issues_table_exists {
                    return Err(anyhow::anyhow!("Migrations did not create expected tables"));
                }
            }
        }

        // Clean tables but preserve schema
        test_db.cleanup_all_tables().await.ok();

        Ok(test_db)
    }

    async fn migrations_table_exists(&self) -> anyhow::Result<bool> {
        let check_sql = "SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = 'public'
            AND table_name = 'seaql_migrations'
        )";
        let result = self.query_sql(check_sql).await?;
        Ok(result
            .first()
            .and_then(|row| row.try_get::<bool>("", "exists").ok())
            .unwrap_or(false))
    }

    async fn connect_with_retry(
        database_url: &str,
        max_retries: u32,
    ) -> anyhow::Result<DbConnection> {
        use std::time::Duration;

        let mut retries = max_retries;

        let mut opt = ConnectOptions::new(database_url.to_owned());
        opt.max_connections(5)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(10))
            .max_lifetime(Duration::from_secs(60))
            .sqlx_logging(false);

        loop {
            match Database::connect(opt.clone()).await {
                Ok(db) => {
                    let test = Statement::from_string(
                        DatabaseBackend::Postgres,
                        "SELECT 1".to_owned(),
                    );

                    match db.execute(test).await {
                        Ok(_) => return Ok(db),
                        Err(e) if retries > 0 => {
                            eprintln!(
                                "Database connected but test query failed (retries left: {}): {}",
                                retries, e
                            );
                        }
                        Err(e) => {
                            return Err(anyhow::anyhow!(
                                "Database connected but not responsive: {}",
                                e
                            ));
                        }
                    }
                }
                Err(e) if retries > 0 => {
                    eprintln!(
                        "Failed to connect to database (retries left: {}): {}",
                        retries, e
                    );
                }
                Err(e) => {
                    return Err(anyhow::anyhow!("Failed to connect to database: {}", e));
                }
            }

            if retries > 0 {
                retries -= 1;
                tokio::time::sleep(Duration::from_secs(1)).await;
            } else {
                return Err(anyhow::anyhow!(
                    "Failed to connect to database after {} retries",
                    max_retries
                ));
            }
        }
    }

    /// Execute raw SQL for testing
    pub async fn execute_sql(&self, sql: &str) -> anyhow::Result<ExecResult> {
        let statement = Statement::from_string(DatabaseBackend::Postgres, sql.to_owned());
        let result = self
            .db
            .execute(statement)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(result)
    }

    /// Query raw SQL and return results
    pub async fn query_sql(&self, sql: &str) -> anyhow::Result<Vec<QueryResult>> {
        let statement = Statement::from_string(DatabaseBackend::Postgres, sql.to_owned());
        let result = self
            .db
            .query_all(statement)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(result)
    }

    /// Truncate all tables except the migration bookkeeping table.
    pub async fn cleanup_all_tables(&self) -> anyhow::Result<()> {
        let tables = self
            .query_sql(
                "SELECT tablename FROM pg_tables
             WHERE schemaname = 'public'
             AND tablename NOT IN ('seaql_migrations', '_sqlx_migrations')
             ORDER BY tablename DESC",
            )
            .await?;

        for table in tables {
            if let Ok(table_name) = table.try_get::<String>("", "tablename") {
                let sql = format!("TRUNCATE TABLE {} RESTART IDENTITY CASCADE", table_name);
                self.execute_sql(&sql).await?;
            }
        }

        Ok(())
    }

    /// Test database connectivity
    pub async fn test_connection(&self) -> anyhow::Result<()> {
        let statement = Statement::from_string(DatabaseBackend::Postgres, "SELECT 1".to_owned());
        let result = self.db.query_one(statement).await?;

        if result.is_none() {
            return Err(anyhow::anyhow!("Connection test failed"));
        }

        Ok(())
    }

    /// Get the database connection
    pub fn connection(&self) -> &DbConnection {
        &self.db
    }

    /// Get the database connection as Arc
    pub fn connection_arc(&self) -> Arc<DbConnection> {
        Arc::clone(&self.db)
    }
}
