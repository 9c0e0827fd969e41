//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::FileRepo;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: FileRepo + Send + Sync {
    /// Run database migrations. Safe to call repeatedly.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Rows per `IN (...)` query when looking files up by name.
pub(crate) const NAME_BATCH: usize = 500;

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            // Match PostgreSQL, where LIKE is case-sensitive.
            .pragma("case_sensitive_like", "ON");

        // Single writer; concurrent axum handlers otherwise hit "database is locked".
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::{FileMap, asset_patterns, into_file_map, submission_scope};
    use sqlx::QueryBuilder;

    fn push_scope<'a>(
        qb: &mut QueryBuilder<'a, Sqlite>,
        app_id: &str,
        submission_id: Option<&str>,
    ) {
        qb.push(" WHERE app_id = ");
        qb.push_bind(app_id.to_string());
        match submission_id {
            Some(submission_id) => {
                qb.push(" AND submission_id = ");
                qb.push_bind(submission_id.to_string());
            }
            None => {
                qb.push(" AND (submission_id IS NULL OR submission_id = '')");
            }
        }
    }

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn add_file(
            &self,
            app_id: &str,
            submission_id: Option<&str>,
            name: &str,
            hash: &str,
        ) -> MetadataResult<()> {
            let submission_id = submission_scope(submission_id);
            sqlx::query("INSERT INTO files (app_id, submission_id, name, hash) VALUES (?, ?, ?, ?)")
                .bind(app_id)
                .bind(submission_id)
                .bind(name)
                .bind(hash)
                .execute(&self.pool)
                .await
                .map_err(|e| MetadataError::from_insert(e, || format!("file {name} in {app_id}")))?;
            Ok(())
        }

        async fn update_file(
            &self,
            app_id: &str,
            submission_id: Option<&str>,
            name: &str,
            hash: &str,
        ) -> MetadataResult<()> {
            let submission_id = submission_scope(submission_id);
            let mut qb = QueryBuilder::<Sqlite>::new("UPDATE files SET hash = ");
            qb.push_bind(hash.to_string());
            push_scope(&mut qb, app_id, submission_id);
            qb.push(" AND name = ");
            qb.push_bind(name.to_string());
            qb.build().execute(&self.pool).await?;
            Ok(())
        }

        async fn delete_file(
            &self,
            app_id: &str,
            submission_id: Option<&str>,
            name: &str,
        ) -> MetadataResult<()> {
            let submission_id = submission_scope(submission_id);
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM files");
            push_scope(&mut qb, app_id, submission_id);
            qb.push(" AND name = ");
            qb.push_bind(name.to_string());
            qb.build().execute(&self.pool).await?;
            Ok(())
        }

        async fn get_file(
            &self,
            app_id: &str,
            submission_id: Option<&str>,
            name: &str,
        ) -> MetadataResult<String> {
            let submission_id = submission_scope(submission_id);
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT hash FROM files");
            push_scope(&mut qb, app_id, submission_id);
            qb.push(" AND name = ");
            qb.push_bind(name.to_string());
            qb.build_query_scalar::<String>()
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("file {name} in {app_id}")))
        }

        async fn get_files(
            &self,
            app_id: &str,
            submission_id: Option<&str>,
        ) -> MetadataResult<FileMap> {
            self.get_filtered_files(app_id, submission_id, "").await
        }

        async fn get_filtered_files(
            &self,
            app_id: &str,
            submission_id: Option<&str>,
            pattern: &str,
        ) -> MetadataResult<FileMap> {
            let submission_id = submission_scope(submission_id);
            let pattern = if pattern.is_empty() { "%" } else { pattern };
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT name, hash FROM files");
            push_scope(&mut qb, app_id, submission_id);
            qb.push(" AND name LIKE ");
            qb.push_bind(pattern.to_string());

            let rows: Vec<(String, String)> = qb.build_query_as().fetch_all(&self.pool).await?;
            Ok(into_file_map(rows))
        }

        async fn get_asset_files(
            &self,
            app_id: &str,
            submission_id: Option<&str>,
        ) -> MetadataResult<FileMap> {
            let submission_id = submission_scope(submission_id);
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT name, hash FROM files");
            push_scope(&mut qb, app_id, submission_id);
            qb.push(" AND (");
            let mut separated = qb.separated(" OR ");
            for pattern in asset_patterns() {
                separated.push("name LIKE ");
                separated.push_bind_unseparated(pattern);
            }
            qb.push(")");

            let rows: Vec<(String, String)> = qb.build_query_as().fetch_all(&self.pool).await?;
            Ok(into_file_map(rows))
        }

        async fn get_files_by_names(
            &self,
            app_id: &str,
            submission_id: Option<&str>,
            names: &[String],
        ) -> MetadataResult<FileMap> {
            let submission_id = submission_scope(submission_id);
            let mut files = FileMap::new();
            for batch in names.chunks(NAME_BATCH) {
                let mut qb = QueryBuilder::<Sqlite>::new("SELECT name, hash FROM files");
                push_scope(&mut qb, app_id, submission_id);
                qb.push(" AND name IN (");
                let mut separated = qb.separated(", ");
                for name in batch {
                    separated.push_bind(name.clone());
                }
                qb.push(")");

                let rows: Vec<(String, String)> =
                    qb.build_query_as().fetch_all(&self.pool).await?;
                files.extend(rows);
            }
            Ok(files)
        }

        async fn app_exists(&self, app_id: &str) -> MetadataResult<bool> {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE app_id = ?)")
                    .bind(app_id)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(exists)
        }

        async fn submission_exists(&self, submission_id: &str) -> MetadataResult<bool> {
            if submission_id.is_empty() {
                return Ok(false);
            }
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE submission_id = ?)")
                    .bind(submission_id)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(exists)
        }

        async fn snapshot(&self, app_id: &str, submission_id: &str) -> MetadataResult<u64> {
            if submission_id.is_empty() {
                return Err(MetadataError::Constraint(
                    "snapshot requires a submission id".to_string(),
                ));
            }
            let result = sqlx::query(
                r#"
                INSERT INTO files (app_id, submission_id, name, hash)
                SELECT app_id, ?, name, hash FROM files
                WHERE app_id = ? AND (submission_id IS NULL OR submission_id = '')
                "#,
            )
            .bind(submission_id)
            .bind(app_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MetadataError::from_insert(e, || format!("submission {submission_id} of {app_id}"))
            })?;
            Ok(result.rows_affected())
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_id TEXT NOT NULL CHECK (length(app_id) <= 64),
    submission_id TEXT DEFAULT NULL CHECK (submission_id IS NULL OR length(submission_id) <= 64),
    name TEXT NOT NULL,
    hash TEXT NOT NULL
);

-- A NULL submission_id cannot take part in a composite unique constraint,
-- so each namespace kind gets its own partial index.
CREATE UNIQUE INDEX IF NOT EXISTS files_unique_name_1
    ON files(app_id, submission_id, name) WHERE submission_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS files_unique_name_2
    ON files(app_id, name) WHERE submission_id IS NULL;

CREATE INDEX IF NOT EXISTS files_app_id_index ON files(app_id);
CREATE INDEX IF NOT EXISTS files_submission_id_index ON files(submission_id);
CREATE INDEX IF NOT EXISTS files_name_index ON files(name);
"#;
