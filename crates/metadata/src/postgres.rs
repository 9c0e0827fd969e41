//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{FileMap, asset_patterns, into_file_map, submission_scope};
use crate::repos::FileRepo;
use crate::store::{MetadataStore, NAME_BATCH};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres, QueryBuilder};
use std::str::FromStr;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters,
    /// so the password can come from the environment rather than a URL.
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements cannot hold more than one command.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

fn push_scope(qb: &mut QueryBuilder<'_, Postgres>, app_id: &str, submission_id: Option<&str>) {
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
impl FileRepo for PostgresStore {
    async fn add_file(
        &self,
        app_id: &str,
        submission_id: Option<&str>,
        name: &str,
        hash: &str,
    ) -> MetadataResult<()> {
        let submission_id = submission_scope(submission_id);
        sqlx::query("INSERT INTO files (app_id, submission_id, name, hash) VALUES ($1, $2, $3, $4)")
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
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE files SET hash = ");
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
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM files");
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
        let mut qb = QueryBuilder::<Postgres>::new("SELECT hash FROM files");
        push_scope(&mut qb, app_id, submission_id);
        qb.push(" AND name = ");
        qb.push_bind(name.to_string());
        qb.build_query_scalar::<String>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("file {name} in {app_id}")))
    }

    async fn get_files(&self, app_id: &str, submission_id: Option<&str>) -> MetadataResult<FileMap> {
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
        let mut qb = QueryBuilder::<Postgres>::new("SELECT name, hash FROM files");
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
        let mut qb = QueryBuilder::<Postgres>::new("SELECT name, hash FROM files");
        push_scope(&mut qb, app_id, submission_id);
        qb.push(" AND name LIKE ANY(");
        qb.push_bind(asset_patterns());
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
            let mut qb = QueryBuilder::<Postgres>::new("SELECT name, hash FROM files");
            push_scope(&mut qb, app_id, submission_id);
            qb.push(" AND name = ANY(");
            qb.push_bind(batch.to_vec());
            qb.push(")");

            let rows: Vec<(String, String)> = qb.build_query_as().fetch_all(&self.pool).await?;
            files.extend(rows);
        }
        Ok(files)
    }

    async fn app_exists(&self, app_id: &str) -> MetadataResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE app_id = $1)")
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
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE submission_id = $1)")
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
            SELECT app_id, $1, name, hash FROM files
            WHERE app_id = $2 AND (submission_id IS NULL OR submission_id = '')
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

#[cfg(test)]
mod tests {
    use super::{POSTGRES_SCHEMA, postgres_schema_statements};

    #[test]
    fn postgres_schema_statements_skips_empty_and_comment_only() {
        let schema = r#"
            -- comment only

            CREATE TABLE foo (id int);
            ;
            -- another comment
            CREATE TABLE bar (id int);
        "#;

        let statements = postgres_schema_statements(schema);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("CREATE TABLE foo"));
        assert!(statements[1].contains("CREATE TABLE bar"));
    }

    #[test]
    fn embedded_schema_has_partial_unique_indexes() {
        let statements = postgres_schema_statements(POSTGRES_SCHEMA);
        assert_eq!(statements.len(), 6);
        assert!(
            statements
                .iter()
                .any(|s| s.contains("files_unique_name_2") && s.contains("IS NULL"))
        );
    }
}
