//! File directory for the bundler.
//!
//! Records which names exist in each app namespace (development or a
//! submission snapshot) and the content hash each name currently points to.
//! Backed by SQLite for single-node deployments and tests, or PostgreSQL.

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::FileMap;
pub use postgres::PostgresStore;
pub use repos::FileRepo;
pub use store::{MetadataStore, SqliteStore};

use bundler_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    config.validate().map_err(MetadataError::Config)?;

    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
        MetadataConfig::Postgres {
            url,
            host,
            port,
            username,
            password,
            database,
            max_connections,
            statement_timeout_ms,
        } => {
            let store = if let Some(url) = url {
                tracing::info!("Connecting to PostgreSQL using connection URL");
                PostgresStore::from_url(url, *max_connections, *statement_timeout_ms).await?
            } else if let (Some(host), Some(database)) = (host.as_ref(), database.as_ref()) {
                PostgresStore::from_params(
                    host,
                    port.unwrap_or(5432),
                    username.as_deref(),
                    password.as_deref(),
                    database,
                    *max_connections,
                    *statement_timeout_ms,
                )
                .await?
            } else {
                return Err(MetadataError::Config(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ));
            };
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundler_core::config::MetadataConfig;

    #[tokio::test]
    async fn test_from_config_sqlite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("metadata.db");
        let config = MetadataConfig::Sqlite {
            path: db_path.clone(),
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert_eq!(store.backend_name(), "sqlite");
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_from_config_rejects_incomplete_postgres() {
        let config = MetadataConfig::Postgres {
            url: None,
            host: Some("localhost".to_string()),
            port: None,
            username: None,
            password: None,
            database: None,
            max_connections: 4,
            statement_timeout_ms: None,
        };

        let err = from_config(&config).await.err().unwrap();
        assert!(matches!(err, MetadataError::Config(_)));
    }
}
