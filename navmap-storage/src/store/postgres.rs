//! PostgreSQL document store (feature `postgres`).
//!
//! Documents live whole in a JSONB column. Array-element lookups use JSONB
//! containment (`@>`) on the feature array, and "first match" follows the
//! `seq` insertion counter. There is no planar index without PostGIS, so
//! spatial index requests are served by a GIN `jsonb_path_ops` index over
//! the same field.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use navmap_core::{validate_identifier, ConfigError, MapDocument, StoreError, StoreResult};
use serde_json::Value;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

use super::traits::{DocumentFilter, DocumentStore, ElementMatch, IndexKind, IndexSpec};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PostgresStoreConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait timeout when checking a connection out of the pool
    pub timeout: Duration,
}

impl Default for PostgresStoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "navmap".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(5),
        }
    }
}

impl PostgresStoreConfig {
    /// Reads `NAVMAP_DB_HOST`, `NAVMAP_DB_PORT`, `NAVMAP_DB_NAME`,
    /// `NAVMAP_DB_USER`, `NAVMAP_DB_PASSWORD`, `NAVMAP_DB_POOL_SIZE` and
    /// `NAVMAP_DB_TIMEOUT` (seconds).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("NAVMAP_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("NAVMAP_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("NAVMAP_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("NAVMAP_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("NAVMAP_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("NAVMAP_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("NAVMAP_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn create_pool(&self) -> StoreResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Connection {
                reason: format!("failed to create pool: {}", e),
            })
    }
}

// ============================================================================
// STORE
// ============================================================================

fn query_err(e: tokio_postgres::Error) -> StoreError {
    if let Some(db_error) = e.as_db_error() {
        if db_error.code() == &SqlState::UNDEFINED_TABLE {
            return StoreError::Query {
                reason: format!("{} (run migrate first)", db_error.message()),
            };
        }
    }
    if e.is_closed() {
        return StoreError::Connection {
            reason: e.to_string(),
        };
    }
    StoreError::Query {
        reason: e.to_string(),
    }
}

fn decode_row(row: &Row) -> StoreResult<MapDocument> {
    let raw: Value = row.try_get("doc").map_err(query_err)?;
    serde_json::from_value(raw).map_err(|e| StoreError::Serialization {
        reason: e.to_string(),
    })
}

/// Document store over a single PostgreSQL table.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: Pool,
    table: String,
}

impl PostgresDocumentStore {
    /// `table` is interpolated into SQL, so it must be a plain identifier.
    pub fn new(pool: Pool, table: impl Into<String>) -> Result<Self, ConfigError> {
        let table = table.into();
        validate_identifier("collection", &table)?;
        Ok(Self { pool, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn get_conn(&self) -> StoreResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| StoreError::Connection {
            reason: e.to_string(),
        })
    }

    /// Create the backing table if it does not exist.
    pub async fn migrate(&self) -> StoreResult<()> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                seq BIGSERIAL NOT NULL, \
                id UUID PRIMARY KEY, \
                doc JSONB NOT NULL, \
                created_at TIMESTAMPTZ NOT NULL DEFAULT now())",
            self.table
        );
        conn.batch_execute(&sql).await.map_err(query_err)?;
        tracing::info!(table = %self.table, "document table ready");
        Ok(())
    }

    fn index_sql(&self, spec: &IndexSpec) -> StoreResult<String> {
        for (field, value) in [("index name", &spec.name), ("index field", &spec.field)] {
            validate_identifier(field, value).map_err(|e| StoreError::Index {
                index_name: spec.name.clone(),
                reason: e.to_string(),
            })?;
        }
        let expr = match spec.kind {
            IndexKind::Spatial2d | IndexKind::Containment => {
                format!("(doc -> '{}') jsonb_path_ops", spec.field)
            }
        };
        Ok(format!(
            "CREATE INDEX IF NOT EXISTS {table}_{name} ON {table} USING GIN ({expr})",
            table = self.table,
            name = spec.name,
            expr = expr,
        ))
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn ensure_index(&self, spec: &IndexSpec) -> StoreResult<()> {
        let sql = self.index_sql(spec)?;
        let conn = self.get_conn().await?;
        conn.batch_execute(&sql)
            .await
            .map_err(|e| StoreError::Index {
                index_name: spec.name.clone(),
                reason: e.to_string(),
            })
    }

    async fn insert_one(&self, doc: &MapDocument) -> StoreResult<()> {
        let body = serde_json::to_value(doc).map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })?;
        let conn = self.get_conn().await?;
        let sql = format!("INSERT INTO {} (id, doc) VALUES ($1, $2)", self.table);
        match conn.execute(&sql, &[&doc.id.as_uuid(), &body]).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if let Some(db_error) = e.as_db_error() {
                    if db_error.code() == &SqlState::UNIQUE_VIOLATION {
                        return Err(StoreError::DuplicateId { id: doc.id });
                    }
                }
                Err(query_err(e))
            }
        }
    }

    async fn find_one(&self, filter: &DocumentFilter) -> StoreResult<Option<MapDocument>> {
        let conn = self.get_conn().await?;
        let row = match filter {
            DocumentFilter::Any => {
                let sql = format!("SELECT doc FROM {} ORDER BY seq LIMIT 1", self.table);
                conn.query_opt(&sql, &[]).await
            }
            DocumentFilter::Id(id) => {
                let sql = format!("SELECT doc FROM {} WHERE id = $1", self.table);
                conn.query_opt(&sql, &[&id.as_uuid()]).await
            }
            DocumentFilter::Metadata { key, value } => {
                let sql = format!(
                    "SELECT doc FROM {} WHERE doc -> 'properties' -> $1::text = $2::jsonb \
                     ORDER BY seq LIMIT 1",
                    self.table
                );
                conn.query_opt(&sql, &[key, value]).await
            }
        }
        .map_err(query_err)?;

        row.as_ref().map(decode_row).transpose()
    }

    async fn find_one_by_element(
        &self,
        element: &ElementMatch,
    ) -> StoreResult<Option<MapDocument>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT doc FROM {} WHERE doc -> 'features' @> $1::jsonb ORDER BY seq LIMIT 1",
            self.table
        );
        let pattern = element.containment_pattern();
        let row = conn.query_opt(&sql, &[&pattern]).await.map_err(query_err)?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn find_one_and_delete_by_element(
        &self,
        element: &ElementMatch,
    ) -> StoreResult<Option<MapDocument>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "DELETE FROM {table} WHERE seq = (\
                SELECT seq FROM {table} WHERE doc -> 'features' @> $1::jsonb \
                ORDER BY seq LIMIT 1 FOR UPDATE) \
             RETURNING doc",
            table = self.table
        );
        let pattern = element.containment_pattern();
        let row = conn.query_opt(&sql, &[&pattern]).await.map_err(query_err)?;
        row.as_ref().map(decode_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::traits::FEATURES_FIELD;

    fn store() -> PostgresDocumentStore {
        // Pool creation is lazy; no connection is made here.
        let pool = PostgresStoreConfig::default().create_pool().unwrap();
        PostgresDocumentStore::new(pool, "maps").unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = PostgresStoreConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "navmap");
        assert_eq!(config.max_size, 16);
    }

    #[tokio::test]
    async fn test_table_name_must_be_identifier() {
        let pool = PostgresStoreConfig::default().create_pool().unwrap();
        assert!(PostgresDocumentStore::new(pool.clone(), "maps; DROP TABLE x").is_err());
        assert!(PostgresDocumentStore::new(pool, "").is_err());
    }

    #[tokio::test]
    async fn test_index_sql() {
        let sql = store()
            .index_sql(&IndexSpec::spatial_2d(FEATURES_FIELD))
            .unwrap();
        assert_eq!(
            sql,
            "CREATE INDEX IF NOT EXISTS maps_features_2d ON maps \
             USING GIN ((doc -> 'features') jsonb_path_ops)"
        );
    }

    #[tokio::test]
    async fn test_index_sql_rejects_bad_field() {
        let spec = IndexSpec {
            name: "bad".to_string(),
            field: "features'); --".to_string(),
            kind: IndexKind::Containment,
        };
        assert!(matches!(
            store().index_sql(&spec),
            Err(StoreError::Index { .. })
        ));
    }
}
