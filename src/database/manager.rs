use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use super::registry::{REFERENCE_SCHEMA, TENANT_SCHEMA_PREFIX};

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid schema name: {0}")]
    InvalidSchemaName(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Centralized pool manager. All stores share one PostgreSQL database; each
/// pool is scoped to a schema by pinning `search_path` at connect time, so a
/// handler holding a pool can only see its own store's tables.
pub struct DatabaseManager {
    pools: Arc<RwLock<HashMap<String, PgPool>>>,
}

impl DatabaseManager {
    fn instance() -> &'static DatabaseManager {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<DatabaseManager> = OnceLock::new();
        INSTANCE.get_or_init(DatabaseManager::new)
    }

    pub fn new() -> Self {
        Self {
            pools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Pool scoped to the shared reference schema, where the `stores`
    /// registry and not-yet-migrated store data live.
    pub async fn main_pool() -> Result<PgPool, DatabaseError> {
        Self::instance().get_pool(REFERENCE_SCHEMA).await
    }

    /// Pool scoped to a store schema (validated name).
    pub async fn schema_pool(schema: &str) -> Result<PgPool, DatabaseError> {
        if !Self::is_valid_schema_name(schema) {
            return Err(DatabaseError::InvalidSchemaName(schema.to_string()));
        }
        Self::instance().get_pool(schema).await
    }

    /// Get existing pool or create a new one lazily
    async fn get_pool(&self, schema: &str) -> Result<PgPool, DatabaseError> {
        // Fast path: try read lock
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(schema) {
                return Ok(pool.clone());
            }
        }

        let options = Self::connect_options(schema)?;
        let db = &crate::config::config().database;

        let pool = PgPoolOptions::new()
            .max_connections(db.max_connections)
            .acquire_timeout(Duration::from_secs(db.connection_timeout))
            .connect_with(options)
            .await?;

        {
            let mut pools = self.pools.write().await;
            pools.insert(schema.to_string(), pool.clone());
        }

        info!("Created database pool for schema: {}", schema);
        Ok(pool)
    }

    /// Connect options from DATABASE_URL with `search_path` pinned to the
    /// schema. Store schemas keep the reference schema second on the path so
    /// global lookup tables stay visible.
    fn connect_options(schema: &str) -> Result<PgConnectOptions, DatabaseError> {
        let base = std::env::var("DATABASE_URL")
            .map_err(|_| DatabaseError::ConfigMissing("DATABASE_URL"))?;

        let options = PgConnectOptions::from_str(&base)
            .map_err(|_| DatabaseError::InvalidDatabaseUrl)?;

        let search_path = if schema == REFERENCE_SCHEMA {
            REFERENCE_SCHEMA.to_string()
        } else {
            format!("{},{}", schema, REFERENCE_SCHEMA)
        };

        Ok(options.options([("search_path", search_path.as_str())]))
    }

    /// Pings the main pool to ensure connectivity
    pub async fn health_check() -> Result<(), DatabaseError> {
        let pool = Self::main_pool().await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }

    /// Quote SQL identifier to prevent injection
    pub fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Close and remove all pools (e.g., on shutdown)
    pub async fn close_all() {
        let manager = Self::instance();
        let mut pools = manager.pools.write().await;
        for (name, pool) in pools.drain() {
            pool.close().await;
            info!("Closed database pool for schema: {}", name);
        }
    }

    /// Validate schema names to prevent injection. Accepts:
    /// - the reference schema ("public")
    /// - names starting with "store_" followed by [a-zA-Z0-9_]+
    pub fn is_valid_schema_name(name: &str) -> bool {
        if name == REFERENCE_SCHEMA {
            return true;
        }
        if let Some(rest) = name.strip_prefix(TENANT_SCHEMA_PREFIX) {
            return !rest.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        }
        false
    }
}

impl Default for DatabaseManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_schema_names() {
        assert!(DatabaseManager::is_valid_schema_name("public"));
        assert!(DatabaseManager::is_valid_schema_name("store_5_1700000000"));
        assert!(DatabaseManager::is_valid_schema_name("store_abc_DEF"));
        assert!(!DatabaseManager::is_valid_schema_name("store_"));
        assert!(!DatabaseManager::is_valid_schema_name("pg_catalog"));
        assert!(!DatabaseManager::is_valid_schema_name("store-5"));
        assert!(!DatabaseManager::is_valid_schema_name("store_5; DROP SCHEMA public"));
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(DatabaseManager::quote_identifier("orders"), "\"orders\"");
        assert_eq!(
            DatabaseManager::quote_identifier("bad\"name"),
            "\"bad\"\"name\""
        );
    }
}
