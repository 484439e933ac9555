use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::database::descriptor::ConnectionDescriptor;
use crate::database::introspect::SchemaIntrospector;
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::Store;
use crate::database::registry::{self, REFERENCE_SCHEMA, STORE_DISCRIMINATOR, TENANT_SCHEMA_PREFIX};
use crate::services::resolver::StoreResolver;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Store not found: {0}")]
    StoreNotFound(i64),

    #[error("Migration already in progress for store {0}")]
    InProgress(i64),

    #[error("Invalid connection descriptor for store {0}")]
    BadDescriptor(i64),

    #[error("Failed to update connection descriptor: {0}")]
    DescriptorUpdate(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Connectivity(#[from] sqlx::Error),
}

/// Per-run report returned to the administrative caller. Field names and
/// nesting are a compatibility contract with operator tooling.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    pub success: bool,
    pub schema_name: String,
    pub migrated_tables: Vec<String>,
    pub errors: Vec<TableError>,
    pub summary: MigrationSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableError {
    pub table: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    pub total_tables: usize,
    pub migrated_successfully: Vec<String>,
    pub errors: usize,
}

/// One table's failure either stays local to the table or aborts the run.
enum TableFailure {
    Table(String),
    Fatal(MigrationError),
}

/// One-time carve-out of a store's rows from the shared schema into its own
/// schema. Safely re-runnable: tables already present in the target schema
/// are skipped, so a partially failed run can be retried for the remaining
/// tables without duplicating rows.
pub struct StoreMigrator {
    main_pool: PgPool,
    introspector: SchemaIntrospector,
    resolver: Arc<StoreResolver>,
    statement_timeout: Duration,
}

impl StoreMigrator {
    pub fn new(main_pool: PgPool, resolver: Arc<StoreResolver>) -> Self {
        let timeout_ms = crate::config::config().database.statement_timeout_ms;
        Self {
            introspector: SchemaIntrospector::new(main_pool.clone()),
            main_pool,
            resolver,
            statement_timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub async fn migrate_store(&self, store_id: i64) -> Result<MigrationResult, MigrationError> {
        let store: Store = sqlx::query_as("SELECT * FROM stores WHERE id = $1")
            .bind(store_id)
            .fetch_optional(&self.main_pool)
            .await?
            .ok_or(MigrationError::StoreNotFound(store_id))?;

        // Single-flight per store: two concurrent carve-outs of one store
        // could double-copy rows or interleave the descriptor update. The
        // advisory lock is session-scoped, so hold a dedicated connection.
        let mut lock_conn = self.main_pool.acquire().await?;
        let (locked,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .bind(store_id)
            .fetch_one(&mut *lock_conn)
            .await?;
        if !locked {
            return Err(MigrationError::InProgress(store_id));
        }

        let result = self.run_migration(&store).await;

        // Always release: session locks would survive pool check-in.
        let _ = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(store_id)
            .execute(&mut *lock_conn)
            .await;

        result
    }

    async fn run_migration(&self, store: &Store) -> Result<MigrationResult, MigrationError> {
        let descriptor = ConnectionDescriptor::parse(&store.connection_descriptor)
            .map_err(|_| MigrationError::BadDescriptor(store.id))?;
        let schema = target_schema_name(store.id, descriptor.schema());

        if !DatabaseManager::is_valid_schema_name(&schema) {
            return Err(DatabaseError::InvalidSchemaName(schema).into());
        }

        info!("Migrating store {} ({}) into schema {}", store.id, store.slug, schema);

        sqlx::query(&format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            DatabaseManager::quote_identifier(&schema)
        ))
        .execute(&self.main_pool)
        .await?;

        let tables = registry::tenant_tables();
        let mut migrated: Vec<String> = Vec::new();
        let mut errors: Vec<TableError> = Vec::new();

        // Strictly sequential: table N+1 starts only after table N's outcome
        // is known, keeping migratedTables deterministic and connection use
        // bounded.
        for table in &tables {
            if self.introspector.table_exists(&schema, table).await? {
                info!("Table {}.{} already exists, skipping", schema, table);
                continue;
            }

            match self.migrate_table(store.id, &schema, table).await {
                Ok(rows) => {
                    info!("Migrated {}.{} ({} rows)", schema, table, rows);
                    migrated.push(table.to_string());
                }
                Err(TableFailure::Fatal(e)) => return Err(e),
                Err(TableFailure::Table(message)) => {
                    warn!("Failed to migrate {}.{}: {}", schema, table, message);
                    errors.push(TableError {
                        table: table.to_string(),
                        message,
                    });
                }
            }
        }

        // The descriptor is rewritten exactly once, after the loop, even on
        // partial failure: operators inspect `errors` and re-run for the
        // failed tables.
        let updated = descriptor.with_schema(&schema);
        sqlx::query("UPDATE stores SET connection_descriptor = $1, updated_at = NOW() WHERE id = $2")
            .bind(updated.as_str())
            .bind(store.id)
            .execute(&self.main_pool)
            .await
            .map_err(|e| MigrationError::DescriptorUpdate(e.to_string()))?;

        self.resolver.invalidate(store.id).await;

        let summary = MigrationSummary {
            total_tables: tables.len(),
            migrated_successfully: migrated.clone(),
            errors: errors.len(),
        };

        Ok(MigrationResult {
            success: errors.is_empty(),
            schema_name: schema,
            migrated_tables: migrated,
            errors,
            summary,
        })
    }

    /// Clone one table's structure from the reference schema and copy this
    /// store's rows, inside a transaction so a mid-table failure leaves no
    /// half-created table behind (the retry then recreates it from scratch).
    async fn migrate_table(
        &self,
        store_id: i64,
        schema: &str,
        table: &str,
    ) -> Result<u64, TableFailure> {
        let has_discriminator = self
            .introspector
            .column_exists(REFERENCE_SCHEMA, table, STORE_DISCRIMINATOR)
            .await
            .map_err(|e| TableFailure::Fatal(e.into()))?;

        let target = format!(
            "{}.{}",
            DatabaseManager::quote_identifier(schema),
            DatabaseManager::quote_identifier(table)
        );
        let source = format!(
            "{}.{}",
            DatabaseManager::quote_identifier(REFERENCE_SCHEMA),
            DatabaseManager::quote_identifier(table)
        );

        let mut tx = self
            .main_pool
            .begin()
            .await
            .map_err(|e| TableFailure::Fatal(e.into()))?;

        let create = format!("CREATE TABLE {} (LIKE {} INCLUDING ALL)", target, source);
        self.execute_in_tx(&mut tx, &create).await?;

        let copy = if has_discriminator {
            format!(
                "INSERT INTO {} SELECT * FROM {} WHERE {} = {}",
                target, source, STORE_DISCRIMINATOR, store_id
            )
        } else {
            // No discriminator: lookup/config tables are duplicated into
            // every store schema by convention.
            format!("INSERT INTO {} SELECT * FROM {}", target, source)
        };
        let rows = self.execute_in_tx(&mut tx, &copy).await?;

        tx.commit()
            .await
            .map_err(|e| classify(e))?;

        Ok(rows)
    }

    async fn execute_in_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        sql: &str,
    ) -> Result<u64, TableFailure> {
        match tokio::time::timeout(self.statement_timeout, sqlx::query(sql).execute(&mut **tx))
            .await
        {
            Ok(Ok(done)) => Ok(done.rows_affected()),
            Ok(Err(e)) => Err(classify(e)),
            Err(_) => Err(TableFailure::Table(format!(
                "statement timed out after {}ms",
                self.statement_timeout.as_millis()
            ))),
        }
    }
}

/// Connectivity loss aborts the whole run; anything else stays per-table.
fn classify(e: sqlx::Error) -> TableFailure {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => TableFailure::Fatal(MigrationError::Connectivity(e)),
        other => TableFailure::Table(other.to_string()),
    }
}

/// Reuse the schema already encoded in the descriptor, otherwise synthesize a
/// unique name from the store id and the current epoch second.
fn target_schema_name(store_id: i64, existing: Option<&str>) -> String {
    match existing {
        Some(schema) => schema.to_string(),
        None => format!("{}{}_{}", TENANT_SCHEMA_PREFIX, store_id, Utc::now().timestamp()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_schema_from_descriptor() {
        assert_eq!(
            target_schema_name(5, Some("store_5_1700000000")),
            "store_5_1700000000"
        );
    }

    #[test]
    fn synthesized_schema_is_valid_and_carries_store_id() {
        let name = target_schema_name(42, None);
        assert!(name.starts_with("store_42_"));
        assert!(DatabaseManager::is_valid_schema_name(&name));
    }

    #[test]
    fn result_serializes_with_contract_field_names() {
        let result = MigrationResult {
            success: false,
            schema_name: "store_5_1700000000".to_string(),
            migrated_tables: vec!["orders".to_string()],
            errors: vec![TableError {
                table: "whatsapp_logs".to_string(),
                message: "constraint violation".to_string(),
            }],
            summary: MigrationSummary {
                total_tables: 8,
                migrated_successfully: vec!["orders".to_string()],
                errors: 1,
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["schemaName"], "store_5_1700000000");
        assert_eq!(json["migratedTables"][0], "orders");
        assert_eq!(json["summary"]["totalTables"], 8);
        assert_eq!(json["summary"]["migratedSuccessfully"][0], "orders");
        assert_eq!(json["summary"]["errors"], 1);
        assert_eq!(json["errors"][0]["table"], "whatsapp_logs");
    }
}
