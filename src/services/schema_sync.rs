use std::time::Duration;

use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::database::introspect::{ColumnInfo, SchemaIntrospector};
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::registry::{self, REFERENCE_SCHEMA};

/// Report returned to the administrative caller. Field names are a
/// compatibility contract with operator tooling.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub schemas_processed: usize,
    pub tables_created: usize,
    pub columns_added: usize,
    pub errors: Vec<SyncError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncError {
    pub schema: String,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub message: String,
}

/// Brings every store schema's structure up to date with the reference
/// schema. Additive only: creates missing tables and adds missing columns,
/// never drops or narrows, so it is safe to re-run on every deploy. Existing
/// rows are untouched. Type drift between a store column and the reference is
/// not auto-corrected.
pub struct SchemaSynchronizer {
    pool: PgPool,
    introspector: SchemaIntrospector,
    statement_timeout: Duration,
}

impl SchemaSynchronizer {
    pub fn new(pool: PgPool) -> Self {
        let timeout_ms = crate::config::config().database.statement_timeout_ms;
        Self {
            introspector: SchemaIntrospector::new(pool.clone()),
            pool,
            statement_timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub async fn from_env() -> Result<Self, DatabaseError> {
        Ok(Self::new(DatabaseManager::main_pool().await?))
    }

    /// Reconcile all store schemas against the canonical tenant table set.
    /// Catalog read failures abort the run; DDL failures are recorded per
    /// table (CREATE) or per column (ALTER) and the run continues.
    pub async fn synchronize_all(&self) -> Result<SyncReport, DatabaseError> {
        let schemas = self.introspector.list_tenant_schemas().await?;

        // Describe each canonical table once up front; the reference
        // structure does not change mid-run.
        let mut reference_tables: Vec<(&'static str, Vec<ColumnInfo>)> = Vec::new();
        for table in registry::tenant_tables() {
            let columns = self.introspector.describe_table(REFERENCE_SCHEMA, table).await?;
            if columns.is_empty() {
                // Registry names a table the reference schema does not have
                // yet; nothing to synthesize from.
                warn!("Canonical table {} missing from reference schema", table);
                continue;
            }
            reference_tables.push((table, columns));
        }

        let mut report = SyncReport {
            schemas_processed: 0,
            tables_created: 0,
            columns_added: 0,
            errors: Vec::new(),
        };

        for schema in &schemas {
            for (table, reference) in &reference_tables {
                let existing = self.introspector.describe_table(schema, table).await?;
                if existing.is_empty() {
                    match self.create_table(schema, table, reference).await {
                        Ok(()) => report.tables_created += 1,
                        Err(message) => report.errors.push(SyncError {
                            schema: schema.clone(),
                            table: table.to_string(),
                            column: None,
                            message,
                        }),
                    }
                    continue;
                }

                for column in missing_columns(reference, &existing) {
                    match self.add_column(schema, table, column).await {
                        Ok(()) => report.columns_added += 1,
                        Err(message) => report.errors.push(SyncError {
                            schema: schema.clone(),
                            table: table.to_string(),
                            column: Some(column.column_name.clone()),
                            message,
                        }),
                    }
                }
            }
            report.schemas_processed += 1;
        }

        info!(
            "Schema sync: {} schemas, {} tables created, {} columns added, {} errors",
            report.schemas_processed,
            report.tables_created,
            report.columns_added,
            report.errors.len()
        );
        Ok(report)
    }

    async fn create_table(
        &self,
        schema: &str,
        table: &str,
        reference: &[ColumnInfo],
    ) -> Result<(), String> {
        let sql = create_table_sql(schema, table, reference);
        self.execute_ddl(&sql).await?;
        info!("Created table {}.{}", schema, table);
        Ok(())
    }

    async fn add_column(
        &self,
        schema: &str,
        table: &str,
        column: &ColumnInfo,
    ) -> Result<(), String> {
        let sql = add_column_sql(schema, table, column);
        self.execute_ddl(&sql).await?;
        info!("Added column {}.{}.{}", schema, table, column.column_name);
        Ok(())
    }

    async fn execute_ddl(&self, sql: &str) -> Result<(), String> {
        match tokio::time::timeout(self.statement_timeout, sqlx::query(sql).execute(&self.pool))
            .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "statement timed out after {}ms",
                self.statement_timeout.as_millis()
            )),
        }
    }
}

/// Reference columns absent from the observed table, in reference order.
fn missing_columns<'a>(reference: &'a [ColumnInfo], existing: &[ColumnInfo]) -> Vec<&'a ColumnInfo> {
    reference
        .iter()
        .filter(|r| !existing.iter().any(|e| e.column_name == r.column_name))
        .collect()
}

fn create_table_sql(schema: &str, table: &str, columns: &[ColumnInfo]) -> String {
    let defs: Vec<String> = columns.iter().map(create_column_def).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {}.{} ({})",
        DatabaseManager::quote_identifier(schema),
        DatabaseManager::quote_identifier(table),
        defs.join(", ")
    )
}

fn add_column_sql(schema: &str, table: &str, column: &ColumnInfo) -> String {
    format!(
        "ALTER TABLE {}.{} ADD COLUMN IF NOT EXISTS {}",
        DatabaseManager::quote_identifier(schema),
        DatabaseManager::quote_identifier(table),
        add_column_def(column)
    )
}

/// CREATE honors NOT NULL and DEFAULT verbatim from the reference.
fn create_column_def(column: &ColumnInfo) -> String {
    let mut def = format!(
        "{} {}",
        DatabaseManager::quote_identifier(&column.column_name),
        registry::map_data_type(&column.data_type, column.character_maximum_length)
    );
    if !column.is_nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &column.column_default {
        def.push_str(&format!(" DEFAULT {}", default));
    }
    def
}

/// ALTER keeps the DEFAULT verbatim but only carries NOT NULL when a default
/// exists; a defaultless NOT NULL column cannot be added to a populated
/// table, and pre-existing rows are expected to hold NULL in that case.
fn add_column_def(column: &ColumnInfo) -> String {
    let mut def = format!(
        "{} {}",
        DatabaseManager::quote_identifier(&column.column_name),
        registry::map_data_type(&column.data_type, column.character_maximum_length)
    );
    if let Some(default) = &column.column_default {
        def.push_str(&format!(" DEFAULT {}", default));
        if !column.is_nullable {
            def.push_str(" NOT NULL");
        }
    }
    def
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, data_type: &str, len: Option<i32>, nullable: bool, default: Option<&str>) -> ColumnInfo {
        ColumnInfo {
            column_name: name.to_string(),
            data_type: data_type.to_string(),
            character_maximum_length: len,
            is_nullable: nullable,
            column_default: default.map(|d| d.to_string()),
        }
    }

    #[test]
    fn create_table_sql_maps_types_and_defaults() {
        let columns = vec![
            col("id", "bigint", None, false, Some("nextval('orders_id_seq'::regclass)")),
            col("status", "character varying", Some(32), false, Some("'pending'::character varying")),
            col("payload", "jsonb", None, true, None),
        ];
        let sql = create_table_sql("store_7_1700000000", "orders", &columns);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"store_7_1700000000\".\"orders\" (\
             \"id\" BIGINT NOT NULL DEFAULT nextval('orders_id_seq'::regclass), \
             \"status\" VARCHAR(32) NOT NULL DEFAULT 'pending'::character varying, \
             \"payload\" JSONB)"
        );
    }

    #[test]
    fn add_column_sql_uses_varchar_fallback_without_length() {
        let sql = add_column_sql("store_7", "orders", &col("note", "character varying", None, true, None));
        assert_eq!(
            sql,
            "ALTER TABLE \"store_7\".\"orders\" ADD COLUMN IF NOT EXISTS \"note\" VARCHAR(255)"
        );
    }

    #[test]
    fn add_column_drops_not_null_when_no_default() {
        let def = add_column_def(&col("total_amount", "numeric", None, false, None));
        assert_eq!(def, "\"total_amount\" NUMERIC");
    }

    #[test]
    fn add_column_keeps_not_null_with_default() {
        let def = add_column_def(&col("is_read", "boolean", None, false, Some("false")));
        assert_eq!(def, "\"is_read\" BOOLEAN DEFAULT false NOT NULL");
    }

    #[test]
    fn missing_columns_preserves_reference_order() {
        let reference = vec![
            col("id", "bigint", None, false, None),
            col("customer_id", "bigint", None, true, None),
            col("total_amount", "numeric", None, true, None),
        ];
        let existing = vec![
            col("id", "bigint", None, false, None),
            col("customer_id", "bigint", None, true, None),
        ];
        let missing = missing_columns(&reference, &existing);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].column_name, "total_amount");
    }

    #[test]
    fn no_missing_columns_when_store_has_superset() {
        let reference = vec![col("id", "bigint", None, false, None)];
        let existing = vec![
            col("id", "bigint", None, false, None),
            col("legacy_flag", "boolean", None, true, None),
        ];
        assert!(missing_columns(&reference, &existing).is_empty());
    }
}
