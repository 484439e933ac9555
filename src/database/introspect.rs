use sqlx::PgPool;

use super::registry::TENANT_SCHEMA_PREFIX;

/// One column as observed in `information_schema.columns`.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub column_name: String,
    pub data_type: String,
    pub character_maximum_length: Option<i32>,
    pub is_nullable: bool,
    pub column_default: Option<String>,
}

/// Read-only catalog queries. No side effects, no long-lived locks; safe to
/// share across concurrent synchronizer and migrator runs.
#[derive(Clone)]
pub struct SchemaIntrospector {
    pool: PgPool,
}

impl SchemaIntrospector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All schemas following the per-store naming convention, ordered by name.
    pub async fn list_tenant_schemas(&self) -> Result<Vec<String>, sqlx::Error> {
        let pattern = format!("{}%", TENANT_SCHEMA_PREFIX.replace('_', "\\_"));
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT schema_name
            FROM information_schema.schemata
            WHERE schema_name LIKE $1
            ORDER BY schema_name
            "#,
        )
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Columns of `schema.table` in ordinal order; empty if the table is absent.
    pub async fn describe_table(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnInfo>, sqlx::Error> {
        let rows: Vec<(String, String, Option<i32>, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT column_name, data_type, character_maximum_length, is_nullable, column_default
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(column_name, data_type, character_maximum_length, is_nullable, column_default)| {
                    ColumnInfo {
                        column_name,
                        data_type,
                        character_maximum_length,
                        is_nullable: is_nullable == "YES",
                        column_default,
                    }
                },
            )
            .collect())
    }

    pub async fn table_exists(&self, schema: &str, table: &str) -> Result<bool, sqlx::Error> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_name = $2
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0 > 0)
    }

    pub async fn column_exists(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<bool, sqlx::Error> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2 AND column_name = $3
            "#,
        )
        .bind(schema)
        .bind(table)
        .bind(column)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0 > 0)
    }
}
