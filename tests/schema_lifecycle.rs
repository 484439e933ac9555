//! End-to-end schema lifecycle tests: reconciliation, carve-out migration,
//! and principal resolution against a live PostgreSQL instance.
//!
//! These tests require DATABASE_URL to point at a scratch database and are
//! ignored by default:
//!
//! The tests share the reference schema, so run them single-threaded:
//!
//!     cargo test --test schema_lifecycle -- --ignored --test-threads=1

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;

use storehub_api::auth::{Level, Principal};
use storehub_api::database::manager::DatabaseManager;
use storehub_api::database::registry;
use storehub_api::services::migrator::MigrationError;
use storehub_api::services::resolver::ResolveError;
use storehub_api::services::{SchemaSynchronizer, StoreMigrator, StoreResolver};

async fn main_pool() -> Result<PgPool> {
    let _ = dotenvy::dotenv();
    Ok(DatabaseManager::main_pool().await?)
}

/// Create the global registry and every canonical tenant table in the
/// reference schema, idempotently.
async fn create_reference_tables(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stores (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(120) NOT NULL,
            slug VARCHAR(120) NOT NULL UNIQUE,
            connection_descriptor TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT true,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    for table in registry::tenant_tables() {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                id BIGSERIAL PRIMARY KEY,
                store_id BIGINT,
                name VARCHAR(120),
                phone VARCHAR(32),
                customer_id BIGINT,
                status VARCHAR(32) DEFAULT 'pending',
                total_amount NUMERIC,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        );
        sqlx::query(&sql).execute(pool).await?;
    }

    Ok(())
}

async fn insert_store(pool: &PgPool, slug: &str) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO stores (name, slug, connection_descriptor)
        VALUES ($1, $2, 'postgres://storehub@localhost:5432/storehub?sslmode=disable')
        RETURNING id
        "#,
    )
    .bind(slug)
    .bind(slug)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

async fn drop_schema(pool: &PgPool, schema: &str) -> Result<()> {
    sqlx::query(&format!("DROP SCHEMA IF EXISTS \"{}\" CASCADE", schema))
        .execute(pool)
        .await?;
    Ok(())
}

fn services(pool: &PgPool) -> (Arc<StoreResolver>, StoreMigrator, SchemaSynchronizer) {
    let resolver = Arc::new(StoreResolver::new(pool.clone(), Duration::from_secs(30)));
    let migrator = StoreMigrator::new(pool.clone(), resolver.clone());
    let synchronizer = SchemaSynchronizer::new(pool.clone());
    (resolver, migrator, synchronizer)
}

fn unique_slug(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn migration_carves_out_only_the_stores_rows() -> Result<()> {
    let pool = main_pool().await?;
    create_reference_tables(&pool).await?;
    let (_, migrator, _) = services(&pool);

    let store_id = insert_store(&pool, &unique_slug("carveout")).await?;
    let other_id = insert_store(&pool, &unique_slug("other")).await?;

    for i in 0..12 {
        sqlx::query("INSERT INTO orders (store_id, status, total_amount) VALUES ($1, 'paid', $2)")
            .bind(store_id)
            .bind(i as i64)
            .execute(&pool)
            .await?;
    }
    for _ in 0..5 {
        sqlx::query("INSERT INTO orders (store_id, status) VALUES ($1, 'pending')")
            .bind(other_id)
            .execute(&pool)
            .await?;
    }

    let result = migrator.migrate_store(store_id).await?;
    assert!(result.success, "errors: {:?}", result.errors);
    assert!(result.migrated_tables.contains(&"orders".to_string()));
    assert!(result
        .summary
        .migrated_successfully
        .contains(&"orders".to_string()));

    let (count,): (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM \"{}\".orders",
        result.schema_name
    ))
    .fetch_one(&pool)
    .await?;
    assert_eq!(count, 12);

    // The descriptor now encodes the new schema.
    let (descriptor,): (String,) =
        sqlx::query_as("SELECT connection_descriptor FROM stores WHERE id = $1")
            .bind(store_id)
            .fetch_one(&pool)
            .await?;
    assert!(descriptor.contains(&format!("schema={}", result.schema_name)));

    drop_schema(&pool, &result.schema_name).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn migration_is_idempotent() -> Result<()> {
    let pool = main_pool().await?;
    create_reference_tables(&pool).await?;
    let (_, migrator, _) = services(&pool);

    let store_id = insert_store(&pool, &unique_slug("idem")).await?;
    sqlx::query("INSERT INTO orders (store_id, status) VALUES ($1, 'paid')")
        .bind(store_id)
        .execute(&pool)
        .await?;

    let first = migrator.migrate_store(store_id).await?;
    assert!(first.success);

    let second = migrator.migrate_store(store_id).await?;
    assert!(second.success);
    assert_eq!(second.schema_name, first.schema_name);
    // Every table was skipped, nothing re-migrated, no duplicated rows.
    assert!(second.migrated_tables.is_empty());

    let (count,): (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM \"{}\".orders",
        first.schema_name
    ))
    .fetch_one(&pool)
    .await?;
    assert_eq!(count, 1);

    drop_schema(&pool, &first.schema_name).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn resolver_returns_new_schema_after_migration() -> Result<()> {
    let pool = main_pool().await?;
    create_reference_tables(&pool).await?;
    let (resolver, migrator, _) = services(&pool);

    let store_id = insert_store(&pool, &unique_slug("resolve")).await?;

    // Pre-migration: the store still lives in the shared schema.
    let before = resolver.resolve_store(store_id).await?;
    assert_eq!(before.schema, registry::REFERENCE_SCHEMA);

    let result = migrator.migrate_store(store_id).await?;
    assert!(result.success);

    let principal = Principal {
        subject: "staff@example.com".to_string(),
        role: "agent".to_string(),
        level: Level::Tenant,
        store_id: Some(store_id),
    };
    let after = resolver.resolve_for_principal(&principal).await?;
    assert_eq!(after.schema, result.schema_name);

    drop_schema(&pool, &result.schema_name).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn unmigrated_store_handle_is_filtered_to_its_own_rows() -> Result<()> {
    let pool = main_pool().await?;
    create_reference_tables(&pool).await?;
    let (resolver, migrator, _) = services(&pool);

    let store_id = insert_store(&pool, &unique_slug("isolated")).await?;
    let other_id = insert_store(&pool, &unique_slug("neighbor")).await?;

    sqlx::query("INSERT INTO orders (store_id, status) VALUES ($1, 'paid'), ($2, 'paid')")
        .bind(store_id)
        .bind(other_id)
        .execute(&pool)
        .await?;

    // Before carve-out the handle sits on the shared schema; queries must
    // carry the store discriminator or they would see every store's rows.
    let handle = resolver.resolve_store(store_id).await?;
    assert_eq!(handle.schema, registry::REFERENCE_SCHEMA);
    assert_eq!(handle.store_filter(), Some(store_id));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE store_id = $1")
        .bind(handle.store_filter().unwrap())
        .fetch_one(&handle.pool)
        .await?;
    assert_eq!(count, 1);

    // After carve-out the schema itself is the isolation boundary.
    let result = migrator.migrate_store(store_id).await?;
    assert!(result.success);
    let handle = resolver.resolve_store(store_id).await?;
    assert_eq!(handle.schema, result.schema_name);
    assert_eq!(handle.store_filter(), None);

    drop_schema(&pool, &result.schema_name).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn concurrent_migration_of_same_store_is_refused() -> Result<()> {
    let pool = main_pool().await?;
    create_reference_tables(&pool).await?;
    let (_, migrator, _) = services(&pool);

    let store_id = insert_store(&pool, &unique_slug("singleflight")).await?;

    // Hold the store's advisory lock on a side connection, as a concurrent
    // migration run would.
    let mut holder = pool.acquire().await?;
    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(store_id)
        .execute(&mut *holder)
        .await?;

    match migrator.migrate_store(store_id).await {
        Err(MigrationError::InProgress(id)) => assert_eq!(id, store_id),
        other => panic!("expected InProgress, got {:?}", other),
    }

    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(store_id)
        .execute(&mut *holder)
        .await?;
    drop(holder);

    // Once the lock is released the migration proceeds normally.
    let result = migrator.migrate_store(store_id).await?;
    assert!(result.success, "errors: {:?}", result.errors);

    drop_schema(&pool, &result.schema_name).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn resolver_rejects_principal_without_store_id() -> Result<()> {
    let pool = main_pool().await?;
    let (resolver, _, _) = services(&pool);

    let principal = Principal {
        subject: "staff@example.com".to_string(),
        role: "agent".to_string(),
        level: Level::Store,
        store_id: None,
    };

    match resolver.resolve_for_principal(&principal).await {
        Err(ResolveError::IncompleteIdentity) => {}
        other => panic!("expected IncompleteIdentity, got {:?}", other.map(|h| h.schema)),
    }
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn sync_adds_missing_columns_and_is_idempotent() -> Result<()> {
    let pool = main_pool().await?;
    create_reference_tables(&pool).await?;
    let (_, migrator, synchronizer) = services(&pool);

    let store_id = insert_store(&pool, &unique_slug("sync")).await?;
    let result = migrator.migrate_store(store_id).await?;
    assert!(result.success);
    let schema = result.schema_name.clone();

    // Simulate a store schema lagging the reference: drop a column.
    sqlx::query(&format!(
        "ALTER TABLE \"{}\".orders DROP COLUMN total_amount",
        schema
    ))
    .execute(&pool)
    .await?;
    sqlx::query(&format!(
        "INSERT INTO \"{}\".orders (store_id, status) VALUES ($1, 'paid')",
        schema
    ))
    .bind(store_id)
    .execute(&pool)
    .await?;

    let report = synchronizer.synchronize_all().await?;
    assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
    assert!(report.columns_added >= 1);

    // Pre-existing row survives; the re-added defaultless column reads NULL.
    let (total,): (Option<String>,) = sqlx::query_as(&format!(
        "SELECT total_amount::TEXT FROM \"{}\".orders WHERE store_id = $1",
        schema
    ))
    .bind(store_id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(total, None);

    // Second run reconciles nothing further.
    let again = synchronizer.synchronize_all().await?;
    assert_eq!(again.tables_created, 0);
    assert_eq!(again.columns_added, 0);

    drop_schema(&pool, &schema).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn failed_table_does_not_abort_remaining_tables() -> Result<()> {
    let pool = main_pool().await?;
    create_reference_tables(&pool).await?;
    let (_, migrator, _) = services(&pool);

    let store_id = insert_store(&pool, &unique_slug("partial")).await?;

    // Break exactly one table: with the reference table gone, the structural
    // clone for whatsapp_logs fails while every other table still migrates.
    sqlx::query("DROP TABLE IF EXISTS whatsapp_logs")
        .execute(&pool)
        .await?;

    let result = migrator.migrate_store(store_id).await?;

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].table, "whatsapp_logs");
    for table in registry::tenant_tables() {
        if table != "whatsapp_logs" {
            assert!(
                result.migrated_tables.contains(&table.to_string()),
                "{} missing from migratedTables",
                table
            );
        }
    }
    assert_eq!(result.summary.errors, 1);

    // The descriptor was still rewritten once, so a re-run targets the same
    // schema and only retries the failed table.
    let (descriptor,): (String,) =
        sqlx::query_as("SELECT connection_descriptor FROM stores WHERE id = $1")
            .bind(store_id)
            .fetch_one(&pool)
            .await?;
    assert!(descriptor.contains(&format!("schema={}", result.schema_name)));

    create_reference_tables(&pool).await?;
    drop_schema(&pool, &result.schema_name).await?;
    Ok(())
}
