use axum::{extract::Extension, Json};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::ApiError;
use crate::middleware::StoreScope;

/// GET /api/orders - recent orders for the resolved store. The handle's pool
/// is already pinned to the store schema, so the query is unqualified; while
/// the store still lives in the shared schema the handle's store filter keeps
/// other stores' rows out.
pub async fn list_orders(
    Extension(StoreScope(handle)): Extension<StoreScope>,
) -> Result<Json<Value>, ApiError> {
    let rows = match handle.store_filter() {
        Some(store_id) => {
            sqlx::query(
                r#"
                SELECT id, customer_id, status, total_amount::TEXT AS total_amount, created_at
                FROM orders
                WHERE store_id = $1
                ORDER BY created_at DESC
                LIMIT 100
                "#,
            )
            .bind(store_id)
            .fetch_all(&handle.pool)
            .await
        }
        None => {
            sqlx::query(
                r#"
                SELECT id, customer_id, status, total_amount::TEXT AS total_amount, created_at
                FROM orders
                ORDER BY created_at DESC
                LIMIT 100
                "#,
            )
            .fetch_all(&handle.pool)
            .await
        }
    }
    .map_err(crate::database::manager::DatabaseError::from)?;

    let orders: Vec<Value> = rows.iter().map(order_json).collect();
    Ok(Json(json!({ "success": true, "data": orders })))
}

/// GET /api/customers - recent customers for the resolved store.
pub async fn list_customers(
    Extension(StoreScope(handle)): Extension<StoreScope>,
) -> Result<Json<Value>, ApiError> {
    let rows = match handle.store_filter() {
        Some(store_id) => {
            sqlx::query(
                r#"
                SELECT id, name, phone, created_at
                FROM customers
                WHERE store_id = $1
                ORDER BY created_at DESC
                LIMIT 100
                "#,
            )
            .bind(store_id)
            .fetch_all(&handle.pool)
            .await
        }
        None => {
            sqlx::query(
                r#"
                SELECT id, name, phone, created_at
                FROM customers
                ORDER BY created_at DESC
                LIMIT 100
                "#,
            )
            .fetch_all(&handle.pool)
            .await
        }
    }
    .map_err(crate::database::manager::DatabaseError::from)?;

    let customers: Vec<Value> = rows.iter().map(customer_json).collect();
    Ok(Json(json!({ "success": true, "data": customers })))
}

fn order_json(row: &PgRow) -> Value {
    json!({
        "id": row.get::<i64, _>("id"),
        "customerId": row.get::<Option<i64>, _>("customer_id"),
        "status": row.get::<Option<String>, _>("status"),
        "totalAmount": row.get::<Option<String>, _>("total_amount"),
        "createdAt": row.get::<DateTime<Utc>, _>("created_at"),
    })
}

fn customer_json(row: &PgRow) -> Value {
    json!({
        "id": row.get::<i64, _>("id"),
        "name": row.get::<Option<String>, _>("name"),
        "phone": row.get::<Option<String>, _>("phone"),
        "createdAt": row.get::<DateTime<Utc>, _>("created_at"),
    })
}
