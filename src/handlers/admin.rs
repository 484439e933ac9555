use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::auth::Principal;
use crate::database::manager::DatabaseManager;
use crate::error::ApiError;
use crate::services::capacity;

use super::AppState;

fn require_global(principal: &Principal) -> Result<(), ApiError> {
    if principal.is_global() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Operator role required"))
    }
}

/// POST /api/admin/schema/sync - reconcile every store schema against the
/// reference schema. Returns the full sync report.
pub async fn sync_schemas(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Value>, ApiError> {
    require_global(&principal)?;

    let report = state.synchronizer.synchronize_all().await?;
    Ok(Json(json!({ "success": true, "data": report })))
}

/// POST /api/admin/stores/:id/migrate - carve the store out of the shared
/// schema. Returns the full migration result; callers must inspect
/// `data.success` and `data.errors`, partial failure is not an HTTP error.
pub async fn migrate_store(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(store_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    require_global(&principal)?;

    let result = state.migrator.migrate_store(store_id).await?;
    Ok(Json(json!({ "success": true, "data": result })))
}

/// GET /api/admin/capacity - onboarding headroom given schema-count limits.
pub async fn capacity(
    Extension(principal): Extension<Principal>,
) -> Result<Json<Value>, ApiError> {
    require_global(&principal)?;

    let pool = DatabaseManager::main_pool().await?;
    let (current,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM stores WHERE is_active = true")
            .fetch_one(&pool)
            .await
            .map_err(crate::database::manager::DatabaseError::from)?;

    let limits = &crate::config::config().capacity;
    let plan = capacity::plan(current, limits.max_schemas_allowed, limits.reserved_schemas);

    Ok(Json(json!({
        "success": true,
        "data": {
            "currentTenantCount": current,
            "maxTenants": plan.max_tenants,
            "availableCapacity": plan.available_capacity,
        }
    })))
}
