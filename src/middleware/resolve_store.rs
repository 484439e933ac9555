use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Json, Response},
};

use crate::auth::Principal;
use crate::error::ApiError;
use crate::services::resolver::{StoreHandle, StoreResolver};

/// Store-scoped storage handle, injected by middleware. Handlers take this
/// extension instead of building their own connections; one resolution per
/// request, one call site.
#[derive(Clone)]
pub struct StoreScope(pub StoreHandle);

/// Middleware that resolves the authenticated principal to its store schema
/// and injects a [`StoreScope`] into the request.
pub async fn resolve_store_middleware(
    State(resolver): State<Arc<StoreResolver>>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<serde_json::Value>)> {
    // Get Principal from previous JWT middleware
    let principal = request
        .extensions()
        .get::<Principal>()
        .ok_or_else(|| {
            let api_error =
                ApiError::unauthorized("JWT authentication required before store resolution");
            (
                StatusCode::from_u16(api_error.status_code()).unwrap(),
                Json(api_error.to_json()),
            )
        })?
        .clone();

    let handle = resolver
        .resolve_for_principal(&principal)
        .await
        .map_err(|e| {
            let api_error: ApiError = e.into();
            (
                StatusCode::from_u16(api_error.status_code()).unwrap(),
                Json(api_error.to_json()),
            )
        })?;

    tracing::debug!(
        "Resolved principal {} to schema {}",
        principal.subject,
        handle.schema
    );

    request.extensions_mut().insert(StoreScope(handle));

    Ok(next.run(request).await)
}
