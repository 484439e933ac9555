use std::sync::Arc;

use axum::{middleware::from_fn, middleware::from_fn_with_state, routing::get, routing::post, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use storehub_api::database::manager::DatabaseManager;
use storehub_api::handlers::{admin, orders, AppState};
use storehub_api::middleware::{jwt_auth_middleware, resolve_store_middleware};
use storehub_api::services::{SchemaSynchronizer, StoreMigrator, StoreResolver};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = storehub_api::config::config();
    tracing::info!("Starting Storehub API in {:?} mode", config.environment);

    let main_pool = DatabaseManager::main_pool()
        .await
        .expect("database connection");

    let resolver = Arc::new(StoreResolver::new(
        main_pool.clone(),
        std::time::Duration::from_secs(config.resolver.cache_ttl_secs),
    ));
    let state = AppState {
        migrator: Arc::new(StoreMigrator::new(main_pool.clone(), resolver.clone())),
        synchronizer: Arc::new(SchemaSynchronizer::new(main_pool)),
        resolver,
    };

    let app = app(state);

    let port = std::env::var("STOREHUB_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("Storehub API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}

fn app(state: AppState) -> Router {
    let resolver = state.resolver.clone();

    // Store-scoped routes get a StoreHandle injected by middleware; handlers
    // never resolve storage themselves.
    let store_routes = Router::new()
        .route("/api/orders", get(orders::list_orders))
        .route("/api/customers", get(orders::list_customers))
        .layer(from_fn_with_state(resolver, resolve_store_middleware))
        .layer(from_fn(jwt_auth_middleware));

    let admin_routes = Router::new()
        .route("/api/admin/schema/sync", post(admin::sync_schemas))
        .route("/api/admin/stores/:id/migrate", post(admin::migrate_store))
        .route("/api/admin/capacity", get(admin::capacity))
        .layer(from_fn(jwt_auth_middleware))
        .with_state(state);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(store_routes)
        .merge(admin_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Storehub API",
            "version": version,
            "description": "Multi-tenant order-management and customer-messaging backend",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "orders": "/api/orders (store-scoped)",
                "customers": "/api/customers (store-scoped)",
                "admin": "/api/admin/* (operator role)",
            }
        }
    }))
}

async fn health() -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
