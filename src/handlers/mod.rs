pub mod admin;
pub mod orders;

use std::sync::Arc;

use crate::services::{SchemaSynchronizer, StoreMigrator, StoreResolver};

/// Shared application state. Services are built once at startup and injected
/// into handlers; nothing resolves storage on its own.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<StoreResolver>,
    pub migrator: Arc<StoreMigrator>,
    pub synchronizer: Arc<SchemaSynchronizer>,
}
