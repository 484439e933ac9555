use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A virtual store: one row in the global `stores` registry. The
/// `connection_descriptor` is the only persisted routing fact; it is rewritten
/// exclusively by the migrator when the store is carved out of the shared
/// schema.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Store {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub connection_descriptor: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
