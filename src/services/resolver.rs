use std::collections::HashMap;
use std::time::{Duration, Instant};

use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::auth::Principal;
use crate::database::descriptor::ConnectionDescriptor;
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::registry::REFERENCE_SCHEMA;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// A non-global principal without a store id must never receive a handle;
    /// falling back to the shared schema would leak cross-store data.
    #[error("Principal has no store id")]
    IncompleteIdentity,

    #[error("Store not found or inactive: {0}")]
    StoreNotFound(i64),

    #[error("Invalid connection descriptor for store {0}")]
    BadDescriptor(i64),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Storage handle scoped to one schema. Handlers receive this from middleware
/// and never construct their own; the schema is already pinned into the
/// pool's search_path.
#[derive(Clone)]
pub struct StoreHandle {
    pub pool: PgPool,
    pub schema: String,
    /// The resolved store, when the principal is bound to one. `None` only
    /// for global/operator principals.
    pub store_id: Option<i64>,
}

impl StoreHandle {
    /// Discriminator filter store-scoped queries must apply. `Some` while the
    /// store still lives in the shared schema, where rows of every store sit
    /// side by side; `None` once the store has its own schema (or for global
    /// principals, which see the shared schema deliberately).
    pub fn store_filter(&self) -> Option<i64> {
        shared_scope_filter(&self.schema, self.store_id)
    }
}

fn shared_scope_filter(schema: &str, store_id: Option<i64>) -> Option<i64> {
    if schema == REFERENCE_SCHEMA {
        store_id
    } else {
        None
    }
}

struct CacheEntry {
    descriptor: String,
    cached_at: Instant,
}

/// Resolves an authenticated principal to a schema-scoped storage handle.
///
/// Descriptors are cached per store id with a bounded TTL so a lookup is not
/// paid on every request. The migrator calls [`StoreResolver::invalidate`]
/// after rewriting a descriptor; entries also simply expire.
pub struct StoreResolver {
    main_pool: PgPool,
    cache: RwLock<HashMap<i64, CacheEntry>>,
    ttl: Duration,
}

impl StoreResolver {
    pub fn new(main_pool: PgPool, ttl: Duration) -> Self {
        Self {
            main_pool,
            cache: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn from_env() -> Result<Self, DatabaseError> {
        let ttl = Duration::from_secs(crate::config::config().resolver.cache_ttl_secs);
        Ok(Self::new(DatabaseManager::main_pool().await?, ttl))
    }

    pub async fn resolve_for_principal(
        &self,
        principal: &Principal,
    ) -> Result<StoreHandle, ResolveError> {
        if principal.is_global() {
            // Administrative surfaces only; bypasses store isolation.
            return Ok(StoreHandle {
                pool: self.main_pool.clone(),
                schema: REFERENCE_SCHEMA.to_string(),
                store_id: None,
            });
        }

        let store_id = principal.store_id.ok_or(ResolveError::IncompleteIdentity)?;
        self.resolve_store(store_id).await
    }

    /// Handle for a known store id, via the descriptor cache.
    pub async fn resolve_store(&self, store_id: i64) -> Result<StoreHandle, ResolveError> {
        let raw = self.descriptor_for(store_id).await?;
        let descriptor = ConnectionDescriptor::parse(&raw)
            .map_err(|_| ResolveError::BadDescriptor(store_id))?;

        // No schema parameter means the store has not been carved out yet and
        // still lives in the shared schema.
        let schema = descriptor.schema().unwrap_or(REFERENCE_SCHEMA);

        let pool = if schema == REFERENCE_SCHEMA {
            self.main_pool.clone()
        } else {
            DatabaseManager::schema_pool(schema).await?
        };

        Ok(StoreHandle {
            pool,
            schema: schema.to_string(),
            store_id: Some(store_id),
        })
    }

    async fn descriptor_for(&self, store_id: i64) -> Result<String, ResolveError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&store_id) {
                if entry.cached_at.elapsed() < self.ttl {
                    return Ok(entry.descriptor.clone());
                }
            }
        }

        let row: Option<(String, bool)> = sqlx::query_as(
            "SELECT connection_descriptor, is_active FROM stores WHERE id = $1",
        )
        .bind(store_id)
        .fetch_optional(&self.main_pool)
        .await?;

        let descriptor = match row {
            Some((descriptor, true)) => descriptor,
            Some((_, false)) => {
                warn!("Resolution refused for inactive store {}", store_id);
                return Err(ResolveError::StoreNotFound(store_id));
            }
            None => return Err(ResolveError::StoreNotFound(store_id)),
        };

        let mut cache = self.cache.write().await;
        cache.insert(
            store_id,
            CacheEntry {
                descriptor: descriptor.clone(),
                cached_at: Instant::now(),
            },
        );

        Ok(descriptor)
    }

    /// Drop the cached descriptor for a store. Called by the migrator after a
    /// descriptor rewrite so stale entries cannot route requests to the
    /// store's pre-migration schema.
    pub async fn invalidate(&self, store_id: i64) {
        let mut cache = self.cache.write().await;
        if cache.remove(&store_id).is_some() {
            debug!("Invalidated descriptor cache for store {}", store_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_schema_handle_keeps_the_store_discriminator() {
        assert_eq!(shared_scope_filter(REFERENCE_SCHEMA, Some(5)), Some(5));
    }

    #[test]
    fn carved_out_schema_needs_no_filter() {
        assert_eq!(shared_scope_filter("store_5_1700000000", Some(5)), None);
    }

    #[test]
    fn global_principals_are_unfiltered() {
        assert_eq!(shared_scope_filter(REFERENCE_SCHEMA, None), None);
    }
}
