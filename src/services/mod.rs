pub mod capacity;
pub mod migrator;
pub mod resolver;
pub mod schema_sync;

pub use capacity::{can_onboard, plan, CapacityPlan};
pub use migrator::{MigrationError, MigrationResult, StoreMigrator};
pub use resolver::{ResolveError, StoreHandle, StoreResolver};
pub use schema_sync::{SchemaSynchronizer, SyncReport};
