pub mod descriptor;
pub mod introspect;
pub mod manager;
pub mod models;
pub mod registry;

pub use descriptor::ConnectionDescriptor;
pub use introspect::{ColumnInfo, SchemaIntrospector};
pub use manager::{DatabaseError, DatabaseManager};
