//! Canonical table registry: which logical tables belong to a store's schema
//! versus the global schema, plus the type mapping used when synthesizing DDL
//! from catalog metadata. Static data, no I/O.

/// The hand-maintained shared schema used as the structural source of truth.
pub const REFERENCE_SCHEMA: &str = "public";

/// Naming convention for per-store schemas.
pub const TENANT_SCHEMA_PREFIX: &str = "store_";

/// Column name discriminating store ownership in shared-schema tables.
pub const STORE_DISCRIMINATOR: &str = "store_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableScope {
    Tenant,
    Global,
}

#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub scope: TableScope,
}

// Order matters: migration processes tenant tables in this order, parents
// before children, and the report lists tables in the same order.
const TABLES: &[TableDef] = &[
    TableDef { name: "stores", scope: TableScope::Global },
    TableDef { name: "users", scope: TableScope::Global },
    TableDef { name: "customers", scope: TableScope::Tenant },
    TableDef { name: "products", scope: TableScope::Tenant },
    TableDef { name: "orders", scope: TableScope::Tenant },
    TableDef { name: "order_items", scope: TableScope::Tenant },
    TableDef { name: "conversations", scope: TableScope::Tenant },
    TableDef { name: "messages", scope: TableScope::Tenant },
    TableDef { name: "notifications", scope: TableScope::Tenant },
    TableDef { name: "whatsapp_logs", scope: TableScope::Tenant },
];

/// Tables replicated into every store schema, in migration order.
pub fn tenant_tables() -> Vec<&'static str> {
    TABLES
        .iter()
        .filter(|t| t.scope == TableScope::Tenant)
        .map(|t| t.name)
        .collect()
}

/// Tables that live only in the reference schema.
pub fn global_tables() -> Vec<&'static str> {
    TABLES
        .iter()
        .filter(|t| t.scope == TableScope::Global)
        .map(|t| t.name)
        .collect()
}

pub fn reference_schema() -> &'static str {
    REFERENCE_SCHEMA
}

/// Map an `information_schema` data type to the DDL type used when creating
/// or extending store tables. Unmapped types pass through as-is.
pub fn map_data_type(data_type: &str, character_maximum_length: Option<i32>) -> String {
    match data_type {
        "character varying" => match character_maximum_length {
            Some(n) => format!("VARCHAR({})", n),
            // Length metadata can be absent for unconstrained varchars
            None => "VARCHAR(255)".to_string(),
        },
        "timestamp without time zone" => "TIMESTAMP".to_string(),
        "timestamp with time zone" => "TIMESTAMPTZ".to_string(),
        "boolean" => "BOOLEAN".to_string(),
        "integer" => "INTEGER".to_string(),
        "bigint" => "BIGINT".to_string(),
        "numeric" => "NUMERIC".to_string(),
        "text" => "TEXT".to_string(),
        "json" => "JSON".to_string(),
        "jsonb" => "JSONB".to_string(),
        other => other.to_string(),
    }
}
