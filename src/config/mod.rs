use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub capacity: CapacityConfig,
    pub resolver: ResolverConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
    /// Bound on any single DDL/DML statement issued by the synchronizer or
    /// migrator; an elapsed timeout is a per-table failure, not a run abort.
    pub statement_timeout_ms: u64,
}

/// Schema-count limits used by the capacity planner to gate onboarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityConfig {
    pub max_schemas_allowed: i64,
    pub reserved_schemas: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// TTL for the store-id -> connection-descriptor cache.
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_STATEMENT_TIMEOUT_MS") {
            self.database.statement_timeout_ms =
                v.parse().unwrap_or(self.database.statement_timeout_ms);
        }

        if let Ok(v) = env::var("CAPACITY_MAX_SCHEMAS_ALLOWED") {
            self.capacity.max_schemas_allowed =
                v.parse().unwrap_or(self.capacity.max_schemas_allowed);
        }
        if let Ok(v) = env::var("CAPACITY_RESERVED_SCHEMAS") {
            self.capacity.reserved_schemas = v.parse().unwrap_or(self.capacity.reserved_schemas);
        }

        if let Ok(v) = env::var("RESOLVER_CACHE_TTL_SECS") {
            self.resolver.cache_ttl_secs = v.parse().unwrap_or(self.resolver.cache_ttl_secs);
        }

        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 30,
                statement_timeout_ms: 30_000,
            },
            capacity: CapacityConfig {
                max_schemas_allowed: 100,
                reserved_schemas: 5,
            },
            resolver: ResolverConfig { cache_ttl_secs: 30 },
            security: SecurityConfig {
                jwt_secret: String::new(),
                enable_cors: true,
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 10,
                statement_timeout_ms: 20_000,
            },
            capacity: CapacityConfig {
                max_schemas_allowed: 500,
                reserved_schemas: 10,
            },
            resolver: ResolverConfig { cache_ttl_secs: 60 },
            security: SecurityConfig {
                jwt_secret: String::new(),
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout: 5,
                statement_timeout_ms: 15_000,
            },
            capacity: CapacityConfig {
                max_schemas_allowed: 2000,
                reserved_schemas: 20,
            },
            resolver: ResolverConfig { cache_ttl_secs: 120 },
            security: SecurityConfig {
                jwt_secret: String::new(),
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
