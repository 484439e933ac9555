use serde::{Deserialize, Serialize};

/// Access level carried in JWT claims. Global principals are operator roles
/// that bypass store isolation; store and tenant principals are always bound
/// to a single store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Global,
    Store,
    Tenant,
}

/// JWT claims issued by the (out-of-scope) authentication service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub level: Level,
    #[serde(default)]
    pub store_id: Option<i64>,
    pub exp: usize,
}

/// Authenticated principal extracted from validated claims and injected into
/// the request by middleware.
#[derive(Debug, Clone)]
pub struct Principal {
    pub subject: String,
    pub role: String,
    pub level: Level,
    pub store_id: Option<i64>,
}

impl Principal {
    pub fn is_global(&self) -> bool {
        self.level == Level::Global
    }
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self {
            subject: claims.sub,
            role: claims.role,
            level: claims.level,
            store_id: claims.store_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Level::Global).unwrap(), "\"global\"");
        assert_eq!(serde_json::to_string(&Level::Store).unwrap(), "\"store\"");
        assert_eq!(serde_json::to_string(&Level::Tenant).unwrap(), "\"tenant\"");
    }

    #[test]
    fn claims_without_store_id_deserialize() {
        let claims: Claims = serde_json::from_str(
            r#"{"sub":"ops@example.com","role":"operator","level":"global","exp":1893456000}"#,
        )
        .unwrap();
        assert_eq!(claims.level, Level::Global);
        assert!(claims.store_id.is_none());
    }
}
