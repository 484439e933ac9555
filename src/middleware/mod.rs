pub mod auth;
pub mod resolve_store;

pub use auth::jwt_auth_middleware;
pub use resolve_store::{resolve_store_middleware, StoreScope};
