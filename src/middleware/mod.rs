pub mod auth;

pub use auth::{auth_middleware, is_admin_or_higher, is_staff, AppState, AuthUser};
