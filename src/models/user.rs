use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Роль вызывающего. Управление пользователями живёт в другом сервисе,
/// здесь роль приходит только из JWT.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Customer,
    Deliverer,
    Admin,
    SuperAdmin,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Customer
    }
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Deliverer => "deliverer",
            UserRole::Admin => "admin",
            UserRole::SuperAdmin => "super_admin",
        }
    }

    pub fn parse(role: &str) -> Self {
        match role {
            "deliverer" | "delivery_boy" => UserRole::Deliverer,
            "admin" => UserRole::Admin,
            "superadmin" | "super_admin" => UserRole::SuperAdmin,
            _ => UserRole::Customer,
        }
    }
}
