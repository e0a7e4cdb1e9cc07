use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "product_unit", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProductUnit {
    Litre,
    Millilitre,
    Kilogram,
    Gram,
    Piece,
    Packet,
}

impl ProductUnit {
    pub fn is_litre(&self) -> bool {
        matches!(self, ProductUnit::Litre)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductUnit::Litre => "litre",
            ProductUnit::Millilitre => "millilitre",
            ProductUnit::Kilogram => "kilogram",
            ProductUnit::Gram => "gram",
            ProductUnit::Piece => "piece",
            ProductUnit::Packet => "packet",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub unit: ProductUnit,
    pub price: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
