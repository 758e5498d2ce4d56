use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ColumnTrait, QueryFilter, Select};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stock_record::ItemClass;

/// The `order_items` table.
///
/// Rows are immutable once persisted. A semantic change to a line retires
/// the current row (soft delete, actor, timestamp) and inserts a replacement
/// with the same `line_id` and `version + 1`; "current" is the highest active
/// version per line. Billed quantities and prices are therefore never
/// overwritten in place.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,

    /// Logical line identity, stable across versions.
    pub line_id: Uuid,
    pub version: i32,

    /// Stocked item reference; exclusive with `external_lens_id`.
    pub stock_item_id: Option<Uuid>,
    pub item_class: Option<ItemClass>,
    /// Externally sourced (non-stocked) lens reference.
    pub external_lens_id: Option<Uuid>,

    pub quantity: i32,
    pub price_per_unit: Decimal,
    /// quantity x price_per_unit, recomputed server-side.
    pub subtotal: Decimal,

    pub is_non_stock: bool,
    pub is_refund: bool,

    pub note: Option<String>,
    pub serial_number: Option<String>,
    pub battery: Option<String>,
    pub next_service_date: Option<NaiveDate>,

    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// True when the line participates in stock accounting at all.
    pub fn is_stock_tracked(&self) -> bool {
        !self.is_non_stock && self.stock_item_id.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Current (not soft-deleted) item rows.
pub fn active() -> Select<Entity> {
    Entity::find().filter(Column::IsDeleted.eq(false))
}

/// Every version ever written, retired rows included.
pub fn all() -> Select<Entity> {
    Entity::find()
}
