use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ColumnTrait, QueryFilter, Select};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "Cash")]
    Cash,
    #[sea_orm(string_value = "Card")]
    Card,
    #[sea_orm(string_value = "BankTransfer")]
    BankTransfer,
    #[sea_orm(string_value = "Mobile")]
    Mobile,
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Completed")]
    Completed,
}

/// The `payments` table.
///
/// Follows the same append-on-change discipline as order items: an edit
/// retires the row (`is_edited`, soft delete) and writes a new version that
/// carries the original `payment_date` forward. `is_partial`/`is_final` are
/// recomputed for every active payment on each reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,

    /// Logical payment identity, stable across versions.
    pub line_id: Uuid,
    pub version: i32,

    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,

    pub is_partial: bool,
    pub is_final: bool,

    /// Original date of the payment, preserved across edits.
    pub payment_date: DateTime<Utc>,
    pub is_edited: bool,

    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
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

/// Payments still counted toward the order total.
pub fn active() -> Select<Entity> {
    Entity::find().filter(Column::IsDeleted.eq(false))
}

/// Every payment version, edits and removals included.
pub fn all() -> Select<Entity> {
    Entity::find()
}
