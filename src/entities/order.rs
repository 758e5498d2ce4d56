use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ColumnTrait, QueryFilter, Select};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Workflow status of an order. Independent of the hold / deleted / refund
/// axes, which are separate flags on the row.
#[derive(
    Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum OrderStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Processing")]
    Processing,
    #[sea_orm(string_value = "Completed")]
    Completed,
}

#[derive(
    Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum FittingStatus {
    #[sea_orm(string_value = "NotStarted")]
    NotStarted,
    #[sea_orm(string_value = "InProgress")]
    InProgress,
    #[sea_orm(string_value = "Fitted")]
    Fitted,
}

/// The `orders` table.
///
/// Orders are never hard-deleted; `is_deleted` retires a row while keeping it
/// for audit. `total_price = subtotal - discount` and
/// `total_payment = active payments - refund expenses` are maintained by the
/// orchestrator on every mutation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub branch_id: Uuid,
    pub customer_id: Uuid,
    pub refraction_id: Option<Uuid>,

    /// Branch-scoped invoice number, assigned once at creation.
    pub invoice_number: String,

    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total_price: Decimal,
    pub total_payment: Decimal,

    pub on_hold: bool,
    pub urgent: bool,
    pub status: OrderStatus,
    pub fitting_status: FittingStatus,

    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,

    pub is_refund: bool,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,

    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::branch::Entity",
        from = "Column::BranchId",
        to = "super::branch::Column::Id"
    )]
    Branch,
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
    #[sea_orm(has_many = "super::order_progress::Entity")]
    ProgressEntries,
}

impl Related<super::branch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Branch.def()
    }
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl Related<super::order_progress::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProgressEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Orders that have not been soft-deleted.
pub fn active() -> Select<Entity> {
    Entity::find().filter(Column::IsDeleted.eq(false))
}

/// Every order row, soft-deleted included. Callers must opt in explicitly.
pub fn all() -> Select<Entity> {
    Entity::find()
}
