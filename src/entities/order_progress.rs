use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fulfillment milestones an order moves through on its way back to the
/// customer.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum ProgressStatus {
    #[sea_orm(string_value = "ReceivedFromCustomer")]
    ReceivedFromCustomer,
    #[sea_orm(string_value = "IssueToFactory")]
    IssueToFactory,
    #[sea_orm(string_value = "ReceivedFromFactory")]
    ReceivedFromFactory,
    #[sea_orm(string_value = "IssueToCustomer")]
    IssueToCustomer,
}

/// The `order_progress` table: append-only timeline. The order's current
/// progress is the latest entry; transitions are recorded, never edited.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_progress")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: ProgressStatus,
    pub changed_by: Option<Uuid>,
    pub changed_at: DateTime<Utc>,
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
