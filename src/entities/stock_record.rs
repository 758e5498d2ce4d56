use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// When a line item's stock is taken out of the branch quantity.
///
/// `Immediate` classes are deducted at order create/update time regardless of
/// hold state; `Deferred` classes wait until the order comes off hold.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReservationMode {
    Immediate,
    Deferred,
}

/// Inventory category of a stocked item.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum ItemClass {
    #[sea_orm(string_value = "Frame")]
    Frame,
    #[sea_orm(string_value = "Lens")]
    Lens,
    #[sea_orm(string_value = "LensCleaner")]
    LensCleaner,
    #[sea_orm(string_value = "Other")]
    Other,
    #[sea_orm(string_value = "HearingItem")]
    HearingItem,
}

impl ItemClass {
    /// Prescription lenses are fabricated to order, so their stock deduction
    /// is deferred while the order is on hold. Everything else comes off the
    /// shelf and is reserved immediately.
    pub fn reservation_mode(&self) -> ReservationMode {
        match self {
            ItemClass::Lens => ReservationMode::Deferred,
            ItemClass::Frame
            | ItemClass::LensCleaner
            | ItemClass::Other
            | ItemClass::HearingItem => ReservationMode::Immediate,
        }
    }
}

/// The `stock_records` table: quantity on hand per (item, branch).
///
/// Quantity never goes below zero; the ledger checks under a row lock before
/// any decrement.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub stock_item_id: Uuid,
    pub item_class: ItemClass,
    pub branch_id: Uuid,
    pub quantity: i32,
    pub initial_count: Option<i32>,
    pub stock_limit: Option<i32>,
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
}

impl Related<super::branch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Branch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lens_is_the_deferred_class() {
        assert_eq!(ItemClass::Lens.reservation_mode(), ReservationMode::Deferred);
        for class in [
            ItemClass::Frame,
            ItemClass::LensCleaner,
            ItemClass::Other,
            ItemClass::HearingItem,
        ] {
            assert_eq!(class.reservation_mode(), ReservationMode::Immediate);
        }
    }
}
