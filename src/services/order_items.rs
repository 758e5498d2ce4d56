//! Append-on-change discipline for order line items.
//!
//! A persisted item row is never edited: changing any tracked field retires
//! the row (soft delete with actor and timestamp) and writes a replacement
//! carrying the same `line_id` and the next `version`. Billed prices and
//! quantities therefore survive every edit for compliance audits.

use crate::{
    entities::order,
    entities::order_item::{self},
    entities::stock_record::ItemClass,
    errors::ServiceError,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized line-item payload. The boundary resolves id-or-object
/// references before anything reaches the core, so this carries typed ids
/// only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemInput {
    /// Present when editing an existing row.
    pub id: Option<Uuid>,
    pub stock_item_id: Option<Uuid>,
    pub item_class: Option<ItemClass>,
    pub external_lens_id: Option<Uuid>,
    pub quantity: i32,
    pub price_per_unit: Decimal,
    pub is_non_stock: bool,
    pub is_refund: bool,
    pub note: Option<String>,
    pub serial_number: Option<String>,
    pub battery: Option<String>,
    pub next_service_date: Option<NaiveDate>,
}

impl OrderItemInput {
    /// Server-side subtotal; the caller's figure is never trusted.
    pub fn subtotal(&self) -> Decimal {
        self.price_per_unit * Decimal::from(self.quantity)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Item quantity must be positive".to_string(),
            ));
        }
        if self.price_per_unit < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Item price must not be negative".to_string(),
            ));
        }
        match (self.stock_item_id, self.external_lens_id) {
            (Some(_), Some(_)) => Err(ServiceError::ValidationError(
                "Item cannot reference both a stocked item and an external lens".to_string(),
            )),
            (None, None) => Err(ServiceError::ValidationError(
                "Item must reference a stocked item or an external lens".to_string(),
            )),
            (Some(_), None) if self.item_class.is_none() => Err(ServiceError::ValidationError(
                "Stocked item reference requires an item class".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Whether the line participates in stock accounting.
    pub fn is_stock_tracked(&self) -> bool {
        !self.is_non_stock && self.stock_item_id.is_some() && self.external_lens_id.is_none()
    }
}

/// Compares every tracked field of an existing row against the incoming
/// payload. Money fields compare as decimals, dates as dates, references by
/// identity.
fn tracked_fields_match(existing: &order_item::Model, incoming: &OrderItemInput) -> bool {
    existing.quantity == incoming.quantity
        && existing.price_per_unit == incoming.price_per_unit
        && existing.subtotal == incoming.subtotal()
        && existing.stock_item_id == incoming.stock_item_id
        && existing.item_class == incoming.item_class
        && existing.external_lens_id == incoming.external_lens_id
        && existing.is_non_stock == incoming.is_non_stock
        && existing.is_refund == incoming.is_refund
        && existing.note == incoming.note
        && existing.serial_number == incoming.serial_number
        && existing.battery == incoming.battery
        && existing.next_service_date == incoming.next_service_date
}

/// Applies the append-on-change policy to one line.
///
/// Returns the row that now represents the line: the untouched existing row
/// when nothing tracked changed, or the freshly inserted replacement.
pub async fn reconcile_item<C: ConnectionTrait>(
    conn: &C,
    order: &order::Model,
    existing: Option<order_item::Model>,
    incoming: &OrderItemInput,
    actor: Option<Uuid>,
) -> Result<order_item::Model, ServiceError> {
    incoming.validate()?;

    let (line_id, version) = match existing {
        None => (Uuid::new_v4(), 1),
        Some(current) => {
            if tracked_fields_match(&current, incoming) {
                // Deliberate no-op: re-submitting an unchanged line must not
                // grow the history.
                return Ok(current);
            }
            let line_id = current.line_id;
            let next_version = current.version + 1;
            retire_item(conn, current, actor).await?;
            (line_id, next_version)
        }
    };

    let now = Utc::now();
    let model = order_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        line_id: Set(line_id),
        version: Set(version),
        stock_item_id: Set(incoming.stock_item_id),
        item_class: Set(incoming.item_class),
        external_lens_id: Set(incoming.external_lens_id),
        quantity: Set(incoming.quantity),
        price_per_unit: Set(incoming.price_per_unit),
        subtotal: Set(incoming.subtotal()),
        is_non_stock: Set(incoming.is_non_stock),
        is_refund: Set(incoming.is_refund),
        note: Set(incoming.note.clone()),
        serial_number: Set(incoming.serial_number.clone()),
        battery: Set(incoming.battery.clone()),
        next_service_date: Set(incoming.next_service_date),
        is_deleted: Set(false),
        deleted_at: Set(None),
        deleted_by: Set(None),
        created_at: Set(now),
        updated_at: Set(None),
    };

    model.insert(conn).await.map_err(ServiceError::db_error)
}

/// Soft-deletes an item row, recording when and by whom.
pub async fn retire_item<C: ConnectionTrait>(
    conn: &C,
    item: order_item::Model,
    actor: Option<Uuid>,
) -> Result<order_item::Model, ServiceError> {
    let mut active: order_item::ActiveModel = item.into();
    active.is_deleted = Set(true);
    active.deleted_at = Set(Some(Utc::now()));
    active.deleted_by = Set(actor);
    active.update(conn).await.map_err(ServiceError::db_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn frame_input(quantity: i32, price: Decimal) -> OrderItemInput {
        OrderItemInput {
            id: None,
            stock_item_id: Some(Uuid::new_v4()),
            item_class: Some(ItemClass::Frame),
            external_lens_id: None,
            quantity,
            price_per_unit: price,
            is_non_stock: false,
            is_refund: false,
            note: None,
            serial_number: None,
            battery: None,
            next_service_date: None,
        }
    }

    fn model_from(input: &OrderItemInput) -> order_item::Model {
        order_item::Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            line_id: Uuid::new_v4(),
            version: 1,
            stock_item_id: input.stock_item_id,
            item_class: input.item_class,
            external_lens_id: input.external_lens_id,
            quantity: input.quantity,
            price_per_unit: input.price_per_unit,
            subtotal: input.subtotal(),
            is_non_stock: input.is_non_stock,
            is_refund: input.is_refund,
            note: input.note.clone(),
            serial_number: input.serial_number.clone(),
            battery: input.battery.clone(),
            next_service_date: input.next_service_date,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn subtotal_is_quantity_times_unit_price() {
        let input = frame_input(3, dec!(150.50));
        assert_eq!(input.subtotal(), dec!(451.50));
    }

    #[test]
    fn unchanged_payload_matches_tracked_fields() {
        let input = frame_input(2, dec!(1000));
        let model = model_from(&input);
        assert!(tracked_fields_match(&model, &input));
    }

    #[test]
    fn note_change_alone_is_tracked() {
        let input = frame_input(2, dec!(1000));
        let model = model_from(&input);
        let mut edited = input.clone();
        edited.note = Some("left temple adjusted".to_string());
        assert!(!tracked_fields_match(&model, &edited));
    }

    #[test]
    fn rejects_dual_or_missing_references() {
        let mut both = frame_input(1, dec!(10));
        both.external_lens_id = Some(Uuid::new_v4());
        assert!(both.validate().is_err());

        let mut neither = frame_input(1, dec!(10));
        neither.stock_item_id = None;
        neither.item_class = None;
        assert!(neither.validate().is_err());

        let mut external_only = frame_input(1, dec!(10));
        external_only.stock_item_id = None;
        external_only.item_class = None;
        external_only.external_lens_id = Some(Uuid::new_v4());
        assert!(external_only.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_quantities() {
        assert!(frame_input(0, dec!(10)).validate().is_err());
        assert!(frame_input(-2, dec!(10)).validate().is_err());
        assert!(frame_input(1, dec!(10)).validate().is_ok());
    }
}
