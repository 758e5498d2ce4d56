//! Branch stock accounting.
//!
//! Reservation runs in two phases: [`plan`] locks every touched
//! `stock_records` row (`SELECT ... FOR UPDATE`) and validates availability
//! without mutating anything; [`apply`] performs the deductions/restocks and
//! appends one `stock_movements` row per nonzero change. A validation failure
//! on any line therefore aborts the whole operation before stock moves.

use crate::{
    db::DbPool,
    entities::stock_movement::{self, StockAction},
    entities::stock_record::{self, Entity as StockRecordEntity, ItemClass, ReservationMode},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// One line's desired stock position, fed into [`plan`].
///
/// `desired_quantity` is what the line should hold in branch stock after the
/// operation; `held_quantity` is what it holds now (zero for new lines and
/// for deferred-class lines that were never deducted while on hold). The
/// difference is the only thing the ledger acts on, which makes re-planning
/// the same payload a no-op.
#[derive(Debug, Clone)]
pub struct LineChange {
    pub stock_item_id: Uuid,
    pub item_class: ItemClass,
    pub desired_quantity: i32,
    pub held_quantity: i32,
}

impl LineChange {
    /// Computes the stock position a line should hold given the order's hold
    /// flag: deferred classes hold nothing while the order is on hold.
    pub fn desired_for(item_class: ItemClass, quantity: i32, on_hold: bool) -> i32 {
        match item_class.reservation_mode() {
            ReservationMode::Immediate => quantity,
            ReservationMode::Deferred if on_hold => 0,
            ReservationMode::Deferred => quantity,
        }
    }

    fn delta(&self) -> i32 {
        self.desired_quantity - self.held_quantity
    }
}

/// A locked stock row plus the net change to apply to it.
#[derive(Debug, Clone)]
pub struct StockUpdate {
    pub record: stock_record::Model,
    /// Positive = take from stock, negative = give back.
    pub delta: i32,
}

/// Validated set of updates; all rows are already locked by the transaction
/// that produced the plan.
#[derive(Debug, Clone, Default)]
pub struct StockPlan {
    pub updates: Vec<StockUpdate>,
}

impl StockPlan {
    pub fn is_empty(&self) -> bool {
        self.updates.iter().all(|u| u.delta == 0)
    }
}

/// Phase one: lock and validate. Returns a plan ready for [`apply`].
///
/// Lines referencing the same stock item are netted together before the
/// availability check. Rows are locked in item-id order so concurrent
/// planners cannot deadlock each other.
pub async fn plan<C: ConnectionTrait>(
    conn: &C,
    branch_id: Uuid,
    changes: &[LineChange],
) -> Result<StockPlan, ServiceError> {
    let mut net: BTreeMap<Uuid, (ItemClass, i32)> = BTreeMap::new();
    for change in changes {
        let entry = net
            .entry(change.stock_item_id)
            .or_insert((change.item_class, 0));
        entry.1 += change.delta();
    }

    let mut updates = Vec::with_capacity(net.len());
    for (stock_item_id, (item_class, delta)) in net {
        if delta == 0 {
            continue;
        }

        let record = StockRecordEntity::find()
            .filter(stock_record::Column::StockItemId.eq(stock_item_id))
            .filter(stock_record::Column::BranchId.eq(branch_id))
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "No stock record for item {} at branch {}",
                    stock_item_id, branch_id
                ))
            })?;

        if delta > 0 && record.quantity < delta {
            return Err(ServiceError::InsufficientStock {
                stock_item_id,
                branch_id,
                requested: delta,
                available: record.quantity,
            });
        }

        debug_assert_eq!(record.item_class, item_class);
        updates.push(StockUpdate { record, delta });
    }

    Ok(StockPlan { updates })
}

/// Phase two: mutate quantities and append movement rows.
pub async fn apply<C: ConnectionTrait>(
    conn: &C,
    plan: StockPlan,
    recorded_by: Option<Uuid>,
) -> Result<(), ServiceError> {
    let now = Utc::now();

    for update in plan.updates {
        if update.delta == 0 {
            continue;
        }

        let new_quantity = update.record.quantity - update.delta;
        if new_quantity < 0 {
            // The plan phase already rejected this; a negative here means the
            // row changed without its lock, which is a bug worth surfacing.
            return Err(ServiceError::InternalError(format!(
                "Stock for item {} at branch {} would go negative",
                update.record.stock_item_id, update.record.branch_id
            )));
        }

        let item_class = update.record.item_class;
        let stock_item_id = update.record.stock_item_id;
        let branch_id = update.record.branch_id;

        let mut active: stock_record::ActiveModel = update.record.into();
        active.quantity = Set(new_quantity);
        active.updated_at = Set(Some(now));
        active.update(conn).await.map_err(ServiceError::db_error)?;

        let (action, signed_change) = if update.delta > 0 {
            (StockAction::Remove, -update.delta)
        } else {
            (StockAction::Add, -update.delta)
        };

        let movement = stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            stock_item_id: Set(stock_item_id),
            item_class: Set(item_class),
            branch_id: Set(branch_id),
            action: Set(action),
            quantity_changed: Set(signed_change),
            transfer_to_branch_id: Set(None),
            recorded_by: Set(recorded_by),
            created_at: Set(now),
        };
        movement.insert(conn).await.map_err(ServiceError::db_error)?;
    }

    Ok(())
}

/// Manual stock operations exposed to branch staff: adjustments and
/// inter-branch transfers. Order-driven reservation goes through
/// [`plan`]/[`apply`] inside the orchestrator's transaction instead.
#[derive(Clone)]
pub struct StockLedgerService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl StockLedgerService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Adds or removes quantity at one branch.
    #[instrument(skip(self))]
    pub async fn adjust_stock(
        &self,
        stock_item_id: Uuid,
        item_class: ItemClass,
        branch_id: Uuid,
        action: StockAction,
        quantity: i32,
        recorded_by: Option<Uuid>,
    ) -> Result<stock_record::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Adjustment quantity must be positive".to_string(),
            ));
        }
        if action == StockAction::Transfer {
            return Err(ServiceError::InvalidOperation(
                "Use transfer_stock for inter-branch transfers".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;
        let now = Utc::now();

        let record = StockRecordEntity::find()
            .filter(stock_record::Column::StockItemId.eq(stock_item_id))
            .filter(stock_record::Column::BranchId.eq(branch_id))
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let record = match record {
            Some(found) => found,
            None if action == StockAction::Add => {
                let fresh = stock_record::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    stock_item_id: Set(stock_item_id),
                    item_class: Set(item_class),
                    branch_id: Set(branch_id),
                    quantity: Set(0),
                    initial_count: Set(Some(quantity)),
                    stock_limit: Set(None),
                    created_at: Set(now),
                    updated_at: Set(None),
                };
                fresh.insert(&txn).await.map_err(ServiceError::db_error)?
            }
            None => {
                return Err(ServiceError::ValidationError(format!(
                    "No stock record for item {} at branch {}",
                    stock_item_id, branch_id
                )))
            }
        };

        let old_quantity = record.quantity;
        let new_quantity = match action {
            StockAction::Add => old_quantity + quantity,
            StockAction::Remove => {
                if old_quantity < quantity {
                    return Err(ServiceError::InsufficientStock {
                        stock_item_id,
                        branch_id,
                        requested: quantity,
                        available: old_quantity,
                    });
                }
                old_quantity - quantity
            }
            StockAction::Transfer => unreachable!("rejected above"),
        };

        let mut active: stock_record::ActiveModel = record.into();
        active.quantity = Set(new_quantity);
        active.updated_at = Set(Some(now));
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        let signed_change = match action {
            StockAction::Add => quantity,
            _ => -quantity,
        };
        let movement = stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            stock_item_id: Set(stock_item_id),
            item_class: Set(item_class),
            branch_id: Set(branch_id),
            action: Set(action),
            quantity_changed: Set(signed_change),
            transfer_to_branch_id: Set(None),
            recorded_by: Set(recorded_by),
            created_at: Set(now),
        };
        movement.insert(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            stock_item_id = %stock_item_id,
            branch_id = %branch_id,
            old_quantity,
            new_quantity,
            "Stock adjusted"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::StockAdjusted {
                stock_item_id,
                branch_id,
                old_quantity,
                new_quantity,
            })
            .await
        {
            tracing::warn!(error = %e, "Failed to send stock adjusted event");
        }

        Ok(updated)
    }

    /// Moves quantity between two branches, appending a single Transfer
    /// movement that names both ends.
    #[instrument(skip(self))]
    pub async fn transfer_stock(
        &self,
        stock_item_id: Uuid,
        from_branch_id: Uuid,
        to_branch_id: Uuid,
        quantity: i32,
        recorded_by: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Transfer quantity must be positive".to_string(),
            ));
        }
        if from_branch_id == to_branch_id {
            return Err(ServiceError::ValidationError(
                "Transfer source and destination branches must differ".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;
        let now = Utc::now();

        // Lock in a stable order so two opposing transfers cannot deadlock.
        let mut lock_order = [from_branch_id, to_branch_id];
        lock_order.sort();
        let mut locked = Vec::with_capacity(2);
        for branch in lock_order {
            let row = StockRecordEntity::find()
                .filter(stock_record::Column::StockItemId.eq(stock_item_id))
                .filter(stock_record::Column::BranchId.eq(branch))
                .lock_exclusive()
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            locked.push((branch, row));
        }

        let source = locked
            .iter()
            .find(|(branch, _)| *branch == from_branch_id)
            .and_then(|(_, row)| row.clone())
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "No stock record for item {} at branch {}",
                    stock_item_id, from_branch_id
                ))
            })?;

        if source.quantity < quantity {
            return Err(ServiceError::InsufficientStock {
                stock_item_id,
                branch_id: from_branch_id,
                requested: quantity,
                available: source.quantity,
            });
        }

        let item_class = source.item_class;

        let destination = locked
            .into_iter()
            .find(|(branch, _)| *branch == to_branch_id)
            .and_then(|(_, row)| row);
        let destination = match destination {
            Some(found) => found,
            None => {
                let fresh = stock_record::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    stock_item_id: Set(stock_item_id),
                    item_class: Set(item_class),
                    branch_id: Set(to_branch_id),
                    quantity: Set(0),
                    initial_count: Set(None),
                    stock_limit: Set(None),
                    created_at: Set(now),
                    updated_at: Set(None),
                };
                fresh.insert(&txn).await.map_err(ServiceError::db_error)?
            }
        };

        let source_quantity = source.quantity;
        let mut source_active: stock_record::ActiveModel = source.into();
        source_active.quantity = Set(source_quantity - quantity);
        source_active.updated_at = Set(Some(now));
        source_active
            .update(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let destination_quantity = destination.quantity;
        let mut destination_active: stock_record::ActiveModel = destination.into();
        destination_active.quantity = Set(destination_quantity + quantity);
        destination_active.updated_at = Set(Some(now));
        destination_active
            .update(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let movement = stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            stock_item_id: Set(stock_item_id),
            item_class: Set(item_class),
            branch_id: Set(from_branch_id),
            action: Set(StockAction::Transfer),
            quantity_changed: Set(-quantity),
            transfer_to_branch_id: Set(Some(to_branch_id)),
            recorded_by: Set(recorded_by),
            created_at: Set(now),
        };
        movement.insert(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            stock_item_id = %stock_item_id,
            from_branch_id = %from_branch_id,
            to_branch_id = %to_branch_id,
            quantity,
            "Stock transferred"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::StockTransferred {
                stock_item_id,
                from_branch_id,
                to_branch_id,
                quantity,
            })
            .await
        {
            tracing::warn!(error = %e, "Failed to send stock transferred event");
        }

        Ok(())
    }

    /// Current on-hand quantity, if the item is stocked at the branch.
    #[instrument(skip(self))]
    pub async fn get_stock(
        &self,
        stock_item_id: Uuid,
        branch_id: Uuid,
    ) -> Result<Option<stock_record::Model>, ServiceError> {
        StockRecordEntity::find()
            .filter(stock_record::Column::StockItemId.eq(stock_item_id))
            .filter(stock_record::Column::BranchId.eq(branch_id))
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deferred_classes_hold_nothing_while_on_hold() {
        assert_eq!(LineChange::desired_for(ItemClass::Lens, 4, true), 0);
        assert_eq!(LineChange::desired_for(ItemClass::Lens, 4, false), 4);
        // Immediate classes ignore the hold flag entirely
        assert_eq!(LineChange::desired_for(ItemClass::Frame, 4, true), 4);
        assert_eq!(LineChange::desired_for(ItemClass::Frame, 4, false), 4);
    }

    #[test]
    fn delta_is_desired_minus_held() {
        let change = LineChange {
            stock_item_id: Uuid::new_v4(),
            item_class: ItemClass::Frame,
            desired_quantity: 5,
            held_quantity: 2,
        };
        assert_eq!(change.delta(), 3);

        let release = LineChange {
            stock_item_id: change.stock_item_id,
            item_class: ItemClass::Frame,
            desired_quantity: 0,
            held_quantity: 2,
        };
        assert_eq!(release.delta(), -2);
    }
}
