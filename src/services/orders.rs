//! Order orchestration.
//!
//! Entry point for order creation and mutation. Each public operation runs
//! inside one database transaction: stock planning happens before any row is
//! written, and any failure rolls the whole call back so no stock or payment
//! side effect survives.

use crate::{
    db::DbPool,
    entities::branch::Entity as BranchEntity,
    entities::order::{self, FittingStatus, OrderStatus},
    entities::order_item,
    entities::order_progress::{self, Entity as OrderProgressEntity, ProgressStatus},
    entities::payment,
    entities::refraction::{self, Entity as RefractionEntity},
    entities::mnt_record,
    entities::sequence_counter::SequenceKind,
    entities::stock_record::ItemClass,
    errors::ServiceError,
    events::{Event, EventSender, FieldChange},
    services::customers::{self, CustomerRef},
    services::order_items::{self, OrderItemInput},
    services::payments::{self, PaymentInput},
    services::sequences,
    services::stock_ledger::{self, LineChange},
};
use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

lazy_static! {
    static ref ORDER_CREATIONS: IntCounter =
        IntCounter::new("order_creations_total", "Total number of orders created")
            .expect("metric can be created");
    static ref ORDER_CREATION_FAILURES: IntCounter = IntCounter::new(
        "order_creation_failures_total",
        "Total number of failed order creations"
    )
    .expect("metric can be created");
    static ref ORDER_UPDATES: IntCounter =
        IntCounter::new("order_updates_total", "Total number of order updates")
            .expect("metric can be created");
    static ref ORDER_REFUNDS: IntCounter =
        IntCounter::new("order_refunds_total", "Total number of orders refunded")
            .expect("metric can be created");
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub branch_id: Uuid,
    pub customer: CustomerRef,
    pub refraction_id: Option<Uuid>,
    pub discount: Decimal,
    pub on_hold: bool,
    pub urgent: bool,
    pub items: Vec<OrderItemInput>,
    pub payments: Vec<PaymentInput>,
    pub created_by: Option<Uuid>,
}

/// Scalar order fields a caller may change; `None` leaves a field alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderPatch {
    pub discount: Option<Decimal>,
    pub on_hold: Option<bool>,
    pub urgent: Option<bool>,
    pub status: Option<OrderStatus>,
    pub fitting_status: Option<FittingStatus>,
}

/// Full-state update payload: `items` and `payments` are the complete sets
/// the order should end up with; anything persisted but omitted here is
/// retired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderRequest {
    pub patch: OrderPatch,
    pub items: Vec<OrderItemInput>,
    pub payments: Vec<PaymentInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub line_id: Uuid,
    pub version: i32,
    pub stock_item_id: Option<Uuid>,
    pub item_class: Option<ItemClass>,
    pub external_lens_id: Option<Uuid>,
    pub quantity: i32,
    pub price_per_unit: Decimal,
    pub subtotal: Decimal,
    pub is_non_stock: bool,
    pub is_refund: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub amount: Decimal,
    pub method: payment::PaymentMethod,
    pub is_partial: bool,
    pub is_final: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub status: ProgressStatus,
    pub changed_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub customer_id: Uuid,
    pub refraction_id: Option<Uuid>,
    pub invoice_number: String,
    pub status: OrderStatus,
    pub fitting_status: FittingStatus,
    pub on_hold: bool,
    pub urgent: bool,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total_price: Decimal,
    pub total_payment: Decimal,
    pub is_refund: bool,
    pub items: Vec<OrderItemResponse>,
    pub payments: Vec<PaymentResponse>,
    pub progress_history: Vec<ProgressResponse>,
}

/// Orchestrates the stock ledger, mutation log, sequence generator, and
/// payment reconciler for order flows.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates an order: validates and reserves stock, assigns the invoice
    /// number, persists order + items, applies stock deductions, records the
    /// initial progress entry, and reconciles any upfront payments.
    /// All-or-nothing within one transaction.
    #[instrument(skip(self, request), fields(branch_id = %request.branch_id))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        self.validate_create(&request).map_err(|e| {
            ORDER_CREATION_FAILURES.inc();
            error!(error = %e, "Invalid create order request");
            e
        })?;

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let result = self.create_order_in_txn(&txn, &request).await;
        let (order_row, created_payments) = match result {
            Ok(created) => created,
            Err(e) => {
                ORDER_CREATION_FAILURES.inc();
                txn.rollback().await.ok();
                return Err(e);
            }
        };

        let response = load_response(&txn, &order_row).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        ORDER_CREATIONS.inc();
        info!(
            order_id = %order_row.id,
            invoice_number = %order_row.invoice_number,
            "Order created successfully"
        );

        self.send_event(Event::OrderCreated(order_row.id)).await;
        if order_row.on_hold {
            self.send_event(Event::OrderOnHold {
                order_id: order_row.id,
            })
            .await;
        }
        for row in &created_payments {
            self.send_event(Event::PaymentRecorded {
                order_id: order_row.id,
                payment_id: row.id,
                amount: row.amount,
            })
            .await;
        }

        Ok(response)
    }

    async fn create_order_in_txn(
        &self,
        txn: &DatabaseTransaction,
        request: &CreateOrderRequest,
    ) -> Result<(order::Model, Vec<payment::Model>), ServiceError> {
        let branch = BranchEntity::find_by_id(request.branch_id)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Branch {} not found", request.branch_id))
            })?;

        let customer = customers::resolve_customer(txn, &request.customer).await?;

        if let Some(refraction_id) = request.refraction_id {
            RefractionEntity::find_by_id(refraction_id)
                .one(txn)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Refraction {} not found", refraction_id))
                })?;
        }

        let subtotal: Decimal = request
            .items
            .iter()
            .filter(|i| !i.is_refund)
            .map(|i| i.subtotal())
            .sum();
        // A discount larger than the subtotal (item refunds can shrink the
        // subtotal under an existing discount) floors the total at zero.
        let total_price = (subtotal - request.discount).max(Decimal::ZERO);

        // Reserve stock before any row is written so an insufficient-stock
        // failure leaves nothing behind.
        let changes: Vec<LineChange> = request
            .items
            .iter()
            .filter(|i| i.is_stock_tracked())
            .filter_map(|i| {
                let class = i.item_class?;
                Some(LineChange {
                    stock_item_id: i.stock_item_id?,
                    item_class: class,
                    desired_quantity: if i.is_refund {
                        0
                    } else {
                        LineChange::desired_for(class, i.quantity, request.on_hold)
                    },
                    held_quantity: 0,
                })
            })
            .collect();
        let plan = stock_ledger::plan(txn, request.branch_id, &changes).await?;

        let invoice_kind = if request
            .items
            .iter()
            .any(|i| i.item_class == Some(ItemClass::Lens))
        {
            SequenceKind::InvoiceFactory
        } else {
            SequenceKind::InvoiceNormal
        };
        let invoice_number =
            sequences::next_number(txn, &branch, invoice_kind, Utc::now().date_naive()).await?;

        let now = Utc::now();
        let order_model = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            branch_id: Set(request.branch_id),
            customer_id: Set(customer.id),
            refraction_id: Set(request.refraction_id),
            invoice_number: Set(invoice_number),
            subtotal: Set(subtotal),
            discount: Set(request.discount),
            total_price: Set(total_price),
            total_payment: Set(Decimal::ZERO),
            on_hold: Set(request.on_hold),
            urgent: Set(request.urgent),
            status: Set(OrderStatus::Pending),
            fitting_status: Set(FittingStatus::NotStarted),
            is_deleted: Set(false),
            deleted_at: Set(None),
            deleted_by: Set(None),
            is_refund: Set(false),
            refunded_at: Set(None),
            refund_reason: Set(None),
            created_by: Set(request.created_by),
            created_at: Set(now),
            updated_at: Set(None),
        };
        let order_row = order_model.insert(txn).await.map_err(ServiceError::db_error)?;

        for item in &request.items {
            order_items::reconcile_item(txn, &order_row, None, item, request.created_by).await?;
        }

        stock_ledger::apply(txn, plan, request.created_by).await?;

        record_progress_entry(
            txn,
            order_row.id,
            ProgressStatus::ReceivedFromCustomer,
            request.created_by,
        )
        .await?;

        let mut order_row = order_row;
        let mut created_payments = Vec::new();
        if !request.payments.is_empty() {
            let outcome = payments::reconcile_payments(
                txn,
                order_row.id,
                total_price,
                &request.payments,
                request.created_by,
                None,
            )
            .await?;
            created_payments = outcome.created;

            let mut active: order::ActiveModel = order_row.into();
            active.total_payment = Set(outcome.net_paid);
            order_row = active.update(txn).await.map_err(ServiceError::db_error)?;
        }

        Ok((order_row, created_payments))
    }

    /// Applies a full-state update to an order: hold transitions, item
    /// reconciliation with inline stock math, subtotal recomputation, and
    /// payment reconciliation, in one transaction.
    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn update_order(
        &self,
        order_id: Uuid,
        request: UpdateOrderRequest,
        actor: Option<Uuid>,
    ) -> Result<OrderResponse, ServiceError> {
        for item in &request.items {
            item.validate()?;
        }
        for input in &request.payments {
            input.validate()?;
        }
        if let Some(discount) = request.patch.discount {
            if discount < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Discount must not be negative".to_string(),
                ));
            }
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let result = self.update_order_in_txn(&txn, order_id, &request, actor).await;
        let updated = match result {
            Ok(updated) => updated,
            Err(e) => {
                txn.rollback().await.ok();
                return Err(e);
            }
        };

        let response = load_response(&txn, &updated.order).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        ORDER_UPDATES.inc();
        info!(order_id = %order_id, "Order updated successfully");

        self.send_event(Event::OrderUpdated {
            order_id,
            actor,
            changes: updated.changes,
        })
        .await;
        match (updated.hold_before, updated.order.on_hold) {
            (false, true) => self.send_event(Event::OrderOnHold { order_id }).await,
            (true, false) => {
                self.send_event(Event::OrderReleasedFromHold { order_id })
                    .await
            }
            _ => {}
        }
        if let Some(amount) = updated.refund_issued {
            self.send_event(Event::RefundExpenseCreated {
                order_id,
                amount,
                note: "overpayment refund".to_string(),
            })
            .await;
        }
        for row in &updated.created_payments {
            self.send_event(Event::PaymentRecorded {
                order_id,
                payment_id: row.id,
                amount: row.amount,
            })
            .await;
        }

        Ok(response)
    }

    async fn update_order_in_txn(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        request: &UpdateOrderRequest,
        actor: Option<Uuid>,
    ) -> Result<UpdatedOrder, ServiceError> {
        let order_row = order::active()
            .filter(order::Column::Id.eq(order_id))
            .lock_exclusive()
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order_row.is_refund {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is refunded and can no longer be edited",
                order_id
            )));
        }

        let hold_before = order_row.on_hold;
        let hold_after = request.patch.on_hold.unwrap_or(hold_before);

        let existing_items: Vec<order_item::Model> = order_item::active()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(txn)
            .await
            .map_err(ServiceError::db_error)?;

        let existing_by_id: HashMap<Uuid, order_item::Model> = existing_items
            .iter()
            .cloned()
            .map(|item| (item.id, item))
            .collect();

        for item in &request.items {
            if let Some(id) = item.id {
                if !existing_by_id.contains_key(&id) {
                    return Err(ServiceError::NotFound(format!(
                        "Order item {} not found on order {}",
                        id, order_id
                    )));
                }
            }
        }

        // Stock math: every existing line releases what it holds, every
        // incoming line claims what it should hold; netting by stock item
        // turns that into exact deltas for quantity edits, item swaps,
        // removals, refunds, and hold transitions alike.
        let mut changes: Vec<LineChange> = Vec::new();
        for item in &existing_items {
            if let (true, Some(class), Some(stock_item_id)) =
                (item.is_stock_tracked(), item.item_class, item.stock_item_id)
            {
                changes.push(LineChange {
                    stock_item_id,
                    item_class: class,
                    desired_quantity: 0,
                    held_quantity: held_quantity(item, class, hold_before),
                });
            }
        }
        for item in &request.items {
            if !item.is_stock_tracked() {
                continue;
            }
            if let (Some(class), Some(stock_item_id)) = (item.item_class, item.stock_item_id) {
                changes.push(LineChange {
                    stock_item_id,
                    item_class: class,
                    desired_quantity: if item.is_refund {
                        0
                    } else {
                        LineChange::desired_for(class, item.quantity, hold_after)
                    },
                    held_quantity: 0,
                });
            }
        }
        let plan = stock_ledger::plan(txn, order_row.branch_id, &changes).await?;

        // Reconcile the mutation log: edits version, removals retire.
        let incoming_ids: Vec<Uuid> = request.items.iter().filter_map(|i| i.id).collect();
        let mut newly_refunded = false;
        let mut current_items: Vec<order_item::Model> = Vec::new();
        for item in &request.items {
            let existing = item.id.and_then(|id| existing_by_id.get(&id).cloned());
            if let Some(previous) = &existing {
                if item.is_refund && !previous.is_refund {
                    newly_refunded = true;
                }
            }
            let row = order_items::reconcile_item(txn, &order_row, existing, item, actor).await?;
            current_items.push(row);
        }
        for item in existing_items {
            if !incoming_ids.contains(&item.id) {
                order_items::retire_item(txn, item, actor).await?;
            }
        }

        stock_ledger::apply(txn, plan, actor).await?;

        let subtotal: Decimal = current_items
            .iter()
            .filter(|i| !i.is_refund)
            .map(|i| i.subtotal)
            .sum();
        let discount = request.patch.discount.unwrap_or(order_row.discount);
        let total_price = (subtotal - discount).max(Decimal::ZERO);

        let overpayment_cause = if newly_refunded {
            Some("item refund")
        } else if discount > order_row.discount {
            Some("discount change")
        } else if total_price < order_row.total_price {
            Some("order adjustment")
        } else {
            None
        };

        let outcome = payments::reconcile_payments(
            txn,
            order_id,
            total_price,
            &request.payments,
            actor,
            overpayment_cause,
        )
        .await?;

        let mut changes_log = Vec::new();
        track_change(&mut changes_log, "subtotal", order_row.subtotal, subtotal);
        track_change(&mut changes_log, "discount", order_row.discount, discount);
        track_change(
            &mut changes_log,
            "total_price",
            order_row.total_price,
            total_price,
        );
        track_change(
            &mut changes_log,
            "total_payment",
            order_row.total_payment,
            outcome.net_paid,
        );
        track_change(&mut changes_log, "on_hold", hold_before, hold_after);
        if let Some(status) = &request.patch.status {
            track_change(&mut changes_log, "status", order_row.status.clone(), status.clone());
        }
        if let Some(fitting) = &request.patch.fitting_status {
            track_change(
                &mut changes_log,
                "fitting_status",
                order_row.fitting_status.clone(),
                fitting.clone(),
            );
        }

        let mut active: order::ActiveModel = order_row.into();
        active.subtotal = Set(subtotal);
        active.discount = Set(discount);
        active.total_price = Set(total_price);
        active.total_payment = Set(outcome.net_paid);
        active.on_hold = Set(hold_after);
        if let Some(urgent) = request.patch.urgent {
            active.urgent = Set(urgent);
        }
        if let Some(status) = &request.patch.status {
            active.status = Set(status.clone());
        }
        if let Some(fitting) = &request.patch.fitting_status {
            active.fitting_status = Set(fitting.clone());
        }
        active.updated_at = Set(Some(Utc::now()));
        let order_row = active.update(txn).await.map_err(ServiceError::db_error)?;

        Ok(UpdatedOrder {
            order: order_row,
            hold_before,
            changes: changes_log,
            refund_issued: outcome.refund_issued,
            created_payments: outcome.created,
        })
    }

    /// One-way transition to the refunded state: releases all held stock,
    /// versions every line as refunded, zeroes the amount owed, and lets the
    /// reconciler post the compensating refund expense.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn refund_order(
        &self,
        order_id: Uuid,
        reason: String,
        actor: Option<Uuid>,
    ) -> Result<OrderResponse, ServiceError> {
        if reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Refund reason is required".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let result = self.refund_order_in_txn(&txn, order_id, &reason, actor).await;
        let (order_row, refund_issued) = match result {
            Ok(done) => done,
            Err(e) => {
                txn.rollback().await.ok();
                return Err(e);
            }
        };

        let response = load_response(&txn, &order_row).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        ORDER_REFUNDS.inc();
        info!(order_id = %order_id, reason = %reason, "Order refunded");

        self.send_event(Event::OrderRefunded {
            order_id,
            reason: reason.clone(),
        })
        .await;
        if let Some(amount) = refund_issued {
            self.send_event(Event::RefundExpenseCreated {
                order_id,
                amount,
                note: reason,
            })
            .await;
        }

        Ok(response)
    }

    async fn refund_order_in_txn(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        reason: &str,
        actor: Option<Uuid>,
    ) -> Result<(order::Model, Option<Decimal>), ServiceError> {
        let order_row = order::active()
            .filter(order::Column::Id.eq(order_id))
            .lock_exclusive()
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order_row.is_refund {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is already refunded",
                order_id
            )));
        }

        let hold_before = order_row.on_hold;
        let existing_items: Vec<order_item::Model> = order_item::active()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(txn)
            .await
            .map_err(ServiceError::db_error)?;

        let mut changes: Vec<LineChange> = Vec::new();
        for item in &existing_items {
            if let (true, Some(class), Some(stock_item_id)) =
                (item.is_stock_tracked(), item.item_class, item.stock_item_id)
            {
                changes.push(LineChange {
                    stock_item_id,
                    item_class: class,
                    desired_quantity: 0,
                    held_quantity: held_quantity(item, class, hold_before),
                });
            }
        }
        let plan = stock_ledger::plan(txn, order_row.branch_id, &changes).await?;

        for item in existing_items {
            if item.is_refund {
                continue;
            }
            let refunded_input = refund_input_from(&item);
            order_items::reconcile_item(txn, &order_row, Some(item), &refunded_input, actor)
                .await?;
        }

        stock_ledger::apply(txn, plan, actor).await?;

        // Keep the payment set as-is; with the total at zero the reconciler
        // posts a refund expense for the full net amount paid.
        let current_payments: Vec<payment::Model> = payment::active()
            .filter(payment::Column::OrderId.eq(order_id))
            .all(txn)
            .await
            .map_err(ServiceError::db_error)?;
        let payment_inputs: Vec<PaymentInput> = current_payments
            .iter()
            .map(|p| PaymentInput {
                id: Some(p.id),
                amount: p.amount,
                method: p.method,
                status: p.status,
                payment_date: Some(p.payment_date),
            })
            .collect();

        let outcome = payments::reconcile_payments(
            txn,
            order_id,
            Decimal::ZERO,
            &payment_inputs,
            actor,
            Some("order refund"),
        )
        .await?;

        let now = Utc::now();
        let mut active: order::ActiveModel = order_row.into();
        active.subtotal = Set(Decimal::ZERO);
        active.discount = Set(Decimal::ZERO);
        active.total_price = Set(Decimal::ZERO);
        active.total_payment = Set(outcome.net_paid);
        active.is_refund = Set(true);
        active.refunded_at = Set(Some(now));
        active.refund_reason = Set(Some(reason.to_string()));
        active.updated_at = Set(Some(now));
        let order_row = active.update(txn).await.map_err(ServiceError::db_error)?;

        Ok((order_row, outcome.refund_issued))
    }

    /// Soft-deletes an order, releasing whatever stock its lines still hold.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn delete_order(
        &self,
        order_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let result = self.delete_order_in_txn(&txn, order_id, actor).await;
        if let Err(e) = result {
            txn.rollback().await.ok();
            return Err(e);
        }
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(order_id = %order_id, "Order soft-deleted");
        Ok(())
    }

    async fn delete_order_in_txn(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let order_row = order::active()
            .filter(order::Column::Id.eq(order_id))
            .lock_exclusive()
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let hold_before = order_row.on_hold;
        let existing_items: Vec<order_item::Model> = order_item::active()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(txn)
            .await
            .map_err(ServiceError::db_error)?;

        let mut changes: Vec<LineChange> = Vec::new();
        for item in &existing_items {
            if let (true, Some(class), Some(stock_item_id)) =
                (item.is_stock_tracked(), item.item_class, item.stock_item_id)
            {
                changes.push(LineChange {
                    stock_item_id,
                    item_class: class,
                    desired_quantity: 0,
                    held_quantity: held_quantity(item, class, hold_before),
                });
            }
        }
        let plan = stock_ledger::plan(txn, order_row.branch_id, &changes).await?;
        stock_ledger::apply(txn, plan, actor).await?;

        let now = Utc::now();
        let mut active: order::ActiveModel = order_row.into();
        active.is_deleted = Set(true);
        active.deleted_at = Set(Some(now));
        active.deleted_by = Set(actor);
        active.updated_at = Set(Some(now));
        active.update(txn).await.map_err(ServiceError::db_error)?;

        Ok(())
    }

    /// Appends a progress milestone; the timeline is never edited.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn record_progress(
        &self,
        order_id: Uuid,
        status: ProgressStatus,
        actor: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        order::active()
            .filter(order::Column::Id.eq(order_id))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let entry = record_progress_entry(&txn, order_id, status, actor).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        self.send_event(Event::OrderProgressRecorded {
            order_id,
            status: entry.status.to_string(),
            changed_at: entry.changed_at,
        })
        .await;

        Ok(())
    }

    /// Creates a factory remanufacture ticket with its own branch-scoped
    /// number.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn create_mnt_record(
        &self,
        order_id: Uuid,
        reason: Option<String>,
        actor: Option<Uuid>,
    ) -> Result<mnt_record::Model, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let order_row = order::active()
            .filter(order::Column::Id.eq(order_id))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let branch = BranchEntity::find_by_id(order_row.branch_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Branch {} not found", order_row.branch_id))
            })?;

        let mnt_number =
            sequences::next_number(&txn, &branch, SequenceKind::Mnt, Utc::now().date_naive())
                .await?;

        let model = mnt_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            branch_id: Set(order_row.branch_id),
            mnt_number: Set(mnt_number.clone()),
            reason: Set(reason),
            created_by: Set(actor),
            created_at: Set(Utc::now()),
        };
        let created = model.insert(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        self.send_event(Event::MntRecordCreated {
            order_id,
            mnt_number,
        })
        .await;

        Ok(created)
    }

    /// Opens a refraction session with the next branch-scoped refraction
    /// number.
    #[instrument(skip(self, customer))]
    pub async fn create_refraction(
        &self,
        branch_id: Uuid,
        customer: CustomerRef,
        notes: Option<String>,
    ) -> Result<refraction::Model, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let branch = BranchEntity::find_by_id(branch_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Branch {} not found", branch_id)))?;

        let customer_row = customers::resolve_customer(&txn, &customer).await?;

        let refraction_number = sequences::next_number(
            &txn,
            &branch,
            SequenceKind::Refraction,
            Utc::now().date_naive(),
        )
        .await?;

        let model = refraction::ActiveModel {
            id: Set(Uuid::new_v4()),
            refraction_number: Set(refraction_number.clone()),
            branch_id: Set(branch_id),
            customer_id: Set(customer_row.id),
            notes: Set(notes),
            created_at: Set(Utc::now()),
        };
        let created = model.insert(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        self.send_event(Event::RefractionCreated {
            refraction_id: created.id,
            refraction_number,
        })
        .await;

        Ok(created)
    }

    /// Fetches the persisted-state shape of one order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let order_row = order::active()
            .filter(order::Column::Id.eq(order_id))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        load_response(db, &order_row).await
    }

    fn validate_create(&self, request: &CreateOrderRequest) -> Result<(), ServiceError> {
        if request.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one item is required".to_string(),
            ));
        }
        for item in &request.items {
            item.validate()?;
        }
        for input in &request.payments {
            input.validate()?;
        }
        if request.discount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Discount must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    async fn send_event(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            tracing::warn!(error = %e, "Failed to send event");
        }
    }
}

struct UpdatedOrder {
    order: order::Model,
    hold_before: bool,
    changes: Vec<FieldChange>,
    refund_issued: Option<Decimal>,
    created_payments: Vec<payment::Model>,
}

/// Stock currently held by an existing line given the order's hold flag.
fn held_quantity(item: &order_item::Model, class: ItemClass, on_hold: bool) -> i32 {
    if item.is_refund {
        return 0;
    }
    LineChange::desired_for(class, item.quantity, on_hold)
}

fn refund_input_from(item: &order_item::Model) -> OrderItemInput {
    OrderItemInput {
        id: Some(item.id),
        stock_item_id: item.stock_item_id,
        item_class: item.item_class,
        external_lens_id: item.external_lens_id,
        quantity: item.quantity,
        price_per_unit: item.price_per_unit,
        is_non_stock: item.is_non_stock,
        is_refund: true,
        note: item.note.clone(),
        serial_number: item.serial_number.clone(),
        battery: item.battery.clone(),
        next_service_date: item.next_service_date,
    }
}

fn track_change<T: ToString>(log: &mut Vec<FieldChange>, field: &str, before: T, after: T) {
    let before = before.to_string();
    let after = after.to_string();
    if before != after {
        log.push(FieldChange::new(field, Some(before), Some(after)));
    }
}

async fn record_progress_entry<C: sea_orm::ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    status: ProgressStatus,
    actor: Option<Uuid>,
) -> Result<order_progress::Model, ServiceError> {
    let entry = order_progress::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        status: Set(status),
        changed_by: Set(actor),
        changed_at: Set(Utc::now()),
    };
    entry.insert(conn).await.map_err(ServiceError::db_error)
}

async fn load_response<C: sea_orm::ConnectionTrait>(
    conn: &C,
    order_row: &order::Model,
) -> Result<OrderResponse, ServiceError> {
    let items = order_item::active()
        .filter(order_item::Column::OrderId.eq(order_row.id))
        .order_by_asc(order_item::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let payments_rows = payment::active()
        .filter(payment::Column::OrderId.eq(order_row.id))
        .order_by_asc(payment::Column::PaymentDate)
        .order_by_asc(payment::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let progress = OrderProgressEntity::find()
        .filter(order_progress::Column::OrderId.eq(order_row.id))
        .order_by_asc(order_progress::Column::ChangedAt)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(OrderResponse {
        id: order_row.id,
        branch_id: order_row.branch_id,
        customer_id: order_row.customer_id,
        refraction_id: order_row.refraction_id,
        invoice_number: order_row.invoice_number.clone(),
        status: order_row.status.clone(),
        fitting_status: order_row.fitting_status.clone(),
        on_hold: order_row.on_hold,
        urgent: order_row.urgent,
        subtotal: order_row.subtotal,
        discount: order_row.discount,
        total_price: order_row.total_price,
        total_payment: order_row.total_payment,
        is_refund: order_row.is_refund,
        items: items
            .into_iter()
            .map(|item| OrderItemResponse {
                id: item.id,
                line_id: item.line_id,
                version: item.version,
                stock_item_id: item.stock_item_id,
                item_class: item.item_class,
                external_lens_id: item.external_lens_id,
                quantity: item.quantity,
                price_per_unit: item.price_per_unit,
                subtotal: item.subtotal,
                is_non_stock: item.is_non_stock,
                is_refund: item.is_refund,
            })
            .collect(),
        payments: payments_rows
            .into_iter()
            .map(|row| PaymentResponse {
                id: row.id,
                amount: row.amount,
                method: row.method,
                is_partial: row.is_partial,
                is_final: row.is_final,
            })
            .collect(),
        progress_history: progress
            .into_iter()
            .map(|entry| ProgressResponse {
                status: entry.status,
                changed_at: entry.changed_at,
            })
            .collect(),
    })
}
