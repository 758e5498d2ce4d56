//! Payment reconciliation against a mutable order total.
//!
//! Payments follow the same append-on-change discipline as line items. After
//! every pass the running total re-derives each payment's partial/final
//! flags, and net payments above the current order total are posted back to
//! the customer as a refund expense, keeping
//! `total_payment = payments - refunds` true across edits, refunds, and
//! discount changes.

use crate::{
    db::DbPool,
    entities::order,
    entities::payment::{self, Entity as PaymentEntity, PaymentMethod, PaymentStatus},
    entities::refund_expense::{self, Entity as RefundExpenseEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Default ledger category for auto-posted customer refunds; the real
/// category list lives in the accounting subsystem.
const REFUND_EXPENSE_CATEGORY: &str = "Customer Refund";

/// Normalized payment payload.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PaymentInput {
    /// Present when editing an existing payment row.
    pub id: Option<Uuid>,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// Defaults to now for new payments; ignored on edits, which carry the
    /// original date forward.
    pub payment_date: Option<DateTime<Utc>>,
}

impl PaymentInput {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Payment amount must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Active payments minus all refund expenses; the order's new
    /// `total_payment`.
    pub net_paid: Decimal,
    /// Amount refunded by this pass, when net payments exceeded the total.
    pub refund_issued: Option<Decimal>,
    /// Payment rows inserted by this pass (new payments and new versions).
    pub created: Vec<payment::Model>,
}

fn payment_changed(existing: &payment::Model, incoming: &PaymentInput) -> bool {
    existing.amount != incoming.amount
        || existing.method != incoming.method
        || existing.status != incoming.status
}

/// Reconciles an order's payments against `total_price` inside the caller's
/// transaction.
///
/// `overpayment_cause` names the refund path when the order total shrank
/// this call (item refund, discount change, adjustment). Without one, net
/// payments above the total are a hard failure: payments must never exceed
/// what is owed.
pub async fn reconcile_payments<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    total_price: Decimal,
    incoming: &[PaymentInput],
    actor: Option<Uuid>,
    overpayment_cause: Option<&str>,
) -> Result<ReconcileOutcome, ServiceError> {
    for input in incoming {
        input.validate()?;
    }

    let now = Utc::now();
    let mut created = Vec::new();

    let existing: Vec<payment::Model> = payment::active()
        .filter(payment::Column::OrderId.eq(order_id))
        .order_by_asc(payment::Column::PaymentDate)
        .order_by_asc(payment::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let mut incoming_by_id: HashMap<Uuid, &PaymentInput> = HashMap::new();
    for input in incoming {
        if let Some(id) = input.id {
            if incoming_by_id.insert(id, input).is_some() {
                return Err(ServiceError::ValidationError(format!(
                    "Payment {} appears more than once in the batch",
                    id
                )));
            }
        }
    }

    // Broken references are consistency errors, not silent inserts.
    for id in incoming_by_id.keys() {
        if !existing.iter().any(|p| p.id == *id) {
            return Err(ServiceError::NotFound(format!(
                "Payment {} not found for order {}",
                id, order_id
            )));
        }
    }

    for current in existing {
        match incoming_by_id.get(&current.id) {
            Some(input) if !payment_changed(&current, input) => {
                // Unchanged: leave the row alone, no history entry.
            }
            Some(input) => {
                let line_id = current.line_id;
                let version = current.version + 1;
                let original_date = current.payment_date;

                let mut retired: payment::ActiveModel = current.into();
                retired.is_deleted = Set(true);
                retired.is_edited = Set(true);
                retired.deleted_at = Set(Some(now));
                retired.deleted_by = Set(actor);
                retired.update(conn).await.map_err(ServiceError::db_error)?;

                let replacement = payment::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    line_id: Set(line_id),
                    version: Set(version),
                    amount: Set(input.amount),
                    method: Set(input.method),
                    status: Set(input.status),
                    is_partial: Set(false),
                    is_final: Set(false),
                    payment_date: Set(original_date),
                    is_edited: Set(false),
                    is_deleted: Set(false),
                    deleted_at: Set(None),
                    deleted_by: Set(None),
                    created_at: Set(now),
                    updated_at: Set(None),
                };
                created.push(
                    replacement
                        .insert(conn)
                        .await
                        .map_err(ServiceError::db_error)?,
                );
            }
            None => {
                // Omitted from the batch: retired, kept for history.
                let mut retired: payment::ActiveModel = current.into();
                retired.is_deleted = Set(true);
                retired.deleted_at = Set(Some(now));
                retired.deleted_by = Set(actor);
                retired.update(conn).await.map_err(ServiceError::db_error)?;
            }
        }
    }

    for input in incoming.iter().filter(|p| p.id.is_none()) {
        let model = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            line_id: Set(Uuid::new_v4()),
            version: Set(1),
            amount: Set(input.amount),
            method: Set(input.method),
            status: Set(input.status),
            is_partial: Set(false),
            is_final: Set(false),
            payment_date: Set(input.payment_date.unwrap_or(now)),
            is_edited: Set(false),
            is_deleted: Set(false),
            deleted_at: Set(None),
            deleted_by: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
        };
        created.push(model.insert(conn).await.map_err(ServiceError::db_error)?);
    }

    // Re-derive partial/final flags for every active payment in creation
    // order. The flags are projections of the running total, not history, so
    // they update in place.
    let active: Vec<payment::Model> = payment::active()
        .filter(payment::Column::OrderId.eq(order_id))
        .order_by_asc(payment::Column::PaymentDate)
        .order_by_asc(payment::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let mut running = Decimal::ZERO;
    let mut paid_total = Decimal::ZERO;
    for row in &active {
        paid_total += row.amount;
    }
    for row in active {
        running += row.amount;
        let is_partial = running < total_price;
        let is_final = running == total_price;
        if row.is_partial != is_partial || row.is_final != is_final {
            let mut flagged: payment::ActiveModel = row.into();
            flagged.is_partial = Set(is_partial);
            flagged.is_final = Set(is_final);
            flagged.updated_at = Set(Some(now));
            flagged.update(conn).await.map_err(ServiceError::db_error)?;
        }
    }

    let prior_refunds = refund_total(conn, order_id).await?;
    let net = paid_total - prior_refunds;

    let mut refund_issued = None;
    if net > total_price {
        let excess = net - total_price;
        let cause = overpayment_cause.ok_or(ServiceError::PaymentExceedsTotal {
            order_id,
            paid: net,
            total: total_price,
        })?;

        let note = format!(
            "Refund of {} due to {}: net payments {} exceed order total {}",
            excess, cause, net, total_price
        );
        let expense = refund_expense::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            amount: Set(excess),
            note: Set(note),
            expense_category: Set(REFUND_EXPENSE_CATEGORY.to_string()),
            created_by: Set(actor),
            created_at: Set(now),
        };
        expense.insert(conn).await.map_err(ServiceError::db_error)?;

        info!(order_id = %order_id, amount = %excess, cause, "Issued refund expense");
        refund_issued = Some(excess);
    }

    let net_paid = paid_total - prior_refunds - refund_issued.unwrap_or(Decimal::ZERO);

    Ok(ReconcileOutcome {
        net_paid,
        refund_issued,
        created,
    })
}

/// Sum of refund expenses already posted for an order.
pub async fn refund_total<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Decimal, ServiceError> {
    let expenses = RefundExpenseEntity::find()
        .filter(refund_expense::Column::OrderId.eq(order_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(expenses.iter().map(|e| e.amount).sum())
}

/// Standalone payment recording, used by the cashier flow outside a full
/// order edit.
#[derive(Clone)]
pub struct PaymentService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl PaymentService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Reconciles a payment batch against the order's current total in one
    /// transaction and refreshes `order.total_payment`.
    #[instrument(skip(self, payments), fields(order_id = %order_id, batch_len = payments.len()))]
    pub async fn record_payment_batch(
        &self,
        order_id: Uuid,
        payments: Vec<PaymentInput>,
        actor: Option<Uuid>,
    ) -> Result<order::Model, ServiceError> {
        for input in &payments {
            input.validate()?;
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let order_row = order::active()
            .filter(order::Column::Id.eq(order_id))
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let outcome = reconcile_payments(
            &txn,
            order_id,
            order_row.total_price,
            &payments,
            actor,
            None,
        )
        .await?;

        let mut active: order::ActiveModel = order_row.into();
        active.total_payment = Set(outcome.net_paid);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        for row in &outcome.created {
            if let Err(e) = self
                .event_sender
                .send(Event::PaymentRecorded {
                    order_id,
                    payment_id: row.id,
                    amount: row.amount,
                })
                .await
            {
                tracing::warn!(error = %e, "Failed to send payment recorded event");
            }
        }

        info!(
            order_id = %order_id,
            total_payment = %updated.total_payment,
            "Payment batch reconciled"
        );

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input(amount: Decimal) -> PaymentInput {
        PaymentInput {
            id: None,
            amount,
            method: PaymentMethod::Cash,
            status: PaymentStatus::Completed,
            payment_date: None,
        }
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert!(input(dec!(0)).validate().is_err());
        assert!(input(dec!(-5)).validate().is_err());
        assert!(input(dec!(0.01)).validate().is_ok());
    }

    #[test]
    fn change_detection_is_decimal_aware() {
        let existing = payment::Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            line_id: Uuid::new_v4(),
            version: 1,
            amount: dec!(100.00),
            method: PaymentMethod::Cash,
            status: PaymentStatus::Completed,
            is_partial: false,
            is_final: false,
            payment_date: Utc::now(),
            is_edited: false,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: Utc::now(),
            updated_at: None,
        };

        let same = PaymentInput {
            id: Some(existing.id),
            amount: dec!(100.00),
            method: PaymentMethod::Cash,
            status: PaymentStatus::Completed,
            payment_date: None,
        };
        assert!(!payment_changed(&existing, &same));

        let mut different = same.clone();
        different.amount = dec!(100.01);
        assert!(payment_changed(&existing, &different));

        let mut method_change = same;
        method_change.method = PaymentMethod::Card;
        assert!(payment_changed(&existing, &method_change));
    }
}
