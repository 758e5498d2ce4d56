//! Branch-scoped sequence numbers.
//!
//! Every number kind is backed by a dedicated `sequence_counters` row that is
//! incremented under a `SELECT ... FOR UPDATE` lock, so two terminals issuing
//! invoices at the same branch can never draw the same value and the series
//! stays gapless: the increment commits or rolls back with the order that
//! requested it.

use crate::{
    db::DbPool,
    entities::branch,
    entities::sequence_counter::{self, Entity as SequenceCounterEntity, SequenceKind},
    errors::ServiceError,
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Service issuing branch-scoped sequence numbers.
#[derive(Clone)]
pub struct SequenceService {
    db_pool: Arc<DbPool>,
}

impl SequenceService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Issues the next number for (branch, kind) in its own transaction.
    ///
    /// Orchestrated flows should prefer [`next_number`] with the surrounding
    /// transaction so the draw rolls back together with the caller.
    #[instrument(skip(self))]
    pub async fn issue_number(
        &self,
        branch_id: Uuid,
        kind: SequenceKind,
    ) -> Result<String, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let branch = branch::Entity::find_by_id(branch_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Branch {} not found", branch_id)))?;

        let number = next_number(&txn, &branch, kind, Utc::now().date_naive()).await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(number)
    }
}

/// Draws the next number for (branch, kind) inside the caller's transaction.
///
/// Factory invoices scope their counter per day; all other kinds share one
/// counter per branch. The counter row is locked before the read, so
/// concurrent callers serialize on it.
pub async fn next_number<C: ConnectionTrait>(
    conn: &C,
    branch: &branch::Model,
    kind: SequenceKind,
    today: NaiveDate,
) -> Result<String, ServiceError> {
    let value = next_value(conn, branch.id, kind, today).await?;
    Ok(format_number(kind, &branch.code, value, today))
}

async fn next_value<C: ConnectionTrait>(
    conn: &C,
    branch_id: Uuid,
    kind: SequenceKind,
    today: NaiveDate,
) -> Result<i64, ServiceError> {
    let period = counter_period(kind, today);

    if let Some(row) = find_counter(conn, branch_id, kind, &period).await? {
        return bump_counter(conn, row).await;
    }

    // First issuance for this scope. Serialize creation on the branch row so
    // two concurrent first draws cannot both insert; the loser of the branch
    // lock re-reads and finds the winner's counter.
    branch::Entity::find_by_id(branch_id)
        .lock_exclusive()
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Branch {} not found", branch_id)))?;

    if let Some(row) = find_counter(conn, branch_id, kind, &period).await? {
        return bump_counter(conn, row).await;
    }

    let counter = sequence_counter::ActiveModel {
        id: Set(Uuid::new_v4()),
        branch_id: Set(branch_id),
        kind: Set(kind),
        period: Set(period),
        last_value: Set(1),
        updated_at: Set(Utc::now()),
    };
    counter.insert(conn).await.map_err(ServiceError::db_error)?;

    Ok(1)
}

async fn find_counter<C: ConnectionTrait>(
    conn: &C,
    branch_id: Uuid,
    kind: SequenceKind,
    period: &str,
) -> Result<Option<sequence_counter::Model>, ServiceError> {
    SequenceCounterEntity::find()
        .filter(sequence_counter::Column::BranchId.eq(branch_id))
        .filter(sequence_counter::Column::Kind.eq(kind))
        .filter(sequence_counter::Column::Period.eq(period))
        .lock_exclusive()
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

async fn bump_counter<C: ConnectionTrait>(
    conn: &C,
    row: sequence_counter::Model,
) -> Result<i64, ServiceError> {
    let base = if row.last_value < 0 {
        // Numbering must never block order creation: a corrupted counter
        // restarts at zero instead of failing the transaction.
        warn!(
            counter_id = %row.id,
            last_value = row.last_value,
            "Sequence counter is malformed; restarting at 1"
        );
        0
    } else {
        row.last_value
    };
    let next = base + 1;

    let mut active: sequence_counter::ActiveModel = row.into();
    active.last_value = Set(next);
    active.updated_at = Set(Utc::now());
    active.update(conn).await.map_err(ServiceError::db_error)?;

    Ok(next)
}

fn counter_period(kind: SequenceKind, today: NaiveDate) -> String {
    match kind {
        SequenceKind::InvoiceFactory => today.format("%Y-%m-%d").to_string(),
        _ => String::new(),
    }
}

/// Renders a counter value into the number format of its kind.
pub fn format_number(kind: SequenceKind, branch_code: &str, value: i64, today: NaiveDate) -> String {
    match kind {
        SequenceKind::InvoiceFactory => {
            format!("{}{}{}", branch_code, today.format("%d%m"), value)
        }
        SequenceKind::InvoiceNormal => format!("{}N{:03}", branch_code, value),
        SequenceKind::Mnt => format!("MNT{}{:03}", branch_code, value),
        SequenceKind::Refraction => format!("{:03}", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    #[test]
    fn normal_invoice_numbers_are_zero_padded() {
        assert_eq!(
            format_number(SequenceKind::InvoiceNormal, "KDY", 7, day()),
            "KDYN007"
        );
        assert_eq!(
            format_number(SequenceKind::InvoiceNormal, "KDY", 1234, day()),
            "KDYN1234"
        );
    }

    #[test]
    fn factory_invoice_numbers_carry_the_day() {
        assert_eq!(
            format_number(SequenceKind::InvoiceFactory, "KDY", 3, day()),
            "KDY07033"
        );
    }

    #[test]
    fn mnt_numbers_lead_with_the_tag() {
        assert_eq!(format_number(SequenceKind::Mnt, "RWP", 12, day()), "MNTRWP012");
    }

    #[test]
    fn refraction_numbers_are_bare_counters() {
        assert_eq!(format_number(SequenceKind::Refraction, "KDY", 5, day()), "005");
    }

    #[test]
    fn factory_counters_scope_by_day_others_do_not() {
        assert_eq!(
            counter_period(SequenceKind::InvoiceFactory, day()),
            "2024-03-07"
        );
        assert_eq!(counter_period(SequenceKind::InvoiceNormal, day()), "");
        assert_eq!(counter_period(SequenceKind::Mnt, day()), "");
    }
}
