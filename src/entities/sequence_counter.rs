use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

/// The kinds of branch-scoped numbers the sequence generator issues.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum SequenceKind {
    #[sea_orm(string_value = "InvoiceNormal")]
    InvoiceNormal,
    /// Factory invoices restart their counter every day.
    #[sea_orm(string_value = "InvoiceFactory")]
    InvoiceFactory,
    #[sea_orm(string_value = "Mnt")]
    Mnt,
    #[sea_orm(string_value = "Refraction")]
    Refraction,
}

impl SequenceKind {
    /// Normalizes an inbound kind tag to a typed value.
    pub fn parse(tag: &str) -> Result<Self, ServiceError> {
        match tag {
            "invoice_normal" | "InvoiceNormal" => Ok(SequenceKind::InvoiceNormal),
            "invoice_factory" | "InvoiceFactory" => Ok(SequenceKind::InvoiceFactory),
            "mnt" | "Mnt" => Ok(SequenceKind::Mnt),
            "refraction" | "Refraction" => Ok(SequenceKind::Refraction),
            other => Err(ServiceError::InvalidSequenceKind(other.to_string())),
        }
    }
}

/// The `sequence_counters` table: last issued value per
/// (branch, kind, period). Incremented under a row lock so two concurrent
/// callers never share a number. `period` is the issue date for daily kinds
/// and empty otherwise.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sequence_counters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub branch_id: Uuid,
    pub kind: SequenceKind,
    pub period: String,
    pub last_value: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_snake_and_pascal_tags() {
        assert_eq!(
            SequenceKind::parse("invoice_factory").unwrap(),
            SequenceKind::InvoiceFactory
        );
        assert_eq!(SequenceKind::parse("Mnt").unwrap(), SequenceKind::Mnt);
        assert!(matches!(
            SequenceKind::parse("bogus"),
            Err(ServiceError::InvalidSequenceKind(_))
        ));
    }
}
