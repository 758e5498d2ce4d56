use crate::{
    db::DbPool,
    entities::customer::{self, Entity as CustomerEntity},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// How an inbound order names its customer: an id for a known patient, or
/// phone + name for walk-ins. Normalized to a typed row before the core runs.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum CustomerRef {
    Existing(Uuid),
    New {
        name: String,
        phone: String,
        email: Option<String>,
    },
}

/// Service for patient lookup and creation.
#[derive(Clone)]
pub struct CustomerService {
    db_pool: Arc<DbPool>,
}

impl CustomerService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn get_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<customer::Model>, ServiceError> {
        CustomerEntity::find_by_id(customer_id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Resolves a [`CustomerRef`] to a persisted row inside the caller's
/// transaction, creating the customer when phone + name are new.
pub async fn resolve_customer<C: ConnectionTrait>(
    conn: &C,
    reference: &CustomerRef,
) -> Result<customer::Model, ServiceError> {
    match reference {
        CustomerRef::Existing(id) => CustomerEntity::find_by_id(*id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", id))),
        CustomerRef::New { name, phone, email } => {
            if name.trim().is_empty() || phone.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "Customer name and phone are required".to_string(),
                ));
            }

            let existing = CustomerEntity::find()
                .filter(customer::Column::Phone.eq(phone.clone()))
                .filter(customer::Column::Name.eq(name.clone()))
                .one(conn)
                .await
                .map_err(ServiceError::db_error)?;

            if let Some(found) = existing {
                return Ok(found);
            }

            let model = customer::ActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set(name.clone()),
                phone: Set(phone.clone()),
                email: Set(email.clone()),
                created_at: Set(Utc::now()),
                updated_at: Set(None),
            };
            let created = model.insert(conn).await.map_err(ServiceError::db_error)?;

            info!(customer_id = %created.id, "Created customer from phone + name lookup");
            Ok(created)
        }
    }
}
