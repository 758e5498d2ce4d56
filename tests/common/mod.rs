#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use optica_api::{
    config::AppConfig,
    db,
    entities::branch,
    entities::order_item::{self, Entity as OrderItemEntity},
    entities::payment::{PaymentMethod, PaymentStatus},
    entities::stock_movement::{self, Entity as StockMovementEntity},
    entities::stock_record::{self, Entity as StockRecordEntity, ItemClass},
    events,
    services::order_items::OrderItemInput,
    services::payments::PaymentInput,
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

/// Test harness backed by an in-memory SQLite database with the embedded
/// migrations applied. The pool is capped at one connection so every caller
/// sees the same database.
pub struct TestApp {
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let cfg = AppConfig::new("sqlite::memory:", "test");
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("db connect");
        db::run_migrations(&pool).await.expect("migrations");

        let (sender, rx) = events::channel();
        let event_task = tokio::spawn(events::process_events(rx));

        let state = AppState::new(Arc::new(pool), cfg, sender);
        Self {
            state,
            _event_task: event_task,
        }
    }

    pub fn db(&self) -> &sea_orm::DatabaseConnection {
        &self.state.db
    }

    pub async fn seed_branch(&self, code: &str) -> branch::Model {
        let model = branch::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(format!("{code} branch")),
            code: Set(code.to_string()),
            phone: Set(None),
            address: Set(None),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };
        model.insert(self.db()).await.expect("seed branch")
    }

    /// Seeds a stock record and returns the stock item id it tracks.
    pub async fn seed_stock(&self, branch_id: Uuid, item_class: ItemClass, quantity: i32) -> Uuid {
        let stock_item_id = Uuid::new_v4();
        let model = stock_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            stock_item_id: Set(stock_item_id),
            item_class: Set(item_class),
            branch_id: Set(branch_id),
            quantity: Set(quantity),
            initial_count: Set(Some(quantity)),
            stock_limit: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };
        model.insert(self.db()).await.expect("seed stock");
        stock_item_id
    }

    pub async fn stock_quantity(&self, stock_item_id: Uuid, branch_id: Uuid) -> i32 {
        StockRecordEntity::find()
            .filter(stock_record::Column::StockItemId.eq(stock_item_id))
            .filter(stock_record::Column::BranchId.eq(branch_id))
            .one(self.db())
            .await
            .expect("stock query")
            .expect("stock record exists")
            .quantity
    }

    pub async fn count_movements(&self, stock_item_id: Uuid) -> usize {
        StockMovementEntity::find()
            .filter(stock_movement::Column::StockItemId.eq(stock_item_id))
            .all(self.db())
            .await
            .expect("movement query")
            .len()
    }

    /// Every item row ever written for the order, retired versions included.
    pub async fn all_item_rows(&self, order_id: Uuid) -> Vec<order_item::Model> {
        OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(self.db())
            .await
            .expect("item query")
    }
}

pub fn stocked_item(
    stock_item_id: Uuid,
    item_class: ItemClass,
    quantity: i32,
    price: Decimal,
) -> OrderItemInput {
    OrderItemInput {
        id: None,
        stock_item_id: Some(stock_item_id),
        item_class: Some(item_class),
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

pub fn cash_payment(amount: Decimal) -> PaymentInput {
    PaymentInput {
        id: None,
        amount,
        method: PaymentMethod::Cash,
        status: PaymentStatus::Completed,
        payment_date: None,
    }
}
