//! Manual stock operations: adjustments, transfers, and the append-only
//! movement trail.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use optica_api::{
    entities::stock_movement::{self, Entity as StockMovementEntity, StockAction},
    entities::stock_record::ItemClass,
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

#[tokio::test]
async fn adjustments_move_quantity_and_append_movements() {
    let app = TestApp::new().await;
    let branch = app.seed_branch("KDY").await;
    let frame = app.seed_stock(branch.id, ItemClass::Frame, 5).await;

    app.state
        .stock
        .adjust_stock(frame, ItemClass::Frame, branch.id, StockAction::Add, 3, None)
        .await
        .unwrap();
    assert_eq!(app.stock_quantity(frame, branch.id).await, 8);

    app.state
        .stock
        .adjust_stock(
            frame,
            ItemClass::Frame,
            branch.id,
            StockAction::Remove,
            2,
            None,
        )
        .await
        .unwrap();
    assert_eq!(app.stock_quantity(frame, branch.id).await, 6);

    let movements = StockMovementEntity::find()
        .filter(stock_movement::Column::StockItemId.eq(frame))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(movements.len(), 2);
    assert!(movements
        .iter()
        .any(|m| m.action == StockAction::Add && m.quantity_changed == 3));
    assert!(movements
        .iter()
        .any(|m| m.action == StockAction::Remove && m.quantity_changed == -2));
}

#[tokio::test]
async fn removal_below_zero_is_rejected_before_mutation() {
    let app = TestApp::new().await;
    let branch = app.seed_branch("KDY").await;
    let frame = app.seed_stock(branch.id, ItemClass::Frame, 2).await;

    let err = app
        .state
        .stock
        .adjust_stock(
            frame,
            ItemClass::Frame,
            branch.id,
            StockAction::Remove,
            5,
            None,
        )
        .await
        .expect_err("cannot remove more than on hand");

    assert_matches!(
        err,
        ServiceError::InsufficientStock {
            requested: 5,
            available: 2,
            ..
        }
    );
    assert_eq!(app.stock_quantity(frame, branch.id).await, 2);
    assert_eq!(app.count_movements(frame).await, 0);
}

#[tokio::test]
async fn transfer_moves_quantity_between_branches_with_one_movement() {
    let app = TestApp::new().await;
    let kdy = app.seed_branch("KDY").await;
    let rwp = app.seed_branch("RWP").await;
    let frame = app.seed_stock(kdy.id, ItemClass::Frame, 10).await;

    app.state
        .stock
        .transfer_stock(frame, kdy.id, rwp.id, 4, None)
        .await
        .unwrap();

    assert_eq!(app.stock_quantity(frame, kdy.id).await, 6);
    // Destination record is created on first transfer.
    assert_eq!(app.stock_quantity(frame, rwp.id).await, 4);

    let movements = StockMovementEntity::find()
        .filter(stock_movement::Column::StockItemId.eq(frame))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].action, StockAction::Transfer);
    assert_eq!(movements[0].branch_id, kdy.id);
    assert_eq!(movements[0].transfer_to_branch_id, Some(rwp.id));
    assert_eq!(movements[0].quantity_changed, -4);
}

#[tokio::test]
async fn transfer_beyond_source_stock_fails_whole() {
    let app = TestApp::new().await;
    let kdy = app.seed_branch("KDY").await;
    let rwp = app.seed_branch("RWP").await;
    let frame = app.seed_stock(kdy.id, ItemClass::Frame, 3).await;

    let err = app
        .state
        .stock
        .transfer_stock(frame, kdy.id, rwp.id, 5, None)
        .await
        .expect_err("insufficient source stock");

    assert_matches!(err, ServiceError::InsufficientStock { .. });
    assert_eq!(app.stock_quantity(frame, kdy.id).await, 3);
    assert!(app
        .state
        .stock
        .get_stock(frame, rwp.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn transfer_to_same_branch_is_invalid() {
    let app = TestApp::new().await;
    let kdy = app.seed_branch("KDY").await;
    let frame = app.seed_stock(kdy.id, ItemClass::Frame, 3).await;

    let err = app
        .state
        .stock
        .transfer_stock(frame, kdy.id, kdy.id, 1, None)
        .await
        .expect_err("same branch");
    assert_matches!(err, ServiceError::ValidationError(_));
}
