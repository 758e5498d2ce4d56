//! Payment reconciliation, partial/final flags, overpayment handling, and
//! the refund scenarios around a shrinking order total.

mod common;

use common::{cash_payment, stocked_item, TestApp};
use optica_api::{
    entities::payment::{self, Entity as PaymentEntity, PaymentMethod, PaymentStatus},
    entities::refund_expense::{self, Entity as RefundExpenseEntity},
    entities::stock_record::ItemClass,
    errors::ServiceError,
    services::customers::CustomerRef,
    services::order_items::OrderItemInput,
    services::orders::{CreateOrderRequest, OrderItemResponse, OrderPatch, UpdateOrderRequest},
    services::payments::PaymentInput,
};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

fn create_request(branch_id: Uuid, items: Vec<OrderItemInput>) -> CreateOrderRequest {
    CreateOrderRequest {
        branch_id,
        customer: CustomerRef::New {
            name: "Bilal Ahmed".to_string(),
            phone: "0321-7654321".to_string(),
            email: None,
        },
        refraction_id: None,
        discount: dec!(0),
        on_hold: false,
        urgent: false,
        items,
        payments: vec![],
        created_by: None,
    }
}

fn as_input(item: &OrderItemResponse) -> OrderItemInput {
    OrderItemInput {
        id: Some(item.id),
        stock_item_id: item.stock_item_id,
        item_class: item.item_class,
        external_lens_id: item.external_lens_id,
        quantity: item.quantity,
        price_per_unit: item.price_per_unit,
        is_non_stock: item.is_non_stock,
        is_refund: item.is_refund,
        note: None,
        serial_number: None,
        battery: None,
        next_service_date: None,
    }
}

fn keep_payment(id: Uuid, amount: rust_decimal::Decimal) -> PaymentInput {
    PaymentInput {
        id: Some(id),
        amount,
        method: PaymentMethod::Cash,
        status: PaymentStatus::Completed,
        payment_date: None,
    }
}

/// Two $1000 frames with $800 paid; the base of the refund scenarios.
async fn two_item_order(app: &TestApp) -> (Uuid, optica_api::services::orders::OrderResponse) {
    let branch = app.seed_branch("KDY").await;
    let frame_a = app.seed_stock(branch.id, ItemClass::Frame, 5).await;
    let frame_b = app.seed_stock(branch.id, ItemClass::Frame, 5).await;

    let mut request = create_request(
        branch.id,
        vec![
            stocked_item(frame_a, ItemClass::Frame, 1, dec!(1000)),
            stocked_item(frame_b, ItemClass::Frame, 1, dec!(1000)),
        ],
    );
    request.payments = vec![cash_payment(dec!(800))];
    let order = app.state.orders.create_order(request).await.unwrap();
    assert_eq!(order.total_price, dec!(2000));
    assert_eq!(order.total_payment, dec!(800));
    (branch.id, order)
}

#[tokio::test]
async fn running_total_sets_partial_and_final_flags() {
    let app = TestApp::new().await;
    let branch = app.seed_branch("KDY").await;
    let frame = app.seed_stock(branch.id, ItemClass::Frame, 5).await;

    let order = app
        .state
        .orders
        .create_order(create_request(
            branch.id,
            vec![stocked_item(frame, ItemClass::Frame, 1, dec!(1000))],
        ))
        .await
        .unwrap();

    let after_first = app
        .state
        .payments
        .record_payment_batch(order.id, vec![cash_payment(dec!(400))], None)
        .await
        .unwrap();
    assert_eq!(after_first.total_payment, dec!(400));

    let first = app.state.orders.get_order(order.id).await.unwrap();
    assert!(first.payments[0].is_partial);
    assert!(!first.payments[0].is_final);

    // Settle the remainder; the batch carries the existing payment forward.
    app.state
        .payments
        .record_payment_batch(
            order.id,
            vec![
                keep_payment(first.payments[0].id, dec!(400)),
                cash_payment(dec!(600)),
            ],
            None,
        )
        .await
        .unwrap();

    let settled = app.state.orders.get_order(order.id).await.unwrap();
    assert_eq!(settled.total_payment, dec!(1000));
    assert_eq!(settled.payments.len(), 2);
    assert!(settled.payments[0].is_partial);
    assert!(!settled.payments[0].is_final);
    assert!(!settled.payments[1].is_partial);
    assert!(settled.payments[1].is_final);
}

#[tokio::test]
async fn payments_beyond_total_are_rejected_outright() {
    let app = TestApp::new().await;
    let branch = app.seed_branch("KDY").await;
    let frame = app.seed_stock(branch.id, ItemClass::Frame, 5).await;

    let order = app
        .state
        .orders
        .create_order(create_request(
            branch.id,
            vec![stocked_item(frame, ItemClass::Frame, 1, dec!(500))],
        ))
        .await
        .unwrap();

    let err = app
        .state
        .payments
        .record_payment_batch(order.id, vec![cash_payment(dec!(600))], None)
        .await
        .expect_err("overpayment with no refund path");

    match err {
        ServiceError::PaymentExceedsTotal { paid, total, .. } => {
            assert_eq!(paid, dec!(600));
            assert_eq!(total, dec!(500));
        }
        other => panic!("unexpected error: {other}"),
    }

    // The failed batch leaves no payment rows behind.
    let rows = PaymentEntity::find()
        .filter(payment::Column::OrderId.eq(order.id))
        .all(app.db())
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn item_refund_within_paid_amount_needs_no_refund_expense() {
    let app = TestApp::new().await;
    let (_branch, order) = two_item_order(&app).await;

    // Refund the first item: total drops to 1000, still above the 800 paid.
    let mut first = as_input(&order.items[0]);
    first.is_refund = true;
    let second = as_input(&order.items[1]);

    let updated = app
        .state
        .orders
        .update_order(
            order.id,
            UpdateOrderRequest {
                patch: OrderPatch::default(),
                items: vec![first, second],
                payments: vec![keep_payment(order.payments[0].id, dec!(800))],
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(updated.subtotal, dec!(1000));
    assert_eq!(updated.total_price, dec!(1000));
    assert_eq!(updated.total_payment, dec!(800));

    let expenses = RefundExpenseEntity::find()
        .filter(refund_expense::Column::OrderId.eq(order.id))
        .all(app.db())
        .await
        .unwrap();
    assert!(expenses.is_empty(), "no overpayment, no refund expense");
}

#[tokio::test]
async fn refund_plus_discount_floors_total_and_refunds_the_payments() {
    let app = TestApp::new().await;
    let (_branch, order) = two_item_order(&app).await;

    // Refund one item and grant a 1200 discount: subtotal 1000, total 0.
    let mut first = as_input(&order.items[0]);
    first.is_refund = true;
    let second = as_input(&order.items[1]);

    let updated = app
        .state
        .orders
        .update_order(
            order.id,
            UpdateOrderRequest {
                patch: OrderPatch {
                    discount: Some(dec!(1200)),
                    ..OrderPatch::default()
                },
                items: vec![first, second],
                payments: vec![keep_payment(order.payments[0].id, dec!(800))],
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(updated.subtotal, dec!(1000));
    assert_eq!(updated.total_price, dec!(0));
    assert_eq!(updated.total_payment, dec!(0));

    let expenses = RefundExpenseEntity::find()
        .filter(refund_expense::Column::OrderId.eq(order.id))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(expenses.len(), 1);
    assert_eq!(expenses[0].amount, dec!(800));
    assert!(expenses[0].note.contains("item refund"));
}

#[tokio::test]
async fn editing_a_payment_versions_it_and_keeps_the_original_date() {
    let app = TestApp::new().await;
    let branch = app.seed_branch("KDY").await;
    let frame = app.seed_stock(branch.id, ItemClass::Frame, 5).await;

    let mut request = create_request(
        branch.id,
        vec![stocked_item(frame, ItemClass::Frame, 1, dec!(1000))],
    );
    request.payments = vec![cash_payment(dec!(300))];
    let order = app.state.orders.create_order(request).await.unwrap();

    let original = PaymentEntity::find()
        .filter(payment::Column::OrderId.eq(order.id))
        .one(app.db())
        .await
        .unwrap()
        .unwrap();

    // Cashier corrects the amount: the row is retired, not rewritten.
    app.state
        .payments
        .record_payment_batch(order.id, vec![keep_payment(original.id, dec!(350))], None)
        .await
        .unwrap();

    let rows = PaymentEntity::find()
        .filter(payment::Column::OrderId.eq(order.id))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    let retired = rows.iter().find(|r| r.is_deleted).expect("retired row");
    let current = rows.iter().find(|r| !r.is_deleted).expect("current row");
    assert!(retired.is_edited);
    assert_eq!(retired.amount, dec!(300));
    assert_eq!(current.amount, dec!(350));
    assert_eq!(current.version, retired.version + 1);
    assert_eq!(current.line_id, retired.line_id);
    assert_eq!(current.payment_date, retired.payment_date);
}

#[tokio::test]
async fn full_order_refund_restocks_and_returns_every_rupee() {
    let app = TestApp::new().await;
    let branch = app.seed_branch("KDY").await;
    let frame = app.seed_stock(branch.id, ItemClass::Frame, 5).await;

    let mut request = create_request(
        branch.id,
        vec![stocked_item(frame, ItemClass::Frame, 2, dec!(500))],
    );
    request.payments = vec![cash_payment(dec!(600))];
    let order = app.state.orders.create_order(request).await.unwrap();
    assert_eq!(app.stock_quantity(frame, branch.id).await, 3);

    let refunded = app
        .state
        .orders
        .refund_order(order.id, "customer returned the frames".to_string(), None)
        .await
        .unwrap();

    assert!(refunded.is_refund);
    assert_eq!(refunded.total_price, dec!(0));
    assert_eq!(refunded.total_payment, dec!(0));
    assert_eq!(app.stock_quantity(frame, branch.id).await, 5);

    let expenses = RefundExpenseEntity::find()
        .filter(refund_expense::Column::OrderId.eq(order.id))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(expenses.len(), 1);
    assert_eq!(expenses[0].amount, dec!(600));

    // Refunded is terminal.
    let err = app
        .state
        .orders
        .refund_order(order.id, "again".to_string(), None)
        .await
        .expect_err("already refunded");
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}
