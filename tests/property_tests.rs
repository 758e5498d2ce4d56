//! Property-based checks on the pure arithmetic the engine relies on.

use chrono::NaiveDate;
use optica_api::entities::sequence_counter::SequenceKind;
use optica_api::entities::stock_record::ItemClass;
use optica_api::services::order_items::OrderItemInput;
use optica_api::services::sequences::format_number;
use optica_api::services::stock_ledger::LineChange;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn item(quantity: i32, price_cents: i64) -> OrderItemInput {
    OrderItemInput {
        id: None,
        stock_item_id: Some(uuid::Uuid::new_v4()),
        item_class: Some(ItemClass::Frame),
        external_lens_id: None,
        quantity,
        price_per_unit: Decimal::new(price_cents, 2),
        is_non_stock: false,
        is_refund: false,
        note: None,
        serial_number: None,
        battery: None,
        next_service_date: None,
    }
}

proptest! {
    #[test]
    fn subtotal_is_exactly_quantity_times_price(
        quantity in 1i32..1000,
        price_cents in 0i64..10_000_000,
    ) {
        let input = item(quantity, price_cents);
        let expected = Decimal::new(price_cents, 2) * Decimal::from(quantity);
        prop_assert_eq!(input.subtotal(), expected);
    }

    #[test]
    fn totals_never_go_negative(
        subtotal_cents in 0i64..10_000_000,
        discount_cents in 0i64..20_000_000,
    ) {
        let subtotal = Decimal::new(subtotal_cents, 2);
        let discount = Decimal::new(discount_cents, 2);
        let total = (subtotal - discount).max(Decimal::ZERO);
        prop_assert!(total >= Decimal::ZERO);
        if discount <= subtotal {
            prop_assert_eq!(total, subtotal - discount);
        }
    }

    #[test]
    fn deferred_stock_is_all_or_nothing(quantity in 1i32..1000) {
        // A lens line holds either its full quantity or none, never a slice.
        let held_on_hold = LineChange::desired_for(ItemClass::Lens, quantity, true);
        let held_active = LineChange::desired_for(ItemClass::Lens, quantity, false);
        prop_assert_eq!(held_on_hold, 0);
        prop_assert_eq!(held_active, quantity);

        // Immediate classes ignore the hold flag.
        prop_assert_eq!(LineChange::desired_for(ItemClass::Frame, quantity, true), quantity);
        prop_assert_eq!(LineChange::desired_for(ItemClass::Frame, quantity, false), quantity);
    }

    #[test]
    fn sequence_values_format_injectively(
        a in 1i64..100_000,
        b in 1i64..100_000,
    ) {
        prop_assume!(a != b);
        let day = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        for kind in [
            SequenceKind::InvoiceNormal,
            SequenceKind::InvoiceFactory,
            SequenceKind::Mnt,
            SequenceKind::Refraction,
        ] {
            prop_assert_ne!(
                format_number(kind, "KDY", a, day),
                format_number(kind, "KDY", b, day)
            );
        }
    }
}
