//! Branch-scoped sequence numbers: format, scoping, and uniqueness under
//! concurrent issuance.

mod common;

use common::TestApp;
use chrono::Utc;
use optica_api::entities::sequence_counter::SequenceKind;
use std::collections::HashSet;

#[tokio::test]
async fn normal_invoice_numbers_increment_per_branch() {
    let app = TestApp::new().await;
    let kdy = app.seed_branch("KDY").await;
    let rwp = app.seed_branch("RWP").await;

    let first = app
        .state
        .sequences
        .issue_number(kdy.id, SequenceKind::InvoiceNormal)
        .await
        .unwrap();
    let second = app
        .state
        .sequences
        .issue_number(kdy.id, SequenceKind::InvoiceNormal)
        .await
        .unwrap();
    assert_eq!(first, "KDYN001");
    assert_eq!(second, "KDYN002");

    // A different branch starts its own series.
    let other = app
        .state
        .sequences
        .issue_number(rwp.id, SequenceKind::InvoiceNormal)
        .await
        .unwrap();
    assert_eq!(other, "RWPN001");
}

#[tokio::test]
async fn kinds_do_not_share_counters() {
    let app = TestApp::new().await;
    let branch = app.seed_branch("KDY").await;

    app.state
        .sequences
        .issue_number(branch.id, SequenceKind::InvoiceNormal)
        .await
        .unwrap();
    app.state
        .sequences
        .issue_number(branch.id, SequenceKind::InvoiceNormal)
        .await
        .unwrap();

    let mnt = app
        .state
        .sequences
        .issue_number(branch.id, SequenceKind::Mnt)
        .await
        .unwrap();
    let refraction = app
        .state
        .sequences
        .issue_number(branch.id, SequenceKind::Refraction)
        .await
        .unwrap();

    assert_eq!(mnt, "MNTKDY001");
    assert_eq!(refraction, "001");
}

#[tokio::test]
async fn factory_invoices_carry_the_day_and_daily_counter() {
    let app = TestApp::new().await;
    let branch = app.seed_branch("KDY").await;

    let number = app
        .state
        .sequences
        .issue_number(branch.id, SequenceKind::InvoiceFactory)
        .await
        .unwrap();

    let day_token = Utc::now().date_naive().format("%d%m").to_string();
    assert_eq!(number, format!("KDY{day_token}1"));

    let next = app
        .state
        .sequences
        .issue_number(branch.id, SequenceKind::InvoiceFactory)
        .await
        .unwrap();
    assert_eq!(next, format!("KDY{day_token}2"));
}

#[tokio::test]
async fn concurrent_issuance_never_duplicates() {
    let app = TestApp::new().await;
    let branch = app.seed_branch("KDY").await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let sequences = app.state.sequences.clone();
        let branch_id = branch.id;
        handles.push(tokio::spawn(async move {
            sequences
                .issue_number(branch_id, SequenceKind::InvoiceNormal)
                .await
        }));
    }

    let mut numbers = Vec::new();
    for handle in handles {
        numbers.push(handle.await.expect("task").expect("issue number"));
    }

    let distinct: HashSet<_> = numbers.iter().cloned().collect();
    assert_eq!(distinct.len(), 10, "all issued numbers are distinct");
    for n in 1..=10 {
        assert!(
            distinct.contains(&format!("KDYN{:03}", n)),
            "missing counter value {n}"
        );
    }
}
