//! Optica API Library
//!
//! Order fulfillment and stock reconciliation core for a multi-branch
//! optical retail backend. The HTTP surface, authentication, and reporting
//! live in sibling services; this crate owns the transactional engine.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use services::{
    customers::CustomerService, orders::OrderService, payments::PaymentService,
    sequences::SequenceService, stock_ledger::StockLedgerService,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub orders: OrderService,
    pub stock: StockLedgerService,
    pub payments: PaymentService,
    pub sequences: SequenceService,
    pub customers: CustomerService,
}

impl AppState {
    /// Wires up every core service around one shared pool and event channel.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let stock = StockLedgerService::new(db.clone(), event_sender.clone());
        let sequences = SequenceService::new(db.clone());
        let payments = PaymentService::new(db.clone(), event_sender.clone());
        let customers = CustomerService::new(db.clone());
        let orders = OrderService::new(db.clone(), event_sender.clone());

        Self {
            db,
            config,
            event_sender,
            orders,
            stock,
            payments,
            sequences,
            customers,
        }
    }
}
