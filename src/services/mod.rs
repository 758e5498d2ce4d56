// Core services
pub mod customers;
pub mod order_items;
pub mod orders;
pub mod payments;
pub mod sequences;
pub mod stock_ledger;
