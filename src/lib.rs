//! Installment-order payment orchestration.
//!
//! A customer buys a package in up to three installments (down payment,
//! 50% payment, 100% payment). Each installment gets a payment link from
//! the payment service; callbacks from that service drive the installment
//! through its status machine, settle the order balance and issue invoices.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod resilience;
pub mod telemetry;
