//! Application layer: the payment orchestration service.
//!
//! `OrderService` is the single entry point for opening, cancelling and
//! settling installments. Amount rules live with their payment type in
//! `installment`; invoice formatting lives in `invoice`.

pub mod installment;
pub mod invoice;
pub mod service;
