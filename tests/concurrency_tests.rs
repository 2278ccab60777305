mod common;

use common::*;
use installment_orders::domain::payment_type::PaymentType;
use installment_orders::domain::status::OrderStatus;
use installment_orders::error::OrderError;
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_down_payments_open_one_order() {
    let h = Harness::new();
    let customer = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service.create_installment(down_payment(customer)).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(err) => assert!(matches!(err, OrderError::PreviousOrderNotEmpty)),
        }
    }
    assert_eq!(succeeded, 1);

    let page = h.service.list_sub_orders(1, 50).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(h.payment.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_settlements_book_once() {
    let h = Harness::new();
    let down = h.service.create_installment(down_payment(Uuid::new_v4())).await.unwrap();
    let payment_id = h.payment_id(down.sub_order_id).await;
    h.service
        .apply_payment_event(&pending_event(payment_id), OrderStatus::PendingPayment)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service
                .apply_payment_event(&settlement_event(payment_id, dec!(100000)), OrderStatus::PaymentSuccess)
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => succeeded += 1,
            Err(err) => assert!(matches!(err, OrderError::InvalidStatusTransition { .. })),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(
        h.order(down.order_id).await.remaining_outstanding_amount,
        dec!(900000)
    );
    assert_eq!(h.invoice.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_customers_proceed_independently() {
    let h = Harness::new();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service.create_installment(down_payment(Uuid::new_v4())).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let page = h.service.list_sub_orders(1, 50).await.unwrap();
    assert_eq!(page.total, 10);
    let mut names: Vec<_> = page.items.iter().map(|item| item.sub_order_name.clone()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sibling_settlements_both_reduce_balance() {
    let h = Harness::new();
    let customer = Uuid::new_v4();
    let down = h.service.create_installment(down_payment(customer)).await.unwrap();
    let half = h
        .service
        .create_installment(follow_up(customer, down.order_id, PaymentType::HalfPayment, dec!(500000)))
        .await
        .unwrap();

    let mut settlements = Vec::new();
    for (sub_order_id, amount) in [(down.sub_order_id, dec!(100000)), (half.sub_order_id, dec!(500000))] {
        let payment_id = h.payment_id(sub_order_id).await;
        h.service
            .apply_payment_event(&pending_event(payment_id), OrderStatus::PendingPayment)
            .await
            .unwrap();
        settlements.push(settlement_event(payment_id, amount));
    }

    let mut handles = Vec::new();
    for settlement in settlements {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service
                .apply_payment_event(&settlement, OrderStatus::PaymentSuccess)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(h.order(down.order_id).await.remaining_outstanding_amount, dec!(400000));
    assert_eq!(h.invoice.calls.load(Ordering::SeqCst), 2);
}
