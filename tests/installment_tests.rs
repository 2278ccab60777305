mod common;

use chrono::{Duration, Utc};
use common::*;
use installment_orders::domain::payment_type::PaymentType;
use installment_orders::domain::ports::OrderStore;
use installment_orders::domain::status::OrderStatus;
use installment_orders::error::OrderError;
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use uuid::Uuid;

#[tokio::test]
async fn test_down_payment_opens_order_for_full_price() {
    let h = Harness::new();
    let customer = Uuid::new_v4();

    let result = h.service.create_installment(down_payment(customer)).await.unwrap();

    assert_eq!(result.status, OrderStatus::Pending);
    assert_eq!(result.payment_type, PaymentType::DownPayment);
    assert_eq!(result.amount, dec!(100000));
    assert!(!result.is_paid);
    assert!(result.sub_order_name.starts_with("SUB-ORD-00001-"));
    let payment = result.payment.expect("payment link");
    assert!(payment.payment_link.unwrap().starts_with("https://pay.example/"));

    let order = h.order(result.order_id).await;
    assert_eq!(order.remaining_outstanding_amount, PACKAGE_PRICE);
    assert_eq!(order.customer_name, "Siti Aminah");
    assert!(order.order_name.starts_with("ORD-00001-"));
    assert!(order.is_active());

    let record = h.record(result.sub_order_id).await;
    let histories = h.store.find_histories(record.sub_order.id).await.unwrap();
    assert_eq!(histories.len(), 1);
    assert_eq!(histories[0].status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_payment_link_request_carries_snapshot_and_title() {
    let h = Harness::new();
    let before = Utc::now();
    let result = h.service.create_installment(down_payment(Uuid::new_v4())).await.unwrap();

    let requests = h.payment.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.order_id, result.sub_order_id);
    assert_eq!(request.amount, dec!(100000));
    assert_eq!(request.description, "Down Payment");
    assert_eq!(request.customer.email, "siti@example.com");
    assert_eq!(request.items.len(), 1);
    assert_eq!(request.items[0].quantity, 1);
    assert!(request.expired_at >= before + Duration::hours(24));
}

#[tokio::test]
async fn test_down_payment_amount_must_match_percentage() {
    let h = Harness::new();

    let mut request = down_payment(Uuid::new_v4());
    request.amount = dec!(99999);
    let err = h.service.create_installment(request).await.unwrap_err();

    assert!(matches!(err, OrderError::InvalidDownAmount { percent } if percent == dec!(10)));
    assert_eq!(h.payment.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.identity.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_second_down_payment_with_active_order_is_rejected() {
    let h = Harness::new();
    let customer = Uuid::new_v4();
    h.service.create_installment(down_payment(customer)).await.unwrap();

    let err = h.service.create_installment(down_payment(customer)).await.unwrap_err();

    assert!(matches!(err, OrderError::PreviousOrderNotEmpty));
    assert_eq!(h.payment.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_order_date_in_the_past_is_rejected_before_any_call() {
    let h = Harness::new();
    let mut request = down_payment(Uuid::new_v4());
    request.order_date = Utc::now() - Duration::hours(1);

    let err = h.service.create_installment(request).await.unwrap_err();

    assert!(matches!(err, OrderError::OrderDate));
    assert_eq!(h.catalog.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_half_payment_must_be_half_of_outstanding() {
    let h = Harness::new();
    let customer = Uuid::new_v4();
    let down = h.service.create_installment(down_payment(customer)).await.unwrap();

    let err = h
        .service
        .create_installment(follow_up(customer, down.order_id, PaymentType::HalfPayment, dec!(499999)))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidHalfAmount));

    let half = h
        .service
        .create_installment(follow_up(customer, down.order_id, PaymentType::HalfPayment, dec!(500000)))
        .await
        .unwrap();
    assert_eq!(half.order_id, down.order_id);
    assert_eq!(half.status, OrderStatus::Pending);
    assert_eq!(h.payment.requests.lock().unwrap()[1].description, "50% Payment");
}

#[tokio::test]
async fn test_second_unpaid_half_payment_is_rejected() {
    let h = Harness::new();
    let customer = Uuid::new_v4();
    let down = h.service.create_installment(down_payment(customer)).await.unwrap();
    let half = follow_up(customer, down.order_id, PaymentType::HalfPayment, dec!(500000));
    h.service.create_installment(half.clone()).await.unwrap();

    let err = h.service.create_installment(half).await.unwrap_err();

    assert!(matches!(err, OrderError::PreviousOrderNotEmpty));
}

#[tokio::test]
async fn test_second_paid_half_payment_is_rejected() {
    let h = Harness::new();
    let customer = Uuid::new_v4();
    let down = h.service.create_installment(down_payment(customer)).await.unwrap();
    let half = h
        .service
        .create_installment(follow_up(customer, down.order_id, PaymentType::HalfPayment, dec!(500000)))
        .await
        .unwrap();
    let payment_id = h.payment_id(half.sub_order_id).await;
    h.service
        .apply_payment_event(&pending_event(payment_id), OrderStatus::PendingPayment)
        .await
        .unwrap();
    h.service
        .apply_payment_event(&settlement_event(payment_id, dec!(500000)), OrderStatus::PaymentSuccess)
        .await
        .unwrap();

    let err = h
        .service
        .create_installment(follow_up(customer, down.order_id, PaymentType::HalfPayment, dec!(250000)))
        .await
        .unwrap_err();

    assert!(matches!(err, OrderError::HalfPaymentNotEmpty));
}

#[tokio::test]
async fn test_full_payment_must_match_outstanding() {
    let h = Harness::new();
    let customer = Uuid::new_v4();
    let down = h.service.create_installment(down_payment(customer)).await.unwrap();

    let err = h
        .service
        .create_installment(follow_up(customer, down.order_id, PaymentType::FullPayment, dec!(900000)))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidFullAmount));

    let full = h
        .service
        .create_installment(follow_up(customer, down.order_id, PaymentType::FullPayment, PACKAGE_PRICE))
        .await
        .unwrap();
    assert_eq!(full.payment_type, PaymentType::FullPayment);
}

#[tokio::test]
async fn test_follow_up_without_order_is_rejected() {
    let h = Harness::new();
    let customer = Uuid::new_v4();

    let mut request = follow_up(customer, Uuid::new_v4(), PaymentType::HalfPayment, dec!(500000));
    let err = h.service.create_installment(request.clone()).await.unwrap_err();
    assert!(matches!(err, OrderError::OrderIsEmpty));

    request.order_id = None;
    let err = h.service.create_installment(request).await.unwrap_err();
    assert!(matches!(err, OrderError::OrderIsEmpty));
}

#[tokio::test]
async fn test_gateway_failure_leaves_no_order() {
    let h = Harness::new();
    let customer = Uuid::new_v4();
    h.payment.fail.store(true, Ordering::SeqCst);

    let err = h.service.create_installment(down_payment(customer)).await.unwrap_err();
    assert!(matches!(err, OrderError::Gateway { service: "payment", .. }));

    let (items, total) = h.store.list_sub_orders(1, 10).await.unwrap();
    assert!(items.is_empty());
    assert_eq!(total, 0);

    h.payment.fail.store(false, Ordering::SeqCst);
    h.service.create_installment(down_payment(customer)).await.unwrap();
}

#[tokio::test]
async fn test_list_is_newest_first_and_paginated() {
    let h = Harness::new();
    let mut created = Vec::new();
    for _ in 0..3 {
        created.push(h.service.create_installment(down_payment(Uuid::new_v4())).await.unwrap());
    }

    let page = h.service.list_sub_orders(1, 2).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].sub_order_id, created[2].sub_order_id);
    assert_eq!(page.items[1].sub_order_id, created[1].sub_order_id);

    let last = h.service.list_sub_orders(2, 2).await.unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].sub_order_id, created[0].sub_order_id);

    let defaulted = h.service.list_sub_orders(0, 0).await.unwrap();
    assert_eq!(defaulted.page, 1);
    assert_eq!(defaulted.limit, 10);
    assert_eq!(defaulted.items.len(), 3);
}

#[tokio::test]
async fn test_detail_of_unknown_sub_order() {
    let h = Harness::new();
    let err = h.service.get_sub_order_detail(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, OrderError::SubOrderNotFound));
}
