mod common;

use common::*;
use installment_orders::domain::payment_type::PaymentType;
use installment_orders::domain::ports::{OrderStore, OrderTransaction};
use installment_orders::domain::status::OrderStatus;
use installment_orders::error::OrderError;
use installment_orders::resilience::circuit_breaker::{BreakerState, CircuitBreakerConfig};
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_payment_insert_failure_rolls_back_down_payment() {
    let h = Harness::new();
    let customer = Uuid::new_v4();
    h.store.fail_payment_insert.store(true, Ordering::SeqCst);

    let err = h.service.create_installment(down_payment(customer)).await.unwrap_err();
    assert!(matches!(err, OrderError::Storage(_)));
    assert_eq!(err.to_string(), "database server failed to execute, please try again");

    let (items, total) = h.store.list_sub_orders(1, 10).await.unwrap();
    assert!(items.is_empty());
    assert_eq!(total, 0);

    let mut tx = h.store.begin().await.unwrap();
    assert!(
        tx.find_active_order_by_customer_for_update(customer)
            .await
            .unwrap()
            .is_none()
    );
    drop(tx);

    h.store.fail_payment_insert.store(false, Ordering::SeqCst);
    let created = h.service.create_installment(down_payment(customer)).await.unwrap();
    assert!(created.sub_order_name.starts_with("SUB-ORD-00001-"));
}

#[tokio::test]
async fn test_payment_insert_failure_leaves_no_half_payment_or_history() {
    let h = Harness::new();
    let customer = Uuid::new_v4();
    let down = h.service.create_installment(down_payment(customer)).await.unwrap();

    h.store.fail_payment_insert.store(true, Ordering::SeqCst);
    let err = h
        .service
        .create_installment(follow_up(customer, down.order_id, PaymentType::HalfPayment, dec!(500000)))
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let (items, total) = h.store.list_sub_orders(1, 10).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(items[0].sub_order.payment_type, PaymentType::DownPayment);

    let mut tx = h.store.begin().await.unwrap();
    let order = tx.find_order_by_uuid_for_update(down.order_id).await.unwrap().unwrap();
    let sub_orders = tx.find_sub_orders_by_order(order.id).await.unwrap();
    assert_eq!(sub_orders.len(), 1);
    drop(tx);

    let histories = h.store.find_histories(items[0].sub_order.id).await.unwrap();
    assert_eq!(histories.len(), 1);
    assert_eq!(histories[0].status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_uncommitted_transaction_is_discarded() {
    let h = Harness::new();
    let customer = Uuid::new_v4();

    {
        let mut tx = h.store.begin().await.unwrap();
        tx.create_order(installment_orders::domain::order::NewOrder {
            customer_id: customer,
            customer_name: "Siti Aminah".into(),
            customer_email: "siti@example.com".into(),
            customer_phone: "081234567890".into(),
            package_id: Uuid::new_v4(),
            remaining_outstanding_amount: PACKAGE_PRICE,
        })
        .await
        .unwrap();
    }

    h.service.create_installment(down_payment(customer)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_open_catalog_breaker_short_circuits_calls() {
    let h = Harness::with_breaker(CircuitBreakerConfig {
        max_requests: 1,
        interval: Duration::from_secs(60),
        timeout: Duration::from_secs(30),
        failure_threshold: 2,
    });
    h.catalog.fail.store(true, Ordering::SeqCst);

    for _ in 0..2 {
        let err = h.service.create_installment(down_payment(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, OrderError::Gateway { service: "catalog", .. }));
    }
    assert_eq!(h.service.breakers().catalog.state(), BreakerState::Open);

    let err = h.service.create_installment(down_payment(Uuid::new_v4())).await.unwrap_err();
    assert!(matches!(err, OrderError::CircuitOpen { service: "catalog" }));
    assert_eq!(err.to_string(), "sorry, third party service is busy");
    assert_eq!(h.catalog.calls.load(Ordering::SeqCst), 2);

    // The payment breaker is independent and still closed.
    assert_eq!(h.service.breakers().payment.state(), BreakerState::Closed);

    h.catalog.fail.store(false, Ordering::SeqCst);
    tokio::time::advance(Duration::from_secs(31)).await;
    h.service.create_installment(down_payment(Uuid::new_v4())).await.unwrap();
    assert_eq!(h.service.breakers().catalog.state(), BreakerState::Closed);
}
