//! One policy per payment type. Each resolves the order an installment
//! belongs to and enforces that installment's amount rule; the shared
//! creation sequence lives in [`OrderService`](super::service::OrderService).

use crate::domain::order::{NewOrder, Order};
use crate::domain::payment_type::PaymentType;
use crate::domain::ports::{Gateways, OrderTransaction};
use crate::error::{OrderError, Result};
use crate::resilience::Breakers;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// A request to open one installment, already schema-validated by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentRequest {
    pub customer_id: Uuid,
    /// Public id of the order; required for half and full payments.
    pub order_id: Option<Uuid>,
    pub package_id: Uuid,
    pub amount: Decimal,
    pub order_date: DateTime<Utc>,
    pub payment_type: PaymentType,
}

/// External collaborators a policy may call, each behind its own breaker.
pub struct PolicyContext<'a> {
    pub gateways: &'a Gateways,
    pub breakers: &'a Breakers,
}

#[async_trait]
pub trait InstallmentPolicy: Send + Sync {
    fn payment_type(&self) -> PaymentType;

    /// Returns the order the new sub-order attaches to, creating it when the
    /// installment opens a new purchase cycle. Runs inside `tx`; any error
    /// aborts the whole installment.
    async fn resolve_order(
        &self,
        ctx: &PolicyContext<'_>,
        tx: &mut dyn OrderTransaction,
        request: &InstallmentRequest,
    ) -> Result<Order>;
}

pub type PolicyTable = HashMap<PaymentType, Box<dyn InstallmentPolicy>>;

pub fn default_policies() -> PolicyTable {
    let policies: [Box<dyn InstallmentPolicy>; 3] = [
        Box::new(DownPaymentPolicy),
        Box::new(HalfPaymentPolicy),
        Box::new(FullPaymentPolicy),
    ];
    policies
        .into_iter()
        .map(|policy| (policy.payment_type(), policy))
        .collect()
}

/// Opens a new order. The amount must be the package's minimum down-payment
/// percentage of its price, and the customer must have no active order.
pub struct DownPaymentPolicy;

#[async_trait]
impl InstallmentPolicy for DownPaymentPolicy {
    fn payment_type(&self) -> PaymentType {
        PaymentType::DownPayment
    }

    async fn resolve_order(
        &self,
        ctx: &PolicyContext<'_>,
        tx: &mut dyn OrderTransaction,
        request: &InstallmentRequest,
    ) -> Result<Order> {
        let package = ctx
            .breakers
            .catalog
            .call(|| ctx.gateways.catalog.get_detail_package(request.package_id))
            .await?;

        let required = package.price * package.minimum_down_payment / dec!(100);
        if required != request.amount {
            debug!(%required, amount = %request.amount, "down payment amount rejected");
            return Err(OrderError::InvalidDownAmount {
                percent: package.minimum_down_payment,
            });
        }

        if tx
            .find_active_order_by_customer_for_update(request.customer_id)
            .await?
            .is_some()
        {
            return Err(OrderError::PreviousOrderNotEmpty);
        }

        let profile = ctx
            .breakers
            .identity
            .call(|| ctx.gateways.identity.get_user_profile(request.customer_id))
            .await?;

        tx.create_order(NewOrder {
            customer_id: request.customer_id,
            customer_name: profile.name,
            customer_email: profile.email,
            customer_phone: profile.phone,
            package_id: request.package_id,
            remaining_outstanding_amount: package.price,
        })
        .await
    }
}

/// Half of the order's current outstanding balance.
pub struct HalfPaymentPolicy;

#[async_trait]
impl InstallmentPolicy for HalfPaymentPolicy {
    fn payment_type(&self) -> PaymentType {
        PaymentType::HalfPayment
    }

    async fn resolve_order(
        &self,
        _ctx: &PolicyContext<'_>,
        tx: &mut dyn OrderTransaction,
        request: &InstallmentRequest,
    ) -> Result<Order> {
        let order = existing_order(tx, request).await?;
        ensure_no_installment(tx, &order, PaymentType::HalfPayment).await?;

        if order.remaining_outstanding_amount * dec!(50) / dec!(100) != request.amount {
            return Err(OrderError::InvalidHalfAmount);
        }
        Ok(order)
    }
}

/// Settles the whole remaining balance.
pub struct FullPaymentPolicy;

#[async_trait]
impl InstallmentPolicy for FullPaymentPolicy {
    fn payment_type(&self) -> PaymentType {
        PaymentType::FullPayment
    }

    async fn resolve_order(
        &self,
        _ctx: &PolicyContext<'_>,
        tx: &mut dyn OrderTransaction,
        request: &InstallmentRequest,
    ) -> Result<Order> {
        let order = existing_order(tx, request).await?;
        ensure_no_installment(tx, &order, PaymentType::FullPayment).await?;

        if order.remaining_outstanding_amount != request.amount {
            return Err(OrderError::InvalidFullAmount);
        }
        Ok(order)
    }
}

async fn existing_order(
    tx: &mut dyn OrderTransaction,
    request: &InstallmentRequest,
) -> Result<Order> {
    let Some(order_id) = request.order_id else {
        return Err(OrderError::OrderIsEmpty);
    };
    tx.find_order_by_uuid_for_update(order_id)
        .await?
        .ok_or(OrderError::OrderIsEmpty)
}

/// Rejects a second live installment of the same type on one order.
async fn ensure_no_installment(
    tx: &mut dyn OrderTransaction,
    order: &Order,
    payment_type: PaymentType,
) -> Result<()> {
    match tx
        .find_sub_order_by_order_and_payment_type(order.id, payment_type)
        .await?
    {
        Some(existing) if existing.is_paid => Err(match payment_type {
            PaymentType::FullPayment => OrderError::FullPaymentNotEmpty,
            _ => OrderError::HalfPaymentNotEmpty,
        }),
        Some(_) => Err(OrderError::PreviousOrderNotEmpty),
        None => Ok(()),
    }
}
