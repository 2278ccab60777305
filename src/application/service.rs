use super::installment::{
    InstallmentRequest, PolicyContext, PolicyTable, default_policies,
};
use super::invoice::{build_invoice_request, invoice_number};
use crate::domain::gateway::{CustomerDetail, ItemDetail, PaymentLinkRequest};
use crate::domain::order::{
    NewHistory, NewOrderInvoice, NewOrderPayment, NewSubOrder, Order, OrderPayment,
    OrderPaymentUpdate, OrderUpdate, SubOrder, SubOrderRecord, SubOrderUpdate,
};
use crate::domain::payment_type::PaymentType;
use crate::domain::ports::{Gateways, OrderStoreBox, OrderTransaction};
use crate::domain::status::OrderStatus;
use crate::error::{OrderError, Result};
use crate::resilience::Breakers;
use crate::resilience::circuit_breaker::CircuitBreakerConfig;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Tunables of the orchestration that are not business rules.
#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub payment_link_ttl: Duration,
    pub invoice_template_id: String,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            payment_link_ttl: Duration::hours(24),
            invoice_template_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub payment_id: Uuid,
    pub payment_link: Option<String>,
    pub status: Option<String>,
}

/// What callers see of a sub-order after creation or lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubOrderResult {
    pub order_id: Uuid,
    pub sub_order_id: Uuid,
    pub sub_order_name: String,
    pub customer_id: Uuid,
    pub package_id: Uuid,
    pub amount: Decimal,
    pub status: OrderStatus,
    pub payment_type: PaymentType,
    pub order_date: DateTime<Utc>,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payment: Option<PaymentSummary>,
}

impl SubOrderResult {
    fn new(order: &Order, sub_order: &SubOrder, payment: Option<&OrderPayment>) -> Self {
        Self {
            order_id: order.uuid,
            sub_order_id: sub_order.uuid,
            sub_order_name: sub_order.sub_order_name.clone(),
            customer_id: order.customer_id,
            package_id: order.package_id,
            amount: sub_order.amount,
            status: sub_order.status,
            payment_type: sub_order.payment_type,
            order_date: sub_order.order_date,
            is_paid: sub_order.is_paid,
            created_at: sub_order.created_at,
            updated_at: sub_order.updated_at,
            payment: payment.map(|payment| PaymentSummary {
                payment_id: payment.payment_id,
                payment_link: payment.payment_url.clone(),
                status: payment.status.clone(),
            }),
        }
    }
}

impl From<SubOrderRecord> for SubOrderResult {
    fn from(record: SubOrderRecord) -> Self {
        Self::new(&record.order, &record.sub_order, record.payment.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

/// A gateway payment-status report for one installment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub payment_id: Uuid,
    pub amount: Decimal,
    /// Replaces the stored payment URL when set.
    pub payment_link: Option<String>,
    pub payment_type: Option<String>,
    pub status: Option<String>,
    pub va_number: Option<String>,
    pub bank: Option<String>,
    pub acquirer: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// The payment orchestration engine.
///
/// Owns the order store and reaches every external service through its own
/// circuit breaker. Each public operation runs in a single store
/// transaction; an error at any step leaves no trace in the store.
pub struct OrderService {
    store: OrderStoreBox,
    gateways: Gateways,
    breakers: Breakers,
    policies: PolicyTable,
    settings: OrderSettings,
}

impl OrderService {
    /// Creates a new `OrderService`.
    ///
    /// # Arguments
    ///
    /// * `store` - Persistence for orders and everything hanging off them.
    /// * `gateways` - Catalog, identity, payment and invoice clients.
    /// * `breaker` - Settings shared by the per-gateway circuit breakers.
    /// * `settings` - Payment-link lifetime and invoice template.
    pub fn new(
        store: OrderStoreBox,
        gateways: Gateways,
        breaker: &CircuitBreakerConfig,
        settings: OrderSettings,
    ) -> Self {
        Self {
            store,
            gateways,
            breakers: Breakers::new(breaker),
            policies: default_policies(),
            settings,
        }
    }

    pub fn breakers(&self) -> &Breakers {
        &self.breakers
    }

    /// Opens one installment and requests its payment link.
    ///
    /// The payment-link call is not undone when a later step fails; only the
    /// store changes are rolled back.
    #[instrument(
        skip(self, request),
        fields(customer_id = %request.customer_id, payment_type = %request.payment_type)
    )]
    pub async fn create_installment(&self, request: InstallmentRequest) -> Result<SubOrderResult> {
        let now = Utc::now();
        if request.order_date < now {
            return Err(OrderError::OrderDate);
        }

        let policy = self
            .policies
            .get(&request.payment_type)
            .ok_or_else(|| OrderError::InvalidPaymentType(request.payment_type.to_string()))?;

        let mut tx = self.store.begin().await?;
        let ctx = PolicyContext {
            gateways: &self.gateways,
            breakers: &self.breakers,
        };
        let order = policy.resolve_order(&ctx, tx.as_mut(), &request).await?;

        let sub_order = tx
            .create_sub_order(NewSubOrder {
                order_id: order.id,
                status: OrderStatus::Pending,
                amount: request.amount,
                payment_type: request.payment_type,
                order_date: request.order_date,
            })
            .await?;
        tx.bulk_append_history(vec![NewHistory {
            sub_order_id: sub_order.id,
            status: OrderStatus::Pending,
        }])
        .await?;

        let expired_at = now + self.settings.payment_link_ttl;
        let link_request = payment_link_request(&order, &sub_order, expired_at);
        let link = self
            .breakers
            .payment
            .call(|| self.gateways.payment.create_payment_link(&link_request))
            .await?;

        let payment = tx
            .create_order_payment(NewOrderPayment {
                sub_order_id: sub_order.id,
                amount: request.amount,
                payment_id: link.payment_id,
                payment_url: link.payment_link,
                status: link.status,
                expired_at,
            })
            .await?;
        tx.commit().await?;

        info!(
            order = %order.order_name,
            sub_order = %sub_order.sub_order_name,
            payment_id = %payment.payment_id,
            "installment created"
        );
        Ok(SubOrderResult::new(&order, &sub_order, Some(&payment)))
    }

    /// Cancels one installment. The owning order is removed with it.
    #[instrument(skip(self))]
    pub async fn cancel_installment(&self, sub_order_id: Uuid) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let sub_order = tx
            .find_sub_order_by_uuid_for_update(sub_order_id)
            .await?
            .ok_or(OrderError::SubOrderNotFound)?;
        if sub_order.status == OrderStatus::Cancelled {
            return Err(OrderError::CancelOrder);
        }

        self.advance(tx.as_mut(), &sub_order, OrderStatus::Cancelled, None)
            .await?;
        tx.commit().await?;

        info!(sub_order = %sub_order.sub_order_name, "installment cancelled");
        Ok(())
    }

    /// Moves the sub-order paid through `event.payment_id` to `target`.
    ///
    /// Only `PendingPayment`, `PaymentSuccess` and `Cancelled` are valid
    /// targets. A repeated event is rejected by the status machine, so a
    /// redelivered settlement never decrements the balance twice.
    #[instrument(skip(self, event), fields(payment_id = %event.payment_id))]
    pub async fn apply_payment_event(&self, event: &PaymentEvent, target: OrderStatus) -> Result<()> {
        if !matches!(
            target,
            OrderStatus::PendingPayment | OrderStatus::PaymentSuccess | OrderStatus::Cancelled
        ) {
            return Err(OrderError::InvalidStatus);
        }

        let mut tx = self.store.begin().await?;
        let sub_order = tx
            .find_sub_order_by_payment_id_for_update(event.payment_id)
            .await?
            .ok_or(OrderError::SubOrderNotFound)?;

        self.advance(tx.as_mut(), &sub_order, target, Some(event))
            .await?;
        tx.commit().await?;

        info!(sub_order = %sub_order.sub_order_name, "payment event applied");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_sub_order_detail(&self, sub_order_id: Uuid) -> Result<SubOrderResult> {
        self.store
            .find_sub_order_by_uuid(sub_order_id)
            .await?
            .map(SubOrderResult::from)
            .ok_or(OrderError::SubOrderNotFound)
    }

    /// Newest first. `page` starts at 1; a zero `limit` is treated as 10.
    #[instrument(skip(self))]
    pub async fn list_sub_orders(&self, page: u32, limit: u32) -> Result<Page<SubOrderResult>> {
        let page = page.max(1);
        let limit = if limit == 0 { 10 } else { limit };
        let (records, total) = self.store.list_sub_orders(page, limit).await?;

        Ok(Page {
            items: records.into_iter().map(SubOrderResult::from).collect(),
            total,
            page,
            limit,
            total_pages: total.div_ceil(u64::from(limit)),
        })
    }

    /// Applies one status change to `sub_order` inside `tx`.
    async fn advance(
        &self,
        tx: &mut dyn OrderTransaction,
        sub_order: &SubOrder,
        target: OrderStatus,
        event: Option<&PaymentEvent>,
    ) -> Result<()> {
        let now = Utc::now();

        match target {
            OrderStatus::Cancelled => {
                tx.cancel_sub_order(sub_order).await?;
            }
            OrderStatus::PaymentSuccess => {
                tx.update_sub_order(
                    sub_order,
                    SubOrderUpdate {
                        status: target,
                        is_paid: Some(true),
                        canceled_at: None,
                    },
                )
                .await?;
            }
            OrderStatus::PendingPayment => {
                tx.update_sub_order(
                    sub_order,
                    SubOrderUpdate {
                        status: target,
                        is_paid: None,
                        canceled_at: None,
                    },
                )
                .await?;
            }
            _ => return Err(OrderError::InvalidStatus),
        }
        tx.append_history(sub_order.id, target).await?;

        if let Some(event) = event {
            tx.update_order_payment(OrderPaymentUpdate {
                payment_id: event.payment_id,
                payment_url: event.payment_link.clone(),
                status: event.status.clone(),
                payment_type: event.payment_type.clone(),
                va_number: event.va_number.clone(),
                bank: event.bank.clone(),
                acquirer: event.acquirer.clone(),
                paid_at: if target == OrderStatus::PaymentSuccess {
                    event.paid_at.or(Some(now))
                } else {
                    None
                },
            })
            .await?;
        }

        match (target, event) {
            (OrderStatus::Cancelled, _) => tx.delete_order(sub_order.order_id).await,
            (OrderStatus::PaymentSuccess, Some(event)) => {
                self.settle(tx, sub_order, event, now).await
            }
            _ => Ok(()),
        }
    }

    /// Books a settlement against the order balance and issues the invoice.
    ///
    /// The order row stays locked until the transaction ends, so settlements
    /// of sibling installments are applied one after the other. A settlement
    /// larger than the outstanding balance is accepted and leaves a negative
    /// balance.
    async fn settle(
        &self,
        tx: &mut dyn OrderTransaction,
        sub_order: &SubOrder,
        event: &PaymentEvent,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let order = tx
            .find_order_by_id_for_update(sub_order.order_id)
            .await?
            .ok_or(OrderError::OrderNotFound)?;

        let remaining = order.remaining_outstanding_amount - event.amount;
        if remaining.is_sign_negative() && !remaining.is_zero() {
            warn!(order = %order.order_name, %remaining, "settlement exceeds outstanding balance");
        }
        let completed_at = (sub_order.payment_type == PaymentType::FullPayment).then_some(now);
        let order = tx
            .update_order(
                order.id,
                OrderUpdate {
                    remaining_outstanding_amount: remaining,
                    completed_at,
                },
            )
            .await?;

        let payment = tx
            .find_order_payment_by_payment_id(event.payment_id)
            .await?
            .ok_or(OrderError::SubOrderNotFound)?;
        let sub_orders = tx.find_sub_orders_by_order(order.id).await?;

        let number = invoice_number(now.date_naive(), &mut rand::thread_rng());
        let request = build_invoice_request(
            &order,
            &payment,
            &sub_orders,
            remaining,
            &self.settings.invoice_template_id,
            number.clone(),
            now,
        );
        let invoice = self
            .breakers
            .invoice
            .call(|| self.gateways.invoice.generate_invoice(&request))
            .await?;

        tx.create_order_invoice(NewOrderInvoice {
            sub_order_id: sub_order.id,
            invoice_id: invoice.invoice_id,
            invoice_number: number,
            invoice_url: invoice.url,
        })
        .await?;
        info!(order = %order.order_name, %remaining, "settlement booked");
        Ok(())
    }
}

fn payment_link_request(
    order: &Order,
    sub_order: &SubOrder,
    expired_at: DateTime<Utc>,
) -> PaymentLinkRequest {
    let title = sub_order.payment_type.title();
    PaymentLinkRequest {
        order_id: sub_order.uuid,
        expired_at,
        amount: sub_order.amount,
        description: title.to_string(),
        customer: CustomerDetail {
            name: order.customer_name.clone(),
            email: order.customer_email.clone(),
            phone: order.customer_phone.clone(),
        },
        items: vec![ItemDetail {
            id: Uuid::new_v4(),
            name: title.to_string(),
            amount: sub_order.amount,
            quantity: 1,
        }],
    }
}
