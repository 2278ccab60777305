use crate::domain::order::{
    NewHistory, NewOrder, NewOrderInvoice, NewOrderPayment, NewSubOrder, ORDER_NAME_PREFIX, Order,
    OrderHistory, OrderInvoice, OrderPayment, OrderPaymentUpdate, OrderUpdate,
    SUB_ORDER_NAME_PREFIX, SubOrder, SubOrderRecord, SubOrderUpdate, next_name,
};
use crate::domain::payment_type::PaymentType;
use crate::domain::ports::{OrderStore, OrderTransaction};
use crate::domain::status::OrderStatus;
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Error)]
enum ConstraintViolation {
    #[error("order payment already exists for sub-order {0}")]
    DuplicatePayment(i64),
    #[error("order payment {0} does not exist")]
    MissingPayment(Uuid),
}

#[derive(Debug, Default, Clone)]
struct Sequences {
    order: i64,
    sub_order: i64,
    payment: i64,
    history: i64,
    invoice: i64,
}

fn next(sequence: &mut i64) -> i64 {
    *sequence += 1;
    *sequence
}

#[derive(Debug, Default, Clone)]
struct Tables {
    orders: BTreeMap<i64, Order>,
    sub_orders: BTreeMap<i64, SubOrder>,
    payments: BTreeMap<i64, OrderPayment>,
    histories: Vec<OrderHistory>,
    invoices: Vec<OrderInvoice>,
    ids: Sequences,
}

impl Tables {
    fn record(&self, sub_order: &SubOrder) -> Option<SubOrderRecord> {
        let order = self.orders.get(&sub_order.order_id)?;
        Some(SubOrderRecord {
            sub_order: sub_order.clone(),
            order: order.clone(),
            payment: self
                .payments
                .values()
                .find(|payment| payment.sub_order_id == sub_order.id)
                .cloned(),
        })
    }

    fn live_order_mut(&mut self, order_id: i64) -> Result<&mut Order> {
        self.orders
            .get_mut(&order_id)
            .filter(|order| order.deleted_at.is_none())
            .ok_or(OrderError::OrderNotFound)
    }
}

/// A process-local order store.
///
/// A transaction takes the single table lock for its whole lifetime and works
/// on a private copy, written back on commit. Concurrent transactions are
/// therefore fully serialized, which subsumes every row lock the port asks
/// for.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, working }))
    }

    async fn find_order_by_uuid(&self, uuid: Uuid) -> Result<Option<Order>> {
        let tables = self.tables.lock().await;
        Ok(tables.orders.values().find(|order| order.uuid == uuid).cloned())
    }

    async fn find_sub_order_by_uuid(&self, uuid: Uuid) -> Result<Option<SubOrderRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sub_orders
            .values()
            .find(|sub_order| sub_order.uuid == uuid)
            .and_then(|sub_order| tables.record(sub_order)))
    }

    async fn list_sub_orders(&self, page: u32, limit: u32) -> Result<(Vec<SubOrderRecord>, u64)> {
        let tables = self.tables.lock().await;
        let offset = (page.max(1) as usize - 1) * limit as usize;
        let records = tables
            .sub_orders
            .values()
            .rev()
            .skip(offset)
            .take(limit as usize)
            .filter_map(|sub_order| tables.record(sub_order))
            .collect();
        Ok((records, tables.sub_orders.len() as u64))
    }

    async fn find_histories(&self, sub_order_id: i64) -> Result<Vec<OrderHistory>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .histories
            .iter()
            .filter(|history| history.sub_order_id == sub_order_id)
            .cloned()
            .collect())
    }

    async fn find_invoices(&self, sub_order_id: i64) -> Result<Vec<OrderInvoice>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .invoices
            .iter()
            .filter(|invoice| invoice.sub_order_id == sub_order_id)
            .cloned()
            .collect())
    }
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl OrderTransaction for InMemoryTransaction {
    async fn find_active_order_by_customer_for_update(
        &mut self,
        customer_id: Uuid,
    ) -> Result<Option<Order>> {
        Ok(self
            .working
            .orders
            .values()
            .rev()
            .find(|order| order.customer_id == customer_id && order.is_active())
            .cloned())
    }

    async fn find_order_by_uuid_for_update(&mut self, uuid: Uuid) -> Result<Option<Order>> {
        Ok(self
            .working
            .orders
            .values()
            .find(|order| order.uuid == uuid && order.deleted_at.is_none())
            .cloned())
    }

    async fn find_order_by_id_for_update(&mut self, id: i64) -> Result<Option<Order>> {
        Ok(self
            .working
            .orders
            .get(&id)
            .filter(|order| order.deleted_at.is_none())
            .cloned())
    }

    async fn create_order(&mut self, order: NewOrder) -> Result<Order> {
        let now = Utc::now();
        let latest = self.working.orders.values().next_back();
        let order_name = next_name(
            ORDER_NAME_PREFIX,
            latest.map(|o| o.order_name.as_str()),
            now.date_naive(),
        );
        let id = next(&mut self.working.ids.order);
        let order = Order {
            id,
            uuid: Uuid::new_v4(),
            order_name,
            customer_id: order.customer_id,
            customer_name: order.customer_name,
            customer_email: order.customer_email,
            customer_phone: order.customer_phone,
            package_id: order.package_id,
            remaining_outstanding_amount: order.remaining_outstanding_amount,
            completed_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.working.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn update_order(&mut self, order_id: i64, update: OrderUpdate) -> Result<Order> {
        let order = self.working.live_order_mut(order_id)?;
        order.remaining_outstanding_amount = update.remaining_outstanding_amount;
        if update.completed_at.is_some() {
            order.completed_at = update.completed_at;
        }
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn delete_order(&mut self, order_id: i64) -> Result<()> {
        let order = self
            .working
            .orders
            .get_mut(&order_id)
            .ok_or(OrderError::OrderNotFound)?;
        if order.deleted_at.is_none() {
            let now = Utc::now();
            order.deleted_at = Some(now);
            order.updated_at = now;
        }
        Ok(())
    }

    async fn find_sub_order_by_uuid_for_update(&mut self, uuid: Uuid) -> Result<Option<SubOrder>> {
        Ok(self
            .working
            .sub_orders
            .values()
            .find(|sub_order| sub_order.uuid == uuid)
            .cloned())
    }

    async fn find_sub_order_by_payment_id_for_update(
        &mut self,
        payment_id: Uuid,
    ) -> Result<Option<SubOrder>> {
        let Some(payment) = self
            .working
            .payments
            .values()
            .find(|payment| payment.payment_id == payment_id)
        else {
            return Ok(None);
        };
        Ok(self.working.sub_orders.get(&payment.sub_order_id).cloned())
    }

    async fn find_sub_order_by_order_and_payment_type(
        &mut self,
        order_id: i64,
        payment_type: PaymentType,
    ) -> Result<Option<SubOrder>> {
        Ok(self
            .working
            .sub_orders
            .values()
            .rev()
            .find(|sub_order| {
                sub_order.order_id == order_id
                    && sub_order.payment_type == payment_type
                    && sub_order.status != OrderStatus::Cancelled
            })
            .cloned())
    }

    async fn find_sub_orders_by_order(&mut self, order_id: i64) -> Result<Vec<SubOrder>> {
        Ok(self
            .working
            .sub_orders
            .values()
            .filter(|sub_order| sub_order.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn create_sub_order(&mut self, sub_order: NewSubOrder) -> Result<SubOrder> {
        OrderStatus::Initial.ensure_transition(sub_order.status)?;
        if !self.working.orders.contains_key(&sub_order.order_id) {
            return Err(OrderError::OrderNotFound);
        }

        let now = Utc::now();
        let latest = self.working.sub_orders.values().next_back();
        let sub_order_name = next_name(
            SUB_ORDER_NAME_PREFIX,
            latest.map(|s| s.sub_order_name.as_str()),
            now.date_naive(),
        );
        let id = next(&mut self.working.ids.sub_order);
        let sub_order = SubOrder {
            id,
            uuid: Uuid::new_v4(),
            order_id: sub_order.order_id,
            sub_order_name,
            amount: sub_order.amount,
            status: sub_order.status,
            is_paid: false,
            payment_type: sub_order.payment_type,
            order_date: sub_order.order_date,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        };
        self.working.sub_orders.insert(id, sub_order.clone());
        Ok(sub_order)
    }

    async fn update_sub_order(
        &mut self,
        current: &SubOrder,
        update: SubOrderUpdate,
    ) -> Result<SubOrder> {
        let stored = self
            .working
            .sub_orders
            .get_mut(&current.id)
            .ok_or(OrderError::SubOrderNotFound)?;
        stored.status.ensure_transition(update.status)?;

        stored.status = update.status;
        if let Some(is_paid) = update.is_paid {
            stored.is_paid = is_paid;
        }
        if update.canceled_at.is_some() {
            stored.canceled_at = update.canceled_at;
        }
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn cancel_sub_order(&mut self, current: &SubOrder) -> Result<SubOrder> {
        self.update_sub_order(
            current,
            SubOrderUpdate {
                status: OrderStatus::Cancelled,
                is_paid: None,
                canceled_at: Some(Utc::now()),
            },
        )
        .await
    }

    async fn append_history(&mut self, sub_order_id: i64, status: OrderStatus) -> Result<()> {
        self.bulk_append_history(vec![NewHistory {
            sub_order_id,
            status,
        }])
        .await
    }

    async fn bulk_append_history(&mut self, entries: Vec<NewHistory>) -> Result<()> {
        let now = Utc::now();
        for entry in entries {
            let id = next(&mut self.working.ids.history);
            self.working.histories.push(OrderHistory {
                id,
                sub_order_id: entry.sub_order_id,
                status: entry.status,
                created_at: now,
            });
        }
        Ok(())
    }

    async fn create_order_payment(&mut self, payment: NewOrderPayment) -> Result<OrderPayment> {
        if self
            .working
            .payments
            .values()
            .any(|existing| existing.sub_order_id == payment.sub_order_id)
        {
            return Err(OrderError::storage(ConstraintViolation::DuplicatePayment(
                payment.sub_order_id,
            )));
        }

        let now = Utc::now();
        let id = next(&mut self.working.ids.payment);
        let payment = OrderPayment {
            id,
            sub_order_id: payment.sub_order_id,
            amount: payment.amount,
            payment_id: payment.payment_id,
            payment_url: Some(payment.payment_url),
            status: payment.status,
            payment_type: None,
            va_number: None,
            bank: None,
            acquirer: None,
            expired_at: Some(payment.expired_at),
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        self.working.payments.insert(id, payment.clone());
        Ok(payment)
    }

    async fn update_order_payment(&mut self, update: OrderPaymentUpdate) -> Result<OrderPayment> {
        let payment = self
            .working
            .payments
            .values_mut()
            .find(|payment| payment.payment_id == update.payment_id)
            .ok_or_else(|| {
                OrderError::storage(ConstraintViolation::MissingPayment(update.payment_id))
            })?;
        payment.apply(&update, Utc::now());
        Ok(payment.clone())
    }

    async fn find_order_payment_by_payment_id(
        &mut self,
        payment_id: Uuid,
    ) -> Result<Option<OrderPayment>> {
        Ok(self
            .working
            .payments
            .values()
            .find(|payment| payment.payment_id == payment_id)
            .cloned())
    }

    async fn create_order_invoice(&mut self, invoice: NewOrderInvoice) -> Result<OrderInvoice> {
        let id = next(&mut self.working.ids.invoice);
        let invoice = OrderInvoice {
            id,
            sub_order_id: invoice.sub_order_id,
            invoice_id: invoice.invoice_id,
            invoice_number: invoice.invoice_number,
            invoice_url: invoice.invoice_url,
            created_at: Utc::now(),
        };
        self.working.invoices.push(invoice.clone());
        Ok(invoice)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
