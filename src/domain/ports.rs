use super::gateway::{
    GeneratedInvoice, InvoiceRequest, PackageDetail, PaymentLink, PaymentLinkRequest, UserProfile,
};
use super::order::{
    NewHistory, NewOrder, NewOrderInvoice, NewOrderPayment, NewSubOrder, Order, OrderHistory,
    OrderInvoice, OrderPayment, OrderPaymentUpdate, OrderUpdate, SubOrder, SubOrderRecord,
    SubOrderUpdate,
};
use super::payment_type::PaymentType;
use super::status::OrderStatus;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Entry point to order persistence.
///
/// Every mutation goes through an [`OrderTransaction`] obtained from
/// [`begin`](OrderStore::begin); the remaining methods are plain reads
/// outside any transaction.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>>;
    /// Includes soft-deleted orders.
    async fn find_order_by_uuid(&self, uuid: Uuid) -> Result<Option<Order>>;
    async fn find_sub_order_by_uuid(&self, uuid: Uuid) -> Result<Option<SubOrderRecord>>;
    async fn list_sub_orders(&self, page: u32, limit: u32) -> Result<(Vec<SubOrderRecord>, u64)>;
    async fn find_histories(&self, sub_order_id: i64) -> Result<Vec<OrderHistory>>;
    async fn find_invoices(&self, sub_order_id: i64) -> Result<Vec<OrderInvoice>>;
}

/// A unit of work. Dropping it without calling [`commit`](Self::commit)
/// discards every change made through it.
///
/// The `*_for_update` lookups hold a row lock until the transaction ends.
#[async_trait]
pub trait OrderTransaction: Send {
    /// Most recent order of the customer with `completed_at` unset and not
    /// deleted. `None` is not an error.
    async fn find_active_order_by_customer_for_update(
        &mut self,
        customer_id: Uuid,
    ) -> Result<Option<Order>>;
    async fn find_order_by_uuid_for_update(&mut self, uuid: Uuid) -> Result<Option<Order>>;
    async fn find_order_by_id_for_update(&mut self, id: i64) -> Result<Option<Order>>;
    async fn create_order(&mut self, order: NewOrder) -> Result<Order>;
    async fn update_order(&mut self, order_id: i64, update: OrderUpdate) -> Result<Order>;
    /// Soft-deletes the order. Deleting an already deleted order is a no-op.
    async fn delete_order(&mut self, order_id: i64) -> Result<()>;

    async fn find_sub_order_by_uuid_for_update(&mut self, uuid: Uuid) -> Result<Option<SubOrder>>;
    async fn find_sub_order_by_payment_id_for_update(
        &mut self,
        payment_id: Uuid,
    ) -> Result<Option<SubOrder>>;
    /// The non-cancelled sub-order of `payment_type` under `order_id`.
    async fn find_sub_order_by_order_and_payment_type(
        &mut self,
        order_id: i64,
        payment_type: PaymentType,
    ) -> Result<Option<SubOrder>>;
    async fn find_sub_orders_by_order(&mut self, order_id: i64) -> Result<Vec<SubOrder>>;
    /// Validates `Initial -> sub_order.status` before inserting.
    async fn create_sub_order(&mut self, sub_order: NewSubOrder) -> Result<SubOrder>;
    /// Validates `current.status -> update.status` before writing.
    async fn update_sub_order(&mut self, current: &SubOrder, update: SubOrderUpdate)
    -> Result<SubOrder>;
    async fn cancel_sub_order(&mut self, current: &SubOrder) -> Result<SubOrder>;

    async fn append_history(&mut self, sub_order_id: i64, status: OrderStatus) -> Result<()>;
    async fn bulk_append_history(&mut self, entries: Vec<NewHistory>) -> Result<()>;

    async fn create_order_payment(&mut self, payment: NewOrderPayment) -> Result<OrderPayment>;
    async fn update_order_payment(&mut self, update: OrderPaymentUpdate) -> Result<OrderPayment>;
    async fn find_order_payment_by_payment_id(
        &mut self,
        payment_id: Uuid,
    ) -> Result<Option<OrderPayment>>;

    async fn create_order_invoice(&mut self, invoice: NewOrderInvoice) -> Result<OrderInvoice>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn get_detail_package(&self, package_id: Uuid) -> Result<PackageDetail>;
}

#[async_trait]
pub trait IdentityGateway: Send + Sync {
    async fn get_user_profile(&self, customer_id: Uuid) -> Result<UserProfile>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_link(&self, request: &PaymentLinkRequest) -> Result<PaymentLink>;
}

#[async_trait]
pub trait InvoiceGateway: Send + Sync {
    async fn generate_invoice(&self, request: &InvoiceRequest) -> Result<GeneratedInvoice>;
}

pub type OrderStoreBox = Box<dyn OrderStore>;

/// The external services the orchestration depends on.
#[derive(Clone)]
pub struct Gateways {
    pub catalog: Arc<dyn CatalogGateway>,
    pub identity: Arc<dyn IdentityGateway>,
    pub payment: Arc<dyn PaymentGateway>,
    pub invoice: Arc<dyn InvoiceGateway>,
}
