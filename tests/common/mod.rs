#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use installment_orders::application::installment::InstallmentRequest;
use installment_orders::application::service::{OrderService, OrderSettings, PaymentEvent};
use installment_orders::domain::gateway::{
    GeneratedInvoice, InvoiceRequest, PackageDetail, PaymentLink, PaymentLinkRequest, UserProfile,
};
use installment_orders::domain::order::{
    NewHistory, NewOrder, NewOrderInvoice, NewOrderPayment, NewSubOrder, Order, OrderHistory,
    OrderInvoice, OrderPayment, OrderPaymentUpdate, OrderUpdate, SubOrder, SubOrderRecord,
    SubOrderUpdate,
};
use installment_orders::domain::payment_type::PaymentType;
use installment_orders::domain::ports::{
    CatalogGateway, Gateways, IdentityGateway, InvoiceGateway, OrderStore, OrderTransaction,
    PaymentGateway,
};
use installment_orders::domain::status::OrderStatus;
use installment_orders::error::{OrderError, Result};
use installment_orders::infrastructure::in_memory::InMemoryOrderStore;
use installment_orders::resilience::circuit_breaker::CircuitBreakerConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const PACKAGE_PRICE: Decimal = dec!(1000000);
pub const MINIMUM_DOWN_PAYMENT: Decimal = dec!(10);

pub struct StubCatalog {
    pub price: Decimal,
    pub minimum_down_payment: Decimal,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl CatalogGateway for StubCatalog {
    async fn get_detail_package(&self, package_id: Uuid) -> Result<PackageDetail> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(OrderError::gateway("catalog", "connection refused"));
        }
        Ok(PackageDetail {
            uuid: package_id,
            name: "Umrah Reguler".into(),
            price: self.price,
            minimum_down_payment: self.minimum_down_payment,
        })
    }
}

#[derive(Default)]
pub struct StubIdentity {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl IdentityGateway for StubIdentity {
    async fn get_user_profile(&self, _customer_id: Uuid) -> Result<UserProfile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(OrderError::gateway("identity", "connection refused"));
        }
        Ok(UserProfile {
            name: "Siti Aminah".into(),
            email: "siti@example.com".into(),
            phone: "081234567890".into(),
        })
    }
}

#[derive(Default)]
pub struct StubPayment {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<PaymentLinkRequest>>,
}

#[async_trait]
impl PaymentGateway for StubPayment {
    async fn create_payment_link(&self, request: &PaymentLinkRequest) -> Result<PaymentLink> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(OrderError::gateway("payment", "connection refused"));
        }
        self.requests.lock().unwrap().push(request.clone());
        let payment_id = Uuid::new_v4();
        Ok(PaymentLink {
            payment_id,
            payment_link: format!("https://pay.example/{payment_id}"),
            status: Some("pending".into()),
        })
    }
}

#[derive(Default)]
pub struct StubInvoice {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<InvoiceRequest>>,
}

#[async_trait]
impl InvoiceGateway for StubInvoice {
    async fn generate_invoice(&self, request: &InvoiceRequest) -> Result<GeneratedInvoice> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(OrderError::gateway("invoice", "template not found"));
        }
        self.requests.lock().unwrap().push(request.clone());
        let invoice_id = Uuid::new_v4();
        Ok(GeneratedInvoice {
            invoice_id,
            url: format!("https://invoice.example/{invoice_id}.pdf"),
        })
    }
}

/// Wraps the in-memory store; `fail_payment_insert` makes
/// `create_order_payment` fail inside every transaction.
#[derive(Clone, Default)]
pub struct FaultyStore {
    pub inner: InMemoryOrderStore,
    pub fail_payment_insert: Arc<AtomicBool>,
}

struct FaultyTransaction {
    inner: Box<dyn OrderTransaction>,
    fail_payment_insert: bool,
}

#[async_trait]
impl OrderStore for FaultyStore {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>> {
        Ok(Box::new(FaultyTransaction {
            inner: self.inner.begin().await?,
            fail_payment_insert: self.fail_payment_insert.load(Ordering::SeqCst),
        }))
    }

    async fn find_order_by_uuid(&self, uuid: Uuid) -> Result<Option<Order>> {
        self.inner.find_order_by_uuid(uuid).await
    }

    async fn find_sub_order_by_uuid(&self, uuid: Uuid) -> Result<Option<SubOrderRecord>> {
        self.inner.find_sub_order_by_uuid(uuid).await
    }

    async fn list_sub_orders(&self, page: u32, limit: u32) -> Result<(Vec<SubOrderRecord>, u64)> {
        self.inner.list_sub_orders(page, limit).await
    }

    async fn find_histories(&self, sub_order_id: i64) -> Result<Vec<OrderHistory>> {
        self.inner.find_histories(sub_order_id).await
    }

    async fn find_invoices(&self, sub_order_id: i64) -> Result<Vec<OrderInvoice>> {
        self.inner.find_invoices(sub_order_id).await
    }
}

#[async_trait]
impl OrderTransaction for FaultyTransaction {
    async fn find_active_order_by_customer_for_update(
        &mut self,
        customer_id: Uuid,
    ) -> Result<Option<Order>> {
        self.inner.find_active_order_by_customer_for_update(customer_id).await
    }

    async fn find_order_by_uuid_for_update(&mut self, uuid: Uuid) -> Result<Option<Order>> {
        self.inner.find_order_by_uuid_for_update(uuid).await
    }

    async fn find_order_by_id_for_update(&mut self, id: i64) -> Result<Option<Order>> {
        self.inner.find_order_by_id_for_update(id).await
    }

    async fn create_order(&mut self, order: NewOrder) -> Result<Order> {
        self.inner.create_order(order).await
    }

    async fn update_order(&mut self, order_id: i64, update: OrderUpdate) -> Result<Order> {
        self.inner.update_order(order_id, update).await
    }

    async fn delete_order(&mut self, order_id: i64) -> Result<()> {
        self.inner.delete_order(order_id).await
    }

    async fn find_sub_order_by_uuid_for_update(&mut self, uuid: Uuid) -> Result<Option<SubOrder>> {
        self.inner.find_sub_order_by_uuid_for_update(uuid).await
    }

    async fn find_sub_order_by_payment_id_for_update(
        &mut self,
        payment_id: Uuid,
    ) -> Result<Option<SubOrder>> {
        self.inner.find_sub_order_by_payment_id_for_update(payment_id).await
    }

    async fn find_sub_order_by_order_and_payment_type(
        &mut self,
        order_id: i64,
        payment_type: PaymentType,
    ) -> Result<Option<SubOrder>> {
        self.inner
            .find_sub_order_by_order_and_payment_type(order_id, payment_type)
            .await
    }

    async fn find_sub_orders_by_order(&mut self, order_id: i64) -> Result<Vec<SubOrder>> {
        self.inner.find_sub_orders_by_order(order_id).await
    }

    async fn create_sub_order(&mut self, sub_order: NewSubOrder) -> Result<SubOrder> {
        self.inner.create_sub_order(sub_order).await
    }

    async fn update_sub_order(
        &mut self,
        current: &SubOrder,
        update: SubOrderUpdate,
    ) -> Result<SubOrder> {
        self.inner.update_sub_order(current, update).await
    }

    async fn cancel_sub_order(&mut self, current: &SubOrder) -> Result<SubOrder> {
        self.inner.cancel_sub_order(current).await
    }

    async fn append_history(&mut self, sub_order_id: i64, status: OrderStatus) -> Result<()> {
        self.inner.append_history(sub_order_id, status).await
    }

    async fn bulk_append_history(&mut self, entries: Vec<NewHistory>) -> Result<()> {
        self.inner.bulk_append_history(entries).await
    }

    async fn create_order_payment(&mut self, payment: NewOrderPayment) -> Result<OrderPayment> {
        if self.fail_payment_insert {
            return Err(OrderError::storage(std::io::Error::other("disk full")));
        }
        self.inner.create_order_payment(payment).await
    }

    async fn update_order_payment(&mut self, update: OrderPaymentUpdate) -> Result<OrderPayment> {
        self.inner.update_order_payment(update).await
    }

    async fn find_order_payment_by_payment_id(
        &mut self,
        payment_id: Uuid,
    ) -> Result<Option<OrderPayment>> {
        self.inner.find_order_payment_by_payment_id(payment_id).await
    }

    async fn create_order_invoice(&mut self, invoice: NewOrderInvoice) -> Result<OrderInvoice> {
        self.inner.create_order_invoice(invoice).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.inner.commit().await
    }
}

pub struct Harness {
    pub service: Arc<OrderService>,
    pub store: FaultyStore,
    pub catalog: Arc<StubCatalog>,
    pub identity: Arc<StubIdentity>,
    pub payment: Arc<StubPayment>,
    pub invoice: Arc<StubInvoice>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_breaker(CircuitBreakerConfig::default())
    }

    pub fn with_breaker(breaker: CircuitBreakerConfig) -> Self {
        let store = FaultyStore::default();
        let catalog = Arc::new(StubCatalog {
            price: PACKAGE_PRICE,
            minimum_down_payment: MINIMUM_DOWN_PAYMENT,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        });
        let identity = Arc::new(StubIdentity::default());
        let payment = Arc::new(StubPayment::default());
        let invoice = Arc::new(StubInvoice::default());
        let gateways = Gateways {
            catalog: catalog.clone(),
            identity: identity.clone(),
            payment: payment.clone(),
            invoice: invoice.clone(),
        };
        let settings = OrderSettings {
            invoice_template_id: "tpl-installment".into(),
            ..OrderSettings::default()
        };
        let service = Arc::new(OrderService::new(
            Box::new(store.clone()),
            gateways,
            &breaker,
            settings,
        ));

        Self {
            service,
            store,
            catalog,
            identity,
            payment,
            invoice,
        }
    }

    pub async fn payment_id(&self, sub_order_id: Uuid) -> Uuid {
        self.service
            .get_sub_order_detail(sub_order_id)
            .await
            .unwrap()
            .payment
            .unwrap()
            .payment_id
    }

    pub async fn order(&self, order_id: Uuid) -> Order {
        self.store.find_order_by_uuid(order_id).await.unwrap().unwrap()
    }

    pub async fn record(&self, sub_order_id: Uuid) -> SubOrderRecord {
        self.store
            .find_sub_order_by_uuid(sub_order_id)
            .await
            .unwrap()
            .unwrap()
    }
}

pub fn tomorrow() -> chrono::DateTime<Utc> {
    Utc::now() + Duration::days(1)
}

pub fn down_payment(customer_id: Uuid) -> InstallmentRequest {
    InstallmentRequest {
        customer_id,
        order_id: None,
        package_id: Uuid::new_v4(),
        amount: dec!(100000),
        order_date: tomorrow(),
        payment_type: PaymentType::DownPayment,
    }
}

pub fn follow_up(
    customer_id: Uuid,
    order_id: Uuid,
    payment_type: PaymentType,
    amount: Decimal,
) -> InstallmentRequest {
    InstallmentRequest {
        customer_id,
        order_id: Some(order_id),
        package_id: Uuid::new_v4(),
        amount,
        order_date: tomorrow(),
        payment_type,
    }
}

pub fn pending_event(payment_id: Uuid) -> PaymentEvent {
    PaymentEvent {
        payment_id,
        status: Some("pending".into()),
        ..PaymentEvent::default()
    }
}

pub fn settlement_event(payment_id: Uuid, amount: Decimal) -> PaymentEvent {
    PaymentEvent {
        payment_id,
        amount,
        payment_type: Some("bank_transfer".into()),
        status: Some("settlement".into()),
        va_number: Some("8800123456".into()),
        bank: Some("bca".into()),
        ..PaymentEvent::default()
    }
}
