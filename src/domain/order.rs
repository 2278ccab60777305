use super::payment_type::PaymentType;
use super::status::OrderStatus;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ORDER_NAME_PREFIX: &str = "ORD-";
pub const SUB_ORDER_NAME_PREFIX: &str = "SUB-ORD-";

/// One customer's purchase cycle for a package.
///
/// The order does not embed its sub-orders; they point back at it through
/// `SubOrder::order_id` and are resolved through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub uuid: Uuid,
    pub order_name: String,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub package_id: Uuid,
    pub remaining_outstanding_amount: Decimal,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Active orders block a new down payment for the same customer.
    pub fn is_active(&self) -> bool {
        self.completed_at.is_none() && self.deleted_at.is_none()
    }
}

/// One installment of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubOrder {
    pub id: i64,
    pub uuid: Uuid,
    pub order_id: i64,
    pub sub_order_name: String,
    pub amount: Decimal,
    pub status: OrderStatus,
    pub is_paid: bool,
    pub payment_type: PaymentType,
    pub order_date: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Gateway-side view of a sub-order's payment, updated in place on every
/// callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPayment {
    pub id: i64,
    pub sub_order_id: i64,
    pub amount: Decimal,
    pub payment_id: Uuid,
    pub payment_url: Option<String>,
    pub status: Option<String>,
    pub payment_type: Option<String>,
    pub va_number: Option<String>,
    pub bank: Option<String>,
    pub acquirer: Option<String>,
    pub expired_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHistory {
    pub id: i64,
    pub sub_order_id: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInvoice {
    pub id: i64,
    pub sub_order_id: i64,
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub invoice_url: String,
    pub created_at: DateTime<Utc>,
}

/// A sub-order joined with its order and payment, as returned by reads.
#[derive(Debug, Clone, PartialEq)]
pub struct SubOrderRecord {
    pub sub_order: SubOrder,
    pub order: Order,
    pub payment: Option<OrderPayment>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub package_id: Uuid,
    pub remaining_outstanding_amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub remaining_outstanding_amount: Decimal,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewSubOrder {
    pub order_id: i64,
    pub status: OrderStatus,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub order_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SubOrderUpdate {
    pub status: OrderStatus,
    pub is_paid: Option<bool>,
    pub canceled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewHistory {
    pub sub_order_id: i64,
    pub status: OrderStatus,
}

#[derive(Debug, Clone)]
pub struct NewOrderPayment {
    pub sub_order_id: i64,
    pub amount: Decimal,
    pub payment_id: Uuid,
    pub payment_url: String,
    pub status: Option<String>,
    pub expired_at: DateTime<Utc>,
}

/// Callback fields written onto the payment row identified by `payment_id`.
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct OrderPaymentUpdate {
    pub payment_id: Uuid,
    pub payment_url: Option<String>,
    pub status: Option<String>,
    pub payment_type: Option<String>,
    pub va_number: Option<String>,
    pub bank: Option<String>,
    pub acquirer: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl OrderPayment {
    pub fn apply(&mut self, update: &OrderPaymentUpdate, now: DateTime<Utc>) {
        if let Some(payment_url) = &update.payment_url {
            self.payment_url = Some(payment_url.clone());
        }
        if let Some(status) = &update.status {
            self.status = Some(status.clone());
        }
        if let Some(payment_type) = &update.payment_type {
            self.payment_type = Some(payment_type.clone());
        }
        if let Some(va_number) = &update.va_number {
            self.va_number = Some(va_number.clone());
        }
        if let Some(bank) = &update.bank {
            self.bank = Some(bank.clone());
        }
        if let Some(acquirer) = &update.acquirer {
            self.acquirer = Some(acquirer.clone());
        }
        if update.paid_at.is_some() {
            self.paid_at = update.paid_at;
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone)]
pub struct NewOrderInvoice {
    pub sub_order_id: i64,
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub invoice_url: String,
}

/// Builds the next auto-numbered name, e.g. `ORD-00042-20260115`.
///
/// The running number continues from `latest` (the most recently created
/// name with the same prefix) regardless of its date suffix.
pub fn next_name(prefix: &str, latest: Option<&str>, today: NaiveDate) -> String {
    let sequence = latest
        .and_then(|name| name.strip_prefix(prefix))
        .and_then(|rest| rest.get(..5))
        .and_then(|digits| digits.parse::<u32>().ok())
        .unwrap_or(0)
        + 1;
    format!("{prefix}{sequence:05}-{}", today.format("%Y%m%d"))
}
