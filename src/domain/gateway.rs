//! Payloads exchanged with the catalog, identity, payment and invoice
//! services. Field names follow those services' JSON contracts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDetail {
    pub uuid: Uuid,
    pub name: String,
    pub price: Decimal,
    /// Required down payment, as a percentage of `price`.
    #[serde(rename = "minimalDownPayment")]
    pub minimum_down_payment: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    #[serde(rename = "phone_number")]
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetail {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetail {
    pub id: Uuid,
    pub name: String,
    pub amount: Decimal,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLinkRequest {
    /// Public id of the sub-order being paid.
    pub order_id: Uuid,
    pub expired_at: DateTime<Utc>,
    pub amount: Decimal,
    pub description: String,
    #[serde(rename = "customer_details")]
    pub customer: CustomerDetail,
    #[serde(rename = "item_details")]
    pub items: Vec<ItemDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLink {
    #[serde(rename = "uuid")]
    pub payment_id: Uuid,
    pub payment_link: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceCustomer {
    pub name: String,
    pub email: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicePaymentDetail {
    pub payment_method: String,
    pub bank_name: String,
    pub va_number: String,
    pub date: String,
    pub remaining_outstanding_amount: String,
    pub is_paid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub description: String,
    pub price: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceData {
    pub customer: InvoiceCustomer,
    pub payment_detail: InvoicePaymentDetail,
    pub items: Vec<InvoiceItem>,
    pub total: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub invoice_number: String,
    pub template_id: String,
    pub created_by: Uuid,
    pub data: InvoiceData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedInvoice {
    #[serde(rename = "uuid")]
    pub invoice_id: Uuid,
    pub url: String,
}
