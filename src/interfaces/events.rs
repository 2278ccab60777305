//! Payment gateway callback events.

use super::consumer::{InboundMessage, TopicHandler};
use crate::application::service::{OrderService, PaymentEvent};
use crate::domain::status::OrderStatus;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Topic the payment service publishes status callbacks on.
pub const PAYMENT_TOPIC: &str = "payment-service-callback";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentEventName {
    Pending,
    Settlement,
    Expire,
    #[serde(other)]
    Unknown,
}

impl PaymentEventName {
    /// Sub-order status this event moves the installment to.
    pub fn target_status(self) -> Option<OrderStatus> {
        match self {
            PaymentEventName::Pending => Some(OrderStatus::PendingPayment),
            PaymentEventName::Settlement => Some(OrderStatus::PaymentSuccess),
            PaymentEventName::Expire => Some(OrderStatus::Cancelled),
            PaymentEventName::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventName {
    pub name: PaymentEventName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    #[serde(default)]
    pub sender: String,
    #[serde(rename = "sendingAt", default)]
    pub sending_at: Option<DateTime<Utc>>,
    #[serde(rename = "expiredAt", default)]
    pub expired_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBody<T> {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentData {
    pub payment_id: Uuid,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub payment_link: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub va_number: Option<String>,
    #[serde(default)]
    pub bank: Option<String>,
    #[serde(default)]
    pub acquirer: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub expired_at: Option<String>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

/// `{event: {name}, meta: {...}, body: {type, data}}` as published by the
/// payment service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentContent {
    pub event: EventName,
    pub meta: EventMeta,
    pub body: EventBody<PaymentData>,
}

impl From<PaymentData> for PaymentEvent {
    fn from(data: PaymentData) -> Self {
        Self {
            payment_id: data.payment_id,
            amount: data.amount,
            payment_link: data.payment_link,
            payment_type: data.payment_type,
            status: data.status,
            va_number: data.va_number,
            bank: data.bank,
            acquirer: data.acquirer,
            paid_at: data.paid_at,
        }
    }
}

/// Applies payment callbacks to the order service.
pub struct PaymentCallbackHandler {
    service: Arc<OrderService>,
}

impl PaymentCallbackHandler {
    pub fn new(service: Arc<OrderService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl TopicHandler for PaymentCallbackHandler {
    async fn handle(&self, message: &InboundMessage) -> Result<()> {
        let content: PaymentContent = serde_json::from_slice(&message.payload)?;
        let name = content.event.name;
        let Some(target) = name.target_status() else {
            warn!(sender = %content.meta.sender, "ignoring unknown payment event");
            return Ok(());
        };

        debug!(event = ?name, status = %target, "payment callback received");
        let event = PaymentEvent::from(content.body.data);
        self.service.apply_payment_event(&event, target).await
    }
}
